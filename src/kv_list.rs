//! A bounded, sorted key-value list, used for query strings, form bodies,
//! and cookie jars.
//!
//! The 32-entry capacity is a deliberate DoS limit carried over from
//! `original_source/common/lwan-request.c` (`N_HEADER_FIELDS`-style bound on
//! `key_value_array`), not an implementation artifact: additional pairs past
//! the cap are dropped silently rather than growing the list. No heap
//! allocation is used, matching the spec's "coroutine-arena, capacity 32, no
//! dynamic growth" resource policy (`SPEC_FULL.md` §5) -- in a task-based
//! Rust port that arena is simply stack space borrowed from the caller's
//! frame.

/// Deliberate DoS bound: see module docs.
pub const MAX_KV_PAIRS: usize = 32;

/// A sorted, fixed-capacity list of borrowed `(key, value)` string pairs.
pub struct KvList<'a> {
    pairs: [(&'a str, &'a str); MAX_KV_PAIRS],
    len: usize,
}

impl<'a> Default for KvList<'a> {
    fn default() -> Self {
        KvList {
            pairs: [("", ""); MAX_KV_PAIRS],
            len: 0,
        }
    }
}

impl<'a> KvList<'a> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs[..self.len].iter().map(|(k, v)| (*k, *v))
    }

    /// Looks up `key` via binary search.
    ///
    /// **Preserves a latent quirk of the original verbatim** (see
    /// `SPEC_FULL.md` §9, "Open question: partial prefix comparison"): the
    /// comparison only checks the first `key.len()` bytes of each candidate,
    /// so `get("foo")` against a list containing `"foobar"` but not `"foo"`
    /// may spuriously match `"foobar"`, depending on where it lands relative
    /// to the binary search probe sequence. Callers must pass the exact key
    /// they mean. This is intentionally not "fixed" -- it mirrors
    /// `lwan_request.c`'s `find_key_value` which compares with `strncmp` of
    /// the searched key's length, not the stored key's length.
    pub fn get(&self, key: &str) -> Option<&str> {
        let slice = &self.pairs[..self.len];
        let idx = slice
            .binary_search_by(|(k, _)| prefix_cmp(k, key))
            .ok()?;
        Some(slice[idx].1)
    }
}

/// Compares `candidate` against `key` using only `key`'s length, matching
/// `strncmp(key, candidate, strlen(key))` from the original.
fn prefix_cmp(candidate: &str, key: &str) -> std::cmp::Ordering {
    let bound = key.len().min(candidate.len());
    match candidate.as_bytes()[..bound].cmp(&key.as_bytes()[..bound]) {
        std::cmp::Ordering::Equal if candidate.len() < key.len() => std::cmp::Ordering::Less,
        other => other,
    }
}

/// Parses `k=v<sep>k=v...` out of `data`, applying `decode` to each key and
/// value in place. `decode` is the identity decoder for cookies and
/// [`crate::bytes_util::url_decode`] for query strings / form bodies.
///
/// Walks a cursor over the slice: skips runs of space/separator, splits on
/// `=` and `sep`, decodes both sides, and **fails soft**: if a decode fails,
/// the whole list parse stops and returns whatever was collected so far
/// (`SPEC_FULL.md` §4.B). Collection also stops, silently, once
/// [`MAX_KV_PAIRS`] entries have been gathered.
pub fn parse_kv_list<'a>(
    data: &'a mut [u8],
    sep: u8,
    decode: impl Fn(&mut [u8]) -> Option<usize>,
) -> KvList<'a> {
    // Two passes over `data`, not one: the decoded spans below get turned
    // into `&'a str`s borrowed from `data` for the rest of this list's
    // life, so that borrow has to start only after the *last* `&mut data`
    // reborrow the walk needs, not interleaved with it. The walk itself
    // only ever needs mutable access, so it collects spans (plain
    // `usize`s, no borrow) instead of slicing immutably as it goes.
    let mut spans: [(usize, usize, usize, usize); MAX_KV_PAIRS] = [(0, 0, 0, 0); MAX_KV_PAIRS];
    let mut count = 0usize;
    let mut cursor = 0usize;

    'outer: while cursor < data.len() && count < MAX_KV_PAIRS {
        while cursor < data.len() && (data[cursor] == b' ' || data[cursor] == sep) {
            cursor += 1;
        }
        if cursor >= data.len() {
            break;
        }

        let key_start = cursor;
        while cursor < data.len() && data[cursor] != b'=' && data[cursor] != sep {
            cursor += 1;
        }
        let key_end = cursor;
        let has_value = cursor < data.len() && data[cursor] == b'=';
        if has_value {
            cursor += 1;
        }

        let value_start = cursor;
        while cursor < data.len() && data[cursor] != sep {
            cursor += 1;
        }
        let value_end = cursor;
        if cursor < data.len() {
            cursor += 1; // past the separator
        }

        let key_len = match decode(&mut data[key_start..key_end]) {
            Some(n) => n,
            None => break 'outer,
        };
        let value_len = if has_value {
            match decode(&mut data[value_start..value_end]) {
                Some(n) => n,
                None => break 'outer,
            }
        } else {
            0
        };

        spans[count] = (key_start, key_len, value_start, value_len);
        count += 1;
    }

    // Last `&mut data` use was above; every remaining access is a read, so
    // this reborrow can live as long as `'a` without conflicting with it.
    let data: &'a [u8] = &*data;

    let mut out = KvList::default();
    for &(key_start, key_len, value_start, value_len) in &spans[..count] {
        let key = match std::str::from_utf8(&data[key_start..key_start + key_len]) {
            Ok(s) => s,
            Err(_) => break,
        };
        let value = match std::str::from_utf8(&data[value_start..value_start + value_len]) {
            Ok(s) => s,
            Err(_) => break,
        };
        out.pairs[out.len] = (key, value);
        out.len += 1;
    }

    out.pairs[..out.len].sort_by(|a, b| a.0.cmp(b.0));
    out
}
