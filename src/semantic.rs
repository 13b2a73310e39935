//! Semantic post-parsers run after the header block has been sliced:
//! `If-Modified-Since`, `Range`, and `Accept-Encoding`. Grounded on
//! `lwan_parse_rfc_time` / `lwan_request_parse_range` /
//! `lwan_request_get_accept_encoding` in
//! `original_source/common/lwan-request.c`, with date parsing shaped after
//! the teacher's own `headers/date.rs` (same `chrono` format string) and
//! range parsing shaped after the teacher's `headers/range.rs`.

use chrono::{DateTime, Utc};

use crate::bytes_util::match4;

/// RFC 7231 IMF-fixdate, the only form the original accepts.
const IF_MODIFIED_SINCE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Parses an `If-Modified-Since` value, returning UTC seconds since the
/// epoch. A value that doesn't match the format exactly (including trailing
/// garbage) is rejected, matching the original's all-or-nothing `strptime`
/// check.
pub fn parse_if_modified_since(value: &str) -> Option<i64> {
    let parsed = DateTime::parse_from_str(value, IF_MODIFIED_SINCE_FORMAT).ok()?;
    Some(parsed.with_timezone(&Utc).timestamp())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub from: Option<u64>,
    pub to: Option<u64>,
}

/// Parses a `Range` header value. Only the single-range `bytes=` syntax is
/// understood: `N-M`, `-M` (suffix range), or `N-` (open-ended). Anything
/// else -- multiple ranges, a different unit, malformed numbers -- yields
/// `None` for both endpoints, matching the original's lenient fallback
/// (an unparseable Range header is simply ignored, not a 400).
pub fn parse_range(value: &str) -> ByteRange {
    let rest = match value.strip_prefix("bytes=") {
        Some(r) => r,
        None => return ByteRange { from: None, to: None },
    };
    if rest.contains(',') {
        return ByteRange { from: None, to: None };
    }

    let (from_str, to_str) = match rest.split_once('-') {
        Some(parts) => parts,
        None => return ByteRange { from: None, to: None },
    };
    let from_str = from_str.trim();
    let to_str = to_str.trim();

    if from_str.is_empty() {
        match to_str.parse::<u64>() {
            Ok(suffix) => ByteRange {
                from: None,
                to: Some(suffix),
            },
            Err(_) => ByteRange { from: None, to: None },
        }
    } else {
        let from = match from_str.parse::<u64>() {
            Ok(n) => n,
            Err(_) => return ByteRange { from: None, to: None },
        };
        if to_str.is_empty() {
            ByteRange {
                from: Some(from),
                to: None,
            }
        } else {
            match to_str.parse::<u64>() {
                Ok(to) => ByteRange {
                    from: Some(from),
                    to: Some(to),
                },
                Err(_) => ByteRange { from: None, to: None },
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcceptedEncodings {
    pub deflate: bool,
    pub gzip: bool,
}

/// Scans a comma-separated `Accept-Encoding` value for the `deflate` and
/// `gzip` tokens, tolerating an optional leading space on each token (the
/// original checks both `"defl"`/`" def"` and `"gzip"`/`" gzi"` four-byte
/// tags so it need not trim each token first).
pub fn parse_accept_encoding(value: &str) -> AcceptedEncodings {
    let bytes = value.as_bytes();
    let mut out = AcceptedEncodings::default();
    let mut start = 0usize;

    for (i, &b) in bytes.iter().enumerate() {
        if b == b',' {
            scan_token(&bytes[start..i], &mut out);
            start = i + 1;
        }
    }
    scan_token(&bytes[start..], &mut out);

    out
}

fn scan_token(token: &[u8], out: &mut AcceptedEncodings) {
    if match4(token, b"defl") || match4(token, b" def") {
        out.deflate = true;
    }
    if match4(token, b"gzip") || match4(token, b" gzi") {
        out.gzip = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_if_modified_since() {
        let ts = parse_if_modified_since("Sun, 06 Nov 1994 08:49:37 GMT").unwrap();
        assert_eq!(ts, 784111777);
    }

    #[test]
    fn rejects_other_date_formats() {
        assert!(parse_if_modified_since("Sunday, 06-Nov-94 08:49:37 GMT").is_none());
        assert!(parse_if_modified_since("garbage").is_none());
    }

    #[test]
    fn range_both_endpoints() {
        assert_eq!(
            parse_range("bytes=100-199"),
            ByteRange {
                from: Some(100),
                to: Some(199)
            }
        );
    }

    #[test]
    fn range_suffix_only() {
        assert_eq!(
            parse_range("bytes=-500"),
            ByteRange {
                from: None,
                to: Some(500)
            }
        );
    }

    #[test]
    fn range_open_ended() {
        assert_eq!(
            parse_range("bytes=100-"),
            ByteRange {
                from: Some(100),
                to: None
            }
        );
    }

    #[test]
    fn range_unparseable_is_both_none() {
        assert_eq!(
            parse_range("words=100-199"),
            ByteRange { from: None, to: None }
        );
        assert_eq!(
            parse_range("bytes=1-2,3-4"),
            ByteRange { from: None, to: None }
        );
    }

    #[test]
    fn accept_encoding_both() {
        let got = parse_accept_encoding("gzip, deflate");
        assert_eq!(got, AcceptedEncodings { deflate: true, gzip: true });
    }

    #[test]
    fn accept_encoding_neither() {
        let got = parse_accept_encoding("br, identity");
        assert_eq!(got, AcceptedEncodings::default());
    }
}
