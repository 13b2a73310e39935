//! Header block parser: a single forward scan dispatching on 4-byte header
//! name prefixes, grounded on the `MATCH_HEADER`/`STRING_SWITCH_L` dispatch
//! in `original_source/common/lwan-request.c` (lines ~518-560). Unknown
//! headers are tolerated by skipping to the next `\n`; this crate only
//! records the small fixed set of headers the driver actually needs.

use crate::bytes_util::match4;

#[derive(Debug, Default)]
pub struct HeaderSlices<'a> {
    pub accept_encoding: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub content_length: Option<&'a str>,
    pub authorization: Option<&'a str>,
    /// Lowercased first byte of the `Connection` header value: `b'k'`
    /// (keep-alive), `b'c'` (close), or absent.
    pub connection_tag: Option<u8>,
    pub cookie: Option<&'a str>,
    pub if_modified_since: Option<&'a str>,
    pub range: Option<&'a str>,
}

#[derive(Debug)]
pub struct ParsedHeaders<'a> {
    pub headers: HeaderSlices<'a>,
    /// Offset, relative to the start of the header block, of the first byte
    /// after the blank line terminating it (i.e. where a body would begin,
    /// or where the next pipelined request head starts).
    pub consumed: usize,
}

/// Parses the header block starting right after the request line's CRLF.
/// Returns `None` only if the end of the header block (a blank line) is
/// never found within `data` -- the caller should treat that as "need more
/// bytes" (handled upstream by the socket reader's framing, not by this
/// function).
pub fn parse_headers(data: &[u8]) -> Option<ParsedHeaders<'_>> {
    let mut headers = HeaderSlices::default();
    let mut p = 0usize;

    loop {
        if data.len() - p < 2 {
            return None;
        }
        if &data[p..p + 2] == b"\r\n" {
            return Some(ParsedHeaders {
                headers,
                consumed: p + 2,
            });
        }

        let line = &data[p..];

        let (field, name_len): (Field, usize) = if match4(line, b"Acce") {
            if line.len() >= 10 && match4(&line[6..], b"-Enc") {
                (Field::AcceptEncoding, "Accept-Encoding".len())
            } else {
                p = skip_line(data, p);
                continue;
            }
        } else if match4(line, b"Auth") {
            (Field::Authorization, "Authorization".len())
        } else if match4(line, b"Conn") {
            (Field::Connection, "Connection".len())
        } else if match4(line, b"Cont") {
            if line.len() >= 11 && match4(&line[7..], b"-Typ") {
                (Field::ContentType, "Content-Type".len())
            } else if line.len() >= 11 && match4(&line[7..], b"-Len") {
                (Field::ContentLength, "Content-Length".len())
            } else {
                p = skip_line(data, p);
                continue;
            }
        } else if match4(line, b"Cook") {
            (Field::Cookie, "Cookie".len())
        } else if match4(line, b"If-M") {
            (Field::IfModifiedSince, "If-Modified-Since".len())
        } else if match4(line, b"Rang") {
            (Field::Range, "Range".len())
        } else {
            p = skip_line(data, p);
            continue;
        };

        match parse_header_value(line, name_len) {
            Some((value, line_len)) => {
                store(&mut headers, field, value);
                p += line_len;
            }
            None => {
                p = skip_line(data, p);
            }
        }
    }
}

enum Field {
    AcceptEncoding,
    ContentType,
    ContentLength,
    Authorization,
    Connection,
    Cookie,
    IfModifiedSince,
    Range,
}

fn store<'a>(headers: &mut HeaderSlices<'a>, field: Field, value: &'a str) {
    match field {
        Field::AcceptEncoding => headers.accept_encoding = Some(value),
        Field::ContentType => headers.content_type = Some(value),
        Field::ContentLength => headers.content_length = Some(value),
        Field::Authorization => headers.authorization = Some(value),
        Field::Connection => {
            headers.connection_tag = value.as_bytes().first().map(|b| b.to_ascii_lowercase());
        }
        Field::Cookie => headers.cookie = Some(value),
        Field::IfModifiedSince => headers.if_modified_since = Some(value),
        Field::Range => headers.range = Some(value),
    }
}

/// After the header name, expects `": "`, then a value terminated by
/// `\r\n`. Returns `(value, total line length including the terminator)`.
fn parse_header_value(line: &[u8], name_len: usize) -> Option<(&str, usize)> {
    if line.len() < name_len + 2 || &line[name_len..name_len + 2] != b": " {
        return None;
    }
    let value_start = name_len + 2;
    let cr = value_start + line[value_start..].iter().position(|&b| b == b'\r')?;
    if line.get(cr + 1) != Some(&b'\n') {
        return None;
    }
    let value = std::str::from_utf8(&line[value_start..cr]).ok()?;
    Some((value, cr + 2))
}

/// Advances past the current (unknown or malformed) line, returning the
/// offset of the byte after the next `\n`, or the end of the buffer if none
/// is found.
fn skip_line(data: &[u8], from: usize) -> usize {
    match data[from..].iter().position(|&b| b == b'\n') {
        Some(i) => from + i + 1,
        None => data.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_recognized_headers() {
        let data = b"Host: example.com\r\nAccept-Encoding: gzip, deflate\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 7\r\nConnection: keep-alive\r\n\r\nbody...";
        let parsed = parse_headers(data).unwrap();
        assert_eq!(parsed.headers.accept_encoding, Some("gzip, deflate"));
        assert_eq!(
            parsed.headers.content_type,
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(parsed.headers.content_length, Some("7"));
        assert_eq!(parsed.headers.connection_tag, Some(b'k'));
        assert_eq!(&data[parsed.consumed..], b"body...");
    }

    #[test]
    fn unknown_headers_are_skipped_tolerantly() {
        let data = b"X-Custom: whatever\r\nCookie: a=1\r\n\r\n";
        let parsed = parse_headers(data).unwrap();
        assert_eq!(parsed.headers.cookie, Some("a=1"));
    }

    #[test]
    fn malformed_header_line_is_skipped() {
        let data = b"Cookie withoutcolon\r\nRange: bytes=0-10\r\n\r\n";
        let parsed = parse_headers(data).unwrap();
        assert_eq!(parsed.headers.cookie, None);
        assert_eq!(parsed.headers.range, Some("bytes=0-10"));
    }

    #[test]
    fn incomplete_header_block_returns_none() {
        assert!(parse_headers(b"Host: example.com\r\n").is_none());
    }

    #[test]
    fn empty_header_block() {
        let parsed = parse_headers(b"\r\n").unwrap();
        assert_eq!(parsed.consumed, 2);
        assert_eq!(parsed.headers.cookie, None);
    }

    #[test]
    fn if_modified_since_and_authorization() {
        let data = b"If-Modified-Since: Sun, 06 Nov 1994 08:49:37 GMT\r\nAuthorization: Basic abc\r\n\r\n";
        let parsed = parse_headers(data).unwrap();
        assert_eq!(
            parsed.headers.if_modified_since,
            Some("Sun, 06 Nov 1994 08:49:37 GMT")
        );
        assert_eq!(parsed.headers.authorization, Some("Basic abc"));
    }
}
