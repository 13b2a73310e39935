//! Request-line and path parsing: method, path, query, fragment, and HTTP
//! version token. Grounded directly on `identify_http_method` /
//! `identify_http_path` / `parse_fragment_and_query` in
//! `original_source/common/lwan-request.c`.

use crate::bytes_util::match4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
        }
    }
}

/// The minimum viable request line: `"/ HTTP/1.0"`.
const MINIMAL_REQUEST_LINE_LEN: usize = b"/ HTTP/1.0".len();

/// `sizeof("HTTP/X.X")` in the original C, i.e. 8 characters of version
/// token plus the space that precedes them counted from the back -- see
/// `identify_http_path`'s `end_of_line - sizeof("HTTP/X.X")`.
const VERSION_TOKEN_WITH_LEADING_SPACE: usize = "HTTP/X.X".len() + 1;

pub struct RequestLine<'a> {
    pub method: Method,
    pub url: &'a str,
    pub query: Option<&'a str>,
    pub fragment: Option<&'a str>,
    /// 0 for HTTP/1.0, 1 for HTTP/1.1 (or any non-'0' minor digit, matching
    /// the original's lenient "assume 1.1 unless the minor digit is
    /// literally '0'" behavior).
    pub http_minor: u8,
    /// Number of bytes of `data` consumed by the request line, i.e. the
    /// offset of the first header byte.
    pub consumed: usize,
    /// Offset of `url` from the start of the slice passed to
    /// [`parse_request_line`] -- callers that need to mutate the raw URL
    /// bytes in place (percent-decoding) use this to re-derive an absolute
    /// position instead of holding onto `url` across a reborrow.
    pub url_offset: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RequestLineError {
    UnknownMethod,
    Malformed,
}

/// Splits a raw URL (as it appeared on the wire, not yet percent-decoded)
/// into its path, query, and fragment parts, matching
/// `parse_fragment_and_query`'s order in the original: the fragment is
/// split off first (searching from the right, since a literal `#` can't
/// appear in a query value either), then the query is split off what
/// remains. Reused both for the initial request line and for handler-driven
/// URL rewrites, which re-run the same split over the rewritten URL.
pub fn split_fragment_and_query(raw_url: &str) -> (&str, Option<&str>, Option<&str>) {
    let (url_no_fragment, fragment) = match raw_url.rfind('#') {
        Some(i) => (&raw_url[..i], Some(&raw_url[i + 1..])),
        None => (raw_url, None),
    };
    let (url, query) = match url_no_fragment.find('?') {
        Some(i) => (&url_no_fragment[..i], Some(&url_no_fragment[i + 1..])),
        None => (url_no_fragment, None),
    };
    (url, query, fragment)
}

/// Matches the method token at the start of `data` and returns it along
/// with the number of bytes consumed (method + following space).
fn parse_method(data: &[u8]) -> Result<(Method, usize), RequestLineError> {
    if match4(data, b"GET ") {
        return Ok((Method::Get, 4));
    }
    if match4(data, b"HEAD") && data.len() > 4 && data[4] == b' ' {
        return Ok((Method::Head, 5));
    }
    if match4(data, b"POST") && data.len() > 4 && data[4] == b' ' {
        return Ok((Method::Post, 5));
    }
    Err(RequestLineError::UnknownMethod)
}

/// Parses the request line starting at `data[0]` (leading whitespace must
/// already have been skipped by the caller, matching
/// `ignore_leading_whitespace` preceding `identify_http_method` in the
/// original).
pub fn parse_request_line(data: &[u8]) -> Result<RequestLine<'_>, RequestLineError> {
    let (method, method_len) = parse_method(data)?;
    let rest = &data[method_len..];

    let cr_pos = rest
        .iter()
        .position(|&b| b == b'\r')
        .ok_or(RequestLineError::Malformed)?;
    if cr_pos < MINIMAL_REQUEST_LINE_LEN {
        return Err(RequestLineError::Malformed);
    }

    let space = cr_pos
        .checked_sub(VERSION_TOKEN_WITH_LEADING_SPACE)
        .ok_or(RequestLineError::Malformed)?;

    if rest.get(space + 1) != Some(&b'H') {
        return Err(RequestLineError::Malformed);
    }
    if rest.get(space + 6) != Some(&b'1') {
        return Err(RequestLineError::Malformed);
    }
    let http_minor = if rest.get(space + 8) == Some(&b'0') { 0 } else { 1 };

    if rest.first() != Some(&b'/') {
        return Err(RequestLineError::Malformed);
    }

    let raw_url =
        std::str::from_utf8(&rest[..space]).map_err(|_| RequestLineError::Malformed)?;

    let (url, query, fragment) = split_fragment_and_query(raw_url);

    Ok(RequestLine {
        method,
        url,
        query,
        fragment,
        http_minor,
        consumed: method_len + cr_pos + 2,
        url_offset: method_len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_get() {
        let line = parse_request_line(b"GET /hello HTTP/1.1\r\nHost: a\r\n\r\n").unwrap();
        assert_eq!(line.method, Method::Get);
        assert_eq!(line.url, "/hello");
        assert_eq!(line.query, None);
        assert_eq!(line.fragment, None);
        assert_eq!(line.http_minor, 1);
        assert_eq!(&b"GET /hello HTTP/1.1\r\nHost: a\r\n\r\n"[line.consumed..], b"Host: a\r\n\r\n");
    }

    #[test]
    fn query_string() {
        let line = parse_request_line(b"GET /hello?x=1&y=2 HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(line.url, "/hello");
        assert_eq!(line.query, Some("x=1&y=2"));
    }

    #[test]
    fn http_1_0() {
        let line = parse_request_line(b"GET / HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(line.http_minor, 0);
    }

    #[test]
    fn head_and_post() {
        assert_eq!(
            parse_request_line(b"HEAD / HTTP/1.1\r\n\r\n").unwrap().method,
            Method::Head
        );
        assert_eq!(
            parse_request_line(b"POST / HTTP/1.1\r\n\r\n").unwrap().method,
            Method::Post
        );
    }

    #[test]
    fn unknown_method() {
        assert_eq!(
            parse_request_line(b"PUT / HTTP/1.1\r\n\r\n").unwrap_err(),
            RequestLineError::UnknownMethod
        );
    }

    #[test]
    fn malformed_missing_leading_slash() {
        assert_eq!(
            parse_request_line(b"GET foo HTTP/1.1\r\n\r\n").unwrap_err(),
            RequestLineError::Malformed
        );
    }

    #[test]
    fn malformed_bad_version() {
        assert_eq!(
            parse_request_line(b"GET / HTTP/2.0\r\n\r\n").unwrap_err(),
            RequestLineError::Malformed
        );
    }

    #[test]
    fn fragment_before_query_scan() {
        let line = parse_request_line(b"GET /#frag?notquery HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(line.url, "/");
        assert_eq!(line.fragment, Some("frag?notquery"));
        assert_eq!(line.query, None);
    }

    #[test]
    fn too_short_request_line_is_malformed() {
        assert_eq!(parse_request_line(b"GET / H\r\n").unwrap_err(), RequestLineError::Malformed);
    }
}
