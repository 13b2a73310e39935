//! The dispatch driver: orchestrates every other component exactly once
//! per request, in the order `lwan_process_request` does in
//! `original_source/common/lwan-request.c` -- frame bytes, parse the
//! request line and headers, compute keep-alive, look up a handler by
//! longest URL prefix, run the handler's declared semantic parsers, invoke
//! it, and loop while it asks for an internal rewrite.
//!
//! Every header value the C original reads straight out of its single
//! mutable buffer is copied out to an owned `String` the moment header
//! parsing returns. That's not free, but it's the one place this port
//! can't keep the original's "one buffer, raw pointers into it" shape:
//! Rust won't let the immutable borrow `parse_headers` returns coexist
//! with the `&mut` borrow URL percent-decoding and form/cookie decoding
//! need. The request path is percent-decoded in place in the connection
//! buffer (the one region this driver mutates directly, matching the
//! original), then copied out to an owned `String` for the same reason:
//! the rewrite loop below needs `&mut conn` on every pass, which can't
//! coexist with a borrow of `conn.buffer` that has to outlive the whole
//! loop. See `SPEC_FULL.md` §9 and `DESIGN.md`.

use tracing::{debug, warn};

use bytes::Bytes;
use futures::io::AsyncRead;

use crate::auth::Authorizer;
use crate::body_reader::{self, BodyOutcome};
use crate::bytes_util::url_decode;
use crate::connection::Connection;
use crate::error::Result;
use crate::handler::Handler;
use crate::header_parser::parse_headers;
use crate::kv_list::parse_kv_list;
use crate::proxy::{self, ProxyParseResult};
use crate::request::{Request, RequestFlags};
use crate::request_line::{
    parse_request_line, split_fragment_and_query, Method, RequestLineError,
};
use crate::response::ResponseSink;
use crate::semantic::{parse_accept_encoding, parse_if_modified_since, parse_range};
use crate::socket_reader::{read_request_head, ReadOutcome, RequestHeadFinalizer};
use crate::status_code::{self, StatusCode};
use crate::trie::Router;

#[derive(Debug, PartialEq, Eq)]
pub enum NextRequest {
    /// Process another request on this connection; any pipelined tail is
    /// already resident at the front of the buffer.
    Continue,
    /// The connection should be closed: either the client asked not to be
    /// kept alive, or a terminal socket/parse condition occurred.
    Close,
}

/// The no-op decoder used for cookie pairs, which the original never
/// percent-decodes (see `lwan_request_get_cookie`).
fn identity_decode(buf: &mut [u8]) -> Option<usize> {
    Some(buf.len())
}

/// Drives exactly one pipelined request to completion on `conn`.
pub async fn process_request<R>(
    conn: &mut Connection<R>,
    router: &dyn Router,
    authorizer: &dyn Authorizer,
    response: &mut dyn ResponseSink,
) -> Result<NextRequest>
where
    R: AsyncRead + Unpin,
{
    let pending = conn.buffer.pending();
    let mut finalizer = RequestHeadFinalizer::new(pending > 0);
    let buffer_size = conn.buffer.capacity();

    let total_read = {
        let slice = conn.buffer.as_mut_slice();
        match read_request_head(&mut conn.stream, slice, pending, &conn.config, &mut finalizer)
            .await
        {
            ReadOutcome::Ready { total_read } => total_read,
            ReadOutcome::PeerClosed | ReadOutcome::Aborted => return Ok(NextRequest::Close),
            ReadOutcome::BadRequest => {
                response.set_keep_alive(false);
                response.default_response(status_code::BAD_REQUEST);
                return Ok(NextRequest::Close);
            }
            ReadOutcome::TooLarge => {
                response.set_keep_alive(false);
                response.default_response(status_code::PAYLOAD_TOO_LARGE);
                return Ok(NextRequest::Close);
            }
            ReadOutcome::TimedOut => {
                response.set_keep_alive(false);
                response.default_response(status_code::REQUEST_TIMEOUT);
                return Ok(NextRequest::Close);
            }
        }
    };
    conn.buffer.clear_pending();

    // --- Phase 1: PROXY preamble + request line, against a short-lived
    // immutable borrow. Every value we keep past this block is either
    // `Copy` or has already been copied into an owned `String`.
    let mut cursor = 0usize;
    let mut proxy_addr = None;
    if conn.config.allow_proxy_protocol {
        let data = &conn.buffer.as_slice()[..total_read];
        match proxy::parse(data) {
            ProxyParseResult::NoPreamble => {}
            ProxyParseResult::Malformed => {
                warn!("malformed PROXY-protocol preamble");
                return fail(conn, response, status_code::BAD_REQUEST, total_read, None);
            }
            ProxyParseResult::Matched { addr, consumed } => {
                proxy_addr = Some(addr);
                cursor += consumed;
            }
        }
    }

    let (method, http_1_0, url_start, url_len, fragment_owned, query_owned, after_request_line) = {
        let data = &conn.buffer.as_slice()[..total_read];
        match parse_request_line(&data[cursor..]) {
            Ok(line) => (
                line.method,
                line.http_minor == 0,
                cursor + line.url_offset,
                line.url.len(),
                line.fragment.map(|s| s.to_string()),
                line.query.map(|s| s.to_string()),
                cursor + line.consumed,
            ),
            Err(RequestLineError::UnknownMethod) => {
                return fail(conn, response, status_code::METHOD_NOT_ALLOWED, total_read, None);
            }
            Err(RequestLineError::Malformed) => {
                return fail(conn, response, status_code::BAD_REQUEST, total_read, None);
            }
        }
    };

    // --- Phase 2: headers, against another short-lived immutable borrow.
    // Every field of `HeaderSlices` we still need is copied out to an
    // owned value before this block ends; `connection_tag` is `Copy` and
    // needs no copying.
    let (
        body_start,
        connection_tag,
        accept_encoding_owned,
        content_type_owned,
        content_length_owned,
        authorization_owned,
        cookie_owned,
        if_modified_since_owned,
        range_owned,
    ) = {
        let data = &conn.buffer.as_slice()[..total_read];
        match parse_headers(&data[after_request_line..]) {
            Some(h) => (
                after_request_line + h.consumed,
                h.headers.connection_tag,
                h.headers.accept_encoding.map(|s| s.to_string()),
                h.headers.content_type.map(|s| s.to_string()),
                h.headers.content_length.map(|s| s.to_string()),
                h.headers.authorization.map(|s| s.to_string()),
                h.headers.cookie.map(|s| s.to_string()),
                h.headers.if_modified_since.map(|s| s.to_string()),
                h.headers.range.map(|s| s.to_string()),
            ),
            None => {
                return fail(conn, response, status_code::BAD_REQUEST, total_read, None);
            }
        }
    };

    let is_keep_alive = if http_1_0 {
        connection_tag == Some(b'k')
    } else {
        connection_tag != Some(b'c')
    };
    conn.keep_alive = is_keep_alive;
    response.set_keep_alive(conn.keep_alive);

    // --- Phase 3: the POST body, if any. Resident bytes are copied out
    // (undecoded) so each dispatch-loop iteration below can percent-decode
    // its own fresh copy without fighting over a single mutable region.
    let body_owned: Option<Bytes> = match method {
        Method::Post => {
            match body_reader::frame_body(
                &conn.buffer.as_slice()[..total_read],
                buffer_size,
                body_start,
                content_length_owned.as_deref(),
            ) {
                BodyOutcome::Empty => None,
                BodyOutcome::Resident { body } => Some(Bytes::copy_from_slice(body)),
                BodyOutcome::Malformed => {
                    return fail(conn, response, status_code::BAD_REQUEST, total_read, Some(body_start));
                }
                BodyOutcome::TooLarge => {
                    return fail(
                        conn,
                        response,
                        status_code::PAYLOAD_TOO_LARGE,
                        total_read,
                        Some(body_start),
                    );
                }
                BodyOutcome::NotImplemented => {
                    return fail(
                        conn,
                        response,
                        status_code::NOT_IMPLEMENTED,
                        total_read,
                        Some(body_start),
                    );
                }
            }
        }
        _ => None,
    };
    let next_request_offset = body_start + body_owned.as_ref().map_or(0, |b| b.len());

    // --- Phase 4: percent-decode the request path in place. This is the
    // one region the dispatch driver mutates directly in the connection
    // buffer, matching the original's in-place decode (`SPEC_FULL.md` §9).
    let decoded_len = {
        let region = &mut conn.buffer.as_mut_slice()[url_start..url_start + url_len];
        match url_decode(region) {
            Some(n) => n,
            None => {
                return fail(
                    conn,
                    response,
                    status_code::BAD_REQUEST,
                    total_read,
                    Some(next_request_offset),
                )
            }
        }
    };
    // Copied out to an owned `String` rather than kept as a view into
    // `conn.buffer`: the rewrite loop below needs `&mut conn` on every
    // iteration (`record_rewrite`, `finish`'s `carry_tail`), and the path
    // has to stay readable across all of them, not just the one where it's
    // first produced. Everything else this function reads out of the
    // buffer (headers, fragment, query) is copied out the same way the
    // moment its parsing phase returns; see the module comment.
    let initial_url = match std::str::from_utf8(&conn.buffer.as_slice()[url_start..url_start + decoded_len]) {
        Ok(s) => s.to_string(),
        Err(_) => {
            return fail(
                conn,
                response,
                status_code::BAD_REQUEST,
                total_read,
                Some(next_request_offset),
            )
        }
    };

    debug!(method = method.as_str(), url = initial_url.as_str(), "dispatching request");

    conn.reset_rewrite_count();

    // Owned URLs a handler rewrites to. Kept alive for the rest of the
    // function so each rewritten `Request` can borrow straight out of it,
    // the same way the first iteration borrows out of `initial_url`.
    let mut rewrite_store: Vec<String> = Vec::new();

    loop {
        let (url, query_raw, fragment_raw): (&str, Option<&str>, Option<&str>) =
            match rewrite_store.last() {
                Some(owned) => split_fragment_and_query(owned.as_str()),
                None => (initial_url.as_str(), query_owned.as_deref(), fragment_owned.as_deref()),
            };

        let entry = match router.lookup_prefix(url) {
            Some(entry) => entry,
            None => {
                response.default_response(status_code::NOT_FOUND);
                return finish(conn, total_read, next_request_offset);
            }
        };
        let flags = entry.flags;

        if method == Method::Post && !flags.parse_post_data {
            response.default_response(status_code::METHOD_NOT_ALLOWED);
            return finish(conn, total_read, next_request_offset);
        }

        // Owned scratch copies this iteration decodes in place. Declared
        // before `request` so they outlive it (Rust drops locals in
        // reverse declaration order).
        let mut query_buf: Vec<u8> = if flags.parse_query_string {
            query_raw.map(|q| q.as_bytes().to_vec()).unwrap_or_default()
        } else {
            Vec::new()
        };
        let mut cookie_buf: Vec<u8> = if flags.parse_cookies {
            cookie_owned.as_deref().map(|c| c.as_bytes().to_vec()).unwrap_or_default()
        } else {
            Vec::new()
        };
        let mut post_buf: Vec<u8> = if flags.parse_post_data {
            body_owned.as_deref().map(|b| b.to_vec()).unwrap_or_default()
        } else {
            Vec::new()
        };

        let mut request = Request::new(
            method,
            url,
            fragment_raw,
            RequestFlags {
                http_1_0,
                proxied: proxy_addr.is_some(),
                accept_gzip: false,
                accept_deflate: false,
                url_rewritten: false,
            },
            conn.peer_addr,
        );
        request.proxy = proxy_addr;
        request.content_type = content_type_owned.as_deref();
        request.authorization = authorization_owned.as_deref();

        request.url = if flags.remove_leading_slash {
            request.url[entry.prefix.len()..].trim_start_matches('/')
        } else {
            &request.url[entry.prefix.len()..]
        };

        if flags.parse_query_string && !query_buf.is_empty() {
            request.query_params = parse_kv_list(&mut query_buf, b'&', url_decode);
        }
        if flags.parse_cookies && !cookie_buf.is_empty() {
            request.cookies = parse_kv_list(&mut cookie_buf, b';', identity_decode);
        }
        if flags.parse_post_data && !post_buf.is_empty() {
            request.post_data = parse_kv_list(&mut post_buf, b'&', url_decode);
        }
        if flags.parse_accept_encoding {
            if let Some(ae) = accept_encoding_owned.as_deref() {
                let encs = parse_accept_encoding(ae);
                request.flags.accept_gzip = encs.gzip;
                request.flags.accept_deflate = encs.deflate;
            }
        }
        if flags.parse_if_modified_since {
            if let Some(v) = if_modified_since_owned.as_deref() {
                request.if_modified_since = parse_if_modified_since(v);
            }
        }
        if flags.parse_range {
            if let Some(v) = range_owned.as_deref() {
                request.range = Some(parse_range(v));
            }
        }

        if flags.must_authorize {
            let creds = request.authorization.unwrap_or("").as_bytes();
            if !authorizer.authorize(creds, entry.prefix.as_str()) {
                response.default_response(status_code::UNAUTHORIZED);
                return finish(conn, total_read, next_request_offset);
            }
        }

        entry.handler.handle(&mut request, response, authorizer).await;

        let wants_rewrite = request.flags.url_rewritten && flags.can_rewrite_url;
        let rewritten = request.rewritten_url.take();

        if wants_rewrite {
            match rewritten {
                Some(new_url) => {
                    if !conn.record_rewrite() {
                        response.default_response(status_code::INTERNAL_SERVER_ERROR);
                        return finish(conn, total_read, next_request_offset);
                    }
                    rewrite_store.push(new_url);
                    continue;
                }
                None => break,
            }
        }

        break;
    }

    finish(conn, total_read, next_request_offset)
}

/// Closes out a request that parsed, routed, and ran cleanly (possibly
/// with a handler-declared error status): carries over any pipelined tail
/// and honors whatever keep-alive `Connection`/HTTP version implied.
fn finish<R>(conn: &mut Connection<R>, total_read: usize, next_request_offset: usize) -> Result<NextRequest>
where
    R: AsyncRead + Unpin,
{
    conn.buffer.carry_tail(next_request_offset, total_read);
    if conn.keep_alive {
        Ok(NextRequest::Continue)
    } else {
        Ok(NextRequest::Close)
    }
}

/// Closes out a request that failed to parse. `next_request_offset` mirrors
/// the original's `helper->next_request`: it's only ever set once the header
/// block's terminating blank line has actually been found, so a failure
/// before that point (a bad PROXY preamble, a malformed request line, or a
/// header block that never closes) passes `None` here -- the exact byte
/// where the next request would start is unknowable, so pipelining is
/// abandoned and the connection is closed. A failure discovered after
/// headers parsed (a malformed/oversized POST body, a bad percent-escape in
/// the path) passes the already-known boundary, and -- per `SPEC_FULL.md`
/// §4.I ("a bad request with a pipelined tail is not surfaced to the
/// client; the driver simply returns the tail") -- the response is still
/// sent, but the connection carries on to the next pipelined request
/// instead of closing, exactly as `lwan_process_request`'s `goto out` does
/// regardless of the status it's handed.
fn fail<R>(
    conn: &mut Connection<R>,
    response: &mut dyn ResponseSink,
    status: StatusCode,
    total_read: usize,
    next_request_offset: Option<usize>,
) -> Result<NextRequest>
where
    R: AsyncRead + Unpin,
{
    if next_request_offset.is_none() {
        conn.keep_alive = false;
    }
    response.set_keep_alive(conn.keep_alive);
    response.default_response(status);
    match next_request_offset {
        Some(offset) => finish(conn, total_read, offset),
        None => {
            conn.buffer.carry_tail(total_read, total_read);
            Ok(NextRequest::Close)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use futures::io::Cursor;

    use super::*;
    use crate::auth::DenyAll;
    use crate::config::Config;
    use crate::handler::Handler;
    use crate::request::Request;
    use crate::response::RecordingResponseSink;
    use crate::status_code;
    use crate::trie::{HandlerEntry, HandlerFlags, PrefixRouter};

    /// Records whatever a test cares about from the `Request` it's handed,
    /// and optionally triggers a handler-initiated rewrite.
    #[derive(Default)]
    struct Captured {
        url: String,
        query: Option<String>,
        post: Option<String>,
        cookie: Option<String>,
        range: Option<crate::semantic::ByteRange>,
        remote: Option<std::net::SocketAddr>,
        invocations: u32,
    }

    struct RecordingHandler {
        captured: Arc<Mutex<Captured>>,
        rewrite_to: Option<String>,
    }

    #[async_trait]
    impl Handler for RecordingHandler {
        async fn handle(
            &self,
            request: &mut Request<'_>,
            response: &mut dyn ResponseSink,
            _authorizer: &dyn Authorizer,
        ) {
            let mut c = self.captured.lock().unwrap();
            c.url = request.url.to_string();
            c.query = request.query_param("x").map(|s| s.to_string());
            c.post = request.post_param("a").map(|s| s.to_string());
            c.cookie = request.cookie("session").map(|s| s.to_string());
            c.range = request.range;
            c.remote = request.remote_address();
            c.invocations += 1;
            drop(c);

            if let Some(target) = &self.rewrite_to {
                request.rewritten_url = Some(target.clone());
                request.flags.url_rewritten = true;
            }
            response.write_status(status_code::OK);
        }
    }

    fn entry(prefix: &str, flags: HandlerFlags, handler: RecordingHandler) -> HandlerEntry {
        HandlerEntry {
            prefix: prefix.to_string(),
            flags,
            handler: Arc::new(handler),
        }
    }

    fn all_parse_flags() -> HandlerFlags {
        HandlerFlags {
            parse_query_string: true,
            parse_if_modified_since: true,
            parse_range: true,
            parse_accept_encoding: true,
            parse_cookies: true,
            parse_post_data: true,
            must_authorize: false,
            remove_leading_slash: false,
            can_rewrite_url: true,
        }
    }

    async fn dispatch_once(
        data: &'static [u8],
        router: &dyn Router,
        config: Config,
    ) -> (NextRequest, RecordingResponseSink) {
        let mut conn = Connection::new(Cursor::new(data.to_vec()), config, None);
        let mut sink = RecordingResponseSink::new();
        let outcome = process_request(&mut conn, router, &DenyAll, &mut sink)
            .await
            .unwrap();
        (outcome, sink)
    }

    #[async_std::test]
    async fn scenario_query_params_and_keep_alive() {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let router = PrefixRouter::new(vec![entry(
            "/",
            all_parse_flags(),
            RecordingHandler { captured: captured.clone(), rewrite_to: None },
        )]);
        let (outcome, sink) = dispatch_once(
            b"GET /hello?x=1&y=2 HTTP/1.1\r\nHost: a\r\n\r\n",
            &router,
            Config::default(),
        )
        .await;

        assert_eq!(outcome, NextRequest::Continue);
        assert_eq!(sink.statuses, vec![status_code::OK]);
        assert_eq!(captured.lock().unwrap().query.as_deref(), Some("1"));
    }

    #[async_std::test]
    async fn scenario_percent_decoded_path_http_1_0_keep_alive() {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let router = PrefixRouter::new(vec![entry(
            "",
            all_parse_flags(),
            RecordingHandler { captured: captured.clone(), rewrite_to: None },
        )]);
        let (outcome, _sink) = dispatch_once(
            b"GET /p%20q HTTP/1.0\r\nConnection: keep-alive\r\n\r\n",
            &router,
            Config::default(),
        )
        .await;

        assert_eq!(outcome, NextRequest::Continue);
        assert_eq!(captured.lock().unwrap().url, "/p q");
    }

    #[async_std::test]
    async fn scenario_post_form_body() {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let router = PrefixRouter::new(vec![entry(
            "/",
            all_parse_flags(),
            RecordingHandler { captured: captured.clone(), rewrite_to: None },
        )]);
        let (outcome, _sink) = dispatch_once(
            b"POST /f HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 7\r\n\r\na=1&b=2",
            &router,
            Config::default(),
        )
        .await;

        assert_eq!(outcome, NextRequest::Continue);
        assert_eq!(captured.lock().unwrap().post.as_deref(), Some("1"));
    }

    #[async_std::test]
    async fn scenario_range_header() {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let router = PrefixRouter::new(vec![entry(
            "/",
            all_parse_flags(),
            RecordingHandler { captured: captured.clone(), rewrite_to: None },
        )]);
        let (outcome, _sink) = dispatch_once(
            b"GET /x HTTP/1.1\r\nRange: bytes=100-199\r\n\r\n",
            &router,
            Config::default(),
        )
        .await;

        assert_eq!(outcome, NextRequest::Continue);
        let range = captured.lock().unwrap().range.unwrap();
        assert_eq!(range.from, Some(100));
        assert_eq!(range.to, Some(199));
    }

    #[async_std::test]
    async fn scenario_proxy_protocol_sets_remote_address() {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let router = PrefixRouter::new(vec![entry(
            "/",
            all_parse_flags(),
            RecordingHandler { captured: captured.clone(), rewrite_to: None },
        )]);
        let config = Config { allow_proxy_protocol: true, ..Config::default() };
        let (outcome, _sink) = dispatch_once(
            b"PROXY TCP4 1.2.3.4 5.6.7.8 1111 80\r\nGET / HTTP/1.1\r\n\r\n",
            &router,
            config,
        )
        .await;

        assert_eq!(outcome, NextRequest::Continue);
        assert_eq!(
            captured.lock().unwrap().remote,
            Some("1.2.3.4:1111".parse().unwrap())
        );
    }

    #[async_std::test]
    async fn proxy_preamble_without_flag_is_an_invalid_request_not_spoofing() {
        // Not proxy-enabled: "PROXY ..." is just parsed as an ordinary
        // (unrecognized-method) request line, never as an address override.
        let captured = Arc::new(Mutex::new(Captured::default()));
        let router = PrefixRouter::new(vec![entry(
            "/",
            all_parse_flags(),
            RecordingHandler { captured: captured.clone(), rewrite_to: None },
        )]);
        let (outcome, sink) = dispatch_once(
            b"PROXY TCP4 1.2.3.4 5.6.7.8 1111 80\r\nGET / HTTP/1.1\r\n\r\n",
            &router,
            Config::default(),
        )
        .await;

        assert_eq!(outcome, NextRequest::Close);
        assert_eq!(sink.defaults, vec![status_code::METHOD_NOT_ALLOWED]);
        assert_eq!(captured.lock().unwrap().invocations, 0);
    }

    #[async_std::test]
    async fn fragment_before_query_scan() {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let router = PrefixRouter::new(vec![entry(
            "",
            all_parse_flags(),
            RecordingHandler { captured: captured.clone(), rewrite_to: None },
        )]);
        let (outcome, _sink) =
            dispatch_once(b"GET /#frag?notquery HTTP/1.1\r\n\r\n", &router, Config::default()).await;

        assert_eq!(outcome, NextRequest::Continue);
        assert_eq!(captured.lock().unwrap().url, "/");
    }

    #[async_std::test]
    async fn oversized_request_head_is_413() {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let router = PrefixRouter::new(vec![entry(
            "/",
            all_parse_flags(),
            RecordingHandler { captured: captured.clone(), rewrite_to: None },
        )]);
        let mut head = b"GET /".to_vec();
        head.extend(std::iter::repeat(b'a').take(4090));
        head.extend_from_slice(b" HTTP/1.1\r\n\r\n");
        assert!(head.len() > 4096);
        let config = Config::default();
        let mut conn = Connection::new(Cursor::new(head), config, None);
        let mut sink = RecordingResponseSink::new();
        let outcome = process_request(&mut conn, &router, &DenyAll, &mut sink)
            .await
            .unwrap();

        assert_eq!(outcome, NextRequest::Close);
        assert_eq!(sink.defaults, vec![status_code::PAYLOAD_TOO_LARGE]);
    }

    #[async_std::test]
    async fn no_matching_handler_is_404() {
        let router = PrefixRouter::new(vec![entry(
            "/api",
            all_parse_flags(),
            RecordingHandler { captured: Arc::new(Mutex::new(Captured::default())), rewrite_to: None },
        )]);
        let (outcome, sink) =
            dispatch_once(b"GET /elsewhere HTTP/1.1\r\n\r\n", &router, Config::default()).await;

        assert_eq!(outcome, NextRequest::Continue);
        assert_eq!(sink.defaults, vec![status_code::NOT_FOUND]);
    }

    #[async_std::test]
    async fn post_without_form_flag_is_405() {
        let flags = HandlerFlags { parse_post_data: false, ..all_parse_flags() };
        let router = PrefixRouter::new(vec![entry(
            "/",
            flags,
            RecordingHandler { captured: Arc::new(Mutex::new(Captured::default())), rewrite_to: None },
        )]);
        let (outcome, sink) = dispatch_once(
            b"POST /f HTTP/1.1\r\nContent-Length: 0\r\n\r\n",
            &router,
            Config::default(),
        )
        .await;

        assert_eq!(outcome, NextRequest::Continue);
        assert_eq!(sink.defaults, vec![status_code::METHOD_NOT_ALLOWED]);
    }

    #[async_std::test]
    async fn rewrite_is_followed_to_a_second_route() {
        let captured_old = Arc::new(Mutex::new(Captured::default()));
        let captured_new = Arc::new(Mutex::new(Captured::default()));
        let router = PrefixRouter::new(vec![
            entry(
                "/old",
                all_parse_flags(),
                RecordingHandler { captured: captured_old.clone(), rewrite_to: Some("/new".to_string()) },
            ),
            entry(
                "/new",
                all_parse_flags(),
                RecordingHandler { captured: captured_new.clone(), rewrite_to: None },
            ),
        ]);
        let (outcome, sink) =
            dispatch_once(b"GET /old HTTP/1.1\r\n\r\n", &router, Config::default()).await;

        assert_eq!(outcome, NextRequest::Continue);
        assert_eq!(sink.statuses, vec![status_code::OK]);
        assert_eq!(captured_old.lock().unwrap().invocations, 1);
        assert_eq!(captured_new.lock().unwrap().invocations, 1);
    }

    #[async_std::test]
    async fn rewrite_loop_past_cap_is_500() {
        let captured = Arc::new(Mutex::new(Captured::default()));
        // Always rewrites back to itself: every iteration re-matches "/loop"
        // and rewrites again, so the 5th attempt must trip the cap.
        let router = PrefixRouter::new(vec![entry(
            "/loop",
            all_parse_flags(),
            RecordingHandler { captured: captured.clone(), rewrite_to: Some("/loop".to_string()) },
        )]);
        let (outcome, sink) =
            dispatch_once(b"GET /loop HTTP/1.1\r\n\r\n", &router, Config::default()).await;

        assert_eq!(outcome, NextRequest::Continue);
        assert_eq!(sink.defaults, vec![status_code::INTERNAL_SERVER_ERROR]);
        // Initial invocation + 4 allowed rewrites = 5 handler calls.
        assert_eq!(captured.lock().unwrap().invocations, 5);
    }

    #[async_std::test]
    async fn pipelined_requests_share_one_read() {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let router = PrefixRouter::new(vec![entry(
            "",
            all_parse_flags(),
            RecordingHandler { captured: captured.clone(), rewrite_to: None },
        )]);
        let data: &'static [u8] =
            b"GET /first HTTP/1.1\r\n\r\nGET /second HTTP/1.1\r\n\r\n";
        let config = Config::default();
        let mut conn = Connection::new(Cursor::new(data.to_vec()), config, None);

        let mut sink = RecordingResponseSink::new();
        let first = process_request(&mut conn, &router, &DenyAll, &mut sink).await.unwrap();
        assert_eq!(first, NextRequest::Continue);
        assert_eq!(captured.lock().unwrap().url, "/first");

        // The underlying stream is already fully consumed by the first
        // call's single read; if the second call needed to read again it
        // would observe EOF and return `Close` instead of `Continue`,
        // proving the pipelined tail was served from the buffer alone.
        let mut sink2 = RecordingResponseSink::new();
        let second = process_request(&mut conn, &router, &DenyAll, &mut sink2).await.unwrap();
        assert_eq!(second, NextRequest::Continue);
        assert_eq!(captured.lock().unwrap().url, "/second");
    }

    #[async_std::test]
    async fn malformed_post_body_still_pipelines_the_tail() {
        // Headers parse fine, so the body's start is a known boundary even
        // though `Content-Length` itself doesn't parse; per SPEC_FULL.md
        // §4.I the bad request is answered but doesn't kill the pipeline.
        let captured = Arc::new(Mutex::new(Captured::default()));
        let router = PrefixRouter::new(vec![entry(
            "",
            all_parse_flags(),
            RecordingHandler { captured: captured.clone(), rewrite_to: None },
        )]);
        let data: &'static [u8] =
            b"POST /bad HTTP/1.1\r\nContent-Length: bogus\r\n\r\nGET /next HTTP/1.1\r\n\r\n";
        let config = Config::default();
        let mut conn = Connection::new(Cursor::new(data.to_vec()), config, None);

        let mut sink = RecordingResponseSink::new();
        let first = process_request(&mut conn, &router, &DenyAll, &mut sink).await.unwrap();
        assert_eq!(first, NextRequest::Continue);
        assert_eq!(sink.defaults, vec![status_code::BAD_REQUEST]);
        assert_eq!(captured.lock().unwrap().invocations, 0);

        let mut sink2 = RecordingResponseSink::new();
        let second = process_request(&mut conn, &router, &DenyAll, &mut sink2).await.unwrap();
        assert_eq!(second, NextRequest::Continue);
        assert_eq!(captured.lock().unwrap().url, "/next");
    }

    #[async_std::test]
    async fn malformed_request_line_with_no_known_boundary_closes() {
        // Unlike the body case above, nothing about the header block has
        // been located yet, so there's no tail to recover: the connection
        // closes even though more bytes happen to follow in the buffer.
        let router = PrefixRouter::new(vec![entry(
            "",
            all_parse_flags(),
            RecordingHandler {
                captured: Arc::new(Mutex::new(Captured::default())),
                rewrite_to: None,
            },
        )]);
        let (outcome, sink) = dispatch_once(
            b"GET HTTP/1.1\r\n\r\nGET /next HTTP/1.1\r\n\r\n",
            &router,
            Config::default(),
        )
        .await;

        assert_eq!(outcome, NextRequest::Close);
        assert_eq!(sink.defaults, vec![status_code::BAD_REQUEST]);
    }
}
