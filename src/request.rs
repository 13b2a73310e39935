//! The per-request object handed to handlers, and the transient parser
//! helper used while building one. Grounded on the `lwan_request_t` /
//! `request_parser_helper` structs in
//! `original_source/common/lwan-request.c`; the bitset of flags and the
//! sentinel-terminated C strings there become plain `bool`/`Option` fields
//! and borrowed `&str` slices here (see `SPEC_FULL.md` §3, §9).

use std::net::SocketAddr;

use crate::kv_list::KvList;
use crate::request_line::Method;
use crate::semantic::ByteRange;

/// Per-request flags, replacing the original's bitset. Grouped separately
/// from `Request` so the dispatch driver can flip `url_rewritten` without
/// holding a second mutable borrow of the parsed fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestFlags {
    pub http_1_0: bool,
    pub proxied: bool,
    pub accept_gzip: bool,
    pub accept_deflate: bool,
    pub url_rewritten: bool,
}

/// A peer address pair conveyed by a PROXY-protocol preamble, or `None` when
/// the connection isn't proxy-enabled or no preamble was present.
pub use crate::proxy::ProxyAddress;

/// The object a handler receives. Every slice-typed field borrows from the
/// connection's request buffer and is valid only for the duration of one
/// dispatch cycle.
pub struct Request<'a> {
    pub method: Method,
    pub flags: RequestFlags,

    /// Mutated by prefix stripping and handler-initiated rewrites.
    pub url: &'a str,
    /// The URL exactly as it arrived on the wire, never mutated.
    pub original_url: &'a str,
    pub fragment: Option<&'a str>,

    pub query_params: KvList<'a>,
    pub post_data: KvList<'a>,
    pub cookies: KvList<'a>,

    pub if_modified_since: Option<i64>,
    pub range: Option<ByteRange>,
    pub content_type: Option<&'a str>,
    pub authorization: Option<&'a str>,

    pub proxy: Option<ProxyAddress>,
    local_peer: Option<SocketAddr>,

    /// Set by a handler that wants to internally redirect the request to a
    /// different URL (e.g. serving `/index.html` for a directory request).
    /// Paired with `flags.url_rewritten`: a handler sets both and returns;
    /// the dispatch driver notices, re-derives `url`/`query`/`fragment` from
    /// this value, and re-runs routing, up to `Config::max_url_rewrites`
    /// times (`SPEC_FULL.md` §4.I).
    pub rewritten_url: Option<String>,
}

impl<'a> Request<'a> {
    pub fn new(
        method: Method,
        url: &'a str,
        fragment: Option<&'a str>,
        flags: RequestFlags,
        local_peer: Option<SocketAddr>,
    ) -> Self {
        Request {
            method,
            flags,
            url,
            original_url: url,
            fragment,
            query_params: KvList::default(),
            post_data: KvList::default(),
            cookies: KvList::default(),
            if_modified_since: None,
            range: None,
            content_type: None,
            authorization: None,
            proxy: None,
            local_peer,
            rewritten_url: None,
        }
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query_params.get(key)
    }

    pub fn post_param(&self, key: &str) -> Option<&str> {
        self.post_data.get(key)
    }

    pub fn cookie(&self, key: &str) -> Option<&str> {
        self.cookies.get(key)
    }

    /// The real client address: PROXY-protocol's claimed source when set,
    /// else the transport's own peer address.
    pub fn remote_address(&self) -> Option<SocketAddr> {
        match self.proxy {
            Some(ProxyAddress::V4 { src, .. }) => Some(SocketAddr::from(src)),
            Some(ProxyAddress::V6 { src, .. }) => Some(SocketAddr::from(src)),
            Some(ProxyAddress::Unspecified) => None,
            None => self.local_peer,
        }
    }
}
