//! Per-connection HTTP/1.x request reader, parser, and dispatch driver.
//!
//! Given a cooperative task holding a reusable byte buffer and a connection
//! descriptor, this crate reads bytes off the socket until a full request
//! head (and, for `POST`, a resident body) is framed, parses the request
//! line and selected headers with zero-copy in-place slicing, optionally
//! consumes a PROXY-protocol v1/v2 preamble, selects a handler by
//! longest-prefix match on the URL, and drives one handler invocation per
//! pipelined request -- including handler-initiated internal URL rewrites.
//!
//! Individual handlers, full response body serialization, basic-auth
//! credential storage, TLS, and persistent connection state beyond a
//! single keep-alive flag are all out of scope; see `auth`, `handler`,
//! `response`, and `trie` for the trait boundaries a caller fills in.

#[macro_use]
extern crate failure;

pub mod auth;
pub mod body_reader;
pub mod buffer;
pub mod bytes_util;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod header_parser;
pub mod kv_list;
pub mod proxy;
pub mod request;
pub mod request_line;
pub mod response;
pub mod semantic;
pub mod server;
pub mod socket_reader;
pub mod status_code;
pub mod trie;
