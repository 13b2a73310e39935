//! Per-connection state: the reusable buffer, persistent keep-alive flag,
//! and a handle to the underlying stream. One `Connection` is created per
//! accepted socket and threaded through successive `process_request` calls
//! for as long as the client keeps it alive, mirroring the coroutine-owned
//! connection state in `original_source/common/lwan-request.c`
//! (`lwan_connection_t` / `CONN_KEEP_ALIVE` / `CONN_MUST_READ`).

use std::net::SocketAddr;

use futures::io::AsyncRead;

use crate::buffer::RequestBuffer;
use crate::config::Config;

pub struct Connection<R> {
    pub stream: R,
    pub buffer: RequestBuffer,
    pub config: Config,
    pub keep_alive: bool,
    pub peer_addr: Option<SocketAddr>,
    rewrite_count: u32,
}

impl<R> Connection<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(stream: R, config: Config, peer_addr: Option<SocketAddr>) -> Self {
        Connection {
            buffer: RequestBuffer::new(&config),
            stream,
            config,
            keep_alive: true,
            peer_addr,
            rewrite_count: 0,
        }
    }

    pub fn reset_rewrite_count(&mut self) {
        self.rewrite_count = 0;
    }

    /// Increments the rewrite counter, returning `false` once it exceeds
    /// `Config::max_url_rewrites` (the dispatch driver turns that into a
    /// 500, per `SPEC_FULL.md` §4.I).
    pub fn record_rewrite(&mut self) -> bool {
        self.rewrite_count += 1;
        self.rewrite_count <= self.config.max_url_rewrites
    }
}
