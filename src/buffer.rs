//! The per-connection reusable scratch buffer. Grounded on the
//! `lwan_value_t buffer` + `helper->next_request` pairing threaded through
//! `read_from_request_socket` in
//! `original_source/common/lwan-request.c`: one fixed allocation, reused
//! across requests by moving any pipelined tail to the front instead of
//! reallocating.

use crate::config::Config;

pub struct RequestBuffer {
    storage: Vec<u8>,
    /// Bytes already resident at the front of `storage`, left over from a
    /// pipelined tail of the previous request. Consumed (reset to zero) by
    /// the socket reader's finalizer.
    pending: usize,
}

impl RequestBuffer {
    pub fn new(config: &Config) -> Self {
        RequestBuffer {
            storage: vec![0u8; config.buffer_size],
            pending: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.storage
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.storage
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Moves the tail bytes `[next_request, total_read)` to the front of the
    /// buffer, ready to serve as the head of the next request. Mirrors the
    /// original's `memmove` in `read_from_request_socket`.
    pub fn carry_tail(&mut self, next_request: usize, total_read: usize) {
        if next_request >= total_read {
            self.pending = 0;
            return;
        }
        let tail_len = total_read - next_request;
        self.storage.copy_within(next_request..total_read, 0);
        self.pending = tail_len;
    }

    pub fn clear_pending(&mut self) {
        self.pending = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carry_tail_moves_bytes_to_front() {
        let config = Config::default();
        let mut buf = RequestBuffer::new(&config);
        buf.as_mut_slice()[..10].copy_from_slice(b"first req;");
        buf.as_mut_slice()[10..20].copy_from_slice(b"GET /next;");
        buf.carry_tail(10, 20);
        assert_eq!(buf.pending(), 10);
        assert_eq!(&buf.as_slice()[..10], b"GET /next;");
    }

    #[test]
    fn no_tail_when_fully_consumed() {
        let config = Config::default();
        let mut buf = RequestBuffer::new(&config);
        buf.carry_tail(20, 20);
        assert_eq!(buf.pending(), 0);
    }
}
