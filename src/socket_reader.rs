//! Bounded non-blocking read loop with a finalizer-supplied framing
//! predicate, grounded directly on `read_from_request_socket` /
//! `read_request_finalizer` in
//! `original_source/common/lwan-request.c` (lines ~707-807). The C version
//! yields the connection's coroutine on `EAGAIN`/`EINTR`; here the
//! equivalent suspension point is simply the `.await` on a not-yet-ready
//! `AsyncRead`, which already parks the task with the executor.

use futures::io::AsyncRead;
use futures::AsyncReadExt;

use crate::bytes_util::match4;
use crate::config::Config;

#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Enough bytes are resident to hand off to the parser.
    Ready { total_read: usize },
    /// The peer shut the connection down in an orderly way before a full
    /// request head arrived. Terminal: the caller must not read again.
    PeerClosed,
    /// An I/O error occurred before any bytes were read at all.
    BadRequest,
    /// An I/O error occurred after some bytes were already read. Terminal,
    /// same handling as `PeerClosed` (no well-formed response is possible).
    Aborted,
    /// The buffer filled up before the finalizer declared the head complete.
    TooLarge,
    /// The 16-iteration read budget was exhausted.
    TimedOut,
}

#[derive(Debug, PartialEq, Eq)]
enum FinalizerOutcome {
    Done,
    TryAgain,
    YieldTryAgain,
    TooLarge,
}

/// Decides, after each chunk of bytes arrives, whether a full request head
/// is resident. Mirrors `read_request_finalizer`: a pipelined tail carried
/// over from the previous request short-circuits straight to `Done`. The
/// method is sniffed directly from the buffer's first four bytes, the same
/// way `read_request_finalizer` calls `get_http_method` on `buffer->value`
/// rather than being told the method up front -- at this point in the
/// original, the request line may not even be fully resident yet.
pub struct RequestHeadFinalizer {
    had_pipelined_tail: bool,
}

impl RequestHeadFinalizer {
    pub fn new(had_pipelined_tail: bool) -> Self {
        RequestHeadFinalizer { had_pipelined_tail }
    }

    fn check(&mut self, data: &[u8], buffer_size: usize) -> FinalizerOutcome {
        if data.len() < 4 {
            return FinalizerOutcome::YieldTryAgain;
        }
        if data.len() == buffer_size {
            return FinalizerOutcome::TooLarge;
        }
        if self.had_pipelined_tail {
            self.had_pipelined_tail = false;
            return FinalizerOutcome::Done;
        }
        if &data[data.len() - 4..] == b"\r\n\r\n" {
            return FinalizerOutcome::Done;
        }
        if match4(data, b"POST") {
            if let Some(nl) = data.iter().rposition(|&b| b == b'\n') {
                if nl >= 3 && &data[nl - 3..nl] == b"\r\n\r" {
                    return FinalizerOutcome::Done;
                }
            }
        }
        FinalizerOutcome::TryAgain
    }
}

/// Reads a request head (and, opportunistically, any pipelined tail bytes
/// that follow it) into `buffer`.
///
/// `initial_len` is the number of bytes already resident at the start of
/// `buffer` -- nonzero only when the previous request on this connection
/// left a pipelined tail that the caller has already moved to the head of
/// the buffer.
pub async fn read_request_head<R>(
    stream: &mut R,
    buffer: &mut [u8],
    initial_len: usize,
    config: &Config,
    finalizer: &mut RequestHeadFinalizer,
) -> ReadOutcome
where
    R: AsyncRead + Unpin,
{
    let mut total_read = initial_len;

    if total_read > 0 {
        match finalizer.check(&buffer[..total_read], config.buffer_size) {
            FinalizerOutcome::Done => return ReadOutcome::Ready { total_read },
            FinalizerOutcome::TooLarge => return ReadOutcome::TooLarge,
            FinalizerOutcome::TryAgain | FinalizerOutcome::YieldTryAgain => {}
        }
    }

    for _ in 0..config.max_read_iterations {
        if total_read >= buffer.len() {
            return ReadOutcome::TooLarge;
        }

        match stream.read(&mut buffer[total_read..]).await {
            Ok(0) => return ReadOutcome::PeerClosed,
            Ok(n) => {
                total_read += n;
                match finalizer.check(&buffer[..total_read], config.buffer_size) {
                    FinalizerOutcome::Done => return ReadOutcome::Ready { total_read },
                    FinalizerOutcome::TooLarge => return ReadOutcome::TooLarge,
                    FinalizerOutcome::TryAgain | FinalizerOutcome::YieldTryAgain => continue,
                }
            }
            Err(e) => match e.kind() {
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted => continue,
                _ if total_read == 0 => return ReadOutcome::BadRequest,
                _ => return ReadOutcome::Aborted,
            },
        }
    }

    ReadOutcome::TimedOut
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::io::Cursor;

    fn config() -> Config {
        Config {
            buffer_size: 32,
            max_read_iterations: 16,
            ..Default::default()
        }
    }

    #[async_std::test]
    async fn reads_until_blank_line() {
        let mut stream = Cursor::new(b"GET / HTTP/1.1\r\n\r\n".to_vec());
        let mut buffer = [0u8; 32];
        let mut finalizer = RequestHeadFinalizer::new(false);
        let outcome =
            read_request_head(&mut stream, &mut buffer, 0, &config(), &mut finalizer).await;
        assert_eq!(outcome, ReadOutcome::Ready { total_read: 18 });
    }

    #[async_std::test]
    async fn pipelined_tail_finalizes_without_reading() {
        let mut stream = Cursor::new(Vec::new());
        let mut buffer = [0u8; 32];
        buffer[..4].copy_from_slice(b"abcd");
        let mut finalizer = RequestHeadFinalizer::new(true);
        let outcome =
            read_request_head(&mut stream, &mut buffer, 4, &config(), &mut finalizer).await;
        assert_eq!(outcome, ReadOutcome::Ready { total_read: 4 });
    }

    #[async_std::test]
    async fn peer_closed_before_head_complete() {
        let mut stream = Cursor::new(b"GET / HTTP".to_vec());
        let mut buffer = [0u8; 32];
        let mut finalizer = RequestHeadFinalizer::new(false);
        let outcome =
            read_request_head(&mut stream, &mut buffer, 0, &config(), &mut finalizer).await;
        assert_eq!(outcome, ReadOutcome::PeerClosed);
    }

    #[async_std::test]
    async fn oversized_head_is_too_large() {
        let body = vec![b'x'; 64];
        let mut stream = Cursor::new(body);
        let mut buffer = [0u8; 32];
        let mut finalizer = RequestHeadFinalizer::new(false);
        let outcome =
            read_request_head(&mut stream, &mut buffer, 0, &config(), &mut finalizer).await;
        assert_eq!(outcome, ReadOutcome::TooLarge);
    }

    #[async_std::test]
    async fn post_body_boundary_detected_mid_buffer() {
        let mut stream =
            Cursor::new(b"POST /f HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc".to_vec());
        let mut buffer = [0u8; 64];
        let mut finalizer = RequestHeadFinalizer::new(false);
        let config = Config {
            buffer_size: 64,
            ..Default::default()
        };
        let outcome = read_request_head(&mut stream, &mut buffer, 0, &config, &mut finalizer).await;
        match outcome {
            ReadOutcome::Ready { total_read } => assert_eq!(total_read, 43),
            other => panic!("expected Ready, got {:?}", other),
        }
    }
}
