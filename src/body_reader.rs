//! POST body framing. Grounded on the body-handling half of
//! `lwan_process_request`/`parse_headers_and_set_request_parameters` in
//! `original_source/common/lwan-request.c`: a POST body must already be
//! fully resident in the same read as the header block. Partial-body
//! continuation (streaming) is deliberately unsupported -- see
//! `SPEC_FULL.md` §4.G.

#[derive(Debug, PartialEq, Eq)]
pub enum BodyOutcome<'a> {
    /// No body expected (not a POST, or Content-Length absent/zero).
    Empty,
    /// The full body is resident at `body`; `next_request` below points one
    /// past it, where any pipelined tail begins.
    Resident { body: &'a [u8] },
    /// `Content-Length` exceeds the buffer's remaining capacity.
    TooLarge,
    /// `Content-Length` is present but malformed (not a plain decimal, or
    /// negative).
    Malformed,
    /// More bytes are declared than are currently resident, but streaming a
    /// continuation read is not implemented.
    NotImplemented,
}

/// `data` is the resident bytes of the buffer; `buffer_size` is the
/// connection's full scratch-buffer capacity (`Config::buffer_size`);
/// `body_start` is the offset where the body would begin (i.e. `consumed`
/// from the header parser); `content_length` is the raw header value, if
/// present.
pub fn frame_body<'a>(
    data: &'a [u8],
    buffer_size: usize,
    body_start: usize,
    content_length: Option<&str>,
) -> BodyOutcome<'a> {
    let len: usize = match content_length {
        None => return BodyOutcome::Empty,
        Some(s) => match s.trim().parse() {
            Ok(n) => n,
            Err(_) => return BodyOutcome::Malformed,
        },
    };
    if len == 0 {
        return BodyOutcome::Empty;
    }
    if len > buffer_size {
        return BodyOutcome::TooLarge;
    }

    let have = data.len() - body_start;
    if have == len {
        BodyOutcome::Resident {
            body: &data[body_start..body_start + len],
        }
    } else if len > have {
        BodyOutcome::TooLarge
    } else {
        BodyOutcome::NotImplemented
    }
}

/// Offset one past the framed body, i.e. where a pipelined tail begins.
pub fn next_request_offset(body_start: usize, content_length: usize) -> usize {
    body_start + content_length
}
