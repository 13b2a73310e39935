//! The opaque output side of a request: a trait boundary so this crate
//! never has to own response body serialization. Grounded on the
//! `ResponseHandler` trait in the teacher's own `response.rs`, narrowed to
//! the two operations the dispatch driver actually calls.

use crate::status_code::StatusCode;

/// Emits a response for the request currently being dispatched. Body
/// serialization, header emission beyond status, and transport framing are
/// all out of scope for this crate (`SPEC_FULL.md` §1) and left to the
/// implementor.
pub trait ResponseSink: Send + Sync {
    /// Sets the status line for a handler-produced response.
    fn write_status(&mut self, status: StatusCode);

    /// Emits a minimal stock response for a status this crate generated
    /// internally (400, 404, 408, 413, 500, 501, ...) rather than a
    /// handler -- there is no handler body to serialize in these cases.
    fn default_response(&mut self, status: StatusCode);

    /// Tells the sink whether the driver intends to keep this connection
    /// open past the response it's about to write, so implementors that
    /// emit a `Connection` header can match what `process_request` actually
    /// does rather than hardcoding one value. Called once the outcome is
    /// known, before `write_status`/`default_response`. No-op by default:
    /// a sink that doesn't emit transport-level headers has nothing to do
    /// with this.
    fn set_keep_alive(&mut self, _keep_alive: bool) {}
}

#[cfg(test)]
pub(crate) struct RecordingResponseSink {
    pub statuses: Vec<StatusCode>,
    pub defaults: Vec<StatusCode>,
}

#[cfg(test)]
impl RecordingResponseSink {
    pub fn new() -> Self {
        RecordingResponseSink {
            statuses: Vec::new(),
            defaults: Vec::new(),
        }
    }
}

#[cfg(test)]
impl ResponseSink for RecordingResponseSink {
    fn write_status(&mut self, status: StatusCode) {
        self.statuses.push(status);
    }

    fn default_response(&mut self, status: StatusCode) {
        self.defaults.push(status);
    }
}
