//! Crate-wide error type.
//!
//! This is reserved for conditions that should never occur in a correctly
//! operating server: an internal invariant violation, not a malformed
//! request. Malformed requests, unsupported methods, oversized bodies, and
//! the like are represented as typed outcomes (`ParseOutcome`, `ReadOutcome`,
//! `DispatchError`, ...) returned by value, never as `Err` of this type —
//! the driver is the single place a response status gets chosen.

pub use failure::err_msg;
pub use failure::format_err;
pub use failure::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Fail)]
pub enum InternalError {
    #[fail(display = "rewrite budget exceeded: {} > {}", attempted, max)]
    RewriteBudgetExceeded { attempted: u32, max: u32 },

    #[fail(display = "key-value list capacity exceeded")]
    KvListFull,
}
