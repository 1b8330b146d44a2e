//! Error types for harness operations.
//!
//! Two kinds of failure exist in the harness:
//!
//! - **User-visible call outcomes** ([`CallError`]): the remote handler
//!   failed, the method was filtered, or the per-stub deadline elapsed.
//!   These propagate as `Result` values at the call site.
//! - **Plumbing failures** ([`ChannelClosed`]): a send or receive hit a
//!   closed channel. Inside the harness these mostly mean "the peer went
//!   away" and are folded into a [`CallError`] before reaching users.
//!
//! Invariant violations (double delivery, duplicate parked waiters,
//! unrecognized method tags at the server) are not represented here: they
//! panic with a diagnostic instead of corrupting state.

use thiserror::Error;

/// The channel was closed and can no longer carry values.
///
/// Returned by `send` as soon as the channel is closed, and by the receive
/// operations once the channel is closed **and** drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("channel closed")]
pub struct ChannelClosed;

/// Outcome of a failed remote call, as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// The remote side reported a failure: the handler panicked, the codec
    /// rejected a payload, the method was filtered, or the actor is gone.
    /// Carries the description verbatim.
    #[error("remote failure: {0}")]
    Remote(String),

    /// The per-stub deadline elapsed before a matching response arrived.
    ///
    /// The server is not notified; it may still complete the work and send
    /// a response that the caller will discard.
    #[error("request timed out")]
    Timeout,
}
