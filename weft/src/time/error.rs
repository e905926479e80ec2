//! Time error types.

/// Returned by [`timeout`](super::timeout) when the deadline passed before
/// the future completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deadline has elapsed")]
pub struct Elapsed(pub(super) ());
