//! Location-provider capability.
//!
//! Fix acquisition is an external concern: the supervisor only needs a way
//! to ask "are you enabled?" and "give me one fix within this deadline".
//! Implementations are injected at supervisor construction rather than
//! reached through ambient global state.

use std::time::Duration;

use crate::error::PollError;

/// A raw position fix as reported by the platform provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

/// External source of position fixes.
///
/// `request_fix` may block up to `deadline`; callers run it off the
/// scheduling loop. Implementations are stateless between calls.
pub trait LocationProvider: Send + Sync {
    /// Whether the platform provider is currently usable at all.
    fn is_enabled(&self) -> bool;

    /// Whether the host has granted location permission. Checked once
    /// when the supervisor starts; a revocation afterwards surfaces as
    /// [`PollError::PermissionDenied`] from `request_fix`.
    fn permission_granted(&self) -> bool;

    /// Request a single fix, waiting at most `deadline`.
    fn request_fix(&self, deadline: Duration) -> Result<Position, PollError>;
}
