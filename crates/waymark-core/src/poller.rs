//! Location poller: the per-tick sampling decision and the single-fix
//! request.
//!
//! The decision is a pure function of the current policy, the provider's
//! enabled flag, and the wall-clock minute-of-day, so the supervisor can
//! evaluate it without touching any capability and tests can sweep every
//! minute of the day.

use std::time::Duration;

use crate::error::PollError;
use crate::policy::Policy;
use crate::provider::LocationProvider;
use crate::reading::Reading;

/// Whether a sample should be requested on this tick.
pub fn should_sample_now(policy: &Policy, provider_enabled: bool, minute_of_day: u16) -> bool {
    policy.tracking_enabled && provider_enabled && policy.window_open(minute_of_day)
}

/// Request one position sample from the provider, bounded by `deadline`.
///
/// `ProviderDisabled` and `ProviderTimeout` mean "skip this tick";
/// `PermissionDenied` is fatal and escalates to the supervisor.
pub fn request_sample(
    provider: &dyn LocationProvider,
    deadline: Duration,
) -> Result<Reading, PollError> {
    let position = provider.request_fix(deadline)?;
    log::debug!(
        "sample acquired: lat={}, lon={}",
        position.latitude,
        position.longitude
    );
    Ok(Reading::new(position.latitude, position.longitude))
}
