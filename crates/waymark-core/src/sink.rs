//! Delivery-sink capability: the consumer bridge that receives readings.
//!
//! The sink never owns reading data -- it forwards a reading or fails with
//! [`SinkError::Unavailable`], and callers route that failure into the
//! offline queue. Attach/detach is the implementation's concern; the
//! supervisor only observes `is_attached`.

use crate::error::SinkError;
use crate::reading::Reading;

/// External consumer bridge.
pub trait DeliverySink: Send + Sync {
    /// Whether the consumer bridge is currently attached.
    fn is_attached(&self) -> bool;

    /// Hand one reading to the consumer. A reading is either accepted or
    /// not; there are no partial-delivery states.
    fn deliver(&self, reading: &Reading) -> Result<(), SinkError>;
}
