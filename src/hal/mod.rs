//! Vendor hardware service seam
//!
//! Everything the sequencer sends to vendor hardware goes through
//! [`HardwareServiceProxy`]. The proxy never retries; retry policy for touch
//! mode lives in the touch-mode sequencer and the extended fingerprint
//! command is single-attempt.

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::SettingsSource;

mod messages;
mod socket;

pub use messages::{HalRequest, HalResponse};
pub use socket::{HalHandler, HalServer, SocketHal, StubHandler, serve_connection};

/// Vendor status code; `0` is success, anything else is vendor-defined
pub type HalStatus = i32;

#[derive(Debug, Error)]
pub enum HalError {
    /// The vendor service could not be looked up
    #[error("vendor service unavailable: {0}")]
    Unavailable(String),

    /// The service was reached but the exchange failed mid-call
    #[error("vendor call failed: {0}")]
    Transport(String),

    /// The service answered with something other than what was asked for
    #[error("unexpected vendor response: {0}")]
    Protocol(String),
}

/// Raw vendor command surface
pub trait VendorHal: Send + Sync {
    /// Fire-and-forget extended fingerprint command
    fn ext_cmd(&self, enrollment_id: i32, enable: i32) -> Result<(), HalError>;

    fn set_touch_mode(&self, group: i32, feature: i32, value: i32) -> Result<HalStatus, HalError>;
}

/// Synchronous wrapper the sequencer calls into
///
/// Blocks the calling thread for the vendor round-trip.
#[derive(Clone)]
pub struct HardwareServiceProxy {
    backend: Arc<dyn VendorHal>,
    settings: Arc<dyn SettingsSource>,
}

impl HardwareServiceProxy {
    pub fn new(backend: Arc<dyn VendorHal>, settings: Arc<dyn SettingsSource>) -> Self {
        Self { backend, settings }
    }

    /// Send the extended fingerprint command with the currently persisted enrollment id
    pub fn set_extended_fingerprint_command(&self, enable: i32) -> Result<(), HalError> {
        let enrollment_id = self.settings.enrollment_id();
        debug!(enrollment_id = enrollment_id, enable = enable, "Sending extended fingerprint command");
        self.backend.ext_cmd(enrollment_id, enable)
    }

    pub fn set_touch_mode(
        &self,
        group: i32,
        feature: i32,
        value: i32,
    ) -> Result<HalStatus, HalError> {
        debug!(group = group, feature = feature, value = value, "Sending touch mode command");
        self.backend.set_touch_mode(group, feature, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Settings, StaticSettings};
    use crate::testing::{HalCall, RecordingHal};

    #[test]
    fn test_enrollment_id_read_per_call() {
        let hal = Arc::new(RecordingHal::default());
        let settings = Arc::new(StaticSettings::new(Settings::default()));
        let proxy = HardwareServiceProxy::new(hal.clone(), settings.clone());

        proxy.set_extended_fingerprint_command(1).unwrap();
        settings.update(|s| s.enrollment_id = 11);
        proxy.set_extended_fingerprint_command(0).unwrap();

        assert_eq!(
            hal.calls(),
            vec![
                HalCall::ExtCmd { enrollment_id: 4, enable: 1 },
                HalCall::ExtCmd { enrollment_id: 11, enable: 0 },
            ]
        );
    }

    #[test]
    fn test_status_passed_through_without_retry() {
        let hal = Arc::new(RecordingHal::with_status(-22));
        let proxy = HardwareServiceProxy::new(hal.clone(), Arc::new(StaticSettings::default()));

        assert_eq!(proxy.set_touch_mode(0, 10, 1).unwrap(), -22);
        assert_eq!(hal.calls().len(), 1);
    }

    #[test]
    fn test_unavailable_service_propagates() {
        let hal = Arc::new(RecordingHal::unavailable());
        let proxy = HardwareServiceProxy::new(hal.clone(), Arc::new(StaticSettings::default()));

        assert!(matches!(proxy.set_touch_mode(0, 10, 1), Err(HalError::Unavailable(_))));
        assert!(matches!(proxy.set_extended_fingerprint_command(1), Err(HalError::Unavailable(_))));
    }
}
