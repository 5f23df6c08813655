//! Vendor bridge message types

use serde::{Deserialize, Serialize};

use super::HalStatus;

/// Requests sent to the vendor bridge
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum HalRequest {
    /// Extended fingerprint command (no status expected)
    ExtCmd { enrollment_id: i32, enable: i32 },

    /// Touch controller mode change
    SetTouchMode { group: i32, feature: i32, value: i32 },
}

/// Responses from the vendor bridge
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum HalResponse {
    /// Command accepted (reply to `ExtCmd`)
    Ack,

    /// Vendor status code (reply to `SetTouchMode`)
    Status(HalStatus),

    /// Bridge could not reach the underlying vendor service
    Error(String),
}
