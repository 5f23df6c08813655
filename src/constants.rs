//! Application-wide constants
//!
//! Vendor command codes, schedule offsets and configuration defaults live here
//! so every module agrees on the same values.

use std::time::Duration;

/// Vendor touch-controller command codes
pub mod touch {
    /// Command group used for every touch-mode toggle
    pub const GROUP: i32 = 0;

    /// Feature id of the fingerprint-illumination touch mode
    pub const FEATURE_FOD: i32 = 10;

    /// Touch mode value while illumination is active
    pub const VALUE_ENABLE: i32 = 1;

    /// Touch mode value when illumination ends
    pub const VALUE_DISABLE: i32 = 0;
}

/// Timing of the touch-mode schedule
pub mod schedule {
    use super::Duration;

    /// Delay from activation start to the unconditional enable retry
    pub const RETRY_DELAY: Duration = Duration::from_millis(200);

    /// Delay from the retry to the revert (nested, so 800ms after activation)
    pub const DISABLE_DELAY: Duration = Duration::from_millis(600);
}

/// Vendor status codes
pub mod status {
    /// Success status returned by vendor calls
    pub const OK: i32 = 0;
}

/// Extended fingerprint command flags
pub mod ext_cmd {
    /// Illumination starting
    pub const ENABLE: i32 = 1;

    /// Illumination ended
    pub const DISABLE: i32 = 0;
}

/// Persisted configuration defaults and locations
pub mod config {
    /// Config directory name under the platform config dir
    pub const APP_DIR: &str = "udfps-illumination";

    /// Config file name
    pub const FILENAME: &str = "config.json";

    /// Illumination color used when none is configured or the value is malformed
    pub const DEFAULT_ILLUMINATION_COLOR: &str = "00ff00";

    /// Enrollment id used when none is configured
    pub const DEFAULT_ENROLLMENT_ID: i32 = 4;

    /// Env var overriding the illumination color
    pub const ENV_ILLUMINATION_COLOR: &str = "UDFPS_ILLUMINATION_COLOR";

    /// Env var overriding the enrollment id
    pub const ENV_ENROLLMENT_ID: &str = "UDFPS_ENROLLMENT_ID";
}

/// Vendor bridge socket
pub mod ipc {
    /// Socket path relative to the runtime (or cache) dir
    pub const SOCKET_RELATIVE_PATH: &str = "udfps-illumination/hal.sock";

    /// Maximum message size (64 KiB); vendor messages are tiny
    pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;
}
