#![forbid(unsafe_code)]

//! Illumination activation sequencing for under-display fingerprint sensors
//!
//! [`DisplayConfigurationController`] drives one activation: it shows the
//! overlay, starts the vendor touch-mode schedule, asks for a display-mode
//! boost, and has the [`SurfaceLifecycleManager`] paint the illumination dot
//! before reporting completion.

pub mod color;
pub mod config;
pub mod constants;
pub mod controller;
pub mod display_mode;
pub mod hal;
pub mod scheduler;
pub mod surface;
pub mod touch_mode;
pub mod types;
pub mod view;

#[cfg(test)]
mod testing;

pub use color::IlluminationColor;
pub use config::{FileSettings, Settings, SettingsSource, StaticSettings};
pub use controller::{Collaborators, ConfigurationState, DisplayConfigurationController};
pub use display_mode::{DisplayModeProvider, ModeCallback};
pub use hal::{HalError, HardwareServiceProxy, SocketHal, VendorHal};
pub use scheduler::{SerialScheduler, VirtualScheduler, WorkerQueue};
pub use surface::{RenderSurface, SoftwareSurface, SurfaceLifecycleManager};
pub use touch_mode::{ActivationToken, StaleTaskPolicy, TouchModeSequencer};
pub use types::{OverlayGeometry, Rect, SharedGeometry};
pub use view::{LoggingViewController, ViewController};
