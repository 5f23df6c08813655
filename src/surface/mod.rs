//! Illumination surface lifecycle
//!
//! The platform creates the rendering surface asynchronously. The manager
//! turns "surface is ready" plus "illumination was requested" into exactly one
//! draw followed by exactly one completion callback, whichever of the two
//! happens first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::color::IlluminationColor;
use crate::config::SettingsSource;
use crate::types::{Rect, SharedGeometry};

mod software;

pub use software::{FrameCounts, SoftwareSurface};

pub type IlluminationCallback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Error)]
pub enum DrawError {
    #[error("no drawable frame available")]
    NoFrame,

    #[error("draw outside a locked frame")]
    NotLocked,

    #[error("draw failed: {0}")]
    Failed(String),
}

/// Platform rendering surface the illumination dot is painted on
///
/// Every successful `lock_frame` must be paired with one `unlock_and_post`;
/// use [`FrameGuard`] rather than calling these directly.
pub trait RenderSurface: Send + Sync {
    fn lock_frame(&self) -> Result<(), DrawError>;

    /// Fill the oval inscribed in `bounds` (surface coordinates)
    fn fill_oval(&self, bounds: Rect, color: IlluminationColor) -> Result<(), DrawError>;

    fn unlock_and_post(&self);
}

/// Locked frame, released on drop
pub struct FrameGuard<'a> {
    surface: &'a dyn RenderSurface,
}

impl<'a> FrameGuard<'a> {
    pub fn acquire(surface: &'a dyn RenderSurface) -> Result<Self, DrawError> {
        surface.lock_frame()?;
        Ok(Self { surface })
    }

    pub fn fill_oval(&self, bounds: Rect, color: IlluminationColor) -> Result<(), DrawError> {
        self.surface.fill_oval(bounds, color)
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.surface.unlock_and_post();
    }
}

pub struct SurfaceLifecycleManager {
    surface: Arc<dyn RenderSurface>,
    geometry: SharedGeometry,
    settings: Arc<dyn SettingsSource>,
    valid: AtomicBool,
    visible: AtomicBool,
    pending: Mutex<Option<IlluminationCallback>>,
}

impl SurfaceLifecycleManager {
    pub fn new(
        surface: Arc<dyn RenderSurface>,
        geometry: SharedGeometry,
        settings: Arc<dyn SettingsSource>,
    ) -> Self {
        Self {
            surface,
            geometry,
            settings,
            valid: AtomicBool::new(false),
            visible: AtomicBool::new(false),
            pending: Mutex::new(None),
        }
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
        debug!(visible = visible, "Illumination surface visibility changed");
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    pub fn is_surface_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    pub fn has_pending(&self) -> bool {
        self.lock_pending().is_some()
    }

    /// Request one draw + callback as soon as the surface exists
    ///
    /// Replaces (drops without calling) any callback still waiting from an
    /// earlier request.
    pub fn arm(&self, on_illuminated: IlluminationCallback) {
        let replaced = self.lock_pending().replace(on_illuminated).is_some();
        if replaced {
            debug!("Replaced pending illumination callback from an earlier activation");
        }
        if self.is_surface_valid() {
            self.fire();
        }
    }

    /// Platform notification: the surface can now be drawn on
    pub fn on_surface_created(&self) {
        info!("Illumination surface created");
        self.valid.store(true, Ordering::SeqCst);
        self.fire();
    }

    pub fn on_surface_destroyed(&self) {
        info!("Illumination surface destroyed");
        self.valid.store(false, Ordering::SeqCst);
    }

    /// Drop the pending callback without running it
    pub fn cancel(&self) -> bool {
        let cancelled = self.lock_pending().take().is_some();
        if cancelled {
            debug!("Cancelled pending illumination callback");
        }
        cancelled
    }

    fn fire(&self) {
        // Exchange-and-clear: whoever takes it owns the only invocation
        let Some(on_illuminated) = self.lock_pending().take() else {
            return;
        };
        self.draw_illumination();
        on_illuminated();
    }

    /// Paint the sensor-shaped dot once; failures are logged, never raised
    pub fn draw_illumination(&self) {
        let sensor_rect = self.geometry.get().sensor_rect;
        let color = IlluminationColor::parse_or_default(&self.settings.illumination_color());

        let frame = match FrameGuard::acquire(self.surface.as_ref()) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Could not lock illumination frame, skipping draw");
                return;
            }
        };
        match frame.fill_oval(sensor_rect, color) {
            Ok(()) => debug!(rect = ?sensor_rect, color = %color, "Drew illumination dot"),
            Err(e) => warn!(rect = ?sensor_rect, error = %e, "Illumination draw failed"),
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Option<IlluminationCallback>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
