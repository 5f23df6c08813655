//! Overlay geometry shared between the controller and the surface manager

use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn left(&self) -> i32 {
        self.x
    }

    /// Saturates at `i32::MAX` for rects reaching past the coordinate range
    pub fn right(&self) -> i32 {
        self.x.saturating_add(clamp_extent(self.width))
    }

    pub fn top(&self) -> i32 {
        self.y
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(clamp_extent(self.height))
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, px: i32, py: i32) -> bool {
        px >= self.left() && px < self.right() && py >= self.top() && py < self.bottom()
    }
}

fn clamp_extent(extent: u32) -> i32 {
    i32::try_from(extent).unwrap_or(i32::MAX)
}

/// Sensor bounds plus the display rect the overlay actually covers
///
/// The display rect may be larger than the physical sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlayGeometry {
    pub sensor_rect: Rect,
    pub display_rect: Rect,
}

/// Geometry handle written on layout passes and read at draw time
#[derive(Debug, Clone, Default)]
pub struct SharedGeometry(Arc<Mutex<OverlayGeometry>>);

impl SharedGeometry {
    pub fn new(geometry: OverlayGeometry) -> Self {
        Self(Arc::new(Mutex::new(geometry)))
    }

    pub fn get(&self) -> OverlayGeometry {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, geometry: OverlayGeometry) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = geometry;
    }
}
