//! In-memory ARGB8888 surface
//!
//! Stands in for the platform surface when running outside the device, and
//! lets the illuminated frame be dumped to PNG for inspection.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use super::{DrawError, RenderSurface};
use crate::color::IlluminationColor;
use crate::types::Rect;

/// Lock/unlock bookkeeping, exposed for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCounts {
    pub acquired: usize,
    pub released: usize,
}

pub struct SoftwareSurface {
    width: u32,
    height: u32,
    state: Mutex<FrameState>,
}

struct FrameState {
    pixels: Vec<u32>,
    locked: bool,
    counts: FrameCounts,
}

impl SoftwareSurface {
    /// Transparent black surface of the given size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            state: Mutex::new(FrameState {
                pixels: vec![0; (width as usize) * (height as usize)],
                locked: false,
                counts: FrameCounts::default(),
            }),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// ARGB value at (x, y), `None` outside the surface
    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.lock().pixels[y as usize * self.width as usize + x as usize])
    }

    pub fn counts(&self) -> FrameCounts {
        self.lock().counts
    }

    /// Write the current frame as an RGBA PNG
    pub fn write_png(&self, path: &Path) -> Result<()> {
        let rgba: Vec<u8> = self
            .lock()
            .pixels
            .iter()
            .flat_map(|argb| {
                let [a, r, g, b] = argb.to_be_bytes();
                [r, g, b, a]
            })
            .collect();

        let file = File::create(path)
            .context(format!("Failed to create {}", path.display()))?;
        let mut encoder = png::Encoder::new(BufWriter::new(file), self.width, self.height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()
            .context("Failed to write PNG header")?;
        writer.write_image_data(&rgba)
            .context("Failed to write PNG image data")?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FrameState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RenderSurface for SoftwareSurface {
    fn lock_frame(&self) -> Result<(), DrawError> {
        let mut state = self.lock();
        if state.locked || state.pixels.is_empty() {
            return Err(DrawError::NoFrame);
        }
        state.locked = true;
        state.counts.acquired += 1;
        Ok(())
    }

    fn fill_oval(&self, bounds: Rect, color: IlluminationColor) -> Result<(), DrawError> {
        let mut state = self.lock();
        if !state.locked {
            return Err(DrawError::NotLocked);
        }
        if bounds.is_empty() {
            return Ok(());
        }

        let rx = bounds.width as f32 / 2.0;
        let ry = bounds.height as f32 / 2.0;
        let cx = bounds.left() as f32 + rx;
        let cy = bounds.top() as f32 + ry;
        let argb = color.argb32();

        // Clip to the surface before walking pixels
        let x0 = bounds.left().max(0);
        let y0 = bounds.top().max(0);
        let x1 = bounds.right().min(self.width as i32);
        let y1 = bounds.bottom().min(self.height as i32);

        for y in y0..y1 {
            let dy = (y as f32 + 0.5 - cy) / ry;
            for x in x0..x1 {
                let dx = (x as f32 + 0.5 - cx) / rx;
                if dx * dx + dy * dy <= 1.0 {
                    let index = y as usize * self.width as usize + x as usize;
                    state.pixels[index] = argb;
                }
            }
        }
        Ok(())
    }

    fn unlock_and_post(&self) {
        let mut state = self.lock();
        if state.locked {
            state.locked = false;
            state.counts.released += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::FrameGuard;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn test_oval_fills_center_not_corners() {
        let surface = SoftwareSurface::new(40, 40);
        let color = IlluminationColor::new(255, 0, 170);
        {
            let frame = FrameGuard::acquire(&surface).unwrap();
            frame.fill_oval(Rect::new(10, 10, 20, 20), color).unwrap();
        }

        assert_eq!(surface.pixel(20, 20), Some(0xFFFF_00AA));
        assert_eq!(surface.pixel(10, 10), Some(0));
        assert_eq!(surface.pixel(29, 29), Some(0));
        assert_eq!(surface.pixel(5, 20), Some(0));
        assert_eq!(surface.counts(), FrameCounts { acquired: 1, released: 1 });
    }

    #[test]
    fn test_oval_partially_offscreen_is_clipped() {
        let surface = SoftwareSurface::new(10, 10);
        let frame = FrameGuard::acquire(&surface).unwrap();
        frame.fill_oval(Rect::new(-10, -10, 20, 20), IlluminationColor::default()).unwrap();
        drop(frame);
        assert_eq!(surface.pixel(0, 0), Some(0xFF00_FF00));
    }

    #[test]
    fn test_draw_requires_locked_frame() {
        let surface = SoftwareSurface::new(4, 4);
        assert!(matches!(
            surface.fill_oval(Rect::new(0, 0, 4, 4), IlluminationColor::default()),
            Err(DrawError::NotLocked)
        ));
    }

    #[test]
    fn test_double_lock_rejected_until_release() {
        let surface = SoftwareSurface::new(4, 4);
        let frame = FrameGuard::acquire(&surface).unwrap();
        assert!(matches!(FrameGuard::acquire(&surface), Err(DrawError::NoFrame)));
        drop(frame);
        assert!(FrameGuard::acquire(&surface).is_ok());
        assert_eq!(surface.counts(), FrameCounts { acquired: 2, released: 2 });
    }

    #[test]
    fn test_pixels_are_row_major_on_wide_surface() {
        let surface = SoftwareSurface::new(7, 3);
        assert_eq!((surface.width(), surface.height()), (7, 3));
        {
            let frame = FrameGuard::acquire(&surface).unwrap();
            frame.fill_oval(Rect::new(4, 1, 3, 1), IlluminationColor::new(0, 0, 255)).unwrap();
        }

        assert_eq!(surface.pixel(5, 1), Some(0xFF00_00FF));
        assert_eq!(surface.pixel(1, 2), Some(0));
        assert_eq!(surface.pixel(surface.width(), 0), None);
        assert_eq!(surface.pixel(0, surface.height()), None);
    }

    #[test]
    fn test_zero_sized_surface_has_no_frame() {
        let surface = SoftwareSurface::new(0, 0);
        assert!(matches!(surface.lock_frame(), Err(DrawError::NoFrame)));
    }

    #[test]
    fn test_png_export_decodes() {
        let surface = SoftwareSurface::new(8, 6);
        {
            let frame = FrameGuard::acquire(&surface).unwrap();
            frame.fill_oval(Rect::new(0, 0, 8, 6), IlluminationColor::new(1, 2, 3)).unwrap();
        }
        let dir = tempdir().unwrap();
        let path = dir.path().join("frame.png");
        surface.write_png(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let decoder = png::Decoder::new(Cursor::new(bytes));
        let mut reader = decoder.read_info().unwrap();
        let mut buf = vec![0; 8 * 6 * 4];
        let info = reader.next_frame(&mut buf).unwrap();

        assert_eq!((info.width, info.height), (8, 6));
        assert_eq!(info.color_type, png::ColorType::Rgba);
        // Center pixel (4, 3)
        let offset = (3 * 8 + 4) * 4;
        assert_eq!(&buf[offset..offset + 4], &[1, 2, 3, 255]);
    }
}
