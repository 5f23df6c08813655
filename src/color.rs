//! Illumination color parsing
//!
//! Colors are persisted as `RRGGBB` hex strings. A leading `#` is tolerated.
//! Illumination is always fully opaque, so there is no alpha channel in the
//! persisted form.

use std::fmt;
use tracing::warn;

use crate::constants::config::DEFAULT_ILLUMINATION_COLOR;

/// Opaque RGB color used to paint the illumination dot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IlluminationColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl IlluminationColor {
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Parse a `RRGGBB` (or `#RRGGBB`) string
    pub fn parse(hex: &str) -> Option<Self> {
        let hex = hex.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let value = u32::from_str_radix(hex, 16).ok()?;
        Some(Self::from_rgb24(value))
    }

    /// Parse, falling back to the built-in default on failure
    pub fn parse_or_default(hex: &str) -> Self {
        Self::parse(hex).unwrap_or_else(|| {
            warn!(color = %hex, default = DEFAULT_ILLUMINATION_COLOR, "Invalid illumination color, using default");
            Self::default()
        })
    }

    pub const fn from_rgb24(value: u32) -> Self {
        Self {
            red: ((value >> 16) & 0xFF) as u8,
            green: ((value >> 8) & 0xFF) as u8,
            blue: (value & 0xFF) as u8,
        }
    }

    /// Packed ARGB8888 with full alpha
    pub const fn argb32(&self) -> u32 {
        0xFF00_0000 | (self.red as u32) << 16 | (self.green as u32) << 8 | self.blue as u32
    }

    /// Lowercase `rrggbb`, the persisted form
    pub fn to_hex_string(&self) -> String {
        format!("{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
    }
}

impl Default for IlluminationColor {
    fn default() -> Self {
        // 00ff00
        Self::new(0x00, 0xFF, 0x00)
    }
}

impl fmt::Display for IlluminationColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.to_hex_string())
    }
}
