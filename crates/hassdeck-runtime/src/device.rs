#![forbid(unsafe_code)]

//! The control-surface boundary.
//!
//! The dispatcher drives any device through this trait: a fixed grid of
//! keys, a row of dials with a touchscreen strip, a brightness control.
//! Input travels the other way, as a feed of normalized events.

use image::RgbImage;
use thiserror::Error;

/// A device write failed.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device disconnected")]
    Disconnected,
    #[error("no such control index {0}")]
    BadIndex(u8),
    #[error("{0}")]
    Backend(String),
}

/// Physical layout of the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeckLayout {
    pub key_count: u8,
    pub dial_count: u8,
    /// Pixel size of one key image.
    pub key_size: (u32, u32),
    /// Pixel size of one dial's touchscreen segment.
    pub dial_size: (u32, u32),
    /// Full touchscreen width in pixels, for mapping touch coordinates.
    pub touchscreen_width: u32,
}

impl DeckLayout {
    /// Which dial a touchscreen column falls over.
    #[must_use]
    pub fn dial_at(&self, x: i32) -> Option<u8> {
        if self.dial_count == 0 || self.touchscreen_width == 0 || x < 0 {
            return None;
        }
        let segment = self.touchscreen_width / u32::from(self.dial_count);
        let index = (x as u32 / segment.max(1)) as u8;
        (index < self.dial_count).then_some(index)
    }
}

/// Output half of a deck device.
pub trait DeckDevice: Send {
    fn layout(&self) -> DeckLayout;
    fn set_key_image(&mut self, index: u8, image: &RgbImage) -> Result<(), DeviceError>;
    fn set_dial_image(&mut self, index: u8, image: &RgbImage) -> Result<(), DeviceError>;
    fn set_brightness(&mut self, percent: u8) -> Result<(), DeviceError>;
}
