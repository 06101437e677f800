//! Display geometry and the per-eye half-split.

use crate::error::{StereoError, StereoResult};
use crate::frame::Eye;

/// A pixel rectangle on the display surface. `y` is measured from the top edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EyeRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl EyeRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, px: u32, py: u32) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }
}

/// The full display size as reported by the host surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewportGeometry {
    width: u32,
    height: u32,
}

impl ViewportGeometry {
    /// Build a geometry; both dimensions must be strictly positive.
    pub fn new(width: u32, height: u32) -> StereoResult<Self> {
        if width == 0 || height == 0 {
            return Err(StereoError::Configuration(format!(
                "viewport must be positive, got {width}x{height}"
            )));
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// True once a positive size has been configured.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// The drawable rectangle for one eye.
    ///
    /// Left gets `W/2` columns, right gets the remaining `W - W/2`, so an odd
    /// width hands the extra column to the right eye and the two halves
    /// always tile `[0, W)` exactly.
    pub fn eye_rect(&self, eye: Eye) -> EyeRect {
        let half = self.width / 2;
        match eye {
            Eye::Left => EyeRect::new(0, 0, half, self.height),
            Eye::Right => EyeRect::new(half, 0, self.width - half, self.height),
        }
    }

    /// The whole surface.
    pub fn full_rect(&self) -> EyeRect {
        EyeRect::new(0, 0, self.width, self.height)
    }
}
