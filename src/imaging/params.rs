//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. The
//! [`downscale`](super::downscale) module turns them into pixel work.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 85). Clamped on construction.
//! - [`Bounds`]: Box an image must fit inside (default 600×800).
//! - [`DownscaleParams`]: Bounds plus the quality used when re-encoding.

use crate::config::ImagesConfig;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(85)
    }
}

/// Maximum width and height, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::new(600, 800)
    }
}

/// Parameters for shrinking a fetched image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownscaleParams {
    pub bounds: Bounds,
    pub quality: Quality,
}

impl DownscaleParams {
    pub fn from_config(config: &ImagesConfig) -> Self {
        Self {
            bounds: Bounds::new(config.max_width, config.max_height),
            quality: Quality::new(config.quality),
        }
    }
}
