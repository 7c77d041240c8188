//! Image operations for fetched assets.
//!
//! - [`calculations`]: pure dimension math, no I/O
//! - [`params`]: what to do (bounds, quality)
//! - [`downscale`]: decoding, resampling and re-encoding with the `image` crate

pub mod calculations;
pub mod downscale;
pub mod params;

pub use calculations::fit_within;
pub use downscale::{Downscaled, ImagingError, downscale};
pub use params::{Bounds, DownscaleParams, Quality};
