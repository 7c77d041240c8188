//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::Bounds;

/// Calculate the size an image must shrink to so it fits inside `bounds`.
///
/// Returns `None` when the image already fits. Otherwise returns the largest
/// size within the bounds that preserves the aspect ratio, never collapsing a
/// side below one pixel.
///
/// # Examples
/// ```
/// # use riloe::imaging::{Bounds, fit_within};
/// let bounds = Bounds::new(600, 800);
/// // 1200x900 landscape is limited by width → 600x450
/// assert_eq!(fit_within((1200, 900), bounds), Some((600, 450)));
///
/// // 500x500 already fits
/// assert_eq!(fit_within((500, 500), bounds), None);
/// ```
pub fn fit_within(source: (u32, u32), bounds: Bounds) -> Option<(u32, u32)> {
    let (src_w, src_h) = source;
    if src_w <= bounds.width && src_h <= bounds.height {
        return None;
    }

    let scale_w = bounds.width as f64 / src_w as f64;
    let scale_h = bounds.height as f64 / src_h as f64;
    let scale = scale_w.min(scale_h);

    let w = ((src_w as f64 * scale).round() as u32).clamp(1, bounds.width);
    let h = ((src_h as f64 * scale).round() as u32).clamp(1, bounds.height);
    Some((w, h))
}
