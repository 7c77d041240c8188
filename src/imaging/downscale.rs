//! In-memory downscaling of fetched images, using the `image` crate.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF, WebP) | `image::load_from_memory_with_format` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode → JPEG | `JpegEncoder::new_with_quality` |
//! | Encode → other | `DynamicImage::write_to` in the format of the file extension |

use super::calculations::fit_within;
use super::params::{DownscaleParams, Quality};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("Failed to decode image: {0}")]
    Decode(String),
    #[error("Failed to encode {format:?}: {message}")]
    Encode { format: ImageFormat, message: String },
}

/// Outcome of [`downscale`].
#[derive(Debug, PartialEq, Eq)]
pub enum Downscaled {
    /// Already within bounds; keep the original bytes.
    Unchanged,
    /// Re-encoded bytes of the shrunk image.
    Resized(Vec<u8>),
}

/// Shrink an encoded image to fit `params.bounds`.
///
/// `extension` (without the dot) picks the output encoding so the stored
/// bytes match the file name; the sniffed input format is used when the
/// extension is not an image format.
pub fn downscale(
    bytes: &[u8],
    extension: &str,
    params: DownscaleParams,
) -> Result<Downscaled, ImagingError> {
    let format = image::guess_format(bytes).map_err(|e| ImagingError::Decode(e.to_string()))?;
    let img = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| ImagingError::Decode(e.to_string()))?;

    let Some((width, height)) = fit_within((img.width(), img.height()), params.bounds) else {
        return Ok(Downscaled::Unchanged);
    };

    let resized = img.resize_exact(width, height, FilterType::Lanczos3);
    let target = ImageFormat::from_extension(extension).unwrap_or(format);
    encode(&resized, target, params.quality).map(Downscaled::Resized)
}

fn encode(
    img: &DynamicImage,
    format: ImageFormat,
    quality: Quality,
) -> Result<Vec<u8>, ImagingError> {
    let encode_failed = |e: image::ImageError| ImagingError::Encode {
        format,
        message: e.to_string(),
    };
    let mut buf = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            // JPEG has no alpha channel.
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality.value() as u8);
            rgb.write_with_encoder(encoder).map_err(encode_failed)?;
        }
        other => {
            img.write_to(&mut Cursor::new(&mut buf), other)
                .map_err(encode_failed)?;
        }
    }
    Ok(buf)
}
