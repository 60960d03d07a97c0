//! Resizing to the square working resolution.
//!
//! Selective search runs on a fixed `N x N` working image so that the
//! size and fill cues are comparable across inputs. The aspect ratio
//! is not preserved; proposal rectangles refer to the working image.

use std::fmt;

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Resampling filter used when resizing.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality,
/// with a `Disabled` variant to skip resizing entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResizeFilter {
    /// Skip resizing; the image is processed at its native size.
    Disabled,
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, decent quality.
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest.
    Lanczos3,
}

impl ResizeFilter {
    /// Convert to the `image` crate's `FilterType`.
    ///
    /// Returns `None` for [`ResizeFilter::Disabled`].
    const fn to_image_filter(self) -> Option<image::imageops::FilterType> {
        match self {
            Self::Disabled => None,
            Self::Nearest => Some(image::imageops::FilterType::Nearest),
            Self::Triangle => Some(image::imageops::FilterType::Triangle),
            Self::CatmullRom => Some(image::imageops::FilterType::CatmullRom),
            Self::Gaussian => Some(image::imageops::FilterType::Gaussian),
            Self::Lanczos3 => Some(image::imageops::FilterType::Lanczos3),
        }
    }
}

impl fmt::Display for ResizeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("Disabled"),
            Self::Nearest => f.write_str("Nearest"),
            Self::Triangle => f.write_str("Triangle"),
            Self::CatmullRom => f.write_str("CatmullRom"),
            Self::Gaussian => f.write_str("Gaussian"),
            Self::Lanczos3 => f.write_str("Lanczos3"),
        }
    }
}

/// Resize `image` to exactly `side x side` pixels.
///
/// Returns the (possibly unchanged) image and whether resizing was
/// actually applied. Images already at the target shape, and any image
/// when `filter` is [`ResizeFilter::Disabled`], are returned as-is.
#[must_use]
pub fn resize_square(image: &RgbImage, side: u32, filter: ResizeFilter) -> (RgbImage, bool) {
    let Some(image_filter) = filter.to_image_filter() else {
        return (image.clone(), false);
    };

    if image.dimensions() == (side, side) || image.width() == 0 || image.height() == 0 {
        return (image.clone(), false);
    }

    let resized = image::imageops::resize(image, side, side, image_filter);
    (resized, true)
}
