//! Per-pixel texture descriptors.
//!
//! This module defines the [`TextureDescriptor`] trait for pluggable
//! texture maps and the [`TextureDescriptorKind`] enum for selecting one
//! at runtime. A descriptor produces one scalar per pixel per color
//! channel; region texture histograms bin those scalars over `[0, 1]`.

use image::{Rgb, Rgb32FImage, RgbImage};
use serde::{Deserialize, Serialize};

/// Selects which texture descriptor to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextureDescriptorKind {
    /// 8-neighbour local binary pattern at radius 1, normalized to `[0, 1]`.
    #[default]
    LocalBinaryPattern,
}

/// Trait for texture descriptor strategies.
///
/// Input: an RGB image.
/// Output: a float map of the same shape with one value per channel,
/// nominally in `[0, 1]`.
pub trait TextureDescriptor {
    /// Compute the texture map for `image`.
    fn describe(&self, image: &RgbImage) -> Rgb32FImage;
}

impl TextureDescriptor for TextureDescriptorKind {
    fn describe(&self, image: &RgbImage) -> Rgb32FImage {
        match *self {
            Self::LocalBinaryPattern => local_binary_pattern(image),
        }
    }
}

/// Neighbour offsets in bit order, counter-clockwise from the right.
const LBP_OFFSETS: [(i64, i64); 8] = [
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Largest possible 8-bit pattern code.
const LBP_MAX_CODE: f32 = 255.0;

/// Local binary pattern per channel.
///
/// Bit `k` of the code is set when neighbour `k` is at least as bright
/// as the centre. Neighbours outside the image are clamped to the
/// nearest edge pixel. The code is divided by 255.
#[must_use = "returns the texture map"]
pub fn local_binary_pattern(image: &RgbImage) -> Rgb32FImage {
    let (w, h) = image.dimensions();
    let max_x = i64::from(w) - 1;
    let max_y = i64::from(h) - 1;

    Rgb32FImage::from_fn(w, h, |x, y| {
        let centre = image.get_pixel(x, y).0;
        let mut codes = [0u8; 3];

        for (bit, &(dx, dy)) in LBP_OFFSETS.iter().enumerate() {
            let nx = (i64::from(x) + dx).clamp(0, max_x);
            let ny = (i64::from(y) + dy).clamp(0, max_y);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let neighbour = image.get_pixel(nx as u32, ny as u32).0;

            for c in 0..3 {
                if neighbour[c] >= centre[c] {
                    codes[c] |= 1 << bit;
                }
            }
        }

        Rgb(codes.map(|code| f32::from(code) / LBP_MAX_CODE))
    })
}
