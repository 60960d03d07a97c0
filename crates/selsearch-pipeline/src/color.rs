//! RGB to HSV conversion on a 0-255 scale.
//!
//! Color histograms use a fixed `[0, 255]` range on every channel, so
//! hue, saturation and value are all rescaled onto that range here
//! rather than left in degrees or unit fractions.

use image::{Rgb, Rgb32FImage, RgbImage};

/// Convert one 8-bit RGB pixel to `[h, s, v]`, each in `[0, 255]`.
///
/// Hue is 0 for achromatic pixels; saturation is 0 for black.
#[must_use]
pub fn hsv_pixel(rgb: [u8; 3]) -> [f32; 3] {
    let [r, g, b] = rgb.map(|c| f32::from(c) / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let chroma = max - min;

    let sector = if chroma <= f32::EPSILON {
        0.0
    } else if (max - r).abs() <= f32::EPSILON {
        ((g - b) / chroma).rem_euclid(6.0)
    } else if (max - g).abs() <= f32::EPSILON {
        (b - r) / chroma + 2.0
    } else {
        (r - g) / chroma + 4.0
    };
    let hue = sector / 6.0;

    let saturation = if max <= f32::EPSILON { 0.0 } else { chroma / max };

    [hue * 255.0, saturation * 255.0, max * 255.0]
}

/// Convert an RGB image to HSV with every channel in `[0, 255]`.
#[must_use = "returns the HSV image"]
pub fn rgb_to_hsv(image: &RgbImage) -> Rgb32FImage {
    Rgb32FImage::from_fn(image.width(), image.height(), |x, y| {
        Rgb(hsv_pixel(image.get_pixel(x, y).0))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: [f32; 3], expected: [f32; 3]) {
        for (c, (a, e)) in actual.iter().zip(expected).enumerate() {
            assert!(
                (a - e).abs() < 1e-3,
                "channel {c}: expected {e}, got {a} (full: {actual:?})",
            );
        }
    }

    #[test]
    fn primaries() {
        assert_close(hsv_pixel([255, 0, 0]), [0.0, 255.0, 255.0]);
        assert_close(hsv_pixel([0, 255, 0]), [85.0, 255.0, 255.0]);
        assert_close(hsv_pixel([0, 0, 255]), [170.0, 255.0, 255.0]);
    }

    #[test]
    fn achromatic_pixels_have_zero_hue_and_saturation() {
        assert_close(hsv_pixel([0, 0, 0]), [0.0, 0.0, 0.0]);
        assert_close(hsv_pixel([128, 128, 128]), [0.0, 0.0, 128.0]);
        assert_close(hsv_pixel([255, 255, 255]), [0.0, 0.0, 255.0]);
    }

    #[test]
    fn magenta_wraps_hue_below_full_turn() {
        // Hue 300 degrees -> 300/360 * 255.
        assert_close(hsv_pixel([255, 0, 255]), [212.5, 255.0, 255.0]);
    }

    #[test]
    fn channels_stay_in_range() {
        for r in (0..=255u8).step_by(51) {
            for g in (0..=255u8).step_by(51) {
                for b in (0..=255u8).step_by(51) {
                    let hsv = hsv_pixel([r, g, b]);
                    for v in hsv {
                        assert!((0.0..=255.0).contains(&v), "{v} out of range for {r},{g},{b}");
                    }
                }
            }
        }
    }

    #[test]
    fn image_conversion_preserves_dimensions() {
        let img = RgbImage::from_pixel(5, 3, Rgb([10, 200, 30]));
        let hsv = rgb_to_hsv(&img);
        assert_eq!(hsv.dimensions(), (5, 3));
        assert_close(hsv.get_pixel(4, 2).0, hsv_pixel([10, 200, 30]));
    }
}
