//! Gaussian pre-smoothing for segmentation.
//!
//! Wraps [`imageproc::filter::gaussian_blur_f32`] to suppress pixel noise
//! that would otherwise split flat areas into many tiny components.

use image::{GrayImage, Luma, Rgb, RgbImage};

/// Apply Gaussian blur to an RGB image by blurring each channel
/// independently.
///
/// `imageproc::filter::gaussian_blur_f32` is applied to one
/// single-channel image per color channel, and the results are
/// reassembled. Non-positive sigma values return the image unchanged,
/// since `imageproc` panics on `sigma <= 0.0`.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur_rgb(image: &RgbImage, sigma: f32) -> RgbImage {
    if sigma <= 0.0 || image.width() == 0 || image.height() == 0 {
        return image.clone();
    }

    let (w, h) = image.dimensions();

    let channels: [GrayImage; 3] = std::array::from_fn(|c| {
        GrayImage::from_fn(w, h, |x, y| Luma([image.get_pixel(x, y).0[c]]))
    });

    let blurred: [GrayImage; 3] =
        std::array::from_fn(|c| imageproc::filter::gaussian_blur_f32(&channels[c], sigma));

    RgbImage::from_fn(w, h, |x, y| {
        Rgb([
            blurred[0].get_pixel(x, y).0[0],
            blurred[1].get_pixel(x, y).0[0],
            blurred[2].get_pixel(x, y).0[0],
        ])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Black left half, white right half.
    fn sharp_edge_image() -> RgbImage {
        RgbImage::from_fn(10, 10, |x, _| {
            if x < 5 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        })
    }

    #[test]
    fn zero_sigma_returns_clone() {
        let img = sharp_edge_image();
        assert_eq!(gaussian_blur_rgb(&img, 0.0), img);
        assert_eq!(gaussian_blur_rgb(&img, -1.0), img);
    }

    #[test]
    fn blur_softens_edge() {
        let blurred = gaussian_blur_rgb(&sharp_edge_image(), 1.5);
        let left = blurred.get_pixel(4, 5).0[0];
        let right = blurred.get_pixel(5, 5).0[0];
        assert!(left > 0, "pixel left of the edge should brighten, got {left}");
        assert!(right < 255, "pixel right of the edge should darken, got {right}");
    }

    #[test]
    fn channels_blur_independently() {
        let img = RgbImage::from_pixel(6, 6, Rgb([200, 10, 90]));
        let blurred = gaussian_blur_rgb(&img, 2.0);
        for pixel in blurred.pixels() {
            assert!(pixel.0[0].abs_diff(200) <= 1);
            assert!(pixel.0[1].abs_diff(10) <= 1);
            assert!(pixel.0[2].abs_diff(90) <= 1);
        }
    }

    #[test]
    fn empty_image_is_unchanged() {
        let img = RgbImage::new(0, 0);
        assert_eq!(gaussian_blur_rgb(&img, 1.0).dimensions(), (0, 0));
    }
}
