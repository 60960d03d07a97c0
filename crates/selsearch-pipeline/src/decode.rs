//! Image decoding.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, WebP) and produces the
//! 8-bit RGB raster every later stage works on. Alpha is dropped.

use image::RgbImage;

use crate::types::SearchError;

/// Decode raw image bytes into an 8-bit RGB image.
///
/// Any color type the `image` crate can decode is converted to RGB;
/// grayscale inputs are replicated across the three channels.
///
/// # Errors
///
/// Returns [`SearchError::EmptyInput`] if `bytes` is empty.
/// Returns [`SearchError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
#[must_use = "returns the decoded image"]
pub fn decode(bytes: &[u8]) -> Result<RgbImage, SearchError> {
    if bytes.is_empty() {
        return Err(SearchError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgb8())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Encode an RGBA image as a PNG byte buffer.
    fn encode_png(img: &image::RgbaImage) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();
        buf
    }

    #[test]
    fn empty_input_returns_error() {
        let result = decode(&[]);
        assert!(matches!(result, Err(SearchError::EmptyInput)));
    }

    #[test]
    fn corrupt_bytes_returns_image_decode_error() {
        let result = decode(&[0xFF, 0xFE, 0x00, 0x01]);
        assert!(matches!(result, Err(SearchError::ImageDecode(_))));
    }

    #[test]
    fn valid_png_keeps_color_and_drops_alpha() {
        let img = image::RgbaImage::from_fn(2, 2, |_, _| image::Rgba([200, 100, 50, 128]));
        let rgb = decode(&encode_png(&img)).unwrap();
        for pixel in rgb.pixels() {
            assert_eq!(pixel.0, [200, 100, 50]);
        }
    }

    #[test]
    fn output_dimensions_match_input() {
        let img = image::RgbaImage::from_fn(17, 31, |_, _| image::Rgba([128, 64, 32, 255]));
        let rgb = decode(&encode_png(&img)).unwrap();
        assert_eq!(rgb.dimensions(), (17, 31));
    }
}
