//! Turns an uploaded image into the tensor the digit classifier expects.
//!
//! The classifier was trained on white digits over a black background, so a
//! light image (mean intensity above [`INVERSION_THRESHOLD`]) gets its colors
//! inverted before normalization.

use image::{
    imageops::{self, FilterType},
    GrayImage, ImageReader,
};
use ndarray::{Array4, ShapeError};
use std::io::Cursor;
use thiserror::Error;

/// Side length of the square classifier input.
pub const IMAGE_SIZE: u32 = 28;

/// Midpoint of the 0-255 range. Inversion only happens strictly above it.
pub const INVERSION_THRESHOLD: f64 = 128.0;

#[derive(Error, Debug)]
pub enum PreprocessingError {
    #[error("image data is empty")]
    EmptyInput,
    #[error("error decoding image: {0}")]
    Decode(String),
    #[error("invalid tensor shape: {0}")]
    Shape(#[from] ShapeError),
}

/// Decodes `image_data` and returns a `(1, 28, 28, 1)` tensor with values in `[0, 1]`.
pub fn preprocess_image(image_data: &[u8]) -> Result<Array4<f32>, PreprocessingError> {
    if image_data.is_empty() {
        return Err(PreprocessingError::EmptyInput);
    }

    transform_image(image_data).inspect_err(|e| {
        tracing::error!(
            error = %e,
            bytes = image_data.len(),
            "Image preprocessing failed"
        )
    })
}

fn transform_image(image_data: &[u8]) -> Result<Array4<f32>, PreprocessingError> {
    let image = ImageReader::new(Cursor::new(image_data))
        .with_guessed_format()
        .map_err(|e| PreprocessingError::Decode(e.to_string()))?
        .decode()
        .map_err(|e| PreprocessingError::Decode(e.to_string()))?;

    tracing::debug!(
        "Decoded {}x{} image with color type {:?}",
        image.width(),
        image.height(),
        image.color()
    );

    let grayscale = image.to_luma8();
    let mut resized = imageops::resize(&grayscale, IMAGE_SIZE, IMAGE_SIZE, FilterType::Lanczos3);

    let mean = mean_intensity(&resized);
    if needs_inversion(mean) {
        tracing::debug!("Mean intensity {:.2} above threshold, inverting colors", mean);
        imageops::invert(&mut resized);
    } else {
        tracing::debug!("Mean intensity {:.2} at or below threshold, keeping colors", mean);
    }

    let data: Vec<f32> = resized
        .into_raw()
        .into_iter()
        .map(|value| value as f32 / 255.)
        .collect();

    let side = IMAGE_SIZE as usize;
    let tensor = Array4::from_shape_vec((1, side, side, 1), data)?;
    tracing::debug!("Preprocessed tensor shape: {:?}", tensor.shape());

    Ok(tensor)
}

pub fn mean_intensity(image: &GrayImage) -> f64 {
    let pixel_count = (image.width() as u64) * (image.height() as u64);
    if pixel_count == 0 {
        return 0.;
    }
    let total: u64 = image.pixels().map(|pixel| pixel.0[0] as u64).sum();
    total as f64 / pixel_count as f64
}

fn needs_inversion(mean: f64) -> bool {
    mean > INVERSION_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, Luma, Rgb};

    fn encode_png(img: DynamicImage) -> Vec<u8> {
        let mut image_data: Vec<u8> = Vec::new();
        img.write_to(&mut Cursor::new(&mut image_data), image::ImageFormat::Png)
            .unwrap();
        image_data
    }

    fn uniform_gray(side: u32, value: u8) -> Vec<u8> {
        let img = ImageBuffer::<Luma<u8>, Vec<u8>>::from_pixel(side, side, Luma([value]));
        encode_png(DynamicImage::ImageLuma8(img))
    }

    #[test]
    fn test_output_shape_and_range_for_non_square_color_image() {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_fn(100, 40, |x, y| {
            Rgb([(x * 2) as u8, (y * 5) as u8, 90])
        });
        let tensor = preprocess_image(&encode_png(DynamicImage::ImageRgb8(img))).unwrap();

        assert_eq!(tensor.shape(), &[1, 28, 28, 1]);
        assert!(tensor.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_white_image_is_inverted_to_zeros() {
        let tensor = preprocess_image(&uniform_gray(28, 255)).unwrap();

        assert!(tensor.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_black_image_is_left_as_zeros() {
        let tensor = preprocess_image(&uniform_gray(28, 0)).unwrap();

        assert!(tensor.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_mean_exactly_at_threshold_is_not_inverted() {
        let tensor = preprocess_image(&uniform_gray(56, 128)).unwrap();

        let expected = 128.0_f32 / 255.0;
        assert!(tensor.iter().all(|v| (v - expected).abs() < 1e-6));
        assert!(!needs_inversion(INVERSION_THRESHOLD));
        assert!(needs_inversion(INVERSION_THRESHOLD + 0.01));
    }

    #[test]
    fn test_dark_digit_on_light_background_becomes_light_on_dark() {
        let img = ImageBuffer::<Luma<u8>, Vec<u8>>::from_fn(28, 28, |x, y| {
            if (10..18).contains(&x) && (10..18).contains(&y) {
                Luma([0])
            } else {
                Luma([255])
            }
        });
        let tensor = preprocess_image(&encode_png(DynamicImage::ImageLuma8(img))).unwrap();

        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        assert_eq!(tensor[[0, 14, 14, 0]], 1.0);
    }

    #[test]
    fn test_mean_intensity() {
        let img = ImageBuffer::<Luma<u8>, Vec<u8>>::from_fn(2, 2, |x, _| Luma([x as u8 * 100]));

        assert_eq!(mean_intensity(&img), 50.0);
    }

    #[test]
    fn test_empty_input_is_rejected_before_decoding() {
        let result = preprocess_image(&[]);

        assert!(matches!(result, Err(PreprocessingError::EmptyInput)));
    }

    #[test]
    fn test_invalid_bytes_fail_to_decode() {
        let result = preprocess_image(b"definitely not an image");

        assert!(matches!(result, Err(PreprocessingError::Decode(_))));
    }
}
