use axum::extract::{multipart::MultipartRejection, Multipart};
use bytes::Bytes;
use image::ImageReader;
use std::io::Cursor;
use thiserror::Error;

/// Form field holding the image, also the field name the gateway expects.
pub const IMAGE_FIELD: &str = "imagen";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    #[error("This field is required.")]
    Missing,
    #[error("No file was submitted. Check the encoding type on the form.")]
    NoFileName,
    #[error("The submitted file is empty.")]
    Empty,
    #[error("Upload a valid image. The file you uploaded was either not an image or a corrupted image.")]
    NotAnImage,
    #[error("The form could not be read: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl ImageUpload {
    /// Reads the upload from a request body that axum may have refused to
    /// treat as multipart.
    pub async fn from_request(
        multipart: Result<Multipart, MultipartRejection>,
    ) -> Result<Self, FormError> {
        match multipart {
            Ok(mut multipart) => Self::from_multipart(&mut multipart).await,
            Err(rejection) => Err(FormError::Malformed(rejection.body_text())),
        }
    }

    pub async fn from_multipart(multipart: &mut Multipart) -> Result<Self, FormError> {
        let mut image_field = None;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| FormError::Malformed(e.to_string()))?
        {
            if field.name() != Some(IMAGE_FIELD) {
                tracing::debug!("Ignoring form field {:?}", field.name());
                continue;
            }

            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| FormError::Malformed(e.to_string()))?;
            image_field = Some((file_name, content_type, data));
        }

        let (file_name, content_type, data) = image_field.ok_or(FormError::Missing)?;
        tokio::task::spawn_blocking(move || Self::validate(file_name, content_type, data))
            .await
            .map_err(|e| FormError::Malformed(e.to_string()))?
    }

    /// Checks the submitted file the way the upload form requires: a named,
    /// non-empty file that decodes as an image. Decoding is CPU bound.
    pub fn validate(
        file_name: Option<String>,
        content_type: Option<String>,
        data: Bytes,
    ) -> Result<Self, FormError> {
        let file_name = match file_name {
            Some(name) if !name.is_empty() => name,
            // browsers send an unnamed empty part when no file was chosen
            _ if data.is_empty() => return Err(FormError::Missing),
            _ => return Err(FormError::NoFileName),
        };

        if data.is_empty() {
            return Err(FormError::Empty);
        }

        verify_image(&data).inspect_err(|e| {
            tracing::warn!(file_name = %file_name, error = %e, "Uploaded file is not a valid image")
        })?;

        Ok(Self {
            file_name,
            content_type,
            data,
        })
    }
}

fn verify_image(data: &[u8]) -> Result<(), FormError> {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|_| FormError::NotAnImage)?
        .decode()
        .map_err(|_| FormError::NotAnImage)?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Luma};

    pub fn png_image() -> Vec<u8> {
        let img = ImageBuffer::<Luma<u8>, Vec<u8>>::from_fn(32, 32, |x, y| {
            Luma([((x * 8) ^ (y * 8)) as u8])
        });
        let mut data = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
            .unwrap();
        data
    }

    fn named_png(data: Vec<u8>) -> Result<ImageUpload, FormError> {
        ImageUpload::validate(
            Some("seven.png".to_string()),
            Some("image/png".to_string()),
            Bytes::from(data),
        )
    }

    #[test]
    fn test_accepts_named_image() {
        let upload = named_png(png_image()).unwrap();

        assert_eq!(upload.file_name, "seven.png");
        assert_eq!(upload.content_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn test_no_file_chosen_is_missing() {
        let result = ImageUpload::validate(Some(String::new()), None, Bytes::new());

        assert_eq!(result.unwrap_err(), FormError::Missing);
    }

    #[test]
    fn test_unnamed_file_is_rejected() {
        let result = ImageUpload::validate(None, None, Bytes::from(png_image()));

        assert_eq!(result.unwrap_err(), FormError::NoFileName);
    }

    #[test]
    fn test_empty_file_is_rejected() {
        let result = ImageUpload::validate(Some("seven.png".to_string()), None, Bytes::new());

        assert_eq!(result.unwrap_err(), FormError::Empty);
    }

    #[test]
    fn test_non_image_is_rejected() {
        let result = ImageUpload::validate(
            Some("notes.txt".to_string()),
            Some("text/plain".to_string()),
            Bytes::from_static(b"just some text"),
        );

        assert_eq!(result.unwrap_err(), FormError::NotAnImage);
    }

    #[test]
    fn test_truncated_image_is_rejected() {
        let mut data = png_image();
        data.truncate(data.len() / 2);

        assert_eq!(named_png(data).unwrap_err(), FormError::NotAnImage);
    }

    #[test]
    fn test_bare_png_signature_is_rejected() {
        let data = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR".to_vec();

        assert_eq!(named_png(data).unwrap_err(), FormError::NotAnImage);
    }
}
