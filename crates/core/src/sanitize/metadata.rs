//! Metadata stripping by decode and re-encode.
//!
//! Decoding bakes the EXIF orientation into the pixels, and the encoders
//! write neither EXIF nor ICC chunks, so the re-encoded image carries no
//! metadata and no residual orientation tag.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use tokio_util::sync::CancellationToken;

use super::{ImageSanitizer, SanitizeError, SanitizeOutcome};
use crate::storage::{BlobStorage, StorageError};

const JPEG_QUALITY: u8 = 90;

/// [`ImageSanitizer`] for JPEG and PNG.
pub struct MetadataStrippingSanitizer {
    storage: Arc<dyn BlobStorage>,
}

impl MetadataStrippingSanitizer {
    /// Create over the storage holding the uploads.
    #[must_use]
    pub fn new(storage: Arc<dyn BlobStorage>) -> Self {
        Self { storage }
    }
}

fn supported_format(content_type: &str) -> Option<(ImageFormat, &'static str)> {
    match content_type.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some((ImageFormat::Jpeg, "image/jpeg")),
        "image/png" => Some((ImageFormat::Png, "image/png")),
        _ => None,
    }
}

/// Decode, apply orientation, and re-encode in the original format.
fn strip_metadata(data: &[u8], format: ImageFormat) -> image::ImageResult<Vec<u8>> {
    let mut decoder = ImageReader::with_format(Cursor::new(data), format).into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut decoded = DynamicImage::from_decoder(decoder)?;
    decoded.apply_orientation(orientation);

    let mut out = Vec::with_capacity(data.len());
    match format {
        ImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY))?;
        }
        _ => decoded.write_with_encoder(PngEncoder::new(&mut out))?,
    }
    Ok(out)
}

#[async_trait]
impl ImageSanitizer for MetadataStrippingSanitizer {
    async fn try_sanitize(
        &self,
        storage_path: &str,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<SanitizeOutcome, SanitizeError> {
        let Some((format, normalized_type)) = supported_format(content_type) else {
            tracing::debug!(storage_path, content_type, "Content type not sanitized");
            return Ok(SanitizeOutcome::unchanged());
        };

        let original = match self.storage.open_read(storage_path, cancel).await {
            Ok(bytes) => bytes,
            Err(StorageError::Cancelled) => return Err(SanitizeError::Cancelled),
            Err(e) => {
                tracing::warn!(storage_path, error = %e, "Failed to read image for sanitization");
                return Ok(SanitizeOutcome::unchanged());
            }
        };

        let input = original.clone();
        let decode = tokio::task::spawn_blocking(move || strip_metadata(&input, format));
        let sanitized = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SanitizeError::Cancelled),
            joined = decode => joined,
        };
        let sanitized = match sanitized {
            Ok(Ok(bytes)) => Bytes::from(bytes),
            Ok(Err(e)) => {
                tracing::warn!(storage_path, error = %e, "Image could not be decoded, leaving as uploaded");
                return Ok(SanitizeOutcome::unchanged());
            }
            Err(e) => {
                tracing::warn!(storage_path, error = %e, "Sanitization task failed");
                return Ok(SanitizeOutcome::unchanged());
            }
        };

        if sanitized == original {
            return Ok(SanitizeOutcome::unchanged());
        }

        let new_length = sanitized.len() as u64;
        match self
            .storage
            .overwrite(storage_path, sanitized, normalized_type, cancel)
            .await
        {
            Ok(()) => {
                tracing::debug!(storage_path, new_length, "Image metadata stripped");
                Ok(SanitizeOutcome {
                    changed: true,
                    new_length: Some(new_length),
                    new_content_type: Some(normalized_type.to_string()),
                })
            }
            Err(StorageError::Cancelled) => Err(SanitizeError::Cancelled),
            Err(e) => {
                tracing::warn!(storage_path, error = %e, "Failed to store sanitized image");
                Ok(SanitizeOutcome::unchanged())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{LoopbackBlobStorage, LoopbackStore};
    use image::metadata::Orientation;
    use image::{Rgb, RgbImage};

    const PATH: &str = "incidents/1/2/photo.jpg";

    fn jpeg_fixture() -> Vec<u8> {
        let img = RgbImage::from_fn(32, 16, |x, y| {
            Rgb([u8::try_from(x * 8).unwrap(), u8::try_from(y * 16).unwrap(), 128])
        });
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Jpeg)
            .unwrap();
        buffer
    }

    /// APP1 segment with a little-endian TIFF IFD holding Orientation = 6 (rotate 90).
    fn exif_orientation_segment() -> Vec<u8> {
        let mut tiff = Vec::new();
        tiff.extend_from_slice(b"II*\0");
        tiff.extend_from_slice(&8u32.to_le_bytes());
        tiff.extend_from_slice(&1u16.to_le_bytes());
        tiff.extend_from_slice(&0x0112u16.to_le_bytes());
        tiff.extend_from_slice(&3u16.to_le_bytes());
        tiff.extend_from_slice(&1u32.to_le_bytes());
        tiff.extend_from_slice(&6u16.to_le_bytes());
        tiff.extend_from_slice(&0u16.to_le_bytes());
        tiff.extend_from_slice(&0u32.to_le_bytes());

        let mut payload = b"Exif\0\0".to_vec();
        payload.extend_from_slice(&tiff);
        segment(0xE1, &payload)
    }

    /// APP2 segment carrying a single-chunk ICC profile.
    fn icc_profile_segment() -> Vec<u8> {
        let mut payload = b"ICC_PROFILE\0".to_vec();
        payload.extend_from_slice(&[1, 1]);
        payload.extend_from_slice(&[0x42; 128]);
        segment(0xE2, &payload)
    }

    fn segment(marker: u8, payload: &[u8]) -> Vec<u8> {
        let length = u16::try_from(payload.len() + 2).unwrap();
        let mut out = vec![0xFF, marker];
        out.extend_from_slice(&length.to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    /// The plain fixture with EXIF and ICC segments spliced in after SOI.
    fn jpeg_with_metadata() -> Vec<u8> {
        let plain = jpeg_fixture();
        let mut out = plain[..2].to_vec();
        out.extend(exif_orientation_segment());
        out.extend(icc_profile_segment());
        out.extend_from_slice(&plain[2..]);
        out
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|window| window == needle)
    }

    fn orientation_of(data: &[u8]) -> Orientation {
        ImageReader::with_format(Cursor::new(data), ImageFormat::Jpeg)
            .into_decoder()
            .unwrap()
            .orientation()
            .unwrap()
    }

    fn sanitizer_with(store: &LoopbackStore) -> MetadataStrippingSanitizer {
        MetadataStrippingSanitizer::new(Arc::new(LoopbackBlobStorage::new(
            store.clone(),
            "http://localhost:8080",
        )))
    }

    #[test]
    fn test_supported_formats() {
        assert_eq!(
            supported_format("IMAGE/JPEG").map(|(_, ct)| ct),
            Some("image/jpeg")
        );
        assert_eq!(
            supported_format("image/png").map(|(_, ct)| ct),
            Some("image/png")
        );
        assert!(supported_format("image/gif").is_none());
        assert!(supported_format("application/pdf").is_none());
    }

    #[test]
    fn test_strip_metadata_preserves_dimensions() {
        let stripped = strip_metadata(&jpeg_fixture(), ImageFormat::Jpeg).unwrap();
        let decoded = image::load_from_memory_with_format(&stripped, ImageFormat::Jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 16));
    }

    #[test]
    fn test_strip_metadata_removes_exif_and_icc() {
        let original = jpeg_with_metadata();
        assert_eq!(orientation_of(&original), Orientation::Rotate90);
        assert!(contains(&original, b"Exif\0\0"));
        assert!(contains(&original, b"ICC_PROFILE\0"));

        let stripped = strip_metadata(&original, ImageFormat::Jpeg).unwrap();

        assert!(!contains(&stripped, b"Exif\0\0"));
        assert!(!contains(&stripped, b"ICC_PROFILE\0"));
        assert_eq!(orientation_of(&stripped), Orientation::NoTransforms);
    }

    #[test]
    fn test_strip_metadata_applies_orientation() {
        let stripped = strip_metadata(&jpeg_with_metadata(), ImageFormat::Jpeg).unwrap();
        let decoded = image::load_from_memory_with_format(&stripped, ImageFormat::Jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 32));
    }

    #[tokio::test]
    async fn test_rewrites_tagged_jpeg_without_metadata() {
        let store = LoopbackStore::new();
        let original = Bytes::from(jpeg_with_metadata());
        store.put(PATH, original.clone(), "image/jpeg");
        let sanitizer = sanitizer_with(&store);

        let outcome = sanitizer
            .try_sanitize(PATH, "image/jpeg", &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.changed);
        let stored = store.content(PATH).unwrap();
        assert_ne!(stored, original);
        assert_eq!(outcome.new_length, Some(stored.len() as u64));
        assert!(!contains(&stored, b"Exif\0\0"));
        assert!(!contains(&stored, b"ICC_PROFILE\0"));
        let decoded = image::load_from_memory_with_format(&stored, ImageFormat::Jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 32));
    }

    #[tokio::test]
    async fn test_rewrites_jpeg_in_place() {
        let store = LoopbackStore::new();
        store.put(PATH, Bytes::from(jpeg_fixture()), "image/jpeg");
        let sanitizer = sanitizer_with(&store);

        let outcome = sanitizer
            .try_sanitize(PATH, "image/jpeg", &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.changed);
        let stored = store.properties(PATH).unwrap();
        assert_eq!(outcome.new_length, Some(stored.length));
        assert_eq!(outcome.new_content_type.as_deref(), Some("image/jpeg"));
    }

    #[tokio::test]
    async fn test_unsupported_type_is_noop() {
        let store = LoopbackStore::new();
        store.put("incidents/1/2/a.pdf", Bytes::from_static(b"%PDF-1.7"), "application/pdf");
        let sanitizer = sanitizer_with(&store);

        let outcome = sanitizer
            .try_sanitize("incidents/1/2/a.pdf", "application/pdf", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, SanitizeOutcome::unchanged());
        assert_eq!(
            store.content("incidents/1/2/a.pdf").unwrap(),
            Bytes::from_static(b"%PDF-1.7")
        );
    }

    #[tokio::test]
    async fn test_corrupt_image_is_noop() {
        let store = LoopbackStore::new();
        store.put(PATH, Bytes::from_static(b"not a jpeg"), "image/jpeg");
        let sanitizer = sanitizer_with(&store);

        let outcome = sanitizer
            .try_sanitize(PATH, "image/jpeg", &CancellationToken::new())
            .await
            .unwrap();

        assert!(!outcome.changed);
        assert_eq!(store.content(PATH).unwrap(), Bytes::from_static(b"not a jpeg"));
    }

    #[tokio::test]
    async fn test_missing_object_is_noop() {
        let sanitizer = sanitizer_with(&LoopbackStore::new());
        let outcome = sanitizer
            .try_sanitize(PATH, "image/jpeg", &CancellationToken::new())
            .await
            .unwrap();
        assert!(!outcome.changed);
    }

    #[tokio::test]
    async fn test_cancellation_is_reported() {
        let store = LoopbackStore::new();
        store.put(PATH, Bytes::from(jpeg_fixture()), "image/jpeg");
        let sanitizer = sanitizer_with(&store);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = sanitizer.try_sanitize(PATH, "image/jpeg", &cancel).await;
        assert_eq!(result, Err(SanitizeError::Cancelled));
    }
}
