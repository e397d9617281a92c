use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::error::AppError;

/// Encoded image awaiting analysis, kept as base64 text plus its media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    mime_type: String,
    data: String,
}

impl ImagePayload {
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Result<Self, AppError> {
        if bytes.is_empty() {
            return Err(AppError::UnreadableImage("image data is empty".to_string()));
        }
        Ok(Self {
            mime_type: mime_type.into(),
            data: general_purpose::STANDARD.encode(bytes),
        })
    }

    /// Compress a rendered frame as JPEG; `quality` is clamped to 1..=100.
    pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Self, AppError> {
        let mut buffer = Vec::new();
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
            encoder
                .encode(
                    image.as_raw(),
                    image.width(),
                    image.height(),
                    image::ColorType::Rgb8,
                )
                .map_err(|e| AppError::Encode(e.to_string()))?;
        }
        Self::from_bytes("image/jpeg", &buffer)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn base64_data(&self) -> &str {
        &self.data
    }

    pub fn decode_bytes(&self) -> Result<Vec<u8>, AppError> {
        general_purpose::STANDARD
            .decode(&self.data)
            .map_err(|e| AppError::UnreadableImage(e.to_string()))
    }

    pub fn decode_image(&self) -> Result<RgbImage, AppError> {
        let bytes = self.decode_bytes()?;
        Ok(image::load_from_memory(&bytes)?.to_rgb8())
    }
}

pub fn is_image_media_type(media_type: &str) -> bool {
    media_type.starts_with("image/")
}

/// Declared media type of a file, judged by its extension.
pub fn media_type_for_path(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        "ico" => "image/x-icon",
        "txt" | "md" => "text/plain",
        "json" => "application/json",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// A file chosen in the picker, read fully into memory.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub path: PathBuf,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl SelectedFile {
    pub fn new(path: impl Into<PathBuf>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    pub async fn read(path: PathBuf) -> Result<Self, AppError> {
        let bytes = tokio::fs::read(&path).await.map_err(|e| AppError::FileRead {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let media_type = media_type_for_path(&path);
        log::debug!("Read {} bytes from {} ({})", bytes.len(), path.display(), media_type);
        Ok(Self::new(path, media_type, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_image() -> RgbImage {
        RgbImage::from_fn(16, 8, |x, y| image::Rgb([(x * 16) as u8, (y * 32) as u8, 128]))
    }

    #[test]
    fn test_bytes_are_base64_encoded() {
        let payload = ImagePayload::from_bytes("image/png", &[0x89, 0x50, 0x4e, 0x47]).unwrap();
        assert_eq!(payload.mime_type(), "image/png");
        assert_eq!(payload.base64_data(), "iVBORw==");
        assert_eq!(payload.decode_bytes().unwrap(), vec![0x89, 0x50, 0x4e, 0x47]);
    }

    #[test]
    fn test_empty_bytes_rejected() {
        assert!(matches!(
            ImagePayload::from_bytes("image/png", &[]),
            Err(AppError::UnreadableImage(_))
        ));
    }

    #[test]
    fn test_jpeg_payload_decodes_back() {
        let image = sample_image();
        let payload = ImagePayload::encode_jpeg(&image, 90).unwrap();
        assert_eq!(payload.mime_type(), "image/jpeg");

        let decoded = payload.decode_image().unwrap();
        assert_eq!(decoded.dimensions(), (16, 8));
    }

    #[test]
    fn test_media_types() {
        assert_eq!(media_type_for_path(Path::new("lunch.JPG")), "image/jpeg");
        assert_eq!(media_type_for_path(Path::new("plate.webp")), "image/webp");
        assert_eq!(media_type_for_path(Path::new("notes.txt")), "text/plain");
        assert_eq!(media_type_for_path(Path::new("noext")), "application/octet-stream");
        assert!(is_image_media_type("image/png"));
        assert!(!is_image_media_type("text/plain"));
    }

    #[tokio::test]
    async fn test_read_selected_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("meal.png");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"not really a png").unwrap();

        let selected = SelectedFile::read(path.clone()).await.unwrap();
        assert_eq!(selected.media_type, "image/png");
        assert_eq!(selected.bytes, b"not really a png");

        let missing = SelectedFile::read(dir.path().join("gone.png")).await;
        assert!(matches!(missing, Err(AppError::FileRead { .. })));
    }
}
