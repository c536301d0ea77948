//! Image input and output: JPEG data URLs going out, base64 data URLs coming back

use crate::error::{Result, StudioError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::ImageFormat;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::debug;

/// An uploaded image, normalised to JPEG and ready to embed in a message
#[derive(Debug, Clone)]
pub struct ImageAttachment {
    data_url: String,
    size: usize,
}

impl ImageAttachment {
    /// Read and normalise an image file
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        debug!(path = %path.display(), bytes = bytes.len(), "loaded image");
        Self::from_bytes(&bytes)
    }

    /// Decode any supported format and re-encode it as JPEG
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory(bytes)?;
        // JPEG has no alpha channel
        let rgb = image::DynamicImage::ImageRgb8(decoded.to_rgb8());

        let mut buffer = Cursor::new(Vec::new());
        rgb.write_to(&mut buffer, ImageFormat::Jpeg)?;
        Ok(Self::from_jpeg_bytes(buffer.into_inner()))
    }

    /// Wrap bytes that are already JPEG
    pub fn from_jpeg_bytes(jpeg: Vec<u8>) -> Self {
        Self {
            data_url: format!("data:image/jpeg;base64,{}", STANDARD.encode(&jpeg)),
            size: jpeg.len(),
        }
    }

    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    /// Size of the encoded JPEG in bytes
    pub fn size(&self) -> usize {
        self.size
    }
}

/// An image returned by the model
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub mime: String,
    pub data: Vec<u8>,
}

impl GeneratedImage {
    /// Decode a `data:<mime>;base64,<payload>` URL
    pub fn from_data_url(url: &str) -> Result<Self> {
        let (header, payload) = url
            .split_once(',')
            .ok_or_else(|| StudioError::InvalidDataUrl("missing ',' separator".to_string()))?;

        let mime = header
            .strip_prefix("data:")
            .and_then(|rest| rest.split(';').next())
            .filter(|mime| !mime.is_empty())
            .unwrap_or("image/png")
            .to_string();

        let data = STANDARD.decode(payload.trim())?;
        Ok(Self { mime, data })
    }

    pub fn extension(&self) -> &str {
        match self.mime.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "png",
        }
    }

    /// Write the image into `dir` under a timestamped name
    pub fn save_in(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S%3f");
        let path = dir.join(format!("studio-{}.{}", stamp, self.extension()));
        std::fs::write(&path, &self.data)?;
        debug!(path = %path.display(), bytes = self.data.len(), "saved generated image");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_png() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 128]));
        let mut buffer = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_png_with_alpha_becomes_jpeg() {
        let attachment = ImageAttachment::from_bytes(&tiny_png()).unwrap();
        let payload = attachment
            .data_url()
            .strip_prefix("data:image/jpeg;base64,")
            .unwrap();
        let jpeg = STANDARD.decode(payload).unwrap();
        assert_eq!(&jpeg[..2], &[0xff, 0xd8]);
        assert_eq!(attachment.size(), jpeg.len());
    }

    #[test]
    fn test_garbage_is_rejected() {
        let err = ImageAttachment::from_bytes(b"not an image").unwrap_err();
        assert!(matches!(err, StudioError::ImageProcessing(_)));
    }

    #[test]
    fn test_data_url_roundtrip_to_disk() {
        let png = tiny_png();
        let url = format!("data:image/png;base64,{}", STANDARD.encode(&png));
        let image = GeneratedImage::from_data_url(&url).unwrap();
        assert_eq!(image.mime, "image/png");
        assert_eq!(image.extension(), "png");

        let dir = tempfile::tempdir().unwrap();
        let path = image.save_in(dir.path()).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), png);
    }

    #[test]
    fn test_data_url_without_comma() {
        let err = GeneratedImage::from_data_url("data:image/png;base64").unwrap_err();
        assert!(matches!(err, StudioError::InvalidDataUrl(_)));
    }

    #[test]
    fn test_webp_extension() {
        let image = GeneratedImage::from_data_url("data:image/webp;base64,AAAA").unwrap();
        assert_eq!(image.extension(), "webp");
    }
}
