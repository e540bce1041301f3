use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, ImageError, RgbaImage};
use rfd::FileDialog;
use std::path::{Path, PathBuf};

/// Extensions offered by the image picker.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp"];

const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug)]
pub enum ImageIoError {
    Io(std::io::Error),
    Decode(String),
    Encode(String),
    Base64(String),
    Empty,
}

impl std::fmt::Display for ImageIoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageIoError::Io(e) => write!(f, "I/O error: {}", e),
            ImageIoError::Decode(e) => write!(f, "Could not decode image: {}", e),
            ImageIoError::Encode(e) => write!(f, "Could not encode image: {}", e),
            ImageIoError::Base64(e) => write!(f, "Invalid base64 payload: {}", e),
            ImageIoError::Empty => write!(f, "Image has no pixels"),
        }
    }
}

impl std::error::Error for ImageIoError {}

impl From<std::io::Error> for ImageIoError {
    fn from(e: std::io::Error) -> Self {
        ImageIoError::Io(e)
    }
}

impl From<base64::DecodeError> for ImageIoError {
    fn from(e: base64::DecodeError) -> Self {
        ImageIoError::Base64(e.to_string())
    }
}

impl From<ImageError> for ImageIoError {
    fn from(e: ImageError) -> Self {
        match e {
            ImageError::IoError(io) => ImageIoError::Io(io),
            ImageError::Encoding(enc) => ImageIoError::Encode(enc.to_string()),
            other => ImageIoError::Decode(other.to_string()),
        }
    }
}

// ============================================================================
// DECODE / ENCODE
// ============================================================================

/// Decode any supported format from memory into RGBA8.
pub fn decode_image_bytes(bytes: &[u8]) -> Result<RgbaImage, ImageIoError> {
    if bytes.is_empty() {
        return Err(ImageIoError::Empty);
    }
    let rgba = image::load_from_memory(bytes)?.to_rgba8();
    if rgba.width() == 0 || rgba.height() == 0 {
        return Err(ImageIoError::Empty);
    }
    Ok(rgba)
}

pub fn load_image_file(path: &Path) -> Result<RgbaImage, ImageIoError> {
    let bytes = std::fs::read(path)?;
    decode_image_bytes(&bytes)
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ImageIoError> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ColorType::Rgba8,
    )?;
    Ok(buf)
}

pub fn save_png(image: &RgbaImage, path: &Path) -> Result<(), ImageIoError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, encode_png(image)?)?;
    Ok(())
}

// ============================================================================
// BASE64 / DATA URIs
// ============================================================================

/// Drop a `data:<mime>;base64,` header if present.
pub fn strip_data_uri(payload: &str) -> &str {
    let trimmed = payload.trim();
    if trimmed.starts_with("data:")
        && let Some((_, data)) = trimmed.split_once(',')
    {
        return data;
    }
    trimmed
}

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// PNG-encode and base64 without any data-URI header.
pub fn encode_base64_png(image: &RgbaImage) -> Result<String, ImageIoError> {
    Ok(encode_base64(&encode_png(image)?))
}

pub fn to_data_uri(image: &RgbaImage) -> Result<String, ImageIoError> {
    Ok(format!("{}{}", PNG_DATA_URI_PREFIX, encode_base64_png(image)?))
}

/// Decode a base64 image, with or without a data-URI header.
pub fn decode_base64_image(payload: &str) -> Result<RgbaImage, ImageIoError> {
    let bytes = STANDARD.decode(strip_data_uri(payload))?;
    decode_image_bytes(&bytes)
}

// ============================================================================
// FILE HANDLER — native dialogs
// ============================================================================

#[derive(Default)]
pub struct FileHandler {
    pub last_dir: Option<PathBuf>,
}

impl FileHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Native picker for an insect photo. Returns the path only.
    pub fn pick_image_path(&mut self) -> Option<PathBuf> {
        let mut dialog = FileDialog::new()
            .add_filter("Images", IMAGE_EXTENSIONS)
            .add_filter("All Files", &["*"]);
        if let Some(dir) = &self.last_dir {
            dialog = dialog.set_directory(dir);
        }
        let path = dialog.pick_file()?;
        self.last_dir = path.parent().map(Path::to_path_buf);
        Some(path)
    }

    pub fn pick_png_save_path(&mut self, default_name: &str) -> Option<PathBuf> {
        let mut dialog = FileDialog::new()
            .add_filter("PNG", &["png"])
            .set_file_name(default_name);
        if let Some(dir) = &self.last_dir {
            dialog = dialog.set_directory(dir);
        }
        let mut path = dialog.save_file()?;
        if path.extension().is_none() {
            path.set_extension("png");
        }
        self.last_dir = path.parent().map(Path::to_path_buf);
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn strips_data_uri_header() {
        assert_eq!(strip_data_uri("data:image/png;base64,AAAA"), "AAAA");
        assert_eq!(strip_data_uri("AAAA"), "AAAA");
    }

    #[test]
    fn data_uri_decodes_back() {
        let img = RgbaImage::from_pixel(3, 2, Rgba([214, 39, 40, 255]));
        let uri = to_data_uri(&img).unwrap();
        assert!(uri.starts_with(PNG_DATA_URI_PREFIX));
        assert_eq!(decode_base64_image(&uri).unwrap(), img);
    }

    #[test]
    fn empty_and_garbage_are_errors() {
        assert!(matches!(decode_image_bytes(&[]), Err(ImageIoError::Empty)));
        assert!(matches!(decode_image_bytes(b"not an image"), Err(ImageIoError::Decode(_))));
        assert!(matches!(decode_base64_image("@@@"), Err(ImageIoError::Base64(_))));
    }

    #[test]
    fn save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("mask.png");
        let img = RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 4]));
        save_png(&img, &path).unwrap();
        assert_eq!(load_image_file(&path).unwrap(), img);
    }
}
