//! Image inputs and the camera capture lifecycle
//!
//! Anything that only lives inside the current session (camera frames,
//! dropped files, object URLs) is sent as a self-contained base64 payload.
//! Remote http(s) URLs are sent untouched.

use crate::model::ImageSource;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Errors from resolving or encoding an image
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("{0} is only valid inside the session that created it; attach the image itself")]
    TransientReference(String),

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid data URL")]
    InvalidDataUrl,

    #[error("Could not read image {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Camera error: {0}")]
    Camera(String),
}

/// An image the user selected
#[derive(Clone, PartialEq)]
pub enum ImageInput {
    /// A remote http(s) URL
    RemoteUrl(String),
    /// Encoded image bytes held in memory
    InMemory { bytes: Vec<u8>, mime: String },
    /// An already self-contained `data:image/...;base64,` URL
    DataUrl(String),
    /// An object URL (`blob:`) valid only inside the page that created it
    SessionRef(String),
}

impl std::fmt::Debug for ImageInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageInput::RemoteUrl(url) => f.debug_tuple("RemoteUrl").field(url).finish(),
            ImageInput::InMemory { bytes, mime } => f
                .debug_struct("InMemory")
                .field("len", &bytes.len())
                .field("mime", mime)
                .finish(),
            ImageInput::DataUrl(data) => write!(f, "DataUrl(<{} bytes>)", data.len()),
            ImageInput::SessionRef(url) => f.debug_tuple("SessionRef").field(url).finish(),
        }
    }
}

impl ImageInput {
    /// Classify user input: a URL, a data URL, an object URL or a local file
    pub async fn from_user_input(input: &str) -> Result<Self, ImageError> {
        let input = input.trim();
        let lower = input.to_ascii_lowercase();

        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(ImageInput::RemoteUrl(input.to_string()));
        }
        if lower.starts_with("data:") {
            return Self::data_url(input);
        }
        if lower.starts_with("blob:") {
            return Ok(ImageInput::SessionRef(input.to_string()));
        }

        let path = input.strip_prefix("file://").unwrap_or(input);
        let mime = mime_for_path(Path::new(path))?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ImageError::Unreadable {
                path: path.to_string(),
                source,
            })?;
        debug!(path, len = bytes.len(), "Read local image");
        Ok(ImageInput::InMemory {
            bytes,
            mime: mime.to_string(),
        })
    }

    /// Wrap encoded bytes, e.g. a camera frame
    pub fn from_bytes(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        ImageInput::InMemory {
            bytes,
            mime: mime.into(),
        }
    }

    fn data_url(input: &str) -> Result<Self, ImageError> {
        let (header, payload) = input.split_once(',').ok_or(ImageError::InvalidDataUrl)?;
        if !header.starts_with("data:image/") || !header.ends_with(";base64") {
            return Err(ImageError::InvalidDataUrl);
        }
        B64.decode(payload.trim())
            .map_err(|_| ImageError::InvalidDataUrl)?;
        Ok(ImageInput::DataUrl(input.to_string()))
    }

    /// The `image` string and `source` to put in a generation request
    pub fn to_payload(&self) -> Result<(String, ImageSource), ImageError> {
        match self {
            ImageInput::RemoteUrl(url) => Ok((url.clone(), ImageSource::Url)),
            ImageInput::DataUrl(data) => Ok((data.clone(), ImageSource::Base64)),
            ImageInput::InMemory { bytes, mime } => Ok((
                format!("data:{};base64,{}", mime, B64.encode(bytes)),
                ImageSource::Base64,
            )),
            ImageInput::SessionRef(url) => Err(ImageError::TransientReference(url.clone())),
        }
    }
}

fn mime_for_path(path: &Path) -> Result<&'static str, ImageError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "png" => Ok("image/png"),
        "webp" => Ok("image/webp"),
        "bmp" => Ok("image/bmp"),
        "tif" | "tiff" => Ok("image/tiff"),
        _ => Err(ImageError::UnsupportedFormat(path.display().to_string())),
    }
}

/// A still frame grabbed from a camera
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub bytes: Vec<u8>,
    pub mime: String,
}

/// A live camera stream
pub trait CameraDevice {
    /// Grab one encoded still frame
    fn capture_frame(&mut self) -> Result<CapturedFrame, ImageError>;

    /// Stop every track of the stream
    fn stop(&mut self);
}

/// Scoped ownership of an acquired camera
///
/// The device is stopped exactly once: after a capture, on `cancel`, or
/// when the session is dropped on any other path.
pub struct CameraSession<D: CameraDevice> {
    device: Option<D>,
}

impl<D: CameraDevice> CameraSession<D> {
    pub fn open(device: D) -> Self {
        debug!("Camera acquired");
        Self {
            device: Some(device),
        }
    }

    pub fn is_active(&self) -> bool {
        self.device.is_some()
    }

    /// Take a picture and release the camera
    pub fn capture(mut self) -> Result<ImageInput, ImageError> {
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| ImageError::Camera("camera already released".to_string()))?;
        let frame = device.capture_frame();
        self.release();
        let frame = frame?;
        Ok(ImageInput::from_bytes(frame.bytes, frame.mime))
    }

    /// Release without capturing
    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.stop();
            debug!("Camera released");
        }
    }
}

impl<D: CameraDevice> Drop for CameraSession<D> {
    fn drop(&mut self) {
        self.release();
    }
}
