// ============================================================================
// SEGMENTATION SERVICE + MASK LOG — HTTP collaborators
// ============================================================================

use image::RgbaImage;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::sync::mpsc;
use std::time::Duration;

use crate::io::{self, ImageIoError};

const SEGMENT_ROUTE: &str = "/api/segment";

#[derive(Debug)]
pub enum ServiceError {
    Http(String),
    Status(u16),
    Decode(String),
    Image(ImageIoError),
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::Http(e) => write!(f, "Request failed: {}", e),
            ServiceError::Status(code) => write!(f, "Service responded with HTTP {}", code),
            ServiceError::Decode(e) => write!(f, "Malformed service response: {}", e),
            ServiceError::Image(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ServiceError::Decode(e.to_string())
        } else {
            ServiceError::Http(e.to_string())
        }
    }
}

impl From<ImageIoError> for ServiceError {
    fn from(e: ImageIoError) -> Self {
        ServiceError::Image(e)
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        ServiceError::Decode(e.to_string())
    }
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Serialize)]
struct SegmentRequest<'a> {
    image_base64: &'a str,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SegmentResponse {
    pub segmented_image_base64: String,
    #[serde(default)]
    pub thorax_top: Option<f32>,
    #[serde(default)]
    pub thorax_bottom: Option<f32>,
}

/// Decoded segmentation result. Boundary rows are in the pixel space of the
/// image that was sent.
#[derive(Clone, Debug)]
pub struct Segmentation {
    pub mask: RgbaImage,
    pub thorax_top: Option<f32>,
    pub thorax_bottom: Option<f32>,
}

impl TryFrom<SegmentResponse> for Segmentation {
    type Error = ServiceError;

    fn try_from(resp: SegmentResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            mask: io::decode_base64_image(&resp.segmented_image_base64)?,
            thorax_top: resp.thorax_top,
            thorax_bottom: resp.thorax_bottom,
        })
    }
}

/// Body of the best-effort mask log call. Images are PNG data URIs.
#[derive(Serialize, Debug, Clone)]
pub struct MaskLogEntry {
    pub session_id: String,
    pub timestamp: u64,
    pub original: String,
    pub service_mask: Option<String>,
    pub edited_mask: String,
    pub thorax_top: f32,
    pub thorax_bottom: f32,
}

// ============================================================================
// CLIENTS
// ============================================================================

/// Anything that can turn a photo into a labeled mask.
pub trait Segmenter: Send + Sync {
    fn segment(&self, image: &RgbaImage) -> Result<Segmentation, ServiceError>;
}

#[derive(Clone)]
pub struct SegmentationClient {
    client: Client,
    base_url: String,
}

impl SegmentationClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .user_agent(concat!("InsectMask/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, SEGMENT_ROUTE)
    }
}

impl Segmenter for SegmentationClient {
    fn segment(&self, image: &RgbaImage) -> Result<Segmentation, ServiceError> {
        let payload = io::encode_base64_png(image)?;
        let url = self.endpoint();
        crate::log_info!("Segmentation request → {} ({}×{})", url, image.width(), image.height());

        let resp = self
            .client
            .post(&url)
            .json(&SegmentRequest { image_base64: &payload })
            .send()?;
        let status = resp.status();
        if !status.is_success() {
            crate::log_err!("Segmentation failed: HTTP {}", status.as_u16());
            return Err(ServiceError::Status(status.as_u16()));
        }
        let body: SegmentResponse = resp.json()?;
        let seg = Segmentation::try_from(body)?;
        crate::log_info!(
            "Segmentation done: mask {}×{}, top {:?}, bottom {:?}",
            seg.mask.width(),
            seg.mask.height(),
            seg.thorax_top,
            seg.thorax_bottom
        );
        Ok(seg)
    }
}

#[derive(Clone)]
pub struct MaskLogClient {
    client: Client,
    url: String,
}

impl MaskLogClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.trim().to_string(),
        })
    }

    pub fn send(&self, entry: &MaskLogEntry) -> Result<(), ServiceError> {
        let resp = self.client.post(&self.url).json(entry).send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ServiceError::Status(status.as_u16()));
        }
        Ok(())
    }
}

// ============================================================================
// BACKGROUND DISPATCH
// ============================================================================

/// Run `segmenter` on a worker thread; the result arrives on the receiver.
pub fn spawn_segmentation<S>(segmenter: S, image: RgbaImage) -> mpsc::Receiver<Result<Segmentation, ServiceError>>
where
    S: Segmenter + 'static,
{
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(segmenter.segment(&image));
    });
    rx
}

/// Fire-and-forget mask log. The receiver yields a notice string on failure;
/// dropping it is fine.
pub fn spawn_mask_log(client: MaskLogClient, entry: MaskLogEntry) -> mpsc::Receiver<Option<String>> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let notice = match client.send(&entry) {
            Ok(()) => {
                crate::log_info!("Mask log saved for session {}", entry.session_id);
                None
            }
            Err(e) => {
                crate::log_warn!("Mask log failed: {}", e);
                Some(format!("Could not save the mask log: {}", e))
            }
        };
        let _ = tx.send(notice);
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;

    /// Serve exactly one HTTP response on a local port.
    fn one_shot_server(status: &'static str, body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                let lower = line.to_ascii_lowercase();
                if let Some(v) = lower.strip_prefix("content-length:") {
                    content_length = v.trim().parse().unwrap();
                }
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }
            let mut buf = vec![0u8; content_length];
            reader.read_exact(&mut buf).unwrap();
            let mut stream = reader.into_inner();
            write!(
                stream,
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            )
            .unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn response_with_data_uri_decodes() {
        let mask = RgbaImage::from_pixel(2, 2, Rgba([44, 160, 44, 255]));
        let resp = SegmentResponse {
            segmented_image_base64: io::to_data_uri(&mask).unwrap(),
            thorax_top: Some(12.0),
            thorax_bottom: None,
        };
        let seg = Segmentation::try_from(resp).unwrap();
        assert_eq!(seg.mask, mask);
        assert_eq!(seg.thorax_top, Some(12.0));
        assert_eq!(seg.thorax_bottom, None);
    }

    #[test]
    fn missing_scalars_deserialize_as_none() {
        let resp: SegmentResponse = serde_json::from_str(r#"{"segmented_image_base64":"AAAA"}"#).unwrap();
        assert!(resp.thorax_top.is_none() && resp.thorax_bottom.is_none());
    }

    #[test]
    fn segment_round_trip_against_local_server() {
        let mask = RgbaImage::from_pixel(3, 3, Rgba([31, 119, 180, 255]));
        let body = serde_json::json!({
            "segmented_image_base64": io::to_data_uri(&mask).unwrap(),
            "thorax_top": 1,
            "thorax_bottom": 2,
        })
        .to_string();
        let url = one_shot_server("200 OK", body);
        let client = SegmentationClient::new(&url, Duration::from_secs(10)).unwrap();
        let rx = spawn_segmentation(client, RgbaImage::new(3, 3));
        let seg = rx.recv().unwrap().unwrap();
        assert_eq!(seg.mask, mask);
        assert_eq!((seg.thorax_top, seg.thorax_bottom), (Some(1.0), Some(2.0)));
    }

    #[test]
    fn non_success_status_is_an_error() {
        let url = one_shot_server("500 Internal Server Error", "{}".to_string());
        let client = SegmentationClient::new(&url, Duration::from_secs(10)).unwrap();
        match client.segment(&RgbaImage::new(2, 2)) {
            Err(ServiceError::Status(500)) => {}
            other => panic!("unexpected {:?}", other.map(|s| s.mask.dimensions())),
        }
    }
}
