//! Camera source selection values

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::CameraConfig;
use crate::error::CameraError;

/// Where frames come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// Local capture device
    Webcam,
    /// Remote HTTP(S)/MJPEG or RTSP stream
    IpStream,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Webcam => write!(f, "webcam"),
            SourceKind::IpStream => write!(f, "ip-stream"),
        }
    }
}

/// Immutable description of the active video source.
///
/// Replaced wholesale on every switch; there are no setters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSourceSpec {
    kind: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
}

impl CameraSourceSpec {
    /// A local webcam, optionally pinned to a device id
    pub fn webcam(device_id: Option<&str>, label: Option<&str>) -> Self {
        Self {
            kind: SourceKind::Webcam,
            device_id: device_id.map(str::to_string),
            url: None,
            label: label.map(str::to_string),
        }
    }

    /// A remote stream addressed by URL
    pub fn ip_stream(url: &str) -> Self {
        Self {
            kind: SourceKind::IpStream,
            device_id: None,
            url: Some(url.to_string()),
            label: Some("IP Camera".to_string()),
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Device id, ignoring empty strings
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Human-readable name for logs; never contains credentials
    pub fn display_name(&self) -> String {
        if let Some(label) = self.label() {
            return label.to_string();
        }
        match self.kind {
            SourceKind::Webcam => match self.device_id() {
                Some(id) => format!("webcam {}", id),
                None => "default webcam".to_string(),
            },
            SourceKind::IpStream => self
                .url()
                .map(redacted_url)
                .unwrap_or_else(|| "ip-stream".to_string()),
        }
    }

    /// Check that the value can be acquired at all
    pub fn validate(&self) -> Result<(), CameraError> {
        match self.kind {
            SourceKind::Webcam => Ok(()),
            SourceKind::IpStream => parse_remote_url(self.url()).map(|_| ()),
        }
    }
}

/// Remote address schemes handed to the media stack
pub const ACCEPTED_SCHEMES: &[&str] = &["http", "https", "rtsp"];

fn parse_remote_url(raw: Option<&str>) -> Result<Url, CameraError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CameraError::InvalidSource("IP camera URL is required".to_string()))?;

    let url = Url::parse(raw)
        .map_err(|e| CameraError::InvalidSource(format!("{}: {}", redacted_url(raw), e)))?;

    if !ACCEPTED_SCHEMES.contains(&url.scheme()) {
        return Err(CameraError::InvalidSource(format!(
            "unsupported scheme '{}' (expected http, https or rtsp)",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(CameraError::InvalidSource("URL has no host".to_string()));
    }

    Ok(url)
}

/// Mask the password part of a stream URL for logging
pub fn redacted_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("***"));
            }
            url.to_string()
        }
        Err(_) => "<invalid url>".to_string(),
    }
}

/// Concrete acquisition request derived from a source spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoRequest {
    /// Open exactly this device
    ExactDevice { device_id: String },
    /// Best-effort high resolution feed with the preferred facing mode
    BestEffort {
        ideal_width: u32,
        ideal_height: u32,
        facing_mode: String,
    },
    /// Assign the URL directly to the playback sink
    Remote { url: String },
}

impl VideoRequest {
    /// Build the request for a source, validating remote addresses
    pub fn for_source(source: &CameraSourceSpec, config: &CameraConfig) -> Result<Self, CameraError> {
        match source.kind() {
            SourceKind::Webcam => Ok(match source.device_id() {
                Some(id) => VideoRequest::ExactDevice {
                    device_id: id.to_string(),
                },
                None => VideoRequest::BestEffort {
                    ideal_width: config.ideal_width,
                    ideal_height: config.ideal_height,
                    facing_mode: config.facing_mode.clone(),
                },
            }),
            SourceKind::IpStream => {
                let url = parse_remote_url(source.url())?;
                Ok(VideoRequest::Remote {
                    url: url.to_string(),
                })
            }
        }
    }
}

impl std::fmt::Display for VideoRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoRequest::ExactDevice { device_id } => write!(f, "device:{}", device_id),
            VideoRequest::BestEffort {
                ideal_width,
                ideal_height,
                facing_mode,
            } => write!(f, "default:{}x{}:{}", ideal_width, ideal_height, facing_mode),
            VideoRequest::Remote { url } => write!(f, "remote:{}", redacted_url(url)),
        }
    }
}
