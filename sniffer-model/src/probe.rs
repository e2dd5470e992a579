use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Classification of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    /// Placeholder written while the probe is still running.
    Testing,
    Success,
    Failed,
}

impl ProbeStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ProbeStatus::Testing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProbeStatus::Testing => "testing",
            ProbeStatus::Success => "success",
            ProbeStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Video frame dimensions as reported by the prober.
///
/// Serialized as the compact `WIDTHxHEIGHT` string used by playlists and the
/// persisted channel documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Both dimensions must be positive.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        (width > 0 && height > 0).then_some(Self { width, height })
    }

    pub fn is_ultra_hd(&self) -> bool {
        self.width >= 3840
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ModelError::InvalidResolution(s.to_string());
        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let width = w.trim().parse::<u32>().map_err(|_| invalid())?;
        let height = h.trim().parse::<u32>().map_err(|_| invalid())?;
        Resolution::new(width, height).ok_or_else(invalid)
    }
}

impl TryFrom<String> for Resolution {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Resolution> for String {
    fn from(value: Resolution) -> Self {
        value.to_string()
    }
}

/// Decodes an optional resolution, treating malformed values as absent.
pub fn lenient_resolution<'de, D>(
    deserializer: D,
) -> Result<Option<Resolution>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| value.parse().ok()))
}

/// Result of probing one address, as recorded on a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    #[serde(alias = "ip")]
    pub address: String,
    pub url: String,
    pub status: ProbeStatus,
    #[serde(
        default,
        deserialize_with = "lenient_resolution",
        skip_serializing_if = "Option::is_none"
    )]
    pub resolution: Option<Resolution>,
    /// Public path of the captured frame (`/screenshots/<file>`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProbeOutcome {
    pub fn testing(address: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            url: url.into(),
            status: ProbeStatus::Testing,
            resolution: None,
            screenshot: None,
            error: None,
            note: None,
            timestamp: Utc::now(),
        }
    }

    pub fn success(
        address: impl Into<String>,
        url: impl Into<String>,
        resolution: Option<Resolution>,
    ) -> Self {
        Self {
            status: ProbeStatus::Success,
            resolution,
            ..Self::testing(address, url)
        }
    }

    pub fn failed(
        address: impl Into<String>,
        url: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            status: ProbeStatus::Failed,
            error: Some(error.into()),
            ..Self::testing(address, url)
        }
    }

    pub fn with_screenshot(mut self, screenshot: impl Into<String>) -> Self {
        self.screenshot = Some(screenshot.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ProbeStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_rejects_zero_dimensions() {
        assert!("0x1080".parse::<Resolution>().is_err());
        assert!("1920x0".parse::<Resolution>().is_err());
        assert!("garbage".parse::<Resolution>().is_err());
        let parsed: Resolution = "1920x1080".parse().expect("valid resolution");
        assert_eq!(parsed, Resolution { width: 1920, height: 1080 });
    }

    #[test]
    fn outcome_serializes_resolution_as_compact_string() {
        let outcome = ProbeOutcome::success(
            "10.0.0.1",
            "rtp://10.0.0.1:5000",
            Resolution::new(3840, 2160),
        );
        let json = serde_json::to_value(&outcome).expect("serialize");
        assert_eq!(json["resolution"], "3840x2160");
        assert_eq!(json["status"], "success");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn outcome_accepts_legacy_ip_field() {
        let raw = r#"{
            "ip": "10.0.0.9",
            "url": "rtp://10.0.0.9:5000",
            "status": "failed",
            "error": "stream not accessible",
            "timestamp": "2024-01-01T00:00:00Z"
        }"#;
        let outcome: ProbeOutcome = serde_json::from_str(raw).expect("decode");
        assert_eq!(outcome.address, "10.0.0.9");
        assert_eq!(outcome.status, ProbeStatus::Failed);
    }
}
