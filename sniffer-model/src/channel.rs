use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::probe::{ProbeStatus, Resolution};

/// Reachability of a channel as last observed.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Online,
    Offline,
    Failed,
    Testing,
    #[default]
    Untested,
}

impl Connectivity {
    pub fn as_str(self) -> &'static str {
        match self {
            Connectivity::Online => "online",
            Connectivity::Offline => "offline",
            Connectivity::Failed => "failed",
            Connectivity::Testing => "testing",
            Connectivity::Untested => "untested",
        }
    }

    /// Mapping used when a batch probe is folded into a channel record.
    pub fn from_probe(status: ProbeStatus) -> Self {
        match status {
            ProbeStatus::Success => Connectivity::Online,
            ProbeStatus::Failed => Connectivity::Failed,
            ProbeStatus::Testing => Connectivity::Untested,
        }
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Connectivity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" => Ok(Connectivity::Online),
            "offline" => Ok(Connectivity::Offline),
            "failed" => Ok(Connectivity::Failed),
            "testing" => Ok(Connectivity::Testing),
            "untested" => Ok(Connectivity::Untested),
            other => Err(format!("unknown connectivity: {other}")),
        }
    }
}

/// User-curated fields of a channel. Probe folds never modify these.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelMetadata {
    pub name: String,
    #[serde(alias = "tvg_id")]
    pub epg_id: String,
    pub group: String,
    pub logo: String,
    pub catchup: String,
    #[serde(alias = "catchup_source")]
    pub playback: String,
}

/// Long-lived record for one stream address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    #[serde(default, alias = "ip")]
    pub address: String,
    #[serde(flatten)]
    pub metadata: ChannelMetadata,
    #[serde(default)]
    pub url: String,
    #[serde(
        default,
        deserialize_with = "crate::probe::lenient_resolution",
        skip_serializing_if = "Option::is_none"
    )]
    pub resolution: Option<Resolution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(default)]
    pub connectivity: Connectivity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_status: Option<ProbeStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connectivity_checked_at: Option<DateTime<Utc>>,
}

impl ChannelRecord {
    /// Fresh record with empty metadata and `untested` connectivity.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            metadata: ChannelMetadata::default(),
            url: String::new(),
            resolution: None,
            screenshot: None,
            connectivity: Connectivity::Untested,
            test_status: None,
            timestamp: None,
            connectivity_checked_at: None,
        }
    }

    pub fn has_url(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

/// Explicit partial update of a channel's metadata.
///
/// `None` leaves a field unchanged; `Some("")` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelPatch {
    pub name: Option<String>,
    #[serde(alias = "tvg_id")]
    pub epg_id: Option<String>,
    pub group: Option<String>,
    pub logo: Option<String>,
    pub catchup: Option<String>,
    #[serde(alias = "catchup_source")]
    pub playback: Option<String>,
}

impl ChannelPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.epg_id.is_none()
            && self.group.is_none()
            && self.logo.is_none()
            && self.catchup.is_none()
            && self.playback.is_none()
    }

    pub fn apply(&self, metadata: &mut ChannelMetadata) {
        fn set(slot: &mut String, value: &Option<String>) {
            if let Some(value) = value {
                *slot = value.trim().to_string();
            }
        }

        set(&mut metadata.name, &self.name);
        set(&mut metadata.epg_id, &self.epg_id);
        set(&mut metadata.group, &self.group);
        set(&mut metadata.logo, &self.logo);
        set(&mut metadata.catchup, &self.catchup);
        set(&mut metadata.playback, &self.playback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_distinguishes_absent_from_cleared() {
        let mut metadata = ChannelMetadata {
            name: "News".into(),
            epg_id: "news.hd".into(),
            logo: "/logos/news.png".into(),
            ..Default::default()
        };

        let patch: ChannelPatch =
            serde_json::from_str(r#"{"name":"News HD","logo":""}"#)
                .expect("decode patch");
        patch.apply(&mut metadata);

        assert_eq!(metadata.name, "News HD");
        assert_eq!(metadata.logo, "");
        assert_eq!(metadata.epg_id, "news.hd");
    }

    #[test]
    fn record_flattens_metadata_on_the_wire() {
        let mut record = ChannelRecord::new("239.1.1.1");
        record.metadata.name = "Sports".into();
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["name"], "Sports");
        assert_eq!(json["connectivity"], "untested");

        let legacy = r#"{"ip":"239.1.1.2","name":"Movies","tvg_id":"mv"}"#;
        let decoded: ChannelRecord =
            serde_json::from_str(legacy).expect("decode legacy record");
        assert_eq!(decoded.address, "239.1.1.2");
        assert_eq!(decoded.metadata.epg_id, "mv");
        assert_eq!(decoded.connectivity, Connectivity::Untested);

        let odd = r#"{"address":"239.1.1.3","resolution":"unknown"}"#;
        let decoded: ChannelRecord =
            serde_json::from_str(odd).expect("decode odd resolution");
        assert!(decoded.resolution.is_none());
    }
}
