use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sniffer_model::{ChannelRecord, Connectivity, Group, GroupId, ProbeStatus, Resolution};

use super::ChannelLibrary;

/// Sort order for channels outside any group.
pub const UNGROUPED_SORT_ORDER: i64 = 9999;
/// Sort order reported for the synthetic "ungrouped" stats bucket.
pub const UNGROUPED_STATS_ORDER: i64 = 10000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionBucket {
    #[serde(rename = "4k")]
    UltraHd,
    #[serde(rename = "1080")]
    FullHd,
    #[serde(rename = "720")]
    Hd,
    #[serde(rename = "unknown")]
    Unknown,
}

impl ResolutionBucket {
    /// Classifies a resolution. Frames smaller than HD (other than PAL
    /// 720x576) fall in no bucket.
    pub fn classify(resolution: Option<Resolution>) -> Option<Self> {
        let Some(Resolution { width, height }) = resolution else {
            return Some(ResolutionBucket::Unknown);
        };
        if width >= 3840 {
            Some(ResolutionBucket::UltraHd)
        } else if width >= 1920 {
            Some(ResolutionBucket::FullHd)
        } else if (width == 720 && height == 576) || width >= 1280 {
            Some(ResolutionBucket::Hd)
        } else {
            None
        }
    }
}

impl FromStr for ResolutionBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "4k" => Ok(ResolutionBucket::UltraHd),
            "1080" => Ok(ResolutionBucket::FullHd),
            "720" => Ok(ResolutionBucket::Hd),
            "unknown" => Ok(ResolutionBucket::Unknown),
            other => Err(format!("unknown resolution filter: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GroupFilter {
    #[default]
    All,
    Ungrouped,
    Group(GroupId),
}

impl FromStr for GroupFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "all" => Ok(GroupFilter::All),
            "ungrouped" => Ok(GroupFilter::Ungrouped),
            other => other
                .parse::<GroupId>()
                .map(GroupFilter::Group)
                .map_err(|_| format!("unknown group filter: {other}")),
        }
    }
}

/// Listing filters. `None` means "all".
#[derive(Debug, Clone, Default)]
pub struct ChannelQuery {
    pub group: GroupFilter,
    pub resolution: Option<ResolutionBucket>,
    pub connectivity: Option<Connectivity>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRef {
    pub id: GroupId,
    pub name: String,
}

/// A channel record annotated with its group memberships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelView {
    #[serde(flatten)]
    pub record: ChannelRecord,
    pub groups: Vec<GroupRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionCounts {
    #[serde(rename = "4k")]
    pub ultra_hd: usize,
    #[serde(rename = "1080")]
    pub full_hd: usize,
    #[serde(rename = "720")]
    pub hd: usize,
    pub unknown: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCount {
    pub name: String,
    pub count: usize,
    pub sort_order: i64,
}

/// Library-wide counters, computed before filters apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub total: usize,
    pub resolution: ResolutionCounts,
    pub connectivity: BTreeMap<String, usize>,
    pub groups: BTreeMap<String, GroupCount>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelListing {
    pub channels: Vec<ChannelView>,
    pub stats: ChannelStats,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum NamePart {
    Number(u64),
    Text(String),
}

/// Natural-order key: digit runs compare numerically, so `CCTV2` sorts
/// before `CCTV11`.
fn natural_key(name: &str) -> Vec<NamePart> {
    fn push(buf: &mut String, digits: bool, parts: &mut Vec<NamePart>) {
        if buf.is_empty() {
            return;
        }
        let part = if digits {
            buf.parse::<u64>()
                .map(NamePart::Number)
                .unwrap_or_else(|_| NamePart::Text(buf.clone()))
        } else {
            NamePart::Text(buf.clone())
        };
        parts.push(part);
        buf.clear();
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_digits = false;
    for ch in name.to_lowercase().chars() {
        let digit = ch.is_ascii_digit();
        if digit != in_digits {
            push(&mut current, in_digits, &mut parts);
            in_digits = digit;
        }
        current.push(ch);
    }
    push(&mut current, in_digits, &mut parts);
    parts
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ListingKey {
    group_order: i64,
    negative_width: i64,
    unnamed: bool,
    name: Vec<NamePart>,
    failed: bool,
    address: String,
}

fn listing_key(record: &ChannelRecord, memberships: &[&Group]) -> ListingKey {
    let name = record.metadata.name.trim();
    ListingKey {
        group_order: memberships
            .iter()
            .map(|g| g.sort_order)
            .min()
            .unwrap_or(UNGROUPED_SORT_ORDER),
        negative_width: -(record.resolution.map(|r| r.width as i64).unwrap_or(0)),
        unnamed: name.is_empty(),
        name: natural_key(name),
        failed: record.test_status == Some(ProbeStatus::Failed),
        address: record.address.clone(),
    }
}

fn matches(
    query: &ChannelQuery,
    record: &ChannelRecord,
    memberships: &[&Group],
) -> bool {
    let group_ok = match query.group {
        GroupFilter::All => true,
        GroupFilter::Ungrouped => memberships.is_empty(),
        GroupFilter::Group(id) => memberships.iter().any(|g| g.id == id),
    };
    if !group_ok {
        return false;
    }

    if let Some(connectivity) = query.connectivity
        && record.connectivity != connectivity
    {
        return false;
    }

    if let Some(bucket) = query.resolution
        && ResolutionBucket::classify(record.resolution) != Some(bucket)
    {
        return false;
    }

    if let Some(needle) = query.search.as_deref().map(str::to_lowercase)
        && !needle.is_empty()
        && !record.address.contains(&needle)
        && !record.metadata.name.to_lowercase().contains(&needle)
    {
        return false;
    }

    true
}

fn compute_stats(
    records: &[ChannelRecord],
    membership: &HashMap<&str, Vec<&Group>>,
) -> ChannelStats {
    let mut stats = ChannelStats {
        total: records.len(),
        ..Default::default()
    };
    for state in [
        Connectivity::Online,
        Connectivity::Offline,
        Connectivity::Failed,
        Connectivity::Testing,
        Connectivity::Untested,
    ] {
        stats.connectivity.insert(state.to_string(), 0);
    }

    let mut ungrouped = 0;
    for record in records {
        match ResolutionBucket::classify(record.resolution) {
            Some(ResolutionBucket::UltraHd) => stats.resolution.ultra_hd += 1,
            Some(ResolutionBucket::FullHd) => stats.resolution.full_hd += 1,
            Some(ResolutionBucket::Hd) => stats.resolution.hd += 1,
            Some(ResolutionBucket::Unknown) => stats.resolution.unknown += 1,
            None => {}
        }
        *stats
            .connectivity
            .entry(record.connectivity.to_string())
            .or_default() += 1;

        let groups = membership
            .get(record.address.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default();
        if groups.is_empty() {
            ungrouped += 1;
        }
        for group in groups {
            stats
                .groups
                .entry(group.id.to_string())
                .or_insert_with(|| GroupCount {
                    name: group.name.clone(),
                    count: 0,
                    sort_order: group.sort_order,
                })
                .count += 1;
        }
    }

    if ungrouped > 0 {
        stats.groups.insert(
            "ungrouped".to_string(),
            GroupCount {
                name: "Ungrouped".to_string(),
                count: ungrouped,
                sort_order: UNGROUPED_STATS_ORDER,
            },
        );
    }
    stats
}

impl ChannelLibrary {
    /// Filtered, ordered channel listing plus unfiltered statistics.
    pub fn list(&self, query: &ChannelQuery) -> ChannelListing {
        let records = self.snapshot_channels();
        let groups = self.snapshot_groups();

        let mut membership: HashMap<&str, Vec<&Group>> = HashMap::new();
        for group in &groups {
            for address in &group.channels {
                membership.entry(address.as_str()).or_default().push(group);
            }
        }

        let stats = compute_stats(&records, &membership);

        let mut selected: Vec<(ListingKey, ChannelView)> = records
            .iter()
            .filter_map(|record| {
                let memberships = membership
                    .get(record.address.as_str())
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                if !matches(query, record, memberships) {
                    return None;
                }
                let view = ChannelView {
                    record: record.clone(),
                    groups: memberships
                        .iter()
                        .map(|g| GroupRef {
                            id: g.id,
                            name: g.name.clone(),
                        })
                        .collect(),
                };
                Some((listing_key(record, memberships), view))
            })
            .collect();
        selected.sort_by(|a, b| a.0.cmp(&b.0));

        ChannelListing {
            channels: selected.into_iter().map(|(_, view)| view).collect(),
            stats,
        }
    }

    /// Channels in listing order, restricted by `keep`.
    pub fn ordered_channels<F>(&self, keep: F) -> Vec<ChannelView>
    where
        F: Fn(&ChannelRecord) -> bool,
    {
        self.list(&ChannelQuery::default())
            .channels
            .into_iter()
            .filter(|view| keep(&view.record))
            .collect()
    }
}
