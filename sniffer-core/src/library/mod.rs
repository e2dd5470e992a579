//! Long-lived channel records and the groups that organise them.

mod groups;
pub mod query;

use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use sniffer_model::{
    ChannelMetadata, ChannelPatch, ChannelRecord, Connectivity, Group, GroupId,
    ProbeOutcome,
};
use tracing::debug;

use crate::error::{Result, SnifferError};

pub use query::{
    ChannelListing, ChannelQuery, ChannelStats, ChannelView, GroupFilter,
    GroupRef, ResolutionBucket,
};

/// In-memory channel store keyed by stream address.
///
/// Updates to one address are serialised by the map's entry lock, so a
/// probe fold and a metadata patch on the same channel never interleave.
pub struct ChannelLibrary {
    channels: DashMap<String, ChannelRecord>,
    groups: RwLock<BTreeMap<GroupId, Group>>,
}

impl fmt::Debug for ChannelLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelLibrary")
            .field("channels", &self.channels.len())
            .field("groups", &self.groups.read().len())
            .finish()
    }
}

impl Default for ChannelLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelLibrary {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            groups: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn from_parts(channels: Vec<ChannelRecord>, groups: Vec<Group>) -> Self {
        let library = Self::new();
        for record in channels {
            library.channels.insert(record.address.clone(), record);
        }
        {
            let mut guard = library.groups.write();
            for group in groups {
                guard.insert(group.id, group);
            }
        }
        library
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.channels.contains_key(address)
    }

    pub fn get(&self, address: &str) -> Option<ChannelRecord> {
        self.channels.get(address).map(|entry| entry.value().clone())
    }

    /// All records, ordered by address.
    pub fn snapshot_channels(&self) -> Vec<ChannelRecord> {
        let mut records: Vec<ChannelRecord> = self
            .channels
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.address.cmp(&b.address));
        records
    }

    /// Folds a batch probe outcome into the record for its address.
    ///
    /// Metadata is preserved (or left empty for a new record); probe-derived
    /// fields are overwritten.
    pub fn fold_probe(&self, outcome: &ProbeOutcome) -> ChannelRecord {
        let mut entry = self
            .channels
            .entry(outcome.address.clone())
            .or_insert_with(|| ChannelRecord::new(outcome.address.clone()));
        let record = entry.value_mut();

        record.url = outcome.url.clone();
        record.resolution = outcome.resolution;
        record.screenshot = outcome.screenshot.clone();
        record.test_status = Some(outcome.status);
        record.connectivity = Connectivity::from_probe(outcome.status);
        record.timestamp = Some(outcome.timestamp);

        debug!(
            address = %record.address,
            connectivity = %record.connectivity,
            "folded probe into channel record"
        );
        record.clone()
    }

    /// Runs `f` against an existing record under its entry lock.
    pub fn update<F, R>(&self, address: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut ChannelRecord) -> R,
    {
        self.channels
            .get_mut(address)
            .map(|mut entry| f(entry.value_mut()))
    }

    pub fn apply_patch(
        &self,
        address: &str,
        patch: &ChannelPatch,
    ) -> Result<ChannelRecord> {
        self.update(address, |record| {
            patch.apply(&mut record.metadata);
            record.clone()
        })
        .ok_or_else(|| SnifferError::not_found(format!("channel {address}")))
    }

    /// Merges imported playlist data. Non-empty imported values win; probe
    /// results are kept. Returns `true` when the record is new.
    pub fn merge_imported(
        &self,
        address: &str,
        url: &str,
        imported: &ChannelMetadata,
    ) -> bool {
        let mut created = false;
        let mut entry = self.channels.entry(address.to_string()).or_insert_with(|| {
            created = true;
            ChannelRecord::new(address)
        });
        let record = entry.value_mut();

        fn merge(slot: &mut String, value: &str) {
            if !value.is_empty() {
                *slot = value.to_string();
            }
        }

        merge(&mut record.url, url);
        let metadata = &mut record.metadata;
        merge(&mut metadata.name, &imported.name);
        merge(&mut metadata.epg_id, &imported.epg_id);
        merge(&mut metadata.group, &imported.group);
        merge(&mut metadata.logo, &imported.logo);
        merge(&mut metadata.catchup, &imported.catchup);
        merge(&mut metadata.playback, &imported.playback);
        record.timestamp = Some(Utc::now());

        created
    }

    /// Blanks every channel name. Returns how many records changed.
    pub fn clear_names(&self) -> usize {
        let mut cleared = 0;
        for mut entry in self.channels.iter_mut() {
            if !entry.metadata.name.is_empty() {
                entry.metadata.name.clear();
                cleared += 1;
            }
        }
        cleared
    }
}
