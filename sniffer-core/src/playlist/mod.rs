//! M3U import and export for the channel library.

pub mod m3u;

use serde::{Deserialize, Serialize};
use sniffer_model::Connectivity;
use tracing::info;

use crate::error::{Result, SnifferError};
use crate::library::ChannelLibrary;

pub use m3u::{PlaylistEntry, RenderOptions, parse_m3u, render_m3u, stream_address};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub imported: usize,
    pub updated: usize,
    pub total: usize,
    pub groups_created: usize,
    pub new_channels: Vec<String>,
}

/// Merges a playlist into the library.
///
/// Entries carrying a `group-title` are moved into that group only; missing
/// groups are created at the end of the ordering.
pub fn import_playlist(library: &ChannelLibrary, content: &str) -> Result<ImportReport> {
    let entries = parse_m3u(content);
    if entries.is_empty() {
        return Err(SnifferError::invalid("no valid channels found in playlist"));
    }

    let mut report = ImportReport {
        total: entries.len(),
        ..Default::default()
    };

    for entry in &entries {
        if library.merge_imported(&entry.address, &entry.url, &entry.metadata) {
            report.imported += 1;
            report.new_channels.push(entry.address.clone());
        } else {
            report.updated += 1;
        }

        let group = entry.metadata.group.trim();
        if !group.is_empty() {
            let (group_id, created) = library.ensure_group(group);
            if created {
                report.groups_created += 1;
            }
            library.move_to_group(&entry.address, group_id)?;
        }
    }

    info!(
        imported = report.imported,
        updated = report.updated,
        groups_created = report.groups_created,
        "imported playlist"
    );
    Ok(report)
}

/// Playlist of online channels in listing order.
pub fn export_playlist(library: &ChannelLibrary, options: &RenderOptions) -> String {
    let channels =
        library.ordered_channels(|record| record.connectivity == Connectivity::Online);
    render_m3u(&channels, options)
}
