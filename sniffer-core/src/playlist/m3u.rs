use std::fmt::Write;

use once_cell::sync::Lazy;
use regex::Regex;
use sniffer_model::ChannelMetadata;

use crate::library::ChannelView;

static ADDRESS_WITH_PORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}:\d+")
        .expect("address with port regex should compile")
});

static DOTTED_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}")
        .expect("dotted address regex should compile")
});

/// One `#EXTINF` entry of an M3U playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub address: String,
    pub url: String,
    pub metadata: ChannelMetadata,
}

fn attribute(line: &str, name: &str) -> String {
    let needle = format!("{name}=\"");
    line.find(&needle)
        .map(|start| &line[start + needle.len()..])
        .and_then(|rest| rest.find('"').map(|end| rest[..end].to_string()))
        .unwrap_or_default()
}

/// Stream address of a playlist URL: the last dotted quad, provided some
/// `address:port` pair appears. Proxy URLs such as
/// `http://192.168.3.2:7788/rtp/239.1.1.1:8000` resolve to the stream.
pub fn stream_address(url: &str) -> Option<String> {
    if !ADDRESS_WITH_PORT.is_match(url) {
        return None;
    }
    DOTTED_ADDRESS
        .find_iter(url)
        .last()
        .map(|m| m.as_str().to_string())
}

pub fn parse_m3u(content: &str) -> Vec<PlaylistEntry> {
    let mut entries = Vec::new();
    let mut lines = content.lines().map(str::trim).peekable();

    while let Some(line) = lines.next() {
        if !line.starts_with("#EXTINF:") {
            continue;
        }

        let name = line
            .rfind(',')
            .map(|pos| line[pos + 1..].trim().to_string())
            .unwrap_or_default();
        let metadata = ChannelMetadata {
            name,
            epg_id: attribute(line, "tvg-id"),
            group: attribute(line, "group-title"),
            logo: attribute(line, "tvg-logo"),
            catchup: attribute(line, "catchup"),
            playback: attribute(line, "catchup-source"),
        };

        let mut url = None;
        while let Some(next) = lines.peek() {
            if next.is_empty() || (next.starts_with('#') && !next.starts_with("#EXTINF:")) {
                lines.next();
                continue;
            }
            if !next.starts_with('#') {
                url = lines.next();
            }
            break;
        }

        let Some(url) = url else {
            continue;
        };
        if let Some(address) = stream_address(url) {
            entries.push(PlaylistEntry {
                address,
                url: url.to_string(),
                metadata,
            });
        }
    }

    entries
}

/// Settings applied when rendering a playlist.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// EPG base URL; rendered as `url-tvg="<epg>.gz"` when set.
    pub epg_url: Option<String>,
    /// Template containing `{ip}` used in place of each channel's own URL.
    pub external_url_template: Option<String>,
}

/// Renders `channels` in the given order. Channels without a URL are
/// skipped; the group title falls back to the first containing group.
pub fn render_m3u(channels: &[ChannelView], options: &RenderOptions) -> String {
    let mut out = String::new();
    match options.epg_url.as_deref().filter(|u| !u.is_empty()) {
        Some(epg) => {
            let _ = writeln!(out, "#EXTM3U url-tvg=\"{epg}.gz\"\n");
        }
        None => out.push_str("#EXTM3U\n\n"),
    }

    let external = options
        .external_url_template
        .as_deref()
        .filter(|t| t.contains("{ip}"));

    for view in channels {
        let record = &view.record;
        if record.url.is_empty() {
            continue;
        }
        let url = match external {
            Some(template) => template.replace("{ip}", &record.address),
            None => record.url.clone(),
        };

        let metadata = &record.metadata;
        let group = if metadata.group.is_empty() {
            view.groups.first().map(|g| g.name.as_str()).unwrap_or_default()
        } else {
            metadata.group.as_str()
        };

        let mut line = String::from("#EXTINF:-1");
        for (key, value) in [
            ("tvg-id", metadata.epg_id.as_str()),
            ("group-title", group),
            ("tvg-logo", metadata.logo.as_str()),
            ("catchup", metadata.catchup.as_str()),
            ("catchup-source", metadata.playback.as_str()),
        ] {
            if !value.is_empty() {
                let _ = write!(line, " {key}=\"{value}\"");
            }
        }
        let _ = write!(out, "{line},{}\n{url}\n\n", metadata.name);
    }

    out
}
