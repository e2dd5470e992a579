use once_cell::sync::Lazy;
use regex::Regex;
use sniffer_model::Resolution;

static CAPTURE_RESOLUTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Stream.*Video.*\s(\d{3,4}x\d{3,4})")
        .expect("capture resolution regex should compile")
});

static INSPECT_RESOLUTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Stream.*Video.*?(\d{3,4}x\d{3,4})")
        .expect("inspect resolution regex should compile")
});

/// Resolution reported on a `Stream ... Video:` line of ffmpeg diagnostics.
pub fn parse_resolution(text: &str) -> Option<Resolution> {
    first_resolution(&CAPTURE_RESOLUTION, text)
}

/// Looser variant used on `-i` inspection output.
pub fn parse_inspect_resolution(text: &str) -> Option<Resolution> {
    first_resolution(&INSPECT_RESOLUTION, text)
}

fn first_resolution(pattern: &Regex, text: &str) -> Option<Resolution> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<Resolution>().ok())
}

/// Decides whether inspection output proves a stream is reachable.
///
/// A stream counts as accessible when every marker of any one alternative
/// appears in the combined output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerPolicy {
    pub alternatives: Vec<Vec<String>>,
}

impl Default for MarkerPolicy {
    fn default() -> Self {
        let set = |markers: &[&str]| {
            markers.iter().map(|m| m.to_string()).collect::<Vec<_>>()
        };
        Self {
            alternatives: vec![
                set(&["Stream #", "Video:"]),
                set(&["Input #", "Duration:"]),
                set(&["Input #", "mpegts"]),
            ],
        }
    }
}

impl MarkerPolicy {
    pub fn matches(&self, output: &str) -> bool {
        !output.is_empty()
            && self.alternatives.iter().any(|markers| {
                !markers.is_empty()
                    && markers.iter().all(|m| output.contains(m.as_str()))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STDERR: &str = "Input #0, mpegts, from 'rtp://239.1.1.1:5000':\n  \
        Duration: N/A, start: 1.0, bitrate: N/A\n  \
        Stream #0:0[0x100]: Video: h264 (High), yuv420p(tv, bt709, top first), 1920x1080 [SAR 1:1 DAR 16:9], 25 fps\n  \
        Stream #0:1[0x101]: Audio: mp2, 48000 Hz, stereo\n";

    #[test]
    fn extracts_resolution_from_video_stream_line() {
        let resolution = parse_resolution(STDERR).expect("resolution");
        assert_eq!(resolution.to_string(), "1920x1080");
        assert!(parse_resolution("Stream #0:1: Audio: mp2, 48000 Hz").is_none());
    }

    #[test]
    fn rejects_zero_sized_frames() {
        assert!(parse_resolution("Stream #0:0: Video: h264, 0000x1080 x").is_none());
    }

    #[test]
    fn default_markers_accept_container_headers() {
        let policy = MarkerPolicy::default();
        assert!(policy.matches(STDERR));
        assert!(policy.matches("Input #0, mpegts, from 'udp://x'"));
        assert!(policy.matches("Input #0, hls\n  Duration: 00:00:10.00"));
        assert!(!policy.matches("Connection refused"));
        assert!(!policy.matches(""));
    }
}
