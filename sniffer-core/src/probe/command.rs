use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

/// Wall-clock bound for the resolution pre-probe.
pub const PRE_PROBE_LIMIT: Duration = Duration::from_secs(5);
/// Wall-clock bound for the fallback stream inspection.
pub const INSPECT_LIMIT: Duration = Duration::from_secs(15);

/// A fully assembled external tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn has_arg(&self, needle: &str) -> bool {
        self.args.iter().any(|a| a == needle)
    }

    /// Value following `flag`, if present.
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|idx| self.args.get(idx + 1))
            .map(String::as_str)
    }

    pub fn to_tokio(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

fn micros(timeout: Duration) -> String {
    timeout.as_micros().to_string()
}

/// Short decode pass used to learn the stream resolution before capture.
pub fn pre_probe_command(ffmpeg: &str, url: &str) -> ToolCommand {
    ToolCommand::new(ffmpeg)
        .arg("-hide_banner")
        .args(["-analyzeduration", "5000000"])
        .args(["-probesize", "10000000"])
        .args(["-t", "3"])
        .args(["-i", url])
        .args(["-f", "null", "-"])
}

/// Single-frame capture into `artifact`.
///
/// Ultra-HD streams are captured at their native size; everything else is
/// scaled to 1920x1080.
pub fn capture_command(
    ffmpeg: &str,
    url: &str,
    timeout: Duration,
    extra_args: &[String],
    ultra_hd: bool,
    artifact: &Path,
) -> ToolCommand {
    let mut cmd = ToolCommand::new(ffmpeg)
        .arg("-y")
        .args(["-timeout".to_string(), micros(timeout)])
        .args(["-analyzeduration", "3000000"])
        .args(["-probesize", "5000000"]);

    if url.to_ascii_lowercase().contains("rtp") {
        cmd = cmd.args(["-rw_timeout".to_string(), micros(timeout)]);
    }

    cmd = cmd
        .args(extra_args.iter().cloned())
        .args(["-i", url])
        .args(["-frames:v", "1"])
        .args(["-q:v", "1"])
        .args(["-vf", "yadif"]);

    if !ultra_hd {
        cmd = cmd.args(["-s", "1920x1080"]);
    }

    cmd.args(["-f", "image2"])
        .arg(artifact.to_string_lossy().into_owned())
}

/// Plain `-i` inspection used when capture produced no frame.
pub fn inspect_command(ffmpeg: &str, url: &str, timeout: Duration) -> ToolCommand {
    let mut cmd = ToolCommand::new(ffmpeg)
        .arg("-hide_banner")
        .args(["-analyzeduration", "10000000"])
        .args(["-probesize", "20000000"]);

    let lower = url.to_ascii_lowercase();
    if lower.contains("rtp") || lower.contains("udp") {
        cmd = cmd.args(["-timeout".to_string(), micros(timeout * 2)]);
    }

    cmd.args(["-i", url])
}
