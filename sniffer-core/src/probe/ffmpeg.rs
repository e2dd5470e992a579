use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use sniffer_model::{ProbeOutcome, Resolution};
use tracing::{debug, info, warn};

use super::artifact::artifact_exists;
use super::command::{
    INSPECT_LIMIT, PRE_PROBE_LIMIT, capture_command, inspect_command,
    pre_probe_command,
};
use super::output::{parse_inspect_resolution, parse_resolution};
use super::runner::{ProcessRunner, ToolRun, ToolRunner};
use super::{ProbeOptions, ProbeRequest, SharedProbeOptions, StreamProber};

pub const NOTE_NO_RESOLUTION: &str = "no resolution detected";
pub const NOTE_SCREENSHOT_FAILED: &str = "stream accessible but screenshot failed";
pub const NOTE_NOT_ACCESSIBLE: &str = "stream not accessible";
pub const NOTE_INSPECT_FAILED: &str = "failed to probe stream";
pub const NOTE_ULTRA_HD_NO_FRAME: &str =
    "high-resolution stream detected without screenshot";

/// ffmpeg-backed implementation of [`StreamProber`].
pub struct FfmpegProber<R = ProcessRunner> {
    runner: Arc<R>,
    options: SharedProbeOptions,
}

impl<R> fmt::Debug for FfmpegProber<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FfmpegProber")
            .field("options", &self.options.snapshot())
            .finish_non_exhaustive()
    }
}

impl FfmpegProber<ProcessRunner> {
    pub fn new(options: impl Into<SharedProbeOptions>) -> Self {
        Self::with_runner(Arc::new(ProcessRunner), options)
    }
}

impl<R: ToolRunner> FfmpegProber<R> {
    pub fn with_runner(runner: Arc<R>, options: impl Into<SharedProbeOptions>) -> Self {
        Self {
            runner,
            options: options.into(),
        }
    }

    /// Handle for retuning timeout and extra arguments at runtime.
    pub fn options(&self) -> &SharedProbeOptions {
        &self.options
    }

    async fn pre_probe(&self, options: &ProbeOptions, url: &str) -> Option<Resolution> {
        let command = pre_probe_command(&options.ffmpeg_path, url);
        match self.runner.run(&command, PRE_PROBE_LIMIT).await {
            ToolRun::Finished(output) => parse_resolution(&output.stderr),
            ToolRun::TimedOut => {
                debug!(url, "pre-probe timed out, using default capture settings");
                None
            }
            ToolRun::Failed(err) => {
                debug!(url, error = %err, "pre-probe failed, using default capture settings");
                None
            }
        }
    }

    async fn inspect(&self, options: &ProbeOptions, request: &ProbeRequest) -> ProbeOutcome {
        let command = inspect_command(&options.ffmpeg_path, &request.url, options.timeout);
        match self.runner.run(&command, INSPECT_LIMIT).await {
            ToolRun::Finished(output) => {
                let combined = output.combined();
                if options.markers.matches(&combined) {
                    ProbeOutcome::success(
                        &request.address,
                        &request.url,
                        parse_inspect_resolution(&combined),
                    )
                    .with_note(NOTE_SCREENSHOT_FAILED)
                } else {
                    ProbeOutcome::failed(&request.address, &request.url, NOTE_NOT_ACCESSIBLE)
                }
            }
            ToolRun::TimedOut | ToolRun::Failed(_) => {
                ProbeOutcome::failed(&request.address, &request.url, NOTE_INSPECT_FAILED)
            }
        }
    }

    async fn classify(&self, options: &ProbeOptions, request: &ProbeRequest) -> ProbeOutcome {
        let address = request.address.as_str();
        let url = request.url.as_str();

        let ultra_hd = self
            .pre_probe(options, url)
            .await
            .is_some_and(|resolution| resolution.is_ultra_hd());

        // A stale frame from an earlier probe must not count as a capture.
        if artifact_exists(&request.artifact.path).await {
            let _ = tokio::fs::remove_file(&request.artifact.path).await;
        }

        let command = capture_command(
            &options.ffmpeg_path,
            url,
            options.timeout,
            &options.extra_args,
            ultra_hd,
            &request.artifact.path,
        );
        debug!(address, command = %command, "capturing frame");

        let output = match self.runner.run(&command, options.timeout).await {
            ToolRun::Finished(output) => output,
            ToolRun::TimedOut => {
                return ProbeOutcome::failed(
                    address,
                    url,
                    format!("timeout after {} seconds", options.timeout.as_secs()),
                );
            }
            ToolRun::Failed(err) => return ProbeOutcome::failed(address, url, err),
        };

        let has_frame = artifact_exists(&request.artifact.path).await;
        let resolution = parse_resolution(&output.stderr);

        match (has_frame, resolution) {
            (true, Some(resolution)) if output.success => {
                ProbeOutcome::success(address, url, Some(resolution))
                    .with_screenshot(&request.artifact.public_path)
            }
            (true, None) if output.success => {
                ProbeOutcome::failed(address, url, NOTE_NO_RESOLUTION)
                    .with_screenshot(&request.artifact.public_path)
            }
            (false, Some(resolution)) if ultra_hd => {
                ProbeOutcome::success(address, url, Some(resolution))
                    .with_note(NOTE_ULTRA_HD_NO_FRAME)
            }
            _ => {
                debug!(address, "capture produced no frame, inspecting stream");
                self.inspect(options, request).await
            }
        }
    }
}

#[async_trait]
impl<R: ToolRunner + 'static> StreamProber for FfmpegProber<R> {
    async fn probe(&self, request: &ProbeRequest) -> ProbeOutcome {
        let started = Instant::now();
        let options = self.options.snapshot();
        let outcome = self.classify(&options, request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if outcome.is_success() {
            info!(
                address = %outcome.address,
                resolution = ?outcome.resolution.map(|r| r.to_string()),
                elapsed_ms,
                "probe succeeded"
            );
        } else {
            warn!(
                address = %outcome.address,
                error = outcome.error.as_deref().unwrap_or_default(),
                elapsed_ms,
                "probe failed"
            );
        }
        outcome
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::probe::command::ToolCommand;
    use crate::probe::runner::ToolOutput;
    use crate::probe::{ArtifactStore, ProbeOptions};
    use parking_lot::Mutex;
    use sniffer_model::{ProbeStatus, RunId};
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Replays scripted results in order; a `Finished(success)` capture
    /// writes the artifact when `frame` is set.
    #[derive(Default)]
    pub(crate) struct ScriptedRunner {
        pub steps: Mutex<VecDeque<(ToolRun, bool)>>,
        pub seen: Mutex<Vec<ToolCommand>>,
    }

    impl ScriptedRunner {
        pub fn push(&self, run: ToolRun, frame: bool) {
            self.steps.lock().push_back((run, frame));
        }
    }

    #[async_trait]
    impl ToolRunner for ScriptedRunner {
        async fn run(&self, command: &ToolCommand, _limit: Duration) -> ToolRun {
            self.seen.lock().push(command.clone());
            let Some((run, frame)) = self.steps.lock().pop_front() else {
                return ToolRun::Failed("no scripted step".into());
            };
            if frame && let Some(path) = command.args.last() {
                tokio::fs::write(path, b"\xff\xd8jpeg").await.expect("write frame");
            }
            run
        }
    }

    pub(crate) fn finished(success: bool, stderr: &str) -> ToolRun {
        ToolRun::Finished(ToolOutput {
            success,
            stdout: String::new(),
            stderr: stderr.to_string(),
        })
    }

    const HD_STDERR: &str =
        "Stream #0:0: Video: h264 (High), yuv420p, 1920x1080 [SAR 1:1], 25 fps";
    const UHD_STDERR: &str =
        "Stream #0:0: Video: hevc (Main 10), yuv420p10le, 3840x2160, 50 fps";

    fn setup() -> (tempfile::TempDir, Arc<ScriptedRunner>, FfmpegProber<ScriptedRunner>, ProbeRequest) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path());
        let runner = Arc::new(ScriptedRunner::default());
        let prober = FfmpegProber::with_runner(runner.clone(), ProbeOptions::default());
        let artifact = store.batch_artifact(RunId::new(), "10.0.0.1");
        let request = ProbeRequest::new("10.0.0.1", "rtp://10.0.0.1:5000", artifact);
        (dir, runner, prober, request)
    }

    #[tokio::test]
    async fn capture_with_frame_and_resolution_succeeds() {
        let (_dir, runner, prober, request) = setup();
        runner.push(finished(false, HD_STDERR), false);
        runner.push(finished(true, HD_STDERR), true);

        let outcome = prober.probe(&request).await;
        assert_eq!(outcome.status, ProbeStatus::Success);
        assert_eq!(outcome.resolution.map(|r| r.to_string()).as_deref(), Some("1920x1080"));
        assert_eq!(outcome.screenshot.as_deref(), Some(request.artifact.public_path.as_str()));

        let seen = runner.seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].value_of("-s"), Some("1920x1080"));
    }

    #[tokio::test]
    async fn frame_without_resolution_fails_but_keeps_screenshot() {
        let (_dir, runner, prober, request) = setup();
        runner.push(finished(false, ""), false);
        runner.push(finished(true, "frame written"), true);

        let outcome = prober.probe(&request).await;
        assert_eq!(outcome.status, ProbeStatus::Failed);
        assert_eq!(outcome.error.as_deref(), Some(NOTE_NO_RESOLUTION));
        assert!(outcome.screenshot.is_some());
    }

    #[tokio::test]
    async fn inspection_markers_rescue_failed_capture() {
        let (_dir, runner, prober, request) = setup();
        runner.push(finished(false, ""), false);
        runner.push(finished(false, "Conversion failed"), false);
        runner.push(
            finished(false, "Input #0, mpegts, from 'rtp://10.0.0.1:5000':\n  Duration: N/A"),
            false,
        );

        let outcome = prober.probe(&request).await;
        assert_eq!(outcome.status, ProbeStatus::Success);
        assert_eq!(outcome.note.as_deref(), Some(NOTE_SCREENSHOT_FAILED));
        assert!(outcome.screenshot.is_none());
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn inspection_without_markers_fails() {
        let (_dir, runner, prober, request) = setup();
        runner.push(finished(false, ""), false);
        runner.push(finished(false, ""), false);
        runner.push(finished(false, "Connection timed out"), false);

        let outcome = prober.probe(&request).await;
        assert_eq!(outcome.status, ProbeStatus::Failed);
        assert_eq!(outcome.error.as_deref(), Some(NOTE_NOT_ACCESSIBLE));

        runner.push(finished(false, ""), false);
        runner.push(finished(false, ""), false);
        runner.push(ToolRun::TimedOut, false);
        let outcome = prober.probe(&request).await;
        assert_eq!(outcome.error.as_deref(), Some(NOTE_INSPECT_FAILED));
    }

    #[tokio::test]
    async fn capture_timeout_is_final() {
        let (_dir, runner, prober, request) = setup();
        runner.push(finished(false, ""), false);
        runner.push(ToolRun::TimedOut, false);

        let outcome = prober.probe(&request).await;
        assert_eq!(outcome.status, ProbeStatus::Failed);
        assert_eq!(outcome.error.as_deref(), Some("timeout after 10 seconds"));
        assert_eq!(runner.seen.lock().len(), 2, "no inspection after timeout");
    }

    #[tokio::test]
    async fn ultra_hd_stream_without_frame_succeeds_with_note() {
        let (_dir, runner, prober, request) = setup();
        runner.push(finished(false, UHD_STDERR), false);
        runner.push(finished(false, UHD_STDERR), false);

        let outcome = prober.probe(&request).await;
        assert_eq!(outcome.status, ProbeStatus::Success);
        assert_eq!(outcome.note.as_deref(), Some(NOTE_ULTRA_HD_NO_FRAME));
        assert!(outcome.screenshot.is_none());

        let seen = runner.seen.lock();
        assert!(!seen[1].has_arg("-s"), "ultra-hd capture keeps native size");
    }

    #[tokio::test]
    async fn retuned_options_apply_to_the_next_probe() {
        let (_dir, runner, prober, request) = setup();
        prober.options().update(|options| {
            options.timeout = Duration::from_secs(3);
            options.extra_args = vec!["-rtsp_transport".into(), "tcp".into()];
        });
        runner.push(finished(false, ""), false);
        runner.push(ToolRun::TimedOut, false);

        let outcome = prober.probe(&request).await;
        assert_eq!(outcome.error.as_deref(), Some("timeout after 3 seconds"));
        let seen = runner.seen.lock();
        assert_eq!(seen[1].value_of("-rtsp_transport"), Some("tcp"));
    }
}
