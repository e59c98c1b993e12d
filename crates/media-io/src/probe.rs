use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, warn};

/// Returned by [`DurationProbe::probe`] when the duration could not be read.
/// Callers fall back to heartbeat progress; it never means a zero-length file.
pub const UNKNOWN_DURATION: f64 = 0.0;

pub trait DurationProbe {
    /// Total duration in seconds, or [`UNKNOWN_DURATION`].
    fn probe(&self, video: &Path) -> f64;
}

/// Queries the container duration with `ffprobe`.
#[derive(Debug, Clone)]
pub struct FfprobeDuration {
    ffprobe: Option<PathBuf>,
}

impl FfprobeDuration {
    pub fn new(ffprobe: Option<PathBuf>) -> Self {
        Self { ffprobe }
    }
}

impl DurationProbe for FfprobeDuration {
    fn probe(&self, video: &Path) -> f64 {
        let Some(ffprobe) = &self.ffprobe else {
            warn!("ffprobe unavailable; duration of {:?} unknown", video);
            return UNKNOWN_DURATION;
        };

        let out = match Command::new(ffprobe)
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("default=noprint_wrappers=1:nokey=1")
            .arg(video)
            .stdin(Stdio::null())
            .output()
        {
            Ok(out) => out,
            Err(e) => {
                warn!("ffprobe failed to start: {e}");
                return UNKNOWN_DURATION;
            }
        };

        if !out.status.success() {
            warn!(
                "ffprobe exited with {:?}: {}",
                out.status.code(),
                String::from_utf8_lossy(&out.stderr).trim()
            );
            return UNKNOWN_DURATION;
        }

        let seconds = parse_duration_output(&String::from_utf8_lossy(&out.stdout));
        debug!("probed duration of {:?}: {seconds}s", video);
        seconds
    }
}

/// Parse the single bare number ffprobe prints for `format=duration`.
pub fn parse_duration_output(stdout: &str) -> f64 {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .unwrap_or(UNKNOWN_DURATION)
}
