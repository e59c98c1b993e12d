use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{debug, info, warn};

mod encode;
mod probe;
mod process;
mod progress;

pub use encode::mux_args;
pub use probe::{parse_duration_output, DurationProbe, FfprobeDuration, UNKNOWN_DURATION};
pub use process::{ChildProcess, ChunkRead, ProcessExit, ProcessHandle};
pub use progress::{parse_chunk, parse_timestamp, ParsedSignal};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("ffmpeg not found; install FFmpeg or point --ffmpeg-dir at a folder containing it")]
    FfmpegMissing,
    #[error("ffmpeg version check failed: {0}")]
    VersionCheck(String),
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "windows")] {
        const PLATFORM_DIR: &str = "windows";
        const EXE_SUFFIX: &str = ".exe";
    } else if #[cfg(target_os = "macos")] {
        const PLATFORM_DIR: &str = "macos";
        const EXE_SUFFIX: &str = "";
    } else {
        const PLATFORM_DIR: &str = "linux";
        const EXE_SUFFIX: &str = "";
    }
}

fn exe_name(tool: &str) -> String {
    format!("{tool}{EXE_SUFFIX}")
}

/// Resolved locations of the FFmpeg binaries used for muxing and probing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegTools {
    pub ffmpeg: PathBuf,
    /// `None` when ffprobe could not be found; durations are then unknown.
    pub ffprobe: Option<PathBuf>,
}

impl FfmpegTools {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: Option<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe,
        }
    }

    /// Find FFmpeg, preferring an explicit directory, then a bundled
    /// `ffmpeg/<os>/` folder, then `PATH`.
    pub fn locate(override_dir: Option<&Path>) -> Result<Self, ToolError> {
        if let Some(dir) = override_dir {
            if let Some(tools) = Self::from_dir(dir) {
                info!("using ffmpeg from configured directory {:?}", dir);
                return Ok(tools);
            }
            warn!("no ffmpeg in configured directory {:?}, searching elsewhere", dir);
        }

        for base in bundle_roots() {
            let dir = base.join("ffmpeg").join(PLATFORM_DIR);
            if let Some(tools) = Self::from_dir(&dir) {
                info!("using bundled ffmpeg from {:?}", dir);
                return Ok(tools);
            }
        }

        let ffmpeg = which::which(exe_name("ffmpeg")).map_err(|_| ToolError::FfmpegMissing)?;
        let ffprobe = which::which(exe_name("ffprobe")).ok();
        if ffprobe.is_none() {
            warn!("ffprobe not found on PATH; progress will be estimated");
        }
        debug!(?ffmpeg, ?ffprobe, "located ffmpeg on PATH");
        Ok(Self { ffmpeg, ffprobe })
    }

    fn from_dir(dir: &Path) -> Option<Self> {
        let ffmpeg = dir.join(exe_name("ffmpeg"));
        if !ffmpeg.is_file() {
            return None;
        }
        let ffprobe = dir.join(exe_name("ffprobe"));
        Some(Self {
            ffmpeg,
            ffprobe: ffprobe.is_file().then_some(ffprobe),
        })
    }

    /// Run `ffmpeg -version` and return the first line of its banner.
    pub fn check(&self) -> Result<String, ToolError> {
        let out = Command::new(&self.ffmpeg)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ToolError::VersionCheck(e.to_string()))?;
        if !out.status.success() {
            return Err(ToolError::VersionCheck(
                String::from_utf8_lossy(&out.stderr).trim().to_string(),
            ));
        }
        let banner = String::from_utf8_lossy(&out.stdout);
        Ok(banner.lines().next().unwrap_or_default().trim().to_string())
    }

    pub fn duration_probe(&self) -> FfprobeDuration {
        FfprobeDuration::new(self.ffprobe.clone())
    }
}

fn bundle_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
    {
        if !roots.contains(&exe_dir) {
            roots.push(exe_dir);
        }
    }
    roots
}
