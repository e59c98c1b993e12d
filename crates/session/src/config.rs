use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::app_data_dir;

pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxerConfig {
    /// Directory holding `ffmpeg`/`ffprobe`; searched before the bundled copy and `PATH`.
    pub ffmpeg_dir: Option<PathBuf>,
    pub save_beside_video: bool,
    pub video_extensions: Vec<String>,
    pub audio_extensions: Vec<String>,
    pub poll_interval_ms: u64,
    pub diagnostic_tail_bytes: usize,
}

impl Default for MuxerConfig {
    fn default() -> Self {
        Self {
            ffmpeg_dir: None,
            save_beside_video: true,
            video_extensions: vec!["mp4".into(), "mov".into()],
            audio_extensions: vec!["wav".into()],
            poll_interval_ms: 50,
            diagnostic_tail_bytes: 64 * 1024,
        }
    }
}

impl MuxerConfig {
    pub fn default_path() -> PathBuf {
        app_data_dir().join(CONFIG_FILE_NAME)
    }

    /// Load from `path`, or from [`MuxerConfig::default_path`] when `None`.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        if !path.exists() {
            debug!("no config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path).with_context(|| format!("read config {:?}", path))?;
        let config: Self =
            serde_json::from_str(&text).with_context(|| format!("parse config {:?}", path))?;
        debug!("loaded config from {:?}", path);
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("write config {:?}", path))?;
        Ok(())
    }
}
