use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::selection::{absolutize, FileClassifier, InputSelection};

/// Suffix carried by every auto-derived output name.
pub const DEFAULT_SUFFIX: &str = "_mux.mp4";

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("no output location: select a video or choose where to save")]
pub struct Unresolvable;

/// `<video-stem>_mux.mp4`
pub fn derive_default_name(video: &Path) -> String {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "output".to_string());
    format!("{stem}{DEFAULT_SUFFIX}")
}

/// Where the muxed file goes.
///
/// `explicit` marks a location the user picked themselves; auto-derivation
/// never touches it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputSpec {
    pub directory: PathBuf,
    pub file_name: String,
    pub explicit: bool,
}

impl OutputSpec {
    /// User typed a name.
    pub fn set_file_name(&mut self, name: &str) {
        self.file_name = name.trim().to_string();
    }

    /// User picked a save location. A bare file name lands in the current
    /// directory.
    pub fn choose_location(&mut self, path: &Path) {
        let path = absolutize(path);
        self.directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
        self.file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.explicit = true;
    }

    pub fn clear_explicit(&mut self) {
        self.explicit = false;
    }

    /// Refresh the auto-derived name after a new video was selected.
    ///
    /// The name is replaced only while it is empty or still ends in
    /// [`DEFAULT_SUFFIX`]. Any other name is kept, so custom names survive
    /// picking a different video. A typed name that happens to end in the
    /// suffix is indistinguishable from a derived one and gets replaced.
    pub fn on_video_selected(&mut self, video: &Path) {
        if self.explicit {
            return;
        }
        self.directory = video.parent().map(Path::to_path_buf).unwrap_or_default();
        if self.file_name.is_empty() || self.file_name.ends_with(DEFAULT_SUFFIX) {
            self.file_name = derive_default_name(video);
            debug!("output name defaulted to {}", self.file_name);
        }
    }

    fn chosen_path(&self) -> Option<PathBuf> {
        if !self.explicit || self.file_name.is_empty() {
            return None;
        }
        Some(self.directory.join(&self.file_name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputPathResolver {
    save_beside_video: bool,
}

impl Default for OutputPathResolver {
    fn default() -> Self {
        Self {
            save_beside_video: true,
        }
    }
}

impl OutputPathResolver {
    pub fn new(save_beside_video: bool) -> Self {
        Self { save_beside_video }
    }

    pub fn set_save_beside_video(&mut self, on: bool) {
        self.save_beside_video = on;
    }

    pub fn resolve<C: FileClassifier>(
        &self,
        selection: &InputSelection<C>,
        spec: &OutputSpec,
    ) -> Result<PathBuf, Unresolvable> {
        if let Some(chosen) = spec.chosen_path() {
            return Ok(chosen);
        }
        match selection.video() {
            Some(video) if self.save_beside_video => {
                let name = if spec.file_name.is_empty() {
                    derive_default_name(&video.path)
                } else {
                    spec.file_name.clone()
                };
                Ok(video.source_directory.join(name))
            }
            _ => Err(Unresolvable),
        }
    }
}
