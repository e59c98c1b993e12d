use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod config;
pub mod output;
pub mod selection;

pub use config::MuxerConfig;
pub use output::{derive_default_name, OutputPathResolver, OutputSpec, Unresolvable, DEFAULT_SUFFIX};
pub use selection::{
    ExtensionClassifier, FileClassifier, InputSelection, MediaKind, MediaSelection, Provenance,
    RejectedInput,
};

pub fn app_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir);
    base.join("muxer")
}

/// A validated job: both inputs exist and the output location is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuxRequest {
    pub video: PathBuf,
    pub audio: PathBuf,
    pub output: PathBuf,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum NotReady {
    #[error("no video selected")]
    MissingVideo,
    #[error("no audio selected")]
    MissingAudio,
    #[error(transparent)]
    Output(#[from] Unresolvable),
}

/// Everything the user has chosen so far for the next mux.
#[derive(Debug, Clone)]
pub struct Session<C = ExtensionClassifier> {
    pub selection: InputSelection<C>,
    pub output: OutputSpec,
    pub resolver: OutputPathResolver,
}

impl Session<ExtensionClassifier> {
    pub fn from_config(config: &MuxerConfig) -> Self {
        let classifier =
            ExtensionClassifier::new(&config.video_extensions, &config.audio_extensions);
        Self::new(classifier, config.save_beside_video)
    }
}

impl<C: FileClassifier> Session<C> {
    pub fn new(classifier: C, save_beside_video: bool) -> Self {
        Self {
            selection: InputSelection::new(classifier),
            output: OutputSpec::default(),
            resolver: OutputPathResolver::new(save_beside_video),
        }
    }

    pub fn select_video(
        &mut self,
        path: impl Into<PathBuf>,
        provenance: Provenance,
    ) -> Result<(), RejectedInput> {
        self.selection.set_video(path, provenance)?;
        if let Some(video) = self.selection.video() {
            let video = video.path.clone();
            self.output.on_video_selected(&video);
        }
        Ok(())
    }

    pub fn select_audio(
        &mut self,
        path: impl Into<PathBuf>,
        provenance: Provenance,
    ) -> Result<(), RejectedInput> {
        self.selection.set_audio(path, provenance)
    }

    pub fn drop_files(
        &mut self,
        kind: MediaKind,
        paths: &[PathBuf],
    ) -> Result<PathBuf, RejectedInput> {
        let picked = self.selection.accept_drop(kind, paths)?;
        if kind == MediaKind::Video {
            self.output.on_video_selected(&picked);
        }
        Ok(picked)
    }

    pub fn set_output_name(&mut self, name: &str) {
        self.output.set_file_name(name);
    }

    pub fn choose_output(&mut self, path: &Path) {
        self.output.choose_location(path);
    }

    /// Switching "save beside video" on discards an explicitly chosen
    /// location; switching it off keeps whatever was chosen.
    pub fn set_save_beside_video(&mut self, on: bool) {
        self.resolver.set_save_beside_video(on);
        if on {
            self.output.clear_explicit();
            if let Some(video) = self.selection.video() {
                let video = video.path.clone();
                self.output.on_video_selected(&video);
            }
        }
    }

    pub fn output_path(&self) -> Result<PathBuf, Unresolvable> {
        self.resolver.resolve(&self.selection, &self.output)
    }

    pub fn is_ready(&self) -> bool {
        self.mux_request().is_ok()
    }

    pub fn mux_request(&self) -> Result<MuxRequest, NotReady> {
        let video = self.selection.video().ok_or(NotReady::MissingVideo)?;
        let audio = self.selection.audio().ok_or(NotReady::MissingAudio)?;
        let output = self.output_path()?;
        Ok(MuxRequest {
            video: video.path.clone(),
            audio: audio.path.clone(),
            output,
        })
    }
}
