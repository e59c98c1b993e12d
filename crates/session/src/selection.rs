use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

/// Anchor a relative path at the current directory.
pub(crate) fn absolutize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// How the user picked a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    Dialog,
    Drop,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RejectedInput {
    #[error("{path:?} is not a supported {} file", .kind.as_str())]
    UnsupportedExtension { path: PathBuf, kind: MediaKind },
    #[error("{0:?} does not exist")]
    NotFound(PathBuf),
    #[error("none of the dropped files is a supported {} file", .0.as_str())]
    NoAcceptedFile(MediaKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSelection {
    pub path: PathBuf,
    pub source_directory: PathBuf,
    pub provenance: Provenance,
}

/// File checks supplied by the file-picking layer.
pub trait FileClassifier {
    fn exists(&self, path: &Path) -> bool;
    fn classify(&self, path: &Path) -> Option<MediaKind>;
}

/// Classifies by (case-insensitive) extension and checks the real filesystem.
#[derive(Debug, Clone)]
pub struct ExtensionClassifier {
    video_extensions: Vec<String>,
    audio_extensions: Vec<String>,
}

impl ExtensionClassifier {
    pub fn new<V, A>(video_extensions: V, audio_extensions: A) -> Self
    where
        V: IntoIterator,
        V::Item: AsRef<str>,
        A: IntoIterator,
        A::Item: AsRef<str>,
    {
        let normalize = |ext: &str| ext.trim_start_matches('.').to_ascii_lowercase();
        Self {
            video_extensions: video_extensions
                .into_iter()
                .map(|e| normalize(e.as_ref()))
                .collect(),
            audio_extensions: audio_extensions
                .into_iter()
                .map(|e| normalize(e.as_ref()))
                .collect(),
        }
    }
}

impl Default for ExtensionClassifier {
    fn default() -> Self {
        Self::new(["mp4", "mov"], ["wav"])
    }
}

impl FileClassifier for ExtensionClassifier {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn classify(&self, path: &Path) -> Option<MediaKind> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if self.video_extensions.contains(&ext) {
            Some(MediaKind::Video)
        } else if self.audio_extensions.contains(&ext) {
            Some(MediaKind::Audio)
        } else {
            None
        }
    }
}

/// The chosen video and audio sources, plus the folders the next file
/// picker should open in.
#[derive(Debug, Clone)]
pub struct InputSelection<C = ExtensionClassifier> {
    classifier: C,
    video: Option<MediaSelection>,
    audio: Option<MediaSelection>,
    last_video_dir: Option<PathBuf>,
    last_audio_dir: Option<PathBuf>,
}

impl Default for InputSelection<ExtensionClassifier> {
    fn default() -> Self {
        Self::new(ExtensionClassifier::default())
    }
}

impl<C: FileClassifier> InputSelection<C> {
    pub fn new(classifier: C) -> Self {
        Self {
            classifier,
            video: None,
            audio: None,
            last_video_dir: None,
            last_audio_dir: None,
        }
    }

    pub fn set_video(
        &mut self,
        path: impl Into<PathBuf>,
        provenance: Provenance,
    ) -> Result<(), RejectedInput> {
        let selection = self.validate(path.into(), MediaKind::Video, provenance)?;
        self.last_video_dir = Some(selection.source_directory.clone());
        self.video = Some(selection);
        Ok(())
    }

    pub fn set_audio(
        &mut self,
        path: impl Into<PathBuf>,
        provenance: Provenance,
    ) -> Result<(), RejectedInput> {
        let selection = self.validate(path.into(), MediaKind::Audio, provenance)?;
        self.last_audio_dir = Some(selection.source_directory.clone());
        self.audio = Some(selection);
        Ok(())
    }

    /// Take the first dropped file with a matching extension.
    pub fn accept_drop(
        &mut self,
        kind: MediaKind,
        paths: &[PathBuf],
    ) -> Result<PathBuf, RejectedInput> {
        let path = paths
            .iter()
            .find(|p| self.classifier.classify(p) == Some(kind))
            .map(|p| absolutize(p))
            .ok_or(RejectedInput::NoAcceptedFile(kind))?;
        match kind {
            MediaKind::Video => self.set_video(path.clone(), Provenance::Drop)?,
            MediaKind::Audio => self.set_audio(path.clone(), Provenance::Drop)?,
        }
        Ok(path)
    }

    fn validate(
        &self,
        path: PathBuf,
        kind: MediaKind,
        provenance: Provenance,
    ) -> Result<MediaSelection, RejectedInput> {
        let path = absolutize(&path);
        if self.classifier.classify(&path) != Some(kind) {
            return Err(RejectedInput::UnsupportedExtension { path, kind });
        }
        if !self.classifier.exists(&path) {
            return Err(RejectedInput::NotFound(path));
        }
        let source_directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
        debug!("selected {} {:?} via {:?}", kind.as_str(), path, provenance);
        Ok(MediaSelection {
            path,
            source_directory,
            provenance,
        })
    }

    pub fn video(&self) -> Option<&MediaSelection> {
        self.video.as_ref()
    }

    pub fn audio(&self) -> Option<&MediaSelection> {
        self.audio.as_ref()
    }

    pub fn last_video_dir(&self) -> Option<&Path> {
        self.last_video_dir.as_deref()
    }

    pub fn last_audio_dir(&self) -> Option<&Path> {
        self.last_audio_dir.as_deref()
    }

    pub fn is_complete(&self) -> bool {
        self.video.is_some() && self.audio.is_some()
    }
}
