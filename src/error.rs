use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("script file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read script {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("script contains invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("no audio script found in the JSON file")]
    NoNarration,

    #[error("no JSON object found in model output")]
    NoJsonBlock,
}

#[derive(Error, Debug, PartialEq)]
pub enum AlignError {
    #[error("no images found in the specified folder")]
    NoImages,

    #[error("no audio files found in the specified folder")]
    NoAudio,

    #[error("found {images} images but {audio} audio files")]
    CountMismatch { images: usize, audio: usize },

    #[error("no audio file matches image stem '{0}'")]
    UnmatchedImage(String),

    #[error("no image matches audio stem '{0}'")]
    UnmatchedAudio(String),

    #[error("more than one file shares the stem '{0}'")]
    DuplicateStem(String),

    #[error("script has {narration} narration lines for {clips} clips")]
    NarrationMismatch { narration: usize, clips: usize },
}

pub type ScriptResult<T> = std::result::Result<T, ScriptError>;
