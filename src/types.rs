//! Shared data types for ForgeTube

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One narration line of the script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationEntry {
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Absent text is tolerated so that a single bad entry does not
    /// invalidate the whole document; such entries are skipped on extraction.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default = "default_speaker")]
    pub speaker: String,
    #[serde(default = "default_rate")]
    pub speed: f32,
    #[serde(default = "default_rate")]
    pub pitch: f32,
    #[serde(default = "default_emotion")]
    pub emotion: String,
}

/// One image prompt of the script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualScene {
    #[serde(default)]
    pub timestamp_start: Option<String>,
    #[serde(default)]
    pub timestamp_end: Option<String>,
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default = "default_guidance")]
    pub guidance_scale: f32,
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<f32>,
}

/// The JSON document describing one video
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptDocument {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub audio_script: Vec<NarrationEntry>,
    #[serde(default)]
    pub visual_script: Vec<VisualScene>,
}

fn default_speaker() -> String {
    "default".to_string()
}

fn default_rate() -> f32 {
    1.0
}

fn default_emotion() -> String {
    "neutral".to_string()
}

fn default_guidance() -> f32 {
    12.0
}

fn default_steps() -> u32 {
    50
}

fn default_width() -> u32 {
    1024
}

fn default_height() -> u32 {
    576
}

/// A timed slice of narration text shown as one subtitle
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleChunk {
    /// 1-based position in the subtitle file
    pub index: usize,
    pub text: String,
    /// Seconds from the start of the video
    pub start: f64,
    pub end: f64,
}

impl SubtitleChunk {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// An image paired with the audio clip (and narration) it is shown for
#[derive(Debug, Clone, PartialEq)]
pub struct ClipPlan {
    pub image: PathBuf,
    pub audio: PathBuf,
    /// Audio duration in seconds
    pub duration: f64,
    pub narration: Option<String>,
}

/// Application version constant
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name constant
pub const APP_NAME: &str = "ForgeTube";

/// Topic used when the script document has none
pub const DEFAULT_TOPIC: &str = "No topic found";
