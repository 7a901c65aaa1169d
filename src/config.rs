//! Configuration management for ForgeTube
//! Handles loading and saving settings to settings.json

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::media::AlignMode;
use crate::subtitles::Weighting;

/// Title card shown before or after the main clips
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CardConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds on screen
    #[serde(default = "default_card_duration")]
    pub duration: f64,
    /// Background image; a black frame is used when unset or missing
    #[serde(default)]
    pub background: Option<String>,
    /// Text to draw. The intro card falls back to the script topic.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default = "default_card_font_size")]
    pub font_size: u32,
}

fn default_true() -> bool {
    true
}

fn default_card_duration() -> f64 {
    5.0
}

fn default_card_font_size() -> u32 {
    70
}

/// Shortest card ffmpeg is asked to render
const MIN_CARD_SECONDS: f64 = 0.1;

impl CardConfig {
    /// Seconds the card occupies on the timeline, zero when disabled
    pub fn effective_duration(&self) -> f64 {
        if self.enabled {
            self.duration.max(MIN_CARD_SECONDS)
        } else {
            0.0
        }
    }

    fn intro() -> Self {
        Self {
            enabled: true,
            duration: 5.0,
            background: Some("samples/intro/intro.jpg".to_string()),
            text: None,
            font_size: 70,
        }
    }

    fn outro() -> Self {
        Self {
            enabled: true,
            duration: 5.0,
            background: Some("samples/intro/intro.jpg".to_string()),
            text: Some("Thank you for watching! Made by ForgeTube team.".to_string()),
            font_size: 70,
        }
    }
}

/// Video encoding and composition settings
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VideoConfig {
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Encoder threads; 0 means one per available core
    #[serde(default)]
    pub threads: usize,
    #[serde(default = "default_video_codec")]
    pub video_codec: String,
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
    #[serde(default = "default_preset")]
    pub preset: String,
    #[serde(default = "default_crf")]
    pub crf: u32,
    /// Fixed output size. When unset the largest image decides the canvas.
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    /// Fade in/out length applied to every clip, 0 disables
    #[serde(default = "default_fade")]
    pub fade_seconds: f64,
    #[serde(default = "default_align_mode")]
    pub align: AlignMode,
    #[serde(default = "CardConfig::intro")]
    pub intro: CardConfig,
    #[serde(default = "CardConfig::outro")]
    pub outro: CardConfig,
}

fn default_fps() -> u32 {
    24
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_preset() -> String {
    "medium".to_string()
}

fn default_crf() -> u32 {
    23
}

fn default_fade() -> f64 {
    1.0
}

fn default_align_mode() -> AlignMode {
    AlignMode::Position
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            fps: 24,
            threads: 0,
            video_codec: default_video_codec(),
            audio_codec: default_audio_codec(),
            preset: default_preset(),
            crf: 23,
            width: None,
            height: None,
            fade_seconds: 1.0,
            align: AlignMode::Position,
            intro: CardConfig::intro(),
            outro: CardConfig::outro(),
        }
    }
}

impl VideoConfig {
    pub fn effective_threads(&self) -> usize {
        if self.threads > 0 {
            return self.threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// Subtitle generation settings
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SubtitleConfig {
    /// Burn subtitles into the video
    #[serde(default = "default_true")]
    pub burn: bool,
    /// Also write an .srt file next to the video
    #[serde(default = "default_true")]
    pub write_srt: bool,
    /// Maximum words per subtitle; 0 shows each narration line whole
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub weighting: Weighting,
    /// Font family name used by the subtitle renderer
    #[serde(default = "default_font_name")]
    pub font_name: String,
    #[serde(default = "default_subtitle_font_size")]
    pub font_size: u32,
    #[serde(default = "default_margin")]
    pub margin_v: u32,
}

fn default_chunk_size() -> usize {
    10
}

fn default_font_name() -> String {
    "DejaVu Sans".to_string()
}

fn default_subtitle_font_size() -> u32 {
    40
}

fn default_margin() -> u32 {
    30
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            burn: true,
            write_srt: true,
            chunk_size: 10,
            weighting: Weighting::Words,
            font_name: default_font_name(),
            font_size: 40,
            margin_v: 30,
        }
    }
}

/// Endpoints and models of the generation services
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AiConfig {
    #[serde(default = "default_script_provider")]
    pub script_provider: String,
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,
    #[serde(default = "default_ollama_model")]
    pub ollama_model: String,
    /// OpenRouter API keys (rotated on rate limits)
    #[serde(default)]
    pub openrouter_api_keys: Vec<String>,
    #[serde(default = "default_openrouter_model")]
    pub openrouter_model: String,
    /// Base URL of a txt2img server
    #[serde(default = "default_image_url")]
    pub image_url: String,
    /// Pause between image requests, in seconds
    #[serde(default = "default_image_delay")]
    pub image_delay_secs: u64,
    /// Base URL of an OpenAI-compatible speech server
    #[serde(default = "default_speech_url")]
    pub speech_url: String,
    #[serde(default = "default_speech_model")]
    pub speech_model: String,
    #[serde(default = "default_male_voice")]
    pub male_voice: String,
    #[serde(default = "default_female_voice")]
    pub female_voice: String,
}

fn default_script_provider() -> String {
    "ollama".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1".to_string()
}

fn default_openrouter_model() -> String {
    "meta-llama/llama-3.1-70b-instruct".to_string()
}

fn default_image_url() -> String {
    "http://localhost:7860".to_string()
}

fn default_image_delay() -> u64 {
    2
}

fn default_speech_url() -> String {
    "http://localhost:8880".to_string()
}

fn default_speech_model() -> String {
    "kokoro".to_string()
}

fn default_male_voice() -> String {
    "am_adam".to_string()
}

fn default_female_voice() -> String {
    "af_heart".to_string()
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            script_provider: default_script_provider(),
            ollama_url: default_ollama_url(),
            ollama_model: default_ollama_model(),
            openrouter_api_keys: Vec::new(),
            openrouter_model: default_openrouter_model(),
            image_url: default_image_url(),
            image_delay_secs: 2,
            speech_url: default_speech_url(),
            speech_model: default_speech_model(),
            male_voice: default_male_voice(),
            female_voice: default_female_voice(),
        }
    }
}

impl AiConfig {
    /// Configured keys, or the OPENROUTER_API_KEY environment variable
    pub fn openrouter_keys(&self) -> Vec<String> {
        let keys: Vec<String> = self
            .openrouter_api_keys
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty() && k != PLACEHOLDER_KEY)
            .collect();
        if !keys.is_empty() {
            return keys;
        }
        std::env::var("OPENROUTER_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .into_iter()
            .collect()
    }
}

const PLACEHOLDER_KEY: &str = "YOUR_API_KEY_HERE";

/// Application configuration stored in settings.json
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_image_dir")]
    pub image_dir: String,
    #[serde(default = "default_audio_dir")]
    pub audio_dir: String,
    #[serde(default = "default_script_path")]
    pub script_path: String,
    /// TrueType/OpenType font used for title cards
    #[serde(default = "default_font_path")]
    pub font_path: String,
    /// Default output directory for rendered videos
    #[serde(default = "default_output_dir")]
    pub default_output_dir: String,
    /// Scratch space for intermediate segments; defaults to the user cache dir
    #[serde(default)]
    pub work_dir: Option<String>,
    /// Show a desktop notification when a video is finished
    #[serde(default)]
    pub notify: bool,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub subtitles: SubtitleConfig,
    #[serde(default)]
    pub ai: AiConfig,
}

fn default_image_dir() -> String {
    "samples/images".to_string()
}

fn default_audio_dir() -> String {
    "samples/audio".to_string()
}

fn default_script_path() -> String {
    "samples/templates/script.json".to_string()
}

fn default_font_path() -> String {
    "samples/font/font.ttf".to_string()
}

fn default_output_dir() -> String {
    "./output".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            image_dir: default_image_dir(),
            audio_dir: default_audio_dir(),
            script_path: default_script_path(),
            font_path: default_font_path(),
            default_output_dir: default_output_dir(),
            work_dir: None,
            notify: false,
            video: VideoConfig::default(),
            subtitles: SubtitleConfig::default(),
            ai: AiConfig::default(),
        }
    }
}

impl AppConfig {
    /// Configuration file name
    pub const CONFIG_PATH: &'static str = "settings.json";

    /// Load configuration from a file
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow!(
                "Configuration file not found: {}. Run `forgetube init` to create one",
                path.display()
            ));
        }

        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse {}: {}", path.display(), e))?;

        Ok(config)
    }

    /// Load the file if present, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            log::debug!("{} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Create a default configuration file
    pub fn create_default(path: &Path) -> Result<()> {
        let mut default_config = AppConfig::default();
        default_config.ai.openrouter_api_keys = vec![PLACEHOLDER_KEY.to_string()];
        default_config.save_to(path)
    }

    /// Save configuration to file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Ensure output directory exists
    pub fn ensure_output_dir(&self) -> Result<()> {
        if !Path::new(&self.default_output_dir).exists() {
            fs::create_dir_all(&self.default_output_dir)?;
        }
        Ok(())
    }

    /// Directory for intermediate files
    pub fn work_dir(&self) -> PathBuf {
        match &self.work_dir {
            Some(dir) => PathBuf::from(dir),
            None => default_work_dir(),
        }
    }
}

/// Default scratch directory under the user's cache directory
pub fn default_work_dir() -> PathBuf {
    if let Some(cache_dir) = dirs::cache_dir() {
        cache_dir.join("forgetube").join("work")
    } else {
        PathBuf::from(".forgetube-work")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serialization() {
        let mut config = AppConfig::default();
        config.ai.openrouter_api_keys = vec!["test-key-1".to_string(), "test-key-2".to_string()];
        config.video.width = Some(1280);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{"video": {"fps": 30}, "subtitles": {"weighting": "characters"}}"#)
                .unwrap();
        assert_eq!(parsed.video.fps, 30);
        assert_eq!(parsed.video.crf, 23);
        assert!(parsed.video.intro.enabled);
        assert_eq!(parsed.video.intro.duration, 5.0);
        assert_eq!(parsed.subtitles.weighting, Weighting::Characters);
        assert_eq!(parsed.subtitles.chunk_size, 10);
        assert_eq!(parsed.ai.male_voice, "am_adam");
    }

    #[test]
    fn test_card_effective_duration() {
        let mut card = CardConfig::intro();
        assert_eq!(card.effective_duration(), 5.0);
        card.duration = 0.0;
        assert_eq!(card.effective_duration(), MIN_CARD_SECONDS);
        card.enabled = false;
        assert_eq!(card.effective_duration(), 0.0);
    }

    #[test]
    fn test_effective_threads() {
        let mut video = VideoConfig::default();
        assert!(video.effective_threads() >= 1);
        video.threads = 3;
        assert_eq!(video.effective_threads(), 3);
    }

    #[test]
    fn test_placeholder_key_is_ignored() {
        let mut ai = AiConfig::default();
        ai.openrouter_api_keys = vec![PLACEHOLDER_KEY.to_string(), " real-key ".to_string()];
        assert_eq!(ai.openrouter_keys(), vec!["real-key".to_string()]);
    }

    #[test]
    fn test_create_default_and_load() {
        let path = std::env::temp_dir().join("forgetube_test_settings.json");
        AppConfig::create_default(&path).unwrap();
        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.video.fps, 24);
        assert_eq!(loaded.ai.openrouter_api_keys, vec![PLACEHOLDER_KEY.to_string()]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_missing_config_file() {
        let path = std::env::temp_dir().join("forgetube_missing_settings.json");
        assert!(AppConfig::load_from(&path).is_err());
        assert_eq!(AppConfig::load_or_default(&path).unwrap(), AppConfig::default());
    }
}
