//! AI generation clients for ForgeTube
//! Script text comes from Ollama or OpenRouter, images from a txt2img
//! endpoint and narration from a speech endpoint.

pub mod images;
pub mod ollama;
pub mod openrouter;
pub mod speech;

use anyhow::{anyhow, Result};

use crate::config::AiConfig;
use crate::types::ScriptDocument;

pub use images::ImageClient;
pub use ollama::OllamaClient;
pub use openrouter::OpenRouterClient;
pub use speech::SpeechClient;

pub const SYSTEM_PROMPT: &str = r#"You are a professional video script generator.
Generate JSON output strictly following this structure:
{
    "topic": "Topic Name",
    "description": "description of the video",
    "audio_script": [{
        "timestamp": "00:00",
        "text": "Narration text",
        "speaker": "default|narrator_male|narrator_female",
        "speed": 0.9-1.1,
        "pitch": 0.9-1.2,
        "emotion": "neutral|serious|dramatic|mysterious|informative"
    }],
    "visual_script": [{
        "timestamp_start": "00:00",
        "timestamp_end": "00:05",
        "prompt": "Detailed Stable Diffusion prompt",
        "negative_prompt": "Low quality elements to avoid",
        "style": "realistic|cinematic|hyperrealistic|fantasy|scientific",
        "guidance_scale": 11.0-14.0,
        "steps": 50-100,
        "seed": 6 digit integer,
        "width": 1024,
        "height": 576
    }]
}
Every audio_script entry needs a matching visual_script entry.
Ensure audio and visual timestamps are synchronized.
Output ONLY the JSON document."#;

/// User prompt for a fresh script
pub fn generation_prompt(topic: &str, duration_secs: u32, key_points: &[String]) -> String {
    let points = if key_points.is_empty() {
        "Comprehensive coverage".to_string()
    } else {
        key_points.join("; ")
    };
    format!(
        "Generate a {}-second video script about: {}\n\
         Key Points: {}\n\
         - At least {} segments (5-second intervals)\n\
         - Engaging and accurate narration\n\
         - Cinematic visuals with detailed prompts",
        duration_secs,
        topic,
        points,
        (duration_secs / 5).max(1)
    )
}

/// User prompt asking the model to rework an existing script
pub fn refinement_prompt(existing: &ScriptDocument, feedback: &str) -> Result<String> {
    let current = serde_json::to_string_pretty(existing)?;
    Ok(format!(
        "Refine this script based on feedback:\n\
         Existing Script: {}\n\
         Feedback: {}\n\
         Keep the same JSON structure.",
        current, feedback
    ))
}

/// Wrapper enum for the supported script providers
pub enum ScriptGenerator {
    Ollama(OllamaClient),
    OpenRouter(OpenRouterClient),
}

impl ScriptGenerator {
    pub fn from_config(config: &AiConfig) -> Result<Self> {
        match config.script_provider.to_lowercase().as_str() {
            "ollama" => Ok(ScriptGenerator::Ollama(OllamaClient::new(
                config.ollama_url.clone(),
                config.ollama_model.clone(),
            ))),
            "openrouter" => {
                let keys = config.openrouter_keys();
                if keys.is_empty() {
                    return Err(anyhow!(
                        "No OpenRouter API keys configured. Add them to settings.json or set OPENROUTER_API_KEY"
                    ));
                }
                Ok(ScriptGenerator::OpenRouter(OpenRouterClient::new(
                    keys,
                    config.openrouter_model.clone(),
                )))
            }
            other => Err(anyhow!("Unknown script provider: {}", other)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScriptGenerator::Ollama(_) => "Ollama",
            ScriptGenerator::OpenRouter(_) => "OpenRouter",
        }
    }

    /// Raw completion. `on_chunk` sees the text as it arrives.
    async fn complete<F>(&self, user_prompt: &str, on_chunk: F) -> Result<String>
    where
        F: Fn(&str),
    {
        match self {
            ScriptGenerator::Ollama(client) => {
                client.chat(SYSTEM_PROMPT, user_prompt, on_chunk).await
            }
            ScriptGenerator::OpenRouter(client) => {
                let content = client.chat(SYSTEM_PROMPT, user_prompt).await?;
                on_chunk(&content);
                Ok(content)
            }
        }
    }

    pub async fn generate<F>(
        &self,
        topic: &str,
        duration_secs: u32,
        key_points: &[String],
        on_chunk: F,
    ) -> Result<ScriptDocument>
    where
        F: Fn(&str),
    {
        let prompt = generation_prompt(topic, duration_secs, key_points);
        let raw = self.complete(&prompt, on_chunk).await?;
        log::debug!("Raw script output: {}", raw);
        Ok(ScriptDocument::from_model_output(&raw)?)
    }

    pub async fn refine<F>(
        &self,
        existing: &ScriptDocument,
        feedback: &str,
        on_chunk: F,
    ) -> Result<ScriptDocument>
    where
        F: Fn(&str),
    {
        let prompt = refinement_prompt(existing, feedback)?;
        let raw = self.complete(&prompt, on_chunk).await?;
        log::debug!("Raw refinement output: {}", raw);
        Ok(ScriptDocument::from_model_output(&raw)?)
    }
}
