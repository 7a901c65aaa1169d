use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::AiConfig;
use crate::types::{NarrationEntry, ScriptDocument};

/// Client for an OpenAI-compatible `/v1/audio/speech` endpoint
pub struct SpeechClient {
    client: Client,
    base_url: String,
    model: String,
    male_voice: String,
    female_voice: String,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'static str,
    speed: f32,
}

/// `segment_001.wav` and so on, so file order matches script order
pub fn segment_file_name(index: usize) -> String {
    format!("segment_{:03}.wav", index + 1)
}

impl SpeechClient {
    pub fn new(config: &AiConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.speech_url.clone(),
            model: config.speech_model.clone(),
            male_voice: config.male_voice.clone(),
            female_voice: config.female_voice.clone(),
        }
    }

    /// `default` and `narrator_male` get the male voice, anyone else the female one
    pub fn voice_for(&self, speaker: &str) -> &str {
        match speaker.trim().to_lowercase().as_str() {
            "default" | "narrator_male" => &self.male_voice,
            _ => &self.female_voice,
        }
    }

    /// Synthesize one narration entry and return the WAV bytes
    pub async fn synthesize(&self, entry: &NarrationEntry) -> Result<Vec<u8>> {
        let text = entry
            .text
            .as_deref()
            .ok_or_else(|| anyhow!("Narration entry has no text"))?;
        let url = format!("{}/v1/audio/speech", self.base_url.trim_end_matches('/'));
        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice: self.voice_for(&entry.speaker),
            response_format: "wav",
            speed: entry.speed,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to reach speech endpoint at {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Speech request failed ({}): {}", status, error_text));
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// Synthesize every narration line with text into `output_dir`.
    /// Entries without text are skipped, matching the narration extraction.
    pub async fn synthesize_all<F>(
        &self,
        script: &ScriptDocument,
        output_dir: &Path,
        cancellation_token: Arc<AtomicBool>,
        status_callback: F,
    ) -> Result<Vec<PathBuf>>
    where
        F: Fn(String),
    {
        let entries: Vec<&NarrationEntry> = script
            .audio_script
            .iter()
            .filter(|e| e.text.is_some())
            .collect();
        if entries.is_empty() {
            return Err(anyhow!("Script has no narration to synthesize"));
        }
        tokio::fs::create_dir_all(output_dir).await?;

        let mut written = Vec::with_capacity(entries.len());
        for (idx, entry) in entries.iter().enumerate() {
            if cancellation_token.load(Ordering::Relaxed) {
                return Err(anyhow!("Process cancelled by user"));
            }
            status_callback(format!(
                "Synthesizing segment {}/{} ({})",
                idx + 1,
                entries.len(),
                self.voice_for(&entry.speaker)
            ));

            let bytes = self
                .synthesize(entry)
                .await
                .with_context(|| format!("Failed to synthesize segment {}", idx + 1))?;
            let path = output_dir.join(segment_file_name(idx));
            tokio::fs::write(&path, bytes).await?;
            written.push(path);
        }

        Ok(written)
    }
}

/// Concatenate WAV files into one. All inputs must share the same format.
pub fn merge_wavs(inputs: &[PathBuf], output: &Path) -> Result<()> {
    let first = inputs
        .first()
        .ok_or_else(|| anyhow!("No audio segments to merge"))?;
    let spec = hound::WavReader::open(first)
        .with_context(|| format!("Failed to open {}", first.display()))?
        .spec();

    let mut writer = hound::WavWriter::create(output, spec)
        .with_context(|| format!("Failed to create {}", output.display()))?;

    for input in inputs {
        let mut reader = hound::WavReader::open(input)
            .with_context(|| format!("Failed to open {}", input.display()))?;
        if reader.spec() != spec {
            return Err(anyhow!(
                "{} has a different format ({:?}) than {} ({:?})",
                input.display(),
                reader.spec(),
                first.display(),
                spec
            ));
        }

        match spec.sample_format {
            hound::SampleFormat::Float => {
                for sample in reader.samples::<f32>() {
                    writer.write_sample(sample?)?;
                }
            }
            hound::SampleFormat::Int => {
                for sample in reader.samples::<i32>() {
                    writer.write_sample(sample?)?;
                }
            }
        }
    }

    writer.finalize()?;
    Ok(())
}
