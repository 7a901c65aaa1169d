use anyhow::{anyhow, Context, Result};
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::types::{ScriptDocument, VisualScene};

/// Client for a Stable Diffusion style txt2img HTTP endpoint
pub struct ImageClient {
    client: Client,
    base_url: String,
    delay: Duration,
}

#[derive(Serialize)]
struct Txt2ImgRequest<'a> {
    prompt: String,
    negative_prompt: &'a str,
    steps: u32,
    cfg_scale: f32,
    width: u32,
    height: u32,
    /// -1 asks the server for a random seed
    seed: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    denoising_strength: Option<f32>,
}

#[derive(Deserialize)]
struct Txt2ImgResponse {
    #[serde(default)]
    images: Vec<String>,
}

/// Prompt text sent for a scene, with its style appended when present
pub fn scene_prompt(scene: &VisualScene) -> String {
    match scene.style.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(style) => format!("{}, {} style", scene.prompt.trim(), style),
        None => scene.prompt.trim().to_string(),
    }
}

/// `scene_001.png` and so on, so file order matches script order
pub fn scene_file_name(index: usize) -> String {
    format!("scene_{:03}.png", index + 1)
}

/// Decode the base64 payload, tolerating a `data:image/png;base64,` prefix
fn decode_image(encoded: &str) -> Result<Vec<u8>> {
    let data = match encoded.split_once(',') {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => encoded,
    };
    base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .context("Image payload is not valid base64")
}

impl ImageClient {
    pub fn new(base_url: String, delay_secs: u64) -> Self {
        Self {
            client: Client::new(),
            base_url,
            delay: Duration::from_secs(delay_secs),
        }
    }

    /// Render a single scene and return the PNG bytes
    pub async fn generate_scene(&self, scene: &VisualScene) -> Result<Vec<u8>> {
        let url = format!("{}/sdapi/v1/txt2img", self.base_url.trim_end_matches('/'));
        let request = Txt2ImgRequest {
            prompt: scene_prompt(scene),
            negative_prompt: &scene.negative_prompt,
            steps: scene.steps,
            cfg_scale: scene.guidance_scale,
            width: scene.width,
            height: scene.height,
            seed: scene.seed.map(|s| s as i64).unwrap_or(-1),
            denoising_strength: scene.strength,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to reach image endpoint at {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Image request failed ({}): {}", status, error_text));
        }

        let body: Txt2ImgResponse = response.json().await?;
        let first = body
            .images
            .first()
            .ok_or_else(|| anyhow!("Image endpoint returned no images"))?;
        decode_image(first)
    }

    /// Render every visual scene into `output_dir`. A failing scene is logged
    /// and skipped; the paths written are returned in scene order.
    pub async fn generate_all<F>(
        &self,
        script: &ScriptDocument,
        output_dir: &Path,
        cancellation_token: Arc<AtomicBool>,
        status_callback: F,
    ) -> Result<Vec<PathBuf>>
    where
        F: Fn(String),
    {
        if script.visual_script.is_empty() {
            return Err(anyhow!("Script has no visual_script entries"));
        }
        tokio::fs::create_dir_all(output_dir).await?;

        let total = script.visual_script.len();
        let mut written = Vec::new();

        for (idx, scene) in script.visual_script.iter().enumerate() {
            if cancellation_token.load(Ordering::Relaxed) {
                return Err(anyhow!("Process cancelled by user"));
            }

            let name = scene_file_name(idx);
            status_callback(format!("Generating image {}/{}", idx + 1, total));
            match self.generate_scene(scene).await {
                Ok(bytes) => {
                    let path = output_dir.join(&name);
                    tokio::fs::write(&path, bytes).await?;
                    status_callback(format!("Saved: {}", path.display()));
                    written.push(path);
                }
                Err(e) => log::error!("Error processing scene {}: {:#}", idx + 1, e),
            }

            if idx + 1 < total && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(style: Option<&str>) -> VisualScene {
        serde_json::from_value(serde_json::json!({
            "timestamp_start": "00:05",
            "prompt": " A red fox in snow ",
            "style": style,
        }))
        .unwrap()
    }

    #[test]
    fn test_scene_files_sort_in_script_order() {
        assert_eq!(scene_file_name(0), "scene_001.png");
        assert_eq!(scene_file_name(9), "scene_010.png");

        let dir = std::env::temp_dir().join("forgetube_images_order");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let expected: Vec<PathBuf> = (0..12).map(|i| dir.join(scene_file_name(i))).collect();
        for path in expected.iter().rev() {
            std::fs::write(path, b"png").unwrap();
        }
        let listed =
            crate::media::list_files(&dir, crate::media::IMAGE_EXTENSIONS).unwrap();
        assert_eq!(listed, expected);
    }

    #[test]
    fn test_scene_prompt_with_style() {
        assert_eq!(
            scene_prompt(&scene(Some("cinematic"))),
            "A red fox in snow, cinematic style"
        );
        assert_eq!(scene_prompt(&scene(None)), "A red fox in snow");
    }

    #[test]
    fn test_request_defaults() {
        let s = scene(None);
        let request = Txt2ImgRequest {
            prompt: scene_prompt(&s),
            negative_prompt: &s.negative_prompt,
            steps: s.steps,
            cfg_scale: s.guidance_scale,
            width: s.width,
            height: s.height,
            seed: s.seed.map(|v| v as i64).unwrap_or(-1),
            denoising_strength: s.strength,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["steps"], 50);
        assert_eq!(value["width"], 1024);
        assert_eq!(value["height"], 576);
        assert_eq!(value["seed"], -1);
        assert!(value.get("denoising_strength").is_none());
    }

    #[test]
    fn test_decode_image() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"\x89PNG");
        assert_eq!(decode_image(&encoded).unwrap(), b"\x89PNG");
        let uri = format!("data:image/png;base64,{}", encoded);
        assert_eq!(decode_image(&uri).unwrap(), b"\x89PNG");
        assert!(decode_image("%%%").is_err());
    }
}
