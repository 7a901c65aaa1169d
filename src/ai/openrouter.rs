use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Key wrapper
struct ClientKey {
    key: String,
}

pub struct OpenRouterClient {
    client: Client,
    api_keys: Vec<Arc<ClientKey>>,
    current_key_index: AtomicUsize,
    model: String,
}

#[derive(Deserialize)]
struct OpenRouterResponse {
    #[serde(default)]
    choices: Vec<OpenRouterChoice>,
    error: Option<OpenRouterError>,
}

#[derive(Deserialize)]
struct OpenRouterChoice {
    message: OpenRouterMessage,
}

#[derive(Deserialize)]
struct OpenRouterMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenRouterError {
    message: String,
}

/// Statuses that mean "this key is exhausted or invalid, try the next one"
fn should_rotate(status: u16) -> bool {
    matches!(status, 401 | 402 | 429)
}

impl OpenRouterClient {
    pub fn new(api_keys: Vec<String>, model: String) -> Self {
        let keys = api_keys
            .into_iter()
            .map(|k| Arc::new(ClientKey { key: k }))
            .collect();

        Self {
            client: Client::new(),
            api_keys: keys,
            current_key_index: AtomicUsize::new(0),
            model,
        }
    }

    fn get_current_key(&self) -> Result<Arc<ClientKey>> {
        if self.api_keys.is_empty() {
            return Err(anyhow!("No OpenRouter API keys available"));
        }
        let index = self.current_key_index.load(Ordering::Relaxed);
        if index >= self.api_keys.len() {
            self.current_key_index.store(0, Ordering::Relaxed);
            return Ok(self.api_keys[0].clone());
        }
        Ok(self.api_keys[index].clone())
    }

    fn rotate_key(&self) {
        if self.api_keys.len() > 1 {
            let next = (self.current_key_index.load(Ordering::Relaxed) + 1) % self.api_keys.len();
            self.current_key_index.store(next, Ordering::Relaxed);
            log::info!("Switched to OpenRouter key #{}", next + 1);
        }
    }

    /// Send one system + user exchange and return the reply text
    pub async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ]
        });

        let mut attempts = 0;
        let max_attempts = self.api_keys.len().max(3);

        while attempts < max_attempts {
            let key = self.get_current_key()?;

            let response = self
                .client
                .post(OPENROUTER_API_URL)
                .header("Authorization", format!("Bearer {}", key.key))
                .header("X-Title", crate::types::APP_NAME)
                .json(&payload)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    if resp.status().is_success() {
                        let body: OpenRouterResponse = resp.json().await?;
                        if let Some(error) = body.error {
                            return Err(anyhow!("OpenRouter error: {}", error.message));
                        }
                        return body
                            .choices
                            .into_iter()
                            .next()
                            .and_then(|c| c.message.content)
                            .ok_or_else(|| anyhow!("OpenRouter returned an empty response"));
                    }

                    let status = resp.status();
                    let error_text = resp.text().await.unwrap_or_default();
                    log::warn!("OpenRouter Error ({}): {}", status, error_text);

                    if should_rotate(status.as_u16()) {
                        self.rotate_key();
                    } else {
                        return Err(anyhow!("OpenRouter request failed ({}): {}", status, error_text));
                    }
                }
                Err(e) => {
                    log::warn!("Request failed: {}", e);
                    self.rotate_key();
                }
            }
            attempts += 1;
        }

        Err(anyhow!(
            "OpenRouter request failed after {} attempts",
            max_attempts
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_statuses() {
        assert!(should_rotate(429));
        assert!(should_rotate(401));
        assert!(should_rotate(402));
        assert!(!should_rotate(500));
        assert!(!should_rotate(400));
    }

    #[test]
    fn test_key_rotation_wraps() {
        let client = OpenRouterClient::new(
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            "model".to_string(),
        );
        assert_eq!(client.get_current_key().unwrap().key, "a");
        client.rotate_key();
        client.rotate_key();
        assert_eq!(client.get_current_key().unwrap().key, "c");
        client.rotate_key();
        assert_eq!(client.get_current_key().unwrap().key, "a");
    }

    #[test]
    fn test_no_keys() {
        let client = OpenRouterClient::new(Vec::new(), "model".to_string());
        assert!(client.get_current_key().is_err());
    }
}
