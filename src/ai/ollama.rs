use anyhow::{anyhow, Context, Result};
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

/// Streaming chat client for a local Ollama server
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

/// One NDJSON line of a streamed `/api/chat` response
#[derive(Deserialize)]
struct ChatChunk {
    message: Option<ChatMessage>,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

/// Decode one stream line into its text piece. Blank lines yield nothing.
fn parse_line(line: &[u8]) -> Result<Option<String>> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let chunk: ChatChunk =
        serde_json::from_str(line).with_context(|| format!("Bad Ollama stream line: {}", line))?;
    if let Some(error) = chunk.error {
        return Err(anyhow!("Ollama error: {}", error));
    }
    if chunk.done {
        log::debug!("Ollama stream finished");
    }
    Ok(chunk.message.map(|m| m.content).filter(|c| !c.is_empty()))
}

/// Split complete lines off the front of `buffer`
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<Vec<u8>> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let mut line: Vec<u8> = buffer.drain(..=pos).collect();
        line.pop();
        lines.push(line);
    }
    lines
}

impl OllamaClient {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            model,
        }
    }

    /// Send one system + user exchange and return the full reply.
    /// Every streamed piece is passed to `on_chunk` as it arrives.
    pub async fn chat<F>(&self, system: &str, user: &str, on_chunk: F) -> Result<String>
    where
        F: Fn(&str),
    {
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let payload = json!({
            "model": self.model,
            "stream": true,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ]
        });

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Failed to reach Ollama at {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Ollama request failed ({}): {}", status, error_text));
        }

        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut content = String::new();

        while let Some(bytes) = stream.next().await {
            buffer.extend_from_slice(&bytes?);
            for line in drain_lines(&mut buffer) {
                if let Some(piece) = parse_line(&line)? {
                    on_chunk(&piece);
                    content.push_str(&piece);
                }
            }
        }
        if let Some(piece) = parse_line(&buffer)? {
            on_chunk(&piece);
            content.push_str(&piece);
        }

        Ok(content)
    }
}
