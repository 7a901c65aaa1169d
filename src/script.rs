//! Script document handling for ForgeTube
//! Loads, validates and saves the JSON script that drives a video

use chrono::{NaiveTime, Timelike};
use regex::Regex;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::{ScriptError, ScriptResult};
use crate::types::{ScriptDocument, DEFAULT_TOPIC};

impl ScriptDocument {
    /// Load a script document from disk
    pub fn load(path: &Path) -> ScriptResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ScriptError::NotFound(path.to_path_buf()),
            _ => ScriptError::Io {
                path: path.to_path_buf(),
                source: e,
            },
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> ScriptResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Parse the free-form text a language model returned
    pub fn from_model_output(raw: &str) -> ScriptResult<Self> {
        let value = extract_json_block(raw)?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn save(&self, path: &Path) -> ScriptResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| ScriptError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn topic_or_default(&self) -> &str {
        self.topic
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TOPIC)
    }

    /// Narration texts in script order; entries without text are skipped
    pub fn narration(&self) -> ScriptResult<Vec<String>> {
        if self.audio_script.is_empty() {
            return Err(ScriptError::NoNarration);
        }
        let lines: Vec<String> = self
            .audio_script
            .iter()
            .filter_map(|entry| entry.text.clone())
            .collect();
        if lines.is_empty() {
            return Err(ScriptError::NoNarration);
        }
        Ok(lines)
    }

    /// Report values outside the ranges the generator is asked to respect.
    /// Nothing here is fatal; the caller decides what to do with the list.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.topic.is_none() {
            warnings.push("missing topic".to_string());
        }

        for (i, entry) in self.audio_script.iter().enumerate() {
            let n = i + 1;
            match &entry.text {
                None => warnings.push(format!("audio_script[{}]: missing text", n)),
                Some(t) if t.trim().is_empty() => {
                    warnings.push(format!("audio_script[{}]: empty text", n))
                }
                _ => {}
            }
            if !(0.9..=1.1).contains(&entry.speed) {
                warnings.push(format!(
                    "audio_script[{}]: speed {} outside 0.9-1.1",
                    n, entry.speed
                ));
            }
            if !(0.9..=1.2).contains(&entry.pitch) {
                warnings.push(format!(
                    "audio_script[{}]: pitch {} outside 0.9-1.2",
                    n, entry.pitch
                ));
            }
            if let Some(ts) = &entry.timestamp {
                if parse_script_timestamp(ts).is_none() {
                    warnings.push(format!("audio_script[{}]: bad timestamp '{}'", n, ts));
                }
            }
        }

        for (i, scene) in self.visual_script.iter().enumerate() {
            let n = i + 1;
            if !(11.0..=14.0).contains(&scene.guidance_scale) {
                warnings.push(format!(
                    "visual_script[{}]: guidance_scale {} outside 11-14",
                    n, scene.guidance_scale
                ));
            }
            if !(50..=100).contains(&scene.steps) {
                warnings.push(format!(
                    "visual_script[{}]: steps {} outside 50-100",
                    n, scene.steps
                ));
            }
            let start = scene.timestamp_start.as_deref().map(|ts| (ts, parse_script_timestamp(ts)));
            let end = scene.timestamp_end.as_deref().map(|ts| (ts, parse_script_timestamp(ts)));
            for (ts, parsed) in [start, end].into_iter().flatten() {
                if parsed.is_none() {
                    warnings.push(format!("visual_script[{}]: bad timestamp '{}'", n, ts));
                }
            }
            if let (Some((_, Some(s))), Some((_, Some(e)))) = (start, end) {
                if e < s {
                    warnings.push(format!(
                        "visual_script[{}]: ends at {}s before it starts at {}s",
                        n, e, s
                    ));
                }
            }
        }

        warnings
    }
}

/// Read the topic of a script file
pub fn extract_topic(path: &Path) -> ScriptResult<String> {
    let doc = ScriptDocument::load(path)?;
    Ok(doc.topic_or_default().to_string())
}

/// Read the narration lines of a script file
pub fn extract_narration(path: &Path) -> ScriptResult<Vec<String>> {
    ScriptDocument::load(path)?.narration()
}

/// Pull a JSON object out of model output: the whole text, a ```json fence,
/// or the outermost brace span, in that order.
pub fn extract_json_block(raw: &str) -> ScriptResult<serde_json::Value> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(raw.trim()) {
        return Ok(value);
    }

    let fenced = Regex::new(r"(?s)```(?:json)?\s*\n(.*?)\n\s*```").ok();
    if let Some(cap) = fenced.as_ref().and_then(|re| re.captures(raw)) {
        return Ok(serde_json::from_str(cap[1].trim())?);
    }

    let braces = Regex::new(r"(?s)\{.*\}").ok();
    match braces.as_ref().and_then(|re| re.find(raw)) {
        Some(m) => Ok(serde_json::from_str(m.as_str())?),
        None => Err(ScriptError::NoJsonBlock),
    }
}

/// Parse an `MM:SS` or `HH:MM:SS` script timestamp into seconds
pub fn parse_script_timestamp(ts: &str) -> Option<u32> {
    let ts = ts.trim();
    let full = match ts.matches(':').count() {
        1 => format!("00:{}", ts),
        2 => ts.to_string(),
        _ => return None,
    };
    NaiveTime::parse_from_str(&full, "%H:%M:%S")
        .ok()
        .map(|t| t.num_seconds_from_midnight())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const SAMPLE: &str = r#"{
        "topic": "How to Drive a Car",
        "description": "A step-by-step guide.",
        "audio_script": [
            {"timestamp": "00:00", "text": "Driving a car is an essential skill.", "speaker": "narrator_male", "speed": 1.0, "pitch": 1.0, "emotion": "neutral"},
            {"timestamp": "00:05", "speaker": "narrator_female"},
            {"timestamp": "00:15", "text": "Turn the ignition key.", "speed": 0.95}
        ],
        "visual_script": [
            {"timestamp_start": "00:00", "timestamp_end": "00:05", "prompt": "A driver's seat", "guidance_scale": 11.5, "steps": 50, "seed": 123456},
            {"timestamp_start": "15:00", "timestamp_end": "00:20", "prompt": "An ignition key"}
        ]
    }"#;

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("forgetube_script_tests");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_parse_defaults() {
        let doc = ScriptDocument::parse(SAMPLE).unwrap();
        assert_eq!(doc.topic_or_default(), "How to Drive a Car");
        assert_eq!(doc.audio_script[1].speed, 1.0);
        assert_eq!(doc.audio_script[2].emotion, "neutral");
        assert_eq!(doc.visual_script[1].steps, 50);
        assert_eq!(doc.visual_script[1].width, 1024);
        assert_eq!(doc.visual_script[1].seed, None);
    }

    #[test]
    fn test_narration_skips_entries_without_text() {
        let doc = ScriptDocument::parse(SAMPLE).unwrap();
        let lines = doc.narration().unwrap();
        assert_eq!(
            lines,
            vec![
                "Driving a car is an essential skill.".to_string(),
                "Turn the ignition key.".to_string()
            ]
        );
    }

    #[test]
    fn test_missing_audio_script() {
        let doc = ScriptDocument::parse(r#"{"topic": "Cats"}"#).unwrap();
        assert!(matches!(doc.narration(), Err(ScriptError::NoNarration)));
    }

    #[test]
    fn test_missing_topic_falls_back() {
        let doc = ScriptDocument::parse(r#"{"audio_script": []}"#).unwrap();
        assert_eq!(doc.topic_or_default(), DEFAULT_TOPIC);
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let path = temp_file("broken.json", "{ \"topic\": \"Cats\", ");
        assert!(matches!(
            extract_narration(&path),
            Err(ScriptError::InvalidJson(_))
        ));
        assert!(matches!(extract_topic(&path), Err(ScriptError::InvalidJson(_))));
    }

    #[test]
    fn test_missing_file() {
        let path = std::env::temp_dir().join("forgetube_does_not_exist.json");
        assert!(matches!(
            ScriptDocument::load(&path),
            Err(ScriptError::NotFound(_))
        ));
    }

    #[test]
    fn test_extract_from_file() {
        let path = temp_file("sample.json", SAMPLE);
        assert_eq!(extract_topic(&path).unwrap(), "How to Drive a Car");
        assert_eq!(extract_narration(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_extract_json_block_variants() {
        let fenced = "Here is your script:\n```json\n{\"topic\": \"Cats\"}\n```\nEnjoy!";
        assert_eq!(extract_json_block(fenced).unwrap()["topic"], "Cats");

        let loose = "Sure! {\"topic\": \"Dogs\", \"audio_script\": []} hope it helps";
        assert_eq!(extract_json_block(loose).unwrap()["topic"], "Dogs");

        assert!(matches!(
            extract_json_block("no json here"),
            Err(ScriptError::NoJsonBlock)
        ));
    }

    #[test]
    fn test_from_model_output() {
        let raw = "```json\n{\"topic\": \"Birds\", \"audio_script\": [{\"text\": \"Tweet.\"}]}\n```";
        let doc = ScriptDocument::from_model_output(raw).unwrap();
        assert_eq!(doc.narration().unwrap(), vec!["Tweet.".to_string()]);
    }

    #[test]
    fn test_parse_script_timestamp() {
        assert_eq!(parse_script_timestamp("00:05"), Some(5));
        assert_eq!(parse_script_timestamp("01:30"), Some(90));
        assert_eq!(parse_script_timestamp("01:00:01"), Some(3601));
        assert_eq!(parse_script_timestamp("5"), None);
        assert_eq!(parse_script_timestamp("00:75"), None);
    }

    #[test]
    fn test_validate_reports_problems() {
        let doc = ScriptDocument::parse(SAMPLE).unwrap();
        let warnings = doc.validate();
        assert!(warnings.iter().any(|w| w.contains("audio_script[2]: missing text")));
        assert!(warnings.iter().any(|w| w.contains("visual_script[2]: ends at")));
        assert!(!warnings.iter().any(|w| w.contains("visual_script[1]")));
    }

    #[test]
    fn test_save_and_reload() {
        let doc = ScriptDocument::parse(SAMPLE).unwrap();
        let path = std::env::temp_dir()
            .join("forgetube_script_tests")
            .join("saved.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        doc.save(&path).unwrap();
        assert_eq!(ScriptDocument::load(&path).unwrap(), doc);
    }
}
