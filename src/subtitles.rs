//! Subtitle timing and subtitle file output for ForgeTube
//!
//! Narration lines are split into short word chunks and each chunk receives
//! a share of its audio clip's duration. Chunk boundaries are derived from
//! the cumulative share so the last chunk of a line ends exactly where the
//! line's audio ends.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::types::SubtitleChunk;

/// How a line's duration is divided between its chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weighting {
    /// Proportional to the number of words in each chunk
    #[default]
    Words,
    /// Proportional to the number of characters in each chunk
    Characters,
}

/// Split text on whitespace into groups of at most `chunk_size` words.
/// A chunk size of zero keeps the whole text together.
pub fn chunk_words(text: &str, chunk_size: usize) -> Vec<Vec<&str>> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }
    if chunk_size == 0 {
        return vec![words];
    }
    words.chunks(chunk_size).map(|c| c.to_vec()).collect()
}

fn chunk_weight(words: &[&str], weighting: Weighting) -> f64 {
    match weighting {
        Weighting::Words => words.len() as f64,
        Weighting::Characters => {
            let chars: usize = words.iter().map(|w| w.chars().count()).sum();
            // Count the joining spaces too
            (chars + words.len().saturating_sub(1)) as f64
        }
    }
}

/// Incrementally lays narration lines out on the video timeline
#[derive(Debug, Clone)]
pub struct TimelineBuilder {
    chunk_size: usize,
    weighting: Weighting,
    offset: f64,
    chunks: Vec<SubtitleChunk>,
}

impl TimelineBuilder {
    pub fn new(chunk_size: usize, start_offset: f64, weighting: Weighting) -> Self {
        Self {
            chunk_size,
            weighting,
            offset: start_offset.max(0.0),
            chunks: Vec::new(),
        }
    }

    /// Current end of the timeline in seconds
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Append one narration line played over `duration` seconds of audio.
    /// Lines without words add no subtitle but still consume their duration.
    pub fn push_line(&mut self, text: &str, duration: f64) {
        let duration = duration.max(0.0);
        let line_start = self.offset;
        let groups = chunk_words(text, self.chunk_size);

        let weights: Vec<f64> = groups
            .iter()
            .map(|g| chunk_weight(g, self.weighting))
            .collect();
        let total: f64 = weights.iter().sum();

        if total > 0.0 {
            let mut cumulative = 0.0;
            let mut start = line_start;
            for (group, weight) in groups.iter().zip(&weights) {
                cumulative += weight;
                let end = line_start + duration * (cumulative / total);
                self.chunks.push(SubtitleChunk {
                    index: self.chunks.len() + 1,
                    text: group.join(" "),
                    start,
                    end,
                });
                start = end;
            }
        }

        self.offset = line_start + duration;
    }

    /// Skip a stretch of the timeline without subtitles (intro cards, gaps)
    pub fn advance(&mut self, seconds: f64) {
        self.offset += seconds.max(0.0);
    }

    pub fn finish(self) -> Vec<SubtitleChunk> {
        self.chunks
    }
}

/// Build the subtitle timeline for `(text, duration)` pairs in playback order
pub fn build_timeline<'a, I>(
    lines: I,
    chunk_size: usize,
    start_offset: f64,
    weighting: Weighting,
) -> Vec<SubtitleChunk>
where
    I: IntoIterator<Item = (&'a str, f64)>,
{
    let mut builder = TimelineBuilder::new(chunk_size, start_offset, weighting);
    for (text, duration) in lines {
        builder.push_line(text, duration);
    }
    builder.finish()
}

/// Format seconds as an SRT timestamp (HH:MM:SS,mmm)
pub fn format_srt_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    format!(
        "{:02}:{:02}:{:02},{:03}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60,
        ms
    )
}

/// Parse an SRT timestamp (HH:MM:SS,mmm) into seconds
pub fn parse_srt_timestamp(ts: &str) -> Result<f64> {
    let (hms, ms) = ts
        .trim()
        .split_once(|c: char| c == ',' || c == '.')
        .ok_or_else(|| anyhow!("Invalid SRT timestamp: {}", ts))?;
    let parts: Vec<&str> = hms.split(':').collect();
    if parts.len() != 3 {
        return Err(anyhow!("Invalid SRT timestamp: {}", ts));
    }

    let hours: u64 = parts[0].parse().context("Invalid hours")?;
    let minutes: u64 = parts[1].parse().context("Invalid minutes")?;
    let seconds: u64 = parts[2].parse().context("Invalid seconds")?;
    let millis: u64 = ms.parse().context("Invalid milliseconds")?;

    Ok((hours * 3600 + minutes * 60 + seconds) as f64 + millis as f64 / 1000.0)
}

pub fn render_srt(chunks: &[SubtitleChunk]) -> String {
    let mut content = String::new();
    for chunk in chunks {
        content.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            chunk.index,
            format_srt_timestamp(chunk.start),
            format_srt_timestamp(chunk.end),
            chunk.text
        ));
    }
    content
}

pub fn write_srt(chunks: &[SubtitleChunk], output: &Path) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, render_srt(chunks))
        .with_context(|| format!("Failed to write SRT file: {}", output.display()))
}

/// Read SRT content back into chunks. Multi-line cue text is joined with '\n'.
pub fn parse_srt(content: &str) -> Result<Vec<SubtitleChunk>> {
    let normalized = content.replace("\r\n", "\n");
    let mut chunks = Vec::new();

    for block in normalized.split("\n\n") {
        let mut lines = block.lines().filter(|l| !l.trim().is_empty());
        let Some(index_line) = lines.next() else {
            continue;
        };
        let index: usize = index_line
            .trim()
            .trim_start_matches('\u{feff}')
            .parse()
            .with_context(|| format!("Invalid cue index: {}", index_line))?;
        let timing = lines
            .next()
            .ok_or_else(|| anyhow!("Cue {} has no timing line", index))?;
        let (start, end) = timing
            .split_once("-->")
            .ok_or_else(|| anyhow!("Cue {} has a malformed timing line", index))?;
        let text = lines.collect::<Vec<_>>().join("\n");

        chunks.push(SubtitleChunk {
            index,
            text,
            start: parse_srt_timestamp(start)?,
            end: parse_srt_timestamp(end)?,
        });
    }

    Ok(chunks)
}

/// Visual style of burned-in subtitles
#[derive(Debug, Clone)]
pub struct SubtitleStyle {
    pub font_name: String,
    pub font_size: u32,
    pub play_res_x: u32,
    pub play_res_y: u32,
    pub margin_v: u32,
}

/// Write an ASS subtitle file: white text on an opaque black box,
/// centred at the bottom of the frame.
pub fn generate_ass(chunks: &[SubtitleChunk], style: &SubtitleStyle, output: &Path) -> Result<()> {
    let mut content = String::new();

    content.push_str("[Script Info]\r\n");
    content.push_str("Title: ForgeTube Subtitles\r\n");
    content.push_str("ScriptType: v4.00+\r\n");
    content.push_str(&format!("PlayResX: {}\r\n", style.play_res_x));
    content.push_str(&format!("PlayResY: {}\r\n", style.play_res_y));
    content.push_str("WrapStyle: 0\r\n");
    content.push_str("\r\n");

    content.push_str("[V4+ Styles]\r\n");
    content.push_str("Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding\r\n");
    // BorderStyle 3 draws an opaque box in OutlineColour behind the text
    content.push_str(&format!(
        "Style: Default,{},{},&H00FFFFFF,&H000000FF,&H00000000,&H00000000,0,0,0,0,100,100,0,0,3,8,0,2,40,40,{},1\r\n",
        style.font_name, style.font_size, style.margin_v
    ));
    content.push_str("\r\n");

    content.push_str("[Events]\r\n");
    content.push_str(
        "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\r\n",
    );

    for chunk in chunks {
        content.push_str(&format!(
            "Dialogue: 0,{},{},Default,,0,0,0,,{}\r\n",
            format_ass_timestamp(chunk.start),
            format_ass_timestamp(chunk.end),
            escape_ass_text(&chunk.text)
        ));
    }

    fs::write(output, &content)
        .with_context(|| format!("Failed to write ASS subtitle file: {}", output.display()))?;

    Ok(())
}

/// Braces open override blocks in ASS, so they are escaped to stay literal
fn escape_ass_text(text: &str) -> String {
    text.replace('{', "\\{")
        .replace('}', "\\}")
        .replace('\n', "\\N")
}

/// Format seconds as an ASS timestamp (H:MM:SS.CC)
fn format_ass_timestamp(seconds: f64) -> String {
    let total_cs = (seconds.max(0.0) * 100.0).round() as u64;
    let centiseconds = total_cs % 100;
    let total_seconds = total_cs / 100;

    format!(
        "{}:{:02}:{:02}.{:02}",
        total_seconds / 3600,
        (total_seconds % 3600) / 60,
        total_seconds % 60,
        centiseconds
    )
}
