//! FFmpeg process helpers for ForgeTube
//! Handles dependency checks, ffprobe queries and cancellable ffmpeg runs

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;

/// Check if required external dependencies are available
pub fn check_dependencies() -> Result<()> {
    let mut missing = Vec::new();

    for tool in ["ffmpeg", "ffprobe"] {
        let found = Command::new(tool)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok();
        if !found {
            missing.push(tool);
        }
    }

    if !missing.is_empty() {
        let os = std::env::consts::OS;
        let mut msg = format!(
            "Missing required dependencies: {}.\nPlease install them first.",
            missing.join(", ")
        );

        if os == "linux" {
            msg.push_str("\n\nOn Linux (Ubuntu/Debian), try:\n  sudo apt update && sudo apt install ffmpeg");
        } else if os == "macos" {
            msg.push_str("\n\nOn macOS, try:\n  brew install ffmpeg");
        } else if os == "windows" {
            msg.push_str("\n\nOn Windows, ensure ffmpeg and ffprobe are in your PATH.");
        }

        return Err(anyhow!(msg));
    }

    Ok(())
}

/// Get media duration in seconds (with decimals) using ffprobe
pub fn get_media_duration(file_path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(file_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .context("Failed to run ffprobe")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("ffprobe failed: {}", stderr.trim()));
    }

    let duration_str = String::from_utf8_lossy(&output.stdout);
    let duration: f64 = duration_str
        .trim()
        .parse()
        .context("Failed to parse duration")?;

    Ok(duration)
}

/// Run ffmpeg with the given arguments inside `cwd`.
/// The child is killed as soon as `cancellation_token` is set.
pub async fn run_ffmpeg(
    args: &[String],
    cwd: &Path,
    cancellation_token: Arc<AtomicBool>,
) -> Result<()> {
    if cancellation_token.load(Ordering::Relaxed) {
        return Err(anyhow!("Process cancelled by user"));
    }

    log::debug!("ffmpeg {}", args.join(" "));

    let mut child = tokio::process::Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-y"])
        .args(args)
        .current_dir(cwd)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .context("Failed to execute ffmpeg")?;

    // Drain stderr concurrently so a chatty ffmpeg never blocks on a full pipe
    let stderr = child.stderr.take();
    let stderr_task = tokio::spawn(async move {
        let mut buf = String::new();
        if let Some(mut pipe) = stderr {
            let _ = pipe.read_to_string(&mut buf).await;
        }
        buf
    });

    let status = loop {
        let finished = tokio::select! {
            status = child.wait() => Some(status),
            _ = tokio::time::sleep(Duration::from_millis(200)) => None,
        };

        if let Some(status) = finished {
            break status.context("Failed to wait for ffmpeg")?;
        }

        if cancellation_token.load(Ordering::Relaxed) {
            let _ = child.kill().await;
            return Err(anyhow!("Process cancelled by user"));
        }
    };

    let stderr = stderr_task.await.unwrap_or_default();
    if !stderr.trim().is_empty() {
        log::debug!("ffmpeg stderr: {}", stderr.trim());
    }

    if !status.success() {
        return Err(anyhow!("ffmpeg failed ({}): {}", status, stderr.trim()));
    }

    Ok(())
}

/// Format seconds to HH:MM:SS timestamp
pub fn format_seconds_to_timestamp(seconds: f64) -> String {
    let seconds = seconds.max(0.0).round() as u64;
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}
