//! Video assembly for ForgeTube
//! Renders one segment per image/audio pair, wraps them with title cards,
//! concatenates everything and burns in the narration subtitles.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::config::{AppConfig, CardConfig, SubtitleConfig, VideoConfig};
use crate::error::AlignError;
use crate::media::{self, AUDIO_EXTENSIONS, IMAGE_EXTENSIONS};
use crate::subtitles::{self, SubtitleStyle, TimelineBuilder};
use crate::types::{ClipPlan, ScriptDocument, SubtitleChunk};
use crate::video;

/// Sample rate shared by every segment so the concat demuxer can stream-copy
const AUDIO_SAMPLE_RATE: u32 = 48000;

/// Encoder parameters shared by every ffmpeg invocation of a run
#[derive(Debug, Clone)]
pub struct EncodeSettings {
    pub fps: u32,
    pub threads: usize,
    pub video_codec: String,
    pub audio_codec: String,
    pub preset: String,
    pub crf: u32,
}

impl From<&VideoConfig> for EncodeSettings {
    fn from(config: &VideoConfig) -> Self {
        Self {
            fps: config.fps.max(1),
            threads: config.effective_threads(),
            video_codec: config.video_codec.clone(),
            audio_codec: config.audio_codec.clone(),
            preset: config.preset.clone(),
            crf: config.crf,
        }
    }
}

impl EncodeSettings {
    fn output_args(&self) -> Vec<String> {
        vec![
            "-c:v".to_string(),
            self.video_codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-r".to_string(),
            self.fps.to_string(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-ar".to_string(),
            AUDIO_SAMPLE_RATE.to_string(),
            "-ac".to_string(),
            "2".to_string(),
            "-threads".to_string(),
            self.threads.to_string(),
        ]
    }
}

/// Scale into the canvas keeping the aspect ratio, then letterbox with black
pub fn fit_filter(width: u32, height: u32) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1",
        w = width,
        h = height
    )
}

/// Fade in at the start and out at the end. The fade never exceeds half the clip.
pub fn fade_filter(duration: f64, fade: f64) -> Option<String> {
    let fade = fade.min(duration / 2.0);
    if fade <= 0.0 {
        return None;
    }
    Some(format!(
        "fade=t=in:st=0:d={:.3},fade=t=out:st={:.3}:d={:.3}",
        fade,
        duration - fade,
        fade
    ))
}

/// Arguments rendering one image shown for the length of its audio
pub fn clip_segment_args(
    plan: &ClipPlan,
    canvas: (u32, u32),
    fade: f64,
    settings: &EncodeSettings,
    output: &str,
) -> Vec<String> {
    let mut filter = fit_filter(canvas.0, canvas.1);
    if let Some(f) = fade_filter(plan.duration, fade) {
        filter.push(',');
        filter.push_str(&f);
    }

    let mut args: Vec<String> = vec![
        "-loop".to_string(),
        "1".to_string(),
        "-framerate".to_string(),
        settings.fps.to_string(),
        "-i".to_string(),
        plan.image.to_string_lossy().to_string(),
        "-i".to_string(),
        plan.audio.to_string_lossy().to_string(),
        "-map".to_string(),
        "0:v".to_string(),
        "-map".to_string(),
        "1:a".to_string(),
        "-t".to_string(),
        format!("{:.3}", plan.duration),
        "-vf".to_string(),
        filter,
    ];
    args.extend(settings.output_args());
    args.push(output.to_string());
    args
}

/// A title card ready to render
#[derive(Debug, Clone)]
pub struct CardSpec {
    pub duration: f64,
    pub background: Option<PathBuf>,
    /// File holding the text, relative to the work directory
    pub text_file: String,
    pub font_file: Option<String>,
    pub font_size: u32,
}

pub fn drawtext_filter(card: &CardSpec) -> String {
    let mut opts = Vec::new();
    if let Some(font) = &card.font_file {
        opts.push(format!("fontfile={}", font));
    }
    opts.push(format!("textfile={}", card.text_file));
    opts.push(format!("fontsize={}", card.font_size));
    opts.push("fontcolor=white".to_string());
    opts.push("x=(w-text_w)/2".to_string());
    opts.push("y=(h-text_h)/2".to_string());
    format!("drawtext={}", opts.join(":"))
}

/// Arguments rendering a silent card with centred text
pub fn card_segment_args(
    card: &CardSpec,
    canvas: (u32, u32),
    settings: &EncodeSettings,
    output: &str,
) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    match &card.background {
        Some(bg) => args.extend([
            "-loop".to_string(),
            "1".to_string(),
            "-framerate".to_string(),
            settings.fps.to_string(),
            "-i".to_string(),
            bg.to_string_lossy().to_string(),
        ]),
        None => args.extend([
            "-f".to_string(),
            "lavfi".to_string(),
            "-i".to_string(),
            format!(
                "color=c=black:s={}x{}:r={}",
                canvas.0, canvas.1, settings.fps
            ),
        ]),
    }
    args.extend([
        "-f".to_string(),
        "lavfi".to_string(),
        "-i".to_string(),
        format!(
            "anullsrc=channel_layout=stereo:sample_rate={}",
            AUDIO_SAMPLE_RATE
        ),
        "-map".to_string(),
        "0:v".to_string(),
        "-map".to_string(),
        "1:a".to_string(),
        "-t".to_string(),
        format!("{:.3}", card.duration),
        "-vf".to_string(),
        format!("{},{}", fit_filter(canvas.0, canvas.1), drawtext_filter(card)),
    ]);
    args.extend(settings.output_args());
    args.push(output.to_string());
    args
}

/// Body of a concat demuxer list file
pub fn concat_list(segments: &[String]) -> String {
    segments
        .iter()
        .map(|s| format!("file '{}'\n", s.replace('\'', "'\\''")))
        .collect()
}

pub fn concat_args(list_file: &str, output: &str) -> Vec<String> {
    vec![
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list_file.to_string(),
        "-c".to_string(),
        "copy".to_string(),
        output.to_string(),
    ]
}

/// Re-encode the video stream with the ASS file drawn on top
pub fn burn_args(
    input: &str,
    ass_file: &str,
    fonts_dir: Option<&str>,
    settings: &EncodeSettings,
    output: &str,
) -> Vec<String> {
    let filter = match fonts_dir {
        Some(dir) => format!("ass={}:fontsdir={}", ass_file, dir),
        None => format!("ass={}", ass_file),
    };
    vec![
        "-i".to_string(),
        input.to_string(),
        "-vf".to_string(),
        filter,
        "-c:v".to_string(),
        settings.video_codec.clone(),
        "-preset".to_string(),
        settings.preset.clone(),
        "-crf".to_string(),
        settings.crf.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-c:a".to_string(),
        "copy".to_string(),
        "-threads".to_string(),
        settings.threads.to_string(),
        output.to_string(),
    ]
}

/// What to build
#[derive(Debug, Clone)]
pub struct AssemblyRequest {
    pub image_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub script_path: Option<PathBuf>,
    pub output: PathBuf,
    pub burn_subtitles: bool,
    pub srt_output: Option<PathBuf>,
    /// Hand-edited SRT used instead of computing the timing
    pub subtitle_file: Option<PathBuf>,
    pub keep_temp: bool,
}

/// What was built
#[derive(Debug, Clone)]
pub struct AssemblyReport {
    pub output: PathBuf,
    pub srt: Option<PathBuf>,
    pub clips: usize,
    pub subtitles: usize,
    pub duration: f64,
}

/// Script driving a run. A path given on the command line must load; the
/// configured default is used only when it exists.
pub fn resolve_script(explicit: Option<PathBuf>, default: &Path) -> Result<Option<PathBuf>> {
    match explicit {
        Some(path) => {
            ScriptDocument::load(&path)?;
            Ok(Some(path))
        }
        None if default.exists() => Ok(Some(default.to_path_buf())),
        None => {
            log::info!(
                "No script at {}, assembling without subtitles",
                default.display()
            );
            Ok(None)
        }
    }
}

/// File name for a video when none is given, e.g. `black_holes_20250101_120000.mp4`
pub fn default_output_name(topic: &str, stamp: &str) -> String {
    let slug: String = topic
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let slug: Vec<&str> = slug.split('_').filter(|s| !s.is_empty()).collect();
    let slug = if slug.is_empty() {
        "forgetube".to_string()
    } else {
        slug.join("_")
    };
    format!("{}_{}.mp4", slug, stamp)
}

/// Seconds of title card before the first clip
pub fn intro_offset(video: &VideoConfig) -> f64 {
    video.intro.effective_duration()
}

/// Lay out subtitles for already-planned clips
pub fn clip_timeline(
    plans: &[ClipPlan],
    config: &SubtitleConfig,
    start_offset: f64,
) -> Vec<SubtitleChunk> {
    let mut builder = TimelineBuilder::new(config.chunk_size, 0.0, config.weighting);
    builder.advance(start_offset);
    for plan in plans {
        builder.push_line(plan.narration.as_deref().unwrap_or(""), plan.duration);
    }
    log::debug!("Subtitle timeline ends at {:.3}s", builder.offset());
    builder.finish()
}

/// Subtitles from an existing SRT file, already timed against the final video
pub fn load_subtitle_file(path: &Path) -> Result<Vec<SubtitleChunk>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read subtitles: {}", path.display()))?;
    subtitles::parse_srt(&content)
        .with_context(|| format!("Failed to parse subtitles: {}", path.display()))
}

/// Subtitles from narration audio and the script, without any images
pub fn narration_timeline(
    audio_dir: &Path,
    script_path: &Path,
    config: &SubtitleConfig,
    start_offset: f64,
) -> Result<Vec<SubtitleChunk>> {
    let audio = media::list_files(audio_dir, AUDIO_EXTENSIONS)?;
    if audio.is_empty() {
        return Err(AlignError::NoAudio.into());
    }
    let narration = ScriptDocument::load(script_path)?.narration()?;
    if narration.len() != audio.len() {
        return Err(AlignError::NarrationMismatch {
            narration: narration.len(),
            clips: audio.len(),
        }
        .into());
    }

    let mut lines = Vec::with_capacity(audio.len());
    for (text, path) in narration.iter().zip(&audio) {
        let duration = media::audio_duration(path)
            .with_context(|| format!("Failed to read duration of {}", path.display()))?;
        log::debug!("{}: {:.3}s", path.display(), duration);
        lines.push((text.as_str(), duration));
    }

    Ok(subtitles::build_timeline(
        lines,
        config.chunk_size,
        start_offset,
        config.weighting,
    ))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Copy the title font into the work directory and return its relative name
fn stage_font(font_path: &Path, work_dir: &Path) -> Result<Option<String>> {
    if !font_path.exists() {
        log::warn!(
            "Font {} not found, falling back to the ffmpeg default font",
            font_path.display()
        );
        return Ok(None);
    }
    let extension = font_path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_else(|| "ttf".to_string());
    let name = format!("fonts/title.{}", extension);
    fs::create_dir_all(work_dir.join("fonts"))?;
    fs::copy(font_path, work_dir.join(&name))
        .with_context(|| format!("Failed to copy font {}", font_path.display()))?;
    Ok(Some(name))
}

fn prepare_card(
    card: &CardConfig,
    fallback_text: &str,
    name: &str,
    font_file: Option<&String>,
    work_dir: &Path,
) -> Result<CardSpec> {
    let text = card.text.clone().unwrap_or_else(|| fallback_text.to_string());
    let text_file = format!("{}.txt", name);
    fs::write(work_dir.join(&text_file), text)?;

    let background = match card.background.as_deref().map(Path::new) {
        Some(bg) if bg.exists() => Some(fs::canonicalize(bg)?),
        Some(bg) => {
            log::warn!(
                "Card background {} not found, using a black frame",
                bg.display()
            );
            None
        }
        None => None,
    };

    Ok(CardSpec {
        duration: card.effective_duration(),
        background,
        text_file,
        font_file: font_file.cloned(),
        font_size: card.font_size,
    })
}

/// Build the full video. `status_callback` receives human-readable progress.
pub async fn assemble<F>(
    request: &AssemblyRequest,
    config: &AppConfig,
    cancellation_token: Arc<AtomicBool>,
    status_callback: F,
) -> Result<AssemblyReport>
where
    F: Fn(String),
{
    let images = media::list_files(&request.image_dir, IMAGE_EXTENSIONS)?;
    let audio = media::list_files(&request.audio_dir, AUDIO_EXTENSIONS)?;
    let pairs = media::align(&images, &audio, config.video.align)?;

    let wants_subtitles = request.subtitle_file.is_none()
        && (request.burn_subtitles || request.srt_output.is_some());
    let script = match &request.script_path {
        Some(path) => Some(ScriptDocument::load(path)?),
        None if wants_subtitles => {
            return Err(anyhow!("Subtitles were requested but no script was given"))
        }
        None => None,
    };
    let topic = script
        .as_ref()
        .map(|s| s.topic_or_default().to_string())
        .unwrap_or_else(|| crate::types::DEFAULT_TOPIC.to_string());
    let narration = match (&script, wants_subtitles) {
        (Some(doc), true) => Some(doc.narration()?),
        _ => None,
    };

    let plans = media::plan_clips(pairs, narration.as_deref(), media::audio_duration)?;
    let plans = plans
        .into_iter()
        .map(|p| -> Result<ClipPlan> {
            Ok(ClipPlan {
                image: fs::canonicalize(&p.image)?,
                audio: fs::canonicalize(&p.audio)?,
                ..p
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let fixed = match (config.video.width, config.video.height) {
        (Some(w), Some(h)) => Some((w, h)),
        _ => None,
    };
    let plan_images: Vec<PathBuf> = plans.iter().map(|p| p.image.clone()).collect();
    let canvas = media::canvas_size(&plan_images, fixed)?;
    let settings = EncodeSettings::from(&config.video);
    status_callback(format!(
        "{} clips, canvas {}x{}, {} fps, {} threads",
        plans.len(),
        canvas.0,
        canvas.1,
        settings.fps,
        settings.threads
    ));

    let session = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let work_dir = config.work_dir().join(format!("run_{}", session));
    fs::create_dir_all(&work_dir)
        .with_context(|| format!("Failed to create work directory {}", work_dir.display()))?;
    log::info!("Working in {}", work_dir.display());

    let result = render(
        request,
        config,
        &plans,
        &topic,
        canvas,
        &settings,
        &work_dir,
        cancellation_token,
        &status_callback,
    )
    .await;

    if request.keep_temp {
        log::info!("Keeping intermediate files in {}", work_dir.display());
    } else {
        fs::remove_dir_all(&work_dir).ok();
    }

    result
}

#[allow(clippy::too_many_arguments)]
async fn render<F>(
    request: &AssemblyRequest,
    config: &AppConfig,
    plans: &[ClipPlan],
    topic: &str,
    canvas: (u32, u32),
    settings: &EncodeSettings,
    work_dir: &Path,
    cancellation_token: Arc<AtomicBool>,
    status_callback: &F,
) -> Result<AssemblyReport>
where
    F: Fn(String),
{
    let video_config = &config.video;
    let font_file = stage_font(Path::new(&config.font_path), work_dir)?;
    let mut segments: Vec<String> = Vec::new();
    let mut total = 0.0;

    if video_config.intro.enabled {
        status_callback("Rendering intro card".to_string());
        let card = prepare_card(&video_config.intro, topic, "intro", font_file.as_ref(), work_dir)?;
        let name = "intro.mp4".to_string();
        video::run_ffmpeg(
            &card_segment_args(&card, canvas, settings, &name),
            work_dir,
            cancellation_token.clone(),
        )
        .await
        .context("Failed to render intro card")?;
        total += card.duration;
        segments.push(name);
    }

    for (i, plan) in plans.iter().enumerate() {
        let name = format!("clip_{:03}.mp4", i + 1);
        video::run_ffmpeg(
            &clip_segment_args(plan, canvas, video_config.fade_seconds, settings, &name),
            work_dir,
            cancellation_token.clone(),
        )
        .await
        .with_context(|| format!("Failed to render clip {}", i + 1))?;
        total += plan.duration;
        segments.push(name);
        status_callback(format!(
            "Video clip {}/{} created ({:.2}s)",
            i + 1,
            plans.len(),
            plan.duration
        ));
    }

    if video_config.outro.enabled {
        status_callback("Rendering outro card".to_string());
        let card = prepare_card(&video_config.outro, topic, "outro", font_file.as_ref(), work_dir)?;
        let name = "outro.mp4".to_string();
        video::run_ffmpeg(
            &card_segment_args(&card, canvas, settings, &name),
            work_dir,
            cancellation_token.clone(),
        )
        .await
        .context("Failed to render outro card")?;
        total += card.duration;
        segments.push(name);
    }

    status_callback("Joining segments".to_string());
    fs::write(work_dir.join("segments.txt"), concat_list(&segments))?;
    let joined = "joined.mp4";
    video::run_ffmpeg(
        &concat_args("segments.txt", joined),
        work_dir,
        cancellation_token.clone(),
    )
    .await
    .context("Failed to concatenate segments")?;

    let chunks = match &request.subtitle_file {
        Some(path) => load_subtitle_file(path)?,
        None if request.burn_subtitles || request.srt_output.is_some() => {
            clip_timeline(plans, &config.subtitles, intro_offset(video_config))
        }
        None => Vec::new(),
    };

    let output = absolute(&request.output)?;
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    if request.burn_subtitles {
        status_callback(format!("Burning {} subtitles", chunks.len()));
        let style = SubtitleStyle {
            font_name: config.subtitles.font_name.clone(),
            font_size: config.subtitles.font_size,
            play_res_x: canvas.0,
            play_res_y: canvas.1,
            margin_v: config.subtitles.margin_v,
        };
        subtitles::generate_ass(&chunks, &style, &work_dir.join("subtitles.ass"))?;
        let fonts_dir = font_file.as_ref().map(|_| "fonts");
        video::run_ffmpeg(
            &burn_args(
                joined,
                "subtitles.ass",
                fonts_dir,
                settings,
                &output.to_string_lossy(),
            ),
            work_dir,
            cancellation_token.clone(),
        )
        .await
        .context("Failed to burn subtitles")?;
    } else {
        fs::copy(work_dir.join(joined), &output)
            .with_context(|| format!("Failed to write {}", output.display()))?;
    }

    let srt = match &request.srt_output {
        Some(path) => {
            subtitles::write_srt(&chunks, path)?;
            status_callback(format!("Subtitles saved to {}", path.display()));
            Some(path.clone())
        }
        None => None,
    };

    Ok(AssemblyReport {
        output,
        srt,
        clips: plans.len(),
        subtitles: chunks.len(),
        duration: total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScriptError;

    fn settings() -> EncodeSettings {
        EncodeSettings {
            fps: 24,
            threads: 4,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            preset: "medium".to_string(),
            crf: 23,
        }
    }

    fn plan(duration: f64, narration: Option<&str>) -> ClipPlan {
        ClipPlan {
            image: PathBuf::from("/assets/01.png"),
            audio: PathBuf::from("/assets/01.wav"),
            duration,
            narration: narration.map(str::to_string),
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> &'a str {
        let pos = args.iter().position(|a| a == flag).unwrap();
        &args[pos + 1]
    }

    #[test]
    fn test_fade_filter() {
        assert_eq!(
            fade_filter(6.0, 1.0).unwrap(),
            "fade=t=in:st=0:d=1.000,fade=t=out:st=5.000:d=1.000"
        );
        // Short clips get shorter fades
        assert_eq!(
            fade_filter(1.0, 1.0).unwrap(),
            "fade=t=in:st=0:d=0.500,fade=t=out:st=0.500:d=0.500"
        );
        assert!(fade_filter(6.0, 0.0).is_none());
    }

    #[test]
    fn test_clip_segment_args() {
        let args = clip_segment_args(&plan(4.25, None), (1024, 576), 1.0, &settings(), "clip_001.mp4");
        assert_eq!(value_after(&args, "-t"), "4.250");
        assert_eq!(value_after(&args, "-framerate"), "24");
        assert_eq!(value_after(&args, "-threads"), "4");
        assert_eq!(value_after(&args, "-ar"), "48000");
        let filter = value_after(&args, "-vf");
        assert!(filter.starts_with("scale=1024:576:force_original_aspect_ratio=decrease,pad=1024:576:"));
        assert!(filter.ends_with("fade=t=out:st=3.250:d=1.000"));
        assert_eq!(args.last().unwrap(), "clip_001.mp4");
        assert!(args.contains(&"/assets/01.png".to_string()));
    }

    #[test]
    fn test_card_without_background_uses_color_source() {
        let card = CardSpec {
            duration: 5.0,
            background: None,
            text_file: "intro.txt".to_string(),
            font_file: Some("fonts/title.ttf".to_string()),
            font_size: 70,
        };
        let args = card_segment_args(&card, (640, 360), &settings(), "intro.mp4");
        assert!(args.contains(&"color=c=black:s=640x360:r=24".to_string()));
        assert!(args.iter().any(|a| a.starts_with("anullsrc=")));
        let filter = value_after(&args, "-vf");
        assert!(filter.contains(
            "drawtext=fontfile=fonts/title.ttf:textfile=intro.txt:fontsize=70:fontcolor=white"
        ));
    }

    #[test]
    fn test_drawtext_without_font() {
        let card = CardSpec {
            duration: 5.0,
            background: Some(PathBuf::from("/bg.jpg")),
            text_file: "outro.txt".to_string(),
            font_file: None,
            font_size: 50,
        };
        assert!(drawtext_filter(&card).starts_with("drawtext=textfile=outro.txt:fontsize=50"));
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let list = concat_list(&["intro.mp4".to_string(), "it's.mp4".to_string()]);
        assert_eq!(list, "file 'intro.mp4'\nfile 'it'\\''s.mp4'\n");
    }

    #[test]
    fn test_burn_args() {
        let args = burn_args("joined.mp4", "subtitles.ass", Some("fonts"), &settings(), "/out/video.mp4");
        assert_eq!(value_after(&args, "-vf"), "ass=subtitles.ass:fontsdir=fonts");
        assert_eq!(value_after(&args, "-c:a"), "copy");

        let args = burn_args("joined.mp4", "subtitles.ass", None, &settings(), "/out/video.mp4");
        assert_eq!(value_after(&args, "-vf"), "ass=subtitles.ass");
    }

    #[test]
    fn test_resolve_script() {
        let dir = std::env::temp_dir().join("forgetube_assembly_resolve");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        let missing = dir.join("typo.json");
        let present = dir.join("script.json");
        fs::write(&present, r#"{"topic": "T", "audio_script": [{"text": "hi"}]}"#).unwrap();

        // A missing script given explicitly is an error, never a silent fallback
        let err = resolve_script(Some(missing.clone()), &present).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScriptError>(),
            Some(ScriptError::NotFound(p)) if p == &missing
        ));

        assert_eq!(resolve_script(Some(present.clone()), &missing).unwrap(), Some(present.clone()));
        assert_eq!(resolve_script(None, &present).unwrap(), Some(present));
        assert_eq!(resolve_script(None, &missing).unwrap(), None);

        let broken = dir.join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(
            resolve_script(Some(broken), &missing)
                .unwrap_err()
                .downcast_ref::<ScriptError>(),
            Some(ScriptError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_default_output_name() {
        assert_eq!(
            default_output_name("How to Drive a Car?", "20250101_120000"),
            "how_to_drive_a_car_20250101_120000.mp4"
        );
        assert_eq!(default_output_name("  ", "x"), "forgetube_x.mp4");
    }

    #[test]
    fn test_clip_timeline_starts_after_intro() {
        let plans = vec![
            plan(24.0, Some("one two three four five six seven eight nine ten eleven twelve")),
            plan(3.0, Some("thirteen fourteen")),
        ];
        let mut config = SubtitleConfig::default();
        config.chunk_size = 5;

        let mut video = VideoConfig::default();
        let chunks = clip_timeline(&plans, &config, intro_offset(&video));
        assert_eq!(chunks.len(), 4);
        assert!((chunks[0].start - 5.0).abs() < 1e-9);
        assert!((chunks[2].end - 29.0).abs() < 1e-9);
        assert!((chunks[3].end - 32.0).abs() < 1e-9);

        video.intro.enabled = false;
        assert_eq!(intro_offset(&video), 0.0);
    }

    #[test]
    fn test_short_intro_card_matches_subtitle_offset() {
        let dir = std::env::temp_dir().join("forgetube_assembly_card");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();

        let mut video = VideoConfig::default();
        video.intro.duration = 0.0;
        video.intro.background = None;
        let card = prepare_card(&video.intro, "Topic", "intro", None, &dir).unwrap();
        assert!(card.duration > 0.0);
        assert_eq!(card.duration, intro_offset(&video));
        assert_eq!(fs::read_to_string(dir.join("intro.txt")).unwrap(), "Topic");
    }

    #[test]
    fn test_load_subtitle_file() {
        let path = std::env::temp_dir().join("forgetube_assembly_edited.srt");
        fs::write(
            &path,
            "1\n00:00:05,000 --> 00:00:07,500\nHello there\n\n2\n00:00:07,500 --> 00:00:09,000\nGeneral\n",
        )
        .unwrap();
        let chunks = load_subtitle_file(&path).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "Hello there");
        assert!((chunks[1].start - 7.5).abs() < 1e-9);

        assert!(load_subtitle_file(&std::env::temp_dir().join("forgetube_missing.srt")).is_err());
    }

    #[test]
    fn test_narration_timeline_from_wavs() {
        let root = std::env::temp_dir().join("forgetube_assembly_narration");
        let _ = fs::remove_dir_all(&root);
        let audio_dir = root.join("audio");
        fs::create_dir_all(&audio_dir).unwrap();

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 1000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        for (name, samples) in [("01.wav", 2000), ("02.wav", 3000)] {
            let mut writer = hound::WavWriter::create(audio_dir.join(name), spec).unwrap();
            for _ in 0..samples {
                writer.write_sample(0i16).unwrap();
            }
            writer.finalize().unwrap();
        }

        let script = root.join("script.json");
        fs::write(
            &script,
            r#"{"topic": "T", "audio_script": [{"text": "alpha beta"}, {"text": "gamma delta epsilon"}]}"#,
        )
        .unwrap();

        let mut config = SubtitleConfig::default();
        config.chunk_size = 2;
        let chunks = narration_timeline(&audio_dir, &script, &config, 0.0).unwrap();
        assert_eq!(chunks.len(), 3);
        assert!((chunks[0].end - 2.0).abs() < 1e-9);
        assert!((chunks[1].end - 4.0).abs() < 1e-9);
        assert!((chunks[2].end - 5.0).abs() < 1e-9);

        fs::write(&script, r#"{"audio_script": [{"text": "only one"}]}"#).unwrap();
        let err = narration_timeline(&audio_dir, &script, &config, 0.0).unwrap_err();
        assert_eq!(
            err.downcast_ref::<AlignError>(),
            Some(&AlignError::NarrationMismatch { narration: 1, clips: 2 })
        );
    }
}
