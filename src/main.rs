//! ForgeTube
//! Turns a JSON video script, generated images and narration audio into a
//! finished video with intro/outro cards and burned-in subtitles.

mod ai;
mod assembly;
mod config;
mod error;
mod media;
mod script;
mod subtitles;
mod types;
mod video;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use simplelog::{
    ColorChoice, CombinedLogger, Config, LevelFilter, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use ai::{ImageClient, ScriptGenerator, SpeechClient};
use assembly::AssemblyRequest;
use config::AppConfig;
use media::AlignMode;
use types::{ScriptDocument, APP_NAME, APP_VERSION};

#[derive(Parser, Debug)]
#[command(name = "forgetube")]
#[command(about = "Assemble AI-generated images and narration into a subtitled video", long_about = None)]
#[command(version)]
struct Cli {
    /// Also write debug logs to debug.log
    #[arg(long, global = true)]
    debug: bool,

    /// Path to the settings file
    #[arg(short, long, global = true, default_value = AppConfig::CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default settings file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Build the video from images, audio and the script
    Assemble {
        #[arg(short, long)]
        images: Option<PathBuf>,

        #[arg(short, long)]
        audio: Option<PathBuf>,

        #[arg(short, long)]
        script: Option<PathBuf>,

        /// Output video file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip burning subtitles into the video
        #[arg(long)]
        no_subtitles: bool,

        /// Where to write the .srt sidecar (defaults next to the video)
        #[arg(long)]
        srt: Option<PathBuf>,

        /// Do not write an .srt sidecar
        #[arg(long, conflicts_with = "srt")]
        no_srt: bool,

        /// Burn this (hand-edited) .srt instead of timing the narration
        #[arg(long, conflicts_with = "no_subtitles")]
        subtitles_from: Option<PathBuf>,

        #[arg(long)]
        align: Option<AlignMode>,

        /// ffmpeg threads (0 = all cores)
        #[arg(short, long)]
        threads: Option<usize>,

        #[arg(long, requires = "height")]
        width: Option<u32>,

        #[arg(long, requires = "width")]
        height: Option<u32>,

        #[arg(long)]
        no_intro: bool,

        #[arg(long)]
        no_outro: bool,

        /// Keep intermediate files in the work directory
        #[arg(long)]
        keep_temp: bool,
    },

    /// Write subtitles for the narration audio without rendering video
    Srt {
        #[arg(short, long)]
        audio: Option<PathBuf>,

        #[arg(short, long)]
        script: Option<PathBuf>,

        #[arg(short, long, default_value = "subtitles.srt")]
        output: PathBuf,

        /// Words per subtitle (0 = whole line)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Seconds to shift every subtitle by
        #[arg(long, default_value_t = 0.0)]
        offset: f64,
    },

    /// Print the topic and narration lines of a script
    Extract { script: Option<PathBuf> },

    /// Report out-of-range values in a script
    Validate { script: Option<PathBuf> },

    /// Generate a script with the configured language model
    Script {
        topic: String,

        /// Target video length in seconds
        #[arg(short, long, default_value_t = 60)]
        duration: u32,

        /// Points the script should cover (repeatable)
        #[arg(short, long = "key-point")]
        key_points: Vec<String>,

        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Ask for feedback and refine the script until an empty answer
        #[arg(short, long)]
        interactive: bool,
    },

    /// Generate one image per visual scene of the script
    Images {
        #[arg(short, long)]
        script: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Synthesize narration audio for the script
    Speech {
        #[arg(short, long)]
        script: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also merge all segments into this WAV file
        #[arg(short, long)]
        merge: Option<PathBuf>,
    },

    /// Verify that ffmpeg and ffprobe are installed
    Check,
}

fn init_logging(debug: bool) -> Result<()> {
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];

    if debug {
        loggers.push(WriteLogger::new(
            LevelFilter::Debug,
            Config::default(),
            OpenOptions::new()
                .create(true)
                .append(true)
                .open("debug.log")?,
        ));
    }

    CombinedLogger::init(loggers)?;
    Ok(())
}

/// Cancellation flag set by Ctrl-C
fn install_ctrl_c() -> Arc<AtomicBool> {
    let token = Arc::new(AtomicBool::new(false));
    let flag = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Ctrl-C received, stopping...");
            flag.store(true, Ordering::Relaxed);
        }
    });
    token
}

fn notify(config: &AppConfig, body: &str) {
    if config.notify {
        let _ = notify_rust::Notification::new()
            .summary(APP_NAME)
            .body(body)
            .show();
    }
}

fn or_config(arg: Option<PathBuf>, fallback: &str) -> PathBuf {
    arg.unwrap_or_else(|| PathBuf::from(fallback))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug)?;
    log::debug!("{} {} starting with {:?}", APP_NAME, APP_VERSION, cli);

    if let Commands::Init { force } = &cli.command {
        return init_config(&cli.config, *force);
    }

    let config = AppConfig::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Check => {
            video::check_dependencies()?;
            println!("✅ ffmpeg and ffprobe are available");
            Ok(())
        }
        Commands::Extract { script } => {
            let path = or_config(script, &config.script_path);
            let topic = script::extract_topic(&path)?;
            let lines = script::extract_narration(&path)?;
            println!("Topic: {}", topic);
            for (i, line) in lines.iter().enumerate() {
                println!("{:>3}. {}", i + 1, line);
            }
            Ok(())
        }
        Commands::Validate { script } => {
            let path = or_config(script, &config.script_path);
            let doc = ScriptDocument::load(&path)?;
            let warnings = doc.validate();
            if warnings.is_empty() {
                println!("✅ {} looks good", path.display());
            } else {
                for w in &warnings {
                    println!("⚠️  {}", w);
                }
                println!("{} warning(s)", warnings.len());
            }
            Ok(())
        }
        Commands::Srt {
            audio,
            script,
            output,
            chunk_size,
            offset,
        } => {
            let mut subtitle_config = config.subtitles.clone();
            if let Some(size) = chunk_size {
                subtitle_config.chunk_size = size;
            }
            let chunks = assembly::narration_timeline(
                &or_config(audio, &config.audio_dir),
                &or_config(script, &config.script_path),
                &subtitle_config,
                offset,
            )?;
            subtitles::write_srt(&chunks, &output)?;
            let total: f64 = chunks.iter().map(|c| c.duration()).sum();
            println!(
                "✅ {} subtitles ({}) written to {}",
                chunks.len(),
                video::format_seconds_to_timestamp(total),
                output.display()
            );
            Ok(())
        }
        Commands::Assemble {
            images,
            audio,
            script,
            output,
            no_subtitles,
            srt,
            no_srt,
            subtitles_from,
            align,
            threads,
            width,
            height,
            no_intro,
            no_outro,
            keep_temp,
        } => {
            video::check_dependencies()?;

            let mut config = config;
            if let Some(mode) = align {
                config.video.align = mode;
            }
            if let Some(t) = threads {
                config.video.threads = t;
            }
            if width.is_some() {
                config.video.width = width;
                config.video.height = height;
            }
            if no_intro {
                config.video.intro.enabled = false;
            }
            if no_outro {
                config.video.outro.enabled = false;
            }

            let script_path =
                assembly::resolve_script(script, Path::new(&config.script_path))?;
            let burn_subtitles = subtitles_from.is_some()
                || (config.subtitles.burn && !no_subtitles && script_path.is_some());

            let output = match output {
                Some(o) => o,
                None => {
                    config.ensure_output_dir()?;
                    let topic = match &script_path {
                        Some(p) => script::extract_topic(p)?,
                        None => types::DEFAULT_TOPIC.to_string(),
                    };
                    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
                    Path::new(&config.default_output_dir)
                        .join(assembly::default_output_name(&topic, &stamp))
                }
            };
            let srt_output = if no_srt || script_path.is_none() || subtitles_from.is_some() {
                None
            } else {
                srt.or_else(|| {
                    config
                        .subtitles
                        .write_srt
                        .then(|| output.with_extension("srt"))
                })
            };

            let request = AssemblyRequest {
                image_dir: or_config(images, &config.image_dir),
                audio_dir: or_config(audio, &config.audio_dir),
                script_path,
                output,
                burn_subtitles,
                srt_output,
                subtitle_file: subtitles_from,
                keep_temp,
            };

            let token = install_ctrl_c();
            match assembly::assemble(&request, &config, token, |msg| log::info!("{}", msg)).await
            {
                Ok(report) => {
                    println!(
                        "✅ Video saved to {} ({} clips, {})",
                        report.output.display(),
                        report.clips,
                        video::format_seconds_to_timestamp(report.duration)
                    );
                    if let Some(srt) = &report.srt {
                        println!("   {} subtitles in {}", report.subtitles, srt.display());
                    }
                    notify(&config, &format!("Video ready: {}", report.output.display()));
                    Ok(())
                }
                Err(e) => {
                    notify(&config, "Video assembly failed");
                    Err(e)
                }
            }
        }
        Commands::Script {
            topic,
            duration,
            key_points,
            output,
            interactive,
        } => {
            let generator = ScriptGenerator::from_config(&config.ai)?;
            let output = or_config(output, &config.script_path);
            log::info!("Generating script with {}", generator.name());

            let mut doc = generator
                .generate(&topic, duration, &key_points, print_chunk)
                .await?;
            println!();
            save_script(&doc, &output)?;

            while interactive {
                let feedback = prompt_line("Feedback (empty to finish): ")?;
                if feedback.is_empty() {
                    break;
                }
                match generator.refine(&doc, &feedback, print_chunk).await {
                    Ok(refined) => {
                        println!();
                        doc = refined;
                        save_script(&doc, &output)?;
                    }
                    Err(e) => log::error!("Refinement failed, keeping previous script: {:#}", e),
                }
            }
            Ok(())
        }
        Commands::Images { script, output } => {
            let doc = ScriptDocument::load(&or_config(script, &config.script_path))?;
            let output = or_config(output, &config.image_dir);
            let client = ImageClient::new(config.ai.image_url.clone(), config.ai.image_delay_secs);
            let written = client
                .generate_all(&doc, &output, install_ctrl_c(), |msg| log::info!("{}", msg))
                .await?;
            println!(
                "✅ {}/{} images saved to {}",
                written.len(),
                doc.visual_script.len(),
                output.display()
            );
            Ok(())
        }
        Commands::Speech {
            script,
            output,
            merge,
        } => {
            let doc = ScriptDocument::load(&or_config(script, &config.script_path))?;
            let output = or_config(output, &config.audio_dir);
            let client = SpeechClient::new(&config.ai);
            let written = client
                .synthesize_all(&doc, &output, install_ctrl_c(), |msg| log::info!("{}", msg))
                .await?;
            println!("✅ {} segments saved to {}", written.len(), output.display());

            if let Some(master) = merge {
                ai::speech::merge_wavs(&written, &master)?;
                println!("   Merged into {}", master.display());
            }
            Ok(())
        }
    }
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(anyhow!(
            "{} already exists, use --force to overwrite",
            path.display()
        ));
    }
    AppConfig::create_default(path)?;
    println!("✅ Default configuration written to {}", path.display());
    Ok(())
}

fn save_script(doc: &ScriptDocument, path: &Path) -> Result<()> {
    doc.save(path)
        .with_context(|| format!("Failed to save script to {}", path.display()))?;
    for warning in doc.validate() {
        log::warn!("{}", warning);
    }
    println!(
        "📝 Script \"{}\" saved to {} ({} narration lines, {} scenes)",
        doc.topic_or_default(),
        path.display(),
        doc.audio_script.len(),
        doc.visual_script.len()
    );
    Ok(())
}

fn print_chunk(chunk: &str) {
    print!("{}", chunk);
    let _ = std::io::stdout().flush();
}

fn prompt_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
