//! Media asset discovery and alignment for ForgeTube
//! Finds images and narration audio on disk and pairs them into clips

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AlignError;
use crate::types::ClipPlan;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav"];

/// How images are matched with audio clips
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AlignMode {
    /// Pair the n-th image with the n-th audio file; counts must match
    Position,
    /// Pair files sharing a file stem, e.g. `03.png` with `03.wav`
    Stem,
}

/// List the files in `folder` whose extension is in `extensions`
/// (case-insensitive), sorted by file name.
pub fn list_files(folder: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(folder)
        .with_context(|| format!("Failed to read folder: {}", folder.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false);
        if matches {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// First stem carried by more than one file, e.g. `01.mp3` and `01.wav`
fn duplicate_stem(files: &[PathBuf]) -> Option<String> {
    let mut seen = HashSet::new();
    files.iter().map(|f| stem_of(f)).find(|stem| !seen.insert(stem.clone()))
}

/// Pair images with audio files
pub fn align(
    images: &[PathBuf],
    audio: &[PathBuf],
    mode: AlignMode,
) -> std::result::Result<Vec<(PathBuf, PathBuf)>, AlignError> {
    if images.is_empty() {
        return Err(AlignError::NoImages);
    }
    if audio.is_empty() {
        return Err(AlignError::NoAudio);
    }

    match mode {
        AlignMode::Position => {
            if images.len() != audio.len() {
                return Err(AlignError::CountMismatch {
                    images: images.len(),
                    audio: audio.len(),
                });
            }
            Ok(images.iter().cloned().zip(audio.iter().cloned()).collect())
        }
        AlignMode::Stem => {
            if let Some(stem) = duplicate_stem(images).or_else(|| duplicate_stem(audio)) {
                return Err(AlignError::DuplicateStem(stem));
            }
            let mut by_stem: HashMap<String, &PathBuf> =
                audio.iter().map(|a| (stem_of(a), a)).collect();

            let mut pairs = Vec::with_capacity(images.len());
            for image in images {
                let stem = stem_of(image);
                match by_stem.remove(&stem) {
                    Some(a) => pairs.push((image.clone(), a.clone())),
                    None => return Err(AlignError::UnmatchedImage(stem)),
                }
            }

            // Anything left over has no image; report the first in sort order
            if let Some(left) = audio.iter().find(|a| by_stem.contains_key(&stem_of(a))) {
                return Err(AlignError::UnmatchedAudio(stem_of(left)));
            }
            Ok(pairs)
        }
    }
}

/// Turn aligned pairs into clip plans. `probe` returns an audio duration in
/// seconds; narration, when given, must have one line per clip.
pub fn plan_clips<F>(
    pairs: Vec<(PathBuf, PathBuf)>,
    narration: Option<&[String]>,
    mut probe: F,
) -> Result<Vec<ClipPlan>>
where
    F: FnMut(&Path) -> Result<f64>,
{
    if let Some(lines) = narration {
        if lines.len() != pairs.len() {
            return Err(AlignError::NarrationMismatch {
                narration: lines.len(),
                clips: pairs.len(),
            }
            .into());
        }
    }

    let mut plans = Vec::with_capacity(pairs.len());
    for (i, (image, audio)) in pairs.into_iter().enumerate() {
        let duration = probe(&audio)
            .with_context(|| format!("Failed to read duration of {}", audio.display()))?;
        plans.push(ClipPlan {
            image,
            audio,
            duration,
            narration: narration.map(|lines| lines[i].clone()),
        });
    }
    Ok(plans)
}

/// Duration of a WAV file from its header
pub fn wav_duration(path: &Path) -> Result<f64> {
    let reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;
    let spec = reader.spec();
    Ok(reader.duration() as f64 / spec.sample_rate as f64)
}

/// Duration of any audio file: WAV headers are read directly, everything
/// else goes through ffprobe.
pub fn audio_duration(path: &Path) -> Result<f64> {
    let is_wav = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("wav"))
        .unwrap_or(false);

    if is_wav {
        if let Ok(d) = wav_duration(path) {
            return Ok(d);
        }
        log::debug!("hound could not read {}, falling back to ffprobe", path.display());
    }
    crate::video::get_media_duration(path)
}

/// Output frame size. A fixed size wins; otherwise the largest image width
/// and height are used so no image is downscaled. Dimensions are rounded up
/// to even numbers for yuv420p encoding.
pub fn canvas_size(images: &[PathBuf], fixed: Option<(u32, u32)>) -> Result<(u32, u32)> {
    let (w, h) = match fixed {
        Some(size) => size,
        None => {
            let mut max = (0u32, 0u32);
            for image in images {
                let (w, h) = image::image_dimensions(image)
                    .with_context(|| format!("Failed to read image size: {}", image.display()))?;
                max = (max.0.max(w), max.1.max(h));
            }
            max
        }
    };
    Ok((round_even(w.max(2)), round_even(h.max(2))))
}

fn round_even(n: u32) -> u32 {
    n + (n % 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("forgetube_media_{}", name));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"x").unwrap();
        path
    }

    fn names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_list_files_sorted_and_filtered() {
        let dir = temp_dir("list");
        touch(&dir, "10.png");
        touch(&dir, "02.JPG");
        touch(&dir, "01.jpg");
        touch(&dir, "notes.txt");
        touch(&dir, "03.wav");
        fs::create_dir_all(dir.join("nested.png")).unwrap();

        let files = list_files(&dir, IMAGE_EXTENSIONS).unwrap();
        assert_eq!(names(&files), vec!["01.jpg", "02.JPG", "10.png"]);

        let audio = list_files(&dir, AUDIO_EXTENSIONS).unwrap();
        assert_eq!(names(&audio), vec!["03.wav"]);
    }

    #[test]
    fn test_list_files_empty_dir() {
        let dir = temp_dir("empty");
        assert!(list_files(&dir, IMAGE_EXTENSIONS).unwrap().is_empty());
    }

    #[test]
    fn test_list_files_missing_dir() {
        let dir = std::env::temp_dir().join("forgetube_media_does_not_exist");
        assert!(list_files(&dir, IMAGE_EXTENSIONS).is_err());
    }

    #[test]
    fn test_align_by_position() {
        let images = vec![PathBuf::from("a/1.png"), PathBuf::from("a/2.png")];
        let audio = vec![PathBuf::from("b/x.wav"), PathBuf::from("b/y.wav")];
        let pairs = align(&images, &audio, AlignMode::Position).unwrap();
        assert_eq!(pairs[1], (PathBuf::from("a/2.png"), PathBuf::from("b/y.wav")));

        assert_eq!(
            align(&images, &audio[..1], AlignMode::Position),
            Err(AlignError::CountMismatch { images: 2, audio: 1 })
        );
        assert_eq!(align(&[], &audio, AlignMode::Position), Err(AlignError::NoImages));
        assert_eq!(align(&images, &[], AlignMode::Position), Err(AlignError::NoAudio));
    }

    #[test]
    fn test_align_by_stem() {
        let images = vec![PathBuf::from("i/01.png"), PathBuf::from("i/02.jpg")];
        let audio = vec![PathBuf::from("a/02.mp3"), PathBuf::from("a/01.wav")];
        let pairs = align(&images, &audio, AlignMode::Stem).unwrap();
        assert_eq!(pairs[0].1, PathBuf::from("a/01.wav"));
        assert_eq!(pairs[1].1, PathBuf::from("a/02.mp3"));

        let extra_audio = vec![
            PathBuf::from("a/01.wav"),
            PathBuf::from("a/02.wav"),
            PathBuf::from("a/03.wav"),
        ];
        assert_eq!(
            align(&images, &extra_audio, AlignMode::Stem),
            Err(AlignError::UnmatchedAudio("03".to_string()))
        );

        let same_stem_audio = vec![PathBuf::from("a/01.mp3"), PathBuf::from("a/01.wav")];
        assert_eq!(
            align(&images[..1], &same_stem_audio, AlignMode::Stem),
            Err(AlignError::DuplicateStem("01".to_string()))
        );
        let same_stem_images = vec![PathBuf::from("i/02.jpg"), PathBuf::from("i/02.png")];
        assert_eq!(
            align(&same_stem_images, &audio, AlignMode::Stem),
            Err(AlignError::DuplicateStem("02".to_string()))
        );

        let short_audio = vec![PathBuf::from("a/01.wav")];
        assert_eq!(
            align(&images, &short_audio, AlignMode::Stem),
            Err(AlignError::UnmatchedImage("02".to_string()))
        );
    }

    #[test]
    fn test_plan_clips_with_narration() {
        let pairs = vec![
            (PathBuf::from("1.png"), PathBuf::from("1.wav")),
            (PathBuf::from("2.png"), PathBuf::from("2.wav")),
        ];
        let lines = vec!["first".to_string(), "second".to_string()];
        let plans = plan_clips(pairs.clone(), Some(lines.as_slice()), |p| {
            Ok(if p.ends_with("1.wav") { 2.5 } else { 4.0 })
        })
        .unwrap();
        assert_eq!(plans[0].duration, 2.5);
        assert_eq!(plans[1].narration.as_deref(), Some("second"));

        let err = plan_clips(pairs, Some(&lines[..1]), |_| Ok(1.0)).unwrap_err();
        assert_eq!(
            err.downcast_ref::<AlignError>(),
            Some(&AlignError::NarrationMismatch { narration: 1, clips: 2 })
        );
    }

    #[test]
    fn test_wav_duration() {
        let dir = temp_dir("wav");
        let path = dir.join("tone.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        // 1.5 seconds of stereo silence
        for _ in 0..(8000 * 3 / 2) {
            writer.write_sample(0i16).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        assert!((wav_duration(&path).unwrap() - 1.5).abs() < 1e-9);
        assert!((audio_duration(&path).unwrap() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_canvas_size() {
        assert_eq!(canvas_size(&[], Some((1280, 720))).unwrap(), (1280, 720));
        assert_eq!(canvas_size(&[], Some((1279, 719))).unwrap(), (1280, 720));

        let dir = temp_dir("canvas");
        let wide = dir.join("wide.png");
        let tall = dir.join("tall.png");
        image::RgbImage::new(301, 100).save(&wide).unwrap();
        image::RgbImage::new(120, 250).save(&tall).unwrap();
        assert_eq!(canvas_size(&[wide, tall], None).unwrap(), (302, 250));
    }
}
