//! Source media validation, probing and frame decoding.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::error::{JobError, JobResult};
use crate::pipeline::FrameSource;

/// Extensions accepted by input validation, lowercase.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "mkv", "wmv", "flv", "webm", "m4v", "3gp", "ogv", "ts", "mts", "m2ts",
];

/// Rejects inputs whose extension is not on the allowlist.
///
/// Runs before any filesystem or probe access so an unsupported type never
/// creates a job.
pub fn validate_input_path(path: &Path) -> JobResult<()> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if extension.is_empty() {
        return Err(JobError::invalid_file(path, "missing file extension"));
    }
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(JobError::invalid_file(
            path,
            format!(
                "unsupported extension '{extension}' (supported: {})",
                SUPPORTED_EXTENSIONS.join(", ")
            ),
        ));
    }
    Ok(())
}

/// Metadata for a probed source file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMedia {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub duration_seconds: f64,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

impl SourceMedia {
    /// Runs ffprobe against the file and extracts the first video stream's
    /// dimensions and the container duration.
    pub fn probe(path: &Path) -> JobResult<Self> {
        validate_input_path(path)?;
        if !path.is_file() {
            return Err(JobError::source_load(path, "file does not exist"));
        }

        let output = Command::new("ffprobe")
            .arg("-v")
            .arg("quiet")
            .arg("-print_format")
            .arg("json")
            .arg("-show_format")
            .arg("-show_streams")
            .arg(path)
            .output()
            .map_err(|error| {
                JobError::source_load(path, format!("failed to run ffprobe: {error}"))
            })?;
        if !output.status.success() {
            return Err(JobError::source_load(
                path,
                format!("ffprobe exited with status {}", output.status),
            ));
        }

        let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout).map_err(|error| {
            JobError::source_load(path, format!("unreadable ffprobe output: {error}"))
        })?;
        let video = parsed
            .streams
            .iter()
            .find(|stream| stream.codec_type.as_deref() == Some("video"))
            .ok_or_else(|| JobError::source_load(path, "no video stream found"))?;
        let (Some(width), Some(height)) = (video.width, video.height) else {
            return Err(JobError::source_load(path, "video stream has no dimensions"));
        };
        if width == 0 || height == 0 {
            return Err(JobError::source_load(path, "video stream has zero dimensions"));
        }

        // Stream duration is more precise when present; the container
        // duration is the fallback.
        let duration_seconds = parse_duration(video.duration.as_deref())
            .or_else(|| parse_duration(parsed.format.and_then(|f| f.duration).as_deref()))
            .unwrap_or(0.0);

        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
            duration_seconds,
        })
    }
}

fn parse_duration(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
}

/// Streams decoded RGBA frames from an ffmpeg child process.
///
/// Frames come out at the source's native size, resampled to the job's
/// frame rate, so the composer sees exactly the frames the encoder will
/// receive.
pub struct FrameReader {
    media: SourceMedia,
    receiver: mpsc::Receiver<Vec<u8>>,
    worker: Option<JoinHandle<Result<()>>>,
    child: Child,
}

impl FrameReader {
    pub fn spawn(media: SourceMedia, fps: u32) -> Result<Self> {
        let frame_size = (media.width * media.height * 4) as usize;
        let (sender, receiver) = mpsc::sync_channel::<Vec<u8>>(4);

        let mut child = Command::new(crate::encode::ffmpeg_executable()?)
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(&media.path)
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("rgba")
            .arg("-vf")
            .arg(format!("fps={fps}"))
            .arg("-")
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .context("failed to spawn ffmpeg decoder")?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("failed to capture ffmpeg stdout"))?;

        let worker = thread::Builder::new()
            .name("reframe-decoder".to_owned())
            .spawn(move || {
                loop {
                    let mut buffer = vec![0u8; frame_size];
                    match stdout.read_exact(&mut buffer) {
                        Ok(_) => {
                            if sender.send(buffer).is_err() {
                                break;
                            }
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                        Err(e) => return Err(anyhow!("failed to read from ffmpeg: {e}")),
                    }
                }
                Ok(())
            })
            .context("failed to spawn ffmpeg reader thread")?;

        Ok(Self {
            media,
            receiver,
            worker: Some(worker),
            child,
        })
    }

    pub fn finish(mut self) -> Result<()> {
        let _ = self.child.kill();
        let _ = self.child.wait();

        if let Some(handle) = self.worker.take() {
            match handle.join() {
                Ok(result) => result,
                Err(_) => Err(anyhow!("ffmpeg reader thread panicked")),
            }
        } else {
            Ok(())
        }
    }
}

impl FrameSource for FrameReader {
    fn dimensions(&self) -> (u32, u32) {
        (self.media.width, self.media.height)
    }

    fn duration_seconds(&self) -> f64 {
        self.media.duration_seconds
    }

    fn next_frame(&mut self) -> Option<Vec<u8>> {
        self.receiver.recv().ok()
    }
}

impl Drop for FrameReader {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}
