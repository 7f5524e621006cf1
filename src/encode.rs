//! H.264 encoding through an ffmpeg child process.
//!
//! Composed frames are queued over a bounded channel to a writer thread
//! that owns the ffmpeg process, so composition and encoding overlap.

use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, bail, Context, Result};
use log::debug;

use crate::geometry::{TARGET_HEIGHT, TARGET_WIDTH};
use crate::pipeline::{FrameSink, OutputArtifact};
use crate::settings::{ConversionSettings, OutputFormat, Quality};

pub struct FfmpegPipe {
    sender: Option<mpsc::SyncSender<Vec<u8>>>,
    worker: Option<JoinHandle<Result<()>>>,
    output_path: PathBuf,
    format: OutputFormat,
}

/// Resolves the ffmpeg binary to invoke.
///
/// With the `sidecar_ffmpeg` feature the bundled binary is used, downloaded
/// on first use; otherwise the system `ffmpeg` must be on PATH.
pub fn ffmpeg_executable() -> Result<PathBuf> {
    #[cfg(feature = "sidecar_ffmpeg")]
    {
        let path = ffmpeg_sidecar::paths::ffmpeg_path();
        if !path.exists() {
            ffmpeg_sidecar::download::auto_download()
                .context("failed to auto-download ffmpeg sidecar binary")?;
        }
        Ok(path)
    }
    #[cfg(not(feature = "sidecar_ffmpeg"))]
    {
        Ok(PathBuf::from("ffmpeg"))
    }
}

/// Output file name convention: `<basename>_vertical_1080x1920.<ext>`.
pub fn suggested_file_name(input: &Path, format: OutputFormat) -> String {
    let stem = input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("output");
    format!(
        "{stem}_vertical_{TARGET_WIDTH}x{TARGET_HEIGHT}.{}",
        format.extension()
    )
}

impl FfmpegPipe {
    pub fn spawn(settings: &ConversionSettings, output_path: &Path) -> Result<Self> {
        let size = format!("{TARGET_WIDTH}x{TARGET_HEIGHT}");
        let fps = settings.fps.to_string();
        let quality = settings.quality;
        let bitrate_kbps = settings.bitrate_kbps;
        let output_path = output_path.to_path_buf();
        let worker_path = output_path.clone();
        let (sender, receiver) = mpsc::sync_channel::<Vec<u8>>(4);

        let worker = thread::Builder::new()
            .name("reframe-encoder".to_owned())
            .spawn(move || {
                run_ffmpeg_process(receiver, &size, &fps, quality, bitrate_kbps, &worker_path)
            })
            .context("failed to spawn ffmpeg writer thread")?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            output_path,
            format: settings.format,
        })
    }

    fn join_worker(&mut self) -> Result<()> {
        let handle = self
            .worker
            .take()
            .ok_or_else(|| anyhow!("ffmpeg worker thread missing"))?;
        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(anyhow!("ffmpeg worker thread panicked")),
        }
    }
}

impl FrameSink for FfmpegPipe {
    fn write_frame(&mut self, rgba_frame: Vec<u8>) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| anyhow!("encoder has already been finalized"))?;
        sender
            .send(rgba_frame)
            .map_err(|_| anyhow!("failed to enqueue frame for ffmpeg"))
    }

    fn finish(mut self: Box<Self>) -> Result<OutputArtifact> {
        drop(self.sender.take());
        self.join_worker()?;

        let metadata = std::fs::metadata(&self.output_path).with_context(|| {
            format!(
                "encoded output missing at {}",
                self.output_path.display()
            )
        })?;
        Ok(OutputArtifact {
            path: self.output_path.clone(),
            format: self.format,
            byte_len: metadata.len(),
        })
    }

    fn abort(mut self: Box<Self>) {
        drop(self.sender.take());
        if self.worker.is_some() {
            let _ = self.join_worker();
        }
        // Whatever ffmpeg flushed so far is not a usable artifact.
        if self.output_path.exists() {
            debug!("removing partial output {}", self.output_path.display());
            let _ = std::fs::remove_file(&self.output_path);
        }
    }
}

fn run_ffmpeg_process(
    receiver: mpsc::Receiver<Vec<u8>>,
    size: &str,
    fps: &str,
    quality: Quality,
    bitrate_kbps: u32,
    output_path: &Path,
) -> Result<()> {
    let path_str = output_path.to_string_lossy();
    if path_str.len() > 1024 {
        bail!("Output path is suspiciously long");
    }
    if path_str.chars().any(|c| c.is_control()) {
        bail!("Output path contains invalid control characters");
    }

    let ffmpeg_path = ffmpeg_executable()?;
    let args = ffmpeg_args(size, fps, quality, bitrate_kbps, output_path);
    let mut child = Command::new(&ffmpeg_path)
        .args(args.iter().map(String::as_str))
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                anyhow!(
                    "ffmpeg executable not found (resolved_path={}). Install ffmpeg or build with `--features sidecar_ffmpeg`.",
                    ffmpeg_path.display()
                )
            } else {
                anyhow!(
                    "failed to spawn ffmpeg process (resolved_path={}, args='{}'): {error}",
                    ffmpeg_path.display(),
                    args.join(" ")
                )
            }
        })?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("failed to capture ffmpeg stdin"))?;
    let mut stderr_pipe = child.stderr.take();

    while let Ok(frame) = receiver.recv() {
        stdin
            .write_all(&frame)
            .context("failed to write frame to ffmpeg stdin")?;
    }

    stdin.flush().context("failed to flush ffmpeg stdin")?;
    drop(stdin);

    let status = child.wait().context("failed waiting for ffmpeg process")?;
    let stderr_tail = read_stderr_tail(&mut stderr_pipe)?;
    if !status.success() {
        return Err(anyhow!(
            "ffmpeg failed with status {status} (args='{}', stderr_tail='{}')",
            args.join(" "),
            stderr_tail
        ));
    }

    Ok(())
}

fn ffmpeg_args(
    size: &str,
    fps: &str,
    quality: Quality,
    bitrate_kbps: u32,
    output_path: &Path,
) -> Vec<String> {
    let mut args = ffmpeg_rawvideo_input_args(size, fps);
    args.extend(ffmpeg_h264_output_args(quality, bitrate_kbps));
    args.extend(ffmpeg_container_output_args(output_path));

    args.push(output_path.to_string_lossy().into_owned());
    args
}

pub fn ffmpeg_rawvideo_input_args(size: &str, fps: &str) -> Vec<String> {
    vec![
        "-hide_banner".to_owned(),
        "-loglevel".to_owned(),
        "error".to_owned(),
        "-y".to_owned(),
        "-f".to_owned(),
        "rawvideo".to_owned(),
        "-pix_fmt".to_owned(),
        "rgba".to_owned(),
        "-s:v".to_owned(),
        size.to_owned(),
        "-r".to_owned(),
        fps.to_owned(),
        "-i".to_owned(),
        "-".to_owned(),
        "-an".to_owned(),
    ]
}

/// Constant-quality encode with the bitrate setting as a VBV cap.
pub fn ffmpeg_h264_output_args(quality: Quality, bitrate_kbps: u32) -> Vec<String> {
    vec![
        "-c:v".to_owned(),
        "libx264".to_owned(),
        "-preset".to_owned(),
        "medium".to_owned(),
        "-crf".to_owned(),
        quality.crf().to_string(),
        "-maxrate".to_owned(),
        format!("{bitrate_kbps}k"),
        "-bufsize".to_owned(),
        format!("{}k", bitrate_kbps * 2),
        "-pix_fmt".to_owned(),
        "yuv420p".to_owned(),
    ]
}

pub fn ffmpeg_container_output_args(output_path: &Path) -> Vec<String> {
    let ext = output_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if matches!(ext.as_str(), "mp4" | "mov" | "m4v") {
        vec!["-movflags".to_owned(), "+faststart".to_owned()]
    } else {
        Vec::new()
    }
}

fn read_stderr_tail(stderr: &mut Option<std::process::ChildStderr>) -> Result<String> {
    let Some(mut pipe) = stderr.take() else {
        return Ok(String::new());
    };
    let mut buf = Vec::new();
    pipe.read_to_end(&mut buf)
        .context("failed reading ffmpeg stderr")?;
    let text = String::from_utf8_lossy(&buf).to_string();
    Ok(last_n_chars(&text, 500))
}

fn last_n_chars(s: &str, max_chars: usize) -> String {
    let mut chars = s.chars().collect::<Vec<_>>();
    if chars.len() > max_chars {
        chars = chars[chars.len().saturating_sub(max_chars)..].to_vec();
    }
    chars.into_iter().collect::<String>().trim().to_owned()
}
