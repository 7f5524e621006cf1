//! Conversion job lifecycle and the frame loop.
//!
//! A job snapshots its crop region and settings at creation; adjustments
//! made afterwards never affect a job already running. Exactly one job
//! runs per call to [`run`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::compose::FrameComposer;
use crate::crop::CropRegion;
use crate::error::{JobError, JobResult};
use crate::geometry;
use crate::settings::{ConversionSettings, OutputFormat};

/// Longest source accepted for conversion.
pub const MAX_DURATION_SECONDS: f64 = 4.0 * 60.0 * 60.0;

/// Supplies decoded RGBA frames at the job's frame rate.
pub trait FrameSource {
    fn dimensions(&self) -> (u32, u32);
    fn duration_seconds(&self) -> f64;
    /// The next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Option<Vec<u8>>;
}

/// Receives composed frames and finalizes them into an artifact.
pub trait FrameSink {
    fn write_frame(&mut self, rgba_frame: Vec<u8>) -> anyhow::Result<()>;
    /// Flushes and finalizes the artifact.
    fn finish(self: Box<Self>) -> anyhow::Result<OutputArtifact>;
    /// Discards any partial output. Must not surface an artifact.
    fn abort(self: Box<Self>);
}

/// The finalized output of a completed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArtifact {
    pub path: PathBuf,
    pub format: OutputFormat,
    pub byte_len: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Rendering,
    Completed,
    /// Cancelled mid-render. Terminal, but not a failure.
    Abandoned,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Rendering => "rendering",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned | Self::Failed)
    }
}

/// One conversion job with its snapshotted inputs and live status.
#[derive(Debug, Clone)]
pub struct RenderJob {
    id: Uuid,
    pub crop: CropRegion,
    pub settings: ConversionSettings,
    status: JobStatus,
    progress: u8,
    started_at: DateTime<Utc>,
    error_message: Option<String>,
}

impl RenderJob {
    pub fn new(crop: CropRegion, settings: ConversionSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            crop,
            settings,
            status: JobStatus::Queued,
            progress: 0,
            started_at: Utc::now(),
            error_message: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn set_progress(&mut self, progress: u8) {
        self.progress = progress.min(100);
    }

    fn complete(&mut self) {
        self.status = JobStatus::Completed;
        self.progress = 100;
    }

    fn abandon(&mut self) {
        self.status = JobStatus::Abandoned;
    }

    fn fail(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error_message = Some(message.into());
    }
}

/// Cooperative cancellation handle, cloneable across threads.
///
/// Cancelling is idempotent, and cancelling a job that already reached a
/// terminal state has no effect on it.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a run ended when it did not fail.
#[derive(Debug)]
pub enum JobOutcome {
    Completed(OutputArtifact),
    /// The job was cancelled mid-render; partial output was discarded.
    Abandoned,
}

/// Drives one job from its source through composition into the sink.
///
/// Progress is reported as whole percentages, monotonically, ending at
/// exactly 100 on completion. On any error the job is marked failed, the
/// sink is aborted and no artifact is surfaced.
pub fn run<S, F>(
    job: &mut RenderJob,
    source: &mut S,
    sink: Box<dyn FrameSink>,
    target_width: u32,
    target_height: u32,
    cancel: &CancelFlag,
    mut on_progress: F,
) -> JobResult<JobOutcome>
where
    S: FrameSource + ?Sized,
    F: FnMut(u8),
{
    job.status = JobStatus::Rendering;

    let duration = source.duration_seconds();
    if duration > MAX_DURATION_SECONDS {
        let error = JobError::render(format!(
            "source duration {duration:.0}s exceeds the {MAX_DURATION_SECONDS:.0}s limit"
        ));
        job.fail(error.to_string());
        sink.abort();
        return Err(error);
    }

    let (source_width, source_height) = source.dimensions();
    let effective_crop = if job.settings.auto_crop {
        job.crop
    } else {
        CropRegion::full_frame()
    };
    let params = match geometry::compute_draw_params(
        &effective_crop,
        source_width,
        source_height,
        target_width,
        target_height,
    ) {
        Ok(params) => params,
        Err(error) => {
            job.fail(error.to_string());
            sink.abort();
            return Err(error);
        }
    };
    let composer = match FrameComposer::new(
        source_width,
        source_height,
        target_width,
        target_height,
        &params,
    ) {
        Ok(composer) => composer,
        Err(error) => {
            let error = JobError::render(error.to_string());
            job.fail(error.to_string());
            sink.abort();
            return Err(error);
        }
    };

    // A zero-duration source still renders one frame.
    let total_steps = (duration * f64::from(job.settings.fps)).ceil().max(1.0) as u64;
    info!(
        "job {} rendering {total_steps} frames at {} fps",
        job.id, job.settings.fps
    );

    let mut sink = sink;
    let mut step: u64 = 0;
    while step < total_steps {
        if cancel.is_cancelled() {
            info!("job {} cancelled after {step}/{total_steps} frames", job.id);
            job.abandon();
            sink.abort();
            return Ok(JobOutcome::Abandoned);
        }

        let Some(frame) = source.next_frame() else {
            // The duration estimate overshot the actual frame count.
            debug!(
                "job {} source ended early at {step}/{total_steps} frames",
                job.id
            );
            break;
        };

        let composed = match composer.compose(frame) {
            Ok(composed) => composed,
            Err(error) => {
                let error = JobError::render(error.to_string());
                job.fail(error.to_string());
                sink.abort();
                return Err(error);
            }
        };
        if let Err(error) = sink.write_frame(composed) {
            let error = JobError::render(error.to_string());
            job.fail(error.to_string());
            sink.abort();
            return Err(error);
        }

        step += 1;
        let percent = ((step as f64 / total_steps as f64) * 100.0).round() as u8;
        if percent > job.progress() {
            job.set_progress(percent);
            on_progress(percent);
        }
    }

    if step == 0 {
        warn!("job {} source produced no frames", job.id);
        let error = JobError::render("source produced no frames");
        job.fail(error.to_string());
        sink.abort();
        return Err(error);
    }

    let artifact = match sink.finish() {
        Ok(artifact) => artifact,
        Err(error) => {
            let error = JobError::export(error.to_string());
            job.fail(error.to_string());
            return Err(error);
        }
    };

    let final_already_emitted = job.progress() == 100;
    job.complete();
    if !final_already_emitted {
        on_progress(100);
    }
    info!(
        "job {} completed, wrote {} ({} bytes)",
        job.id,
        artifact.path.display(),
        artifact.byte_len
    );
    Ok(JobOutcome::Completed(artifact))
}
