//! Error taxonomy for conversion jobs.
//!
//! Every failure is local to one job: the caller can retry with a fresh
//! job, and selector state is never touched by a failed render.

use std::path::PathBuf;

use thiserror::Error;

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Error)]
pub enum JobError {
    /// The input failed type/extension validation. No job is created.
    #[error("invalid file '{path}': {reason}")]
    InvalidFile { path: PathBuf, reason: String },

    /// Source metadata could not be obtained; the job aborts before any
    /// frame is rendered.
    #[error("failed to load source '{path}': {reason}")]
    SourceLoad { path: PathBuf, reason: String },

    /// The crop region degenerated to zero area. The selector enforces a
    /// minimum size, so this is an invariant check rather than a normal
    /// error path.
    #[error("crop region degenerates to {width_px:.2}x{height_px:.2} px")]
    InvalidRegion { width_px: f64, height_px: f64 },

    /// A per-frame decode/compose/write step failed. Remaining steps are
    /// abandoned and no partial artifact is exposed.
    #[error("render failed: {0}")]
    Render(String),

    /// Finalizing the encoded artifact failed, distinct from a render
    /// failure so the user sees a download-stage message.
    #[error("export failed: {0}")]
    Export(String),
}

impl JobError {
    pub fn invalid_file(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn source_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::SourceLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn render(reason: impl Into<String>) -> Self {
        Self::Render(reason.into())
    }

    pub fn export(reason: impl Into<String>) -> Self {
        Self::Export(reason.into())
    }
}
