use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use reframe::crop::CropRegion;
use reframe::error::JobError;
use reframe::pipeline::{
    self, CancelFlag, FrameSink, FrameSource, JobOutcome, JobStatus, OutputArtifact, RenderJob,
};
use reframe::settings::{ConversionSettings, OutputFormat};

const WIDTH: u32 = 16;
const HEIGHT: u32 = 9;
const TARGET_W: u32 = 9;
const TARGET_H: u32 = 16;

struct FakeSource {
    duration_seconds: f64,
    frames_remaining: u64,
}

impl FakeSource {
    fn with_frames(duration_seconds: f64, frames: u64) -> Self {
        Self {
            duration_seconds,
            frames_remaining: frames,
        }
    }
}

impl FrameSource for FakeSource {
    fn dimensions(&self) -> (u32, u32) {
        (WIDTH, HEIGHT)
    }

    fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    fn next_frame(&mut self) -> Option<Vec<u8>> {
        if self.frames_remaining == 0 {
            return None;
        }
        self.frames_remaining -= 1;
        Some(vec![128u8; (WIDTH * HEIGHT * 4) as usize])
    }
}

#[derive(Clone, Default)]
struct SinkLog {
    frames_written: Arc<Mutex<u64>>,
    finished: Arc<AtomicBool>,
    aborted: Arc<AtomicBool>,
}

struct FakeSink {
    log: SinkLog,
    fail_on_write: bool,
    fail_on_finish: bool,
}

impl FakeSink {
    fn new(log: SinkLog) -> Self {
        Self {
            log,
            fail_on_write: false,
            fail_on_finish: false,
        }
    }
}

impl FrameSink for FakeSink {
    fn write_frame(&mut self, _rgba_frame: Vec<u8>) -> anyhow::Result<()> {
        if self.fail_on_write {
            anyhow::bail!("disk full");
        }
        *self.log.frames_written.lock().unwrap() += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> anyhow::Result<OutputArtifact> {
        if self.fail_on_finish {
            anyhow::bail!("mux failed");
        }
        self.log.finished.store(true, Ordering::SeqCst);
        Ok(OutputArtifact {
            path: PathBuf::from("out.mp4"),
            format: OutputFormat::Mp4,
            byte_len: *self.log.frames_written.lock().unwrap(),
        })
    }

    fn abort(self: Box<Self>) {
        self.log.aborted.store(true, Ordering::SeqCst);
    }
}

fn default_job() -> RenderJob {
    RenderJob::new(CropRegion::full_frame(), ConversionSettings::default())
}

#[test]
fn progress_is_monotonic_and_ends_at_one_hundred() {
    // 10 seconds at 30 fps is 300 frames.
    let mut source = FakeSource::with_frames(10.0, 300);
    let log = SinkLog::default();
    let mut job = default_job();
    let cancel = CancelFlag::new();
    let reported = Arc::new(Mutex::new(Vec::new()));
    let reported_clone = Arc::clone(&reported);

    let outcome = pipeline::run(
        &mut job,
        &mut source,
        Box::new(FakeSink::new(log.clone())),
        TARGET_W,
        TARGET_H,
        &cancel,
        move |percent| reported_clone.lock().unwrap().push(percent),
    )
    .expect("run should succeed");

    assert!(matches!(outcome, JobOutcome::Completed(_)));
    assert_eq!(job.status(), JobStatus::Completed);
    assert_eq!(job.progress(), 100);
    assert_eq!(*log.frames_written.lock().unwrap(), 300);
    assert!(log.finished.load(Ordering::SeqCst));

    let reported = reported.lock().unwrap();
    assert_eq!(*reported.last().expect("progress should be reported"), 100);
    assert!(reported.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn zero_duration_source_renders_one_frame() {
    let mut source = FakeSource::with_frames(0.0, 5);
    let log = SinkLog::default();
    let mut job = default_job();

    let outcome = pipeline::run(
        &mut job,
        &mut source,
        Box::new(FakeSink::new(log.clone())),
        TARGET_W,
        TARGET_H,
        &CancelFlag::new(),
        |_| {},
    )
    .expect("run should succeed");

    assert!(matches!(outcome, JobOutcome::Completed(_)));
    assert_eq!(*log.frames_written.lock().unwrap(), 1);
}

#[test]
fn early_source_end_still_completes() {
    // Duration says 300 frames but the source only has 200.
    let mut source = FakeSource::with_frames(10.0, 200);
    let log = SinkLog::default();
    let mut job = default_job();

    let outcome = pipeline::run(
        &mut job,
        &mut source,
        Box::new(FakeSink::new(log.clone())),
        TARGET_W,
        TARGET_H,
        &CancelFlag::new(),
        |_| {},
    )
    .expect("run should succeed");

    assert!(matches!(outcome, JobOutcome::Completed(_)));
    assert_eq!(job.progress(), 100);
    assert_eq!(*log.frames_written.lock().unwrap(), 200);
}

#[test]
fn cancellation_abandons_the_job_and_aborts_the_sink() {
    let mut source = FakeSource::with_frames(10.0, 300);
    let log = SinkLog::default();
    let mut job = default_job();
    let cancel = CancelFlag::new();
    cancel.cancel();
    // A second cancel must be harmless.
    cancel.cancel();

    let outcome = pipeline::run(
        &mut job,
        &mut source,
        Box::new(FakeSink::new(log.clone())),
        TARGET_W,
        TARGET_H,
        &cancel,
        |_| panic!("no progress should be reported after cancellation"),
    )
    .expect("cancellation is not an error");

    assert!(matches!(outcome, JobOutcome::Abandoned));
    assert!(job.is_terminal());
    // An abandoned job is terminal but is not reported as a failure.
    assert_eq!(job.status(), JobStatus::Abandoned);
    assert_ne!(job.status(), JobStatus::Failed);
    assert!(job.error_message().is_none());
    assert_eq!(*log.frames_written.lock().unwrap(), 0);
    assert!(log.aborted.load(Ordering::SeqCst));
    assert!(!log.finished.load(Ordering::SeqCst));
}

#[test]
fn cancelling_after_completion_leaves_the_job_completed() {
    let mut source = FakeSource::with_frames(1.0, 30);
    let log = SinkLog::default();
    let mut job = default_job();
    let cancel = CancelFlag::new();

    pipeline::run(
        &mut job,
        &mut source,
        Box::new(FakeSink::new(log)),
        TARGET_W,
        TARGET_H,
        &cancel,
        |_| {},
    )
    .expect("run should succeed");
    assert_eq!(job.status(), JobStatus::Completed);

    cancel.cancel();
    assert_eq!(job.status(), JobStatus::Completed);
    assert_eq!(job.progress(), 100);
}

#[test]
fn write_failure_fails_the_job_and_aborts() {
    let mut source = FakeSource::with_frames(1.0, 30);
    let log = SinkLog::default();
    let mut sink = FakeSink::new(log.clone());
    sink.fail_on_write = true;
    let mut job = default_job();

    let error = pipeline::run(
        &mut job,
        &mut source,
        Box::new(sink),
        TARGET_W,
        TARGET_H,
        &CancelFlag::new(),
        |_| {},
    )
    .expect_err("write failure should fail the job");

    assert!(matches!(error, JobError::Render(_)));
    assert_eq!(job.status(), JobStatus::Failed);
    assert!(job.error_message().is_some());
    assert!(log.aborted.load(Ordering::SeqCst));
}

#[test]
fn finish_failure_surfaces_as_export_error() {
    let mut source = FakeSource::with_frames(1.0, 30);
    let log = SinkLog::default();
    let mut sink = FakeSink::new(log);
    sink.fail_on_finish = true;
    let mut job = default_job();

    let error = pipeline::run(
        &mut job,
        &mut source,
        Box::new(sink),
        TARGET_W,
        TARGET_H,
        &CancelFlag::new(),
        |_| {},
    )
    .expect_err("finish failure should fail the job");

    assert!(matches!(error, JobError::Export(_)));
    assert_eq!(job.status(), JobStatus::Failed);
}

#[test]
fn over_length_source_is_rejected_before_any_frame() {
    let mut source = FakeSource::with_frames(5.0 * 60.0 * 60.0, 10);
    let log = SinkLog::default();
    let mut job = default_job();

    let error = pipeline::run(
        &mut job,
        &mut source,
        Box::new(FakeSink::new(log.clone())),
        TARGET_W,
        TARGET_H,
        &CancelFlag::new(),
        |_| {},
    )
    .expect_err("over-length source should be rejected");

    assert!(matches!(error, JobError::Render(_)));
    assert_eq!(*log.frames_written.lock().unwrap(), 0);
    assert!(log.aborted.load(Ordering::SeqCst));
}

#[test]
fn auto_crop_disabled_ignores_the_selected_region() {
    // A crop that would be invalid in pixels is irrelevant once auto_crop
    // is off; the full frame is used instead.
    let mut settings = ConversionSettings::default();
    settings.auto_crop = false;
    let mut job = RenderJob::new(CropRegion::new(40.0, 40.0, 20.0, 20.0), settings);
    let mut source = FakeSource::with_frames(1.0, 30);
    let log = SinkLog::default();

    let outcome = pipeline::run(
        &mut job,
        &mut source,
        Box::new(FakeSink::new(log.clone())),
        TARGET_W,
        TARGET_H,
        &CancelFlag::new(),
        |_| {},
    )
    .expect("run should succeed");

    assert!(matches!(outcome, JobOutcome::Completed(_)));
    assert_eq!(*log.frames_written.lock().unwrap(), 30);
}

#[test]
fn empty_source_fails_the_job() {
    let mut source = FakeSource::with_frames(1.0, 0);
    let log = SinkLog::default();
    let mut job = default_job();

    let error = pipeline::run(
        &mut job,
        &mut source,
        Box::new(FakeSink::new(log.clone())),
        TARGET_W,
        TARGET_H,
        &CancelFlag::new(),
        |_| {},
    )
    .expect_err("empty source should fail");

    assert!(matches!(error, JobError::Render(_)));
    assert!(log.aborted.load(Ordering::SeqCst));
}
