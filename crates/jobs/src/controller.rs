use crossbeam_channel::{unbounded, Receiver, Sender};
use media_io::{
    mux_args, parse_chunk, ChildProcess, ChunkRead, DurationProbe, FfmpegTools, ProcessExit,
    ProcessHandle,
};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::progress::{ProgressSample, ProgressTracker};
use crate::{FailureReason, JobEvent, JobId, JobOutcome, JobState, LaunchError, MuxRequest};

const DEFAULT_DIAGNOSTIC_TAIL: usize = 64 * 1024;

struct ActiveJob {
    id: JobId,
    request: MuxRequest,
    tracker: ProgressTracker,
    diagnostics: String,
}

/// Runs one mux at a time and reports progress and the final outcome to
/// subscribers.
///
/// The controller never blocks on the child: the owner calls [`poll`]
/// periodically (a UI timer, or a sleep loop in a headless caller). Only the
/// duration probe in [`launch`] runs synchronously.
///
/// [`poll`]: MuxJobController::poll
/// [`launch`]: MuxJobController::launch
pub struct MuxJobController<P: ProcessHandle = ChildProcess> {
    ffmpeg: PathBuf,
    probe: Box<dyn DurationProbe + Send>,
    process: P,
    state: JobState,
    job: Option<ActiveJob>,
    listeners: Vec<Sender<JobEvent>>,
    diagnostic_tail: usize,
}

impl MuxJobController<ChildProcess> {
    pub fn from_tools(tools: &FfmpegTools) -> Self {
        Self::new(
            tools.ffmpeg.clone(),
            tools.duration_probe(),
            ChildProcess::new(),
        )
    }
}

impl<P: ProcessHandle> MuxJobController<P> {
    pub fn new(
        ffmpeg: impl Into<PathBuf>,
        probe: impl DurationProbe + Send + 'static,
        process: P,
    ) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            probe: Box::new(probe),
            process,
            state: JobState::Idle,
            job: None,
            listeners: Vec::new(),
            diagnostic_tail: DEFAULT_DIAGNOSTIC_TAIL,
        }
    }

    /// Bytes of tool output kept for the failure report.
    pub fn with_diagnostic_tail(mut self, bytes: usize) -> Self {
        self.diagnostic_tail = bytes;
        self
    }

    pub fn subscribe(&mut self) -> Receiver<JobEvent> {
        let (tx, rx) = unbounded();
        self.listeners.push(tx);
        rx
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn job_id(&self) -> Option<JobId> {
        self.job.as_ref().map(|j| j.id)
    }

    pub fn progress(&self) -> Option<ProgressSample> {
        self.job.as_ref().map(|j| j.tracker.sample())
    }

    pub fn outcome(&self) -> Option<JobOutcome> {
        let job = self.job.as_ref()?;
        match &self.state {
            JobState::Succeeded => Some(JobOutcome::Succeeded(job.request.output.clone())),
            JobState::Failed(FailureReason::Cancelled) => Some(JobOutcome::Cancelled),
            JobState::Failed(FailureReason::ExternalTool(text)) => {
                Some(JobOutcome::Failed(text.clone()))
            }
            _ => None,
        }
    }

    /// Probe the video, then start ffmpeg. A previous terminal job is
    /// discarded first.
    pub fn launch(&mut self, request: MuxRequest) -> Result<JobId, LaunchError> {
        if self.is_active() {
            return Err(LaunchError::Busy);
        }
        if request.output.file_name().is_none() {
            return Err(LaunchError::MissingFileName(request.output));
        }
        self.acknowledge();

        let id = Uuid::new_v4();
        self.state = JobState::Probing;
        info!(%id, video = ?request.video, audio = ?request.audio, output = ?request.output, "mux job created");

        let duration = self.probe.probe(&request.video);
        if duration > 0.0 {
            debug!(%id, "video duration {duration:.3}s");
        } else {
            warn!(%id, "could not determine video duration; progress will be estimated");
        }

        let args = mux_args(&request.video, &request.audio, &request.output);
        self.job = Some(ActiveJob {
            id,
            request,
            tracker: ProgressTracker::new(duration),
            diagnostics: String::new(),
        });

        match self.process.start(&self.ffmpeg, &args) {
            Ok(()) => {
                self.state = JobState::Running;
                info!(%id, "ffmpeg started");
                self.emit(JobEvent::Progress {
                    job_id: id,
                    percent: 0,
                });
            }
            Err(e) => {
                let text = format!("failed to start {:?}: {e}", self.ffmpeg);
                self.finish(JobState::Failed(FailureReason::ExternalTool(text)));
            }
        }
        Ok(id)
    }

    /// Consume whatever ffmpeg has written since the last call and check
    /// whether it exited. Never blocks.
    pub fn poll(&mut self) -> &JobState {
        if self.state != JobState::Running {
            return &self.state;
        }

        self.drain_output();
        match self.process.try_wait() {
            Ok(Some(exit)) => {
                // output written just before exit still precedes the outcome
                self.drain_output();
                self.complete(exit);
            }
            Ok(None) => {}
            Err(e) => {
                warn!("lost track of ffmpeg: {e}");
                let _ = self.process.kill();
                let _ = self.process.wait();
                self.finish(JobState::Failed(FailureReason::ExternalTool(e.to_string())));
            }
        }
        &self.state
    }

    /// Kill the running encoder. Returns `false` when there was nothing to
    /// cancel.
    pub fn cancel(&mut self) -> bool {
        if self.state != JobState::Running {
            return false;
        }
        self.state = JobState::Cancelling;
        info!(id = ?self.job_id(), "cancelling mux job");

        if let Err(e) = self.process.kill() {
            warn!("failed to kill ffmpeg: {e}");
        }
        match self.process.wait() {
            Ok(exit) => debug!("ffmpeg stopped with {:?}", exit.code),
            Err(e) => warn!("failed to reap ffmpeg: {e}"),
        }
        if self.process.is_running() {
            warn!("ffmpeg still running after kill");
        }
        while let ChunkRead::Data(chunk) = self.process.read_chunk() {
            if let Some(job) = self.job.as_mut() {
                push_tail(&mut job.diagnostics, &chunk, self.diagnostic_tail);
            }
        }

        self.finish(JobState::Failed(FailureReason::Cancelled));
        true
    }

    /// Return a terminal controller to `Idle`.
    pub fn acknowledge(&mut self) {
        if self.state.is_terminal() {
            self.state = JobState::Idle;
            self.job = None;
        }
    }

    fn drain_output(&mut self) {
        loop {
            match self.process.read_chunk() {
                ChunkRead::Data(chunk) => self.ingest(&chunk),
                ChunkRead::Empty | ChunkRead::Closed => break,
            }
        }
    }

    fn ingest(&mut self, chunk: &str) {
        let Some(job) = self.job.as_mut() else {
            return;
        };
        push_tail(&mut job.diagnostics, chunk, self.diagnostic_tail);
        let signal = parse_chunk(chunk);
        if let Some(sample) = job.tracker.apply(signal) {
            debug!(id = %job.id, ?signal, percent = sample.percent, "progress");
            let event = JobEvent::Progress {
                job_id: job.id,
                percent: sample.percent,
            };
            self.emit(event);
        }
    }

    fn complete(&mut self, exit: ProcessExit) {
        let Some(job) = self.job.as_mut() else {
            return;
        };
        if exit.success() {
            if let Some(sample) = job.tracker.complete() {
                let event = JobEvent::Progress {
                    job_id: job.id,
                    percent: sample.percent,
                };
                self.emit(event);
            }
            self.finish(JobState::Succeeded);
        } else {
            let mut text = job.diagnostics.trim_end().to_string();
            if text.is_empty() {
                text = match exit.code {
                    Some(code) => format!("ffmpeg exited with code {code}"),
                    None => "ffmpeg was terminated by a signal".to_string(),
                };
            }
            self.finish(JobState::Failed(FailureReason::ExternalTool(text)));
        }
    }

    fn finish(&mut self, state: JobState) {
        self.state = state;
        let (Some(outcome), Some(job_id)) = (self.outcome(), self.job_id()) else {
            return;
        };
        match &outcome {
            JobOutcome::Succeeded(path) => info!(%job_id, "mux finished: {:?}", path),
            JobOutcome::Cancelled => info!(%job_id, "mux cancelled"),
            JobOutcome::Failed(text) => warn!(%job_id, "mux failed: {}", last_line(text)),
        }
        self.emit(JobEvent::Terminal { job_id, outcome });
    }

    fn emit(&mut self, event: JobEvent) {
        self.listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl<P: ProcessHandle> Drop for MuxJobController<P> {
    fn drop(&mut self) {
        if self.state.is_active() && self.process.is_running() {
            let _ = self.process.kill();
            let _ = self.process.wait();
        }
    }
}

/// Append `chunk`, keeping at most the last `cap` bytes.
fn push_tail(buf: &mut String, chunk: &str, cap: usize) {
    buf.push_str(chunk);
    if buf.len() > cap {
        let mut cut = buf.len() - cap;
        while !buf.is_char_boundary(cut) {
            cut += 1;
        }
        buf.drain(..cut);
    }
}

fn last_line(text: &str) -> &str {
    text.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or(text)
}
