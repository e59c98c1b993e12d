/// End-to-end scenarios for the mux controller, driven by a scripted process.
use jobs::*;
use media_io::{ChunkRead, DurationProbe, ProcessExit, ProcessHandle};
use session::{MuxerConfig, Provenance, Session};
use std::collections::VecDeque;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct FakeState {
    launches: Vec<(PathBuf, Vec<OsString>)>,
    pending: VecDeque<String>,
    running: bool,
    exit: Option<ProcessExit>,
    killed: bool,
    refuse_start: bool,
}

/// Stand-in for ffmpeg; the test feeds output and decides when it exits.
#[derive(Clone, Default)]
struct FakeProcess(Arc<Mutex<FakeState>>);

impl FakeProcess {
    fn emit(&self, chunk: &str) {
        self.0.lock().unwrap().pending.push_back(chunk.to_string());
    }

    fn exit_with(&self, code: i32) {
        let mut state = self.0.lock().unwrap();
        state.exit = Some(ProcessExit { code: Some(code) });
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.0.lock().unwrap()
    }
}

impl ProcessHandle for FakeProcess {
    fn start(&mut self, program: &Path, args: &[OsString]) -> io::Result<()> {
        let mut state = self.0.lock().unwrap();
        if state.refuse_start {
            return Err(io::Error::new(io::ErrorKind::NotFound, "No such file or directory"));
        }
        state.launches.push((program.to_path_buf(), args.to_vec()));
        state.running = true;
        state.exit = None;
        state.killed = false;
        Ok(())
    }

    fn read_chunk(&mut self) -> ChunkRead {
        let mut state = self.0.lock().unwrap();
        match state.pending.pop_front() {
            Some(chunk) => ChunkRead::Data(chunk),
            None if state.running => ChunkRead::Empty,
            None => ChunkRead::Closed,
        }
    }

    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>> {
        let mut state = self.0.lock().unwrap();
        if state.exit.is_some() {
            state.running = false;
        }
        Ok(state.exit)
    }

    fn wait(&mut self) -> io::Result<ProcessExit> {
        let mut state = self.0.lock().unwrap();
        state.running = false;
        Ok(*state.exit.get_or_insert(ProcessExit { code: Some(0) }))
    }

    fn kill(&mut self) -> io::Result<()> {
        let mut state = self.0.lock().unwrap();
        if state.running {
            state.killed = true;
            state.running = false;
            state.exit = Some(ProcessExit { code: None });
        }
        Ok(())
    }

    fn is_running(&mut self) -> bool {
        self.0.lock().unwrap().running
    }
}

struct FixedDuration(f64);

impl DurationProbe for FixedDuration {
    fn probe(&self, _video: &Path) -> f64 {
        self.0
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    dir: PathBuf,
    request: MuxRequest,
}

fn fixture() -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().to_path_buf();
    fs::write(dir.join("clip.mp4"), b"").unwrap();
    fs::write(dir.join("mix.wav"), b"").unwrap();

    let mut session = Session::from_config(&MuxerConfig::default());
    session
        .select_video(dir.join("clip.mp4"), Provenance::Dialog)
        .unwrap();
    session
        .select_audio(dir.join("mix.wav"), Provenance::Drop)
        .unwrap();
    let request = session.mux_request().unwrap();

    Fixture {
        _dir: tmp,
        dir,
        request,
    }
}

fn controller(duration: f64) -> (MuxJobController<FakeProcess>, FakeProcess) {
    let process = FakeProcess::default();
    let controller = MuxJobController::new("ffmpeg", FixedDuration(duration), process.clone());
    (controller, process)
}

fn percents(events: &[JobEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            JobEvent::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect()
}

fn terminals(events: &[JobEvent]) -> Vec<JobOutcome> {
    events
        .iter()
        .filter_map(|e| match e {
            JobEvent::Terminal { outcome, .. } => Some(outcome.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_clip_scenario_succeeds_beside_video() {
    let fx = fixture();
    let (mut controller, process) = controller(120.0);
    let events = controller.subscribe();

    let id = controller.launch(fx.request.clone()).unwrap();
    assert_eq!(controller.state(), &JobState::Running);

    process.emit("frame= 1440 fps=480 q=-1.0 size=   10240kB time=00:01:00.00 bitrate=1398.1kbits/s speed=20x\r");
    controller.poll();
    assert_eq!(controller.progress().unwrap().percent, 50);

    process.exit_with(0);
    assert_eq!(controller.poll(), &JobState::Succeeded);

    let events: Vec<JobEvent> = events.try_iter().collect();
    assert_eq!(percents(&events), [0, 50, 100]);
    let expected = fx.dir.join("clip_mux.mp4");
    assert_eq!(terminals(&events), [JobOutcome::Succeeded(expected.clone())]);
    assert!(events.iter().all(|e| match e {
        JobEvent::Progress { job_id, .. } | JobEvent::Terminal { job_id, .. } => *job_id == id,
    }));
    assert_eq!(controller.outcome(), Some(JobOutcome::Succeeded(expected)));
}

#[test]
fn test_fixed_argument_template() {
    let fx = fixture();
    let (mut controller, process) = controller(10.0);
    controller.launch(fx.request.clone()).unwrap();

    let state = process.state();
    let (program, args) = &state.launches[0];
    assert_eq!(program, &PathBuf::from("ffmpeg"));
    let expected: Vec<OsString> = vec![
        "-y".into(),
        "-i".into(),
        fx.request.video.clone().into(),
        "-i".into(),
        fx.request.audio.clone().into(),
        "-c:v".into(),
        "copy".into(),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "1:a:0".into(),
        "-shortest".into(),
        fx.request.output.clone().into(),
    ];
    assert_eq!(args, &expected);
}

#[test]
fn test_success_reports_100_even_without_samples() {
    let fx = fixture();
    let (mut controller, process) = controller(300.0);
    let events = controller.subscribe();
    controller.launch(fx.request).unwrap();

    process.emit("time=00:00:30.00");
    process.exit_with(0);
    controller.poll();

    let events: Vec<JobEvent> = events.try_iter().collect();
    assert_eq!(percents(&events), [0, 10, 100]);
    assert_eq!(terminals(&events).len(), 1);
    assert_eq!(controller.progress().unwrap().percent, 100);
}

#[test]
fn test_unknown_duration_uses_heartbeats() {
    let fx = fixture();
    let (mut controller, process) = controller(0.0);
    let events = controller.subscribe();
    controller.launch(fx.request).unwrap();

    for _ in 0..3 {
        process.emit("frame=  120 fps= 60 q=-1.0 size=N/A time=N/A bitrate=N/A");
        controller.poll();
    }
    assert_eq!(percents(&events.try_iter().collect::<Vec<_>>()), [0, 1, 2, 3]);
}

#[test]
fn test_heartbeats_never_claim_completion() {
    let fx = fixture();
    let (mut controller, process) = controller(0.0);
    let events = controller.subscribe();
    controller.launch(fx.request).unwrap();

    for _ in 0..200 {
        process.emit("frame=1");
        controller.poll();
    }
    assert_eq!(controller.progress().unwrap().percent, HEARTBEAT_CAP);

    process.exit_with(0);
    controller.poll();
    let events: Vec<JobEvent> = events.try_iter().collect();
    let seen = percents(&events);
    let (last, before) = seen.split_last().unwrap();
    assert_eq!(*last, 100);
    assert!(before.iter().all(|p| *p <= HEARTBEAT_CAP));
    assert!(matches!(events.last(), Some(JobEvent::Terminal { .. })));
}

#[test]
fn test_progress_is_monotonic_within_bounds() {
    let fx = fixture();
    let (mut controller, process) = controller(60.0);
    let events = controller.subscribe();
    controller.launch(fx.request).unwrap();

    for t in ["00:00:10.00", "00:00:05.00", "00:00:30.50", "00:00:29.00", "00:02:00.00"] {
        process.emit(&format!("frame=1 time={t} bitrate=N/A"));
        controller.poll();
    }
    let seen = percents(&events.try_iter().collect::<Vec<_>>());
    assert_eq!(seen, [0, 16, 50, 100]);
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_nonzero_exit_surfaces_diagnostics() {
    let fx = fixture();
    let (mut controller, process) = controller(120.0);
    let events = controller.subscribe();
    controller.launch(fx.request).unwrap();

    process.emit("[mov,mp4,m4a,3gp,3g2,mj2 @ 0x0] moov atom not found\n");
    process.emit("clip.mp4: Invalid data found when processing input\n");
    process.exit_with(1);
    controller.poll();

    let expected = "[mov,mp4,m4a,3gp,3g2,mj2 @ 0x0] moov atom not found\nclip.mp4: Invalid data found when processing input";
    assert_eq!(
        controller.state(),
        &JobState::Failed(FailureReason::ExternalTool(expected.to_string()))
    );
    let events: Vec<JobEvent> = events.try_iter().collect();
    assert_eq!(terminals(&events), [JobOutcome::Failed(expected.to_string())]);
    assert_eq!(process.state().launches.len(), 1, "failures are not retried");
}

#[test]
fn test_silent_failure_reports_exit_code() {
    let fx = fixture();
    let (mut controller, process) = controller(120.0);
    controller.launch(fx.request).unwrap();
    process.exit_with(234);
    controller.poll();
    assert_eq!(
        controller.outcome(),
        Some(JobOutcome::Failed("ffmpeg exited with code 234".into()))
    );
}

#[test]
fn test_cancel_kills_running_job() {
    let fx = fixture();
    let (mut controller, mut process) = controller(120.0);
    let events = controller.subscribe();
    controller.launch(fx.request).unwrap();
    process.emit("time=00:00:12.00");
    controller.poll();

    assert!(controller.cancel());
    assert_eq!(
        controller.state(),
        &JobState::Failed(FailureReason::Cancelled)
    );
    assert!(process.state().killed);
    assert!(!process.is_running());

    let events: Vec<JobEvent> = events.try_iter().collect();
    assert_eq!(terminals(&events), [JobOutcome::Cancelled]);

    // nothing left to cancel, and polling a terminal job is inert
    assert!(!controller.cancel());
    assert_eq!(controller.poll(), &JobState::Failed(FailureReason::Cancelled));
}

#[test]
fn test_cancel_when_idle_is_a_no_op() {
    let (mut controller, process) = controller(1.0);
    assert!(!controller.cancel());
    assert_eq!(controller.state(), &JobState::Idle);
    assert!(process.state().launches.is_empty());
}

#[test]
fn test_single_job_at_a_time() {
    let fx = fixture();
    let (mut controller, process) = controller(120.0);
    controller.launch(fx.request.clone()).unwrap();
    assert_eq!(controller.launch(fx.request.clone()), Err(LaunchError::Busy));

    process.exit_with(0);
    controller.poll();
    assert!(controller.state().is_terminal());

    // a new launch from a terminal state starts fresh
    let second = controller.launch(fx.request).unwrap();
    assert_eq!(controller.state(), &JobState::Running);
    assert_eq!(controller.job_id(), Some(second));
    assert_eq!(controller.progress().unwrap().percent, 0);
    assert_eq!(process.state().launches.len(), 2);
}

#[test]
fn test_acknowledge_returns_to_idle() {
    let fx = fixture();
    let (mut controller, process) = controller(5.0);
    controller.launch(fx.request).unwrap();

    controller.acknowledge();
    assert_eq!(controller.state(), &JobState::Running, "only terminal states reset");

    process.exit_with(0);
    controller.poll();
    controller.acknowledge();
    assert_eq!(controller.state(), &JobState::Idle);
    assert!(controller.job_id().is_none());
    assert!(controller.outcome().is_none());
}

#[test]
fn test_spawn_failure_is_terminal() {
    let fx = fixture();
    let (mut controller, process) = controller(5.0);
    process.state().refuse_start = true;
    let events = controller.subscribe();

    controller.launch(fx.request).unwrap();
    match controller.state() {
        JobState::Failed(FailureReason::ExternalTool(text)) => {
            assert!(text.contains("failed to start"), "{text}");
        }
        other => panic!("unexpected state {other:?}"),
    }
    let events: Vec<JobEvent> = events.try_iter().collect();
    assert!(percents(&events).is_empty());
    assert_eq!(terminals(&events).len(), 1);
}

#[test]
fn test_output_without_file_name_is_rejected() {
    let fx = fixture();
    let (mut controller, _process) = controller(5.0);
    let request = MuxRequest {
        output: PathBuf::from("/"),
        ..fx.request
    };
    assert!(matches!(
        controller.launch(request),
        Err(LaunchError::MissingFileName(_))
    ));
    assert_eq!(controller.state(), &JobState::Idle);
}

#[test]
fn test_every_listener_receives_events() {
    let fx = fixture();
    let (mut controller, process) = controller(10.0);
    let first = controller.subscribe();
    let dropped = controller.subscribe();
    let second = controller.subscribe();
    drop(dropped);

    controller.launch(fx.request).unwrap();
    process.exit_with(0);
    controller.poll();

    let a: Vec<JobEvent> = first.try_iter().collect();
    let b: Vec<JobEvent> = second.try_iter().collect();
    assert_eq!(a, b);
    assert_eq!(terminals(&a).len(), 1);
}

#[test]
fn test_diagnostics_keep_only_the_tail() {
    let fx = fixture();
    let process = FakeProcess::default();
    let mut controller = MuxJobController::new("ffmpeg", FixedDuration(10.0), process.clone())
        .with_diagnostic_tail(8);
    controller.launch(fx.request).unwrap();

    process.emit("0123456789abcdef");
    process.exit_with(1);
    controller.poll();
    assert_eq!(
        controller.outcome(),
        Some(JobOutcome::Failed("89abcdef".into()))
    );
}
