use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use jobs::{JobEvent, JobOutcome, MuxJobController};
use media_io::{DurationProbe, FfmpegTools};
use serde::Serialize;
use session::{MuxerConfig, Provenance, Session};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const EXIT_FAILED: u8 = 1;
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser)]
#[command(name = "muxer")]
#[command(about = "Replace the audio track of a video without re-encoding it")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the per-user data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory containing ffmpeg and ffprobe
    #[arg(long, global = true)]
    ffmpeg_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Mux a video with a new audio track
    Mux {
        /// Video file (.mp4, .mov)
        #[arg(long)]
        video: PathBuf,

        /// Audio file (.wav)
        #[arg(long)]
        audio: PathBuf,

        /// Output file name, placed beside the video
        #[arg(short, long)]
        name: Option<String>,

        /// Full output path; implies --no-beside-video
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Do not place the output next to the video
        #[arg(long)]
        no_beside_video: bool,
    },

    /// Print the duration of a video as seen by ffprobe
    Probe {
        video: PathBuf,
    },

    /// Verify that ffmpeg is available
    Check,
}

#[derive(Serialize)]
struct ProbeReport {
    file: PathBuf,
    duration_seconds: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let mut config = MuxerConfig::load(cli.config.as_deref())?;
    if cli.ffmpeg_dir.is_some() {
        config.ffmpeg_dir = cli.ffmpeg_dir;
    }

    match cli.command {
        Commands::Mux {
            video,
            audio,
            name,
            output,
            no_beside_video,
        } => mux_command(&config, video, audio, name, output, no_beside_video).await,
        Commands::Probe { video } => probe_command(&config, video),
        Commands::Check => check_command(&config),
    }
}

fn locate_tools(config: &MuxerConfig) -> Result<FfmpegTools> {
    let tools = FfmpegTools::locate(config.ffmpeg_dir.as_deref())?;
    let version = tools.check()?;
    info!("{}", version);
    Ok(tools)
}

async fn mux_command(
    config: &MuxerConfig,
    video: PathBuf,
    audio: PathBuf,
    name: Option<String>,
    output: Option<PathBuf>,
    no_beside_video: bool,
) -> Result<ExitCode> {
    let mut session = Session::from_config(config);
    session.select_video(&video, Provenance::Dialog)?;
    session.select_audio(&audio, Provenance::Dialog)?;

    if no_beside_video || output.is_some() {
        session.set_save_beside_video(false);
    }
    if let Some(name) = name {
        session.set_output_name(&name);
    }
    if let Some(path) = output {
        session.choose_output(&path);
    }
    let request = session
        .mux_request()
        .context("cannot determine where to write the output; pass --output")?;

    let tools = locate_tools(config)?;
    let mut controller = MuxJobController::from_tools(&tools)
        .with_diagnostic_tail(config.diagnostic_tail_bytes);
    let events = controller.subscribe();

    let cancel_requested = Arc::new(AtomicBool::new(false));
    {
        let flag = cancel_requested.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                flag.store(true, Ordering::SeqCst);
            }
        });
    }

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos:>3}% {msg}")?.progress_chars("=> "),
    );
    bar.set_message(format!("{}", request.output.display()));

    controller.launch(request)?;
    let poll_interval = Duration::from_millis(config.poll_interval_ms.max(1));

    let outcome = loop {
        if cancel_requested.load(Ordering::SeqCst) {
            controller.cancel();
        } else {
            controller.poll();
        }

        let mut finished = None;
        for event in events.try_iter() {
            match event {
                JobEvent::Progress { percent, .. } => bar.set_position(u64::from(percent)),
                JobEvent::Terminal { outcome, .. } => finished = Some(outcome),
            }
        }
        if let Some(outcome) = finished {
            break outcome;
        }
        bar.tick();
        tokio::time::sleep(poll_interval).await;
    };

    match outcome {
        JobOutcome::Succeeded(path) => {
            bar.finish_with_message("done");
            println!("{}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        JobOutcome::Cancelled => {
            bar.abandon_with_message("cancelled");
            warn!("mux cancelled; the partial output may remain on disk");
            Ok(ExitCode::from(EXIT_CANCELLED))
        }
        JobOutcome::Failed(text) => {
            bar.abandon_with_message("failed");
            eprintln!("{text}");
            Ok(ExitCode::from(EXIT_FAILED))
        }
    }
}

fn probe_command(config: &MuxerConfig, video: PathBuf) -> Result<ExitCode> {
    if !video.is_file() {
        bail!("file does not exist: {}", video.display());
    }
    let tools = FfmpegTools::locate(config.ffmpeg_dir.as_deref())?;
    let seconds = tools.duration_probe().probe(&video);

    let report = ProbeReport {
        file: video,
        duration_seconds: (seconds > 0.0).then_some(seconds),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::SUCCESS)
}

fn check_command(config: &MuxerConfig) -> Result<ExitCode> {
    match locate_tools(config) {
        Ok(tools) => {
            println!("ffmpeg:  {}", tools.ffmpeg.display());
            match &tools.ffprobe {
                Some(path) => println!("ffprobe: {}", path.display()),
                None => println!("ffprobe: not found (progress will be estimated)"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{e:#}");
            Ok(ExitCode::from(EXIT_FAILED))
        }
    }
}
