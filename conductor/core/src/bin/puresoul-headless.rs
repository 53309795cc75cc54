//! PureSoul Headless Driver
//!
//! Runs the Conductor without a UI. Surface events are read from stdin as
//! JSON lines and every Conductor message is written to stdout as a JSON
//! line, so any process (or a person with a terminal) can act as the surface.
//!
//! # Usage
//!
//! ```bash
//! # Defaults plus ~/.config/puresoul/conductor.toml plus PURESOUL_* env
//! puresoul-headless
//!
//! # Explicit config and a recorded camera feed
//! puresoul-headless --config ./conductor.toml --frames ./frames.jsonl
//!
//! # Drive it
//! echo '{"type":"permission_granted"}' | RUST_LOG=debug puresoul-headless
//! ```
//!
//! # Frames
//!
//! `--frames` points at a JSON-lines file of `VideoFrame`s. They are replayed
//! in a loop, one per detection tick. Without it the camera never produces a
//! frame and only "just talk" sessions are possible.
//!
//! # Audio
//!
//! There is no speaker. Synthesized clips are logged and "play" instantly.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use puresoul_core::detector::{ComputeTarget, ModelProbe};
use puresoul_core::remote::AudioClip;
use puresoul_core::{
    AudioHandle, AudioOutput, BackendKind, BlendshapeBackend, CnnBackend, Conductor,
    ConductorConfig, ConductorMessage, EmotionBackend, ExpressionBackend, FrameSource,
    HttpModelProbe, HttpRemote, PlaybackError, SurfaceEvent, VideoFrame,
};

/// How often buffered detection samples are drained
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Replays recorded frames in a loop
struct ReplayFrames {
    frames: Mutex<VecDeque<VideoFrame>>,
}

impl ReplayFrames {
    fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read frames {}: {}", path.display(), e))?;
        let mut frames = VecDeque::new();
        for (n, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let frame: VideoFrame = serde_json::from_str(line)
                .map_err(|e| anyhow::anyhow!("{}:{}: {}", path.display(), n + 1, e))?;
            frames.push_back(frame);
        }
        info!(count = frames.len(), path = ?path, "Loaded recorded frames");
        Ok(Self {
            frames: Mutex::new(frames),
        })
    }

    fn empty() -> Self {
        Self {
            frames: Mutex::new(VecDeque::new()),
        }
    }
}

#[async_trait]
impl FrameSource for ReplayFrames {
    async fn next_frame(&self) -> Option<VideoFrame> {
        let mut frames = self.frames.lock();
        let mut frame = frames.pop_front()?;
        frames.push_back(frame.clone());
        frame.captured_at = chrono::Utc::now();
        Some(frame)
    }
}

/// Audio output that only logs
#[derive(Default)]
struct LoggedAudio {
    next_handle: AtomicU64,
}

#[async_trait]
impl AudioOutput for LoggedAudio {
    async fn assign(&self, clip: AudioClip) -> Result<AudioHandle, PlaybackError> {
        let handle = AudioHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        info!(handle = handle.0, bytes = clip.bytes.len(), mime = %clip.mime, "Speech clip ready");
        Ok(handle)
    }

    async fn play(&self, handle: AudioHandle) -> Result<(), PlaybackError> {
        tracing::debug!(handle = handle.0, "Playing");
        Ok(())
    }

    async fn stop(&self, handle: AudioHandle) {
        tracing::debug!(handle = handle.0, "Stopped");
    }

    fn release(&self, handle: AudioHandle) {
        tracing::debug!(handle = handle.0, "Released");
    }
}

struct Args {
    config: Option<PathBuf>,
    frames: Option<PathBuf>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        config: None,
        frames: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                args.config = Some(
                    iter.next()
                        .ok_or_else(|| anyhow::anyhow!("--config needs a path"))?
                        .into(),
                );
            }
            "--frames" => {
                args.frames = Some(
                    iter.next()
                        .ok_or_else(|| anyhow::anyhow!("--frames needs a path"))?
                        .into(),
                );
            }
            other => anyhow::bail!("Unknown argument: {other}"),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("puresoul_headless=info".parse()?)
                .add_directive("puresoul_core=info".parse()?),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;
    let config = ConductorConfig::load(args.config.as_deref())?;
    info!(api = %config.api_base_url, detector = %config.detector, "Starting PureSoul headless driver");

    let remote = Arc::new(HttpRemote::new(
        &config.api_base_url,
        config.auth_token.clone(),
        config.request_timeout(),
    )?);
    let frames: Arc<dyn FrameSource> = match &args.frames {
        Some(path) => Arc::new(ReplayFrames::load(path)?),
        None => Arc::new(ReplayFrames::empty()),
    };
    let audio: Arc<dyn AudioOutput> = Arc::new(LoggedAudio::default());
    let probe: Arc<dyn ModelProbe> = Arc::new(HttpModelProbe::new(config.request_timeout())?);

    match config.detector {
        BackendKind::Blendshape => {
            let backend = if config.model_sources.is_empty() {
                BlendshapeBackend::new()
            } else {
                BlendshapeBackend::with_probe(probe)
            };
            run(config, remote, backend, frames, audio).await
        }
        BackendKind::Expression => {
            let backend = ExpressionBackend::new(probe);
            run(config, remote, backend, frames, audio).await
        }
        BackendKind::Cnn => {
            let backend = CnnBackend::new(Some(probe), vec![ComputeTarget::Cpu]);
            run(config, remote, backend, frames, audio).await
        }
    }
}

async fn run<B: EmotionBackend + 'static>(
    config: ConductorConfig,
    remote: Arc<HttpRemote>,
    backend: B,
    frames: Arc<dyn FrameSource>,
    audio: Arc<dyn AudioOutput>,
) -> anyhow::Result<()> {
    let (msg_tx, mut msg_rx) = mpsc::channel::<ConductorMessage>(100);
    let (event_tx, mut event_rx) = mpsc::channel::<SurfaceEvent>(100);

    // Conductor -> stdout
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(msg) = msg_rx.recv().await {
            let mut line = match serde_json::to_string(&msg) {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "Failed to encode message");
                    continue;
                }
            };
            line.push('\n');
            if let Err(e) = stdout.write_all(line.as_bytes()).await {
                warn!(error = %e, "stdout closed");
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    // stdin -> Conductor
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match serde_json::from_str::<SurfaceEvent>(&line) {
                    Ok(event) => {
                        if event_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, line = %line, "Ignoring malformed event"),
                },
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
    });

    let mut conductor = Conductor::new(config, remote, backend, frames, audio, msg_tx);
    conductor.start().await?;
    info!("Conductor started");

    let mut poll = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else {
                    info!("Input closed, shutting down");
                    break;
                };
                if let Err(e) = conductor.handle_event(event).await {
                    warn!(error = %e, "Failed to handle event");
                }
            }
            _ = poll.tick() => {
                conductor.poll_detection().await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    conductor.shutdown().await?;
    drop(conductor);
    if let Err(e) = writer.await {
        warn!(error = %e, "Writer task failed");
    }
    info!("Goodbye");
    Ok(())
}
