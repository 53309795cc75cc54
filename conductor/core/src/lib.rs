//! PureSoul Core - Emotion-Aware Session Orchestration
//!
//! This crate turns a stream of camera frames into an emotion verdict,
//! offers a therapy session matched to it, and runs that session against the
//! PureSoul service: credit-gated turns, spoken replies, and session storage
//! for pro accounts. It has no UI; a surface drives it through events.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         UI Surface                               │
//! │        (web, mobile, or the headless stdin driver)               │
//! │                           │                                      │
//! │                    SurfaceEvent (up)                             │
//! │                  ConductorMessage (down)                         │
//! └───────────────────────────┼──────────────────────────────────────┘
//!                             │
//! ┌───────────────────────────┼──────────────────────────────────────┐
//! │                      PURESOUL CORE                               │
//! │  ┌────────────────────────┴─────────────────────────────────────┐│
//! │  │                       Conductor                              ││
//! │  │ ┌──────────┐ ┌───────────┐ ┌─────────┐ ┌────────┐ ┌────────┐ ││
//! │  │ │ Detector │ │ Emotion   │ │ Session │ │ Credit │ │Playback│ ││
//! │  │ │ Adapter  │ │ Window    │ │ Gate    │ │ Ledger │ │ Queue  │ ││
//! │  │ └────┬─────┘ └───────────┘ └────┬────┘ └───┬────┘ └───┬────┘ ││
//! │  └──────┼───────────────────────────┼──────────┼──────────┼──────┘│
//! │         │                           └──── remote traits ──┘       │
//! └─────────┼────────────────────────────────────┼────────────────────┘
//!      EmotionBackend                       HttpRemote
//!  (blendshape / expression / cnn)      (chat, credits, sessions, tts)
//! ```
//!
//! # Key Types
//!
//! - [`Conductor`]: The orchestration struct that owns every component
//! - [`ConductorMessage`]: Messages sent from Conductor to the UI surface
//! - [`SurfaceEvent`]: Events sent from the UI surface to Conductor
//! - [`DetectorAdapter`]: Detector lifecycle around one [`EmotionBackend`]
//! - [`EmotionWindow`]: Majority vote over a tumbling window of labels
//! - [`SessionGate`] and [`CreditLedger`]: Turn authorization and balance
//! - [`PlaybackQueue`]: Serial, deduplicating speech output
//!
//! # Quick Start
//!
//! ```ignore
//! use puresoul_core::{BlendshapeBackend, Conductor, ConductorConfig, HttpRemote, SurfaceEvent};
//! use tokio::sync::mpsc;
//!
//! let config = ConductorConfig::load(None)?;
//! let remote = Arc::new(HttpRemote::new(
//!     &config.api_base_url,
//!     config.auth_token.clone(),
//!     config.request_timeout(),
//! )?);
//! let (tx, mut rx) = mpsc::channel(100);
//! let mut conductor = Conductor::new(config, remote, BlendshapeBackend::new(), camera, speaker, tx);
//!
//! conductor.start().await?;
//! conductor.handle_event(SurfaceEvent::PermissionGranted).await?;
//!
//! loop {
//!     while let Ok(msg) = rx.try_recv() {
//!         // render
//!     }
//!     conductor.poll_detection().await;
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`emotion`]: Labels, samples, recent-sample history
//! - [`aggregator`]: Sliding-window verdicts
//! - [`detector`]: Backends, adapter lifecycle, model probing, detection loop
//! - [`category`]: Session topics and their welcome lines
//! - [`credits`]: Tiers, balances, and the credit ledger
//! - [`gate`]: Turn authorization and session open/close
//! - [`session`]: Sessions, turns, summaries, stored-session records
//! - [`playback`]: Speech playback queue
//! - [`remote`]: Remote service traits and the HTTP client
//! - [`config`]: Configuration loading
//! - [`events`] / [`messages`]: Surface protocol
//! - [`conductor`]: The orchestrator

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod aggregator;
pub mod category;
pub mod conductor;
pub mod config;
pub mod credits;
pub mod detector;
pub mod emotion;
pub mod events;
pub mod gate;
pub mod messages;
pub mod playback;
pub mod remote;
pub mod session;

// Re-exports for convenience
pub use aggregator::{EmotionWindow, Verdict, DEFAULT_WINDOW_SIZE};
pub use category::Category;
pub use conductor::Conductor;
pub use config::{ConductorConfig, ConfigError, CreditConsumption};
pub use credits::{
    BalanceDisplay, BalanceReport, CreditBalance, CreditError, CreditLedger, CreditLevel, Tier,
};
pub use detector::{
    AdapterState, BackendKind, BlendshapeBackend, CnnBackend, DetectionTicker, DetectorAdapter,
    DetectorError, EmotionBackend, ExpressionBackend, FrameFeatures, FrameSource, HttpModelProbe,
    ModelSource, VideoFrame,
};
pub use emotion::{EmotionLabel, EmotionSample, RecentSamples};
pub use events::SurfaceEvent;
pub use gate::{CreditResolution, GateDecision, SessionGate, TurnState};
pub use messages::{BlockReason, ConductorMessage, ConductorState, NotifyLevel};
pub use playback::{
    speakable, AudioHandle, AudioOutput, PlaybackError, PlaybackQueue, PlaybackStats,
};
pub use remote::{HttpRemote, Remote, RemoteError};
pub use session::{
    Persistence, RemoteSessionId, Session, SessionRecord, SessionSummary, SessionTranscript,
    Turn, TurnId, TurnRole,
};
