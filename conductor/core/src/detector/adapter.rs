//! Detector Adapter
//!
//! Owns one backend and its lifecycle:
//!
//! ```text
//!   Uninitialized ──initialize──► Initializing ──ok──► Ready ──dispose──► Disposed
//!                                      │                                      ▲
//!                                      └─fail/timeout─► Failed ──dispose──────┘
//!                                                         │
//!                                                         └─initialize (retry)
//! ```
//!
//! `initialize` is idempotent: Ready returns `true` at once, and a caller
//! arriving while another call is still Initializing gets `false` without
//! re-entering setup. `detect` never raises; everything that is not a
//! usable sample comes back as `None`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::traits::{BackendKind, EmotionBackend, ModelSource, VideoFrame};
use super::DetectorError;
use crate::emotion::EmotionSample;

/// Default bound on backend setup
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(15);

/// Adapter lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterState {
    /// Never initialized
    Uninitialized,
    /// Setup in progress
    Initializing,
    /// Accepting frames
    Ready,
    /// Last setup attempt failed; may be retried
    Failed,
    /// Released; not reusable
    Disposed,
}

/// Lifecycle wrapper around an [`EmotionBackend`]
pub struct DetectorAdapter<B: EmotionBackend> {
    backend: tokio::sync::Mutex<B>,
    name: String,
    kind: BackendKind,
    sources: Vec<ModelSource>,
    init_timeout: Duration,
    state: Mutex<AdapterState>,
    last_failure: Mutex<Option<String>>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when a detect call ends
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<B: EmotionBackend> DetectorAdapter<B> {
    /// Wrap `backend`, trying `sources` in order (bundled if empty)
    pub fn new(backend: B, sources: Vec<ModelSource>, init_timeout: Duration) -> Self {
        let sources = if sources.is_empty() {
            vec![ModelSource::Bundled]
        } else {
            sources
        };
        Self {
            name: backend.name().to_string(),
            kind: backend.kind(),
            backend: tokio::sync::Mutex::new(backend),
            sources,
            init_timeout,
            state: Mutex::new(AdapterState::Uninitialized),
            last_failure: Mutex::new(None),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Backend name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend family
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> AdapterState {
        *self.state.lock()
    }

    /// Whether frames are accepted
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == AdapterState::Ready
    }

    /// Why the last setup attempt failed
    #[must_use]
    pub fn last_failure(&self) -> Option<String> {
        self.last_failure.lock().clone()
    }

    /// Bring the backend up
    ///
    /// Returns `true` once Ready. Returns `false` if setup failed, timed out,
    /// is already running in another caller, or the adapter was disposed.
    pub async fn initialize(&self) -> bool {
        {
            let mut state = self.state.lock();
            match *state {
                AdapterState::Ready => return true,
                AdapterState::Initializing | AdapterState::Disposed => return false,
                AdapterState::Uninitialized | AdapterState::Failed => {
                    *state = AdapterState::Initializing;
                }
            }
        }

        tracing::info!(backend = %self.name, sources = self.sources.len(), "Initializing detector");
        let outcome = match tokio::time::timeout(self.init_timeout, self.load_first_source()).await {
            Ok(result) => result,
            Err(_) => Err(DetectorError::Timeout(self.init_timeout)),
        };

        let mut state = self.state.lock();
        if *state == AdapterState::Disposed {
            return false;
        }
        match outcome {
            Ok(source) => {
                *state = AdapterState::Ready;
                *self.last_failure.lock() = None;
                tracing::info!(backend = %self.name, source = %source, "Detector ready");
                true
            }
            Err(e) => {
                *state = AdapterState::Failed;
                tracing::warn!(backend = %self.name, error = %e, "Detector initialization failed");
                *self.last_failure.lock() = Some(e.to_string());
                false
            }
        }
    }

    async fn load_first_source(&self) -> Result<ModelSource, DetectorError> {
        let mut backend = self.backend.lock().await;
        for (idx, source) in self.sources.iter().enumerate() {
            let attempt = idx + 1;
            if let Err(e) = backend.probe(source).await {
                tracing::warn!(attempt, source = %source, error = %e, "Model source unreachable");
                continue;
            }
            match backend.load(source).await {
                Ok(()) => return Ok(source.clone()),
                Err(e) => {
                    tracing::warn!(attempt, source = %source, error = %e, "Model source failed to load");
                }
            }
        }
        Err(DetectorError::AllSourcesFailed {
            attempts: self.sources.len(),
        })
    }

    /// Classify one frame
    ///
    /// `None` for zero-size frames, when not Ready, when a previous call is
    /// still running, when no face is found, or when the backend errors.
    pub async fn detect(&self, frame: &VideoFrame) -> Option<EmotionSample> {
        if !frame.has_dimensions() || !self.is_ready() {
            return None;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::trace!(backend = %self.name, "Detect already in flight, skipping frame");
            return None;
        }
        let _in_flight = InFlight(&self.in_flight);

        let mut backend = self.backend.lock().await;
        // disposal may have won the race for the backend lock
        if !self.is_ready() {
            return None;
        }

        match backend.classify(frame).await {
            Ok(Some(c)) => Some(
                EmotionSample::new(c.label, c.confidence, frame.captured_at).with_scores(c.scores),
            ),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(backend = %self.name, error = %e, "Detection failed");
                None
            }
        }
    }

    /// Release backend resources; the adapter cannot be reused
    pub async fn dispose(&self) {
        {
            let mut state = self.state.lock();
            if *state == AdapterState::Disposed {
                return;
            }
            *state = AdapterState::Disposed;
        }
        self.backend.lock().await.release().await;
        tracing::debug!(backend = %self.name, "Detector disposed");
    }
}
