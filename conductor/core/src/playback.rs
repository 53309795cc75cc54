//! Speech Playback Queue
//!
//! Serializes synthesized speech onto the single shared audio output.
//!
//! # Design Philosophy
//!
//! Replies can arrive faster than they can be spoken, and a surface may ask
//! for the same line twice (re-render, retry). The queue guarantees:
//!
//! - at most one item is playing at any instant
//! - items play in enqueue order
//! - a line identical to the last one that finished playing is not repeated
//! - every audio handle is released, whatever happens to the item
//! - one bad item (synthesis error, output error, stuck playback) never
//!   stops the items behind it
//!
//! ```text
//!   enqueue ──► VecDeque ──► drain task ──► synthesize ──► assign ──► play (≤ timeout)
//!                 (lock)      (one at a time)                 │
//!                                                    AudioLease releases on drop
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::remote::{AudioClip, SpeechSynthesizer};

/// Default bound on one item's playback
pub const DEFAULT_PLAYBACK_TIMEOUT: Duration = Duration::from_secs(60);

/// Audio output failure
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Output refused the clip
    #[error("audio output rejected clip: {0}")]
    Rejected(String),

    /// Playback failed after starting
    #[error("playback failed: {0}")]
    Failed(String),
}

/// Opaque handle to an assigned clip
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AudioHandle(pub u64);

/// The single shared audio element
///
/// Only [`PlaybackQueue`] drives it.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Load a clip and return its handle
    async fn assign(&self, clip: AudioClip) -> Result<AudioHandle, PlaybackError>;

    /// Play the clip; resolves when playback ends
    async fn play(&self, handle: AudioHandle) -> Result<(), PlaybackError>;

    /// Halt playback
    async fn stop(&self, handle: AudioHandle);

    /// Free the clip's resources; must tolerate already-stopped handles
    fn release(&self, handle: AudioHandle);
}

/// One queued line
pub struct PlaybackRequest {
    /// Text to speak
    pub text: String,
    /// When it was queued
    pub requested_at: DateTime<Utc>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
}

/// Playback counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackStats {
    /// Items that played to the end
    pub played: u64,
    /// Items dropped as repeats of the last completed line
    pub skipped: u64,
    /// Items whose synthesis or playback failed
    pub failed: u64,
    /// Items cut off by the playback timeout
    pub timed_out: u64,
}

#[derive(Default)]
struct Counters {
    played: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<PlaybackRequest>,
    running: bool,
    epoch: u64,
    last_completed: Option<String>,
    active: Option<AudioHandle>,
    drain: Option<JoinHandle<()>>,
}

struct Inner {
    output: Arc<dyn AudioOutput>,
    playback_timeout: Duration,
    state: Mutex<QueueState>,
    counters: Counters,
    idle: Notify,
}

/// Releases an audio handle when dropped
struct AudioLease {
    output: Arc<dyn AudioOutput>,
    handle: AudioHandle,
}

impl Drop for AudioLease {
    fn drop(&mut self) {
        self.output.release(self.handle);
    }
}

/// Serial, deduplicating speech queue
#[derive(Clone)]
pub struct PlaybackQueue {
    inner: Arc<Inner>,
}

impl PlaybackQueue {
    /// Create a queue driving `output`
    pub fn new(output: Arc<dyn AudioOutput>, playback_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                output,
                playback_timeout,
                state: Mutex::new(QueueState::default()),
                counters: Counters::default(),
                idle: Notify::new(),
            }),
        }
    }

    /// Queue `text` for speech
    ///
    /// Returns `false` if the text is blank or repeats the last completed
    /// line. Starts the drain task if it is not already running.
    pub fn enqueue(&self, text: impl Into<String>, synthesizer: Arc<dyn SpeechSynthesizer>) -> bool {
        let text = text.into();
        if text.trim().is_empty() {
            return false;
        }

        let mut state = self.inner.state.lock();
        if state.last_completed.as_deref() == Some(text.as_str()) {
            self.inner.counters.skipped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Skipping repeat of last spoken line");
            return false;
        }

        state.pending.push_back(PlaybackRequest {
            text,
            requested_at: Utc::now(),
            synthesizer,
        });

        if !state.running {
            state.running = true;
            let epoch = state.epoch;
            let inner = Arc::clone(&self.inner);
            state.drain = Some(tokio::spawn(drain(inner, epoch)));
        }
        true
    }

    /// Items waiting behind the current one
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Whether the drain task is active
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }

    /// Text of the last item that finished
    #[must_use]
    pub fn last_completed(&self) -> Option<String> {
        self.inner.state.lock().last_completed.clone()
    }

    /// Counter snapshot
    #[must_use]
    pub fn stats(&self) -> PlaybackStats {
        let c = &self.inner.counters;
        PlaybackStats {
            played: c.played.load(Ordering::Relaxed),
            skipped: c.skipped.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            timed_out: c.timed_out.load(Ordering::Relaxed),
        }
    }

    /// Drop queued items; the current one finishes
    pub fn clear(&self) {
        self.inner.state.lock().pending.clear();
    }

    /// Halt the current item and drop everything queued
    pub async fn stop(&self) {
        let (active, drain) = {
            let mut state = self.inner.state.lock();
            state.epoch += 1;
            state.pending.clear();
            state.running = false;
            (state.active.take(), state.drain.take())
        };
        if let Some(handle) = active {
            self.inner.output.stop(handle).await;
        }
        if let Some(drain) = drain {
            drain.abort();
        }
        self.inner.idle.notify_waiters();
    }

    /// Wait until the queue has nothing left to play
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_running() {
                return;
            }
            notified.await;
        }
    }
}

async fn drain(inner: Arc<Inner>, epoch: u64) {
    loop {
        let request = {
            let mut state = inner.state.lock();
            if state.epoch != epoch {
                return;
            }
            match state.pending.pop_front() {
                Some(request) => {
                    if state.last_completed.as_deref() == Some(request.text.as_str()) {
                        inner.counters.skipped.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                    request
                }
                None => {
                    state.running = false;
                    state.drain = None;
                    drop(state);
                    inner.idle.notify_waiters();
                    return;
                }
            }
        };
        play_one(&inner, epoch, request).await;
    }
}

async fn play_one(inner: &Inner, epoch: u64, request: PlaybackRequest) {
    let clip = match request.synthesizer.synthesize(&request.text).await {
        Ok(clip) => clip,
        Err(e) => {
            inner.counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %e, "Speech synthesis failed, skipping line");
            return;
        }
    };

    let handle = match inner.output.assign(clip).await {
        Ok(handle) => handle,
        Err(e) => {
            inner.counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %e, "Audio output rejected clip");
            return;
        }
    };
    let lease = AudioLease {
        output: Arc::clone(&inner.output),
        handle,
    };

    {
        let mut state = inner.state.lock();
        if state.epoch != epoch {
            return;
        }
        state.active = Some(lease.handle);
    }

    let finished = match tokio::time::timeout(inner.playback_timeout, inner.output.play(lease.handle)).await {
        Ok(Ok(())) => {
            inner.counters.played.fetch_add(1, Ordering::Relaxed);
            true
        }
        Ok(Err(e)) => {
            inner.counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %e, "Playback failed");
            false
        }
        Err(_) => {
            inner.output.stop(lease.handle).await;
            inner.counters.timed_out.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(timeout = ?inner.playback_timeout, "Playback timed out, stopping");
            true
        }
    };

    let mut state = inner.state.lock();
    state.active = None;
    if finished && state.epoch == epoch {
        state.last_completed = Some(request.text);
    }
}

/// Remove stage directions (`*smiles*`) and emoticons before speaking
#[must_use]
pub fn speakable(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('*') {
        let after = &rest[open + 1..];
        match after.find('*') {
            Some(close) => {
                out.push_str(&rest[..open]);
                rest = &after[close + 1..];
            }
            None => break,
        }
    }
    out.push_str(rest);

    out.chars()
        .filter(|c| !('\u{1F600}'..='\u{1F64F}').contains(c))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
