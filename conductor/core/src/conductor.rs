//! Conductor - The Orchestration Core
//!
//! The Conductor drives one user's journey through the app:
//! - camera permission and detector setup
//! - sampling frames into verdicts and offering a session
//! - gating turns on credits and talking to the chat service
//! - speaking replies through the playback queue
//! - opening, ending, restoring, and deleting sessions
//!
//! # Design Philosophy
//!
//! The Conductor is UI-agnostic. A surface reports [`SurfaceEvent`]s and
//! renders the [`ConductorMessage`]s it gets back; every transition is made
//! here. Dependencies (remote service, detector backend, frame source, audio
//! output) are handed in at construction, so tests run the whole flow with
//! in-memory fakes.
//!
//! ```text
//!  AwaitingPermission ──granted──► Detecting ──verdict──► VerdictPopup
//!        │                            ▲                     │      │
//!     denied / setup failed       dismissed ◄───────────────┘   category / just talk
//!        ▼                            │                            ▼
//!  Blocked{reason} ──retry──►─────────┘   SessionEnded ◄──end── SessionActive
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::aggregator::{EmotionWindow, Verdict};
use crate::category::Category;
use crate::config::{ConductorConfig, CreditConsumption};
use crate::credits::{CreditBalance, CreditError, CreditLedger, Tier};
use crate::detector::{AdapterState, DetectionTicker, DetectorAdapter, EmotionBackend, FrameSource};
use crate::emotion::{EmotionSample, RecentSamples};
use crate::events::SurfaceEvent;
use crate::gate::{CreditResolution, GateDecision, SessionGate};
use crate::messages::{BlockReason, ConductorMessage, ConductorState, NotifyLevel};
use crate::playback::{speakable, AudioOutput, PlaybackQueue};
use crate::remote::{ChatRequest, HistoryEntry, Remote, RemoteError, SpeechSynthesizer};
use crate::session::{RemoteSessionId, Session, SessionSummary, Turn};

/// Buffered samples between the ticker and the conductor
const SAMPLE_CHANNEL_CAPACITY: usize = 32;

const PRO_ONLY: &str = "Saved sessions are available on Pro plans";

/// The Conductor - orchestrates detection, sessions, credits, and speech
pub struct Conductor<R: Remote + 'static, B: EmotionBackend + 'static> {
    /// Configuration
    config: ConductorConfig,
    /// Chat, credits, sessions, and speech
    remote: Arc<R>,
    /// Emotion detector lifecycle
    detector: Arc<DetectorAdapter<B>>,
    /// Camera frames
    frames: Arc<dyn FrameSource>,
    /// Server balance mirror
    ledger: Arc<CreditLedger<R>>,
    /// Speech output
    playback: PlaybackQueue,
    /// Samples toward the next verdict
    window: EmotionWindow,
    /// Display history of samples
    recent: RecentSamples,
    /// Turn gate for the live session
    gate: SessionGate,
    /// Live session
    session: Option<Session>,
    /// Ended sessions, oldest first
    history: Vec<SessionSummary>,
    /// Current operational state
    state: ConductorState,
    /// Running detection loop
    ticker: Option<DetectionTicker>,
    /// Samples from the detection loop
    sample_rx: Option<mpsc::Receiver<EmotionSample>>,
    /// Most recent verdict, used to annotate user turns
    latest_verdict: Option<Verdict>,
    /// Last credit reconciliation task
    reconcile: Option<JoinHandle<()>>,
    /// Channel to send messages to UI surface
    tx: mpsc::Sender<ConductorMessage>,
}

impl<R: Remote + 'static, B: EmotionBackend + 'static> Conductor<R, B> {
    /// Create a new Conductor
    pub fn new(
        config: ConductorConfig,
        remote: Arc<R>,
        backend: B,
        frames: Arc<dyn FrameSource>,
        audio: Arc<dyn AudioOutput>,
        tx: mpsc::Sender<ConductorMessage>,
    ) -> Self {
        let detector = Arc::new(DetectorAdapter::new(
            backend,
            config.sources(),
            config.init_timeout(),
        ));
        let ledger = Arc::new(CreditLedger::new(Arc::clone(&remote), CreditBalance::basic()));
        let playback = PlaybackQueue::new(audio, config.playback_timeout());

        Self {
            window: EmotionWindow::new(config.window_size),
            recent: RecentSamples::new(config.recent_capacity),
            config,
            remote,
            detector,
            frames,
            ledger,
            playback,
            gate: SessionGate::new(),
            session: None,
            history: Vec::new(),
            state: ConductorState::AwaitingPermission,
            ticker: None,
            sample_rx: None,
            latest_verdict: None,
            reconcile: None,
            tx,
        }
    }

    /// Get current state
    #[must_use]
    pub fn state(&self) -> &ConductorState {
        &self.state
    }

    /// Live session, if any
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Ended sessions, oldest first
    #[must_use]
    pub fn history(&self) -> &[SessionSummary] {
        &self.history
    }

    /// Current credit balance
    #[must_use]
    pub fn balance(&self) -> Arc<CreditBalance> {
        self.ledger.snapshot()
    }

    /// Turn gate
    #[must_use]
    pub fn gate(&self) -> &SessionGate {
        &self.gate
    }

    /// Detector adapter
    #[must_use]
    pub fn detector(&self) -> &Arc<DetectorAdapter<B>> {
        &self.detector
    }

    /// Playback queue
    #[must_use]
    pub fn playback(&self) -> &PlaybackQueue {
        &self.playback
    }

    /// Recent samples, newest first
    #[must_use]
    pub fn recent_samples(&self) -> &RecentSamples {
        &self.recent
    }

    /// Most recent verdict
    #[must_use]
    pub fn latest_verdict(&self) -> Option<&Verdict> {
        self.latest_verdict.as_ref()
    }

    /// Whether the detection loop is running
    #[must_use]
    pub fn is_sampling(&self) -> bool {
        self.sample_rx.is_some()
    }

    /// Start the Conductor: announce state and load the balance
    pub async fn start(&mut self) -> anyhow::Result<()> {
        self.set_state(ConductorState::AwaitingPermission).await;

        match self.ledger.refresh().await {
            Ok(balance) => self.publish_balance(&balance).await,
            Err(e) => {
                tracing::warn!(error = %e, "Initial credit refresh failed");
                self.notify(NotifyLevel::Warning, "Could not load your credit balance")
                    .await;
            }
        }
        Ok(())
    }

    /// Handle an event from the UI surface
    pub async fn handle_event(&mut self, event: SurfaceEvent) -> anyhow::Result<()> {
        if self.state == ConductorState::SignedOut {
            tracing::debug!(?event, "Ignoring event after sign-out");
            return Ok(());
        }

        match event {
            SurfaceEvent::PermissionGranted => {
                if !matches!(
                    self.state,
                    ConductorState::Detecting | ConductorState::VerdictPopup { .. }
                ) {
                    self.bring_up_detector().await;
                }
            }

            SurfaceEvent::PermissionDenied => {
                self.stop_detection();
                if !self.session_active() {
                    self.set_state(ConductorState::Blocked {
                        reason: BlockReason::CameraDenied,
                    })
                    .await;
                }
            }

            SurfaceEvent::RetryDetector => {
                if matches!(self.state, ConductorState::Blocked { .. }) {
                    self.bring_up_detector().await;
                }
            }

            SurfaceEvent::ResumeDetection => {
                if self.state == ConductorState::SessionEnded {
                    self.bring_up_detector().await;
                }
            }

            SurfaceEvent::CategorySelected { category } => self.start_session(category).await,

            SurfaceEvent::JustTalk => self.start_session(Category::default()).await,

            SurfaceEvent::PopupDismissed => {
                if matches!(self.state, ConductorState::VerdictPopup { .. }) {
                    self.start_detection().await;
                }
            }

            SurfaceEvent::UserMessage { content } => self.handle_user_message(content).await,

            SurfaceEvent::ResendPending => self.resend_pending().await,

            SurfaceEvent::CreditChoice { resolution } => self.resolve_credits(resolution).await,

            SurfaceEvent::EndSession => self.end_session().await,

            SurfaceEvent::UpgradeTier { tier } => self.upgrade(tier).await,

            SurfaceEvent::RefreshCredits => self.refresh_credits().await,

            SurfaceEvent::Logout => self.logout().await,

            SurfaceEvent::ListSessions => self.list_sessions().await,

            SurfaceEvent::RestoreSession { id } => self.restore_session(id).await,

            SurfaceEvent::DeleteSession { id } => self.delete_session(id).await,
        }

        Ok(())
    }

    // ============================================
    // Detection
    // ============================================

    async fn bring_up_detector(&mut self) {
        let ready = self.detector.initialize().await;
        self.send(ConductorMessage::DetectorStatus {
            state: self.detector.state(),
            backend: self.detector.name().to_string(),
            failure: self.detector.last_failure(),
        })
        .await;

        if ready {
            if self.session_active() {
                self.start_sampling();
            } else {
                self.start_detection().await;
            }
        } else if self.detector.state() == AdapterState::Initializing {
            tracing::debug!("Detector setup already in progress");
        } else if !self.session_active() {
            self.set_state(ConductorState::Blocked {
                reason: BlockReason::DetectorUnavailable,
            })
            .await;
            self.notify(
                NotifyLevel::Error,
                "Emotion detection is unavailable. Check your connection and retry.",
            )
            .await;
        }
    }

    async fn start_detection(&mut self) {
        self.start_sampling();
        self.set_state(ConductorState::Detecting).await;
    }

    fn start_sampling(&mut self) {
        self.stop_detection();
        let (tx, rx) = mpsc::channel(SAMPLE_CHANNEL_CAPACITY);
        self.ticker = Some(DetectionTicker::spawn(
            Arc::clone(&self.detector),
            Arc::clone(&self.frames),
            self.config.tick_interval(),
            tx,
        ));
        self.sample_rx = Some(rx);
    }

    /// Abort the loop and drop anything it already produced
    fn stop_detection(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.stop();
        }
        self.sample_rx = None;
        self.window.clear();
    }

    /// Poll for detection samples
    ///
    /// Call this regularly to feed the aggregator.
    /// Returns true if there was activity.
    pub async fn poll_detection(&mut self) -> bool {
        let samples: Vec<EmotionSample> = {
            let Some(rx) = self.sample_rx.as_mut() else {
                return false;
            };
            let mut collected = Vec::new();
            while let Ok(sample) = rx.try_recv() {
                collected.push(sample);
            }
            collected
        };

        if samples.is_empty() {
            return false;
        }

        for sample in samples {
            // a verdict popup stops detection; the rest of the batch is stale
            if self.sample_rx.is_none() {
                break;
            }
            self.handle_sample(sample).await;
        }
        true
    }

    /// Wait for the next detection sample and process it
    ///
    /// Returns false once detection is stopped.
    pub async fn next_sample(&mut self) -> bool {
        let sample = match self.sample_rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => return false,
        };
        match sample {
            Some(sample) => {
                self.handle_sample(sample).await;
                true
            }
            None => false,
        }
    }

    async fn handle_sample(&mut self, sample: EmotionSample) {
        self.recent.record(sample.clone());
        let label = sample.label;
        self.send(ConductorMessage::Sample { sample }).await;

        let Some(verdict) = self.window.push(label) else {
            return;
        };
        tracing::info!(label = %verdict.dominant_label, "Verdict reached");
        self.latest_verdict = Some(verdict.clone());

        if self.state == ConductorState::Detecting {
            self.stop_detection();
            self.send(ConductorMessage::VerdictPopup {
                invitation: verdict.dominant_label.invitation().to_string(),
                categories: Category::ALL.to_vec(),
                verdict: verdict.clone(),
            })
            .await;
            self.set_state(ConductorState::VerdictPopup { verdict }).await;
        }
    }

    // ============================================
    // Sessions
    // ============================================

    fn session_active(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_active)
    }

    async fn start_session(&mut self, category: Category) {
        if self.session_active() {
            self.notify(NotifyLevel::Warning, "A session is already in progress")
                .await;
            return;
        }

        self.stop_detection();
        let tier = self.ledger.snapshot().tier;
        let mut session = SessionGate::open_session(self.remote.as_ref(), tier, category).await;
        self.gate.reset();

        let welcome = Turn::assistant(category.welcome());
        session.append(welcome.clone());
        self.send(ConductorMessage::SessionStarted {
            local_id: session.local_id,
            category,
            persistence: session.persistence(),
        })
        .await;
        self.session = Some(session);
        self.set_state(ConductorState::SessionActive).await;

        self.speak(&welcome.text);
        self.send(ConductorMessage::Turn { turn: welcome }).await;

        // keep sampling so user turns carry the latest verdict
        if self.detector.is_ready() {
            self.start_sampling();
        }
    }

    async fn end_session(&mut self) {
        let Some(mut session) = self.session.take() else {
            self.notify(NotifyLevel::Info, "No session to end").await;
            return;
        };

        self.stop_detection();
        self.playback.clear();
        let summary = SessionGate::close_session(self.remote.as_ref(), &mut session).await;
        tracing::info!(
            turns = summary.turns.len(),
            minutes = summary.duration_minutes,
            category = %summary.category,
            "Session ended"
        );

        self.history.push(summary.clone());
        self.gate.reset();
        self.latest_verdict = None;
        self.set_state(ConductorState::SessionEnded).await;
        self.send(ConductorMessage::SessionEnded { summary }).await;
    }

    fn persists_sessions(&self) -> bool {
        self.ledger.snapshot().tier.persists_sessions()
    }

    async fn list_sessions(&mut self) {
        if !self.persists_sessions() {
            self.notify(NotifyLevel::Warning, PRO_ONLY).await;
            return;
        }
        match self.remote.list_sessions().await {
            Ok(sessions) => self.send(ConductorMessage::SessionList { sessions }).await,
            Err(e) => {
                tracing::warn!(error = %e, "Listing sessions failed");
                self.notify(NotifyLevel::Error, "Could not load past sessions")
                    .await;
            }
        }
    }

    async fn restore_session(&mut self, id: RemoteSessionId) {
        if !self.persists_sessions() {
            self.notify(NotifyLevel::Warning, PRO_ONLY).await;
            return;
        }

        let transcript = match self.remote.fetch_session(id).await {
            Ok(transcript) => transcript,
            Err(RemoteError::NotFound(_)) => {
                self.notify(NotifyLevel::Warning, "That session no longer exists")
                    .await;
                return;
            }
            Err(e) => {
                tracing::warn!(session_id = %id, error = %e, "Restoring session failed");
                self.notify(NotifyLevel::Error, "Could not restore that session")
                    .await;
                return;
            }
        };

        let category = transcript.record.category();
        let turns = transcript.turns;

        if self.session_active() {
            if let Some(session) = self.session.as_mut() {
                session.category = category;
                session.replace(id, turns.clone());
            }
        } else {
            self.stop_detection();
            let mut session = Session::persisted(category, id);
            session.replace(id, turns.clone());
            self.session = Some(session);
            self.gate.reset();
            self.set_state(ConductorState::SessionActive).await;
            if self.detector.is_ready() {
                self.start_sampling();
            }
        }

        tracing::info!(session_id = %id, turns = turns.len(), "Session restored");
        self.send(ConductorMessage::SessionRestored {
            remote_id: id,
            category,
            turns,
        })
        .await;
    }

    async fn delete_session(&mut self, id: RemoteSessionId) {
        if !self.persists_sessions() {
            self.notify(NotifyLevel::Warning, PRO_ONLY).await;
            return;
        }

        match self.remote.delete_session(id).await {
            Ok(()) => {
                if let Some(session) = self.session.as_mut() {
                    if session.remote_id == Some(id) {
                        session.remote_id = None;
                    }
                }
                self.send(ConductorMessage::SessionDeleted { id }).await;
            }
            Err(RemoteError::NotFound(_)) => {
                self.notify(NotifyLevel::Warning, "That session no longer exists")
                    .await;
            }
            Err(e) => {
                tracing::warn!(session_id = %id, error = %e, "Deleting session failed");
                self.notify(NotifyLevel::Error, "Could not delete that session")
                    .await;
            }
        }
    }

    // ============================================
    // Turns
    // ============================================

    async fn handle_user_message(&mut self, content: String) {
        let content = content.trim().to_string();
        if content.is_empty() {
            return;
        }
        if !self.session_active() {
            self.notify(NotifyLevel::Warning, "Start a session before sending messages")
                .await;
            return;
        }

        // credits held for earlier turns are not spendable yet
        let balance = self.ledger.spendable();
        match self.gate.begin_turn(&content, &balance) {
            GateDecision::Authorized => self.send_turn(content).await,
            GateDecision::Denied => self.show_credit_popup(content).await,
            GateDecision::Busy => {
                self.notify(NotifyLevel::Info, "Still waiting for the last reply")
                    .await;
            }
        }
    }

    async fn send_turn(&mut self, content: String) {
        let emotion = self.latest_verdict.as_ref().map(|v| v.dominant_label);
        let user_turn = Turn::user(content.clone()).with_emotion(emotion);
        let user_turn_id = user_turn.id.clone();

        let Some(session) = self.session.as_mut() else {
            self.gate.reset();
            return;
        };
        let history = if session.remote_id.is_some() {
            Vec::new()
        } else {
            session
                .recent(self.config.history_limit)
                .iter()
                .map(|t| HistoryEntry {
                    role: t.role,
                    text: t.text.clone(),
                })
                .collect()
        };
        let request = ChatRequest {
            user_message: content.clone(),
            category: session.category,
            session_id: session.remote_id,
            history,
        };
        session.append(user_turn.clone());

        self.send(ConductorMessage::Turn { turn: user_turn }).await;
        self.send(ConductorMessage::Typing { active: true }).await;
        let result = self.remote.reply(&request).await;
        self.send(ConductorMessage::Typing { active: false }).await;

        match result {
            Ok(reply) => {
                self.append_turn(Turn::assistant(reply)).await;
                self.gate.finish_turn();
                self.reconcile_credits(true);
            }
            Err(e) if e.is_credit_denial() => {
                tracing::info!("Turn refused for lack of credits");
                if let Some(session) = self.session.as_mut() {
                    session.retract(&user_turn_id);
                }
                self.send(ConductorMessage::TurnRetracted { id: user_turn_id })
                    .await;
                self.gate.deny(content.clone());
                self.show_credit_popup(content).await;
                self.reconcile_credits(false);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Turn request failed");
                let apology = Turn::assistant(self.config.connection_apology.clone());
                self.append_turn(apology).await;
                self.gate.finish_turn();
            }
        }
    }

    async fn append_turn(&mut self, turn: Turn) {
        if let Some(session) = self.session.as_mut() {
            session.append(turn.clone());
        }
        self.speak(&turn.text);
        self.send(ConductorMessage::Turn { turn }).await;
    }

    fn speak(&self, text: &str) {
        let synthesizer: Arc<dyn SpeechSynthesizer> = self.remote.clone();
        self.playback.enqueue(speakable(text), synthesizer);
    }

    // ============================================
    // Credits
    // ============================================

    async fn show_credit_popup(&self, pending_input: String) {
        self.send(ConductorMessage::CreditPopup {
            pending_input,
            message: self.config.denial_apology.clone(),
        })
        .await;
    }

    async fn resend_pending(&mut self) {
        let Some(pending) = self.gate.pending_input().map(str::to_string) else {
            tracing::debug!("Nothing pending to resend");
            return;
        };
        if !self.ledger.spendable().can_send() {
            self.show_credit_popup(pending).await;
            return;
        }
        if let Some(pending) = self.gate.unblock() {
            self.handle_user_message(pending).await;
        }
    }

    async fn resolve_credits(&mut self, resolution: CreditResolution) {
        match resolution {
            CreditResolution::ViewSummary => {
                self.notify(
                    NotifyLevel::Info,
                    "Take a look back over this session. Add credits to keep talking.",
                )
                .await;
            }
            CreditResolution::EndSession => self.end_session().await,
            CreditResolution::PurchaseCredits(amount) => match self.ledger.purchase(amount).await {
                Ok(balance) => {
                    self.publish_balance(&balance).await;
                    self.notify(NotifyLevel::Info, &format!("{amount} credits added"))
                        .await;
                }
                Err(CreditError::InvalidAmount(_)) => {
                    self.notify(NotifyLevel::Warning, "Choose at least one credit")
                        .await;
                }
                Err(e) => {
                    tracing::warn!(amount, error = %e, "Credit purchase failed");
                    self.notify(NotifyLevel::Error, &format!("Purchase failed: {e}"))
                        .await;
                }
            },
        }
    }

    async fn upgrade(&mut self, tier: Tier) {
        match self.ledger.upgrade(tier).await {
            Ok(balance) => {
                self.publish_balance(&balance).await;
                self.notify(NotifyLevel::Info, &format!("Upgraded to {}", tier.as_str()))
                    .await;
            }
            Err(e) => {
                tracing::warn!(tier = tier.as_str(), error = %e, "Upgrade failed");
                self.notify(NotifyLevel::Error, &format!("Upgrade failed: {e}"))
                    .await;
            }
        }
    }

    async fn refresh_credits(&mut self) {
        match self.ledger.refresh().await {
            Ok(balance) => self.publish_balance(&balance).await,
            Err(e) => {
                tracing::warn!(error = %e, "Credit refresh failed");
                self.notify(NotifyLevel::Warning, "Could not refresh your credit balance")
                    .await;
            }
        }
    }

    /// Consume per policy, refresh, and publish, off the turn path
    ///
    /// Runs are chained so consumes reach the server in turn order. The
    /// credit is reserved before returning so the next turn is gated on it.
    fn reconcile_credits(&mut self, turn_succeeded: bool) {
        let consume = turn_succeeded
            && self.config.credit_consumption == CreditConsumption::ClientConsume
            && !self.ledger.snapshot().tier.bypasses_credit_check();
        if consume {
            self.ledger.reserve();
        }
        let ledger = Arc::clone(&self.ledger);
        let tx = self.tx.clone();
        let previous = self.reconcile.take();

        self.reconcile = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            if consume {
                if let Err(e) = ledger.consume_reserved().await {
                    tracing::warn!(error = %e, "Credit consume failed");
                }
            }
            let balance = match ledger.refresh().await {
                Ok(balance) => balance,
                Err(e) => {
                    tracing::warn!(error = %e, "Credit refresh failed");
                    ledger.snapshot()
                }
            };
            let msg = ConductorMessage::CreditsUpdated {
                display: balance.display(),
                balance: (*balance).clone(),
            };
            if let Err(e) = tx.send(msg).await {
                tracing::warn!("Failed to send message to surface: {}", e);
            }
        }));
    }

    /// Wait for outstanding credit reconciliation
    pub async fn settle(&mut self) {
        if let Some(handle) = self.reconcile.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Credit reconciliation task failed");
            }
        }
    }

    async fn publish_balance(&self, balance: &CreditBalance) {
        self.send(ConductorMessage::CreditsUpdated {
            display: balance.display(),
            balance: balance.clone(),
        })
        .await;
    }

    // ============================================
    // Shutdown
    // ============================================

    async fn logout(&mut self) {
        if self.session.is_some() {
            self.end_session().await;
        }
        self.stop_detection();
        self.playback.stop().await;
        self.detector.dispose().await;
        self.settle().await;
        self.set_state(ConductorState::SignedOut).await;
        self.send(ConductorMessage::LoggedOut).await;
    }

    /// Shut down the Conductor
    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        if self.state != ConductorState::SignedOut {
            self.logout().await;
        }
        Ok(())
    }

    /// Set state and notify UI
    async fn set_state(&mut self, state: ConductorState) {
        tracing::debug!(state = state.description(), "State change");
        self.state = state.clone();
        self.send(ConductorMessage::State { state }).await;
    }

    /// Send notification
    async fn notify(&self, level: NotifyLevel, message: &str) {
        self.send(ConductorMessage::Notify {
            level,
            message: message.to_string(),
        })
        .await;
    }

    /// Send a message to the UI surface
    async fn send(&self, msg: ConductorMessage) {
        if let Err(e) = self.tx.send(msg).await {
            tracing::warn!("Failed to send message to surface: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credits::BalanceReport;
    use crate::detector::{BlendshapeBackend, VideoFrame};
    use crate::playback::{AudioHandle, PlaybackError};
    use crate::remote::{AudioClip, ChatService, CreditService, SessionStore};
    use crate::session::{SessionRecord, SessionTranscript};
    use async_trait::async_trait;

    struct QuietRemote;

    #[async_trait]
    impl ChatService for QuietRemote {
        async fn reply(&self, _request: &ChatRequest) -> Result<String, RemoteError> {
            Ok("I hear you.".to_string())
        }
    }

    #[async_trait]
    impl CreditService for QuietRemote {
        async fn balance(&self) -> Result<BalanceReport, RemoteError> {
            Ok(BalanceReport::remaining(12))
        }
        async fn consume(&self) -> Result<BalanceReport, RemoteError> {
            Ok(BalanceReport::remaining(11))
        }
        async fn purchase(&self, amount: u32) -> Result<BalanceReport, RemoteError> {
            Ok(BalanceReport::remaining(amount))
        }
        async fn upgrade(&self, _tier: Tier) -> Result<BalanceReport, RemoteError> {
            Ok(BalanceReport::remaining(12))
        }
    }

    #[async_trait]
    impl SessionStore for QuietRemote {
        async fn create_session(
            &self,
            _category: Category,
        ) -> Result<Option<RemoteSessionId>, RemoteError> {
            Ok(None)
        }
        async fn end_session(&self, _id: RemoteSessionId) -> Result<(), RemoteError> {
            Ok(())
        }
        async fn list_sessions(&self) -> Result<Vec<SessionRecord>, RemoteError> {
            panic!("basic users never list sessions")
        }
        async fn fetch_session(&self, id: RemoteSessionId) -> Result<SessionTranscript, RemoteError> {
            Err(RemoteError::NotFound(id.to_string()))
        }
        async fn delete_session(&self, _id: RemoteSessionId) -> Result<(), RemoteError> {
            Ok(())
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for QuietRemote {
        async fn synthesize(&self, _text: &str) -> Result<AudioClip, RemoteError> {
            Ok(AudioClip {
                bytes: vec![0],
                mime: "audio/mpeg".to_string(),
            })
        }
    }

    struct NoCamera;

    #[async_trait]
    impl FrameSource for NoCamera {
        async fn next_frame(&self) -> Option<VideoFrame> {
            None
        }
    }

    struct Silent;

    #[async_trait]
    impl AudioOutput for Silent {
        async fn assign(&self, _clip: AudioClip) -> Result<AudioHandle, PlaybackError> {
            Ok(AudioHandle(1))
        }
        async fn play(&self, _handle: AudioHandle) -> Result<(), PlaybackError> {
            Ok(())
        }
        async fn stop(&self, _handle: AudioHandle) {}
        fn release(&self, _handle: AudioHandle) {}
    }

    fn conductor(
        tx: mpsc::Sender<ConductorMessage>,
    ) -> Conductor<QuietRemote, BlendshapeBackend> {
        Conductor::new(
            ConductorConfig::default(),
            Arc::new(QuietRemote),
            BlendshapeBackend::new(),
            Arc::new(NoCamera),
            Arc::new(Silent),
            tx,
        )
    }

    #[tokio::test]
    async fn test_conductor_creation() {
        let (tx, _rx) = mpsc::channel(100);
        let conductor = conductor(tx);

        assert_eq!(conductor.state(), &ConductorState::AwaitingPermission);
        assert!(conductor.session().is_none());
        assert!(!conductor.is_sampling());
    }

    #[tokio::test]
    async fn test_conductor_start_publishes_balance() {
        let (tx, mut rx) = mpsc::channel(100);
        let mut conductor = conductor(tx);
        conductor.start().await.unwrap();

        assert!(matches!(rx.recv().await.unwrap(), ConductorMessage::State { .. }));
        match rx.recv().await.unwrap() {
            ConductorMessage::CreditsUpdated { balance, .. } => assert_eq!(balance.remaining, 12),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_permission_granted_starts_detection() {
        let (tx, _rx) = mpsc::channel(100);
        let mut conductor = conductor(tx);
        conductor.handle_event(SurfaceEvent::PermissionGranted).await.unwrap();

        assert_eq!(conductor.state(), &ConductorState::Detecting);
        assert!(conductor.is_sampling());
        conductor.shutdown().await.unwrap();
        assert_eq!(conductor.state(), &ConductorState::SignedOut);
    }

    #[tokio::test]
    async fn test_basic_user_cannot_list_sessions() {
        let (tx, mut rx) = mpsc::channel(100);
        let mut conductor = conductor(tx);
        conductor.handle_event(SurfaceEvent::ListSessions).await.unwrap();

        match rx.recv().await.unwrap() {
            ConductorMessage::Notify { level, .. } => assert_eq!(level, NotifyLevel::Warning),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_message_without_session_is_refused() {
        let (tx, mut rx) = mpsc::channel(100);
        let mut conductor = conductor(tx);
        conductor
            .handle_event(SurfaceEvent::UserMessage {
                content: "hello".to_string(),
            })
            .await
            .unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            ConductorMessage::Notify {
                level: NotifyLevel::Warning,
                ..
            }
        ));
    }
}
