//! In-memory fakes shared by the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use puresoul_core::detector::{ModelManifest, ModelProbe};
use puresoul_core::remote::{
    AudioClip, ChatRequest, ChatService, CreditService, SessionStore, SpeechSynthesizer,
};
use puresoul_core::{
    AudioHandle, AudioOutput, BackendKind, BalanceReport, Category, Conductor, ConductorConfig,
    ConductorMessage, DetectorError, EmotionLabel, ExpressionBackend, FrameFeatures, FrameSource,
    PlaybackError, RemoteError, RemoteSessionId, SessionRecord, SessionTranscript, Tier, Turn,
    VideoFrame,
};

// ============================================================================
// Remote
// ============================================================================

/// Scripted outcome of one chat call
#[derive(Clone, Debug)]
pub enum Reply {
    Text(String),
    Deny,
    Fail,
}

/// Server stand-in with its own balance, session table, and call log
pub struct FakeRemote {
    pub remaining: Mutex<u32>,
    pub tier: Mutex<Tier>,
    pub purchased: Mutex<u32>,
    pub replies: Mutex<VecDeque<Reply>>,
    pub chat_requests: Mutex<Vec<ChatRequest>>,
    pub consumes: AtomicUsize,
    pub created: Mutex<Vec<Category>>,
    pub ended: Mutex<Vec<RemoteSessionId>>,
    pub deleted: Mutex<Vec<RemoteSessionId>>,
    pub fetched: Mutex<Vec<RemoteSessionId>>,
    pub list_calls: AtomicUsize,
    pub transcripts: Mutex<HashMap<i64, SessionTranscript>>,
    pub synthesized: Mutex<Vec<String>>,
    next_session: AtomicI64,
}

impl FakeRemote {
    pub fn with_credits(remaining: u32) -> Self {
        Self {
            remaining: Mutex::new(remaining),
            tier: Mutex::new(Tier::Basic),
            purchased: Mutex::new(0),
            replies: Mutex::new(VecDeque::new()),
            chat_requests: Mutex::new(Vec::new()),
            consumes: AtomicUsize::new(0),
            created: Mutex::new(Vec::new()),
            ended: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            fetched: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            transcripts: Mutex::new(HashMap::new()),
            synthesized: Mutex::new(Vec::new()),
            next_session: AtomicI64::new(100),
        }
    }

    pub fn pro() -> Self {
        let remote = Self::with_credits(0);
        *remote.tier.lock() = Tier::Pro;
        remote
    }

    pub fn script(&self, reply: Reply) {
        self.replies.lock().push_back(reply);
    }

    /// Store one exchange under `id`, the way the server's message table does
    fn save_exchange(&self, id: RemoteSessionId, user_message: &str, reply: &str) {
        let mut transcripts = self.transcripts.lock();
        let Some(transcript) = transcripts.get_mut(&id.0) else {
            return;
        };
        transcript.turns.push(Turn::user(user_message));
        transcript.turns.push(Turn::assistant(reply));
        transcript.record.message_count += 2;
    }

    fn report(&self) -> BalanceReport {
        BalanceReport {
            remaining: *self.remaining.lock(),
            lifetime_purchased: Some(*self.purchased.lock()),
            tier: Some(*self.tier.lock()),
        }
    }
}

#[async_trait]
impl ChatService for FakeRemote {
    async fn reply(&self, request: &ChatRequest) -> Result<String, RemoteError> {
        self.chat_requests.lock().push(request.clone());
        let scripted = self.replies.lock().pop_front();
        let reply = match scripted {
            Some(Reply::Text(text)) => text,
            Some(Reply::Deny) => return Err(RemoteError::CreditsExhausted),
            Some(Reply::Fail) => {
                return Err(RemoteError::Status {
                    status: 502,
                    body: "bad gateway".to_string(),
                })
            }
            None => format!("You said: {}", request.user_message),
        };
        if let Some(id) = request.session_id {
            self.save_exchange(id, &request.user_message, &reply);
        }
        Ok(reply)
    }
}

#[async_trait]
impl CreditService for FakeRemote {
    async fn balance(&self) -> Result<BalanceReport, RemoteError> {
        Ok(self.report())
    }

    async fn consume(&self) -> Result<BalanceReport, RemoteError> {
        self.consumes.fetch_add(1, Ordering::SeqCst);
        {
            let mut remaining = self.remaining.lock();
            if *remaining == 0 {
                return Err(RemoteError::CreditsExhausted);
            }
            *remaining -= 1;
        }
        Ok(BalanceReport::remaining(*self.remaining.lock()))
    }

    async fn purchase(&self, amount: u32) -> Result<BalanceReport, RemoteError> {
        *self.remaining.lock() += amount;
        *self.purchased.lock() += amount;
        Ok(self.report())
    }

    async fn upgrade(&self, tier: Tier) -> Result<BalanceReport, RemoteError> {
        *self.tier.lock() = tier;
        Ok(self.report())
    }
}

#[async_trait]
impl SessionStore for FakeRemote {
    async fn create_session(
        &self,
        category: Category,
    ) -> Result<Option<RemoteSessionId>, RemoteError> {
        self.created.lock().push(category);
        let id = RemoteSessionId(self.next_session.fetch_add(1, Ordering::SeqCst));
        self.transcripts.lock().insert(
            id.0,
            SessionTranscript {
                record: SessionRecord {
                    id,
                    title: Some(category.session_title()),
                    started_at: Some(chrono::Utc::now()),
                    ended_at: None,
                    is_active: true,
                    message_count: 0,
                },
                turns: Vec::new(),
            },
        );
        Ok(Some(id))
    }

    async fn end_session(&self, id: RemoteSessionId) -> Result<(), RemoteError> {
        self.ended.lock().push(id);
        if let Some(transcript) = self.transcripts.lock().get_mut(&id.0) {
            transcript.record.is_active = false;
            transcript.record.ended_at = Some(chrono::Utc::now());
        }
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, RemoteError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .transcripts
            .lock()
            .values()
            .map(|t| t.record.clone())
            .collect())
    }

    async fn fetch_session(&self, id: RemoteSessionId) -> Result<SessionTranscript, RemoteError> {
        self.fetched.lock().push(id);
        self.transcripts
            .lock()
            .get(&id.0)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("session {id}")))
    }

    async fn delete_session(&self, id: RemoteSessionId) -> Result<(), RemoteError> {
        self.deleted.lock().push(id);
        match self.transcripts.lock().remove(&id.0) {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound(format!("session {id}"))),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeRemote {
    async fn synthesize(&self, text: &str) -> Result<AudioClip, RemoteError> {
        self.synthesized.lock().push(text.to_string());
        Ok(AudioClip {
            bytes: text.as_bytes().to_vec(),
            mime: "audio/mpeg".to_string(),
        })
    }
}

// ============================================================================
// Audio
// ============================================================================

/// Audio output that records what it was asked to do
///
/// Clip bytes are treated as the spoken text.
#[derive(Default)]
pub struct RecordingOutput {
    next: AtomicU64,
    clips: Mutex<HashMap<u64, String>>,
    pub played: Mutex<Vec<String>>,
    pub stopped: Mutex<Vec<AudioHandle>>,
    pub released: Mutex<Vec<AudioHandle>>,
    pub assigned: AtomicUsize,
    playing: AtomicUsize,
    pub max_concurrent: AtomicUsize,
    pub play_time: Mutex<Duration>,
    /// Clips with this text never finish
    pub hang_on: Mutex<Option<String>>,
    /// Clips with this text fail to play
    pub fail_on: Mutex<Option<String>>,
}

impl RecordingOutput {
    pub fn with_play_time(play_time: Duration) -> Self {
        let output = Self::default();
        *output.play_time.lock() = play_time;
        output
    }

    pub fn text_of(&self, handle: AudioHandle) -> String {
        self.clips.lock().get(&handle.0).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl AudioOutput for RecordingOutput {
    async fn assign(&self, clip: AudioClip) -> Result<AudioHandle, PlaybackError> {
        let handle = AudioHandle(self.next.fetch_add(1, Ordering::SeqCst));
        let text = String::from_utf8(clip.bytes).map_err(|e| PlaybackError::Rejected(e.to_string()))?;
        self.clips.lock().insert(handle.0, text);
        self.assigned.fetch_add(1, Ordering::SeqCst);
        Ok(handle)
    }

    async fn play(&self, handle: AudioHandle) -> Result<(), PlaybackError> {
        let text = self.text_of(handle);
        let now = self.playing.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);

        let hang = self.hang_on.lock().as_deref() == Some(text.as_str());
        let fail = self.fail_on.lock().as_deref() == Some(text.as_str());
        let play_time = *self.play_time.lock();

        let result = if hang {
            std::future::pending::<()>().await;
            Ok(())
        } else if fail {
            Err(PlaybackError::Failed("decoder error".to_string()))
        } else {
            tokio::time::sleep(play_time).await;
            self.played.lock().push(text);
            Ok(())
        };

        self.playing.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn stop(&self, handle: AudioHandle) {
        self.playing.store(0, Ordering::SeqCst);
        self.stopped.lock().push(handle);
    }

    fn release(&self, handle: AudioHandle) {
        self.released.lock().push(handle);
    }
}

// ============================================================================
// Detection
// ============================================================================

/// Camera that shows a scripted sequence of expressions, then nothing
#[derive(Default)]
pub struct ScriptedFrames {
    labels: Mutex<VecDeque<EmotionLabel>>,
}

impl ScriptedFrames {
    pub fn new(labels: impl IntoIterator<Item = EmotionLabel>) -> Self {
        Self {
            labels: Mutex::new(labels.into_iter().collect()),
        }
    }

    pub fn push(&self, labels: impl IntoIterator<Item = EmotionLabel>) {
        self.labels.lock().extend(labels);
    }
}

#[async_trait]
impl FrameSource for ScriptedFrames {
    async fn next_frame(&self) -> Option<VideoFrame> {
        let label = self.labels.lock().pop_front()?;
        Some(VideoFrame::new(
            640,
            480,
            FrameFeatures::Expressions(vec![
                ("neutral".to_string(), 0.05),
                (label.as_str().to_string(), 0.9),
            ]),
        ))
    }
}

/// Model host that is either up or down
pub struct FakeProbe {
    pub healthy: AtomicBool,
}

impl FakeProbe {
    pub fn up() -> Self {
        Self {
            healthy: AtomicBool::new(true),
        }
    }

    pub fn down() -> Self {
        Self {
            healthy: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ModelProbe for FakeProbe {
    async fn reachable(&self, url: &str) -> Result<(), DetectorError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DetectorError::Unreachable {
                location: url.to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }

    async fn fetch_manifest(&self, _url: &str) -> Result<ModelManifest, DetectorError> {
        Ok(ModelManifest {
            shards: vec!["shard1".to_string()],
        })
    }
}

// ============================================================================
// Harness
// ============================================================================

pub type TestConductor = Conductor<FakeRemote, ExpressionBackend>;

/// Fast detection settings
pub fn test_config() -> ConductorConfig {
    ConductorConfig {
        window_size: 3,
        tick_interval_ms: 5,
        init_timeout_secs: 2,
        playback_timeout_secs: 2,
        detector: BackendKind::Expression,
        ..ConductorConfig::default()
    }
}

pub struct Harness {
    pub conductor: TestConductor,
    pub remote: Arc<FakeRemote>,
    pub output: Arc<RecordingOutput>,
    pub frames: Arc<ScriptedFrames>,
    pub probe: Arc<FakeProbe>,
    pub rx: mpsc::Receiver<ConductorMessage>,
}

impl Harness {
    pub fn new(remote: FakeRemote) -> Self {
        Self::with_config(remote, test_config())
    }

    pub fn with_config(remote: FakeRemote, config: ConductorConfig) -> Self {
        let remote = Arc::new(remote);
        let output = Arc::new(RecordingOutput::default());
        let frames = Arc::new(ScriptedFrames::default());
        let probe = Arc::new(FakeProbe::up());
        let (tx, rx) = mpsc::channel(1024);

        let conductor = Conductor::new(
            config,
            Arc::clone(&remote),
            ExpressionBackend::new(probe.clone()),
            frames.clone(),
            output.clone(),
            tx,
        );

        Self {
            conductor,
            remote,
            output,
            frames,
            probe,
            rx,
        }
    }

    /// Everything sent to the surface so far
    pub fn drain(&mut self) -> Vec<ConductorMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }
}
