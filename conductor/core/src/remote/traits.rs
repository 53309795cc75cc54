//! Remote Service Traits
//!
//! Everything the core needs from the backend service, split by concern so
//! each component depends only on what it calls.
//!
//! # Design Philosophy
//!
//! The orchestrator never builds URLs or parses JSON. It talks to these
//! traits; [`HttpRemote`](super::HttpRemote) is one implementation and the
//! test suites provide in-memory ones.

use async_trait::async_trait;

use super::RemoteError;
use crate::category::Category;
use crate::credits::{BalanceReport, Tier};
use crate::session::{RemoteSessionId, SessionRecord, SessionTranscript, TurnRole};

/// Prior turn sent with an ephemeral session's request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Author
    pub role: TurnRole,
    /// Text
    pub text: String,
}

/// One conversational turn request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatRequest {
    /// The new user message
    pub user_message: String,
    /// Session topic
    pub category: Category,
    /// Server id for persisted sessions
    pub session_id: Option<RemoteSessionId>,
    /// Recent turns for ephemeral sessions (empty when persisted)
    pub history: Vec<HistoryEntry>,
}

/// Synthesized speech
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioClip {
    /// Encoded audio
    pub bytes: Vec<u8>,
    /// MIME type, e.g. `audio/mpeg`
    pub mime: String,
}

/// Conversational reply generation
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Get the therapist reply for a turn
    ///
    /// Returns [`RemoteError::CreditsExhausted`] when the server refuses the
    /// turn for lack of credits.
    async fn reply(&self, request: &ChatRequest) -> Result<String, RemoteError>;
}

/// Server-side credit balance
#[async_trait]
pub trait CreditService: Send + Sync {
    /// Read the balance
    async fn balance(&self) -> Result<BalanceReport, RemoteError>;

    /// Spend one credit
    async fn consume(&self) -> Result<BalanceReport, RemoteError>;

    /// Add `amount` credits
    async fn purchase(&self, amount: u32) -> Result<BalanceReport, RemoteError>;

    /// Move to `tier`
    async fn upgrade(&self, tier: Tier) -> Result<BalanceReport, RemoteError>;
}

/// Persisted session storage
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Open a session; `None` means the account does not persist sessions
    async fn create_session(
        &self,
        category: Category,
    ) -> Result<Option<RemoteSessionId>, RemoteError>;

    /// Mark a session ended
    async fn end_session(&self, id: RemoteSessionId) -> Result<(), RemoteError>;

    /// Past sessions, newest first
    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, RemoteError>;

    /// One session with its messages
    async fn fetch_session(&self, id: RemoteSessionId) -> Result<SessionTranscript, RemoteError>;

    /// Delete a session and its messages
    async fn delete_session(&self, id: RemoteSessionId) -> Result<(), RemoteError>;
}

/// Text-to-speech
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Render `text` to audio
    async fn synthesize(&self, text: &str) -> Result<AudioClip, RemoteError>;
}

/// Every remote concern in one bound
pub trait Remote: ChatService + CreditService + SessionStore + SpeechSynthesizer {}

impl<T> Remote for T where T: ChatService + CreditService + SessionStore + SpeechSynthesizer {}
