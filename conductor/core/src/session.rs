//! Session Management
//!
//! A session is one conversation opened from a category. It owns the ordered
//! turn list; turns are immutable once appended.
//!
//! # Design Philosophy
//!
//! Basic accounts get ephemeral sessions that live only in memory and send
//! their recent history with each turn. Pro accounts get a server-side id;
//! the server keeps the history and restoring a session replaces the local
//! turn list wholesale with the server's copy.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::category::Category;
use crate::emotion::EmotionLabel;

/// Server-side session identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteSessionId(pub i64);

impl fmt::Display for RemoteSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Turn identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(pub String);

impl TurnId {
    /// Generate a new unique local turn ID
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        Self(format!("turn_{id}"))
    }

    /// ID for a turn loaded from the server
    #[must_use]
    pub fn remote(id: i64) -> Self {
        Self(format!("remote_{id}"))
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

/// Who produced a turn
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// The person in the session
    User,
    /// The therapist reply
    Assistant,
}

/// One message in a session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Unique turn ID
    pub id: TurnId,
    /// Author
    pub role: TurnRole,
    /// Message text
    pub text: String,
    /// When the turn was created
    pub created_at: DateTime<Utc>,
    /// Latest verdict when the turn was sent, if any
    pub emotion: Option<EmotionLabel>,
}

impl Turn {
    /// Create a turn stamped now
    pub fn new(role: TurnRole, text: impl Into<String>) -> Self {
        Self {
            id: TurnId::new(),
            role,
            text: text.into(),
            created_at: Utc::now(),
            emotion: None,
        }
    }

    /// User turn
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(TurnRole::User, text)
    }

    /// Assistant turn
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, text)
    }

    /// Tag the turn with an emotion
    #[must_use]
    pub fn with_emotion(mut self, emotion: Option<EmotionLabel>) -> Self {
        self.emotion = emotion;
        self
    }
}

/// Where a session's turns live
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persistence {
    /// Memory only; history is resent with each turn
    Ephemeral,
    /// Stored by the server under a remote id
    Persisted,
}

/// A conversation session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    /// Local identifier, always present
    pub local_id: Uuid,
    /// Server identifier, present iff persisted
    pub remote_id: Option<RemoteSessionId>,
    /// Topic
    pub category: Category,
    /// When the session started
    pub started_at: DateTime<Utc>,
    /// When the session ended
    pub ended_at: Option<DateTime<Utc>>,
    /// Whether the session accepts turns
    pub is_active: bool,
    turns: Vec<Turn>,
}

impl Session {
    /// New in-memory session
    #[must_use]
    pub fn ephemeral(category: Category) -> Self {
        Self {
            local_id: Uuid::new_v4(),
            remote_id: None,
            category,
            started_at: Utc::now(),
            ended_at: None,
            is_active: true,
            turns: Vec::new(),
        }
    }

    /// New session stored server-side under `remote_id`
    #[must_use]
    pub fn persisted(category: Category, remote_id: RemoteSessionId) -> Self {
        Self {
            remote_id: Some(remote_id),
            ..Self::ephemeral(category)
        }
    }

    /// Storage mode
    #[must_use]
    pub fn persistence(&self) -> Persistence {
        if self.remote_id.is_some() {
            Persistence::Persisted
        } else {
            Persistence::Ephemeral
        }
    }

    /// Turns in order
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns
    #[must_use]
    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    /// Append a turn
    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Remove the last turn if it has `id`
    ///
    /// Used to take back a user turn the server refused.
    pub fn retract(&mut self, id: &TurnId) -> Option<Turn> {
        if self.turns.last().is_some_and(|t| &t.id == id) {
            self.turns.pop()
        } else {
            None
        }
    }

    /// Replace every turn and the remote id at once
    pub fn replace(&mut self, remote_id: RemoteSessionId, turns: Vec<Turn>) {
        self.remote_id = Some(remote_id);
        self.turns = turns;
    }

    /// The last `limit` turns, oldest first
    #[must_use]
    pub fn recent(&self, limit: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(limit);
        &self.turns[start..]
    }

    /// Close the session and summarize it
    pub fn end(&mut self) -> SessionSummary {
        let ended_at = self.ended_at.unwrap_or_else(Utc::now);
        self.ended_at = Some(ended_at);
        self.is_active = false;
        SessionSummary {
            local_id: self.local_id,
            remote_id: self.remote_id,
            category: self.category,
            started_at: self.started_at,
            ended_at,
            duration_minutes: (ended_at - self.started_at).num_minutes().max(0),
            turns: self.turns.clone(),
        }
    }
}

/// Local record of a finished session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Local identifier
    pub local_id: Uuid,
    /// Server identifier, if the session was persisted
    pub remote_id: Option<RemoteSessionId>,
    /// Topic
    pub category: Category,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// End time
    pub ended_at: DateTime<Utc>,
    /// Whole minutes elapsed
    pub duration_minutes: i64,
    /// Every turn exchanged
    pub turns: Vec<Turn>,
}

/// Past session as listed by the server
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Server identifier
    pub id: RemoteSessionId,
    /// Stored title
    pub title: Option<String>,
    /// Start time
    pub started_at: Option<DateTime<Utc>>,
    /// End time
    pub ended_at: Option<DateTime<Utc>>,
    /// Whether the server still considers it live
    pub is_active: bool,
    /// Number of stored messages
    pub message_count: u32,
}

impl SessionRecord {
    /// Category inferred from the stored title
    #[must_use]
    pub fn category(&self) -> Category {
        self.title
            .as_deref()
            .map(Category::from_session_title)
            .unwrap_or_default()
    }
}

/// A stored session with its messages
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionTranscript {
    /// Session metadata
    pub record: SessionRecord,
    /// Messages in creation order
    pub turns: Vec<Turn>,
}
