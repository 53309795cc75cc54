//! Session Gate
//!
//! Decides whether a turn may go out, and opens and closes sessions against
//! the session store.
//!
//! ```text
//!   Idle ──begin_turn──► CheckingAuthorization ──authorized──► Sending ──finish──► Idle
//!                                 │
//!                                 └──denied──► Blocked { pending_input }
//!                                                 │
//!                     PurchaseCredits / upgrade ──┴──► Idle (pending input handed back)
//! ```
//!
//! Authorization is evaluated locally before any remote call: pro tiers
//! always pass, basic passes while `remaining > 0`. A server-side denial
//! while Sending lands in the same Blocked state.

use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::credits::{CreditBalance, Tier};
use crate::remote::SessionStore;
use crate::session::{Session, SessionSummary};

/// Where the current turn is
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TurnState {
    /// Ready for input
    Idle,
    /// Evaluating the balance
    CheckingAuthorization,
    /// Request in flight
    Sending,
    /// Out of credits; the unsent input is kept
    Blocked {
        /// Text the user tried to send
        pending_input: String,
    },
}

/// Outcome of asking to send
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    /// Go ahead
    Authorized,
    /// Show the credit popup
    Denied,
    /// Another turn is still in flight
    Busy,
}

impl GateDecision {
    /// Whether the turn may be sent
    #[must_use]
    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::Authorized)
    }
}

/// Choices offered by the credit popup
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "choice", content = "amount", rename_all = "snake_case")]
pub enum CreditResolution {
    /// Close the popup and look back over the session
    ViewSummary,
    /// End the session now
    EndSession,
    /// Buy this many credits
    PurchaseCredits(u32),
}

/// Per-session turn gate
#[derive(Clone, Debug)]
pub struct SessionGate {
    state: TurnState,
}

impl SessionGate {
    /// Idle gate
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: TurnState::Idle,
        }
    }

    /// Pure authorization rule
    #[must_use]
    pub fn authorize(balance: &CreditBalance) -> GateDecision {
        if balance.can_send() {
            GateDecision::Authorized
        } else {
            GateDecision::Denied
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> &TurnState {
        &self.state
    }

    /// Whether the gate is Blocked
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self.state, TurnState::Blocked { .. })
    }

    /// Unsent input held while Blocked
    #[must_use]
    pub fn pending_input(&self) -> Option<&str> {
        match &self.state {
            TurnState::Blocked { pending_input } => Some(pending_input),
            _ => None,
        }
    }

    /// Ask to send `input` against `balance`
    pub fn begin_turn(&mut self, input: &str, balance: &CreditBalance) -> GateDecision {
        if matches!(self.state, TurnState::Sending | TurnState::CheckingAuthorization) {
            return GateDecision::Busy;
        }

        self.state = TurnState::CheckingAuthorization;
        let decision = Self::authorize(balance);
        self.state = match decision {
            GateDecision::Authorized => TurnState::Sending,
            _ => TurnState::Blocked {
                pending_input: input.to_string(),
            },
        };
        decision
    }

    /// The in-flight turn completed (success or non-credit failure)
    pub fn finish_turn(&mut self) {
        if self.state == TurnState::Sending {
            self.state = TurnState::Idle;
        }
    }

    /// The server refused the in-flight turn for lack of credits
    pub fn deny(&mut self, pending_input: impl Into<String>) {
        self.state = TurnState::Blocked {
            pending_input: pending_input.into(),
        };
    }

    /// Leave Blocked after credits were added; returns the held input
    pub fn unblock(&mut self) -> Option<String> {
        match std::mem::replace(&mut self.state, TurnState::Idle) {
            TurnState::Blocked { pending_input } => Some(pending_input),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Return to Idle, dropping any held input
    pub fn reset(&mut self) {
        self.state = TurnState::Idle;
    }

    /// Open a session for `tier`
    ///
    /// Persisting tiers ask the store for an id; if that fails the session
    /// still opens, ephemerally.
    pub async fn open_session<S: SessionStore + ?Sized>(
        store: &S,
        tier: Tier,
        category: Category,
    ) -> Session {
        if !tier.persists_sessions() {
            return Session::ephemeral(category);
        }
        match store.create_session(category).await {
            Ok(Some(id)) => {
                tracing::info!(session_id = %id, category = %category, "Persisted session opened");
                Session::persisted(category, id)
            }
            Ok(None) => {
                tracing::warn!(category = %category, "Server declined to persist session");
                Session::ephemeral(category)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Session create failed, continuing without persistence");
                Session::ephemeral(category)
            }
        }
    }

    /// End `session`; the remote end is best-effort
    pub async fn close_session<S: SessionStore + ?Sized>(
        store: &S,
        session: &mut Session,
    ) -> SessionSummary {
        if let Some(id) = session.remote_id {
            if let Err(e) = store.end_session(id).await {
                tracing::warn!(session_id = %id, error = %e, "Failed to end remote session");
            }
        }
        session.end()
    }
}

impl Default for SessionGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteError;
    use crate::session::{Persistence, RemoteSessionId, SessionRecord, SessionTranscript};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    fn balance(remaining: u32, tier: Tier) -> CreditBalance {
        CreditBalance {
            remaining,
            lifetime_purchased: 0,
            tier,
        }
    }

    #[test]
    fn test_authorize_by_tier() {
        assert_eq!(SessionGate::authorize(&balance(1, Tier::Basic)), GateDecision::Authorized);
        assert_eq!(SessionGate::authorize(&balance(0, Tier::Basic)), GateDecision::Denied);
        assert_eq!(SessionGate::authorize(&balance(0, Tier::Pro)), GateDecision::Authorized);
        assert_eq!(SessionGate::authorize(&balance(0, Tier::ProPlus)), GateDecision::Authorized);
    }

    #[test]
    fn test_turn_lifecycle() {
        let mut gate = SessionGate::new();
        assert_eq!(gate.begin_turn("hi", &balance(3, Tier::Basic)), GateDecision::Authorized);
        assert_eq!(gate.state(), &TurnState::Sending);
        assert_eq!(gate.begin_turn("again", &balance(3, Tier::Basic)), GateDecision::Busy);
        gate.finish_turn();
        assert_eq!(gate.state(), &TurnState::Idle);
    }

    #[test]
    fn test_denial_preserves_input() {
        let mut gate = SessionGate::new();
        assert_eq!(gate.begin_turn("I feel stuck", &balance(0, Tier::Basic)), GateDecision::Denied);
        assert_eq!(gate.pending_input(), Some("I feel stuck"));

        // retrying while blocked re-evaluates
        assert_eq!(gate.begin_turn("I feel stuck", &balance(0, Tier::Basic)), GateDecision::Denied);
        assert_eq!(gate.unblock().as_deref(), Some("I feel stuck"));
        assert_eq!(gate.state(), &TurnState::Idle);
        assert!(gate.unblock().is_none());
    }

    #[test]
    fn test_server_denial_blocks() {
        let mut gate = SessionGate::new();
        gate.begin_turn("hello", &balance(1, Tier::Basic));
        gate.deny("hello");
        assert!(gate.is_blocked());
        // finish does not clear a block
        gate.finish_turn();
        assert!(gate.is_blocked());
    }

    #[test]
    fn test_resolution_wire_shape() {
        let json = serde_json::to_value(CreditResolution::PurchaseCredits(5)).unwrap();
        assert_eq!(json, serde_json::json!({"choice": "purchase_credits", "amount": 5}));
    }

    #[derive(Default)]
    struct FakeStore {
        create: Mutex<Option<Result<Option<RemoteSessionId>, ()>>>,
        ended: Mutex<Vec<RemoteSessionId>>,
        fail_end: bool,
    }

    #[async_trait]
    impl SessionStore for FakeStore {
        async fn create_session(
            &self,
            _category: Category,
        ) -> Result<Option<RemoteSessionId>, RemoteError> {
            match self.create.lock().take() {
                Some(Ok(id)) => Ok(id),
                Some(Err(())) => Err(RemoteError::Status {
                    status: 500,
                    body: String::new(),
                }),
                None => panic!("create_session not expected"),
            }
        }

        async fn end_session(&self, id: RemoteSessionId) -> Result<(), RemoteError> {
            self.ended.lock().push(id);
            if self.fail_end {
                return Err(RemoteError::NotFound("gone".to_string()));
            }
            Ok(())
        }

        async fn list_sessions(&self) -> Result<Vec<SessionRecord>, RemoteError> {
            Ok(Vec::new())
        }

        async fn fetch_session(&self, id: RemoteSessionId) -> Result<SessionTranscript, RemoteError> {
            Err(RemoteError::NotFound(id.to_string()))
        }

        async fn delete_session(&self, _id: RemoteSessionId) -> Result<(), RemoteError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_basic_sessions_never_touch_store() {
        let store = FakeStore::default();
        let session = SessionGate::open_session(&store, Tier::Basic, Category::CareerJobs).await;
        assert_eq!(session.persistence(), Persistence::Ephemeral);
    }

    #[tokio::test]
    async fn test_pro_session_gets_remote_id() {
        let store = FakeStore::default();
        *store.create.lock() = Some(Ok(Some(RemoteSessionId(41))));
        let session = SessionGate::open_session(&store, Tier::Pro, Category::default()).await;
        assert_eq!(session.remote_id, Some(RemoteSessionId(41)));
    }

    #[tokio::test]
    async fn test_create_failure_falls_back_to_ephemeral() {
        let store = FakeStore::default();
        *store.create.lock() = Some(Err(()));
        let session = SessionGate::open_session(&store, Tier::ProPlus, Category::default()).await;
        assert_eq!(session.persistence(), Persistence::Ephemeral);
        assert!(session.is_active);
    }

    #[tokio::test]
    async fn test_close_keeps_summary_when_remote_end_fails() {
        let store = FakeStore {
            fail_end: true,
            ..FakeStore::default()
        };
        let mut session = Session::persisted(Category::Relationship, RemoteSessionId(9));
        let summary = SessionGate::close_session(&store, &mut session).await;

        assert_eq!(store.ended.lock().as_slice(), &[RemoteSessionId(9)]);
        assert_eq!(summary.remote_id, Some(RemoteSessionId(9)));
        assert!(!session.is_active);
    }
}
