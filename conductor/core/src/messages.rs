//! Conductor Messages
//!
//! Messages sent from the Conductor to UI surfaces: state changes, popups,
//! turns, balances, and notifications.
//!
//! # Design Philosophy
//!
//! A surface that renders exactly what these messages say is a complete UI.
//! Nothing here requires the surface to know the credit rules, the session
//! lifecycle, or how verdicts are computed.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregator::Verdict;
use crate::category::Category;
use crate::credits::{BalanceDisplay, CreditBalance};
use crate::detector::AdapterState;
use crate::emotion::EmotionSample;
use crate::session::{
    Persistence, RemoteSessionId, SessionRecord, SessionSummary, Turn, TurnId,
};

/// Messages from Conductor to UI surface
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConductorMessage {
    // ============================================
    // State
    // ============================================
    /// Orchestrator state changed
    State {
        /// New state
        state: ConductorState,
    },

    /// Detector lifecycle update
    DetectorStatus {
        /// Adapter state
        state: AdapterState,
        /// Backend name
        backend: String,
        /// Failure reason, if setup failed
        failure: Option<String>,
    },

    // ============================================
    // Detection
    // ============================================
    /// Live per-frame sample
    Sample {
        /// The sample
        sample: EmotionSample,
    },

    /// A verdict is ready; offer a session
    VerdictPopup {
        /// The verdict
        verdict: Verdict,
        /// Invitation text for the dominant label
        invitation: String,
        /// Categories to choose from
        categories: Vec<Category>,
    },

    // ============================================
    // Conversation
    // ============================================
    /// A session opened
    SessionStarted {
        /// Local session id
        local_id: Uuid,
        /// Topic
        category: Category,
        /// Storage mode
        persistence: Persistence,
    },

    /// A turn was added
    Turn {
        /// The turn
        turn: Turn,
    },

    /// A user turn was taken back after the server refused it
    TurnRetracted {
        /// The retracted turn
        id: TurnId,
    },

    /// Reply in progress indicator
    Typing {
        /// Whether a reply is pending
        active: bool,
    },

    /// Out of credits; offer summary, end, or purchase
    CreditPopup {
        /// Input held until credits are available
        pending_input: String,
        /// Text to show
        message: String,
    },

    /// A session closed
    SessionEnded {
        /// Local record of it
        summary: SessionSummary,
    },

    // ============================================
    // Account
    // ============================================
    /// Balance changed
    CreditsUpdated {
        /// Authoritative balance
        balance: CreditBalance,
        /// Derived display values
        display: BalanceDisplay,
    },

    /// Signed out
    LoggedOut,

    // ============================================
    // Past Sessions
    // ============================================
    /// Stored sessions, newest first
    SessionList {
        /// Sessions
        sessions: Vec<SessionRecord>,
    },

    /// A stored session replaced the live turn list
    SessionRestored {
        /// Restored session
        remote_id: RemoteSessionId,
        /// Topic
        category: Category,
        /// Every stored turn
        turns: Vec<Turn>,
    },

    /// A stored session was deleted
    SessionDeleted {
        /// Deleted session
        id: RemoteSessionId,
    },

    // ============================================
    // Notifications
    // ============================================
    /// Something the user should know
    Notify {
        /// Severity
        level: NotifyLevel,
        /// Text
        message: String,
    },
}

/// Why the conductor cannot detect
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// Camera permission refused
    CameraDenied,
    /// Detector setup failed or timed out
    DetectorUnavailable,
}

/// Orchestrator state
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConductorState {
    /// Waiting for camera permission
    AwaitingPermission,
    /// Cannot proceed until the user acts
    Blocked {
        /// What is missing
        reason: BlockReason,
    },
    /// Sampling frames toward a verdict
    Detecting,
    /// Verdict shown; detection paused
    VerdictPopup {
        /// The verdict on screen
        verdict: Verdict,
    },
    /// Conversation in progress
    SessionActive,
    /// Conversation over; summary available
    SessionEnded,
    /// Signed out; nothing further happens
    SignedOut,
}

impl ConductorState {
    /// Short description for status lines
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::AwaitingPermission => "Waiting for camera",
            Self::Blocked {
                reason: BlockReason::CameraDenied,
            } => "Camera access needed",
            Self::Blocked {
                reason: BlockReason::DetectorUnavailable,
            } => "Detector unavailable",
            Self::Detecting => "Reading your expression",
            Self::VerdictPopup { .. } => "Ready to talk?",
            Self::SessionActive => "In session",
            Self::SessionEnded => "Session ended",
            Self::SignedOut => "Signed out",
        }
    }
}

/// Notification severity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyLevel {
    /// Informational
    Info,
    /// Something was refused or degraded
    Warning,
    /// An operation failed
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_wire_format() {
        let json = serde_json::to_value(ConductorMessage::State {
            state: ConductorState::Blocked {
                reason: BlockReason::DetectorUnavailable,
            },
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "state",
                "state": {"state": "blocked", "reason": "detector_unavailable"}
            })
        );
    }

    #[test]
    fn test_descriptions_nonempty() {
        for state in [
            ConductorState::AwaitingPermission,
            ConductorState::Detecting,
            ConductorState::SessionActive,
            ConductorState::SessionEnded,
            ConductorState::SignedOut,
        ] {
            assert!(!state.description().is_empty());
        }
    }
}
