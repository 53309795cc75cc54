//! Surface Events
//!
//! Events sent from UI surfaces to the Conductor. These represent all the ways
//! a surface can report user actions and device changes.
//!
//! # Design Philosophy
//!
//! Surfaces are renderers. They report what the user did ("tapped a
//! category", "typed a message") and never decide what happens next. The
//! Conductor owns every transition.

use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::credits::Tier;
use crate::gate::CreditResolution;
use crate::session::RemoteSessionId;

/// Events from a UI surface to the Conductor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SurfaceEvent {
    // ============================================
    // Camera & Detection
    // ============================================
    /// Camera access granted; bring the detector up
    PermissionGranted,

    /// Camera access refused or revoked
    PermissionDenied,

    /// Retry detector setup after a failure
    RetryDetector,

    /// Go back to watching for a verdict (after a session ended)
    ResumeDetection,

    // ============================================
    // Verdict Popup
    // ============================================
    /// User picked a category from the popup
    CategorySelected {
        /// Chosen topic
        category: Category,
    },

    /// User chose to talk without picking a category
    JustTalk,

    /// User closed the popup
    PopupDismissed,

    // ============================================
    // Conversation
    // ============================================
    /// User sent a message
    UserMessage {
        /// Message text
        content: String,
    },

    /// Send the input held while blocked on credits
    ResendPending,

    /// User answered the credit popup
    CreditChoice {
        /// Chosen resolution
        resolution: CreditResolution,
    },

    /// End the current session
    EndSession,

    // ============================================
    // Account
    // ============================================
    /// Move the account to a higher tier
    UpgradeTier {
        /// Target tier
        tier: Tier,
    },

    /// Re-read the credit balance
    RefreshCredits,

    /// Sign out; ends any live session
    Logout,

    // ============================================
    // Past Sessions (pro)
    // ============================================
    /// List stored sessions
    ListSessions,

    /// Load a stored session's turns
    RestoreSession {
        /// Session to restore
        id: RemoteSessionId,
    },

    /// Delete a stored session
    DeleteSession {
        /// Session to delete
        id: RemoteSessionId,
    },
}
