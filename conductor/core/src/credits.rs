//! Credit Ledger
//!
//! Client-side mirror of the server's credit balance.
//!
//! # Design Philosophy
//!
//! The server is authoritative. The ledger never decrements locally: every
//! mutation is a request, and the answer replaces the held
//! [`CreditBalance`] as a whole (`Arc` swap under a short lock). Readers take
//! a snapshot and never observe a half-updated balance.
//!
//! ```text
//!   refresh / consume / purchase / upgrade
//!        │
//!        ▼
//!   CreditService ──► BalanceReport ──► merge with current ──► swap Arc
//! ```
//!
//! The only local decision is refusing to consume when the held balance is
//! already zero for a metered tier, which saves a round trip the server
//! would reject anyway.
//!
//! Consumes run off the turn path, so a turn reserves its credit up front
//! with [`CreditLedger::reserve`]. [`CreditLedger::spendable`] subtracts the
//! reservations still outstanding; the gate authorizes against that view.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::remote::{CreditService, RemoteError};

/// Credits a new basic account starts with
pub const BASIC_ALLOWANCE: u32 = 12;

/// Remaining credits at or below which the UI should warn
pub const LOW_CREDIT_WARNING: u32 = 3;

// ============================================================================
// Balance
// ============================================================================

/// Account tier
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Free tier, metered turns, no persistence
    #[default]
    Basic,
    /// Unmetered turns, persisted sessions
    Pro,
    /// Pro with a larger display allowance
    ProPlus,
}

impl Tier {
    /// Whether turns skip the credit check
    #[must_use]
    pub fn bypasses_credit_check(&self) -> bool {
        !matches!(self, Self::Basic)
    }

    /// Whether sessions are stored server-side
    #[must_use]
    pub fn persists_sessions(&self) -> bool {
        !matches!(self, Self::Basic)
    }

    /// Baseline used to draw the credit progress bar
    #[must_use]
    pub fn display_allowance(&self) -> u32 {
        match self {
            Self::Basic => BASIC_ALLOWANCE,
            Self::Pro => 100,
            Self::ProPlus => 300,
        }
    }

    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Pro => "pro",
            Self::ProPlus => "pro_plus",
        }
    }

    /// Parse a wire name; unknown names are `None`
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "basic" | "free" => Some(Self::Basic),
            "pro" => Some(Self::Pro),
            "pro_plus" | "proplus" | "plus" | "pro+" => Some(Self::ProPlus),
            _ => None,
        }
    }
}

/// Snapshot of the account's credits
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditBalance {
    /// Credits left
    pub remaining: u32,
    /// Credits bought over the account's lifetime
    pub lifetime_purchased: u32,
    /// Account tier
    pub tier: Tier,
}

impl CreditBalance {
    /// Fresh basic account
    #[must_use]
    pub fn basic() -> Self {
        Self {
            remaining: BASIC_ALLOWANCE,
            lifetime_purchased: 0,
            tier: Tier::Basic,
        }
    }

    /// Whether another turn may be sent against this balance
    #[must_use]
    pub fn can_send(&self) -> bool {
        self.tier.bypasses_credit_check() || self.remaining > 0
    }

    /// Display summary for progress bars and badges
    #[must_use]
    pub fn display(&self) -> BalanceDisplay {
        BalanceDisplay::from_balance(self)
    }

    /// Apply a server report; fields the server omitted keep their value
    #[must_use]
    pub fn merged(&self, report: &BalanceReport) -> Self {
        Self {
            remaining: report.remaining,
            lifetime_purchased: report.lifetime_purchased.unwrap_or(self.lifetime_purchased),
            tier: report.tier.unwrap_or(self.tier),
        }
    }
}

impl Default for CreditBalance {
    fn default() -> Self {
        Self::basic()
    }
}

/// Balance as reported by one server response
///
/// Endpoints differ in what they return; only `remaining` is always present.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceReport {
    /// Credits left
    pub remaining: u32,
    /// Lifetime purchases, when reported
    pub lifetime_purchased: Option<u32>,
    /// Tier, when reported
    pub tier: Option<Tier>,
}

impl BalanceReport {
    /// Report carrying only a remaining count
    #[must_use]
    pub fn remaining(remaining: u32) -> Self {
        Self {
            remaining,
            lifetime_purchased: None,
            tier: None,
        }
    }
}

// ============================================================================
// Display
// ============================================================================

/// Coarse level for colouring the balance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditLevel {
    /// Plenty left
    Healthy,
    /// Five or fewer
    Low,
    /// Two or fewer
    Critical,
    /// Nothing left
    Empty,
}

/// Values a surface needs to draw a balance
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BalanceDisplay {
    /// Credits left
    pub remaining: u32,
    /// Progress bar baseline for the tier
    pub allowance: u32,
    /// `remaining / allowance`, capped at 1
    pub fill: f32,
    /// Colour level
    pub level: CreditLevel,
    /// Show the "running low" hint
    pub low_credit_warning: bool,
    /// Tier bypasses metering entirely
    pub unmetered: bool,
}

impl BalanceDisplay {
    /// Derive display values from a balance
    #[must_use]
    pub fn from_balance(balance: &CreditBalance) -> Self {
        let allowance = balance.tier.display_allowance().max(1);
        #[allow(clippy::cast_precision_loss)]
        let fill = (balance.remaining as f32 / allowance as f32).min(1.0);
        let level = match balance.remaining {
            0 => CreditLevel::Empty,
            1..=2 => CreditLevel::Critical,
            3..=5 => CreditLevel::Low,
            _ => CreditLevel::Healthy,
        };
        Self {
            remaining: balance.remaining,
            allowance,
            fill,
            level,
            low_credit_warning: balance.remaining > 0 && balance.remaining <= LOW_CREDIT_WARNING,
            unmetered: balance.tier.bypasses_credit_check(),
        }
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// Credit operation failure
#[derive(Debug, Error)]
pub enum CreditError {
    /// Balance is zero on a metered tier
    #[error("no credits remaining")]
    Exhausted,

    /// Purchase amount must be positive
    #[error("invalid purchase amount: {0}")]
    InvalidAmount(u32),

    /// Remote call failed
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Authoritative-balance mirror
pub struct CreditLedger<S: CreditService + ?Sized> {
    service: Arc<S>,
    balance: RwLock<Arc<CreditBalance>>,
    in_flight: AtomicUsize,
    reserved: AtomicUsize,
}

/// Holds one count on a counter, released on drop
struct CounterGuard<'a>(&'a AtomicUsize);

impl<'a> CounterGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }

    /// Take over a count someone else already added
    fn adopt(counter: &'a AtomicUsize) -> Self {
        Self(counter)
    }
}

impl Drop for CounterGuard<'_> {
    fn drop(&mut self) {
        let _ = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }
}

impl<S: CreditService + ?Sized> CreditLedger<S> {
    /// Create a ledger seeded with `initial` until the first refresh
    pub fn new(service: Arc<S>, initial: CreditBalance) -> Self {
        Self {
            service,
            balance: RwLock::new(Arc::new(initial)),
            in_flight: AtomicUsize::new(0),
            reserved: AtomicUsize::new(0),
        }
    }

    /// Current balance
    #[must_use]
    pub fn snapshot(&self) -> Arc<CreditBalance> {
        Arc::clone(&self.balance.read())
    }

    /// Whether a ledger request is outstanding
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Balance minus credits reserved for consumes that have not landed
    #[must_use]
    pub fn spendable(&self) -> Arc<CreditBalance> {
        let current = self.snapshot();
        let reserved = self.reserved();
        if reserved == 0 || current.tier.bypasses_credit_check() {
            return current;
        }
        let held = u32::try_from(reserved).unwrap_or(u32::MAX);
        Arc::new(CreditBalance {
            remaining: current.remaining.saturating_sub(held),
            ..(*current).clone()
        })
    }

    /// Consumes reserved but not yet settled
    #[must_use]
    pub fn reserved(&self) -> usize {
        self.reserved.load(Ordering::SeqCst)
    }

    /// Hold one credit for a consume that will run later
    ///
    /// Pair every call with [`CreditLedger::consume_reserved`].
    pub fn reserve(&self) {
        self.reserved.fetch_add(1, Ordering::SeqCst);
    }

    /// Spend the credit held by an earlier [`CreditLedger::reserve`]
    ///
    /// The reservation is released once the server has answered, whatever
    /// the outcome, and after the answer has been applied.
    pub async fn consume_reserved(&self) -> Result<Arc<CreditBalance>, CreditError> {
        let _reservation = CounterGuard::adopt(&self.reserved);
        self.consume().await
    }

    /// Re-read the balance from the server
    pub async fn refresh(&self) -> Result<Arc<CreditBalance>, CreditError> {
        let _pending = CounterGuard::enter(&self.in_flight);
        let report = self.service.balance().await?;
        Ok(self.apply(&report))
    }

    /// Spend one credit
    ///
    /// Refused locally, without a remote call, when a metered balance is
    /// already zero.
    pub async fn consume(&self) -> Result<Arc<CreditBalance>, CreditError> {
        let current = self.snapshot();
        if !current.tier.bypasses_credit_check() && current.remaining == 0 {
            return Err(CreditError::Exhausted);
        }

        let _pending = CounterGuard::enter(&self.in_flight);
        match self.service.consume().await {
            Ok(report) => Ok(self.apply(&report)),
            Err(RemoteError::CreditsExhausted) => {
                self.apply(&BalanceReport::remaining(0));
                Err(CreditError::Exhausted)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Buy `amount` credits
    pub async fn purchase(&self, amount: u32) -> Result<Arc<CreditBalance>, CreditError> {
        if amount == 0 {
            return Err(CreditError::InvalidAmount(amount));
        }
        let _pending = CounterGuard::enter(&self.in_flight);
        let report = self.service.purchase(amount).await?;
        tracing::info!(amount, remaining = report.remaining, "Credits purchased");
        Ok(self.apply(&report))
    }

    /// Move the account to `tier`
    pub async fn upgrade(&self, tier: Tier) -> Result<Arc<CreditBalance>, CreditError> {
        let _pending = CounterGuard::enter(&self.in_flight);
        let mut report = self.service.upgrade(tier).await?;
        // some servers only report a pro flag
        if report.tier.map_or(true, |t| t.bypasses_credit_check()) {
            report.tier = Some(tier);
        }
        tracing::info!(tier = tier.as_str(), "Tier upgraded");
        Ok(self.apply(&report))
    }

    fn apply(&self, report: &BalanceReport) -> Arc<CreditBalance> {
        let mut slot = self.balance.write();
        let next = Arc::new(slot.merged(report));
        *slot = Arc::clone(&next);
        next
    }
}
