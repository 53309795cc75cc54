//! Remote Service Integration
//!
//! Chat, credits, session storage, and speech synthesis behind trait seams.
//!
//! # Available Implementations
//!
//! - **HTTP**: the PureSoul REST API over reqwest, bearer-token auth
//!
//! # Usage
//!
//! ```ignore
//! use puresoul_core::remote::{CreditService, HttpRemote, DEFAULT_REQUEST_TIMEOUT};
//!
//! let remote = HttpRemote::new("http://localhost:5000", Some(token), DEFAULT_REQUEST_TIMEOUT)?;
//! let report = remote.balance().await?;
//! ```

mod error;
mod http;
mod traits;

pub use error::RemoteError;
pub use http::{HttpRemote, DEFAULT_REQUEST_TIMEOUT};
pub use traits::{
    AudioClip, ChatRequest, ChatService, CreditService, HistoryEntry, Remote, SessionStore,
    SpeechSynthesizer,
};
