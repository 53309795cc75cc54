//! HTTP implementation of the remote traits
//!
//! Talks to the PureSoul REST API. Status handling:
//!
//! | status | meaning                                        |
//! |--------|------------------------------------------------|
//! | 400    | [`RemoteError::InvalidRequest`]                |
//! | 401    | [`RemoteError::Unauthorized`]                  |
//! | 403    | pro gate (`upgrade_required`) or credit denial |
//! | 404    | [`RemoteError::NotFound`]                      |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::traits::{
    AudioClip, ChatRequest, ChatService, CreditService, SessionStore, SpeechSynthesizer,
};
use super::RemoteError;
use crate::category::Category;
use crate::credits::{BalanceReport, Tier};
use crate::emotion::EmotionLabel;
use crate::session::{RemoteSessionId, SessionRecord, SessionTranscript, Turn, TurnId, TurnRole};

/// Default request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest error body kept in [`RemoteError::Status`]
const MAX_ERROR_BODY: usize = 512;

/// REST client for the PureSoul service
#[derive(Clone, Debug)]
pub struct HttpRemote {
    /// Base URL without trailing slash
    base_url: String,
    /// Bearer token
    token: Option<String>,
    /// HTTP client
    http_client: reqwest::Client,
}

impl HttpRemote {
    /// Create a client for `base_url`
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            base_url,
            token,
            http_client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    /// Base URL requests are sent to
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get(&self, path: &str) -> Result<Response, RemoteError> {
        let response = self
            .authorized(self.http_client.get(self.url(path)))
            .send()
            .await?;
        check(response).await
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, RemoteError> {
        let response = self
            .authorized(self.http_client.post(self.url(path)))
            .json(body)
            .send()
            .await?;
        check(response).await
    }

    async fn delete(&self, path: &str) -> Result<Response, RemoteError> {
        let response = self
            .authorized(self.http_client.delete(self.url(path)))
            .send()
            .await?;
        check(response).await
    }
}

/// Map non-success statuses onto [`RemoteError`]
async fn check(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let parsed: ErrorPayload = serde_json::from_str(&body).unwrap_or_default();
    let message = parsed
        .message
        .or(parsed.error)
        .unwrap_or_else(|| status.to_string());

    Err(match status {
        StatusCode::BAD_REQUEST => RemoteError::InvalidRequest(message),
        StatusCode::UNAUTHORIZED => RemoteError::Unauthorized(message),
        StatusCode::FORBIDDEN if parsed.upgrade_required => RemoteError::ProRequired,
        StatusCode::FORBIDDEN => RemoteError::CreditsExhausted,
        StatusCode::NOT_FOUND => RemoteError::NotFound(message),
        _ => {
            let mut body = body;
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            RemoteError::Status {
                status: status.as_u16(),
                body,
            }
        }
    })
}

async fn decode<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, RemoteError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| RemoteError::Decode(e.to_string()))
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct ErrorPayload {
    message: Option<String>,
    error: Option<String>,
    #[serde(default)]
    upgrade_required: bool,
}

#[derive(Debug, Deserialize)]
struct CreditsPayload {
    #[serde(default)]
    credits: i64,
    is_pro: Option<bool>,
    tier: Option<String>,
    total_credits_purchased: Option<i64>,
}

impl CreditsPayload {
    fn into_report(self) -> BalanceReport {
        let tier = self
            .tier
            .as_deref()
            .and_then(Tier::from_wire)
            .or_else(|| self.is_pro.map(|pro| if pro { Tier::Pro } else { Tier::Basic }));
        BalanceReport {
            remaining: clamp_count(self.credits),
            lifetime_purchased: self.total_credits_purchased.map(clamp_count),
            tier,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpgradePayload {
    user: CreditsPayload,
}

#[derive(Debug, Serialize)]
struct PurchaseBody {
    amount: u32,
}

#[derive(Debug, Serialize)]
struct UpgradeBody {
    tier: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    #[serde(rename = "userMessage")]
    user_message: &'a str,
    #[serde(rename = "messageHistory")]
    message_history: Vec<WireHistory<'a>>,
    category: &'static str,
    session_id: Option<RemoteSessionId>,
}

#[derive(Debug, Serialize)]
struct WireHistory<'a> {
    sender: &'static str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatPayload {
    #[serde(rename = "therapistResponse")]
    therapist_response: String,
}

#[derive(Debug, Serialize)]
struct CreateSessionBody {
    category: &'static str,
    session_title: String,
}

#[derive(Debug, Deserialize)]
struct CreateSessionPayload {
    session_id: Option<RemoteSessionId>,
}

#[derive(Debug, Deserialize)]
struct SessionListPayload {
    #[serde(default)]
    sessions: Vec<WireSession>,
}

#[derive(Debug, Deserialize)]
struct WireSession {
    id: RemoteSessionId,
    session_title: Option<String>,
    started_at: Option<String>,
    ended_at: Option<String>,
    #[serde(default)]
    is_active: bool,
    #[serde(default)]
    message_count: u32,
}

impl From<WireSession> for SessionRecord {
    fn from(wire: WireSession) -> Self {
        Self {
            id: wire.id,
            title: wire.session_title,
            started_at: wire.started_at.as_deref().and_then(parse_timestamp),
            ended_at: wire.ended_at.as_deref().and_then(parse_timestamp),
            is_active: wire.is_active,
            message_count: wire.message_count,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptPayload {
    session: WireSession,
    #[serde(default)]
    messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    id: i64,
    sender: String,
    message_text: String,
    emotion_detected: Option<String>,
    created_at: Option<String>,
}

impl From<WireMessage> for Turn {
    fn from(wire: WireMessage) -> Self {
        let role = if wire.sender == "user" {
            TurnRole::User
        } else {
            TurnRole::Assistant
        };
        Self {
            id: TurnId::remote(wire.id),
            role,
            text: wire.message_text,
            created_at: wire
                .created_at
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or_else(Utc::now),
            emotion: wire.emotion_detected.as_deref().and_then(EmotionLabel::from_vendor),
        }
    }
}

#[derive(Debug, Serialize)]
struct SpeechBody<'a> {
    text: &'a str,
}

fn clamp_count(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

/// Accepts RFC 3339, naive ISO 8601 (assumed UTC), and RFC 2822
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc2822(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn chat_body(request: &ChatRequest) -> ChatBody<'_> {
    ChatBody {
        user_message: &request.user_message,
        message_history: request
            .history
            .iter()
            .map(|entry| WireHistory {
                sender: match entry.role {
                    TurnRole::User => "user",
                    TurnRole::Assistant => "therapist",
                },
                text: &entry.text,
            })
            .collect(),
        category: request.category.title(),
        session_id: request.session_id,
    }
}

// ============================================================================
// Trait implementations
// ============================================================================

#[async_trait]
impl ChatService for HttpRemote {
    async fn reply(&self, request: &ChatRequest) -> Result<String, RemoteError> {
        let response = self.post("/api/get-response", &chat_body(request)).await?;
        let payload: ChatPayload = decode(response).await?;
        Ok(payload.therapist_response)
    }
}

#[async_trait]
impl CreditService for HttpRemote {
    async fn balance(&self) -> Result<BalanceReport, RemoteError> {
        let payload: CreditsPayload = decode(self.get("/api/credits").await?).await?;
        Ok(payload.into_report())
    }

    async fn consume(&self) -> Result<BalanceReport, RemoteError> {
        let payload: CreditsPayload =
            decode(self.post("/api/credits/use", &serde_json::json!({})).await?).await?;
        Ok(payload.into_report())
    }

    async fn purchase(&self, amount: u32) -> Result<BalanceReport, RemoteError> {
        let payload: CreditsPayload =
            decode(self.post("/api/credits/buy", &PurchaseBody { amount }).await?).await?;
        Ok(payload.into_report())
    }

    async fn upgrade(&self, tier: Tier) -> Result<BalanceReport, RemoteError> {
        let body = UpgradeBody {
            tier: tier.as_str(),
        };
        let payload: UpgradePayload = decode(self.post("/api/pro/upgrade", &body).await?).await?;
        Ok(payload.user.into_report())
    }
}

#[async_trait]
impl SessionStore for HttpRemote {
    async fn create_session(
        &self,
        category: Category,
    ) -> Result<Option<RemoteSessionId>, RemoteError> {
        let body = CreateSessionBody {
            category: category.title(),
            session_title: category.session_title(),
        };
        let payload: CreateSessionPayload =
            decode(self.post("/api/session/create", &body).await?).await?;
        Ok(payload.session_id)
    }

    async fn end_session(&self, id: RemoteSessionId) -> Result<(), RemoteError> {
        self.post(&format!("/api/session/{id}/end"), &serde_json::json!({}))
            .await?;
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, RemoteError> {
        let payload: SessionListPayload = decode(self.get("/api/pro/sessions").await?).await?;
        Ok(payload.sessions.into_iter().map(SessionRecord::from).collect())
    }

    async fn fetch_session(&self, id: RemoteSessionId) -> Result<SessionTranscript, RemoteError> {
        let payload: TranscriptPayload =
            decode(self.get(&format!("/api/pro/session/{id}")).await?).await?;
        Ok(SessionTranscript {
            record: payload.session.into(),
            turns: payload.messages.into_iter().map(Turn::from).collect(),
        })
    }

    async fn delete_session(&self, id: RemoteSessionId) -> Result<(), RemoteError> {
        self.delete(&format!("/api/pro/session/{id}")).await?;
        Ok(())
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpRemote {
    async fn synthesize(&self, text: &str) -> Result<AudioClip, RemoteError> {
        let response = self
            .post("/api/text-to-speech", &SpeechBody { text })
            .await?;
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();
        let bytes = response.bytes().await?.to_vec();
        if bytes.is_empty() {
            return Err(RemoteError::Decode("empty audio body".to_string()));
        }
        Ok(AudioClip { bytes, mime })
    }
}
