// Data models for the AI-request marketplace

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Retry limit stamped on requests when the caller does not pick one
pub const DEFAULT_RETRY_LIMIT: u32 = 3;

/// Reserved requester identity used by the simulated network feed
pub const NETWORK_ACCOUNT: &str = "network";

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Unique request identifier, assigned at creation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        RequestId(format!(
            "req_{}",
            &Uuid::new_v4().simple().to_string()[..16]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId(s.to_string())
    }
}

/// Requester or provider identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        AccountId(id.into())
    }

    pub fn network() -> Self {
        AccountId(NETWORK_ACCOUNT.to_string())
    }

    pub fn is_network(&self) -> bool {
        self.0 == NETWORK_ACCOUNT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        AccountId(s.to_string())
    }
}

// ============================================================================
// ENUMS
// ============================================================================

/// Request category. Opaque to the ledger, used for filtering by collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Text,
    Image,
    Audio,
    Code,
}

impl RequestKind {
    pub const ALL: [RequestKind; 4] = [
        RequestKind::Text,
        RequestKind::Image,
        RequestKind::Audio,
        RequestKind::Code,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Text => "text",
            RequestKind::Image => "image",
            RequestKind::Audio => "audio",
            RequestKind::Code => "code",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Waiting for a provider
    Pending,
    /// Accepted, provider is working on it
    Processing,
    /// Provider delivered a response, reward released
    Completed,
    /// Provider reported an error
    Failed,
    /// Withdrawn by the requester, reward refunded
    Canceled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Processing => "processing",
            RequestStatus::Completed => "completed",
            RequestStatus::Failed => "failed",
            RequestStatus::Canceled => "canceled",
        }
    }

    /// Completed and canceled never transition again. Failed is handled
    /// per request since it depends on the remaining retries.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Canceled)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// REQUEST
// ============================================================================

/// What a requester submits; the ledger fills in everything else
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDraft {
    pub kind: RequestKind,
    pub prompt: String,
    pub model: String,
    pub reward: Decimal,
    #[serde(default)]
    pub retry_limit: Option<u32>,
}

impl RequestDraft {
    pub fn new(kind: RequestKind, prompt: impl Into<String>, model: impl Into<String>, reward: Decimal) -> Self {
        Self {
            kind,
            prompt: prompt.into(),
            model: model.into(),
            reward,
            retry_limit: None,
        }
    }

    pub fn with_retry_limit(mut self, limit: u32) -> Self {
        self.retry_limit = Some(limit);
        self
    }
}

/// A paid computation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub kind: RequestKind,
    pub prompt: String,
    /// Informational only
    pub model: String,
    pub requester: AccountId,
    /// Absent until accepted
    pub provider: Option<AccountId>,
    pub status: RequestStatus,
    /// Fixed at creation, fully escrowed
    pub reward: Decimal,
    pub created_at: DateTime<Utc>,
    /// Set on completion or failure
    pub completed_at: Option<DateTime<Utc>>,
    pub response: Option<String>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub retry_limit: u32,
}

impl Request {
    pub fn new(requester: AccountId, draft: RequestDraft, default_retry_limit: u32) -> Self {
        Self {
            id: RequestId::generate(),
            kind: draft.kind,
            prompt: draft.prompt,
            model: draft.model,
            requester,
            provider: None,
            status: RequestStatus::Pending,
            reward: draft.reward,
            created_at: Utc::now(),
            completed_at: None,
            response: None,
            error: None,
            retry_count: 0,
            retry_limit: draft.retry_limit.unwrap_or(default_retry_limit),
        }
    }

    pub fn can_retry(&self) -> bool {
        self.status == RequestStatus::Failed && self.retry_count < self.retry_limit
    }

    /// Failed with no retries left: the reward stays debited for good
    pub fn is_forfeited(&self) -> bool {
        self.status == RequestStatus::Failed && self.retry_count >= self.retry_limit
    }

    /// Reward is still held against the requester and may yet be released
    pub fn holds_escrow(&self) -> bool {
        match self.status {
            RequestStatus::Pending | RequestStatus::Processing => true,
            RequestStatus::Failed => self.retry_count < self.retry_limit,
            RequestStatus::Completed | RequestStatus::Canceled => false,
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == RequestStatus::Pending && self.provider.is_none()
    }

    pub(crate) fn start_processing(&mut self, provider: AccountId) {
        self.status = RequestStatus::Processing;
        self.provider = Some(provider);
    }

    pub(crate) fn complete(&mut self, response: String) {
        self.status = RequestStatus::Completed;
        self.response = Some(response);
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn fail(&mut self, error: String) {
        self.status = RequestStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn cancel(&mut self) {
        self.status = RequestStatus::Canceled;
    }

    pub(crate) fn reset_for_retry(&mut self) {
        self.status = RequestStatus::Pending;
        self.retry_count += 1;
        self.provider = None;
        self.error = None;
        self.response = None;
        self.completed_at = None;
    }
}

// ============================================================================
// HTTP BODIES
// ============================================================================

/// POST /requests
#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    pub requester: AccountId,
    pub kind: RequestKind,
    pub prompt: String,
    pub model: String,
    pub reward: Decimal,
    #[serde(default)]
    pub retry_limit: Option<u32>,
}

impl CreateRequestBody {
    pub fn into_draft(self) -> (AccountId, RequestDraft) {
        let draft = RequestDraft {
            kind: self.kind,
            prompt: self.prompt,
            model: self.model,
            reward: self.reward,
            retry_limit: self.retry_limit,
        };
        (self.requester, draft)
    }
}

/// Body of cancel/accept/retry
#[derive(Debug, Deserialize)]
pub struct CallerBody {
    pub caller: AccountId,
}

/// POST /requests/:id/complete
#[derive(Debug, Deserialize)]
pub struct CompleteBody {
    pub caller: AccountId,
    pub response: String,
}

/// POST /requests/:id/fail
#[derive(Debug, Deserialize)]
pub struct FailBody {
    pub caller: AccountId,
    pub message: String,
}

/// POST /providing
#[derive(Debug, Deserialize)]
pub struct ProvidingBody {
    pub account: AccountId,
    pub enabled: bool,
}

/// GET /requests/available
#[derive(Debug, Default, Deserialize)]
pub struct AvailableQuery {
    #[serde(default)]
    pub kind: Option<RequestKind>,
    /// Newest `limit` entries only
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Envelope for every mutating endpoint
#[derive(Debug, Serialize)]
pub struct RequestResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<Request>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_balance: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RequestResponse {
    pub fn ok(request: Request, new_balance: Option<Decimal>) -> Self {
        Self {
            success: true,
            request: Some(request),
            new_balance,
            error: None,
        }
    }

    pub fn error(msg: &str) -> Self {
        Self {
            success: false,
            request: None,
            new_balance: None,
            error: Some(msg.to_string()),
        }
    }
}
