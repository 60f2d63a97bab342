// ============================================================================
// Request Views - derived projections over the request collection
// ============================================================================
//
//   outgoing   every request the caller created, any status
//   incoming   requests the caller is currently processing
//   available  pending requests with no provider, visible to all providers
//   fulfilled  requests the caller completed as provider
//
// Nothing here is stored; membership is recomputed from status and identity
// on every query.
//
// ============================================================================

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{AccountId, Request, RequestKind, RequestStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    Outgoing,
    Incoming,
    Available,
    Fulfilled,
}

impl View {
    pub const ALL: [View; 4] = [View::Outgoing, View::Incoming, View::Available, View::Fulfilled];

    pub fn as_str(&self) -> &'static str {
        match self {
            View::Outgoing => "outgoing",
            View::Incoming => "incoming",
            View::Available => "available",
            View::Fulfilled => "fulfilled",
        }
    }

    /// Whether `request` shows up in this view for `caller`
    pub fn contains(&self, request: &Request, caller: &AccountId) -> bool {
        match self {
            View::Outgoing => &request.requester == caller,
            View::Incoming => {
                request.status == RequestStatus::Processing
                    && request.provider.as_ref() == Some(caller)
            }
            View::Available => request.is_available(),
            View::Fulfilled => {
                request.status == RequestStatus::Completed
                    && request.provider.as_ref() == Some(caller)
            }
        }
    }
}

/// Optional narrowing of a view query
#[derive(Debug, Clone, Default)]
pub struct ViewFilter {
    pub kind: Option<RequestKind>,
    pub limit: Option<usize>,
}

impl ViewFilter {
    pub fn kind(kind: RequestKind) -> Self {
        Self { kind: Some(kind), limit: None }
    }

    pub fn matches(&self, request: &Request) -> bool {
        self.kind.map(|k| k == request.kind).unwrap_or(true)
    }
}

// ============================================================================
// TOTALS
// ============================================================================

/// Sum of rewards the account earned as provider
pub fn total_earned<'a>(requests: impl IntoIterator<Item = &'a Request>, account: &AccountId) -> Decimal {
    requests
        .into_iter()
        .filter(|r| View::Fulfilled.contains(r, account))
        .map(|r| r.reward)
        .sum()
}

/// Sum of rewards the account paid out of pocket. Canceled requests were
/// refunded and do not count.
pub fn total_spent<'a>(requests: impl IntoIterator<Item = &'a Request>, account: &AccountId) -> Decimal {
    requests
        .into_iter()
        .filter(|r| View::Outgoing.contains(r, account) && r.status != RequestStatus::Canceled)
        .map(|r| r.reward)
        .sum()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountTotals {
    pub account: AccountId,
    pub balance: Decimal,
    pub total_earned: Decimal,
    pub total_spent: Decimal,
    pub outgoing: usize,
    pub incoming: usize,
    pub fulfilled: usize,
}

// ============================================================================
// STATS
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total: usize,
    pub by_status: HashMap<RequestStatus, usize>,
    /// Rewards still held and releasable
    pub escrowed: Decimal,
    /// Rewards of requests that failed with no retries left
    pub forfeited: Decimal,
    /// Rewards paid to providers
    pub completed_volume: Decimal,
    pub total_retries: u64,
}

impl LedgerStats {
    pub fn collect<'a>(requests: impl IntoIterator<Item = &'a Request>) -> Self {
        let mut stats = LedgerStats::default();
        for request in requests {
            stats.total += 1;
            *stats.by_status.entry(request.status).or_insert(0) += 1;
            stats.total_retries += u64::from(request.retry_count);
            if request.holds_escrow() {
                stats.escrowed += request.reward;
            }
            if request.is_forfeited() {
                stats.forfeited += request.reward;
            }
            if request.status == RequestStatus::Completed {
                stats.completed_volume += request.reward;
            }
        }
        stats
    }

    pub fn count(&self, status: RequestStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}
