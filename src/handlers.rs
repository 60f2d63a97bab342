// HTTP request handlers for the request market API

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};
use tracing::debug;

use crate::app_state::AppState;
use crate::models::*;
use crate::request_ledger::LedgerError;
use crate::views::{AccountTotals, LedgerStats, ViewFilter};

pub type ApiResult = Result<Json<RequestResponse>, (StatusCode, Json<RequestResponse>)>;

pub fn status_for(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
        LedgerError::NotAvailable(_)
        | LedgerError::InvalidState { .. }
        | LedgerError::RetryLimitExceeded { .. } => StatusCode::CONFLICT,
        LedgerError::NotProviding(_) | LedgerError::ReservedAccount(_) => StatusCode::FORBIDDEN,
        LedgerError::CreditRefused { .. } => StatusCode::CONFLICT,
        LedgerError::InvalidReward(_) => StatusCode::BAD_REQUEST,
    }
}

fn reject(err: LedgerError) -> (StatusCode, Json<RequestResponse>) {
    let status = status_for(&err);
    debug!(status = status.as_u16(), error = %err, "request rejected");
    (status, Json(RequestResponse::error(&err.to_string())))
}

/// Wrap an operation result, reporting `balance_of` after the mutation
fn respond(state: &AppState, result: Result<Request, LedgerError>, balance_of: Option<&AccountId>) -> ApiResult {
    let request = result.map_err(reject)?;
    let new_balance = balance_of.map(|account| state.market.balance(account));
    Ok(Json(RequestResponse::ok(request, new_balance)))
}

// ===== HEALTH =====

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let stats = state.market.stats();
    Json(json!({
        "status": "ok",
        "service": "ubi-request-market",
        "requests": stats.total,
        "escrowed": stats.escrowed,
    }))
}

// ===== REQUEST LIFECYCLE =====

pub async fn create_request(State(state): State<AppState>, Json(body): Json<CreateRequestBody>) -> ApiResult {
    let (requester, draft) = body.into_draft();
    let result = state.market.create(&requester, draft);
    respond(&state, result, Some(&requester))
}

pub async fn get_request(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = RequestId(id);
    let result = state.market.get(&id).ok_or(LedgerError::NotFound(id));
    respond(&state, result, None)
}

pub async fn cancel_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<CallerBody>,
) -> ApiResult {
    let result = state.market.cancel(&RequestId(id), &body.caller);
    respond(&state, result, Some(&body.caller))
}

pub async fn accept_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<CallerBody>,
) -> ApiResult {
    let result = state.market.accept(&RequestId(id), &body.caller);
    respond(&state, result, None)
}

pub async fn complete_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<CompleteBody>,
) -> ApiResult {
    let result = state.market.complete(&RequestId(id), &body.caller, body.response);
    respond(&state, result, Some(&body.caller))
}

pub async fn fail_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<FailBody>,
) -> ApiResult {
    let result = state.market.fail(&RequestId(id), &body.caller, body.message);
    respond(&state, result, None)
}

pub async fn retry_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<CallerBody>,
) -> ApiResult {
    let result = state.market.retry(&RequestId(id), &body.caller);
    respond(&state, result, None)
}

/// Accept on behalf of `caller` and hand the work to the configured
/// fulfiller; the outcome lands later through complete or fail.
pub async fn fulfill_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<CallerBody>,
) -> ApiResult {
    let worker = state.worker(body.caller);
    let result = worker.begin(&RequestId(id)).map(|(claimed, _)| claimed);
    respond(&state, result, None)
}

// ===== PROVIDING MODE =====

pub async fn set_providing(
    State(state): State<AppState>,
    Json(body): Json<ProvidingBody>,
) -> Result<Json<Value>, (StatusCode, Json<RequestResponse>)> {
    let any_providing = state
        .market
        .toggle_providing(&body.account, body.enabled)
        .map_err(reject)?;
    Ok(Json(json!({
        "success": true,
        "account": body.account,
        "providing": body.enabled,
        "any_providing": any_providing,
    })))
}

// ===== VIEWS =====

pub async fn list_available(State(state): State<AppState>, Query(query): Query<AvailableQuery>) -> Json<Vec<Request>> {
    let filter = ViewFilter {
        kind: query.kind,
        limit: query.limit,
    };
    Json(state.market.available(&filter))
}

pub async fn get_outgoing(State(state): State<AppState>, Path(account): Path<String>) -> Json<Vec<Request>> {
    Json(state.market.outgoing(&AccountId::new(account)))
}

pub async fn get_incoming(State(state): State<AppState>, Path(account): Path<String>) -> Json<Vec<Request>> {
    Json(state.market.incoming(&AccountId::new(account)))
}

pub async fn get_fulfilled(State(state): State<AppState>, Path(account): Path<String>) -> Json<Vec<Request>> {
    Json(state.market.fulfilled(&AccountId::new(account)))
}

pub async fn get_summary(State(state): State<AppState>, Path(account): Path<String>) -> Json<AccountTotals> {
    Json(state.market.summary(&AccountId::new(account)))
}

pub async fn get_stats(State(state): State<AppState>) -> Json<LedgerStats> {
    Json(state.market.stats())
}
