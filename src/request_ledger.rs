//! Request Ledger - lifecycle state machine with escrowed rewards
//!
//! ```text
//!            create (debit requester)
//!                   |
//!                   v
//!   cancel  +---- pending <--------------+
//!  (refund) |       | accept             | retry (count < limit)
//!           v       v                    |
//!     canceled   processing --fail--> failed
//!                   | complete
//!                   v
//!               completed (credit provider)
//! ```
//!
//! Every operation validates all guards before touching a balance or a
//! request, so a rejected call mutates nothing.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{AccountId, Request, RequestDraft, RequestId, RequestStatus, DEFAULT_RETRY_LIMIT};
use crate::views::{self, LedgerStats, View, ViewFilter};
use crate::wallet::{AccountDirectory, FundsError, Movement, MovementType};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
pub enum LedgerError {
    #[error("Insufficient balance: have {available}, need {required}")]
    InsufficientBalance { available: Decimal, required: Decimal },

    #[error("Invalid state for request {id}: {reason}")]
    InvalidState { id: RequestId, reason: String },

    #[error("Request not available: {0}")]
    NotAvailable(RequestId),

    #[error("Retry limit exceeded for request {id} (limit {limit})")]
    RetryLimitExceeded { id: RequestId, limit: u32 },

    #[error("Request not found: {0}")]
    NotFound(RequestId),

    #[error("Account is not providing: {0}")]
    NotProviding(AccountId),

    #[error("Invalid reward: {0}")]
    InvalidReward(Decimal),

    #[error("Account {0} is reserved for the network feed")]
    ReservedAccount(AccountId),

    #[error("Credit of {amount} refused")]
    CreditRefused { amount: Decimal },
}

impl LedgerError {
    fn invalid_state(request: &Request, reason: impl Into<String>) -> Self {
        LedgerError::InvalidState {
            id: request.id.clone(),
            reason: reason.into(),
        }
    }

    fn wrong_status(request: &Request, operation: &str) -> Self {
        Self::invalid_state(
            request,
            format!("cannot {} a request that is {}", operation, request.status),
        )
    }
}

impl From<FundsError> for LedgerError {
    fn from(err: FundsError) -> Self {
        match err {
            FundsError::InsufficientFunds { available, requested } => LedgerError::InsufficientBalance {
                available,
                required: requested,
            },
            FundsError::CreditRefused { requested } => LedgerError::CreditRefused { amount: requested },
        }
    }
}

// ============================================================================
// LEDGER
// ============================================================================

/// Owns every request and the escrow side effects of its transitions
#[derive(Debug)]
pub struct RequestLedger {
    requests: HashMap<RequestId, Request>,
    /// Creation order, oldest first
    order: Vec<RequestId>,
    /// Accounts with providing mode switched on
    providers: HashSet<AccountId>,
    default_retry_limit: u32,
}

impl RequestLedger {
    pub fn new() -> Self {
        Self::with_retry_limit(DEFAULT_RETRY_LIMIT)
    }

    pub fn with_retry_limit(default_retry_limit: u32) -> Self {
        Self {
            requests: HashMap::new(),
            order: Vec::new(),
            providers: HashSet::new(),
            default_retry_limit,
        }
    }

    pub fn default_retry_limit(&self) -> u32 {
        self.default_retry_limit
    }

    // ===== TRANSITIONS =====

    /// Escrow the reward from the requester and insert a pending request
    pub fn create(
        &mut self,
        requester: &AccountId,
        draft: RequestDraft,
        accounts: &mut dyn AccountDirectory,
    ) -> Result<Request, LedgerError> {
        if draft.reward < Decimal::ZERO {
            return Err(LedgerError::InvalidReward(draft.reward));
        }

        let reward = draft.reward;
        let funds = accounts.find(requester).ok_or(LedgerError::InsufficientBalance {
            available: Decimal::ZERO,
            required: reward,
        })?;
        funds.debit(reward)?;

        let request = Request::new(requester.clone(), draft, self.default_retry_limit);
        accounts.record(Movement::new(MovementType::Escrow, requester, reward, Some(&request.id)));

        self.order.push(request.id.clone());
        self.requests.insert(request.id.clone(), request.clone());

        info!(
            request_id = %request.id,
            requester = %requester,
            kind = %request.kind,
            reward = %reward,
            "request created"
        );
        Ok(request)
    }

    /// Withdraw a pending request and refund the requester in full
    pub fn cancel(
        &mut self,
        id: &RequestId,
        caller: &AccountId,
        accounts: &mut dyn AccountDirectory,
    ) -> Result<Request, LedgerError> {
        let request = self.lookup(id)?;
        if &request.requester != caller {
            return Err(LedgerError::invalid_state(request, "only the requester may cancel"));
        }
        if request.status != RequestStatus::Pending {
            return Err(LedgerError::wrong_status(request, "cancel"));
        }

        let reward = request.reward;
        accounts.find_or_open(caller).credit(reward)?;
        accounts.record(Movement::new(MovementType::Refund, caller, reward, Some(id)));

        let request = self.lookup_mut(id)?;
        request.cancel();

        info!(request_id = %id, requester = %caller, refund = %reward, "request canceled");
        Ok(request.clone())
    }

    /// Claim an available request. First acceptance wins.
    pub fn accept(&mut self, id: &RequestId, provider: &AccountId) -> Result<Request, LedgerError> {
        if !self.providers.contains(provider) {
            return Err(LedgerError::NotProviding(provider.clone()));
        }

        let request = self.lookup(id)?;
        if !request.is_available() || &request.requester == provider {
            debug!(request_id = %id, provider = %provider, status = %request.status, "accept rejected");
            return Err(LedgerError::NotAvailable(id.clone()));
        }

        let request = self.lookup_mut(id)?;
        request.start_processing(provider.clone());

        info!(request_id = %id, provider = %provider, "request accepted");
        Ok(request.clone())
    }

    /// Deliver the response and release escrow to the provider
    pub fn complete(
        &mut self,
        id: &RequestId,
        caller: &AccountId,
        response: String,
        accounts: &mut dyn AccountDirectory,
    ) -> Result<Request, LedgerError> {
        let request = self.lookup(id)?;
        if request.status != RequestStatus::Processing {
            return Err(LedgerError::wrong_status(request, "complete"));
        }
        if request.provider.as_ref() != Some(caller) {
            return Err(LedgerError::invalid_state(request, "only the current provider may complete"));
        }

        let reward = request.reward;
        accounts.find_or_open(caller).credit(reward)?;
        accounts.record(Movement::new(MovementType::Payout, caller, reward, Some(id)));

        let request = self.lookup_mut(id)?;
        request.complete(response);

        info!(request_id = %id, provider = %caller, reward = %reward, "request completed");
        Ok(request.clone())
    }

    /// Record a provider failure. The reward stays escrowed, nothing is refunded.
    pub fn fail(&mut self, id: &RequestId, caller: &AccountId, message: String) -> Result<Request, LedgerError> {
        let request = self.lookup(id)?;
        if request.status != RequestStatus::Processing {
            return Err(LedgerError::wrong_status(request, "fail"));
        }
        if request.provider.as_ref() != Some(caller) {
            return Err(LedgerError::invalid_state(request, "only the current provider may fail"));
        }

        let request = self.lookup_mut(id)?;
        request.fail(message);

        if request.is_forfeited() {
            warn!(
                request_id = %id,
                provider = %caller,
                reward = %request.reward,
                "request failed with no retries left, reward forfeited"
            );
        } else {
            info!(
                request_id = %id,
                provider = %caller,
                retries_left = request.retry_limit - request.retry_count,
                "request failed"
            );
        }
        Ok(request.clone())
    }

    /// Put a failed request back up for acceptance without re-debiting
    pub fn retry(&mut self, id: &RequestId, caller: &AccountId) -> Result<Request, LedgerError> {
        let request = self.lookup(id)?;
        if &request.requester != caller {
            return Err(LedgerError::invalid_state(request, "only the requester may retry"));
        }
        if request.status != RequestStatus::Failed {
            return Err(LedgerError::wrong_status(request, "retry"));
        }
        if request.retry_count >= request.retry_limit {
            return Err(LedgerError::RetryLimitExceeded {
                id: id.clone(),
                limit: request.retry_limit,
            });
        }

        let request = self.lookup_mut(id)?;
        request.reset_for_retry();

        info!(
            request_id = %id,
            attempt = request.retry_count,
            limit = request.retry_limit,
            "request retried"
        );
        Ok(request.clone())
    }

    /// Switch providing mode for an account. Returns whether anyone is
    /// providing afterwards. Requests are not touched.
    pub fn toggle_providing(&mut self, account: &AccountId, on: bool) -> bool {
        let changed = if on {
            self.providers.insert(account.clone())
        } else {
            self.providers.remove(account)
        };
        if changed {
            info!(account = %account, providing = on, "providing mode changed");
        }
        !self.providers.is_empty()
    }

    pub fn is_providing(&self, account: &AccountId) -> bool {
        self.providers.contains(account)
    }

    pub fn any_providing(&self) -> bool {
        !self.providers.is_empty()
    }

    // ===== QUERIES =====

    pub fn get(&self, id: &RequestId) -> Option<&Request> {
        self.requests.get(id)
    }

    /// All requests, newest first
    pub fn requests(&self) -> impl Iterator<Item = &Request> {
        self.order.iter().rev().filter_map(|id| self.requests.get(id))
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Members of `view` for `caller`, newest first
    pub fn view(&self, view: View, caller: &AccountId, filter: &ViewFilter) -> Vec<Request> {
        let matching = self
            .requests()
            .filter(|r| view.contains(r, caller) && filter.matches(r))
            .cloned();
        match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }

    pub fn outgoing(&self, caller: &AccountId) -> Vec<Request> {
        self.view(View::Outgoing, caller, &ViewFilter::default())
    }

    pub fn incoming(&self, caller: &AccountId) -> Vec<Request> {
        self.view(View::Incoming, caller, &ViewFilter::default())
    }

    pub fn available(&self, filter: &ViewFilter) -> Vec<Request> {
        // available does not depend on the caller
        self.view(View::Available, &AccountId::network(), filter)
    }

    pub fn fulfilled(&self, caller: &AccountId) -> Vec<Request> {
        self.view(View::Fulfilled, caller, &ViewFilter::default())
    }

    pub fn total_earned(&self, account: &AccountId) -> Decimal {
        views::total_earned(self.requests.values(), account)
    }

    pub fn total_spent(&self, account: &AccountId) -> Decimal {
        views::total_spent(self.requests.values(), account)
    }

    /// Rewards still held and releasable by a future transition
    pub fn escrowed_total(&self) -> Decimal {
        self.requests.values().filter(|r| r.holds_escrow()).map(|r| r.reward).sum()
    }

    /// Rewards of requests that failed for good
    pub fn forfeited_total(&self) -> Decimal {
        self.requests.values().filter(|r| r.is_forfeited()).map(|r| r.reward).sum()
    }

    pub fn stats(&self) -> LedgerStats {
        LedgerStats::collect(self.requests.values())
    }

    fn lookup(&self, id: &RequestId) -> Result<&Request, LedgerError> {
        self.requests.get(id).ok_or_else(|| LedgerError::NotFound(id.clone()))
    }

    fn lookup_mut(&mut self, id: &RequestId) -> Result<&mut Request, LedgerError> {
        self.requests.get_mut(id).ok_or_else(|| LedgerError::NotFound(id.clone()))
    }
}

impl Default for RequestLedger {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RequestKind;
    use crate::wallet::{BalanceAccount, WalletBook};
    use rust_decimal_macros::dec;

    fn setup() -> (RequestLedger, WalletBook, AccountId, AccountId) {
        let mut book = WalletBook::new();
        let alice = AccountId::from("alice");
        let bob = AccountId::from("bob");
        book.open(&alice, dec!(10.0));
        book.open(&bob, dec!(0));
        let mut ledger = RequestLedger::new();
        ledger.toggle_providing(&bob, true);
        (ledger, book, alice, bob)
    }

    fn text(reward: Decimal) -> RequestDraft {
        RequestDraft::new(RequestKind::Text, "write a haiku", "gpt-4", reward)
    }

    #[test]
    fn test_create_debits_and_inserts() {
        let (mut ledger, mut book, alice, _) = setup();
        let req = ledger.create(&alice, text(dec!(0.15)), &mut book).unwrap();

        assert_eq!(req.status, RequestStatus::Pending);
        assert_eq!(book.balance(&alice), dec!(9.85));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.escrowed_total(), dec!(0.15));
    }

    #[test]
    fn test_create_insufficient_balance() {
        let (mut ledger, mut book, _, _) = setup();
        let carol = AccountId::from("carol");
        book.open(&carol, dec!(1.00));

        let result = ledger.create(&carol, text(dec!(1.50)), &mut book);
        assert!(matches!(result, Err(LedgerError::InsufficientBalance { .. })));
        assert_eq!(book.balance(&carol), dec!(1.00));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_create_unknown_account_has_no_funds() {
        let (mut ledger, mut book, _, _) = setup();
        let ghost = AccountId::from("ghost");
        let result = ledger.create(&ghost, text(dec!(0.01)), &mut book);
        assert!(matches!(result, Err(LedgerError::InsufficientBalance { .. })));
        assert!(!book.contains(&ghost));
    }

    #[test]
    fn test_create_rejects_negative_reward() {
        let (mut ledger, mut book, alice, _) = setup();
        let result = ledger.create(&alice, text(dec!(-1)), &mut book);
        assert_eq!(result.unwrap_err(), LedgerError::InvalidReward(dec!(-1)));
        assert_eq!(book.balance(&alice), dec!(10.0));
    }

    #[test]
    fn test_zero_reward_allowed() {
        let (mut ledger, mut book, alice, _) = setup();
        let req = ledger.create(&alice, text(Decimal::ZERO), &mut book).unwrap();
        assert_eq!(req.reward, Decimal::ZERO);
        assert_eq!(book.balance(&alice), dec!(10.0));
    }

    #[test]
    fn test_cancel_refunds_in_full() {
        let (mut ledger, mut book, alice, _) = setup();
        let req = ledger.create(&alice, text(dec!(2.5)), &mut book).unwrap();

        let canceled = ledger.cancel(&req.id, &alice, &mut book).unwrap();
        assert_eq!(canceled.status, RequestStatus::Canceled);
        assert_eq!(book.balance(&alice), dec!(10.0));
        assert_eq!(ledger.escrowed_total(), Decimal::ZERO);

        // still visible in history
        assert_eq!(ledger.outgoing(&alice).len(), 1);
    }

    #[test]
    fn test_cancel_by_stranger_rejected() {
        let (mut ledger, mut book, alice, bob) = setup();
        let req = ledger.create(&alice, text(dec!(1)), &mut book).unwrap();

        let result = ledger.cancel(&req.id, &bob, &mut book);
        assert!(matches!(result, Err(LedgerError::InvalidState { .. })));
        assert_eq!(book.balance(&bob), Decimal::ZERO);
        assert_eq!(ledger.get(&req.id).unwrap().status, RequestStatus::Pending);
    }

    #[test]
    fn test_cancel_processing_rejected() {
        let (mut ledger, mut book, alice, bob) = setup();
        let req = ledger.create(&alice, text(dec!(1)), &mut book).unwrap();
        ledger.accept(&req.id, &bob).unwrap();

        let result = ledger.cancel(&req.id, &alice, &mut book);
        assert!(matches!(result, Err(LedgerError::InvalidState { .. })));
        assert_eq!(book.balance(&alice), dec!(9));
    }

    #[test]
    fn test_accept_first_wins() {
        let (mut ledger, mut book, alice, bob) = setup();
        let dave = AccountId::from("dave");
        ledger.toggle_providing(&dave, true);
        let req = ledger.create(&alice, text(dec!(1)), &mut book).unwrap();

        let accepted = ledger.accept(&req.id, &bob).unwrap();
        assert_eq!(accepted.status, RequestStatus::Processing);
        assert_eq!(accepted.provider, Some(bob.clone()));
        assert!(ledger.available(&ViewFilter::default()).is_empty());

        assert_eq!(ledger.accept(&req.id, &dave), Err(LedgerError::NotAvailable(req.id.clone())));
        assert_eq!(ledger.accept(&req.id, &bob), Err(LedgerError::NotAvailable(req.id.clone())));
        assert_eq!(ledger.get(&req.id).unwrap().provider, Some(bob));
    }

    #[test]
    fn test_accept_requires_providing_mode() {
        let (mut ledger, mut book, alice, _) = setup();
        let dave = AccountId::from("dave");
        let req = ledger.create(&alice, text(dec!(1)), &mut book).unwrap();

        assert_eq!(ledger.accept(&req.id, &dave), Err(LedgerError::NotProviding(dave.clone())));

        ledger.toggle_providing(&dave, true);
        assert!(ledger.accept(&req.id, &dave).is_ok());
    }

    #[test]
    fn test_requester_cannot_accept_own_request() {
        let (mut ledger, mut book, alice, _) = setup();
        ledger.toggle_providing(&alice, true);
        let req = ledger.create(&alice, text(dec!(1)), &mut book).unwrap();
        assert_eq!(ledger.accept(&req.id, &alice), Err(LedgerError::NotAvailable(req.id.clone())));
    }

    #[test]
    fn test_complete_pays_provider() {
        let (mut ledger, mut book, alice, bob) = setup();
        let req = ledger.create(&alice, text(dec!(0.15)), &mut book).unwrap();
        ledger.accept(&req.id, &bob).unwrap();

        let done = ledger.complete(&req.id, &bob, "hello".into(), &mut book).unwrap();
        assert_eq!(done.status, RequestStatus::Completed);
        assert_eq!(done.response.as_deref(), Some("hello"));
        assert!(done.completed_at.is_some());
        assert_eq!(book.balance(&bob), dec!(0.15));
        assert_eq!(ledger.fulfilled(&bob).len(), 1);
        assert!(ledger.incoming(&bob).is_empty());
        assert_eq!(ledger.total_earned(&bob), dec!(0.15));
        assert_eq!(ledger.total_spent(&alice), dec!(0.15));
    }

    #[test]
    fn test_complete_by_other_provider_rejected() {
        let (mut ledger, mut book, alice, bob) = setup();
        let dave = AccountId::from("dave");
        ledger.toggle_providing(&dave, true);
        let req = ledger.create(&alice, text(dec!(1)), &mut book).unwrap();
        ledger.accept(&req.id, &bob).unwrap();

        let result = ledger.complete(&req.id, &dave, "stolen".into(), &mut book);
        assert!(matches!(result, Err(LedgerError::InvalidState { .. })));
        assert!(!book.contains(&dave));
        assert_eq!(ledger.get(&req.id).unwrap().status, RequestStatus::Processing);
    }

    #[test]
    fn test_fail_by_other_provider_rejected() {
        let (mut ledger, mut book, alice, bob) = setup();
        let dave = AccountId::from("dave");
        ledger.toggle_providing(&dave, true);
        let req = ledger.create(&alice, text(dec!(1)), &mut book).unwrap();
        ledger.accept(&req.id, &bob).unwrap();

        let result = ledger.fail(&req.id, &dave, "sabotage".into());
        assert!(matches!(result, Err(LedgerError::InvalidState { .. })));
        let stored = ledger.get(&req.id).unwrap();
        assert_eq!(stored.status, RequestStatus::Processing);
        assert_eq!(stored.provider.as_ref(), Some(&bob));
        assert!(stored.error.is_none());
    }

    #[test]
    fn test_retry_by_non_requester_rejected() {
        let (mut ledger, mut book, alice, bob) = setup();
        let req = ledger.create(&alice, text(dec!(1)), &mut book).unwrap();
        ledger.accept(&req.id, &bob).unwrap();
        ledger.fail(&req.id, &bob, "timeout".into()).unwrap();

        let result = ledger.retry(&req.id, &bob);
        assert!(matches!(result, Err(LedgerError::InvalidState { .. })));
        let stored = ledger.get(&req.id).unwrap();
        assert_eq!(stored.status, RequestStatus::Failed);
        assert_eq!(stored.retry_count, 0);
    }

    /// Pays into an account that refuses every credit
    struct SealedPayouts {
        book: WalletBook,
        sealed: Sealed,
    }

    struct Sealed;

    impl BalanceAccount for Sealed {
        fn balance(&self) -> Decimal {
            Decimal::ZERO
        }

        fn debit(&mut self, amount: Decimal) -> Result<(), FundsError> {
            Err(FundsError::InsufficientFunds {
                available: Decimal::ZERO,
                requested: amount,
            })
        }

        fn credit(&mut self, amount: Decimal) -> Result<(), FundsError> {
            Err(FundsError::CreditRefused { requested: amount })
        }
    }

    impl AccountDirectory for SealedPayouts {
        fn find(&mut self, owner: &AccountId) -> Option<&mut dyn BalanceAccount> {
            self.book.account_mut(owner)
        }

        fn find_or_open(&mut self, _owner: &AccountId) -> &mut dyn BalanceAccount {
            &mut self.sealed
        }

        fn record(&mut self, movement: Movement) {
            self.book.record(movement);
        }
    }

    #[test]
    fn test_refused_credit_leaves_request_untouched() {
        let (mut ledger, book, alice, bob) = setup();
        let mut accounts = SealedPayouts { book, sealed: Sealed };
        let req = ledger.create(&alice, text(dec!(0.40)), &mut accounts).unwrap();

        ledger.accept(&req.id, &bob).unwrap();
        let result = ledger.complete(&req.id, &bob, "done".into(), &mut accounts);
        assert_eq!(result, Err(LedgerError::CreditRefused { amount: dec!(0.40) }));
        assert_eq!(ledger.get(&req.id).unwrap().status, RequestStatus::Processing);
        assert_eq!(ledger.escrowed_total(), dec!(0.40));

        ledger.fail(&req.id, &bob, "payout refused".into()).unwrap();
        ledger.retry(&req.id, &alice).unwrap();
        let result = ledger.cancel(&req.id, &alice, &mut accounts);
        assert!(matches!(result, Err(LedgerError::CreditRefused { .. })));
        assert_eq!(ledger.get(&req.id).unwrap().status, RequestStatus::Pending);
        assert_eq!(accounts.book.journal_for(&bob).len(), 1);
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        let (mut ledger, mut book, alice, bob) = setup();
        let req = ledger.create(&alice, text(dec!(1)), &mut book).unwrap();
        ledger.accept(&req.id, &bob).unwrap();
        ledger.complete(&req.id, &bob, "ok".into(), &mut book).unwrap();

        let before = (book.balance(&alice), book.balance(&bob));
        assert!(matches!(ledger.cancel(&req.id, &alice, &mut book), Err(LedgerError::InvalidState { .. })));
        assert!(matches!(
            ledger.complete(&req.id, &bob, "again".into(), &mut book),
            Err(LedgerError::InvalidState { .. })
        ));
        assert!(matches!(ledger.fail(&req.id, &bob, "late".into()), Err(LedgerError::InvalidState { .. })));
        assert_eq!((book.balance(&alice), book.balance(&bob)), before);
    }

    #[test]
    fn test_fail_keeps_escrow() {
        let (mut ledger, mut book, alice, bob) = setup();
        let req = ledger.create(&alice, text(dec!(1)), &mut book).unwrap();
        ledger.accept(&req.id, &bob).unwrap();

        let failed = ledger.fail(&req.id, &bob, "model crashed".into()).unwrap();
        assert_eq!(failed.status, RequestStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("model crashed"));
        assert!(failed.completed_at.is_some());
        assert_eq!(book.balance(&alice), dec!(9));
        assert_eq!(book.balance(&bob), Decimal::ZERO);
    }

    #[test]
    fn test_fail_pending_rejected() {
        let (mut ledger, mut book, alice, bob) = setup();
        let req = ledger.create(&alice, text(dec!(1)), &mut book).unwrap();
        assert!(matches!(ledger.fail(&req.id, &bob, "x".into()), Err(LedgerError::InvalidState { .. })));
    }

    #[test]
    fn test_retry_returns_to_available_without_debit() {
        let (mut ledger, mut book, alice, bob) = setup();
        let req = ledger.create(&alice, text(dec!(1)), &mut book).unwrap();
        ledger.accept(&req.id, &bob).unwrap();
        ledger.fail(&req.id, &bob, "timeout".into()).unwrap();

        let retried = ledger.retry(&req.id, &alice).unwrap();
        assert_eq!(retried.status, RequestStatus::Pending);
        assert_eq!(retried.retry_count, 1);
        assert!(retried.provider.is_none());
        assert_eq!(book.balance(&alice), dec!(9));
        assert_eq!(ledger.available(&ViewFilter::default()).len(), 1);
    }

    #[test]
    fn test_retry_limit_exceeded() {
        let (mut ledger, mut book, alice, bob) = setup();
        let req = ledger.create(&alice, text(dec!(1)), &mut book).unwrap();

        for _ in 0..3 {
            ledger.accept(&req.id, &bob).unwrap();
            ledger.fail(&req.id, &bob, "flaky".into()).unwrap();
            ledger.retry(&req.id, &alice).unwrap();
        }
        ledger.accept(&req.id, &bob).unwrap();
        ledger.fail(&req.id, &bob, "flaky".into()).unwrap();

        let result = ledger.retry(&req.id, &alice);
        assert_eq!(result, Err(LedgerError::RetryLimitExceeded { id: req.id.clone(), limit: 3 }));
        let stored = ledger.get(&req.id).unwrap();
        assert_eq!(stored.status, RequestStatus::Failed);
        assert_eq!(stored.retry_count, 3);
        assert_eq!(ledger.forfeited_total(), dec!(1));
        assert_eq!(ledger.escrowed_total(), Decimal::ZERO);
    }

    #[test]
    fn test_retry_non_failed_rejected() {
        let (mut ledger, mut book, alice, _) = setup();
        let req = ledger.create(&alice, text(dec!(1)), &mut book).unwrap();
        assert!(matches!(ledger.retry(&req.id, &alice), Err(LedgerError::InvalidState { .. })));
    }

    #[test]
    fn test_unknown_id() {
        let (mut ledger, mut book, alice, bob) = setup();
        let id = RequestId::from("req_missing");
        assert_eq!(ledger.cancel(&id, &alice, &mut book), Err(LedgerError::NotFound(id.clone())));
        assert_eq!(ledger.accept(&id, &bob), Err(LedgerError::NotFound(id.clone())));
        assert_eq!(ledger.retry(&id, &alice), Err(LedgerError::NotFound(id.clone())));
    }

    #[test]
    fn test_toggle_providing_reports_any() {
        let mut ledger = RequestLedger::new();
        let bob = AccountId::from("bob");
        assert!(!ledger.any_providing());
        assert!(ledger.toggle_providing(&bob, true));
        assert!(ledger.is_providing(&bob));
        assert!(!ledger.toggle_providing(&bob, false));
    }

    #[test]
    fn test_views_newest_first() {
        let (mut ledger, mut book, alice, _) = setup();
        let first = ledger.create(&alice, text(dec!(0.1)), &mut book).unwrap();
        let second = ledger
            .create(&alice, RequestDraft::new(RequestKind::Image, "a fox", "sdxl", dec!(0.2)), &mut book)
            .unwrap();

        let outgoing = ledger.outgoing(&alice);
        assert_eq!(outgoing[0].id, second.id);
        assert_eq!(outgoing[1].id, first.id);

        let images = ledger.available(&ViewFilter::kind(RequestKind::Image));
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].id, second.id);
    }

    #[test]
    fn test_journal_tracks_escrow_movements() {
        let (mut ledger, mut book, alice, bob) = setup();
        let req = ledger.create(&alice, text(dec!(0.5)), &mut book).unwrap();
        ledger.accept(&req.id, &bob).unwrap();
        ledger.complete(&req.id, &bob, "ok".into(), &mut book).unwrap();

        let alice_moves: Vec<_> = book.journal_for(&alice).iter().map(|m| m.movement_type).collect();
        assert_eq!(alice_moves, vec![MovementType::Deposit, MovementType::Escrow]);
        let bob_moves: Vec<_> = book.journal_for(&bob).iter().map(|m| m.movement_type).collect();
        assert_eq!(bob_moves, vec![MovementType::Deposit, MovementType::Payout]);
    }
}
