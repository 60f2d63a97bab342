// Shared marketplace handle
//
// All mutation (UI actions, the simulated network feed, provider workers)
// funnels through one mutex around the request ledger and the wallets, so an
// accept cannot race another accept and a create cannot interleave with a
// balance read.

use rust_decimal::Decimal;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::models::{AccountId, Request, RequestDraft, RequestId};
use crate::request_ledger::{LedgerError, RequestLedger};
use crate::views::{AccountTotals, LedgerStats, View, ViewFilter};
use crate::wallet::{Movement, WalletBook};

/// Everything guarded by the marketplace lock
#[derive(Debug)]
pub struct MarketState {
    pub ledger: RequestLedger,
    pub wallets: WalletBook,
}

impl MarketState {
    pub fn new(ledger: RequestLedger) -> Self {
        Self {
            ledger,
            wallets: WalletBook::new(),
        }
    }

    /// Participant balances plus releasable escrow. Changes only when the
    /// faucet injects value or a reward is forfeited.
    pub fn conserved_value(&self) -> Decimal {
        self.wallets.total_available() + self.ledger.escrowed_total()
    }
}

#[derive(Debug, Clone)]
pub struct Marketplace {
    state: Arc<Mutex<MarketState>>,
    providing: Arc<watch::Sender<bool>>,
}

impl Marketplace {
    pub fn new(ledger: RequestLedger) -> Self {
        let (providing, _) = watch::channel(false);
        Self {
            state: Arc::new(Mutex::new(MarketState::new(ledger))),
            providing: Arc::new(providing),
        }
    }

    pub fn with_retry_limit(retry_limit: u32) -> Self {
        Self::new(RequestLedger::with_retry_limit(retry_limit))
    }

    /// Every operation validates before mutating, so a panic elsewhere never
    /// leaves the state half-applied; keep serving after a poisoned lock.
    fn lock(&self) -> MutexGuard<'_, MarketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with exclusive access to the whole state
    pub fn with_state<R>(&self, f: impl FnOnce(&mut MarketState) -> R) -> R {
        let mut state = self.lock();
        f(&mut state)
    }

    // ===== ACCOUNTS =====

    pub fn open_account(&self, account: &AccountId, initial: Decimal) -> Decimal {
        self.lock().wallets.open(account, initial)
    }

    pub fn balance(&self, account: &AccountId) -> Decimal {
        self.lock().wallets.balance(account)
    }

    pub fn journal(&self, account: &AccountId) -> Vec<Movement> {
        self.lock().wallets.journal_for(account).into_iter().cloned().collect()
    }

    // ===== OPERATIONS =====

    /// Public callers never act as the network; only the feed does, through
    /// `submit_from_network`.
    fn reject_reserved(account: &AccountId) -> Result<(), LedgerError> {
        if account.is_network() {
            warn!(account = %account, "rejected call on behalf of the network account");
            return Err(LedgerError::ReservedAccount(account.clone()));
        }
        Ok(())
    }

    pub fn create(&self, requester: &AccountId, draft: RequestDraft) -> Result<Request, LedgerError> {
        Self::reject_reserved(requester)?;
        self.create_unchecked(requester, draft)
    }

    fn create_unchecked(&self, requester: &AccountId, draft: RequestDraft) -> Result<Request, LedgerError> {
        let mut state = self.lock();
        let MarketState { ledger, wallets } = &mut *state;
        ledger.create(requester, draft, wallets)
    }

    /// Entry point for the simulated network; escrow is drawn from the faucet
    pub fn submit_from_network(&self, draft: RequestDraft) -> Result<Request, LedgerError> {
        self.create_unchecked(&AccountId::network(), draft)
    }

    pub fn cancel(&self, id: &RequestId, caller: &AccountId) -> Result<Request, LedgerError> {
        Self::reject_reserved(caller)?;
        let mut state = self.lock();
        let MarketState { ledger, wallets } = &mut *state;
        ledger.cancel(id, caller, wallets)
    }

    pub fn accept(&self, id: &RequestId, provider: &AccountId) -> Result<Request, LedgerError> {
        Self::reject_reserved(provider)?;
        self.lock().ledger.accept(id, provider)
    }

    pub fn complete(&self, id: &RequestId, caller: &AccountId, response: String) -> Result<Request, LedgerError> {
        Self::reject_reserved(caller)?;
        let mut state = self.lock();
        let MarketState { ledger, wallets } = &mut *state;
        ledger.complete(id, caller, response, wallets)
    }

    pub fn fail(&self, id: &RequestId, caller: &AccountId, message: String) -> Result<Request, LedgerError> {
        Self::reject_reserved(caller)?;
        self.lock().ledger.fail(id, caller, message)
    }

    pub fn retry(&self, id: &RequestId, caller: &AccountId) -> Result<Request, LedgerError> {
        Self::reject_reserved(caller)?;
        self.lock().ledger.retry(id, caller)
    }

    /// Switch providing mode. Opens an empty wallet for first-time providers
    /// and publishes whether anyone is providing to the network feed. The
    /// flag is sent before the lock is released so concurrent toggles publish
    /// in the order they were applied.
    pub fn toggle_providing(&self, account: &AccountId, on: bool) -> Result<bool, LedgerError> {
        Self::reject_reserved(account)?;
        let mut state = self.lock();
        if on {
            state.wallets.open(account, Decimal::ZERO);
        }
        let any = state.ledger.toggle_providing(account, on);
        let previous = self.providing.send_replace(any);
        drop(state);

        if previous != any {
            info!(providing = any, "network feed {}", if any { "activated" } else { "paused" });
        }
        Ok(any)
    }

    pub fn is_providing(&self, account: &AccountId) -> bool {
        self.lock().ledger.is_providing(account)
    }

    pub fn any_providing(&self) -> bool {
        self.lock().ledger.any_providing()
    }

    /// Watch channel carrying whether any account is providing
    pub fn subscribe_providing(&self) -> watch::Receiver<bool> {
        self.providing.subscribe()
    }

    // ===== QUERIES =====

    pub fn get(&self, id: &RequestId) -> Option<Request> {
        self.lock().ledger.get(id).cloned()
    }

    pub fn view(&self, view: View, caller: &AccountId, filter: &ViewFilter) -> Vec<Request> {
        self.lock().ledger.view(view, caller, filter)
    }

    pub fn outgoing(&self, caller: &AccountId) -> Vec<Request> {
        self.lock().ledger.outgoing(caller)
    }

    pub fn incoming(&self, caller: &AccountId) -> Vec<Request> {
        self.lock().ledger.incoming(caller)
    }

    pub fn available(&self, filter: &ViewFilter) -> Vec<Request> {
        self.lock().ledger.available(filter)
    }

    pub fn fulfilled(&self, caller: &AccountId) -> Vec<Request> {
        self.lock().ledger.fulfilled(caller)
    }

    pub fn total_earned(&self, account: &AccountId) -> Decimal {
        self.lock().ledger.total_earned(account)
    }

    pub fn total_spent(&self, account: &AccountId) -> Decimal {
        self.lock().ledger.total_spent(account)
    }

    /// Balance, totals and view sizes, read under one lock
    pub fn summary(&self, account: &AccountId) -> AccountTotals {
        let state = self.lock();
        let ledger = &state.ledger;
        let totals = AccountTotals {
            account: account.clone(),
            balance: state.wallets.balance(account),
            total_earned: ledger.total_earned(account),
            total_spent: ledger.total_spent(account),
            outgoing: ledger.outgoing(account).len(),
            incoming: ledger.incoming(account).len(),
            fulfilled: ledger.fulfilled(account).len(),
        };
        debug!(account = %account, balance = %totals.balance, "summary read");
        totals
    }

    pub fn stats(&self) -> LedgerStats {
        self.lock().ledger.stats()
    }

    pub fn conserved_value(&self) -> Decimal {
        self.lock().conserved_value()
    }

    /// Total value drawn from the network faucet, net of refunds
    pub fn injected_value(&self) -> Decimal {
        let state = self.lock();
        let faucet = state.wallets.faucet();
        faucet.injected - faucet.returned
    }
}

impl Default for Marketplace {
    fn default() -> Self {
        Self::new(RequestLedger::new())
    }
}
