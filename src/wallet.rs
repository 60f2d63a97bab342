/// Wallet balances for marketplace participants
///
/// The request ledger never owns balances. It is handed a `BalanceAccount`
/// capability for the party a transition pays from or into:
/// - `Wallet`: a participant's spendable balance
/// - `Faucet`: the simulated network's external funds source
/// - `WalletBook`: account id -> wallet registry plus the movement journal

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{AccountId, RequestId};

// ============================================================================
// CAPABILITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum FundsError {
    #[error("Insufficient funds: have {available}, need {requested}")]
    InsufficientFunds { available: Decimal, requested: Decimal },

    #[error("Credit of {requested} refused")]
    CreditRefused { requested: Decimal },
}

/// A single mutable balance the ledger debits and credits
pub trait BalanceAccount {
    fn balance(&self) -> Decimal;

    /// Remove `amount`, or leave the balance untouched and fail
    fn debit(&mut self, amount: Decimal) -> Result<(), FundsError>;

    /// Add `amount`. An account that cannot take it fails without changing
    /// its balance.
    fn credit(&mut self, amount: Decimal) -> Result<(), FundsError>;
}

/// Hands the ledger the balance capability of a given party, only after the
/// transition's guards have passed.
pub trait AccountDirectory {
    /// Existing account, if any
    fn find(&mut self, owner: &AccountId) -> Option<&mut dyn BalanceAccount>;

    /// Existing account, or a freshly opened empty one
    fn find_or_open(&mut self, owner: &AccountId) -> &mut dyn BalanceAccount;

    /// Journal a completed movement
    fn record(&mut self, _movement: Movement) {}
}

// ============================================================================
// WALLET
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub owner: AccountId,
    pub available: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(owner: AccountId, initial: Decimal) -> Self {
        Self {
            owner,
            available: initial,
            created_at: Utc::now(),
        }
    }
}

impl BalanceAccount for Wallet {
    fn balance(&self) -> Decimal {
        self.available
    }

    fn debit(&mut self, amount: Decimal) -> Result<(), FundsError> {
        if self.available < amount {
            return Err(FundsError::InsufficientFunds {
                available: self.available,
                requested: amount,
            });
        }
        self.available -= amount;
        Ok(())
    }

    fn credit(&mut self, amount: Decimal) -> Result<(), FundsError> {
        self.available += amount;
        Ok(())
    }
}

// ============================================================================
// FAUCET
// ============================================================================

/// Unlimited source backing the simulated network requester. Every debit is
/// recorded as injected value so conservation checks can subtract it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Faucet {
    /// Total drawn from outside the system
    pub injected: Decimal,
    /// Refunds returned to the network (canceled network requests)
    pub returned: Decimal,
}

impl BalanceAccount for Faucet {
    fn balance(&self) -> Decimal {
        self.returned - self.injected
    }

    fn debit(&mut self, amount: Decimal) -> Result<(), FundsError> {
        self.injected += amount;
        Ok(())
    }

    fn credit(&mut self, amount: Decimal) -> Result<(), FundsError> {
        self.returned += amount;
        Ok(())
    }
}

// ============================================================================
// JOURNAL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    /// Opening balance
    Deposit,
    /// Reward debited into escrow at creation
    Escrow,
    /// Escrow returned to the requester on cancel
    Refund,
    /// Escrow released to the provider on completion
    Payout,
}

/// One balance movement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Movement {
    pub movement_type: MovementType,
    pub account: AccountId,
    pub amount: Decimal,
    pub request_id: Option<RequestId>,
    pub timestamp: DateTime<Utc>,
}

impl Movement {
    pub fn new(movement_type: MovementType, account: &AccountId, amount: Decimal, request_id: Option<&RequestId>) -> Self {
        Self {
            movement_type,
            account: account.clone(),
            amount,
            request_id: request_id.cloned(),
            timestamp: Utc::now(),
        }
    }
}

// ============================================================================
// WALLET BOOK
// ============================================================================

/// Every participant wallet plus the network faucet
#[derive(Debug, Default)]
pub struct WalletBook {
    wallets: HashMap<AccountId, Wallet>,
    faucet: Faucet,
    journal: Vec<Movement>,
}

impl WalletBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account with an opening balance. Re-registering keeps the
    /// existing wallet untouched. The network id never gets a wallet; its
    /// faucet balance is returned instead.
    pub fn open(&mut self, owner: &AccountId, initial: Decimal) -> Decimal {
        if owner.is_network() {
            warn!(account = %owner, "refusing to open a wallet for the reserved network account");
            return self.faucet.balance();
        }
        if let Some(existing) = self.wallets.get(owner) {
            return existing.available;
        }
        self.wallets.insert(owner.clone(), Wallet::new(owner.clone(), initial));
        self.journal.push(Movement::new(MovementType::Deposit, owner, initial, None));
        debug!(account = %owner, balance = %initial, "wallet opened");
        initial
    }

    pub fn contains(&self, owner: &AccountId) -> bool {
        owner.is_network() || self.wallets.contains_key(owner)
    }

    /// Spendable balance, zero for unknown accounts
    pub fn balance(&self, owner: &AccountId) -> Decimal {
        if owner.is_network() {
            return self.faucet.balance();
        }
        self.wallets.get(owner).map(|w| w.available).unwrap_or(Decimal::ZERO)
    }

    /// Capability for an existing participant, or the faucet for the network
    pub fn account_mut(&mut self, owner: &AccountId) -> Option<&mut dyn BalanceAccount> {
        if owner.is_network() {
            return Some(&mut self.faucet as &mut dyn BalanceAccount);
        }
        self.wallets.get_mut(owner).map(|w| w as &mut dyn BalanceAccount)
    }

    /// Like `account_mut`, but opens an empty wallet first. Providers may be
    /// paid before they ever held funds.
    pub fn account_or_open(&mut self, owner: &AccountId) -> &mut dyn BalanceAccount {
        if owner.is_network() {
            return &mut self.faucet;
        }
        if !self.wallets.contains_key(owner) {
            self.open(owner, Decimal::ZERO);
        }
        self.wallets
            .entry(owner.clone())
            .or_insert_with(|| Wallet::new(owner.clone(), Decimal::ZERO))
    }

    pub fn record(&mut self, movement: Movement) {
        self.journal.push(movement);
    }

    pub fn journal_for(&self, owner: &AccountId) -> Vec<&Movement> {
        self.journal.iter().filter(|m| &m.account == owner).collect()
    }

    pub fn faucet(&self) -> &Faucet {
        &self.faucet
    }

    /// Sum of every participant wallet (faucet excluded)
    pub fn total_available(&self) -> Decimal {
        self.wallets.values().map(|w| w.available).sum()
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Wallet> {
        self.wallets.values()
    }
}

impl AccountDirectory for WalletBook {
    fn find(&mut self, owner: &AccountId) -> Option<&mut dyn BalanceAccount> {
        self.account_mut(owner)
    }

    fn find_or_open(&mut self, owner: &AccountId) -> &mut dyn BalanceAccount {
        self.account_or_open(owner)
    }

    fn record(&mut self, movement: Movement) {
        WalletBook::record(self, movement);
    }
}
