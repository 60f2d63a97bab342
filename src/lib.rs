//! UBI Request Market
//! Escrowed request lifecycle, request views and the simulated network

pub mod app_state;
pub mod config;
pub mod fulfillment;
pub mod handlers;
pub mod marketplace;
pub mod models;
pub mod network_feed;
pub mod request_ledger;
pub mod routes;
pub mod views;
pub mod wallet;

pub use app_state::AppState;
pub use config::{ConfigError, MarketConfig};
pub use fulfillment::{Fulfiller, ProviderWorker, SimulatedFulfiller};
pub use marketplace::{MarketState, Marketplace};
pub use models::{AccountId, Request, RequestDraft, RequestId, RequestKind, RequestStatus, DEFAULT_RETRY_LIMIT, NETWORK_ACCOUNT};
pub use network_feed::{FeedConfig, NetworkFeed};
pub use request_ledger::{LedgerError, RequestLedger};
pub use routes::router;
pub use views::{AccountTotals, LedgerStats, View, ViewFilter};
pub use wallet::{AccountDirectory, BalanceAccount, Faucet, FundsError, Movement, MovementType, Wallet, WalletBook};
