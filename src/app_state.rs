// Application state shared by the HTTP handlers

use std::sync::Arc;
use std::time::Duration;

use crate::config::MarketConfig;
use crate::fulfillment::{Fulfiller, ProviderWorker, SimulatedFulfiller};
use crate::marketplace::Marketplace;
use crate::models::AccountId;

#[derive(Clone)]
pub struct AppState {
    pub market: Marketplace,
    pub fulfiller: Arc<dyn Fulfiller>,
    pub provider_delay: Duration,
}

impl AppState {
    pub fn new(market: Marketplace) -> Self {
        Self {
            market,
            fulfiller: Arc::new(SimulatedFulfiller::default()),
            provider_delay: Duration::from_millis(3000),
        }
    }

    pub fn from_config(market: Marketplace, config: &MarketConfig) -> Self {
        Self {
            market,
            fulfiller: Arc::new(SimulatedFulfiller::new(config.provider_failure_rate)),
            provider_delay: config.provider_delay,
        }
    }

    pub fn with_fulfiller(mut self, fulfiller: Arc<dyn Fulfiller>, delay: Duration) -> Self {
        self.fulfiller = fulfiller;
        self.provider_delay = delay;
        self
    }

    /// Worker acting for `provider` with the configured fulfiller
    pub fn worker(&self, provider: AccountId) -> ProviderWorker {
        ProviderWorker::new(self.market.clone(), provider, self.fulfiller.clone(), self.provider_delay)
    }
}
