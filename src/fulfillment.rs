// ============================================================================
// Fulfillment - provider-side processing of accepted requests
// ============================================================================
//
// The marketplace only records outcomes. The actual work happens behind the
// `Fulfiller` trait; the default implementation fakes it with canned output
// and a configurable failure rate.
//
// ============================================================================

use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::marketplace::Marketplace;
use crate::models::{AccountId, Request, RequestId, RequestKind};
use crate::request_ledger::LedgerError;

/// Performs the computation a request asks for
pub trait Fulfiller: Send + Sync {
    /// Response payload on success, error description on failure
    fn fulfill(&self, request: &Request) -> Result<String, String>;
}

// ============================================================================
// SIMULATED FULFILLER
// ============================================================================

const SIMULATED_ERRORS: &[&str] = &[
    "Model inference timed out",
    "GPU out of memory",
    "Provider node lost connection",
    "Content policy rejected the prompt",
];

#[derive(Debug, Clone)]
pub struct SimulatedFulfiller {
    /// Probability in [0, 1] that a request fails
    pub failure_rate: f64,
}

impl SimulatedFulfiller {
    pub fn new(failure_rate: f64) -> Self {
        Self {
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }

    fn canned_response(request: &Request) -> String {
        match request.kind {
            RequestKind::Text => format!(
                "Generated text for \"{}\" using {}.",
                request.prompt, request.model
            ),
            RequestKind::Image => format!("ipfs://image/{}.png", request.id),
            RequestKind::Audio => format!("ipfs://audio/{}.mp3", request.id),
            RequestKind::Code => format!(
                "// {}\nfn solution() -> Result<(), String> {{\n    Ok(())\n}}",
                request.prompt
            ),
        }
    }
}

impl Default for SimulatedFulfiller {
    fn default() -> Self {
        Self::new(0.1)
    }
}

impl Fulfiller for SimulatedFulfiller {
    fn fulfill(&self, request: &Request) -> Result<String, String> {
        let mut rng = rand::thread_rng();
        if rng.gen_bool(self.failure_rate) {
            let msg = SIMULATED_ERRORS
                .choose(&mut rng)
                .copied()
                .unwrap_or("Unknown provider error");
            return Err(msg.to_string());
        }
        Ok(Self::canned_response(request))
    }
}

// ============================================================================
// PROVIDER WORKER
// ============================================================================

/// Drives one provider through accept -> fulfill -> complete/fail
#[derive(Clone)]
pub struct ProviderWorker {
    market: Marketplace,
    provider: AccountId,
    fulfiller: Arc<dyn Fulfiller>,
    delay: Duration,
}

impl ProviderWorker {
    pub fn new(market: Marketplace, provider: AccountId, fulfiller: Arc<dyn Fulfiller>, delay: Duration) -> Self {
        Self {
            market,
            provider,
            fulfiller,
            delay,
        }
    }

    pub fn provider(&self) -> &AccountId {
        &self.provider
    }

    /// Accept `id`, do the work outside the marketplace lock, then record the
    /// outcome. Returns the request in its final state for this attempt.
    pub async fn process(&self, id: &RequestId) -> Result<Request, LedgerError> {
        let accepted = self.market.accept(id, &self.provider)?;
        self.finish(accepted).await
    }

    /// Spawn `process` on the runtime
    pub fn spawn(&self, id: RequestId) -> JoinHandle<Result<Request, LedgerError>> {
        let worker = self.clone();
        tokio::spawn(async move { worker.process(&id).await })
    }

    /// Accept now and finish in the background. The caller learns right away
    /// whether the claim succeeded.
    pub fn begin(&self, id: &RequestId) -> Result<(Request, JoinHandle<Result<Request, LedgerError>>), LedgerError> {
        let accepted = self.market.accept(id, &self.provider)?;
        let worker = self.clone();
        let claimed = accepted.clone();
        let handle = tokio::spawn(async move { worker.finish(claimed).await });
        Ok((accepted, handle))
    }

    async fn finish(&self, accepted: Request) -> Result<Request, LedgerError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let id = &accepted.id;
        match self.fulfiller.fulfill(&accepted) {
            Ok(response) => {
                info!(request_id = %id, provider = %self.provider, "fulfillment succeeded");
                self.market.complete(id, &self.provider, response)
            }
            Err(message) => {
                warn!(request_id = %id, provider = %self.provider, error = %message, "fulfillment failed");
                self.market.fail(id, &self.provider, message)
            }
        }
    }
}
