// ============================================================================
// Network Feed - simulated peers posting requests to the market
// ============================================================================
//
// While at least one local account is providing, every `interval` the feed
// rolls against `probability` and, on a hit, synthesizes a request from a
// small fixed vocabulary. Submissions go through the normal create path with
// the network account as requester, so escrow is drawn from the faucet.
//
// ============================================================================

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::marketplace::Marketplace;
use crate::models::{Request, RequestDraft, RequestKind};
use crate::request_ledger::LedgerError;

const TEXT_PROMPTS: &[&str] = &[
    "Summarize this research paper on climate adaptation",
    "Translate the product announcement into Spanish",
    "Write a short story about a lighthouse keeper",
    "Draft a polite reminder email for an overdue invoice",
];

const IMAGE_PROMPTS: &[&str] = &[
    "A watercolor city skyline at dawn",
    "Isometric illustration of a solar-powered village",
    "Logo concept for a community garden",
];

const AUDIO_PROMPTS: &[&str] = &[
    "Transcribe a five minute interview",
    "Generate a calm ambient loop for meditation",
    "Narrate a children's book chapter",
];

const CODE_PROMPTS: &[&str] = &[
    "Write a function that validates IBAN numbers",
    "Convert this Python script to Rust",
    "Add unit tests for a rate limiter",
];

const TEXT_MODELS: &[&str] = &["gpt-4", "llama-3-70b", "mistral-large"];
const IMAGE_MODELS: &[&str] = &["sdxl", "dall-e-3", "midjourney-v6"];
const AUDIO_MODELS: &[&str] = &["whisper-large", "bark", "musicgen"];
const CODE_MODELS: &[&str] = &["codellama-34b", "starcoder2", "gpt-4"];

/// (prompts, models) a synthetic request of `kind` draws from
fn vocabulary(kind: RequestKind) -> (&'static [&'static str], &'static [&'static str]) {
    match kind {
        RequestKind::Text => (TEXT_PROMPTS, TEXT_MODELS),
        RequestKind::Image => (IMAGE_PROMPTS, IMAGE_MODELS),
        RequestKind::Audio => (AUDIO_PROMPTS, AUDIO_MODELS),
        RequestKind::Code => (CODE_PROMPTS, CODE_MODELS),
    }
}

/// Pacing and reward bounds of the synthetic feed
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    pub interval: Duration,
    /// Chance per tick of posting a request, in [0, 1]
    pub probability: f64,
    pub reward_min: Decimal,
    pub reward_max: Decimal,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5000),
            probability: 0.3,
            reward_min: dec!(0.05),
            reward_max: dec!(0.50),
        }
    }
}

/// Reward bound as whole cents, rounding toward the inside of the range
fn to_cents(amount: Decimal, round_up: bool) -> i64 {
    let scaled = amount * dec!(100);
    let cents = if round_up { scaled.ceil() } else { scaled.floor() };
    cents.to_i64().unwrap_or(0).max(0)
}

/// Lowest and highest whole-cent reward inside `[min, max]`, or `None` when
/// the range holds no whole cent
pub(crate) fn whole_cent_bounds(min: Decimal, max: Decimal) -> Option<(i64, i64)> {
    let low = to_cents(min, true);
    let high = to_cents(max, false);
    (low <= high).then_some((low, high))
}

pub struct NetworkFeed {
    market: Marketplace,
    config: FeedConfig,
    rng: StdRng,
}

impl NetworkFeed {
    pub fn new(market: Marketplace, config: FeedConfig) -> Self {
        Self::with_rng(market, config, StdRng::from_entropy())
    }

    /// Deterministic feed for tests and replays
    pub fn with_rng(market: Marketplace, config: FeedConfig, rng: StdRng) -> Self {
        Self { market, config, rng }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Random kind, model and prompt with a reward in the configured range,
    /// rounded to two decimal places
    pub fn generate_draft(&mut self) -> RequestDraft {
        let kind = RequestKind::ALL[self.rng.gen_range(0..RequestKind::ALL.len())];
        let (prompts, models) = vocabulary(kind);
        let prompt = prompts.choose(&mut self.rng).copied().unwrap_or("Untitled request");
        let model = models.choose(&mut self.rng).copied().unwrap_or("default");

        let reward = match whole_cent_bounds(self.config.reward_min, self.config.reward_max) {
            Some((low, high)) => Decimal::new(self.rng.gen_range(low..=high), 2),
            None => self.config.reward_max,
        };

        RequestDraft::new(kind, prompt, model, reward)
    }

    /// One feed tick: roll the dice and maybe post a request
    pub fn tick(&mut self) -> Result<Option<Request>, LedgerError> {
        if !self.rng.gen_bool(self.config.probability.clamp(0.0, 1.0)) {
            debug!("feed tick produced nothing");
            return Ok(None);
        }

        let draft = self.generate_draft();
        let request = self.market.submit_from_network(draft)?;
        info!(
            request_id = %request.id,
            kind = %request.kind,
            reward = %request.reward,
            "network posted request"
        );
        Ok(Some(request))
    }

    /// Produce requests while providing mode is on anywhere. Runs until the
    /// task is aborted.
    pub async fn run(mut self) {
        let mut providing = self.market.subscribe_providing();
        let mut ticker = time::interval_at(Instant::now() + self.config.interval, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if !*providing.borrow_and_update() {
                if providing.changed().await.is_err() {
                    break;
                }
                ticker.reset();
                continue;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick() {
                        warn!(error = %e, "network submission rejected");
                    }
                }
                changed = providing.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        debug!("network feed stopped");
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
