// Runtime configuration
//
// Every setting has a default; `.env` is honoured through dotenv. A value that
// is present but unparseable stops startup rather than silently falling back.

use rust_decimal::Decimal;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::models::{AccountId, DEFAULT_RETRY_LIMIT};
use crate::network_feed::{whole_cent_bounds, FeedConfig};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{var}: {reason}")]
    OutOfRange { var: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketConfig {
    pub bind_addr: SocketAddr,
    pub local_account: AccountId,
    pub initial_balance: Decimal,
    pub retry_limit: u32,
    pub feed: FeedConfig,
    pub provider_delay: Duration,
    pub provider_failure_rate: f64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 1234)),
            local_account: AccountId::new("local"),
            initial_balance: Decimal::new(1000, 2),
            retry_limit: DEFAULT_RETRY_LIMIT,
            feed: FeedConfig::default(),
            provider_delay: Duration::from_millis(3000),
            provider_failure_rate: 0.1,
        }
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn probability(var: &'static str, value: f64) -> Result<f64, ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::OutOfRange {
            var,
            reason: format!("{} is not a probability in [0, 1]", value),
        })
    }
}

impl MarketConfig {
    /// Load from the process environment after reading `.env` if present
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; missing keys take their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let local_account = lookup("MARKET_LOCAL_ACCOUNT")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(AccountId::new)
            .unwrap_or(defaults.local_account);
        if local_account.is_network() {
            return Err(ConfigError::OutOfRange {
                var: "MARKET_LOCAL_ACCOUNT",
                reason: "the network account is reserved".to_string(),
            });
        }

        let initial_balance = parse(&lookup, "MARKET_INITIAL_BALANCE", defaults.initial_balance)?;
        if initial_balance < Decimal::ZERO {
            return Err(ConfigError::OutOfRange {
                var: "MARKET_INITIAL_BALANCE",
                reason: "must not be negative".to_string(),
            });
        }

        let interval_ms = parse(&lookup, "FEED_INTERVAL_MS", defaults.feed.interval.as_millis() as u64)?;
        if interval_ms == 0 {
            return Err(ConfigError::OutOfRange {
                var: "FEED_INTERVAL_MS",
                reason: "must be greater than zero".to_string(),
            });
        }

        let reward_min = parse(&lookup, "FEED_REWARD_MIN", defaults.feed.reward_min)?;
        let reward_max = parse(&lookup, "FEED_REWARD_MAX", defaults.feed.reward_max)?;
        if reward_min < Decimal::ZERO || reward_min > reward_max {
            return Err(ConfigError::OutOfRange {
                var: "FEED_REWARD_MIN",
                reason: format!("range {}..{} is empty or negative", reward_min, reward_max),
            });
        }
        if whole_cent_bounds(reward_min, reward_max).is_none() {
            return Err(ConfigError::OutOfRange {
                var: "FEED_REWARD_MIN",
                reason: format!("range {}..{} holds no whole-cent reward", reward_min, reward_max),
            });
        }

        let feed = FeedConfig {
            interval: Duration::from_millis(interval_ms),
            probability: probability(
                "FEED_PROBABILITY",
                parse(&lookup, "FEED_PROBABILITY", defaults.feed.probability)?,
            )?,
            reward_min,
            reward_max,
        };

        let delay_ms = parse(&lookup, "PROVIDER_DELAY_MS", defaults.provider_delay.as_millis() as u64)?;

        Ok(Self {
            bind_addr: parse(&lookup, "MARKET_BIND_ADDR", defaults.bind_addr)?,
            local_account,
            initial_balance,
            retry_limit: parse(&lookup, "MARKET_RETRY_LIMIT", defaults.retry_limit)?,
            feed,
            provider_delay: Duration::from_millis(delay_ms),
            provider_failure_rate: probability(
                "PROVIDER_FAILURE_RATE",
                parse(&lookup, "PROVIDER_FAILURE_RATE", defaults.provider_failure_rate)?,
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<MarketConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MarketConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config, MarketConfig::default());
        assert_eq!(config.initial_balance, dec!(10.00));
        assert_eq!(config.bind_addr.port(), 1234);
        assert_eq!(config.feed.interval, Duration::from_secs(5));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("MARKET_BIND_ADDR", "127.0.0.1:8080"),
            ("MARKET_LOCAL_ACCOUNT", "alice"),
            ("MARKET_INITIAL_BALANCE", "25.5"),
            ("MARKET_RETRY_LIMIT", "5"),
            ("FEED_PROBABILITY", "1"),
            ("FEED_REWARD_MAX", "2.00"),
            ("PROVIDER_DELAY_MS", "0"),
        ])
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.local_account, AccountId::from("alice"));
        assert_eq!(config.initial_balance, dec!(25.5));
        assert_eq!(config.retry_limit, 5);
        assert_eq!(config.feed.probability, 1.0);
        assert_eq!(config.feed.reward_max, dec!(2.00));
        assert!(config.provider_delay.is_zero());
    }

    #[test]
    fn test_invalid_value_names_variable() {
        let err = load(&[("MARKET_RETRY_LIMIT", "three")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "MARKET_RETRY_LIMIT", .. }));
        assert!(err.to_string().starts_with("MARKET_RETRY_LIMIT"));
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(matches!(
            load(&[("FEED_PROBABILITY", "1.5")]),
            Err(ConfigError::OutOfRange { var: "FEED_PROBABILITY", .. })
        ));
        assert!(matches!(
            load(&[("FEED_REWARD_MIN", "0.60")]),
            Err(ConfigError::OutOfRange { var: "FEED_REWARD_MIN", .. })
        ));
        assert!(matches!(
            load(&[("MARKET_LOCAL_ACCOUNT", "network")]),
            Err(ConfigError::OutOfRange { var: "MARKET_LOCAL_ACCOUNT", .. })
        ));
        assert!(load(&[("FEED_INTERVAL_MS", "0")]).is_err());
        assert!(matches!(
            load(&[("FEED_REWARD_MIN", "0.051"), ("FEED_REWARD_MAX", "0.059")]),
            Err(ConfigError::OutOfRange { var: "FEED_REWARD_MIN", .. })
        ));
        assert!(load(&[("FEED_REWARD_MIN", "0.051"), ("FEED_REWARD_MAX", "0.06")]).is_ok());
    }
}
