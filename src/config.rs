//! Runtime configuration read from the environment

use crate::catalog::{DEFAULT_MAX_DESCRIPTION_LEN, DEFAULT_MAX_TITLE_LEN};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_SEARCH_RADIUS_KM: f64 = 10.0;

/// Limits applied by the guided flows
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowLimits {
    pub max_title_len: usize,
    pub max_description_len: usize,
    /// Search radius used when the viewer has not chosen one
    pub default_radius_km: f64,
}

impl Default for FlowLimits {
    fn default() -> Self {
        Self {
            max_title_len: DEFAULT_MAX_TITLE_LEN,
            max_description_len: DEFAULT_MAX_DESCRIPTION_LEN,
            default_radius_km: DEFAULT_SEARCH_RADIUS_KM,
        }
    }
}

/// Process configuration
#[derive(Debug, Clone)]
pub struct MarketConfig {
    pub db_path: String,
    pub port: u16,
    pub limits: FlowLimits,
    /// Idle sessions older than this are dropped; `None` keeps them forever
    pub session_ttl: Option<Duration>,
}

impl MarketConfig {
    pub fn from_env() -> Self {
        let db_path = std::env::var("SWAP_DB_PATH").unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            format!("{home}/.swap-market/market.db")
        });

        let defaults = FlowLimits::default();
        let limits = FlowLimits {
            max_title_len: env_parse("SWAP_MAX_TITLE_LEN").unwrap_or(defaults.max_title_len),
            max_description_len: env_parse("SWAP_MAX_DESCRIPTION_LEN")
                .unwrap_or(defaults.max_description_len),
            default_radius_km: env_parse::<f64>("SWAP_SEARCH_RADIUS_KM")
                .filter(|r| *r > 0.0)
                .unwrap_or(defaults.default_radius_km),
        };

        Self {
            db_path,
            port: env_parse("SWAP_PORT").unwrap_or(DEFAULT_PORT),
            limits,
            session_ttl: env_parse::<u64>("SWAP_SESSION_TTL_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
