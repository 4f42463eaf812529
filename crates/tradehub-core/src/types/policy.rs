//! Auto-profit policy.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the automatic profit-taking engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoProfitPolicy {
    /// Gain fraction that triggers a close, e.g. 0.05 for +5%
    pub threshold: Decimal,
    /// Seconds between evaluation ticks
    pub interval_secs: u64,
    /// Symbols the engine watches; empty means every held asset
    pub symbols: Vec<String>,
}

impl AutoProfitPolicy {
    /// The evaluation tick interval.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// The multiplier applied to the entry price, 1 + threshold.
    pub fn trigger_multiplier(&self) -> Decimal {
        Decimal::ONE + self.threshold
    }

    /// Whether the engine watches this symbol.
    pub fn watches(&self, symbol: &str) -> bool {
        self.symbols.is_empty() || self.symbols.iter().any(|s| s.eq_ignore_ascii_case(symbol))
    }

    pub fn with_threshold(mut self, threshold: Decimal) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_interval_secs(mut self, secs: u64) -> Self {
        self.interval_secs = secs;
        self
    }

    pub fn with_symbols(mut self, symbols: Vec<String>) -> Self {
        self.symbols = symbols;
        self
    }
}

impl Default for AutoProfitPolicy {
    fn default() -> Self {
        Self {
            threshold: dec!(0.05),
            interval_secs: 10,
            symbols: Vec::new(),
        }
    }
}

/// Runtime state of the profit-taking engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Whether the evaluation task is running
    pub running: bool,
    /// The active policy, once the engine has been enabled
    pub policy: Option<AutoProfitPolicy>,
    /// When the engine last completed an evaluation pass
    pub last_tick: Option<DateTime<Utc>>,
    /// Symbols with a close order in flight, with the order's client key
    pub in_flight: Vec<(String, String)>,
}
