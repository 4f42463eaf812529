//! Aggregated portfolio snapshot types.

use crate::types::exchange::ExchangeId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Why a position's valuation is not trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    /// The venue balance is older than the freshness window
    BalanceExpired,
    /// The valuation quote is older than the freshness window
    QuoteExpired,
    /// No live quote has ever been observed for the asset
    QuoteMissing,
}

impl std::fmt::Display for StaleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StaleReason::BalanceExpired => write!(f, "balance expired"),
            StaleReason::QuoteExpired => write!(f, "quote expired"),
            StaleReason::QuoteMissing => write!(f, "quote missing"),
        }
    }
}

/// One asset's merged holdings across every venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetPosition {
    /// Asset code
    pub asset: String,
    /// Total quantity across venues
    pub quantity: Decimal,
    /// Per-venue quantity breakdown
    pub by_exchange: Vec<(ExchangeId, Decimal)>,
    /// Valuation price (primary price, or 1 for stablecoins)
    pub price: Decimal,
    /// quantity times price
    pub value: Decimal,
    /// Set when the valuation cannot be trusted
    pub stale: Option<StaleReason>,
}

impl AssetPosition {
    pub fn is_stale(&self) -> bool {
        self.stale.is_some()
    }

    /// Quantity held on one venue.
    pub fn quantity_on(&self, exchange: ExchangeId) -> Decimal {
        self.by_exchange
            .iter()
            .find(|(id, _)| *id == exchange)
            .map(|(_, qty)| *qty)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Point-in-time valuation of all holdings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    /// Merged positions, largest value first
    pub positions: Vec<AssetPosition>,
    /// Sum of value over non-stale positions only
    pub total_value: Decimal,
    /// Venues that contributed nothing (failed with no cached balances)
    pub missing_exchanges: Vec<ExchangeId>,
    /// When the snapshot was assembled
    pub as_of: DateTime<Utc>,
}

impl PortfolioSnapshot {
    /// The position for one asset, if held.
    pub fn position(&self, asset: &str) -> Option<&AssetPosition> {
        let asset = asset.to_ascii_uppercase();
        self.positions.iter().find(|p| p.asset == asset)
    }

    /// Positions currently counted in the total.
    pub fn fresh_positions(&self) -> impl Iterator<Item = &AssetPosition> {
        self.positions.iter().filter(|p| !p.is_stale())
    }
}
