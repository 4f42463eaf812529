//! Executed trade records.

use crate::types::exchange::ExchangeId;
use crate::types::order::{Order, Side};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What initiated a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TradeKind {
    /// Placed by a user through the API or CLI
    #[default]
    Manual,
    /// Placed by the profit-taking engine
    AutoProfit,
}

impl std::fmt::Display for TradeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeKind::Manual => write!(f, "MANUAL"),
            TradeKind::AutoProfit => write!(f, "AUTO_PROFIT"),
        }
    }
}

/// An executed fill, as recorded in the trade ledger.
///
/// Records are immutable once appended; `seq` is assigned by the ledger
/// and increases monotonically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Ledger sequence number, 1-based
    pub seq: u64,
    /// Internal order ID the fill belongs to
    pub order_id: Uuid,
    /// Idempotency key of the originating request
    pub client_key: String,
    /// Internal instrument symbol
    pub symbol: String,
    /// Buy or sell
    pub side: Side,
    /// Manual or engine-initiated
    pub kind: TradeKind,
    /// Base quantity executed
    pub quantity: Decimal,
    /// Average execution price
    pub price: Decimal,
    /// quantity times price
    pub notional: Decimal,
    /// Venue that executed the trade
    pub exchange: ExchangeId,
    /// Acquisition price, present on engine closes
    pub entry_price: Option<Decimal>,
    /// Realized gain over entry, in percent
    pub profit_percent: Option<Decimal>,
    /// When the fill completed
    pub executed_at: DateTime<Utc>,
}

impl TradeRecord {
    /// Build the ledger record for a filled order.
    ///
    /// `seq` starts at zero and is assigned on append. Profit percent
    /// is computed when the order carried an entry price.
    pub fn from_order(order: &Order, quantity: Decimal, price: Decimal) -> Self {
        let profit_percent = order.entry_price.and_then(|entry| {
            if entry.is_zero() {
                None
            } else {
                Some((price - entry) / entry * Decimal::ONE_HUNDRED)
            }
        });
        Self {
            seq: 0,
            order_id: order.id,
            client_key: order.client_key.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            kind: order.kind,
            quantity,
            price,
            notional: quantity * price,
            exchange: order.exchange,
            entry_price: order.entry_price,
            profit_percent,
            executed_at: Utc::now(),
        }
    }
}
