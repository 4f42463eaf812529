//! Account balance types.

use crate::types::exchange::ExchangeId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Holdings of one asset on one venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    /// Asset code, e.g. `BTC`
    pub asset: String,
    /// Amount free to trade
    pub free: Decimal,
    /// Amount locked in open orders
    pub locked: Decimal,
    /// Venue holding the balance
    pub exchange: ExchangeId,
    /// When the venue reported this balance
    pub as_of: DateTime<Utc>,
}

impl Balance {
    pub fn new(
        asset: impl Into<String>,
        free: Decimal,
        locked: Decimal,
        exchange: ExchangeId,
    ) -> Self {
        Self {
            asset: asset.into().to_ascii_uppercase(),
            free,
            locked,
            exchange,
            as_of: Utc::now(),
        }
    }

    /// Free plus locked.
    pub fn total(&self) -> Decimal {
        self.free + self.locked
    }

    pub fn is_zero(&self) -> bool {
        self.total().is_zero()
    }
}
