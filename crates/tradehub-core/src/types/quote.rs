//! Quotes and merged market views.

use crate::types::exchange::ExchangeId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A price observation from one venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    /// Internal instrument symbol
    pub symbol: String,
    /// Best bid
    pub bid: Decimal,
    /// Best ask
    pub ask: Decimal,
    /// Last traded price
    pub last: Decimal,
    /// 24h price change percent, when the venue reports it
    pub change_24h: Option<Decimal>,
    /// 24h traded volume in the base asset, when the venue reports it
    pub volume_24h: Option<Decimal>,
    /// Venue the quote came from
    pub exchange: ExchangeId,
    /// When the quote was received
    pub observed_at: DateTime<Utc>,
}

impl Quote {
    /// Bid/ask midpoint.
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }
}

/// Where a market view's primary price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceBasis {
    /// A venue quote selected by the freshness rule
    Live(ExchangeId),
    /// The static reference table; no venue has ever quoted this symbol
    Fallback,
}

/// Merged per-instrument market state across all venues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketView {
    /// Internal instrument symbol
    pub symbol: String,
    /// Last good quote per venue
    pub quotes: Vec<Quote>,
    /// The price the rest of the system values against
    pub primary_price: Decimal,
    /// Provenance of the primary price
    pub basis: PriceBasis,
    /// Observation time of the primary quote
    pub as_of: DateTime<Utc>,
}

impl MarketView {
    /// The quote contributed by a specific venue, if it has one.
    pub fn quote_for(&self, exchange: ExchangeId) -> Option<&Quote> {
        self.quotes.iter().find(|q| q.exchange == exchange)
    }

    pub fn is_fallback(&self) -> bool {
        self.basis == PriceBasis::Fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_quote_mid() {
        let quote = Quote {
            symbol: "BTC".to_string(),
            bid: dec!(92990),
            ask: dec!(93010),
            last: dec!(93000),
            change_24h: Some(dec!(1.8)),
            volume_24h: Some(dec!(10542)),
            exchange: ExchangeId::Binance,
            observed_at: Utc::now(),
        };
        assert_eq!(quote.mid(), dec!(93000));
    }

    #[test]
    fn test_quote_for_venue() {
        let now = Utc::now();
        let view = MarketView {
            symbol: "ETH".to_string(),
            quotes: vec![Quote {
                symbol: "ETH".to_string(),
                bid: dec!(3099),
                ask: dec!(3101),
                last: dec!(3100),
                change_24h: None,
                volume_24h: None,
                exchange: ExchangeId::Coinbase,
                observed_at: now,
            }],
            primary_price: dec!(3100),
            basis: PriceBasis::Live(ExchangeId::Coinbase),
            as_of: now,
        };
        assert!(view.quote_for(ExchangeId::Coinbase).is_some());
        assert!(view.quote_for(ExchangeId::Binance).is_none());
        assert!(!view.is_fallback());
    }
}
