//! Tradable instruments and their per-venue symbol mappings.

use crate::types::exchange::ExchangeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A tradable asset identified by its internal symbol.
///
/// The internal symbol is the bare asset code (`BTC`); each venue has
/// its own spelling which `venue_symbol` produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    /// Internal symbol, e.g. `BTC`
    pub symbol: String,
    /// Quote currency, e.g. `USD`
    pub quote: String,
}

impl Instrument {
    pub fn new(symbol: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into().to_ascii_uppercase(),
            quote: quote.into().to_ascii_uppercase(),
        }
    }

    /// USD-quoted instrument.
    pub fn usd(symbol: impl Into<String>) -> Self {
        Self::new(symbol, "USD")
    }

    /// The symbol string the venue expects for this instrument.
    ///
    /// Binance trades against USDT (`BTCUSDT`); Coinbase and the
    /// simulator use dashed pairs (`BTC-USD`).
    pub fn venue_symbol(&self, exchange: ExchangeId) -> String {
        match exchange {
            ExchangeId::Binance => format!("{}USDT", self.symbol),
            ExchangeId::Coinbase | ExchangeId::Sim => {
                format!("{}-{}", self.symbol, self.quote)
            }
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.symbol, self.quote)
    }
}

/// Lookup table of supported instruments, keyed by internal symbol.
#[derive(Debug, Clone, Default)]
pub struct InstrumentCatalog {
    instruments: HashMap<String, Instrument>,
}

impl InstrumentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The default coverage: the majors traded on both venues.
    pub fn defaults() -> Self {
        let mut catalog = Self::new();
        for symbol in ["BTC", "ETH", "BNB", "SOL", "ADA", "XRP"] {
            catalog.insert(Instrument::usd(symbol));
        }
        catalog
    }

    pub fn insert(&mut self, instrument: Instrument) {
        self.instruments
            .insert(instrument.symbol.clone(), instrument);
    }

    pub fn get(&self, symbol: &str) -> Option<&Instrument> {
        self.instruments.get(&symbol.to_ascii_uppercase())
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.get(symbol).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instrument> {
        self.instruments.values()
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_venue_symbols() {
        let btc = Instrument::usd("BTC");
        assert_eq!(btc.venue_symbol(ExchangeId::Binance), "BTCUSDT");
        assert_eq!(btc.venue_symbol(ExchangeId::Coinbase), "BTC-USD");
        assert_eq!(btc.venue_symbol(ExchangeId::Sim), "BTC-USD");
    }

    #[test]
    fn test_catalog_lookup_is_case_insensitive() {
        let catalog = InstrumentCatalog::defaults();
        assert!(catalog.contains("btc"));
        assert!(catalog.contains("ETH"));
        assert!(!catalog.contains("DOGE"));
        assert_eq!(catalog.get("sol").unwrap().symbol, "SOL");
    }

    #[test]
    fn test_default_catalog_covers_majors() {
        let catalog = InstrumentCatalog::defaults();
        assert_eq!(catalog.len(), 6);
    }
}
