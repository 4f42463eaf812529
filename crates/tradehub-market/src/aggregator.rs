//! Multi-venue quote aggregation.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tradehub_core::traits::Exchange;
use tradehub_core::types::{ExchangeId, Instrument, MarketView, PriceBasis, Quote};
use tracing::{debug, warn};

use crate::fallback;

struct VenueState {
    quote: Quote,
    errored: bool,
}

#[derive(Default)]
struct SymbolState {
    venues: HashMap<ExchangeId, VenueState>,
}

/// Merged market state across all connected venues.
///
/// Pollers write through `ingest_quote`/`mark_error`; readers take a
/// short read lock and never wait on a poll. The primary price is the
/// freshest non-errored venue quote, ties broken by the configured
/// venue priority. When every venue for a symbol is errored, the
/// freshest retained quote still serves; freshness enforcement is the
/// portfolio's concern.
pub struct MarketAggregator {
    state: RwLock<HashMap<String, SymbolState>>,
    priority: Vec<ExchangeId>,
}

impl MarketAggregator {
    /// Create an aggregator with the given venue priority order.
    pub fn new(priority: Vec<ExchangeId>) -> Self {
        let priority = if priority.is_empty() {
            ExchangeId::all().to_vec()
        } else {
            priority
        };
        Self {
            state: RwLock::new(HashMap::new()),
            priority,
        }
    }

    /// Store a venue quote, clearing any error mark for that venue.
    pub fn ingest_quote(&self, quote: Quote) {
        let mut state = self.state.write().unwrap();
        let symbol = state.entry(quote.symbol.clone()).or_default();
        symbol.venues.insert(
            quote.exchange,
            VenueState {
                quote,
                errored: false,
            },
        );
    }

    /// Mark a venue's quote for a symbol as errored. The last good
    /// quote is retained.
    pub fn mark_error(&self, exchange: ExchangeId, symbol: &str) {
        let mut state = self.state.write().unwrap();
        if let Some(symbol_state) = state.get_mut(&symbol.to_ascii_uppercase()) {
            if let Some(venue) = symbol_state.venues.get_mut(&exchange) {
                venue.errored = true;
            }
        }
    }

    /// The merged view for one symbol.
    ///
    /// Returns the fallback reference price when no venue has ever
    /// quoted the symbol, and `None` when the symbol is entirely
    /// unknown.
    pub fn view(&self, symbol: &str) -> Option<MarketView> {
        let symbol = symbol.to_ascii_uppercase();
        let state = self.state.read().unwrap();

        let symbol_state = match state.get(&symbol) {
            Some(s) if !s.venues.is_empty() => s,
            _ => return self.fallback_view(&symbol),
        };

        let primary = self
            .select_primary(symbol_state, false)
            .or_else(|| self.select_primary(symbol_state, true));
        let primary = match primary {
            Some(p) => p,
            None => return self.fallback_view(&symbol),
        };

        let mut quotes: Vec<Quote> = symbol_state
            .venues
            .values()
            .map(|v| v.quote.clone())
            .collect();
        quotes.sort_by_key(|q| self.rank(q.exchange));

        Some(MarketView {
            symbol,
            quotes,
            primary_price: primary.last,
            basis: PriceBasis::Live(primary.exchange),
            as_of: primary.observed_at,
        })
    }

    /// Views for every symbol with at least one observation, sorted by
    /// symbol.
    pub fn all_views(&self) -> Vec<MarketView> {
        let symbols: Vec<String> = {
            let state = self.state.read().unwrap();
            let mut symbols: Vec<String> = state.keys().cloned().collect();
            symbols.sort();
            symbols
        };
        symbols.iter().filter_map(|s| self.view(s)).collect()
    }

    /// Spawn the poll task for one venue.
    ///
    /// Each tick fetches every instrument once; failures mark the
    /// venue's entry errored and keep polling.
    pub fn spawn_poller(
        self: &Arc<Self>,
        exchange: Arc<dyn Exchange>,
        instruments: Vec<Instrument>,
        poll_interval: Duration,
    ) -> JoinHandle<()> {
        let aggregator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                for instrument in &instruments {
                    match exchange.fetch_quote(instrument).await {
                        Ok(quote) => {
                            debug!(
                                venue = %exchange.id(),
                                symbol = %instrument.symbol,
                                price = %quote.last,
                                "quote"
                            );
                            aggregator.ingest_quote(quote);
                        }
                        Err(e) => {
                            warn!(
                                venue = %exchange.id(),
                                symbol = %instrument.symbol,
                                error = %e,
                                "quote poll failed"
                            );
                            aggregator.mark_error(exchange.id(), &instrument.symbol);
                        }
                    }
                }
            }
        })
    }

    fn rank(&self, exchange: ExchangeId) -> usize {
        self.priority
            .iter()
            .position(|&e| e == exchange)
            .unwrap_or(usize::MAX)
    }

    fn select_primary<'a>(
        &self,
        symbol_state: &'a SymbolState,
        include_errored: bool,
    ) -> Option<&'a Quote> {
        let mut best: Option<&VenueState> = None;
        for venue in symbol_state.venues.values() {
            if venue.errored && !include_errored {
                continue;
            }
            best = match best {
                None => Some(venue),
                Some(current) => {
                    let newer = venue.quote.observed_at > current.quote.observed_at;
                    let tie = venue.quote.observed_at == current.quote.observed_at
                        && self.rank(venue.quote.exchange) < self.rank(current.quote.exchange);
                    if newer || tie {
                        Some(venue)
                    } else {
                        Some(current)
                    }
                }
            };
        }
        best.map(|v| &v.quote)
    }

    fn fallback_view(&self, symbol: &str) -> Option<MarketView> {
        let price = fallback::reference_price(symbol)?;
        Some(MarketView {
            symbol: symbol.to_string(),
            quotes: Vec::new(),
            primary_price: price,
            basis: PriceBasis::Fallback,
            as_of: DateTime::<Utc>::UNIX_EPOCH,
        })
    }
}
