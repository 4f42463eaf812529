//! Portfolio aggregation.
//!
//! Merges balances from every connected venue into a single valued
//! snapshot. Venue failures degrade to the last known balances instead
//! of failing the snapshot; positions whose inputs have aged past the
//! freshness window are flagged stale and left out of the total.

use chrono::{DateTime, TimeDelta, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tradehub_core::traits::Exchange;
use tradehub_core::types::{
    AssetPosition, Balance, EngineStatus, ExchangeId, PortfolioSnapshot, StaleReason, TradeRecord,
};
use tradehub_ledger::TradeLedger;
use tradehub_market::MarketAggregator;
use tracing::{debug, warn};

/// Assets valued at face without a market quote.
const STABLE_ASSETS: [&str; 3] = ["USD", "USDC", "USDT"];

/// Trades attached to an overview.
const OVERVIEW_TRADES: usize = 10;

/// The portfolio snapshot with recent activity attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioOverview {
    pub snapshot: PortfolioSnapshot,
    pub recent_trades: Vec<TradeRecord>,
    pub engine: EngineStatus,
}

/// Values holdings across venues against the aggregator's primary
/// prices.
pub struct PortfolioService {
    exchanges: HashMap<ExchangeId, Arc<dyn Exchange>>,
    market: Arc<MarketAggregator>,
    ledger: Arc<TradeLedger>,
    cache: Mutex<HashMap<ExchangeId, Vec<Balance>>>,
    ttl: TimeDelta,
}

impl PortfolioService {
    pub fn new(
        exchanges: HashMap<ExchangeId, Arc<dyn Exchange>>,
        market: Arc<MarketAggregator>,
        ledger: Arc<TradeLedger>,
        ttl: TimeDelta,
    ) -> Self {
        Self {
            exchanges,
            market,
            ledger,
            cache: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Assemble a point-in-time valuation of all holdings.
    ///
    /// The total counts non-stale positions only; stale positions stay
    /// visible with their reason. Venues that fail with nothing cached
    /// land in `missing_exchanges`.
    pub async fn snapshot(&self) -> PortfolioSnapshot {
        let fetches = self.exchanges.iter().map(|(&id, exchange)| {
            let exchange = Arc::clone(exchange);
            async move { (id, exchange.fetch_balances().await) }
        });
        let results = join_all(fetches).await;

        let now = Utc::now();
        let mut missing_exchanges = Vec::new();
        let mut balances: Vec<Balance> = Vec::new();
        {
            let mut cache = self.cache.lock().unwrap();
            for (id, result) in results {
                match result {
                    Ok(fetched) => {
                        cache.insert(id, fetched.clone());
                        balances.extend(fetched);
                    }
                    Err(e) => {
                        warn!(venue = %id, error = %e, "balance fetch failed");
                        if let Some(cached) = cache.get(&id) {
                            debug!(venue = %id, "serving last known balances");
                            balances.extend(cached.iter().cloned());
                        } else {
                            missing_exchanges.push(id);
                        }
                    }
                }
            }
        }
        missing_exchanges.sort_by_key(|id| id.as_str());

        let mut by_asset: HashMap<String, Vec<Balance>> = HashMap::new();
        for balance in balances {
            by_asset.entry(balance.asset.clone()).or_default().push(balance);
        }

        let mut positions: Vec<AssetPosition> = Vec::new();
        for (asset, rows) in by_asset {
            let quantity: Decimal = rows.iter().map(Balance::total).sum();
            if quantity.is_zero() {
                continue;
            }
            let mut by_exchange: Vec<(ExchangeId, Decimal)> =
                rows.iter().map(|b| (b.exchange, b.total())).collect();
            by_exchange.sort_by_key(|(id, _)| id.as_str());

            let oldest = rows.iter().map(|b| b.as_of).min().unwrap_or(now);
            let balance_expired = self.expired(oldest, now);
            let (price, stale) = self.value_asset(&asset, now, balance_expired);

            positions.push(AssetPosition {
                asset,
                quantity,
                by_exchange,
                price,
                value: quantity * price,
                stale,
            });
        }
        positions.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.asset.cmp(&b.asset)));

        let total_value = positions
            .iter()
            .filter(|p| !p.is_stale())
            .map(|p| p.value)
            .sum();

        PortfolioSnapshot {
            positions,
            total_value,
            missing_exchanges,
            as_of: now,
        }
    }

    /// The snapshot plus recent trades and the engine's state.
    pub async fn overview(&self, engine: EngineStatus) -> PortfolioOverview {
        PortfolioOverview {
            snapshot: self.snapshot().await,
            recent_trades: self.ledger.recent(OVERVIEW_TRADES),
            engine,
        }
    }

    /// Valuation price and staleness for one asset. An expired balance
    /// outranks any quote condition.
    fn value_asset(
        &self,
        asset: &str,
        now: DateTime<Utc>,
        balance_expired: bool,
    ) -> (Decimal, Option<StaleReason>) {
        if STABLE_ASSETS.contains(&asset) {
            let stale = balance_expired.then_some(StaleReason::BalanceExpired);
            return (Decimal::ONE, stale);
        }

        let (price, quote_stale) = match self.market.view(asset) {
            None => (Decimal::ZERO, Some(StaleReason::QuoteMissing)),
            Some(view) if view.is_fallback() => {
                (view.primary_price, Some(StaleReason::QuoteMissing))
            }
            Some(view) => {
                let stale = self
                    .expired(view.as_of, now)
                    .then_some(StaleReason::QuoteExpired);
                (view.primary_price, stale)
            }
        };
        let stale = if balance_expired {
            Some(StaleReason::BalanceExpired)
        } else {
            quote_stale
        };
        (price, stale)
    }

    fn expired(&self, as_of: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - as_of > self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tradehub_core::error::ExchangeError;
    use tradehub_core::types::{
        Amount, Instrument, Order, OrderAck, OrderRequest, Quote, Side, TradeRecord,
    };

    /// Venue double that serves a fixed balance table.
    struct StaticVenue {
        id: ExchangeId,
        balances: Mutex<Vec<Balance>>,
        fail: AtomicBool,
    }

    impl StaticVenue {
        fn new(id: ExchangeId, balances: Vec<Balance>) -> Self {
            Self {
                id,
                balances: Mutex::new(balances),
                fail: AtomicBool::new(false),
            }
        }

        fn set_fail(&self, failing: bool) {
            self.fail.store(failing, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Exchange for StaticVenue {
        fn id(&self) -> ExchangeId {
            self.id
        }

        async fn fetch_quote(&self, instrument: &Instrument) -> Result<Quote, ExchangeError> {
            Err(ExchangeError::NotFound(instrument.symbol.clone()))
        }

        async fn fetch_balances(&self) -> Result<Vec<Balance>, ExchangeError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ExchangeError::Network("venue offline".to_string()));
            }
            Ok(self.balances.lock().unwrap().clone())
        }

        async fn place_order(&self, _request: &OrderRequest) -> Result<OrderAck, ExchangeError> {
            Err(ExchangeError::Validation("orders not supported".to_string()))
        }

        async fn cancel_order(
            &self,
            venue_order_id: &str,
            _instrument: &Instrument,
        ) -> Result<(), ExchangeError> {
            Err(ExchangeError::NotFound(venue_order_id.to_string()))
        }
    }

    fn balance_aged(asset: &str, quantity: Decimal, exchange: ExchangeId, age_secs: i64) -> Balance {
        Balance {
            asset: asset.to_string(),
            free: quantity,
            locked: Decimal::ZERO,
            exchange,
            as_of: Utc::now() - TimeDelta::seconds(age_secs),
        }
    }

    fn quote_aged(symbol: &str, price: Decimal, age_secs: i64) -> Quote {
        Quote {
            symbol: symbol.to_string(),
            bid: price,
            ask: price,
            last: price,
            change_24h: None,
            volume_24h: None,
            exchange: ExchangeId::Sim,
            observed_at: Utc::now() - TimeDelta::seconds(age_secs),
        }
    }

    fn service(
        venues: Vec<Arc<dyn Exchange>>,
        market: Arc<MarketAggregator>,
        ledger: Arc<TradeLedger>,
    ) -> PortfolioService {
        let exchanges = venues.into_iter().map(|v| (v.id(), v)).collect();
        PortfolioService::new(exchanges, market, ledger, TimeDelta::seconds(30))
    }

    #[tokio::test]
    async fn test_total_counts_only_fresh_positions() {
        let venue = Arc::new(StaticVenue::new(
            ExchangeId::Sim,
            vec![
                balance_aged("BTC", dec!(0.5), ExchangeId::Sim, 0),
                balance_aged("ETH", dec!(2), ExchangeId::Sim, 120),
            ],
        ));
        let market = Arc::new(MarketAggregator::new(vec![]));
        market.ingest_quote(quote_aged("BTC", dec!(93000), 0));
        market.ingest_quote(quote_aged("ETH", dec!(3100), 0));

        let portfolio = service(
            vec![venue],
            market,
            Arc::new(TradeLedger::new()),
        );
        let snapshot = portfolio.snapshot().await;

        let btc = snapshot.position("BTC").unwrap();
        assert!(!btc.is_stale());
        assert_eq!(btc.value, dec!(46500.0));

        let eth = snapshot.position("ETH").unwrap();
        assert_eq!(eth.stale, Some(StaleReason::BalanceExpired));

        assert_eq!(snapshot.total_value, dec!(46500.0));
        let fresh_sum: Decimal = snapshot.fresh_positions().map(|p| p.value).sum();
        assert_eq!(snapshot.total_value, fresh_sum);
    }

    #[tokio::test]
    async fn test_quote_staleness_reasons() {
        let venue = Arc::new(StaticVenue::new(
            ExchangeId::Sim,
            vec![
                balance_aged("BTC", dec!(1), ExchangeId::Sim, 0),
                balance_aged("SOL", dec!(10), ExchangeId::Sim, 0),
                balance_aged("LTC", dec!(5), ExchangeId::Sim, 0),
                balance_aged("USD", dec!(100), ExchangeId::Sim, 0),
            ],
        ));
        let market = Arc::new(MarketAggregator::new(vec![]));
        market.ingest_quote(quote_aged("BTC", dec!(93000), 120));

        let portfolio = service(vec![venue], market, Arc::new(TradeLedger::new()));
        let snapshot = portfolio.snapshot().await;

        assert_eq!(
            snapshot.position("BTC").unwrap().stale,
            Some(StaleReason::QuoteExpired)
        );
        // Never quoted, but covered by the reference table.
        let sol = snapshot.position("SOL").unwrap();
        assert_eq!(sol.stale, Some(StaleReason::QuoteMissing));
        assert_eq!(sol.price, dec!(245));
        // Never quoted and unknown to the reference table.
        let ltc = snapshot.position("LTC").unwrap();
        assert_eq!(ltc.stale, Some(StaleReason::QuoteMissing));
        assert_eq!(ltc.price, Decimal::ZERO);

        // Only the cash position counts.
        assert_eq!(snapshot.total_value, dec!(100));
    }

    #[tokio::test]
    async fn test_stablecoins_value_at_face() {
        let venue = Arc::new(StaticVenue::new(
            ExchangeId::Sim,
            vec![
                balance_aged("USD", dec!(1000), ExchangeId::Sim, 0),
                balance_aged("USDT", dec!(500), ExchangeId::Sim, 0),
            ],
        ));
        let market = Arc::new(MarketAggregator::new(vec![]));
        let portfolio = service(vec![venue], market, Arc::new(TradeLedger::new()));

        let snapshot = portfolio.snapshot().await;
        assert_eq!(snapshot.position("USD").unwrap().price, Decimal::ONE);
        assert_eq!(snapshot.position("USDT").unwrap().price, Decimal::ONE);
        assert_eq!(snapshot.total_value, dec!(1500));
    }

    #[tokio::test]
    async fn test_failed_venue_serves_cached_balances() {
        let flaky = Arc::new(StaticVenue::new(
            ExchangeId::Sim,
            vec![balance_aged("BTC", dec!(1), ExchangeId::Sim, 0)],
        ));
        let dark = Arc::new(StaticVenue::new(ExchangeId::Binance, vec![]));
        dark.set_fail(true);

        let market = Arc::new(MarketAggregator::new(vec![]));
        market.ingest_quote(quote_aged("BTC", dec!(93000), 0));
        let portfolio = service(
            vec![Arc::clone(&flaky) as Arc<dyn Exchange>, dark],
            market,
            Arc::new(TradeLedger::new()),
        );

        // First snapshot primes the cache for the healthy venue.
        let first = portfolio.snapshot().await;
        assert!(first.position("BTC").is_some());
        assert_eq!(first.missing_exchanges, vec![ExchangeId::Binance]);

        flaky.set_fail(true);
        let second = portfolio.snapshot().await;
        let btc = second.position("BTC").unwrap();
        assert_eq!(btc.quantity, dec!(1));
        assert!(!btc.is_stale());
        // The cached venue is not missing; the never-seen one still is.
        assert_eq!(second.missing_exchanges, vec![ExchangeId::Binance]);
    }

    #[tokio::test]
    async fn test_zero_quantity_positions_are_dropped() {
        let venue = Arc::new(StaticVenue::new(
            ExchangeId::Sim,
            vec![
                balance_aged("BTC", Decimal::ZERO, ExchangeId::Sim, 0),
                balance_aged("USD", dec!(50), ExchangeId::Sim, 0),
            ],
        ));
        let market = Arc::new(MarketAggregator::new(vec![]));
        let portfolio = service(vec![venue], market, Arc::new(TradeLedger::new()));

        let snapshot = portfolio.snapshot().await;
        assert!(snapshot.position("BTC").is_none());
        assert_eq!(snapshot.positions.len(), 1);
    }

    #[tokio::test]
    async fn test_merges_one_asset_across_venues() {
        let a = Arc::new(StaticVenue::new(
            ExchangeId::Sim,
            vec![balance_aged("BTC", dec!(0.5), ExchangeId::Sim, 0)],
        ));
        let b = Arc::new(StaticVenue::new(
            ExchangeId::Binance,
            vec![balance_aged("BTC", dec!(0.25), ExchangeId::Binance, 0)],
        ));
        let market = Arc::new(MarketAggregator::new(vec![]));
        market.ingest_quote(quote_aged("BTC", dec!(100), 0));

        let portfolio = service(vec![a, b], market, Arc::new(TradeLedger::new()));
        let snapshot = portfolio.snapshot().await;

        assert_eq!(snapshot.positions.len(), 1);
        let btc = snapshot.position("BTC").unwrap();
        assert_eq!(btc.quantity, dec!(0.75));
        assert_eq!(btc.quantity_on(ExchangeId::Sim), dec!(0.5));
        assert_eq!(btc.quantity_on(ExchangeId::Binance), dec!(0.25));
        assert_eq!(snapshot.total_value, dec!(75.00));
    }

    #[tokio::test]
    async fn test_overview_attaches_trades_and_engine_state() {
        let venue = Arc::new(StaticVenue::new(
            ExchangeId::Sim,
            vec![balance_aged("USD", dec!(100), ExchangeId::Sim, 0)],
        ));
        let market = Arc::new(MarketAggregator::new(vec![]));
        let ledger = Arc::new(TradeLedger::new());

        let request = OrderRequest::market(
            "k-1",
            "BTC",
            Side::Buy,
            Amount::Funds(dec!(100)),
            ExchangeId::Sim,
        );
        let order = Order::from_request(&request);
        ledger.append(TradeRecord::from_order(&order, dec!(0.001), dec!(100000)));

        let portfolio = service(vec![venue], market, Arc::clone(&ledger));
        let overview = portfolio.overview(EngineStatus::default()).await;

        assert_eq!(overview.snapshot.total_value, dec!(100));
        assert_eq!(overview.recent_trades.len(), 1);
        assert!(!overview.engine.running);
    }
}
