//! Facade over the whole service graph.
//!
//! `Coordinator` owns the venue adapters, quote pollers, order router,
//! portfolio service, profit engine, and trade ledger, and exposes the
//! operations the CLI and integration tests drive.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::TimeDelta;
use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use tradehub_config::Settings;
use tradehub_core::error::ExchangeError;
use tradehub_core::traits::Exchange;
use tradehub_core::types::{
    Amount, AutoProfitPolicy, EngineStatus, ExchangeAccount, ExchangeId, Instrument,
    InstrumentCatalog, MarketView, Order, OrderRequest, PortfolioSnapshot, Side, TradeRecord,
};
use tradehub_engine::{ProfitEngine, TrackedPosition};
use tradehub_exchange::{BinanceExchange, CoinbaseExchange, SimExchange};
use tradehub_ledger::{TradeLedger, TradePage};
use tradehub_market::MarketAggregator;
use tradehub_portfolio::{PortfolioOverview, PortfolioService};
use tradehub_router::{OrderRouter, RouterConfig};

/// Wiring parameters for the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Instruments every venue is polled for
    pub catalog: InstrumentCatalog,
    /// Quote poll cadence per venue
    pub poll_interval: Duration,
    /// Venue priority used to break quote freshness ties
    pub priority: Vec<ExchangeId>,
    /// Order routing limits
    pub router: RouterConfig,
    /// Staleness horizon for balances and quotes
    pub portfolio_ttl: TimeDelta,
}

impl CoordinatorConfig {
    /// Map loaded settings onto wiring parameters.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            catalog: InstrumentCatalog::defaults(),
            poll_interval: settings.market.poll_interval(),
            priority: settings.market.priority.clone(),
            router: RouterConfig {
                max_trade_amount: settings.router.max_trade_amount,
                bucket_capacity: settings.router.bucket_capacity,
                refill_per_sec: settings.router.refill_per_sec,
            },
            portfolio_ttl: TimeDelta::seconds(settings.portfolio.ttl_secs as i64),
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// The multi-venue trading coordinator.
pub struct Coordinator {
    exchanges: HashMap<ExchangeId, Arc<dyn Exchange>>,
    catalog: InstrumentCatalog,
    market: Arc<MarketAggregator>,
    router: Arc<OrderRouter>,
    portfolio: PortfolioService,
    engine: Arc<ProfitEngine>,
    ledger: Arc<TradeLedger>,
    pollers: Mutex<Vec<JoinHandle<()>>>,
}

impl Coordinator {
    /// Build adapters for the given accounts and start the service
    /// graph.
    pub fn connect(
        accounts: Vec<ExchangeAccount>,
        config: CoordinatorConfig,
    ) -> Result<Self, ExchangeError> {
        let mut exchanges: HashMap<ExchangeId, Arc<dyn Exchange>> = HashMap::new();
        for account in accounts {
            let venue = account.exchange;
            let adapter: Arc<dyn Exchange> = match venue {
                ExchangeId::Binance => {
                    Arc::new(BinanceExchange::with_catalog(account, config.catalog.clone())?)
                }
                ExchangeId::Coinbase => {
                    Arc::new(CoinbaseExchange::with_catalog(account, config.catalog.clone())?)
                }
                ExchangeId::Sim => Arc::new(SimExchange::seeded()),
            };
            info!(venue = %venue, "venue connected");
            exchanges.insert(venue, adapter);
        }
        Ok(Self::with_exchanges(exchanges, config))
    }

    /// Wire the service graph over prebuilt adapters and start the
    /// quote pollers.
    pub fn with_exchanges(
        exchanges: HashMap<ExchangeId, Arc<dyn Exchange>>,
        config: CoordinatorConfig,
    ) -> Self {
        let ledger = Arc::new(TradeLedger::new());
        let market = Arc::new(MarketAggregator::new(config.priority.clone()));
        let router = Arc::new(OrderRouter::new(
            exchanges.clone(),
            config.catalog.clone(),
            Arc::clone(&ledger),
            config.router.clone(),
        ));
        let portfolio = PortfolioService::new(
            exchanges.clone(),
            Arc::clone(&market),
            Arc::clone(&ledger),
            config.portfolio_ttl,
        );
        let engine = Arc::new(ProfitEngine::new(Arc::clone(&router), Arc::clone(&market)));

        let instruments: Vec<Instrument> = config.catalog.iter().cloned().collect();
        let pollers = exchanges
            .values()
            .map(|adapter| {
                market.spawn_poller(Arc::clone(adapter), instruments.clone(), config.poll_interval)
            })
            .collect();
        info!(
            venues = exchanges.len(),
            instruments = instruments.len(),
            "coordinator started"
        );

        Self {
            exchanges,
            catalog: config.catalog,
            market,
            router,
            portfolio,
            engine,
            ledger,
            pollers: Mutex::new(pollers),
        }
    }

    /// Fetch one quote round from every venue inline.
    ///
    /// One-shot callers use this after connecting so views are
    /// populated without waiting on the pollers.
    pub async fn warm_up(&self) {
        let instruments: Vec<Instrument> = self.catalog.iter().cloned().collect();
        for adapter in self.exchanges.values() {
            for instrument in &instruments {
                match adapter.fetch_quote(instrument).await {
                    Ok(quote) => self.market.ingest_quote(quote),
                    Err(e) => {
                        warn!(
                            venue = %adapter.id(),
                            symbol = %instrument.symbol,
                            error = %e,
                            "warm-up quote failed"
                        );
                        self.market.mark_error(adapter.id(), &instrument.symbol);
                    }
                }
            }
        }
    }

    /// Latest merged view for one symbol.
    pub fn market_data(&self, symbol: &str) -> Option<MarketView> {
        self.market.view(symbol)
    }

    /// Merged views for every known symbol.
    pub fn market_data_all(&self) -> Vec<MarketView> {
        self.market.all_views()
    }

    /// Place a market order and, on a fill, update the engine's watch
    /// set.
    pub async fn place_market_order(
        &self,
        client_key: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        amount: Amount,
        exchange: ExchangeId,
    ) -> Result<Order, ExchangeError> {
        let request = OrderRequest::market(client_key, symbol, side, amount, exchange);
        let order = self.router.submit(request).await?;
        self.sync_engine(&order);
        Ok(order)
    }

    /// Place a limit order. Marketable limits may fill inside the
    /// submission call.
    pub async fn place_limit_order(
        &self,
        client_key: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        quantity: Decimal,
        limit_price: Decimal,
        exchange: ExchangeId,
    ) -> Result<Order, ExchangeError> {
        let request =
            OrderRequest::limit(client_key, symbol, side, quantity, limit_price, exchange);
        let order = self.router.submit(request).await?;
        self.sync_engine(&order);
        Ok(order)
    }

    /// Cancel a resting order by its client key.
    pub async fn cancel_order(&self, client_key: &str) -> Result<Order, ExchangeError> {
        self.router.cancel(client_key).await
    }

    /// An order by its client key.
    pub fn order(&self, client_key: &str) -> Option<Order> {
        self.router.order(client_key)
    }

    /// All orders, oldest first.
    pub fn orders(&self) -> Vec<Order> {
        self.router.orders()
    }

    /// Point-in-time valuation of all holdings.
    pub async fn portfolio(&self) -> PortfolioSnapshot {
        self.portfolio.snapshot().await
    }

    /// Valuation plus recent trades and engine state.
    pub async fn portfolio_overview(&self) -> PortfolioOverview {
        self.portfolio.overview(self.engine.status()).await
    }

    /// Start or reconfigure automatic profit taking.
    pub fn enable_auto_profit(&self, policy: AutoProfitPolicy) {
        self.engine.enable(policy);
    }

    /// Stop automatic profit taking. Tracked positions are kept.
    pub fn disable_auto_profit(&self) {
        self.engine.disable();
    }

    pub fn auto_profit_status(&self) -> EngineStatus {
        self.engine.status()
    }

    /// Register a position for the engine to monitor.
    pub fn track_position(&self, position: TrackedPosition) {
        self.engine.track(position);
    }

    /// Positions the engine is watching.
    pub fn tracked_positions(&self) -> Vec<TrackedPosition> {
        self.engine.tracked()
    }

    /// Newest-first trade history page.
    pub fn trade_history(&self, cursor: Option<u64>, limit: usize) -> TradePage {
        self.ledger.page(cursor, limit)
    }

    /// Newest-first trades for one symbol.
    pub fn trades_for(&self, symbol: &str, limit: usize) -> Vec<TradeRecord> {
        self.ledger.by_symbol(symbol, limit)
    }

    /// Stop the engine and the quote pollers. Idempotent.
    pub fn shutdown(&self) {
        self.engine.disable();
        for poller in self.pollers.lock().unwrap().drain(..) {
            poller.abort();
        }
        info!("coordinator stopped");
    }

    /// Keep the engine's watch set in line with manual fills: a filled
    /// buy becomes a tracked position at its fill price, a filled sell
    /// retires the symbol.
    fn sync_engine(&self, order: &Order) {
        if !order.is_filled() {
            return;
        }
        match order.side {
            Side::Buy => {
                if let Some(price) = order.filled_avg_price {
                    self.engine.track(TrackedPosition::new(
                        order.symbol.clone(),
                        order.filled_quantity,
                        price,
                        order.exchange,
                    ));
                }
            }
            Side::Sell => self.engine.untrack(&order.symbol),
        }
    }
}
