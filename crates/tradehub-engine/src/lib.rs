//! Automatic profit taking.
//!
//! A single background task re-evaluates tracked positions on a fixed
//! interval and closes any whose price has risen past the configured
//! threshold over entry. Closes go through the order router like every
//! other order, so the ledger and idempotency rules apply unchanged.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tradehub_core::types::{
    Amount, AutoProfitPolicy, EngineStatus, ExchangeId, OrderRequest, OrderStatus, Side, TradeKind,
};
use tradehub_market::MarketAggregator;
use tradehub_router::OrderRouter;
use tracing::{debug, info, warn};

/// Prices older than this never trigger a close.
const QUOTE_MAX_AGE_SECS: i64 = 30;

/// A held position the engine monitors for profit.
#[derive(Debug, Clone)]
pub struct TrackedPosition {
    /// Internal instrument symbol
    pub symbol: String,
    /// Quantity to close when the threshold is reached
    pub quantity: Decimal,
    /// Acquisition price the gain is measured against
    pub entry_price: Decimal,
    /// Venue holding the position
    pub exchange: ExchangeId,
}

impl TrackedPosition {
    pub fn new(
        symbol: impl Into<String>,
        quantity: Decimal,
        entry_price: Decimal,
        exchange: ExchangeId,
    ) -> Self {
        Self {
            symbol: symbol.into().to_ascii_uppercase(),
            quantity,
            entry_price,
            exchange,
        }
    }
}

#[derive(Default)]
struct EngineState {
    running: bool,
    policy: Option<AutoProfitPolicy>,
    positions: HashMap<String, TrackedPosition>,
    in_flight: HashMap<String, String>,
    tick: u64,
    last_tick: Option<DateTime<Utc>>,
    epoch: u64,
}

/// Closes tracked positions once their price clears entry by the
/// policy threshold.
///
/// At most one close order is ever active per position: an in-flight
/// map records the pending client key, and the router's idempotency
/// backstops it. A filled close drops the position from the watch set;
/// a rejected or canceled close frees the position for a later tick.
pub struct ProfitEngine {
    router: Arc<OrderRouter>,
    market: Arc<MarketAggregator>,
    state: Mutex<EngineState>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ProfitEngine {
    pub fn new(router: Arc<OrderRouter>, market: Arc<MarketAggregator>) -> Self {
        Self {
            router,
            market,
            state: Mutex::new(EngineState::default()),
            handle: Mutex::new(None),
        }
    }

    /// Register a position for monitoring. Re-tracking a symbol
    /// replaces its entry.
    pub fn track(&self, position: TrackedPosition) {
        let mut state = self.state.lock().unwrap();
        debug!(symbol = %position.symbol, entry = %position.entry_price, "tracking position");
        state.positions.insert(position.symbol.clone(), position);
    }

    /// Stop monitoring a symbol. Any in-flight close order is left to
    /// run its course.
    pub fn untrack(&self, symbol: &str) {
        let symbol = symbol.to_ascii_uppercase();
        let mut state = self.state.lock().unwrap();
        state.positions.remove(&symbol);
        state.in_flight.remove(&symbol);
    }

    /// Currently tracked positions, sorted by symbol.
    pub fn tracked(&self) -> Vec<TrackedPosition> {
        let mut positions: Vec<TrackedPosition> = self
            .state
            .lock()
            .unwrap()
            .positions
            .values()
            .cloned()
            .collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        positions
    }

    /// Start the evaluation task, or update the policy of a running
    /// one. Never spawns a second task.
    pub fn enable(self: &Arc<Self>, policy: AutoProfitPolicy) {
        let mut state = self.state.lock().unwrap();
        let update_only = state.running;
        state.policy = Some(policy);
        if update_only {
            info!("auto-profit policy updated");
            return;
        }
        state.running = true;
        state.epoch += 1;
        let epoch = state.epoch;
        drop(state);

        info!("auto-profit engine enabled");
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move { engine.run(epoch).await });
        *self.handle.lock().unwrap() = Some(handle);
    }

    /// Ask the task to exit after its current tick. In-flight close
    /// orders are not canceled.
    pub fn disable(&self) {
        let mut state = self.state.lock().unwrap();
        if !state.running {
            return;
        }
        state.running = false;
        info!("auto-profit engine disabled");
    }

    pub fn status(&self) -> EngineStatus {
        let state = self.state.lock().unwrap();
        let mut in_flight: Vec<(String, String)> = state
            .in_flight
            .iter()
            .map(|(symbol, key)| (symbol.clone(), key.clone()))
            .collect();
        in_flight.sort();
        EngineStatus {
            running: state.running,
            policy: state.policy.clone(),
            last_tick: state.last_tick,
            in_flight,
        }
    }

    /// Run one evaluation pass over the tracked positions.
    pub async fn tick(&self) {
        let (policy, positions, tick_no) = {
            let mut state = self.state.lock().unwrap();
            let policy = match &state.policy {
                Some(policy) => policy.clone(),
                None => return,
            };
            state.tick += 1;
            let positions: Vec<TrackedPosition> = state.positions.values().cloned().collect();
            (policy, positions, state.tick)
        };

        for position in positions {
            if !policy.watches(&position.symbol) {
                continue;
            }
            if self.resolve_in_flight(&position.symbol) {
                continue;
            }
            self.evaluate(&position, &policy, tick_no).await;
        }

        self.state.lock().unwrap().last_tick = Some(Utc::now());
    }

    async fn run(&self, epoch: u64) {
        let mut period = self.current_interval();
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if !self.should_continue(epoch) {
                break;
            }

            let started = Instant::now();
            self.tick().await;
            let elapsed = started.elapsed();
            if elapsed > period {
                warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    "evaluation tick overran its interval"
                );
            }

            if !self.should_continue(epoch) {
                break;
            }
            let next = self.current_interval();
            if next != period {
                period = next;
                ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            }
        }
        debug!("auto-profit engine stopped");
    }

    /// Settle the pending close for a symbol, if any. Returns true when
    /// the position should be skipped this tick.
    fn resolve_in_flight(&self, symbol: &str) -> bool {
        let key = match self.state.lock().unwrap().in_flight.get(symbol).cloned() {
            Some(key) => key,
            None => return false,
        };
        match self.router.order(&key) {
            Some(order) if order.is_filled() => {
                let mut state = self.state.lock().unwrap();
                state.in_flight.remove(symbol);
                state.positions.remove(symbol);
                info!(symbol, key = %key, "position closed");
                true
            }
            Some(order) if order.status.is_active() => {
                debug!(symbol, key = %key, "close order still active");
                true
            }
            // Rejected, canceled, or unknown: free the position so this
            // tick can retry.
            _ => {
                self.state.lock().unwrap().in_flight.remove(symbol);
                false
            }
        }
    }

    async fn evaluate(&self, position: &TrackedPosition, policy: &AutoProfitPolicy, tick_no: u64) {
        let view = match self.market.view(&position.symbol) {
            Some(view) => view,
            None => {
                debug!(symbol = %position.symbol, "no market view; skipping");
                return;
            }
        };
        let age_secs = (Utc::now() - view.as_of).num_seconds();
        if view.is_fallback() || age_secs > QUOTE_MAX_AGE_SECS {
            debug!(
                symbol = %position.symbol,
                age_secs,
                "skipping close check on stale price"
            );
            return;
        }

        let target = position.entry_price * policy.trigger_multiplier();
        if view.primary_price < target {
            return;
        }

        let key = format!("auto:{}:{}", position.symbol, tick_no);
        let request = OrderRequest::market(
            key.clone(),
            position.symbol.clone(),
            Side::Sell,
            Amount::Quantity(position.quantity),
            position.exchange,
        )
        .with_kind(TradeKind::AutoProfit)
        .with_entry_price(position.entry_price);

        self.state
            .lock()
            .unwrap()
            .in_flight
            .insert(position.symbol.clone(), key.clone());
        info!(
            symbol = %position.symbol,
            price = %view.primary_price,
            entry = %position.entry_price,
            key = %key,
            "profit threshold reached; closing position"
        );

        match self.router.submit(request).await {
            Ok(order) if order.is_filled() => {
                let mut state = self.state.lock().unwrap();
                state.in_flight.remove(&position.symbol);
                state.positions.remove(&position.symbol);
                info!(symbol = %position.symbol, key = %key, "position closed");
            }
            Ok(order) if order.status == OrderStatus::Rejected => {
                warn!(
                    symbol = %position.symbol,
                    error = order.error.as_deref().unwrap_or_default(),
                    "close order rejected"
                );
                self.state.lock().unwrap().in_flight.remove(&position.symbol);
            }
            // Accepted but not yet filled; the next tick settles it.
            Ok(_) => {}
            Err(e) => {
                warn!(symbol = %position.symbol, error = %e, "close submission failed");
                self.state.lock().unwrap().in_flight.remove(&position.symbol);
            }
        }
    }

    fn current_interval(&self) -> Duration {
        let state = self.state.lock().unwrap();
        state
            .policy
            .as_ref()
            .map(|p| p.interval())
            .unwrap_or_else(|| AutoProfitPolicy::default().interval())
    }

    fn should_continue(&self, epoch: u64) -> bool {
        let state = self.state.lock().unwrap();
        state.running && state.epoch == epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeDelta;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tradehub_core::error::ExchangeError;
    use tradehub_core::traits::Exchange;
    use tradehub_core::types::{
        Balance, Instrument, InstrumentCatalog, Order, OrderAck, Quote, TradeRecord,
    };
    use tradehub_exchange::SimExchange;
    use tradehub_ledger::TradeLedger;
    use tradehub_router::RouterConfig;

    struct Harness {
        engine: Arc<ProfitEngine>,
        router: Arc<OrderRouter>,
        market: Arc<MarketAggregator>,
        sim: Arc<SimExchange>,
        ledger: Arc<TradeLedger>,
    }

    fn harness() -> Harness {
        let sim = Arc::new(SimExchange::new());
        sim.set_balance("BTC", dec!(1));
        sim.set_balance("ETH", dec!(10));

        let market = Arc::new(MarketAggregator::new(vec![]));
        let ledger = Arc::new(TradeLedger::new());
        let mut exchanges: HashMap<ExchangeId, Arc<dyn Exchange>> = HashMap::new();
        exchanges.insert(ExchangeId::Sim, Arc::clone(&sim) as Arc<dyn Exchange>);
        let router = Arc::new(OrderRouter::new(
            exchanges,
            InstrumentCatalog::defaults(),
            Arc::clone(&ledger),
            RouterConfig::default(),
        ));
        let engine = Arc::new(ProfitEngine::new(
            Arc::clone(&router),
            Arc::clone(&market),
        ));
        Harness {
            engine,
            router,
            market,
            sim,
            ledger,
        }
    }

    /// Post a price to both the fill venue and the aggregator.
    fn post_price(h: &Harness, symbol: &str, price: Decimal) {
        h.sim.set_price(symbol, price);
        h.market.ingest_quote(Quote {
            symbol: symbol.to_string(),
            bid: price,
            ask: price,
            last: price,
            change_24h: None,
            volume_24h: None,
            exchange: ExchangeId::Sim,
            observed_at: Utc::now(),
        });
    }

    /// Venue double whose market orders rest instead of filling.
    struct RestingVenue {
        placed: Mutex<Vec<OrderRequest>>,
        canceled: Mutex<Vec<String>>,
        next_id: AtomicU64,
    }

    impl RestingVenue {
        fn new() -> Self {
            Self {
                placed: Mutex::new(Vec::new()),
                canceled: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl Exchange for RestingVenue {
        fn id(&self) -> ExchangeId {
            ExchangeId::Sim
        }

        async fn fetch_quote(&self, instrument: &Instrument) -> Result<Quote, ExchangeError> {
            Err(ExchangeError::NotFound(instrument.symbol.clone()))
        }

        async fn fetch_balances(&self) -> Result<Vec<Balance>, ExchangeError> {
            Ok(Vec::new())
        }

        async fn place_order(&self, request: &OrderRequest) -> Result<OrderAck, ExchangeError> {
            self.placed.lock().unwrap().push(request.clone());
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(OrderAck::accepted(format!("rest-{id}")))
        }

        async fn cancel_order(
            &self,
            venue_order_id: &str,
            _instrument: &Instrument,
        ) -> Result<(), ExchangeError> {
            self.canceled.lock().unwrap().push(venue_order_id.to_string());
            Ok(())
        }
    }

    fn resting_harness() -> (
        Arc<ProfitEngine>,
        Arc<OrderRouter>,
        Arc<RestingVenue>,
        Arc<MarketAggregator>,
    ) {
        let venue = Arc::new(RestingVenue::new());
        let market = Arc::new(MarketAggregator::new(vec![]));
        let mut exchanges: HashMap<ExchangeId, Arc<dyn Exchange>> = HashMap::new();
        exchanges.insert(ExchangeId::Sim, Arc::clone(&venue) as Arc<dyn Exchange>);
        let router = Arc::new(OrderRouter::new(
            exchanges,
            InstrumentCatalog::defaults(),
            Arc::new(TradeLedger::new()),
            RouterConfig::default(),
        ));
        let engine = Arc::new(ProfitEngine::new(Arc::clone(&router), Arc::clone(&market)));
        (engine, router, venue, market)
    }

    #[tokio::test]
    async fn test_threshold_scenario_closes_exactly_once() {
        let h = harness();
        h.engine
            .track(TrackedPosition::new("BTC", dec!(1), dec!(100), ExchangeId::Sim));
        h.engine.enable(AutoProfitPolicy::default());

        // 104.9 is below the +5% trigger.
        post_price(&h, "BTC", dec!(104.9));
        h.engine.tick().await;
        assert!(h.sim.placed_orders().is_empty());

        // 105.0 reaches it.
        post_price(&h, "BTC", dec!(105.0));
        h.engine.tick().await;
        let placed = h.sim.placed_orders();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].side, Side::Sell);
        assert_eq!(placed[0].kind, TradeKind::AutoProfit);
        assert!(placed[0].client_key.starts_with("auto:BTC:"));
        assert!(h.engine.tracked().is_empty());

        // The position is gone, so a further rise does nothing.
        post_price(&h, "BTC", dec!(106.0));
        h.engine.tick().await;
        assert_eq!(h.sim.placed_orders().len(), 1);

        assert_eq!(h.ledger.len(), 1);
        let record = &h.ledger.recent(1)[0];
        assert_eq!(record.kind, TradeKind::AutoProfit);
        assert_eq!(record.entry_price, Some(dec!(100)));
        assert_eq!(record.profit_percent, Some(dec!(5.0)));
    }

    #[tokio::test]
    async fn test_one_active_close_per_position() {
        let (engine, router, venue, market) = resting_harness();
        market.ingest_quote(Quote {
            symbol: "BTC".to_string(),
            bid: dec!(105),
            ask: dec!(105),
            last: dec!(105),
            change_24h: None,
            volume_24h: None,
            exchange: ExchangeId::Sim,
            observed_at: Utc::now(),
        });
        engine.track(TrackedPosition::new("BTC", dec!(1), dec!(100), ExchangeId::Sim));
        engine.enable(AutoProfitPolicy::default());

        engine.tick().await;
        assert_eq!(venue.placed.lock().unwrap().len(), 1);
        let status = engine.status();
        assert!(status.last_tick.is_some());
        assert_eq!(status.in_flight.len(), 1);
        assert_eq!(status.in_flight[0].0, "BTC");

        // The close is still active, so further ticks stay quiet.
        engine.tick().await;
        engine.tick().await;
        assert_eq!(venue.placed.lock().unwrap().len(), 1);

        // Fill lands; the next tick retires the position.
        let key = engine.status().in_flight[0].1.clone();
        router.apply_fill(&key, dec!(1), dec!(105)).unwrap();
        engine.tick().await;
        assert!(engine.status().in_flight.is_empty());
        assert!(engine.tracked().is_empty());
        assert_eq!(venue.placed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_close_retries_on_a_later_tick() {
        let h = harness();
        h.engine
            .track(TrackedPosition::new("BTC", dec!(1), dec!(100), ExchangeId::Sim));
        h.engine.enable(AutoProfitPolicy::default());
        post_price(&h, "BTC", dec!(105));

        h.sim.reject_next_order("insufficient balance");
        h.engine.tick().await;
        assert!(h.engine.status().in_flight.is_empty());
        assert_eq!(h.ledger.len(), 0);

        // The retry uses a fresh client key.
        h.engine.tick().await;
        let placed = h.sim.placed_orders();
        assert_eq!(placed.len(), 2);
        assert_ne!(placed[0].client_key, placed[1].client_key);
        assert_eq!(h.ledger.len(), 1);
        assert!(h.engine.tracked().is_empty());
    }

    #[tokio::test]
    async fn test_disable_leaves_in_flight_orders_alone() {
        let (engine, router, venue, market) = resting_harness();
        market.ingest_quote(Quote {
            symbol: "BTC".to_string(),
            bid: dec!(105),
            ask: dec!(105),
            last: dec!(105),
            change_24h: None,
            volume_24h: None,
            exchange: ExchangeId::Sim,
            observed_at: Utc::now(),
        });
        engine.track(TrackedPosition::new("BTC", dec!(1), dec!(100), ExchangeId::Sim));
        engine.enable(AutoProfitPolicy::default());
        engine.tick().await;

        engine.disable();
        let status = engine.status();
        assert!(!status.running);
        assert_eq!(status.in_flight.len(), 1);

        let key = &status.in_flight[0].1;
        let order = router.order(key).unwrap();
        assert_eq!(order.status, OrderStatus::Submitted);
        assert!(venue.canceled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enable_while_running_updates_policy() {
        let h = harness();
        h.engine
            .track(TrackedPosition::new("BTC", dec!(1), dec!(100), ExchangeId::Sim));
        h.engine.enable(AutoProfitPolicy::default());

        // +3% does not clear the default 5% bar.
        post_price(&h, "BTC", dec!(103));
        h.engine.tick().await;
        assert!(h.sim.placed_orders().is_empty());

        h.engine
            .enable(AutoProfitPolicy::default().with_threshold(dec!(0.02)));
        let status = h.engine.status();
        assert!(status.running);
        assert_eq!(status.policy.unwrap().threshold, dec!(0.02));

        h.engine.tick().await;
        assert_eq!(h.sim.placed_orders().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_or_fallback_prices_never_trigger() {
        let h = harness();
        h.engine
            .track(TrackedPosition::new("BTC", dec!(1), dec!(100), ExchangeId::Sim));
        h.engine.enable(AutoProfitPolicy::default());

        // No live quote: the view falls back to the reference table,
        // which is far above entry, and must still be ignored.
        h.engine.tick().await;
        assert!(h.sim.placed_orders().is_empty());

        // A live but aged quote is ignored too.
        h.sim.set_price("BTC", dec!(200));
        h.market.ingest_quote(Quote {
            symbol: "BTC".to_string(),
            bid: dec!(200),
            ask: dec!(200),
            last: dec!(200),
            change_24h: None,
            volume_24h: None,
            exchange: ExchangeId::Sim,
            observed_at: Utc::now() - TimeDelta::seconds(60),
        });
        h.engine.tick().await;
        assert!(h.sim.placed_orders().is_empty());
    }

    #[tokio::test]
    async fn test_watchlist_scopes_the_engine() {
        let h = harness();
        h.engine
            .track(TrackedPosition::new("BTC", dec!(1), dec!(100), ExchangeId::Sim));
        h.engine
            .track(TrackedPosition::new("ETH", dec!(1), dec!(100), ExchangeId::Sim));
        h.engine.enable(
            AutoProfitPolicy::default().with_symbols(vec!["ETH".to_string()]),
        );

        post_price(&h, "BTC", dec!(110));
        post_price(&h, "ETH", dec!(110));
        h.engine.tick().await;

        let placed = h.sim.placed_orders();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].symbol, "ETH");
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_task_ticks_and_stops() {
        let h = harness();
        h.engine
            .track(TrackedPosition::new("BTC", dec!(1), dec!(100), ExchangeId::Sim));
        post_price(&h, "BTC", dec!(105));

        h.engine.enable(AutoProfitPolicy::default());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.sim.placed_orders().len(), 1);

        // Disabled: later price moves go unanswered.
        h.engine
            .track(TrackedPosition::new("ETH", dec!(1), dec!(100), ExchangeId::Sim));
        h.engine.disable();
        post_price(&h, "ETH", dec!(110));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.sim.placed_orders().len(), 1);
        assert!(!h.engine.status().running);
    }

    #[test]
    fn test_record_profit_fields_flow_from_request() {
        let request = OrderRequest::market(
            "auto:BTC:3",
            "BTC",
            Side::Sell,
            Amount::Quantity(dec!(1)),
            ExchangeId::Sim,
        )
        .with_kind(TradeKind::AutoProfit)
        .with_entry_price(dec!(100));
        let mut order = Order::from_request(&request);
        order.add_fill(dec!(1), dec!(105));
        let record = TradeRecord::from_order(&order, dec!(1), dec!(105));
        assert_eq!(record.profit_percent, Some(dec!(5)));
    }
}
