//! The order router.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tradehub_core::error::ExchangeError;
use tradehub_core::traits::Exchange;
use tradehub_core::types::{
    ExchangeId, Instrument, InstrumentCatalog, Order, OrderRequest, OrderType, TradeRecord,
};
use tradehub_ledger::TradeLedger;
use tracing::{info, warn};

use crate::bucket::TokenBucket;

/// Router limits.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Largest allowed notional for a single order, in quote currency
    pub max_trade_amount: Decimal,
    /// Token bucket capacity per venue
    pub bucket_capacity: u32,
    /// Tokens restored per second
    pub refill_per_sec: u32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_trade_amount: dec!(10000),
            bucket_capacity: 10,
            refill_per_sec: 5,
        }
    }
}

/// Routes orders to venue adapters.
///
/// At most one order ever exists per client key: the key is reserved
/// under the order-map lock before any venue traffic, so concurrent
/// submissions with the same key produce exactly one venue call. A
/// failed submission keeps its key occupied and is never retried.
/// Fills append to the ledger exactly once, at the first terminal
/// transition carrying a non-zero filled quantity: the move to
/// `Filled`, or a cancel that lands after partial fills.
pub struct OrderRouter {
    exchanges: HashMap<ExchangeId, Arc<dyn Exchange>>,
    orders: Mutex<HashMap<String, Order>>,
    buckets: HashMap<ExchangeId, TokenBucket>,
    catalog: InstrumentCatalog,
    ledger: Arc<TradeLedger>,
    config: RouterConfig,
}

impl OrderRouter {
    pub fn new(
        exchanges: HashMap<ExchangeId, Arc<dyn Exchange>>,
        catalog: InstrumentCatalog,
        ledger: Arc<TradeLedger>,
        config: RouterConfig,
    ) -> Self {
        let buckets = exchanges
            .keys()
            .map(|&id| {
                (
                    id,
                    TokenBucket::new(config.bucket_capacity, config.refill_per_sec),
                )
            })
            .collect();
        Self {
            exchanges,
            orders: Mutex::new(HashMap::new()),
            buckets,
            catalog,
            ledger,
            config,
        }
    }

    /// Validate, reserve the client key, and place the order.
    ///
    /// `Err` means nothing was recorded (validation failure, duplicate
    /// key, unknown venue). `Ok` returns the order in its post-submit
    /// state, which may be `Rejected`.
    pub async fn submit(&self, request: OrderRequest) -> Result<Order, ExchangeError> {
        self.validate(&request)?;
        let exchange = Arc::clone(self.exchange(request.exchange)?);

        {
            let mut orders = self.orders.lock().unwrap();
            if orders.contains_key(&request.client_key) {
                return Err(ExchangeError::DuplicateClientKey(request.client_key));
            }
            orders.insert(request.client_key.clone(), Order::from_request(&request));
        }

        if let Some(bucket) = self.buckets.get(&request.exchange) {
            bucket.acquire().await;
        }

        info!(
            key = %request.client_key,
            venue = %request.exchange,
            symbol = %request.symbol,
            side = %request.side,
            order_type = %request.order_type,
            "submitting order"
        );
        let result = exchange.place_order(&request).await;

        let mut orders = self.orders.lock().unwrap();
        let order = orders
            .get_mut(&request.client_key)
            .expect("key reserved before the venue call");
        match result {
            Ok(ack) => {
                order.mark_submitted(ack.venue_order_id.clone());
                if let (Some(quantity), Some(price)) = (ack.filled_quantity, ack.fill_price) {
                    self.record_fill(order, quantity, price);
                }
            }
            Err(e) => {
                warn!(key = %request.client_key, error = %e, "order submission failed");
                order.mark_rejected(e.to_string());
            }
        }
        Ok(order.clone())
    }

    /// Apply a fill reported for an already-submitted order.
    ///
    /// Fills accumulate until the request is covered; the transition to
    /// `Filled` appends the trade record. Fills arriving after a
    /// terminal state are ignored.
    pub fn apply_fill(
        &self,
        client_key: &str,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<Order, ExchangeError> {
        if quantity <= Decimal::ZERO || price <= Decimal::ZERO {
            return Err(ExchangeError::Validation(
                "fill quantity and price must be positive".to_string(),
            ));
        }
        let mut orders = self.orders.lock().unwrap();
        let order = orders
            .get_mut(client_key)
            .ok_or_else(|| ExchangeError::NotFound(format!("no order for key {client_key}")))?;
        self.record_fill(order, quantity, price);
        Ok(order.clone())
    }

    /// Cancel an active order at its venue.
    ///
    /// If the order had partial fills, the realized portion is appended
    /// to the ledger as part of the cancel transition.
    pub async fn cancel(&self, client_key: &str) -> Result<Order, ExchangeError> {
        let (venue_order_id, exchange_id, symbol) = {
            let orders = self.orders.lock().unwrap();
            let order = orders
                .get(client_key)
                .ok_or_else(|| ExchangeError::NotFound(format!("no order for key {client_key}")))?;
            if !order.is_cancelable() {
                return Err(ExchangeError::Validation(format!(
                    "order {client_key} is already terminal"
                )));
            }
            let venue_order_id = order.venue_order_id.clone().ok_or_else(|| {
                ExchangeError::Validation(format!("order {client_key} has no venue id yet"))
            })?;
            (venue_order_id, order.exchange, order.symbol.clone())
        };

        let exchange = Arc::clone(self.exchange(exchange_id)?);
        let instrument = self.instrument(&symbol)?;
        exchange.cancel_order(&venue_order_id, &instrument).await?;

        let mut orders = self.orders.lock().unwrap();
        let order = orders
            .get_mut(client_key)
            .ok_or_else(|| ExchangeError::NotFound(format!("no order for key {client_key}")))?;
        // A fill may have landed while the cancel was in flight.
        if !order.status.is_terminal() {
            order.mark_canceled();
            info!(key = %client_key, venue_order_id = %venue_order_id, "order canceled");
            // Fills realized before the cancel still count as a trade.
            if order.filled_quantity > Decimal::ZERO {
                let avg_price = order.filled_avg_price.unwrap_or(Decimal::ZERO);
                let record = TradeRecord::from_order(order, order.filled_quantity, avg_price);
                let seq = self.ledger.append(record);
                info!(
                    key = %client_key,
                    seq,
                    quantity = %order.filled_quantity,
                    "partial fill recorded on cancel"
                );
            }
        }
        Ok(order.clone())
    }

    /// The order for a client key, if one exists.
    pub fn order(&self, client_key: &str) -> Option<Order> {
        self.orders.lock().unwrap().get(client_key).cloned()
    }

    /// All orders, oldest first.
    pub fn orders(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.orders.lock().unwrap().values().cloned().collect();
        orders.sort_by_key(|o| o.created_at);
        orders
    }

    fn validate(&self, request: &OrderRequest) -> Result<(), ExchangeError> {
        if !self.catalog.contains(&request.symbol) {
            return Err(ExchangeError::Validation(format!(
                "unknown instrument: {}",
                request.symbol
            )));
        }
        if request.amount.value() <= Decimal::ZERO {
            return Err(ExchangeError::Validation(
                "order amount must be positive".to_string(),
            ));
        }
        if request.order_type == OrderType::Limit {
            match request.limit_price {
                Some(price) if price > Decimal::ZERO => {}
                _ => {
                    return Err(ExchangeError::Validation(
                        "limit orders require a positive price".to_string(),
                    ))
                }
            }
        }
        if let Some(notional) = request.notional() {
            if notional > self.config.max_trade_amount {
                return Err(ExchangeError::Validation(format!(
                    "notional {notional} exceeds the per-trade cap {}",
                    self.config.max_trade_amount
                )));
            }
        }
        Ok(())
    }

    fn exchange(&self, id: ExchangeId) -> Result<&Arc<dyn Exchange>, ExchangeError> {
        self.exchanges
            .get(&id)
            .ok_or_else(|| ExchangeError::Validation(format!("venue {id} is not connected")))
    }

    fn instrument(&self, symbol: &str) -> Result<Instrument, ExchangeError> {
        self.catalog
            .get(symbol)
            .cloned()
            .ok_or_else(|| ExchangeError::Validation(format!("unknown instrument: {symbol}")))
    }

    fn record_fill(&self, order: &mut Order, quantity: Decimal, price: Decimal) {
        if order.status.is_terminal() {
            warn!(
                key = %order.client_key,
                status = ?order.status,
                "ignoring fill for terminal order"
            );
            return;
        }
        order.add_fill(quantity, price);
        if order.is_filled() {
            let avg_price = order.filled_avg_price.unwrap_or(price);
            let record = TradeRecord::from_order(order, order.filled_quantity, avg_price);
            let seq = self.ledger.append(record);
            info!(
                key = %order.client_key,
                seq,
                quantity = %order.filled_quantity,
                price = %avg_price,
                "order filled"
            );
        }
    }
}
