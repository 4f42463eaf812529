//! Simulated venue for tests and dry runs.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tradehub_core::error::ExchangeError;
use tradehub_core::traits::Exchange;
use tradehub_core::types::{
    Amount, Balance, ExchangeId, Instrument, OrderAck, OrderRequest, OrderType, Quote, Side,
};

const CASH_ASSET: &str = "USD";

/// In-process venue with deterministic fills.
///
/// Market orders fill immediately at the posted price and move the
/// balance table; limit orders rest until canceled. Failures are
/// injectable per call site.
pub struct SimExchange {
    prices: Arc<Mutex<HashMap<String, Decimal>>>,
    balances: Arc<Mutex<HashMap<String, Decimal>>>,
    resting: Arc<Mutex<HashSet<String>>>,
    placed: Arc<Mutex<Vec<OrderRequest>>>,
    reject_next: Arc<Mutex<Option<String>>>,
    fail_quotes: Arc<AtomicBool>,
    fail_balances: Arc<AtomicBool>,
    next_id: AtomicU64,
}

impl SimExchange {
    /// Empty venue: no prices, no balances.
    pub fn new() -> Self {
        Self {
            prices: Arc::new(Mutex::new(HashMap::new())),
            balances: Arc::new(Mutex::new(HashMap::new())),
            resting: Arc::new(Mutex::new(HashSet::new())),
            placed: Arc::new(Mutex::new(Vec::new())),
            reject_next: Arc::new(Mutex::new(None)),
            fail_quotes: Arc::new(AtomicBool::new(false)),
            fail_balances: Arc::new(AtomicBool::new(false)),
            next_id: AtomicU64::new(0),
        }
    }

    /// Venue seeded with reference prices and a small USD-heavy book,
    /// used by the CLI when no real credentials are configured.
    pub fn seeded() -> Self {
        let sim = Self::new();
        sim.set_balance(CASH_ASSET, dec!(10000));
        sim.set_balance("BTC", dec!(0.25));
        sim.set_balance("ETH", dec!(2));
        sim.set_price("BTC", dec!(93000));
        sim.set_price("ETH", dec!(3100));
        sim.set_price("BNB", dec!(620));
        sim.set_price("SOL", dec!(245));
        sim.set_price("ADA", dec!(0.95));
        sim.set_price("XRP", dec!(1.10));
        sim
    }

    /// Post a price for a symbol.
    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices
            .lock()
            .unwrap()
            .insert(symbol.to_ascii_uppercase(), price);
    }

    /// Set the free balance for an asset.
    pub fn set_balance(&self, asset: &str, quantity: Decimal) {
        self.balances
            .lock()
            .unwrap()
            .insert(asset.to_ascii_uppercase(), quantity);
    }

    /// The free balance for an asset.
    pub fn balance(&self, asset: &str) -> Decimal {
        self.balances
            .lock()
            .unwrap()
            .get(&asset.to_ascii_uppercase())
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Reject the next order with the given reason.
    pub fn reject_next_order(&self, reason: impl Into<String>) {
        *self.reject_next.lock().unwrap() = Some(reason.into());
    }

    /// Make quote fetches fail until cleared.
    pub fn set_quote_failures(&self, failing: bool) {
        self.fail_quotes.store(failing, Ordering::SeqCst);
    }

    /// Make balance fetches fail until cleared.
    pub fn set_balance_failures(&self, failing: bool) {
        self.fail_balances.store(failing, Ordering::SeqCst);
    }

    /// Every order request the venue has received, in arrival order.
    pub fn placed_orders(&self) -> Vec<OrderRequest> {
        self.placed.lock().unwrap().clone()
    }

    /// Whether a limit order is still resting.
    pub fn is_resting(&self, venue_order_id: &str) -> bool {
        self.resting.lock().unwrap().contains(venue_order_id)
    }

    fn price_of(&self, symbol: &str) -> Option<Decimal> {
        self.prices
            .lock()
            .unwrap()
            .get(&symbol.to_ascii_uppercase())
            .copied()
    }

    fn rejected(&self, reason: impl Into<String>) -> ExchangeError {
        ExchangeError::Rejected {
            venue: ExchangeId::Sim.to_string(),
            reason: reason.into(),
        }
    }
}

impl Default for SimExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Exchange for SimExchange {
    fn id(&self) -> ExchangeId {
        ExchangeId::Sim
    }

    async fn fetch_quote(&self, instrument: &Instrument) -> Result<Quote, ExchangeError> {
        if self.fail_quotes.load(Ordering::SeqCst) {
            return Err(ExchangeError::Network("sim quote failure".to_string()));
        }
        let price = self
            .price_of(&instrument.symbol)
            .ok_or_else(|| ExchangeError::NotFound(instrument.symbol.clone()))?;
        Ok(Quote {
            symbol: instrument.symbol.clone(),
            bid: price,
            ask: price,
            last: price,
            change_24h: None,
            volume_24h: None,
            exchange: ExchangeId::Sim,
            observed_at: Utc::now(),
        })
    }

    async fn fetch_balances(&self) -> Result<Vec<Balance>, ExchangeError> {
        if self.fail_balances.load(Ordering::SeqCst) {
            return Err(ExchangeError::Network("sim balance failure".to_string()));
        }
        let balances = self
            .balances
            .lock()
            .unwrap()
            .iter()
            .map(|(asset, qty)| Balance::new(asset.clone(), *qty, Decimal::ZERO, ExchangeId::Sim))
            .filter(|b| !b.is_zero())
            .collect();
        Ok(balances)
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderAck, ExchangeError> {
        self.placed.lock().unwrap().push(request.clone());

        if let Some(reason) = self.reject_next.lock().unwrap().take() {
            return Err(self.rejected(reason));
        }

        let venue_order_id = format!("sim-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);

        match request.order_type {
            OrderType::Market => {
                let price = self
                    .price_of(&request.symbol)
                    .ok_or_else(|| self.rejected(format!("no liquidity for {}", request.symbol)))?;
                let quantity = match request.amount {
                    Amount::Quantity(quantity) => quantity,
                    Amount::Funds(funds) => funds / price,
                };
                let notional = quantity * price;

                let mut balances = self.balances.lock().unwrap();
                let cash = balances.get(CASH_ASSET).copied().unwrap_or(Decimal::ZERO);
                let held = balances
                    .get(&request.symbol.to_ascii_uppercase())
                    .copied()
                    .unwrap_or(Decimal::ZERO);
                match request.side {
                    Side::Buy => {
                        if notional > cash {
                            return Err(self.rejected(format!(
                                "insufficient funds: need {notional}, have {cash}"
                            )));
                        }
                        balances.insert(CASH_ASSET.to_string(), cash - notional);
                        balances.insert(request.symbol.to_ascii_uppercase(), held + quantity);
                    }
                    Side::Sell => {
                        if quantity > held {
                            return Err(self.rejected(format!(
                                "insufficient balance: need {quantity}, have {held}"
                            )));
                        }
                        balances.insert(request.symbol.to_ascii_uppercase(), held - quantity);
                        balances.insert(CASH_ASSET.to_string(), cash + notional);
                    }
                }

                Ok(OrderAck::filled(venue_order_id, quantity, price))
            }
            OrderType::Limit => {
                self.resting.lock().unwrap().insert(venue_order_id.clone());
                Ok(OrderAck::accepted(venue_order_id))
            }
        }
    }

    async fn cancel_order(
        &self,
        venue_order_id: &str,
        _instrument: &Instrument,
    ) -> Result<(), ExchangeError> {
        if self.resting.lock().unwrap().remove(venue_order_id) {
            Ok(())
        } else {
            Err(ExchangeError::NotFound(venue_order_id.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market_buy(funds: Decimal) -> OrderRequest {
        OrderRequest::market(
            "key-1",
            "BTC",
            Side::Buy,
            Amount::Funds(funds),
            ExchangeId::Sim,
        )
    }

    #[tokio::test]
    async fn test_funds_buy_fills_and_moves_balances() {
        let sim = SimExchange::new();
        sim.set_price("BTC", dec!(100));
        sim.set_balance("USD", dec!(1000));

        let ack = sim.place_order(&market_buy(dec!(500))).await.unwrap();
        assert_eq!(ack.filled_quantity, Some(dec!(5)));
        assert_eq!(ack.fill_price, Some(dec!(100)));
        assert_eq!(sim.balance("USD"), dec!(500));
        assert_eq!(sim.balance("BTC"), dec!(5));
    }

    #[tokio::test]
    async fn test_insufficient_funds_rejects() {
        let sim = SimExchange::new();
        sim.set_price("BTC", dec!(100));
        sim.set_balance("USD", dec!(10));

        let err = sim.place_order(&market_buy(dec!(500))).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Rejected { .. }));
        // Nothing moved.
        assert_eq!(sim.balance("USD"), dec!(10));
    }

    #[tokio::test]
    async fn test_limit_rests_until_canceled() {
        let sim = SimExchange::new();
        let request = OrderRequest::limit(
            "key-2",
            "ETH",
            Side::Sell,
            dec!(1),
            dec!(3200),
            ExchangeId::Sim,
        );

        let ack = sim.place_order(&request).await.unwrap();
        assert!(ack.filled_quantity.is_none());
        assert!(sim.is_resting(&ack.venue_order_id));

        sim.cancel_order(&ack.venue_order_id, &Instrument::usd("ETH"))
            .await
            .unwrap();
        assert!(!sim.is_resting(&ack.venue_order_id));

        let err = sim
            .cancel_order(&ack.venue_order_id, &Instrument::usd("ETH"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reject_next_is_one_shot() {
        let sim = SimExchange::new();
        sim.set_price("BTC", dec!(100));
        sim.set_balance("USD", dec!(1000));
        sim.reject_next_order("MIN_NOTIONAL");

        assert!(sim.place_order(&market_buy(dec!(100))).await.is_err());
        assert!(sim.place_order(&market_buy(dec!(100))).await.is_ok());
        // Both calls reached the venue.
        assert_eq!(sim.placed_orders().len(), 2);
    }

    #[tokio::test]
    async fn test_quote_failure_injection() {
        let sim = SimExchange::new();
        sim.set_price("BTC", dec!(100));
        sim.set_quote_failures(true);
        let err = sim.fetch_quote(&Instrument::usd("BTC")).await.unwrap_err();
        assert!(err.is_retryable());

        sim.set_quote_failures(false);
        assert!(sim.fetch_quote(&Instrument::usd("BTC")).await.is_ok());
    }
}
