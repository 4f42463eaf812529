//! Order types and structures.

use crate::types::exchange::ExchangeId;
use crate::types::trade::TradeKind;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Get the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Execute immediately at the best available price
    Market,
    /// Execute at the given price or better, good til canceled
    Limit,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
        }
    }
}

/// How the order size is denominated.
///
/// Market buys may spend a fixed amount of quote currency instead of
/// naming a base quantity; both venues support that form natively.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Amount {
    /// Size in base units of the instrument
    Quantity(Decimal),
    /// Spend in quote currency
    Funds(Decimal),
}

impl Amount {
    pub fn value(&self) -> Decimal {
        match self {
            Amount::Quantity(v) | Amount::Funds(v) => *v,
        }
    }

    pub fn is_funds(&self) -> bool {
        matches!(self, Amount::Funds(_))
    }
}

/// Order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order created but not yet acknowledged by the venue
    Pending,
    /// Order accepted by the venue
    Submitted,
    /// Order partially filled
    PartiallyFilled,
    /// Order completely filled
    Filled,
    /// Order rejected (by the venue, or failed in transit)
    Rejected,
    /// Order canceled
    Canceled,
}

impl OrderStatus {
    /// Check if the order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Rejected | OrderStatus::Canceled
        )
    }

    /// Check if the order is active (can still be filled).
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Submitted | OrderStatus::PartiallyFilled
        )
    }
}

/// Order request for submitting new orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Idempotency key chosen by the caller; at most one order per key
    pub client_key: String,
    /// Internal instrument symbol
    pub symbol: String,
    /// Buy or sell
    pub side: Side,
    /// Type of order
    pub order_type: OrderType,
    /// Order size
    pub amount: Amount,
    /// Limit price (limit orders only)
    pub limit_price: Option<Decimal>,
    /// Venue to route to
    pub exchange: ExchangeId,
    /// Whether this order was placed manually or by the profit engine
    pub kind: TradeKind,
    /// Acquisition price, carried onto the trade record for closes
    pub entry_price: Option<Decimal>,
}

impl OrderRequest {
    /// Create a market order request.
    pub fn market(
        client_key: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        amount: Amount,
        exchange: ExchangeId,
    ) -> Self {
        Self {
            client_key: client_key.into(),
            symbol: symbol.into().to_ascii_uppercase(),
            side,
            order_type: OrderType::Market,
            amount,
            limit_price: None,
            exchange,
            kind: TradeKind::Manual,
            entry_price: None,
        }
    }

    /// Create a limit order request. Limits are always quantity-sized.
    pub fn limit(
        client_key: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        quantity: Decimal,
        limit_price: Decimal,
        exchange: ExchangeId,
    ) -> Self {
        Self {
            client_key: client_key.into(),
            symbol: symbol.into().to_ascii_uppercase(),
            side,
            order_type: OrderType::Limit,
            amount: Amount::Quantity(quantity),
            limit_price: Some(limit_price),
            exchange,
            kind: TradeKind::Manual,
            entry_price: None,
        }
    }

    /// Mark the order as engine-initiated.
    pub fn with_kind(mut self, kind: TradeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Record the acquisition price the close is measured against.
    pub fn with_entry_price(mut self, price: Decimal) -> Self {
        self.entry_price = Some(price);
        self
    }

    /// The quote-currency value of the order, where it is knowable
    /// before execution: the funds amount, or quantity times limit
    /// price. Market orders sized in base units have no notional yet.
    pub fn notional(&self) -> Option<Decimal> {
        match (self.amount, self.limit_price) {
            (Amount::Funds(funds), _) => Some(funds),
            (Amount::Quantity(qty), Some(price)) => Some(qty * price),
            (Amount::Quantity(_), None) => None,
        }
    }
}

/// Venue acknowledgement for a submitted order.
///
/// Market orders on both venues execute inside the submission call, so
/// the ack may already carry the fill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    /// Identifier assigned by the venue
    pub venue_order_id: String,
    /// Base quantity filled immediately, if any
    pub filled_quantity: Option<Decimal>,
    /// Price of the immediate fill
    pub fill_price: Option<Decimal>,
}

impl OrderAck {
    /// Ack with no immediate execution (resting limit order).
    pub fn accepted(venue_order_id: impl Into<String>) -> Self {
        Self {
            venue_order_id: venue_order_id.into(),
            filled_quantity: None,
            fill_price: None,
        }
    }

    /// Ack carrying an immediate fill.
    pub fn filled(
        venue_order_id: impl Into<String>,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            venue_order_id: venue_order_id.into(),
            filled_quantity: Some(quantity),
            fill_price: Some(price),
        }
    }
}

/// Complete order with status and fill information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Unique order ID
    pub id: Uuid,
    /// Caller-provided idempotency key
    pub client_key: String,
    /// Internal instrument symbol
    pub symbol: String,
    /// Buy or sell
    pub side: Side,
    /// Type of order
    pub order_type: OrderType,
    /// Requested size
    pub amount: Amount,
    /// Limit price
    pub limit_price: Option<Decimal>,
    /// Venue the order was routed to
    pub exchange: ExchangeId,
    /// Manual or engine-initiated
    pub kind: TradeKind,
    /// Acquisition price for closes
    pub entry_price: Option<Decimal>,
    /// Identifier assigned by the venue once submitted
    pub venue_order_id: Option<String>,
    /// Current status
    pub status: OrderStatus,
    /// Base quantity filled so far
    pub filled_quantity: Decimal,
    /// Average fill price
    pub filled_avg_price: Option<Decimal>,
    /// Failure detail for rejected orders
    pub error: Option<String>,
    /// When the order was created
    pub created_at: DateTime<Utc>,
    /// When the order was last updated
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a new order from a request.
    pub fn from_request(request: &OrderRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            client_key: request.client_key.clone(),
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            amount: request.amount,
            limit_price: request.limit_price,
            exchange: request.exchange,
            kind: request.kind,
            entry_price: request.entry_price,
            venue_order_id: None,
            status: OrderStatus::Pending,
            filled_quantity: Decimal::ZERO,
            filled_avg_price: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The requested base quantity, if the order was sized that way.
    pub fn requested_quantity(&self) -> Option<Decimal> {
        match self.amount {
            Amount::Quantity(qty) => Some(qty),
            Amount::Funds(_) => None,
        }
    }

    /// Check if the order is completely filled.
    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }

    /// Check if the order can be canceled.
    pub fn is_cancelable(&self) -> bool {
        self.status.is_active()
    }

    /// Mark the order as accepted by the venue.
    pub fn mark_submitted(&mut self, venue_order_id: impl Into<String>) {
        self.venue_order_id = Some(venue_order_id.into());
        self.status = OrderStatus::Submitted;
        self.updated_at = Utc::now();
    }

    /// Mark the order as rejected, recording the failure detail.
    pub fn mark_rejected(&mut self, reason: impl Into<String>) {
        self.status = OrderStatus::Rejected;
        self.error = Some(reason.into());
        self.updated_at = Utc::now();
    }

    /// Mark the order as canceled.
    pub fn mark_canceled(&mut self) {
        self.status = OrderStatus::Canceled;
        self.updated_at = Utc::now();
    }

    /// Apply a fill, updating quantity, average price, and status.
    ///
    /// Quantity-sized orders complete when the fills cover the request;
    /// funds-sized market orders execute in one shot, so any fill
    /// completes them.
    pub fn add_fill(&mut self, quantity: Decimal, price: Decimal) {
        let total_qty = self.filled_quantity + quantity;
        let total_value = self.filled_avg_price.unwrap_or(Decimal::ZERO) * self.filled_quantity
            + price * quantity;

        if total_qty > Decimal::ZERO {
            self.filled_avg_price = Some(total_value / total_qty);
        }
        self.filled_quantity = total_qty;
        self.updated_at = Utc::now();

        let complete = match self.requested_quantity() {
            Some(requested) => self.filled_quantity >= requested,
            None => true,
        };
        self.status = if complete {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
    }
}
