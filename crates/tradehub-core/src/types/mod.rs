//! Core data types for the trading coordinator.

mod balance;
mod exchange;
mod instrument;
mod order;
mod policy;
mod portfolio;
mod quote;
mod trade;

pub use balance::Balance;
pub use exchange::{ExchangeAccount, ExchangeId};
pub use instrument::{Instrument, InstrumentCatalog};
pub use order::{Amount, Order, OrderAck, OrderRequest, OrderStatus, OrderType, Side};
pub use policy::{AutoProfitPolicy, EngineStatus};
pub use portfolio::{AssetPosition, PortfolioSnapshot, StaleReason};
pub use quote::{MarketView, PriceBasis, Quote};
pub use trade::{TradeKind, TradeRecord};
