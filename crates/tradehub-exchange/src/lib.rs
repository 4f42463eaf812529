//! Venue adapters for the trading coordinator.
//!
//! Each adapter translates the internal order/balance/quote model to
//! one venue's REST conventions: `BinanceExchange` (signed query
//! strings), `CoinbaseExchange` (signed JSON bodies), and
//! `SimExchange`, an in-process venue for tests and dry runs.

mod binance;
mod coinbase;
mod sign;
mod sim;

pub use binance::BinanceExchange;
pub use coinbase::CoinbaseExchange;
pub use sim::SimExchange;
