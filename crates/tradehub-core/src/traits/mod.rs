//! Core traits for the trading coordinator.

mod exchange;

pub use exchange::Exchange;
