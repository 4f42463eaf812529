//! Core types and traits for the trading coordinator.
//!
//! This crate provides the foundational building blocks including:
//! - Exchange identity and account types
//! - Order, balance, and quote types
//! - Portfolio snapshot and trade record types
//! - The `Exchange` trait implemented by every venue adapter

pub mod types;
pub mod traits;
pub mod error;

pub use error::{ExchangeError, ExchangeResult};
pub use types::*;
pub use traits::*;
