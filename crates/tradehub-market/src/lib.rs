//! Market data aggregation across venues.
//!
//! One poll task per connected venue feeds a shared state map; readers
//! get merged `MarketView`s without ever blocking the pollers.

mod aggregator;
mod fallback;

pub use aggregator::MarketAggregator;
