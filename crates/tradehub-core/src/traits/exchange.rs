//! Exchange trait definition.

use crate::error::ExchangeError;
use crate::types::{Balance, ExchangeId, Instrument, OrderAck, OrderRequest, Quote};
use async_trait::async_trait;

/// Trait for venue adapters.
///
/// Adapters translate the internal order and balance model to one
/// venue's REST conventions. They never retry on their own; retry
/// policy belongs to the caller.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Which venue this adapter talks to.
    fn id(&self) -> ExchangeId;

    /// Fetch the current quote for an instrument.
    async fn fetch_quote(&self, instrument: &Instrument) -> Result<Quote, ExchangeError>;

    /// Fetch all non-zero account balances.
    async fn fetch_balances(&self) -> Result<Vec<Balance>, ExchangeError>;

    /// Submit an order.
    ///
    /// # Returns
    /// The venue acknowledgement, carrying the immediate fill when the
    /// venue executed the order inside the call (market orders).
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderAck, ExchangeError>;

    /// Cancel a resting order.
    ///
    /// # Arguments
    /// * `venue_order_id` - The venue's identifier from the ack
    /// * `instrument` - The instrument the order was placed on
    async fn cancel_order(
        &self,
        venue_order_id: &str,
        instrument: &Instrument,
    ) -> Result<(), ExchangeError>;
}

#[cfg(test)]
mod tests {
    // Exchange tests live with the adapter implementations.
}
