//! Trade command implementation.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use tradehub_config::Settings;
use tradehub_core::types::{Amount, Order, Side};
use uuid::Uuid;

use crate::cli::{TradeArgs, TradeCommand};

pub async fn run(args: TradeArgs, settings: &Settings) -> Result<()> {
    let (side, order) = match args.command {
        TradeCommand::Buy(order) => (Side::Buy, order),
        TradeCommand::Sell(order) => (Side::Sell, order),
    };

    let hub = super::connect(settings)?;
    let key = order
        .key
        .clone()
        .unwrap_or_else(|| format!("cli:{}", Uuid::new_v4()));

    let placed = match order.limit {
        Some(price) => {
            let quantity = order
                .quantity
                .context("limit orders need --quantity")?;
            hub.place_limit_order(
                key.as_str(),
                order.symbol.as_str(),
                side,
                quantity,
                price,
                order.venue,
            )
            .await?
        }
        None => {
            let amount = match (order.funds, order.quantity) {
                (Some(funds), None) => Amount::Funds(funds),
                (None, Some(quantity)) => Amount::Quantity(quantity),
                _ => bail!("market orders need --funds or --quantity"),
            };
            hub.place_market_order(key.as_str(), order.symbol.as_str(), side, amount, order.venue)
                .await?
        }
    };

    print_order(&placed);
    hub.shutdown();
    Ok(())
}

fn print_order(order: &Order) {
    println!(
        "{:?} {} {} on {} (key {})",
        order.status, order.side, order.symbol, order.exchange, order.client_key
    );
    if order.filled_quantity > Decimal::ZERO {
        if let Some(price) = order.filled_avg_price {
            println!("  filled {} @ {}", order.filled_quantity, price);
        }
    }
    if let Some(venue_id) = &order.venue_order_id {
        println!("  venue order id: {venue_id}");
    }
    if let Some(error) = &order.error {
        println!("  error: {error}");
    }
}
