//! Portfolio command implementation.

use anyhow::Result;
use rust_decimal::Decimal;
use tradehub_config::Settings;
use tradehub_core::types::PortfolioSnapshot;

use crate::cli::PortfolioArgs;

pub async fn run(args: PortfolioArgs, settings: &Settings) -> Result<()> {
    let hub = super::connect(settings)?;
    hub.warm_up().await;

    if args.overview {
        let overview = hub.portfolio_overview().await;
        match args.output.as_str() {
            "json" => println!("{}", serde_json::to_string_pretty(&overview)?),
            _ => {
                print_snapshot(&overview.snapshot);
                println!();
                match &overview.engine.policy {
                    Some(policy) if overview.engine.running => println!(
                        "Auto-profit: running (threshold {}%, every {}s)",
                        policy.threshold * Decimal::ONE_HUNDRED,
                        policy.interval_secs
                    ),
                    _ => println!("Auto-profit: off"),
                }
                if overview.recent_trades.is_empty() {
                    println!("No trades this session.");
                } else {
                    println!("Recent trades:");
                    for trade in &overview.recent_trades {
                        println!(
                            "  #{} {} {} {} @ {} on {} [{}]",
                            trade.seq,
                            trade.side,
                            trade.quantity,
                            trade.symbol,
                            trade.price,
                            trade.exchange,
                            trade.kind
                        );
                    }
                }
            }
        }
    } else {
        let snapshot = hub.portfolio().await;
        match args.output.as_str() {
            "json" => println!("{}", serde_json::to_string_pretty(&snapshot)?),
            _ => print_snapshot(&snapshot),
        }
    }

    hub.shutdown();
    Ok(())
}

fn print_snapshot(snapshot: &PortfolioSnapshot) {
    println!(
        "Portfolio as of {}",
        snapshot.as_of.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if snapshot.positions.is_empty() {
        println!("  (no holdings)");
    }
    for position in &snapshot.positions {
        let stale = match position.stale {
            Some(reason) => format!("  [stale: {reason}]"),
            None => String::new(),
        };
        println!(
            "  {:<6} {:>16} @ {:>12}  = {:>14}{}",
            position.asset, position.quantity, position.price, position.value, stale
        );
    }
    println!("  Total (fresh positions): {}", snapshot.total_value);
    if !snapshot.missing_exchanges.is_empty() {
        let names: Vec<&str> = snapshot
            .missing_exchanges
            .iter()
            .map(|e| e.as_str())
            .collect();
        println!("  Venues with no data: {}", names.join(", "));
    }
}
