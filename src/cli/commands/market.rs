//! Market data command implementation.

use anyhow::Result;
use tradehub_config::Settings;
use tradehub_core::types::{MarketView, PriceBasis};

use crate::cli::MarketArgs;

pub async fn run(args: MarketArgs, settings: &Settings) -> Result<()> {
    let hub = super::connect(settings)?;
    hub.warm_up().await;

    let views = match &args.symbol {
        Some(symbol) => match hub.market_data(symbol) {
            Some(view) => vec![view],
            None => {
                println!("No market data for {}", symbol.to_ascii_uppercase());
                hub.shutdown();
                return Ok(());
            }
        },
        None => hub.market_data_all(),
    };

    match args.output.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&views)?),
        _ => {
            for view in &views {
                print_view(view);
            }
        }
    }

    hub.shutdown();
    Ok(())
}

fn print_view(view: &MarketView) {
    let basis = match view.basis {
        PriceBasis::Live(venue) => format!("live:{venue}"),
        PriceBasis::Fallback => "fallback".to_string(),
    };
    println!(
        "{:<6} {:>14}  [{}]  as of {}",
        view.symbol,
        view.primary_price,
        basis,
        view.as_of.format("%H:%M:%S")
    );
    for quote in &view.quotes {
        let mut line = format!(
            "    {:<9} bid {:>14}  ask {:>14}  last {:>14}",
            quote.exchange.as_str(),
            quote.bid,
            quote.ask,
            quote.last
        );
        if let Some(change) = quote.change_24h {
            line.push_str(&format!("  24h {change:>+7}%"));
        }
        if let Some(volume) = quote.volume_24h {
            line.push_str(&format!("  vol {volume}"));
        }
        println!("{line}");
    }
}
