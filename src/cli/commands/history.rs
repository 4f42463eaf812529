//! Trade history command implementation.

use anyhow::Result;
use tradehub_config::Settings;
use tradehub_core::types::TradeRecord;

use crate::cli::HistoryArgs;

pub async fn run(args: HistoryArgs, settings: &Settings) -> Result<()> {
    let hub = super::connect(settings)?;

    let records = match &args.symbol {
        Some(symbol) => hub.trades_for(symbol, args.limit),
        None => {
            let page = hub.trade_history(args.cursor, args.limit);
            if let Some(cursor) = page.next_cursor {
                println!("(older records available; resume with --cursor {cursor})");
            }
            page.records
        }
    };

    if records.is_empty() {
        println!("No trades recorded this session.");
    }
    for record in &records {
        print_record(record);
    }

    hub.shutdown();
    Ok(())
}

fn print_record(record: &TradeRecord) {
    let profit = match record.profit_percent {
        Some(percent) => format!("  profit {percent}%"),
        None => String::new(),
    };
    println!(
        "#{:<4} {} {} {} {} @ {} on {} [{}]{}",
        record.seq,
        record.executed_at.format("%H:%M:%S"),
        record.side,
        record.quantity,
        record.symbol,
        record.price,
        record.exchange,
        record.kind,
        profit
    );
}
