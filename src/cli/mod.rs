//! CLI definitions.

pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use std::path::PathBuf;
use tradehub_core::types::ExchangeId;

#[derive(Parser)]
#[command(name = "tradehub")]
#[command(author, version, about = "Multi-exchange trading coordinator")]
pub struct Cli {
    /// Configuration file path (tradehub.toml is picked up when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level, overriding the [log] section
    #[arg(short, long)]
    pub log_level: Option<LogLevel>,

    /// Enable JSON log format
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show holdings valued at current prices
    Portfolio(PortfolioArgs),
    /// Show merged market data
    Market(MarketArgs),
    /// Place an order
    Trade(TradeArgs),
    /// Show executed trades
    History(HistoryArgs),
    /// Run the coordinator until interrupted
    Run(RunArgs),
    /// Validate configuration
    ValidateConfig,
}

#[derive(clap::Args)]
pub struct PortfolioArgs {
    /// Include recent trades and profit-engine status
    #[arg(long)]
    pub overview: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    pub output: String,
}

#[derive(clap::Args)]
pub struct MarketArgs {
    /// Symbol to show; omit for every known symbol
    pub symbol: Option<String>,

    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    pub output: String,
}

#[derive(clap::Args)]
pub struct TradeArgs {
    #[command(subcommand)]
    pub command: TradeCommand,
}

#[derive(Subcommand)]
pub enum TradeCommand {
    /// Buy an asset
    Buy(OrderArgs),
    /// Sell an asset
    Sell(OrderArgs),
}

#[derive(clap::Args)]
pub struct OrderArgs {
    /// Instrument symbol, e.g. BTC
    pub symbol: String,

    /// Spend this much quote currency (market orders only)
    #[arg(long, conflicts_with_all = ["quantity", "limit"])]
    pub funds: Option<Decimal>,

    /// Order size in base units
    #[arg(long)]
    pub quantity: Option<Decimal>,

    /// Limit price; omitted means a market order
    #[arg(long)]
    pub limit: Option<Decimal>,

    /// Venue to route to
    #[arg(long, default_value = "sim")]
    pub venue: ExchangeId,

    /// Idempotency key; generated when omitted
    #[arg(long)]
    pub key: Option<String>,
}

#[derive(clap::Args)]
pub struct HistoryArgs {
    /// Maximum records to show
    #[arg(long, default_value = "20")]
    pub limit: usize,

    /// Page cursor from a previous invocation
    #[arg(long)]
    pub cursor: Option<u64>,

    /// Only trades for this symbol
    #[arg(long)]
    pub symbol: Option<String>,
}

#[derive(clap::Args)]
pub struct RunArgs {
    /// Start the profit engine with the configured policy
    #[arg(long)]
    pub auto_profit: bool,
}
