//! Configuration management.

mod settings;

pub use settings::{
    EngineSettings, ExchangesSettings, LogSettings, MarketSettings, PortfolioSettings,
    RouterSettings, Settings, VenueSettings,
};
