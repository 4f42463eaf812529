//! Configuration structures and loading.

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tradehub_core::types::{AutoProfitPolicy, ExchangeAccount, ExchangeId};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub exchanges: ExchangesSettings,
    #[serde(default)]
    pub market: MarketSettings,
    #[serde(default)]
    pub router: RouterSettings,
    #[serde(default)]
    pub portfolio: PortfolioSettings,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub log: LogSettings,
}

impl Settings {
    /// Load settings from defaults, an optional TOML file, and
    /// `TRADEHUB`-prefixed environment variables, later sources
    /// overriding earlier ones.
    ///
    /// With an explicit `path` the file must exist; otherwise
    /// `tradehub.toml` in the working directory is used when present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let files = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("tradehub").required(false),
        };

        let config = Config::builder()
            .add_source(files)
            .add_source(
                Environment::with_prefix("TRADEHUB")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Reject settings the services cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.market.poll_interval_secs == 0 {
            return Err(ConfigError::Message(
                "market.poll_interval_secs must be positive".into(),
            ));
        }
        if self.market.priority.is_empty() {
            return Err(ConfigError::Message(
                "market.priority must name at least one venue".into(),
            ));
        }
        if self.router.max_trade_amount <= Decimal::ZERO {
            return Err(ConfigError::Message(
                "router.max_trade_amount must be positive".into(),
            ));
        }
        if self.router.bucket_capacity == 0 {
            return Err(ConfigError::Message(
                "router.bucket_capacity must be positive".into(),
            ));
        }
        if self.router.refill_per_sec == 0 {
            return Err(ConfigError::Message(
                "router.refill_per_sec must be positive".into(),
            ));
        }
        if self.portfolio.ttl_secs == 0 {
            return Err(ConfigError::Message(
                "portfolio.ttl_secs must be positive".into(),
            ));
        }
        if self.engine.threshold <= Decimal::ZERO {
            return Err(ConfigError::Message(
                "engine.threshold must be positive".into(),
            ));
        }
        if self.engine.interval_secs == 0 {
            return Err(ConfigError::Message(
                "engine.interval_secs must be positive".into(),
            ));
        }
        for (name, venue) in [
            ("binance", &self.exchanges.binance),
            ("coinbase", &self.exchanges.coinbase),
        ] {
            if venue.enabled && !venue.has_credentials() {
                return Err(ConfigError::Message(format!(
                    "exchanges.{name} is enabled but has no credentials"
                )));
            }
        }
        Ok(())
    }

    /// Accounts for every enabled venue. The simulated venue needs no
    /// credentials.
    pub fn accounts(&self) -> Vec<ExchangeAccount> {
        let mut accounts = Vec::new();
        if let Some(account) = self.exchanges.binance.account(ExchangeId::Binance) {
            accounts.push(account);
        }
        if let Some(account) = self.exchanges.coinbase.account(ExchangeId::Coinbase) {
            accounts.push(account);
        }
        if self.exchanges.sim.enabled {
            accounts.push(ExchangeAccount::new(ExchangeId::Sim, "", ""));
        }
        accounts
    }

    /// Render the resolved settings as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Per-venue connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangesSettings {
    pub binance: VenueSettings,
    pub coinbase: VenueSettings,
    pub sim: VenueSettings,
}

impl Default for ExchangesSettings {
    fn default() -> Self {
        Self {
            binance: VenueSettings::default(),
            coinbase: VenueSettings::default(),
            sim: VenueSettings {
                enabled: true,
                ..VenueSettings::default()
            },
        }
    }
}

/// Credentials and endpoint for one venue.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VenueSettings {
    pub enabled: bool,
    pub api_key: String,
    pub api_secret: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl VenueSettings {
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }

    /// Credentials for the venue, when it is enabled and fully
    /// configured.
    pub fn account(&self, exchange: ExchangeId) -> Option<ExchangeAccount> {
        if !self.enabled || !self.has_credentials() {
            return None;
        }
        let mut account =
            ExchangeAccount::new(exchange, self.api_key.clone(), self.api_secret.clone());
        if let Some(url) = &self.base_url {
            account = account.with_base_url(url.clone());
        }
        Some(account)
    }
}

/// Market data polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSettings {
    /// Seconds between quote polls per venue
    pub poll_interval_secs: u64,
    /// Venues in descending priority, used to break quote ties
    pub priority: Vec<ExchangeId>,
}

impl MarketSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 2,
            priority: ExchangeId::all().to_vec(),
        }
    }
}

/// Order routing limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    /// Largest notional a single order may carry, in quote currency
    pub max_trade_amount: Decimal,
    /// Burst size of the per-venue rate limiter
    pub bucket_capacity: u32,
    /// Sustained rate of the per-venue rate limiter
    pub refill_per_sec: u32,
}

impl Default for RouterSettings {
    fn default() -> Self {
        use rust_decimal_macros::dec;
        Self {
            max_trade_amount: dec!(10000),
            bucket_capacity: 10,
            refill_per_sec: 5,
        }
    }
}

/// Portfolio valuation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioSettings {
    /// Seconds before a cached balance or quote counts as stale
    pub ttl_secs: u64,
}

impl Default for PortfolioSettings {
    fn default() -> Self {
        Self { ttl_secs: 30 }
    }
}

/// Auto-profit engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Gain fraction that triggers a close, e.g. 0.05 for +5%
    pub threshold: Decimal,
    /// Seconds between evaluation ticks
    pub interval_secs: u64,
    /// Symbols to watch; empty means every tracked position
    pub symbols: Vec<String>,
}

impl EngineSettings {
    /// The policy this section describes.
    pub fn policy(&self) -> AutoProfitPolicy {
        AutoProfitPolicy::default()
            .with_threshold(self.threshold)
            .with_interval_secs(self.interval_secs)
            .with_symbols(self.symbols.clone())
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        use rust_decimal_macros::dec;
        Self {
            threshold: dec!(0.05),
            interval_secs: 10,
            symbols: Vec::new(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    /// Emit JSON lines instead of the human format
    pub json: bool,
    /// Mirror output to this file, rolled daily
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_are_runnable() {
        let settings = Settings::default();
        assert_eq!(settings.market.poll_interval_secs, 2);
        assert_eq!(settings.market.priority.len(), 3);
        assert_eq!(settings.router.max_trade_amount, dec!(10000));
        assert_eq!(settings.router.bucket_capacity, 10);
        assert_eq!(settings.portfolio.ttl_secs, 30);
        assert_eq!(settings.engine.threshold, dec!(0.05));
        assert_eq!(settings.log.level, "info");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_file_and_env_layering() {
        let path = std::env::temp_dir().join("tradehub-settings-test.toml");
        std::fs::write(
            &path,
            "[router]\nmax_trade_amount = 2500\n\n[log]\nlevel = \"debug\"\n",
        )
        .unwrap();
        std::env::set_var("TRADEHUB_ROUTER__BUCKET_CAPACITY", "3");

        let settings = Settings::load(Some(&path)).unwrap();

        std::env::remove_var("TRADEHUB_ROUTER__BUCKET_CAPACITY");
        std::fs::remove_file(&path).ok();

        // File overrides defaults, environment overrides the file, and
        // untouched keys keep their defaults.
        assert_eq!(settings.router.max_trade_amount, dec!(2500));
        assert_eq!(settings.router.bucket_capacity, 3);
        assert_eq!(settings.router.refill_per_sec, 5);
        assert_eq!(settings.log.level, "debug");
        assert!(!settings.log.json);
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut settings = Settings::default();
        settings.engine.interval_secs = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.router.max_trade_amount = Decimal::ZERO;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.exchanges.binance.enabled = true;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("binance"));
    }

    #[test]
    fn test_accounts_for_enabled_venues() {
        let settings = Settings::default();
        let accounts = settings.accounts();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].exchange, ExchangeId::Sim);

        let mut settings = Settings::default();
        settings.exchanges.binance = VenueSettings {
            enabled: true,
            api_key: "key".into(),
            api_secret: "secret".into(),
            base_url: Some("https://testnet.binance.vision".into()),
        };
        let accounts = settings.accounts();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].exchange, ExchangeId::Binance);
        assert_eq!(
            accounts[0].base_url.as_deref(),
            Some("https://testnet.binance.vision")
        );
    }

    #[test]
    fn test_to_toml_round_trips() {
        let rendered = Settings::default().to_toml().unwrap();
        assert!(rendered.contains("[market]"));
        assert!(rendered.contains("poll_interval_secs = 2"));

        let parsed: Settings = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.router.max_trade_amount, dec!(10000));
        assert_eq!(parsed.market.priority, ExchangeId::all().to_vec());
    }
}
