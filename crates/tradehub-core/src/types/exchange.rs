//! Exchange identity and account credentials.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier for a connected exchange venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeId {
    Binance,
    Coinbase,
    /// In-process simulated venue used for tests and dry runs.
    Sim,
}

impl ExchangeId {
    /// All known venues, in default priority order.
    pub fn all() -> [ExchangeId; 3] {
        [ExchangeId::Binance, ExchangeId::Coinbase, ExchangeId::Sim]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeId::Binance => "binance",
            ExchangeId::Coinbase => "coinbase",
            ExchangeId::Sim => "sim",
        }
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExchangeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binance" => Ok(ExchangeId::Binance),
            "coinbase" => Ok(ExchangeId::Coinbase),
            "sim" => Ok(ExchangeId::Sim),
            other => Err(format!("unknown exchange: {other}")),
        }
    }
}

/// Credentials and endpoint for one venue connection.
#[derive(Clone, Serialize, Deserialize)]
pub struct ExchangeAccount {
    /// Which venue these credentials belong to
    pub exchange: ExchangeId,
    /// API key sent with every request
    pub api_key: String,
    /// Secret used to sign requests
    pub api_secret: String,
    /// Base URL override (defaults to the venue's production endpoint)
    pub base_url: Option<String>,
}

impl ExchangeAccount {
    pub fn new(
        exchange: ExchangeId,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            exchange,
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            base_url: None,
        }
    }

    /// Override the venue base URL (testnets, local stubs).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
}

// Credentials stay out of log output.
impl fmt::Debug for ExchangeAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeAccount")
            .field("exchange", &self.exchange)
            .field("api_key", &"***")
            .field("api_secret", &"***")
            .field("base_url", &self.base_url)
            .finish()
    }
}
