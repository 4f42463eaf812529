//! Binance venue adapter.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header, Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tradehub_core::error::ExchangeError;
use tradehub_core::traits::Exchange;
use tradehub_core::types::{
    Amount, Balance, ExchangeAccount, ExchangeId, Instrument, InstrumentCatalog, OrderAck,
    OrderRequest, OrderType, Quote, Side,
};
use tracing::{debug, info, warn};

const DEFAULT_BASE_URL: &str = "https://api.binance.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Binance REST API response types
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookTicker {
    bid_price: String,
    ask_price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DayTicker {
    last_price: String,
    price_change_percent: String,
    volume: String,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    balances: Vec<AccountBalance>,
}

#[derive(Debug, Deserialize)]
struct AccountBalance {
    asset: String,
    free: String,
    locked: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: u64,
    status: String,
    #[serde(default)]
    executed_qty: Option<String>,
    #[serde(default)]
    cummulative_quote_qty: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

/// Binance exchange client.
///
/// Signed endpoints carry a millisecond timestamp and an HMAC-SHA256
/// signature of the full query string, with the API key in the
/// `X-MBX-APIKEY` header.
pub struct BinanceExchange {
    account: ExchangeAccount,
    catalog: InstrumentCatalog,
    client: Client,
}

impl BinanceExchange {
    /// Create a new Binance client.
    pub fn new(account: ExchangeAccount) -> Result<Self, ExchangeError> {
        Self::with_catalog(account, InstrumentCatalog::defaults())
    }

    /// Create a client with a custom instrument catalog.
    pub fn with_catalog(
        account: ExchangeAccount,
        catalog: InstrumentCatalog,
    ) -> Result<Self, ExchangeError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            "X-MBX-APIKEY",
            header::HeaderValue::from_str(&account.api_key)
                .map_err(|e| ExchangeError::Auth(e.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        Ok(Self {
            account,
            catalog,
            client,
        })
    }

    fn base_url(&self) -> &str {
        self.account.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    /// Append the timestamp and signature the signed endpoints require.
    fn signed_query(&self, mut params: Vec<(String, String)>) -> String {
        params.push((
            "timestamp".to_string(),
            Utc::now().timestamp_millis().to_string(),
        ));
        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let signature = crate::sign::hmac_sha256_hex(&self.account.api_secret, &query);
        format!("{query}&signature={signature}")
    }

    fn instrument(&self, symbol: &str) -> Result<Instrument, ExchangeError> {
        self.catalog
            .get(symbol)
            .cloned()
            .ok_or_else(|| ExchangeError::Validation(format!("unknown instrument: {symbol}")))
    }

    fn read_error(&self, status: StatusCode, text: String) -> ExchangeError {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            ExchangeError::Auth(text)
        } else {
            ExchangeError::Network(format!("{status}: {text}"))
        }
    }

    fn order_error(&self, status: StatusCode, text: String) -> ExchangeError {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return ExchangeError::Auth(text);
        }
        match serde_json::from_str::<ApiError>(&text) {
            // -2011: unknown order on cancel
            Ok(err) if err.code == -2011 => ExchangeError::NotFound(err.msg),
            Ok(err) => ExchangeError::Rejected {
                venue: ExchangeId::Binance.to_string(),
                reason: format!("{} ({})", err.msg, err.code),
            },
            Err(_) => ExchangeError::Rejected {
                venue: ExchangeId::Binance.to_string(),
                reason: format!("{status}: {text}"),
            },
        }
    }
}

/// Build the order endpoint parameters for a request.
///
/// Market orders sized in quote currency use `quoteOrderQty`; sized in
/// base units they use `quantity`. Limit orders are GTC with explicit
/// `quantity` and `price`.
fn order_params(
    request: &OrderRequest,
    instrument: &Instrument,
) -> Result<Vec<(String, String)>, ExchangeError> {
    let side = match request.side {
        Side::Buy => "BUY",
        Side::Sell => "SELL",
    };
    let mut params = vec![
        (
            "symbol".to_string(),
            instrument.venue_symbol(ExchangeId::Binance),
        ),
        ("side".to_string(), side.to_string()),
    ];

    match request.order_type {
        OrderType::Market => {
            params.push(("type".to_string(), "MARKET".to_string()));
            match request.amount {
                Amount::Funds(funds) => {
                    params.push(("quoteOrderQty".to_string(), funds.to_string()));
                }
                Amount::Quantity(quantity) => {
                    params.push(("quantity".to_string(), quantity.to_string()));
                }
            }
        }
        OrderType::Limit => {
            let quantity = match request.amount {
                Amount::Quantity(quantity) => quantity,
                Amount::Funds(_) => {
                    return Err(ExchangeError::Validation(
                        "limit orders are quantity-sized".to_string(),
                    ));
                }
            };
            let price = request.limit_price.ok_or_else(|| {
                ExchangeError::Validation("limit order without a price".to_string())
            })?;
            params.push(("type".to_string(), "LIMIT".to_string()));
            params.push(("timeInForce".to_string(), "GTC".to_string()));
            params.push(("quantity".to_string(), quantity.to_string()));
            params.push(("price".to_string(), price.to_string()));
        }
    }

    Ok(params)
}

#[async_trait]
impl Exchange for BinanceExchange {
    fn id(&self) -> ExchangeId {
        ExchangeId::Binance
    }

    async fn fetch_quote(&self, instrument: &Instrument) -> Result<Quote, ExchangeError> {
        let venue_symbol = instrument.venue_symbol(ExchangeId::Binance);

        let url = format!("{}/api/v3/ticker/bookTicker", self.base_url());
        let resp = self
            .client
            .get(&url)
            .query(&[("symbol", &venue_symbol)])
            .send()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(self.read_error(status, text));
        }

        let book: BookTicker = resp
            .json()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        let url = format!("{}/api/v3/ticker/24hr", self.base_url());
        let resp = self
            .client
            .get(&url)
            .query(&[("symbol", &venue_symbol)])
            .send()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(self.read_error(status, text));
        }

        let ticker: DayTicker = resp
            .json()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        Ok(Quote {
            symbol: instrument.symbol.clone(),
            bid: book.bid_price.parse().unwrap_or(Decimal::ZERO),
            ask: book.ask_price.parse().unwrap_or(Decimal::ZERO),
            last: ticker.last_price.parse().unwrap_or(Decimal::ZERO),
            change_24h: ticker.price_change_percent.parse().ok(),
            volume_24h: ticker.volume.parse().ok(),
            exchange: ExchangeId::Binance,
            observed_at: Utc::now(),
        })
    }

    async fn fetch_balances(&self) -> Result<Vec<Balance>, ExchangeError> {
        let query = self.signed_query(Vec::new());
        let url = format!("{}/api/v3/account?{}", self.base_url(), query);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(self.read_error(status, text));
        }

        let account: AccountResponse = resp
            .json()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        let balances = account
            .balances
            .into_iter()
            .map(|b| {
                Balance::new(
                    b.asset,
                    b.free.parse().unwrap_or(Decimal::ZERO),
                    b.locked.parse().unwrap_or(Decimal::ZERO),
                    ExchangeId::Binance,
                )
            })
            .filter(|b| !b.is_zero())
            .collect();

        Ok(balances)
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderAck, ExchangeError> {
        let instrument = self.instrument(&request.symbol)?;
        let params = order_params(request, &instrument)?;
        let query = self.signed_query(params);
        let url = format!("{}/api/v3/order?{}", self.base_url(), query);

        debug!(symbol = %request.symbol, side = %request.side, "submitting binance order");

        let resp = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(self.order_error(status, text));
        }

        let order: OrderResponse = resp
            .json()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        info!(
            order_id = order.order_id,
            status = %order.status,
            "binance order accepted"
        );

        let executed: Decimal = order
            .executed_qty
            .as_deref()
            .and_then(|q| q.parse().ok())
            .unwrap_or(Decimal::ZERO);
        let quote_qty: Decimal = order
            .cummulative_quote_qty
            .as_deref()
            .and_then(|q| q.parse().ok())
            .unwrap_or(Decimal::ZERO);

        if executed > Decimal::ZERO {
            Ok(OrderAck::filled(
                order.order_id.to_string(),
                executed,
                quote_qty / executed,
            ))
        } else {
            Ok(OrderAck::accepted(order.order_id.to_string()))
        }
    }

    async fn cancel_order(
        &self,
        venue_order_id: &str,
        instrument: &Instrument,
    ) -> Result<(), ExchangeError> {
        let params = vec![
            (
                "symbol".to_string(),
                instrument.venue_symbol(ExchangeId::Binance),
            ),
            ("orderId".to_string(), venue_order_id.to_string()),
        ];
        let query = self.signed_query(params);
        let url = format!("{}/api/v3/order?{}", self.base_url(), query);

        let resp = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            warn!(order_id = venue_order_id, "binance cancel failed");
            return Err(self.order_error(status, text));
        }

        info!(order_id = venue_order_id, "binance order canceled");
        Ok(())
    }
}
