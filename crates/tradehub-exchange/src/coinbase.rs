//! Coinbase venue adapter.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header, Client, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tradehub_core::error::ExchangeError;
use tradehub_core::traits::Exchange;
use tradehub_core::types::{
    Amount, Balance, ExchangeAccount, ExchangeId, Instrument, InstrumentCatalog, OrderAck,
    OrderRequest, OrderType, Quote, Side,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

const DEFAULT_BASE_URL: &str = "https://api.coinbase.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Coinbase order payloads
#[derive(Debug, Serialize)]
struct CreateOrder {
    client_order_id: String,
    product_id: String,
    side: String,
    order_configuration: OrderConfiguration,
}

#[derive(Debug, Serialize)]
struct OrderConfiguration {
    #[serde(skip_serializing_if = "Option::is_none")]
    market_market_ioc: Option<MarketIoc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_limit_gtc: Option<LimitGtc>,
}

#[derive(Debug, Serialize)]
struct MarketIoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    quote_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    base_size: Option<String>,
}

#[derive(Debug, Serialize)]
struct LimitGtc {
    base_size: String,
    limit_price: String,
    post_only: bool,
}

#[derive(Debug, Serialize)]
struct BatchCancel {
    order_ids: Vec<String>,
}

/// Coinbase response types
#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    success: bool,
    success_response: Option<CreateSuccess>,
    error_response: Option<CreateError>,
}

#[derive(Debug, Deserialize)]
struct CreateSuccess {
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    preview_failure_reason: Option<String>,
}

impl CreateError {
    fn reason(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.preview_failure_reason.clone())
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "order refused".to_string())
    }
}

#[derive(Debug, Deserialize)]
struct GetOrderResponse {
    order: HistoricalOrder,
}

#[derive(Debug, Deserialize)]
struct HistoricalOrder {
    status: String,
    #[serde(default)]
    filled_size: Option<String>,
    #[serde(default)]
    average_filled_price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BatchCancelResponse {
    results: Vec<CancelResult>,
}

#[derive(Debug, Deserialize)]
struct CancelResult {
    success: bool,
    #[serde(default)]
    failure_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountsResponse {
    accounts: Vec<CoinbaseAccount>,
}

#[derive(Debug, Deserialize)]
struct CoinbaseAccount {
    currency: String,
    available_balance: MoneyValue,
    #[serde(default)]
    hold: Option<MoneyValue>,
}

#[derive(Debug, Deserialize)]
struct MoneyValue {
    value: String,
}

#[derive(Debug, Deserialize)]
struct BestBidAskResponse {
    pricebooks: Vec<PriceBook>,
}

#[derive(Debug, Deserialize)]
struct PriceBook {
    bids: Vec<PriceLevel>,
    asks: Vec<PriceLevel>,
}

#[derive(Debug, Deserialize)]
struct PriceLevel {
    price: String,
}

#[derive(Debug, Deserialize)]
struct ProductResponse {
    price: String,
    price_percentage_change_24h: String,
    volume_24h: String,
}

/// Coinbase exchange client.
///
/// Every request is signed with HMAC-SHA256 over
/// `timestamp + method + path + body`, hex-encoded, sent in the
/// `CB-ACCESS-*` headers.
pub struct CoinbaseExchange {
    account: ExchangeAccount,
    catalog: InstrumentCatalog,
    client: Client,
}

impl CoinbaseExchange {
    /// Create a new Coinbase client.
    pub fn new(account: ExchangeAccount) -> Result<Self, ExchangeError> {
        Self::with_catalog(account, InstrumentCatalog::defaults())
    }

    /// Create a client with a custom instrument catalog.
    pub fn with_catalog(
        account: ExchangeAccount,
        catalog: InstrumentCatalog,
    ) -> Result<Self, ExchangeError> {
        let client = Client::builder()
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

    /// Signature headers for one request. Query strings stay out of
    /// the prehash.
    fn signed_headers(
        &self,
        method: &str,
        path: &str,
        body: &str,
    ) -> Result<header::HeaderMap, ExchangeError> {
        let timestamp = Utc::now().timestamp().to_string();
        let payload = format!("{timestamp}{method}{path}{body}");
        let signature = crate::sign::hmac_sha256_hex(&self.account.api_secret, &payload);

        let mut headers = header::HeaderMap::new();
        headers.insert(
            "CB-ACCESS-KEY",
            header::HeaderValue::from_str(&self.account.api_key)
                .map_err(|e| ExchangeError::Auth(e.to_string()))?,
        );
        headers.insert(
            "CB-ACCESS-SIGN",
            header::HeaderValue::from_str(&signature)
                .map_err(|e| ExchangeError::Auth(e.to_string()))?,
        );
        headers.insert(
            "CB-ACCESS-TIMESTAMP",
            header::HeaderValue::from_str(&timestamp)
                .map_err(|e| ExchangeError::Auth(e.to_string()))?,
        );
        Ok(headers)
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
            ExchangeError::Auth(text)
        } else {
            ExchangeError::Rejected {
                venue: ExchangeId::Coinbase.to_string(),
                reason: format!("{status}: {text}"),
            }
        }
    }

    /// Fetch the fill state of an order after an IOC execution.
    async fn fetch_fill(&self, order_id: &str) -> Result<Option<(Decimal, Decimal)>, ExchangeError> {
        let path = format!("/api/v3/brokerage/orders/historical/{order_id}");
        let headers = self.signed_headers("GET", &path, "")?;
        let url = format!("{}{}", self.base_url(), path);

        let resp = self
            .client
            .get(&url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(self.read_error(status, text));
        }

        let data: GetOrderResponse = resp
            .json()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        debug!(order_id, status = %data.order.status, "coinbase order state");

        let filled: Decimal = data
            .order
            .filled_size
            .as_deref()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Decimal::ZERO);
        let price: Decimal = data
            .order
            .average_filled_price
            .as_deref()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Decimal::ZERO);

        if filled > Decimal::ZERO && price > Decimal::ZERO {
            Ok(Some((filled, price)))
        } else {
            Ok(None)
        }
    }
}

/// Build the order creation payload for a request.
///
/// Market orders become `market_market_ioc` with `quote_size` for
/// funds-sized buys or `base_size` for quantities; limit orders become
/// `limit_limit_gtc`. Funds-sized sells have no venue equivalent.
fn order_payload(
    request: &OrderRequest,
    instrument: &Instrument,
) -> Result<CreateOrder, ExchangeError> {
    let side = match request.side {
        Side::Buy => "BUY",
        Side::Sell => "SELL",
    };

    let order_configuration = match request.order_type {
        OrderType::Market => {
            let market = match (request.amount, request.side) {
                (Amount::Funds(funds), Side::Buy) => MarketIoc {
                    quote_size: Some(funds.to_string()),
                    base_size: None,
                },
                (Amount::Quantity(quantity), _) => MarketIoc {
                    quote_size: None,
                    base_size: Some(quantity.to_string()),
                },
                (Amount::Funds(_), Side::Sell) => {
                    return Err(ExchangeError::Validation(
                        "funds-sized sells are not supported on coinbase".to_string(),
                    ));
                }
            };
            OrderConfiguration {
                market_market_ioc: Some(market),
                limit_limit_gtc: None,
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
            OrderConfiguration {
                market_market_ioc: None,
                limit_limit_gtc: Some(LimitGtc {
                    base_size: quantity.to_string(),
                    limit_price: price.to_string(),
                    post_only: false,
                }),
            }
        }
    };

    Ok(CreateOrder {
        client_order_id: Uuid::new_v4().to_string(),
        product_id: instrument.venue_symbol(ExchangeId::Coinbase),
        side: side.to_string(),
        order_configuration,
    })
}

#[async_trait]
impl Exchange for CoinbaseExchange {
    fn id(&self) -> ExchangeId {
        ExchangeId::Coinbase
    }

    async fn fetch_quote(&self, instrument: &Instrument) -> Result<Quote, ExchangeError> {
        let product_id = instrument.venue_symbol(ExchangeId::Coinbase);
        let path = "/api/v3/brokerage/best_bid_ask";
        let headers = self.signed_headers("GET", path, "")?;
        let url = format!("{}{}", self.base_url(), path);

        let resp = self
            .client
            .get(&url)
            .headers(headers)
            .query(&[("product_ids", &product_id)])
            .send()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(self.read_error(status, text));
        }

        let data: BestBidAskResponse = resp
            .json()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        let book = data
            .pricebooks
            .into_iter()
            .next()
            .ok_or_else(|| ExchangeError::NotFound(format!("no pricebook for {product_id}")))?;

        let bid: Decimal = book
            .bids
            .first()
            .and_then(|l| l.price.parse().ok())
            .unwrap_or(Decimal::ZERO);
        let ask: Decimal = book
            .asks
            .first()
            .and_then(|l| l.price.parse().ok())
            .unwrap_or(Decimal::ZERO);

        let path = format!("/api/v3/brokerage/products/{product_id}");
        let headers = self.signed_headers("GET", &path, "")?;
        let url = format!("{}{}", self.base_url(), path);

        let resp = self
            .client
            .get(&url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(self.read_error(status, text));
        }

        let product: ProductResponse = resp
            .json()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        // The book endpoint has no last-trade field; the product price
        // carries it, with the midpoint standing in if it fails to parse.
        Ok(Quote {
            symbol: instrument.symbol.clone(),
            bid,
            ask,
            last: product
                .price
                .parse()
                .unwrap_or((bid + ask) / Decimal::TWO),
            change_24h: product.price_percentage_change_24h.parse().ok(),
            volume_24h: product.volume_24h.parse().ok(),
            exchange: ExchangeId::Coinbase,
            observed_at: Utc::now(),
        })
    }

    async fn fetch_balances(&self) -> Result<Vec<Balance>, ExchangeError> {
        let path = "/api/v3/brokerage/accounts";
        let headers = self.signed_headers("GET", path, "")?;
        let url = format!("{}{}", self.base_url(), path);

        let resp = self
            .client
            .get(&url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(self.read_error(status, text));
        }

        let data: AccountsResponse = resp
            .json()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        let balances = data
            .accounts
            .into_iter()
            .map(|acc| {
                let free: Decimal = acc.available_balance.value.parse().unwrap_or(Decimal::ZERO);
                let hold: Decimal = acc
                    .hold
                    .as_ref()
                    .and_then(|h| h.value.parse().ok())
                    .unwrap_or(Decimal::ZERO);
                Balance::new(acc.currency, free, hold, ExchangeId::Coinbase)
            })
            .filter(|b| !b.is_zero())
            .collect();

        Ok(balances)
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderAck, ExchangeError> {
        let instrument = self.instrument(&request.symbol)?;
        let payload = order_payload(request, &instrument)?;
        let body = serde_json::to_string(&payload)
            .map_err(|e| ExchangeError::Validation(e.to_string()))?;

        let path = "/api/v3/brokerage/orders";
        let mut headers = self.signed_headers("POST", path, &body)?;
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        let url = format!("{}{}", self.base_url(), path);

        debug!(symbol = %request.symbol, side = %request.side, "submitting coinbase order");

        let resp = self
            .client
            .post(&url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(self.order_error(status, text));
        }

        let created: CreateOrderResponse = resp
            .json()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        if !created.success {
            let reason = created
                .error_response
                .map(|e| e.reason())
                .unwrap_or_else(|| "order refused".to_string());
            return Err(ExchangeError::Rejected {
                venue: ExchangeId::Coinbase.to_string(),
                reason,
            });
        }

        let order_id = created
            .success_response
            .map(|s| s.order_id)
            .ok_or_else(|| ExchangeError::Network("create response without order id".to_string()))?;

        info!(order_id = %order_id, "coinbase order accepted");

        // IOC market orders execute inside the create call; one read
        // picks up the fill.
        if request.order_type == OrderType::Market {
            match self.fetch_fill(&order_id).await {
                Ok(Some((quantity, price))) => {
                    return Ok(OrderAck::filled(order_id, quantity, price));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(order_id = %order_id, error = %e, "fill lookup failed after submit");
                }
            }
        }

        Ok(OrderAck::accepted(order_id))
    }

    async fn cancel_order(
        &self,
        venue_order_id: &str,
        _instrument: &Instrument,
    ) -> Result<(), ExchangeError> {
        let payload = BatchCancel {
            order_ids: vec![venue_order_id.to_string()],
        };
        let body = serde_json::to_string(&payload)
            .map_err(|e| ExchangeError::Validation(e.to_string()))?;

        let path = "/api/v3/brokerage/orders/batch_cancel";
        let mut headers = self.signed_headers("POST", path, &body)?;
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        let url = format!("{}{}", self.base_url(), path);

        let resp = self
            .client
            .post(&url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(self.order_error(status, text));
        }

        let data: BatchCancelResponse = resp
            .json()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        match data.results.first() {
            Some(result) if result.success => {
                info!(order_id = venue_order_id, "coinbase order canceled");
                Ok(())
            }
            Some(result) => Err(ExchangeError::NotFound(
                result
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| venue_order_id.to_string()),
            )),
            None => Err(ExchangeError::NotFound(venue_order_id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_funds_market_buy_uses_quote_size() {
        let request = OrderRequest::market(
            "key-1",
            "BTC",
            Side::Buy,
            Amount::Funds(dec!(500)),
            ExchangeId::Coinbase,
        );
        let payload = order_payload(&request, &Instrument::usd("BTC")).unwrap();

        assert_eq!(payload.product_id, "BTC-USD");
        assert_eq!(payload.side, "BUY");
        let market = payload.order_configuration.market_market_ioc.unwrap();
        assert_eq!(market.quote_size.as_deref(), Some("500"));
        assert!(market.base_size.is_none());
        assert!(payload.order_configuration.limit_limit_gtc.is_none());
    }

    #[test]
    fn test_quantity_market_sell_uses_base_size() {
        let request = OrderRequest::market(
            "key-2",
            "ETH",
            Side::Sell,
            Amount::Quantity(dec!(2)),
            ExchangeId::Coinbase,
        );
        let payload = order_payload(&request, &Instrument::usd("ETH")).unwrap();

        let market = payload.order_configuration.market_market_ioc.unwrap();
        assert_eq!(market.base_size.as_deref(), Some("2"));
        assert!(market.quote_size.is_none());
    }

    #[test]
    fn test_funds_sell_is_rejected() {
        let request = OrderRequest::market(
            "key-3",
            "BTC",
            Side::Sell,
            Amount::Funds(dec!(500)),
            ExchangeId::Coinbase,
        );
        let err = order_payload(&request, &Instrument::usd("BTC")).unwrap_err();
        assert!(matches!(err, ExchangeError::Validation(_)));
    }

    #[test]
    fn test_limit_order_payload() {
        let request = OrderRequest::limit(
            "key-4",
            "SOL",
            Side::Buy,
            dec!(10),
            dec!(240.5),
            ExchangeId::Coinbase,
        );
        let payload = order_payload(&request, &Instrument::usd("SOL")).unwrap();

        let limit = payload.order_configuration.limit_limit_gtc.unwrap();
        assert_eq!(limit.base_size, "10");
        assert_eq!(limit.limit_price, "240.5");
        assert!(!limit.post_only);
        assert!(payload.order_configuration.market_market_ioc.is_none());
    }

    #[test]
    fn test_client_order_id_is_a_fresh_uuid() {
        let request = OrderRequest::market(
            "key-5",
            "BTC",
            Side::Buy,
            Amount::Funds(dec!(10)),
            ExchangeId::Coinbase,
        );
        let a = order_payload(&request, &Instrument::usd("BTC")).unwrap();
        let b = order_payload(&request, &Instrument::usd("BTC")).unwrap();

        assert!(Uuid::parse_str(&a.client_order_id).is_ok());
        assert_ne!(a.client_order_id, b.client_order_id);
    }

    #[test]
    fn test_signed_headers_present() {
        let account = ExchangeAccount::new(ExchangeId::Coinbase, "key", "secret");
        let exchange = CoinbaseExchange::new(account).unwrap();
        let headers = exchange
            .signed_headers("POST", "/api/v3/brokerage/orders", "{}")
            .unwrap();

        assert!(headers.contains_key("CB-ACCESS-KEY"));
        assert!(headers.contains_key("CB-ACCESS-TIMESTAMP"));
        let sign = headers.get("CB-ACCESS-SIGN").unwrap().to_str().unwrap();
        assert_eq!(sign.len(), 64);
    }
}
