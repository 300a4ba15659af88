use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, warn};

use common::{Bar, Error, Fill, MarketData, Order, OrderGateway, Result};

/// Which Binance venue a client talks to. Long trades run on spot, short
/// trades on USDⓈ-M futures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinanceMarket {
    Spot,
    Futures,
}

impl BinanceMarket {
    fn base_url(self) -> &'static str {
        match self {
            BinanceMarket::Spot => "https://api.binance.com",
            BinanceMarket::Futures => "https://fapi.binance.com",
        }
    }

    fn klines_path(self) -> &'static str {
        match self {
            BinanceMarket::Spot => "/api/v3/klines",
            BinanceMarket::Futures => "/fapi/v1/klines",
        }
    }

    fn order_path(self) -> &'static str {
        match self {
            BinanceMarket::Spot => "/api/v3/order",
            BinanceMarket::Futures => "/fapi/v1/order",
        }
    }
}

struct Credentials {
    api_key: String,
    secret: String,
}

/// REST API client for Binance. Used for kline polling and order placement.
pub struct BinanceClient {
    market: BinanceMarket,
    credentials: Option<Credentials>,
    http: Client,
}

impl BinanceClient {
    /// Client that can fetch market data and place signed orders.
    pub fn new(
        market: BinanceMarket,
        api_key: impl Into<String>,
        secret: impl Into<String>,
    ) -> Result<Self> {
        let mut client = Self::public(market)?;
        client.credentials = Some(Credentials {
            api_key: api_key.into(),
            secret: secret.into(),
        });
        Ok(client)
    }

    /// Unauthenticated client for market data only (paper mode).
    pub fn public(market: BinanceMarket) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Http(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            market,
            credentials: None,
            http,
        })
    }

    pub fn market(&self) -> BinanceMarket {
        self.market
    }

    fn sign(secret: &str, query: &str) -> Result<String> {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| Error::Execution(format!("HMAC key rejected: {e}")))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn signed_post(&self, path: &str, params: &str) -> Result<String> {
        let creds = self.credentials.as_ref().ok_or_else(|| {
            Error::Execution("Binance credentials are required to place orders".into())
        })?;
        let ts = Utc::now().timestamp_millis();
        let query = format!("{params}&timestamp={ts}");
        let signature = Self::sign(&creds.secret, &query)?;
        let body = format!("{query}&signature={signature}");
        let url = format!("{}{path}", self.market.base_url());

        let resp = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &creds.api_key)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Execution(e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| Error::Execution(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::Execution(format!("HTTP {status}: {text}")));
        }
        Ok(text)
    }
}

#[async_trait]
impl MarketData for BinanceClient {
    async fn fetch_bars(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Bar>> {
        let url = format!("{}{}", self.market.base_url(), self.market.klines_path());
        let limit = limit.to_string();
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("symbol", symbol),
                ("interval", timeframe),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::data_fetch(symbol, e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::data_fetch(symbol, e))?;
        if !status.is_success() {
            return Err(Error::data_fetch(symbol, format!("HTTP {status}: {body}")));
        }
        parse_klines(symbol, &body)
    }
}

#[async_trait]
impl OrderGateway for BinanceClient {
    async fn submit_order(&self, order: &Order) -> Result<Fill> {
        let mut params = format!(
            "symbol={}&side={}&type=MARKET&quantity={}&newClientOrderId={}",
            order.symbol, order.side, order.quantity, order.id
        );
        match self.market {
            BinanceMarket::Spot => params.push_str("&newOrderRespType=FULL"),
            BinanceMarket::Futures => {
                params.push_str("&newOrderRespType=RESULT");
                if order.reduce_only {
                    params.push_str("&reduceOnly=true");
                }
            }
        }

        debug!(symbol = %order.symbol, side = %order.side, market = ?self.market, "Submitting order to Binance");
        let body = self.signed_post(self.market.order_path(), &params).await?;
        parse_order_response(order, &body)
    }
}

// ─── Response parsing ─────────────────────────────────────────────────────────

/// Parse the kline array format: `[openTime, open, high, low, close, volume, ...]`
/// with prices and volume as strings.
fn parse_klines(symbol: &str, body: &str) -> Result<Vec<Bar>> {
    let rows: Vec<Vec<serde_json::Value>> =
        serde_json::from_str(body).map_err(|e| Error::data_fetch(symbol, e))?;

    let field = |row: &[serde_json::Value], i: usize| -> Result<f64> {
        row.get(i)
            .and_then(|v| match v {
                serde_json::Value::String(s) => s.parse().ok(),
                other => other.as_f64(),
            })
            .ok_or_else(|| Error::data_fetch(symbol, format!("bad kline field {i}")))
    };

    let mut bars = rows
        .iter()
        .map(|row| {
            let open_ms = row
                .first()
                .and_then(|v| v.as_i64())
                .ok_or_else(|| Error::data_fetch(symbol, "kline without open time"))?;
            let timestamp = DateTime::<Utc>::from_timestamp_millis(open_ms)
                .ok_or_else(|| Error::data_fetch(symbol, format!("bad timestamp {open_ms}")))?;
            Ok(Bar {
                timestamp,
                open: field(row, 1)?,
                high: field(row, 2)?,
                low: field(row, 3)?,
                close: field(row, 4)?,
                volume: field(row, 5)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    bars.sort_by_key(|b| b.timestamp);
    Ok(bars)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    #[serde(default)]
    client_order_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    executed_qty: Option<String>,
    /// Futures only.
    #[serde(default)]
    avg_price: Option<String>,
    /// Spot only, with `newOrderRespType=FULL`.
    #[serde(default)]
    fills: Vec<FillDetail>,
}

#[derive(Deserialize)]
struct FillDetail {
    price: String,
    qty: String,
}

fn parse_order_response(order: &Order, body: &str) -> Result<Fill> {
    let resp: OrderResponse =
        serde_json::from_str(body).map_err(|e| Error::Execution(e.to_string()))?;

    let (notional, filled) = resp.fills.iter().fold((0.0, 0.0), |(n, q), f| {
        let price = f.price.parse::<f64>().unwrap_or(0.0);
        let qty = f.qty.parse::<f64>().unwrap_or(0.0);
        (n + price * qty, q + qty)
    });

    let quantity = resp
        .executed_qty
        .as_deref()
        .and_then(|q| q.parse::<f64>().ok())
        .filter(|q| *q > 0.0)
        .unwrap_or(filled);
    if !(quantity.is_finite() && quantity > 0.0) {
        let status = resp.status.as_deref().unwrap_or("UNKNOWN");
        return Err(Error::Execution(format!(
            "{} {} not filled (status {status})",
            order.side, order.symbol
        )));
    }

    let fill_price = if filled > 0.0 {
        notional / filled
    } else {
        resp.avg_price
            .as_deref()
            .and_then(|p| p.parse::<f64>().ok())
            .filter(|p| *p > 0.0)
            .unwrap_or_else(|| {
                warn!(symbol = %order.symbol, "Order response carried no fill price, using reference price");
                order.reference_price
            })
    };

    Ok(Fill {
        order_id: resp.client_order_id.unwrap_or_else(|| order.id.clone()),
        symbol: order.symbol.clone(),
        side: order.side,
        fill_price,
        quantity,
        timestamp: Utc::now(),
    })
}
