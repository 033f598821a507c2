//! Latest quote for one stock from the Simplize company summary API.
//!
//! The chart API only publishes a bar once the session has closed. During
//! trading hours this endpoint is the source for today's bar, written into
//! the same `stock_prices` rows the daily sync fills later.

use crate::constants::{SIMPLIZE_ORIGIN, SIMPLIZE_REFERER, SIMPLIZE_SUMMARY_PATH};
use crate::models::{PriceBar, PriceScale, UpstreamConfig};
use crate::services::http::{Headers, HttpTransport, IsahcTransport, TransportError};
use crate::services::vci::{classify_status, pick_user_agent, FetchError};
use crate::utils::today_in;
use chrono::NaiveDate;
use chrono_tz::Tz;
use serde_json::Value;

// Field names differ between API versions; the first non-zero one wins
const CLOSE_KEYS: &[&str] = &["priceClose", "closePrice", "price"];
const OPEN_KEYS: &[&str] = &["priceOpen", "openPrice", "open"];
const HIGH_KEYS: &[&str] = &["priceHigh", "highPrice", "high"];
const LOW_KEYS: &[&str] = &["priceLow", "lowPrice", "low"];
const VOLUME_KEYS: &[&str] = &["volume", "totalVolume"];

fn number(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
        .filter(|v| v.is_finite())
}

fn first_non_zero(data: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|key| data.get(*key).and_then(number))
        .find(|v| *v != 0.0)
}

/// Build today's bar from a summary response body
pub fn parse_summary(
    symbol: &str,
    body: &str,
    trading_date: NaiveDate,
    price_scale: PriceScale,
) -> Result<PriceBar, FetchError> {
    let response: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::no_data(format!("malformed JSON: {}", e)))?;

    let data = match response.get("data") {
        Some(data) if data.is_object() => data,
        _ => return Err(FetchError::no_data("no data object")),
    };

    let close_price = first_non_zero(data, CLOSE_KEYS).map_or(0, |p| price_scale.apply(p));
    if close_price <= 0 {
        return Err(FetchError::no_data("no close price"));
    }

    let price = |keys: &[&str]| first_non_zero(data, keys).map_or(0, |p| price_scale.apply(p));
    let volume = first_non_zero(data, VOLUME_KEYS).map_or(0, |v| (v.round() as i64).max(0));

    Ok(PriceBar {
        symbol: symbol.to_string(),
        trading_date,
        open_price: price(OPEN_KEYS),
        high_price: price(HIGH_KEYS),
        low_price: price(LOW_KEYS),
        close_price,
        volume,
        value: close_price.saturating_mul(volume),
    })
}

/// Client for the Simplize company summary API
pub struct SimplizeClient<T: HttpTransport> {
    transport: T,
    base_url: String,
    random_agent: bool,
    timezone: Tz,
    price_scale: PriceScale,
}

impl SimplizeClient<IsahcTransport> {
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, TransportError> {
        let transport = IsahcTransport::new(config.timeout, config.proxy.as_deref())?;
        Ok(Self::new(transport, config))
    }
}

impl<T: HttpTransport> SimplizeClient<T> {
    pub fn new(transport: T, config: &UpstreamConfig) -> Self {
        let mut base_url = config.simplize_base_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Self {
            transport,
            base_url,
            random_agent: config.random_agent,
            timezone: config.timezone,
            price_scale: config.price_scale,
        }
    }

    fn headers(&self) -> Headers {
        [
            ("Accept", "application/json".to_string()),
            ("User-Agent", pick_user_agent(self.random_agent)),
            ("Origin", SIMPLIZE_ORIGIN.to_string()),
            ("Referer", SIMPLIZE_REFERER.to_string()),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
    }

    pub fn summary_url(&self, symbol: &str) -> String {
        format!("{}{}{}", self.base_url, SIMPLIZE_SUMMARY_PATH, symbol.to_lowercase())
    }

    /// Today's bar for `symbol`, dated in the market timezone
    pub async fn fetch_today(&self, symbol: &str) -> Result<PriceBar, FetchError> {
        let url = self.summary_url(symbol);
        tracing::debug!(symbol, url = %url, "Simplize summary request");

        let reply = self.transport.get(&url, &self.headers()).await?;
        if let Some(error) = classify_status(reply.status) {
            tracing::debug!(symbol, status = reply.status, "Simplize summary request rejected");
            return Err(error);
        }

        let bar = parse_summary(symbol, &reply.body, today_in(self.timezone), self.price_scale)?;
        tracing::debug!(symbol, close = bar.close_price, volume = bar.volume, "Simplize summary response");
        Ok(bar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::http::testing::ScriptedTransport;
    use crate::services::vci::FetchErrorKind;
    use std::sync::Arc;

    fn config() -> UpstreamConfig {
        UpstreamConfig {
            random_agent: false,
            simplize_base_url: "https://quotes.example.test/api".to_string(),
            ..UpstreamConfig::default()
        }
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_parse_summary() {
        let body = r#"{"data": {"priceClose": 132500, "priceOpen": 131000,
            "priceHigh": 133000, "priceLow": 130500, "volume": 900000}}"#;
        let bar = parse_summary("FPT", body, d("2025-01-06"), PriceScale::Unit).unwrap();

        assert_eq!(bar.trading_date, d("2025-01-06"));
        assert_eq!(bar.open_price, 131000);
        assert_eq!(bar.high_price, 133000);
        assert_eq!(bar.low_price, 130500);
        assert_eq!(bar.close_price, 132500);
        assert_eq!(bar.volume, 900000);
        assert_eq!(bar.value, 132500 * 900000);
    }

    #[test]
    fn test_fallback_keys_skip_zero() {
        let body = r#"{"data": {"priceClose": 0, "closePrice": "26.7", "open": 26.5, "volume": null}}"#;
        let bar = parse_summary("HPG", body, d("2025-01-06"), PriceScale::Thousands).unwrap();

        assert_eq!(bar.close_price, 26700);
        assert_eq!(bar.open_price, 26500);
        assert_eq!(bar.high_price, 0);
        assert_eq!(bar.volume, 0);
        assert_eq!(bar.value, 0);
    }

    #[test]
    fn test_missing_close_is_no_data() {
        for body in [
            r#"{"data": {"priceOpen": 100}}"#,
            r#"{"data": {"priceClose": 0}}"#,
            r#"{"data": null}"#,
            r#"{"message": "not found"}"#,
            "<html>",
        ] {
            let err = parse_summary("XXX", body, d("2025-01-06"), PriceScale::Unit).unwrap_err();
            assert_eq!(err.kind(), FetchErrorKind::NoData, "body: {}", body);
        }
    }

    #[tokio::test]
    async fn test_fetch_today_request() {
        let transport = Arc::new(
            ScriptedTransport::new().reply(200, r#"{"data": {"priceClose": 98000, "volume": 10}}"#),
        );
        let client = SimplizeClient::new(transport.clone(), &config());

        let bar = client.fetch_today("VCB").await.unwrap();
        assert_eq!(bar.symbol, "VCB");
        assert_eq!(bar.close_price, 98000);
        assert_eq!(bar.trading_date, today_in(chrono_tz::Asia::Ho_Chi_Minh));

        let requests = transport.requests();
        let request = &requests[0];
        assert_eq!(request.method, "GET");
        assert_eq!(request.url, "https://quotes.example.test/api/company/summary/vcb");
        assert_eq!(request.header("Origin"), Some(SIMPLIZE_ORIGIN));
        assert_eq!(request.header("Referer"), Some(SIMPLIZE_REFERER));
    }

    #[tokio::test]
    async fn test_fetch_today_classifies_failures() {
        let transport = ScriptedTransport::new()
            .reply(403, "")
            .reply(502, "")
            .fail(TransportError::Timeout(std::time::Duration::from_secs(10)));
        let client = SimplizeClient::new(transport, &config());

        assert_eq!(client.fetch_today("FPT").await.unwrap_err(), FetchError::Blocked);
        assert_eq!(
            client.fetch_today("FPT").await.unwrap_err(),
            FetchError::HttpError { status: 502 }
        );
        assert_eq!(client.fetch_today("FPT").await.unwrap_err(), FetchError::Timeout);
    }
}
