use crate::constants::{
    COUNT_BACK_BUFFER, USER_AGENTS, VCI_CHART_PATH, VCI_ORIGIN, VCI_PROBE_PATH, VCI_REFERER,
    VCI_TIME_FRAME,
};
use crate::models::price_bar::round2;
use crate::models::{ChangeBaseline, IndexBar, IndexTicker, PriceBar, PriceScale, UpstreamConfig};
use crate::services::http::{Headers, HttpTransport, IsahcTransport, TransportError};
use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error as ThisError;

/// Outcome class of a failed fetch, used by the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    Blocked,
    HttpError,
    NoData,
    Timeout,
    Unknown,
}

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Upstream answered 403: we are rate-limited or banned for now
    #[error("403 Blocked")]
    Blocked,

    #[error("HTTP {status}")]
    HttpError { status: u16 },

    /// Upstream answered but had nothing usable
    #[error("No data ({detail})")]
    NoData { detail: String },

    #[error("Timeout")]
    Timeout,

    #[error("{message}")]
    Unknown { message: String },
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Blocked => FetchErrorKind::Blocked,
            FetchError::HttpError { .. } => FetchErrorKind::HttpError,
            FetchError::NoData { .. } => FetchErrorKind::NoData,
            FetchError::Timeout => FetchErrorKind::Timeout,
            FetchError::Unknown { .. } => FetchErrorKind::Unknown,
        }
    }

    pub(crate) fn no_data(detail: impl Into<String>) -> Self {
        FetchError::NoData {
            detail: detail.into(),
        }
    }
}

impl From<TransportError> for FetchError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Timeout(_) => FetchError::Timeout,
            other => FetchError::Unknown {
                message: other.to_string(),
            },
        }
    }
}

/// Map a non-success HTTP status to its fetch outcome; `None` for 2xx
pub fn classify_status(status: u16) -> Option<FetchError> {
    match status {
        200..=299 => None,
        403 => Some(FetchError::Blocked),
        _ => Some(FetchError::HttpError { status }),
    }
}

/// Column-oriented chart data for one symbol, as returned by the upstream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartSeries {
    pub times: Vec<i64>,
    pub opens: Vec<Option<f64>>,
    pub highs: Vec<Option<f64>>,
    pub lows: Vec<Option<f64>>,
    pub closes: Vec<Option<f64>>,
    pub volumes: Vec<Option<f64>>,
    /// Traded value in millions of VND, when the upstream includes it
    pub accumulated_values: Option<Vec<Option<f64>>>,
}

impl ChartSeries {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    fn at(column: &[Option<f64>], i: usize) -> Option<f64> {
        column.get(i).copied().flatten()
    }
}

fn parse_column(item: &Value, key: &str) -> Vec<Option<f64>> {
    item.get(key)
        .and_then(|v| v.as_array())
        .map(|values| {
            values
                .iter()
                .map(|v| {
                    v.as_f64()
                        .or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Parse a chart response body into a [`ChartSeries`].
///
/// Only `t` is mandatory. Price and volume columns that are missing or
/// shorter than `t` read as null, which normalizes to zero later.
pub fn parse_chart_response(body: &str) -> Result<ChartSeries, FetchError> {
    let data: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::no_data(format!("malformed JSON: {}", e)))?;

    let items = match data.as_array() {
        Some(items) if !items.is_empty() => items,
        Some(_) => return Err(FetchError::no_data("empty response")),
        None => return Err(FetchError::no_data("response is not an array")),
    };

    let item = &items[0];
    let times = match item.get("t").and_then(|t| t.as_array()) {
        Some(times) if !times.is_empty() => times,
        _ => return Err(FetchError::no_data("no timestamps")),
    };

    let mut parsed_times = Vec::with_capacity(times.len());
    for (i, raw) in times.iter().enumerate() {
        // Timestamps arrive either as numbers or as numeric strings
        let timestamp = if let Some(ts_str) = raw.as_str() {
            ts_str.trim().parse::<i64>().ok()
        } else {
            raw.as_i64().or_else(|| raw.as_f64().map(|f| f as i64))
        };
        match timestamp {
            Some(ts) => parsed_times.push(ts),
            None => {
                return Err(FetchError::no_data(format!(
                    "invalid timestamp at index {}: {}",
                    i, raw
                )))
            }
        }
    }

    let accumulated_values = item
        .get("accumulatedValue")
        .filter(|v| v.is_array())
        .map(|_| parse_column(item, "accumulatedValue"));

    Ok(ChartSeries {
        times: parsed_times,
        opens: parse_column(item, "o"),
        highs: parse_column(item, "h"),
        lows: parse_column(item, "l"),
        closes: parse_column(item, "c"),
        volumes: parse_column(item, "v"),
        accumulated_values,
    })
}

/// Turns raw chart columns into storage rows
#[derive(Debug, Clone, Copy)]
pub struct BarNormalizer {
    pub timezone: Tz,
    pub price_scale: PriceScale,
}

impl BarNormalizer {
    pub fn new(timezone: Tz, price_scale: PriceScale) -> Self {
        Self {
            timezone,
            price_scale,
        }
    }

    /// Calendar date of an upstream timestamp in the market's timezone
    pub fn trading_date(&self, timestamp: i64) -> Option<NaiveDate> {
        DateTime::<Utc>::from_timestamp(timestamp, 0)
            .map(|utc| utc.with_timezone(&self.timezone).date_naive())
    }

    pub fn price_bars(&self, symbol: &str, series: &ChartSeries) -> Vec<PriceBar> {
        let mut bars: Vec<PriceBar> = Vec::with_capacity(series.len());
        let mut seen: HashMap<NaiveDate, usize> = HashMap::new();

        for (i, &timestamp) in series.times.iter().enumerate() {
            let Some(trading_date) = self.trading_date(timestamp) else {
                tracing::warn!(symbol, timestamp, "Skipping bar with out-of-range timestamp");
                continue;
            };

            let price = |column: &[Option<f64>]| {
                ChartSeries::at(column, i).map_or(0, |p| self.price_scale.apply(p))
            };
            let close_price = price(&series.closes);
            let volume = ChartSeries::at(&series.volumes, i)
                .filter(|v| v.is_finite())
                .map_or(0, |v| (v.round() as i64).max(0));

            let value = series
                .accumulated_values
                .as_ref()
                .and_then(|column| ChartSeries::at(column, i))
                .filter(|v| v.is_finite())
                .map(|millions| ((millions * 1_000_000.0).round() as i64).max(0))
                .unwrap_or_else(|| close_price.saturating_mul(volume));

            let bar = PriceBar {
                symbol: symbol.to_string(),
                trading_date,
                open_price: price(&series.opens),
                high_price: price(&series.highs),
                low_price: price(&series.lows),
                close_price,
                volume,
                value,
            };

            if let Some(&existing) = seen.get(&trading_date) {
                tracing::warn!(symbol, %trading_date, "Duplicate trading date in upstream response, keeping the later bar");
                bars[existing] = bar;
            } else {
                seen.insert(trading_date, bars.len());
                bars.push(bar);
            }
        }

        bars
    }

    /// Index bars ordered by date, with change against the previous close
    pub fn index_bars(
        &self,
        index_code: &str,
        series: &ChartSeries,
        baseline: ChangeBaseline,
    ) -> Vec<IndexBar> {
        let mut by_date: HashMap<NaiveDate, usize> = HashMap::new();
        let mut rows: Vec<(NaiveDate, usize)> = Vec::with_capacity(series.len());

        for (i, &timestamp) in series.times.iter().enumerate() {
            let Some(trading_date) = self.trading_date(timestamp) else {
                tracing::warn!(index_code, timestamp, "Skipping bar with out-of-range timestamp");
                continue;
            };
            if let Some(&pos) = by_date.get(&trading_date) {
                rows[pos] = (trading_date, i);
            } else {
                by_date.insert(trading_date, rows.len());
                rows.push((trading_date, i));
            }
        }
        rows.sort_by_key(|(date, _)| *date);

        let value_at = |column: &[Option<f64>], i: usize| {
            ChartSeries::at(column, i)
                .filter(|v| v.is_finite())
                .map_or(0.0, round2)
        };

        let mut bars = Vec::with_capacity(rows.len());
        let mut prev_close: Option<f64> = None;

        for (trading_date, i) in rows {
            let open = value_at(&series.opens, i);
            let close = value_at(&series.closes, i);

            let baseline_close = match (prev_close, baseline) {
                (Some(prev), _) => Some(prev),
                (None, ChangeBaseline::FirstOpen) => Some(open),
                (None, ChangeBaseline::Zero) => None,
            };

            let (change_value, change_percent) = match baseline_close {
                Some(prev) if prev != 0.0 => (
                    round2(close - prev),
                    round2((close - prev) / prev * 100.0),
                ),
                _ => (0.0, 0.0),
            };

            bars.push(IndexBar {
                index_code: index_code.to_string(),
                trading_date,
                open_value: open,
                high_value: value_at(&series.highs, i),
                low_value: value_at(&series.lows, i),
                close_value: close,
                volume: ChartSeries::at(&series.volumes, i)
                    .filter(|v| v.is_finite())
                    .map_or(0, |v| (v.round() as i64).max(0)),
                value: 0,
                change_value,
                change_percent,
            });

            prev_close = Some(close);
        }

        bars
    }
}

/// Bars to request so that a range starting at `start` is covered up to
/// `end`: business days in between plus a buffer for holidays and upstream
/// quirks.
pub fn count_back_for_range(start: NaiveDate, end: NaiveDate) -> u32 {
    let mut business_days = 0u32;
    let mut current_date = start;
    while current_date <= end {
        let weekday = current_date.weekday().num_days_from_sunday();
        if weekday != 0 && weekday != 6 {
            business_days += 1;
        }
        current_date += ChronoDuration::days(1);
    }

    let count_back = business_days + COUNT_BACK_BUFFER;
    tracing::debug!(%start, %end, business_days, count_back, "Count back calculation");
    count_back
}

/// A browser user agent, rotated when `random` is set
pub(crate) fn pick_user_agent(random: bool) -> String {
    if random {
        use rand::seq::SliceRandom;
        USER_AGENTS
            .choose(&mut rand::thread_rng())
            .unwrap_or(&USER_AGENTS[0])
            .to_string()
    } else {
        USER_AGENTS[0].to_string()
    }
}

/// Client for the VCI chart API
pub struct VciClient<T: HttpTransport> {
    transport: T,
    base_url: String,
    random_agent: bool,
    normalizer: BarNormalizer,
}

impl VciClient<IsahcTransport> {
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, TransportError> {
        let transport = IsahcTransport::new(config.timeout, config.proxy.as_deref())?;
        Ok(Self::new(transport, config))
    }
}

impl<T: HttpTransport> VciClient<T> {
    pub fn new(transport: T, config: &UpstreamConfig) -> Self {
        let mut base_url = config.base_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Self {
            transport,
            base_url,
            random_agent: config.random_agent,
            normalizer: BarNormalizer::new(config.timezone, config.price_scale),
        }
    }

    fn get_user_agent(&self) -> String {
        pick_user_agent(self.random_agent)
    }

    /// Header set of the upstream's own web client; requests without a
    /// matching Origin/User-Agent get rejected
    fn headers(&self) -> Headers {
        [
            ("Accept", "application/json, text/plain, */*".to_string()),
            ("Accept-Language", "en-US,en;q=0.9,vi-VN;q=0.8,vi;q=0.7".to_string()),
            ("Content-Type", "application/json".to_string()),
            ("Cache-Control", "no-cache".to_string()),
            ("Pragma", "no-cache".to_string()),
            ("Sec-Fetch-Dest", "empty".to_string()),
            ("Sec-Fetch-Mode", "cors".to_string()),
            ("Sec-Fetch-Site", "same-site".to_string()),
            ("User-Agent", self.get_user_agent()),
            ("Referer", VCI_REFERER.to_string()),
            ("Origin", VCI_ORIGIN.to_string()),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
    }

    pub fn chart_url(&self) -> String {
        format!("{}{}", self.base_url, VCI_CHART_PATH)
    }

    pub fn chart_payload(upstream_symbol: &str, count_back: u32, to: i64) -> Value {
        serde_json::json!({
            "timeFrame": VCI_TIME_FRAME,
            "symbols": [upstream_symbol],
            "to": to,
            "countBack": count_back
        })
    }

    async fn fetch_series(&self, upstream_symbol: &str, count_back: u32) -> Result<ChartSeries, FetchError> {
        let url = self.chart_url();
        let payload = Self::chart_payload(upstream_symbol, count_back, Utc::now().timestamp());

        tracing::debug!(symbol = upstream_symbol, count_back, url = %url, "VCI chart request");

        let reply = self
            .transport
            .post(&url, &self.headers(), payload.to_string())
            .await?;

        if let Some(error) = classify_status(reply.status) {
            tracing::debug!(symbol = upstream_symbol, status = reply.status, "VCI chart request rejected");
            return Err(error);
        }

        let series = parse_chart_response(&reply.body)?;
        tracing::debug!(symbol = upstream_symbol, records = series.len(), "VCI chart response");
        Ok(series)
    }

    /// Up to `lookback` most recent daily bars for a stock, ending now
    pub async fn fetch(&self, symbol: &str, lookback: u32) -> Result<Vec<PriceBar>, FetchError> {
        let series = self.fetch_series(symbol, lookback).await?;
        let bars = self.normalizer.price_bars(symbol, &series);
        if bars.is_empty() {
            return Err(FetchError::no_data("no usable bars"));
        }
        Ok(bars)
    }

    /// Up to `lookback` most recent daily bars for a market index, ending now
    pub async fn fetch_index(
        &self,
        index: &IndexTicker,
        lookback: u32,
        baseline: ChangeBaseline,
    ) -> Result<Vec<IndexBar>, FetchError> {
        let series = self.fetch_series(&index.upstream_code, lookback).await?;
        let bars = self.normalizer.index_bars(&index.code, &series, baseline);
        if bars.is_empty() {
            return Err(FetchError::no_data("no usable bars"));
        }
        Ok(bars)
    }

    /// Cheap availability check, run before a sync to avoid burning the
    /// rate-limit budget while still blocked
    pub async fn probe(&self) -> Result<(), FetchError> {
        let url = format!("{}{}", self.base_url, VCI_PROBE_PATH);
        let reply = self.transport.get(&url, &self.headers()).await?;
        match classify_status(reply.status) {
            None => Ok(()),
            Some(error) => Err(error),
        }
    }
}
