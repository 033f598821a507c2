//! Chunked upserts into the hosted Postgres database through its REST API.

use crate::constants::{EXISTING_DATES_PAGE_SIZE, MARKET_INDICES_TABLE, STOCK_PRICES_TABLE};
use crate::models::StorageConfig;
use crate::services::http::{Headers, HttpTransport, ReqwestTransport, TransportError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("storage returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to encode rows: {0}")]
    Encode(String),

    #[error("failed to decode storage response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    StockPrices,
    MarketIndices,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::StockPrices => STOCK_PRICES_TABLE,
            Table::MarketIndices => MARKET_INDICES_TABLE,
        }
    }

    /// Columns of the table's unique constraint
    pub fn conflict_key(&self) -> &'static str {
        match self {
            Table::StockPrices => "symbol,trading_date",
            Table::MarketIndices => "index_code,trading_date",
        }
    }
}

/// What happened to one chunk of rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    Inserted { rows: usize },
    /// Rows were already present; counts as accepted
    Duplicate { rows: usize },
    Failed { rows: usize, reason: String },
}

impl ChunkOutcome {
    pub fn rows(&self) -> usize {
        match self {
            ChunkOutcome::Inserted { rows }
            | ChunkOutcome::Duplicate { rows }
            | ChunkOutcome::Failed { rows, .. } => *rows,
        }
    }

    pub fn is_accepted(&self) -> bool {
        !matches!(self, ChunkOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkReport {
    /// Positions of the chunk's rows in the submitted slice
    pub range: Range<usize>,
    pub outcome: ChunkOutcome,
}

/// Per-chunk result of one upsert call. Chunks are independent: a failed
/// chunk does not roll back the ones before it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertReport {
    pub chunks: Vec<ChunkReport>,
}

impl UpsertReport {
    pub fn accepted_count(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| c.outcome.is_accepted())
            .map(|c| c.outcome.rows())
            .sum()
    }

    pub fn failed_chunks(&self) -> impl Iterator<Item = &ChunkReport> {
        self.chunks.iter().filter(|c| !c.outcome.is_accepted())
    }

    pub fn failed_count(&self) -> usize {
        self.failed_chunks().map(|c| c.outcome.rows()).sum()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed_chunks().next().is_none()
    }

    /// Reason of the first failed chunk, for console output
    pub fn first_failure(&self) -> Option<&str> {
        self.failed_chunks().find_map(|c| match &c.outcome {
            ChunkOutcome::Failed { reason, .. } => Some(reason.as_str()),
            _ => None,
        })
    }
}

/// Postgres SQLSTATE for a unique-constraint violation
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
}

/// Whether a rejected write only collided with rows that already exist.
/// Other conflicts (foreign keys, a missing ON CONFLICT constraint) wrote
/// nothing and are failures.
fn is_duplicate(body: &str) -> bool {
    let code = serde_json::from_str::<PostgrestError>(body)
        .ok()
        .and_then(|e| e.code);
    match code {
        Some(code) => code == UNIQUE_VIOLATION,
        None => body.to_lowercase().contains("duplicate key"),
    }
}

#[derive(Debug, Deserialize)]
struct DateRow {
    trading_date: NaiveDate,
}

pub struct StorageClient<T: HttpTransport> {
    transport: T,
    base_url: String,
    service_key: String,
    chunk_size: usize,
}

impl StorageClient<ReqwestTransport> {
    pub fn from_config(config: &StorageConfig) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new(config.timeout)?;
        Ok(Self::new(transport, config))
    }
}

impl<T: HttpTransport> StorageClient<T> {
    pub fn new(transport: T, config: &StorageConfig) -> Self {
        Self {
            transport,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
            chunk_size: config.chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.name())
    }

    fn auth_headers(&self) -> Headers {
        vec![
            ("apikey".to_string(), self.service_key.clone()),
            (
                "Authorization".to_string(),
                format!("Bearer {}", self.service_key),
            ),
        ]
    }

    fn write_headers(&self) -> Headers {
        let mut headers = self.auth_headers();
        headers.push(("Content-Type".to_string(), "application/json".to_string()));
        headers.push((
            "Prefer".to_string(),
            "resolution=merge-duplicates,return=minimal".to_string(),
        ));
        headers
    }

    /// Write `rows` in chunks of the configured size, one request per chunk
    pub async fn upsert<R: Serialize>(&self, table: Table, rows: &[R]) -> UpsertReport {
        let mut report = UpsertReport::default();

        for (i, chunk) in rows.chunks(self.chunk_size).enumerate() {
            let start = i * self.chunk_size;
            let outcome = self.upsert_chunk(table, chunk).await;

            if let ChunkOutcome::Failed { reason, .. } = &outcome {
                tracing::warn!(table = table.name(), chunk = i, rows = chunk.len(), reason = %reason, "Upsert chunk failed");
            } else {
                tracing::debug!(table = table.name(), chunk = i, rows = chunk.len(), "Upsert chunk accepted");
            }

            report.chunks.push(ChunkReport {
                range: start..start + chunk.len(),
                outcome,
            });
        }

        report
    }

    /// Write a single chunk. Exposed so failed chunks can be resubmitted.
    pub async fn upsert_chunk<R: Serialize>(&self, table: Table, rows: &[R]) -> ChunkOutcome {
        let count = rows.len();
        let body = match serde_json::to_string(rows) {
            Ok(body) => body,
            Err(e) => {
                return ChunkOutcome::Failed {
                    rows: count,
                    reason: StorageError::Encode(e.to_string()).to_string(),
                }
            }
        };

        let url = format!("{}?on_conflict={}", self.table_url(table), table.conflict_key());

        match self.transport.post(&url, &self.write_headers(), body).await {
            Ok(reply) if reply.is_success() => ChunkOutcome::Inserted { rows: count },
            Ok(reply) if is_duplicate(&reply.body) => {
                ChunkOutcome::Duplicate { rows: count }
            }
            Ok(reply) => ChunkOutcome::Failed {
                rows: count,
                reason: StorageError::Status {
                    status: reply.status,
                    body: reply.body.chars().take(200).collect(),
                }
                .to_string(),
            },
            Err(e) => ChunkOutcome::Failed {
                rows: count,
                reason: StorageError::from(e).to_string(),
            },
        }
    }

    /// Stored trading dates of `symbol` within `[from, to]`, ascending.
    ///
    /// Reads page by page until an empty page, advancing by the rows actually
    /// returned, so a server-side row cap cannot silently truncate the list.
    pub async fn existing_dates(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StorageError> {
        let mut dates: Vec<NaiveDate> = Vec::new();

        loop {
            let page = self.existing_dates_page(symbol, from, to, dates.len()).await?;
            let Some(&first) = page.first() else {
                break;
            };
            if dates.last().is_some_and(|&last| first <= last) {
                return Err(StorageError::Decode(format!(
                    "pagination did not advance at offset {} ({} <= {})",
                    dates.len(),
                    first,
                    dates.last().map_or(String::new(), |d| d.to_string())
                )));
            }
            tracing::debug!(symbol, offset = dates.len(), rows = page.len(), "Read stored dates page");
            dates.extend(page);
        }

        Ok(dates)
    }

    async fn existing_dates_page(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
        offset: usize,
    ) -> Result<Vec<NaiveDate>, StorageError> {
        let url = format!(
            "{}?select=trading_date&symbol=eq.{}&trading_date=gte.{}&trading_date=lte.{}&order=trading_date.asc&limit={}&offset={}",
            self.table_url(Table::StockPrices),
            symbol,
            from,
            to,
            EXISTING_DATES_PAGE_SIZE,
            offset
        );

        let reply = self.transport.get(&url, &self.auth_headers()).await?;
        if !reply.is_success() {
            return Err(StorageError::Status {
                status: reply.status,
                body: reply.body.chars().take(200).collect(),
            });
        }

        let rows: Vec<DateRow> = serde_json::from_str(&reply.body)
            .map_err(|e| StorageError::Decode(e.to_string()))?;
        let mut dates: Vec<NaiveDate> = rows.into_iter().map(|r| r.trading_date).collect();
        dates.sort();
        dates.dedup();
        Ok(dates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PriceBar;
    use crate::services::http::testing::ScriptedTransport;
    use std::sync::Arc;
    use std::time::Duration;

    fn config(chunk_size: usize) -> StorageConfig {
        StorageConfig {
            base_url: "https://db.example.test/".to_string(),
            service_key: "service-key".to_string(),
            timeout: Duration::from_secs(5),
            chunk_size,
        }
    }

    fn bars(n: usize) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        (0..n)
            .map(|i| PriceBar {
                symbol: "FPT".to_string(),
                trading_date: start + chrono::Duration::days(i as i64),
                open_price: 100,
                high_price: 110,
                low_price: 90,
                close_price: 105,
                volume: 10,
                value: 1050,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_chunking_issues_ceil_requests() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .reply(201, "")
                .reply(201, "")
                .reply(201, ""),
        );
        let client = StorageClient::new(transport.clone(), &config(2));

        let report = client.upsert(Table::StockPrices, &bars(5)).await;

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        let sizes: Vec<usize> = requests
            .iter()
            .map(|r| r.json().as_array().unwrap().len())
            .collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(report.accepted_count(), 5);
        assert_eq!(report.chunks[2].range, 4..5);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_no_rows_no_requests() {
        let transport = Arc::new(ScriptedTransport::new());
        let client = StorageClient::new(transport.clone(), &config(500));

        let report = client.upsert::<PriceBar>(Table::StockPrices, &[]).await;
        assert_eq!(report.chunk_count(), 0);
        assert_eq!(report.accepted_count(), 0);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_request_shape() {
        let transport = Arc::new(ScriptedTransport::new().reply(201, ""));
        let client = StorageClient::new(transport.clone(), &config(500));

        client.upsert(Table::StockPrices, &bars(1)).await;

        let requests = transport.requests();
        let request = &requests[0];
        assert_eq!(
            request.url,
            "https://db.example.test/rest/v1/stock_prices?on_conflict=symbol,trading_date"
        );
        assert_eq!(request.header("apikey"), Some("service-key"));
        assert_eq!(request.header("Authorization"), Some("Bearer service-key"));
        assert_eq!(
            request.header("Prefer"),
            Some("resolution=merge-duplicates,return=minimal")
        );
        assert_eq!(request.json()[0]["trading_date"], "2025-01-01");
    }

    #[tokio::test]
    async fn test_duplicates_count_as_accepted() {
        let transport = ScriptedTransport::new()
            .reply(
                409,
                r#"{"code":"23505","message":"duplicate key value violates unique constraint \"stock_prices_symbol_trading_date_key\""}"#,
            )
            .reply(400, "duplicate key value violates unique constraint")
            .reply(500, "internal error");
        let client = StorageClient::new(transport, &config(1));

        let report = client.upsert(Table::StockPrices, &bars(3)).await;

        assert_eq!(report.chunks[0].outcome, ChunkOutcome::Duplicate { rows: 1 });
        assert_eq!(report.chunks[1].outcome, ChunkOutcome::Duplicate { rows: 1 });
        assert!(matches!(report.chunks[2].outcome, ChunkOutcome::Failed { rows: 1, .. }));
        assert_eq!(report.accepted_count(), 2);
        assert_eq!(report.failed_count(), 1);
        assert!(report.first_failure().unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_other_conflicts_are_failures() {
        let transport = ScriptedTransport::new()
            .reply(
                400,
                r#"{"code":"42P10","message":"there is no unique or exclusion constraint matching the ON CONFLICT specification"}"#,
            )
            .reply(
                409,
                r#"{"code":"23503","message":"insert or update on table \"stock_prices\" violates foreign key constraint"}"#,
            )
            .reply(409, "");
        let client = StorageClient::new(transport, &config(1));

        let report = client.upsert(Table::StockPrices, &bars(3)).await;

        assert_eq!(report.accepted_count(), 0);
        assert_eq!(report.failed_chunks().count(), 3);
        assert!(report.first_failure().unwrap().contains("42P10"));
    }

    #[tokio::test]
    async fn test_failed_chunk_does_not_stop_later_chunks() {
        let transport = ScriptedTransport::new()
            .reply(201, "")
            .fail(TransportError::Timeout(Duration::from_secs(5)))
            .reply(201, "");
        let client = StorageClient::new(transport, &config(2));

        let report = client.upsert(Table::StockPrices, &bars(6)).await;

        assert_eq!(report.chunk_count(), 3);
        assert_eq!(report.accepted_count(), 4);
        let failed: Vec<_> = report.failed_chunks().map(|c| c.range.clone()).collect();
        assert_eq!(failed, vec![2..4]);
    }

    #[tokio::test]
    async fn test_existing_dates() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .reply(200, r#"[{"trading_date":"2025-01-03"},{"trading_date":"2025-01-02"}]"#)
                .reply(200, "[]"),
        );
        let client = StorageClient::new(transport.clone(), &config(500));
        let from = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();

        let dates = client.existing_dates("FPT", from, to).await.unwrap();
        assert_eq!(dates.len(), 2);
        assert!(dates[0] < dates[1]);

        let requests = transport.requests();
        let request = &requests[0];
        assert_eq!(request.method, "GET");
        assert!(request.url.contains("symbol=eq.FPT"));
        assert!(request.url.contains("trading_date=gte.2025-01-01"));
        assert!(request.url.contains("trading_date=lte.2025-01-31"));
        assert!(request.url.ends_with("&offset=0"));
    }

    #[tokio::test]
    async fn test_existing_dates_reads_every_page() {
        // Backend capped at 3 rows per response
        let transport = Arc::new(
            ScriptedTransport::new()
                .reply(
                    200,
                    r#"[{"trading_date":"2020-01-02"},{"trading_date":"2020-01-03"},{"trading_date":"2020-01-06"}]"#,
                )
                .reply(
                    200,
                    r#"[{"trading_date":"2024-12-30"},{"trading_date":"2024-12-31"}]"#,
                )
                .reply(200, "[]"),
        );
        let client = StorageClient::new(transport.clone(), &config(500));
        let from = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();

        let dates = client.existing_dates("FPT", from, to).await.unwrap();

        assert_eq!(dates.len(), 5);
        assert_eq!(dates.last(), Some(&to));
        let offsets: Vec<String> = transport
            .requests()
            .iter()
            .map(|r| r.url.rsplit("offset=").next().unwrap().to_string())
            .collect();
        assert_eq!(offsets, vec!["0", "3", "5"]);
    }

    #[tokio::test]
    async fn test_existing_dates_stuck_pagination_is_an_error() {
        let page = r#"[{"trading_date":"2025-01-02"}]"#;
        let transport = ScriptedTransport::new().reply(200, page).reply(200, page);
        let client = StorageClient::new(transport, &config(500));
        let day = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();

        let err = client.existing_dates("FPT", day, day).await.unwrap_err();
        assert!(matches!(err, StorageError::Decode(_)));
    }

    #[tokio::test]
    async fn test_existing_dates_error() {
        let transport = ScriptedTransport::new().reply(401, "unauthorized");
        let client = StorageClient::new(transport, &config(500));
        let day = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();

        let err = client.existing_dates("FPT", day, day).await.unwrap_err();
        assert!(matches!(err, StorageError::Status { status: 401, .. }));
    }
}
