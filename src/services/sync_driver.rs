//! Walks a symbol list: fetch from upstream, then upsert into storage.
//!
//! Symbols are processed one at a time in list order with a fixed pause in
//! between. Per-symbol failures are recorded and the run moves on, except
//! when the upstream reports that we are blocked: every remaining symbol is
//! then marked as not attempted and nothing else is fetched.

use crate::models::{
    filter_date_range, ChangeBaseline, DriverConfig, FetchProgress, IndexTicker, RunState,
    RunSummary, SymbolOutcome, SymbolReport, SymbolState, TradingDated,
};
use crate::services::http::HttpTransport;
use crate::services::simplize::SimplizeClient;
use crate::services::storage::{StorageClient, Table, UpsertReport};
use crate::services::vci::{FetchError, FetchErrorKind, VciClient};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::time::Instant;

/// Which bars of each fetch to keep
#[derive(Debug, Clone, Default)]
pub struct FetchWindow {
    /// Bars requested upstream; `None` uses the driver default
    pub lookback: Option<u32>,
    /// Inclusive lower bound on trading date
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound on trading date
    pub to: Option<NaiveDate>,
    /// Drop bars whose date is already stored (stocks only)
    pub skip_existing: bool,
}

pub struct SyncDriver<U: HttpTransport, S: HttpTransport> {
    vci: VciClient<U>,
    storage: StorageClient<S>,
    config: DriverConfig,
}

impl<U: HttpTransport, S: HttpTransport> SyncDriver<U, S> {
    pub fn new(vci: VciClient<U>, storage: StorageClient<S>, config: DriverConfig) -> Self {
        Self {
            vci,
            storage,
            config,
        }
    }

    /// Sync daily bars of listed stocks into `stock_prices`
    pub async fn run_stocks(&self, symbols: &[String], window: &FetchWindow) -> RunSummary {
        let lookback = window.lookback.unwrap_or(self.config.lookback);

        self.run_list(symbols, Table::StockPrices, window, |i| {
            let symbol = symbols[i].as_str();
            async move {
                let bars = self
                    .with_retry(symbol, || self.vci.fetch(symbol, lookback))
                    .await?;
                if window.skip_existing {
                    Ok(self.drop_stored(symbol, bars).await)
                } else {
                    Ok(bars)
                }
            }
        })
        .await
    }

    /// Sync daily bars of market indices into `market_indices`
    pub async fn run_indices(
        &self,
        indices: &[IndexTicker],
        window: &FetchWindow,
        baseline: ChangeBaseline,
    ) -> RunSummary {
        let lookback = window.lookback.unwrap_or(self.config.lookback);
        let codes: Vec<String> = indices.iter().map(|i| i.code.clone()).collect();

        self.run_list(&codes, Table::MarketIndices, window, |i| {
            let index = &indices[i];
            self.with_retry(&index.code, move || {
                self.vci.fetch_index(index, lookback, baseline)
            })
        })
        .await
    }

    /// Write today's bar for each stock from the realtime quote API
    pub async fn run_realtime<R: HttpTransport>(
        &self,
        quotes: &SimplizeClient<R>,
        symbols: &[String],
    ) -> RunSummary {
        self.run_list(symbols, Table::StockPrices, &FetchWindow::default(), |i| {
            let symbol = symbols[i].as_str();
            self.with_retry(symbol, move || async move {
                quotes.fetch_today(symbol).await.map(|bar| vec![bar])
            })
        })
        .await
    }

    async fn run_list<B, F, Fut>(
        &self,
        names: &[String],
        table: Table,
        window: &FetchWindow,
        fetch: F,
    ) -> RunSummary
    where
        B: Serialize + TradingDated,
        F: Fn(usize) -> Fut,
        Fut: Future<Output = Result<Vec<B>, FetchError>>,
    {
        let started = Instant::now();
        let total = names.len();
        let mut summary = RunSummary {
            state: RunState::Running,
            ..RunSummary::default()
        };

        tracing::info!(
            table = table.name(),
            symbols = total,
            delay_ms = self.config.request_delay.as_millis() as u64,
            max_attempts = self.config.retry.max_attempts,
            "Starting sync run"
        );

        if self.config.probe_first {
            match self.vci.probe().await {
                Ok(()) => tracing::info!("Upstream probe OK"),
                Err(FetchError::Blocked) => {
                    tracing::warn!("Upstream probe blocked, aborting run before first symbol");
                    summary.aborted = true;
                }
                Err(e) => tracing::warn!(error = %e, "Upstream probe failed, continuing"),
            }
        }

        for (i, name) in names.iter().enumerate() {
            let mut state = SymbolState::Pending;

            if summary.aborted {
                advance(name, &mut state, SymbolState::NotAttempted);
                summary.reports.push(SymbolReport {
                    symbol: name.clone(),
                    outcome: SymbolOutcome::NotAttempted,
                    elapsed: std::time::Duration::ZERO,
                });
                continue;
            }

            let symbol_started = Instant::now();
            advance(name, &mut state, SymbolState::Fetching);

            let outcome = match fetch(i).await {
                Err(FetchError::Blocked) => {
                    summary.aborted = true;
                    SymbolOutcome::FetchFailed(FetchError::Blocked)
                }
                Err(e @ FetchError::NoData { .. }) => SymbolOutcome::Skipped {
                    reason: e.to_string(),
                },
                Err(e) => SymbolOutcome::FetchFailed(e),
                Ok(bars) => {
                    advance(name, &mut state, SymbolState::Fetched);
                    let fetched = bars.len();
                    let bars = filter_date_range(bars, window.from, window.to);
                    if bars.is_empty() {
                        SymbolOutcome::Skipped {
                            reason: format!("no new bars out of {}", fetched),
                        }
                    } else {
                        advance(name, &mut state, SymbolState::Upserting);
                        let report = self.upsert_with_retry(table, &bars).await;
                        Self::upsert_outcome(bars.len(), &report)
                    }
                }
            };
            advance(name, &mut state, outcome.state());

            let progress = FetchProgress::new(i + 1, total);
            println!("{}", progress.format_line(name, &outcome));
            tracing::info!(
                symbol = %name,
                ?state,
                records = outcome.accepted(),
                elapsed_ms = symbol_started.elapsed().as_millis() as u64,
                "Symbol done"
            );

            summary.reports.push(SymbolReport {
                symbol: name.clone(),
                outcome,
                elapsed: symbol_started.elapsed(),
            });

            if summary.aborted {
                tracing::warn!(symbol = %name, remaining = total - i - 1, "Upstream blocked, aborting run");
                continue;
            }

            let is_last = i + 1 == total;
            if !is_last && !self.config.request_delay.is_zero() {
                tokio::time::sleep(self.config.request_delay).await;
            }
        }

        summary.state = RunState::Completed;
        summary.elapsed = started.elapsed();

        tracing::info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            skipped = summary.skipped(),
            not_attempted = summary.not_attempted(),
            records = summary.records(),
            aborted = summary.aborted,
            "Sync run completed"
        );

        summary
    }

    fn upsert_outcome(fetched: usize, report: &UpsertReport) -> SymbolOutcome {
        let accepted = report.accepted_count();
        match report.first_failure() {
            None => SymbolOutcome::Upserted { fetched, accepted },
            Some(reason) => SymbolOutcome::UpsertFailed {
                fetched,
                accepted,
                reason: reason.to_string(),
            },
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable kind, or the
    /// attempt budget is spent
    async fn with_retry<T, F, Fut>(&self, symbol: &str, op: F) -> Result<T, FetchError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let policy = &self.config.retry;
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if policy.should_retry(e.kind(), attempt) => {
                    let delay = policy.delay_after(attempt);
                    tracing::warn!(
                        symbol,
                        attempt,
                        max_attempts = policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Fetch failed, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => {
                    if e.kind() != FetchErrorKind::NoData {
                        tracing::debug!(symbol, attempt, error = %e, "Fetch failed");
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Upsert, then resubmit failed chunks under the retry policy
    async fn upsert_with_retry<R: Serialize>(&self, table: Table, rows: &[R]) -> UpsertReport {
        let policy = &self.config.retry;
        let mut report = self.storage.upsert(table, rows).await;
        let mut attempt = 1;

        while !report.is_complete() && policy.should_retry_chunk(attempt) {
            let delay = policy.delay_after(attempt);
            tracing::warn!(
                table = table.name(),
                failed_rows = report.failed_count(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Resubmitting failed chunks"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;

            for chunk in report.chunks.iter_mut().filter(|c| !c.outcome.is_accepted()) {
                chunk.outcome = self
                    .storage
                    .upsert_chunk(table, &rows[chunk.range.clone()])
                    .await;
            }
        }

        report
    }

    /// Remove bars already stored for `symbol`. On a lookup failure all bars
    /// are kept; the upsert is idempotent.
    async fn drop_stored<B: TradingDated>(&self, symbol: &str, bars: Vec<B>) -> Vec<B> {
        let (Some(from), Some(to)) = (
            bars.iter().map(|b| b.trading_date()).min(),
            bars.iter().map(|b| b.trading_date()).max(),
        ) else {
            return bars;
        };

        match self.storage.existing_dates(symbol, from, to).await {
            Ok(dates) => {
                let stored: HashSet<NaiveDate> = dates.into_iter().collect();
                let before = bars.len();
                let fresh: Vec<B> = bars
                    .into_iter()
                    .filter(|b| !stored.contains(&b.trading_date()))
                    .collect();
                tracing::debug!(symbol, fetched = before, new = fresh.len(), "Filtered stored dates");
                fresh
            }
            Err(e) => {
                tracing::warn!(symbol, error = %e, "Could not read stored dates, upserting all bars");
                bars
            }
        }
    }
}

fn advance(symbol: &str, state: &mut SymbolState, next: SymbolState) {
    debug_assert!(
        state.can_advance_to(next),
        "{}: illegal transition {:?} -> {:?}",
        symbol,
        state,
        next
    );
    tracing::debug!(symbol, from = ?*state, to = ?next, "State change");
    *state = next;
}
