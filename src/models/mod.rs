pub mod price_bar;
mod sync_config;
mod sync_report;
mod ticker_group;

pub use price_bar::{filter_date_range, ChangeBaseline, IndexBar, PriceBar, PriceScale, TradingDated};
pub use sync_config::{AppConfig, DriverConfig, StorageConfig, UpstreamConfig};
pub use sync_report::{FetchProgress, RunState, RunSummary, SymbolOutcome, SymbolReport, SymbolState};
pub use ticker_group::{IndexTicker, SymbolSource, TickerGroups};
