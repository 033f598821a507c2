use crate::error::{AppError, Result};
use crate::models::{AppConfig, SymbolSource};
use crate::services::SimplizeClient;
use crate::utils::today_in;

pub fn run(mut config: AppConfig, source: SymbolSource) -> Result<()> {
    let symbols = source.resolve()?;
    // The availability check targets the chart API, not the quote API
    config.driver.probe_first = false;

    println!(
        "⚡ Updating today's bar ({}) for {} symbols from realtime quotes",
        today_in(config.upstream.timezone),
        symbols.len()
    );

    let quotes = SimplizeClient::from_config(&config.upstream)
        .map_err(|e| AppError::Network(e.to_string()))?;
    let driver = super::build_driver(&config)?;
    let summary = super::runtime()?.block_on(driver.run_realtime(&quotes, &symbols));
    super::finish(&summary)
}
