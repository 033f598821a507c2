use crate::error::Result;
use crate::models::{AppConfig, SymbolSource};
use crate::services::{count_back_for_range, FetchWindow};
use crate::utils::{parse_range, today_in};

pub fn run(
    config: AppConfig,
    source: SymbolSource,
    from: String,
    to: Option<String>,
    lookback: Option<u32>,
) -> Result<()> {
    let symbols = source.resolve()?;
    let timezone = config.upstream.timezone;
    let (from, to) = parse_range(&from, to.as_deref(), timezone)?;

    // The upstream only counts back from now, so the request has to reach
    // from today back to the start of the range
    let lookback = lookback.unwrap_or_else(|| count_back_for_range(from, today_in(timezone)));

    println!(
        "🔄 Filling {} symbols for {} .. {} ({} bars per request)",
        symbols.len(),
        from,
        to,
        lookback
    );

    let window = FetchWindow {
        lookback: Some(lookback),
        from: Some(from),
        to: Some(to),
        skip_existing: true,
    };

    let driver = super::build_driver(&config)?;
    let summary = super::runtime()?.block_on(driver.run_stocks(&symbols, &window));
    super::finish(&summary)
}
