use crate::error::Result;
use crate::models::{AppConfig, SymbolSource};
use crate::services::FetchWindow;
use crate::utils::parse_date;

pub fn run(
    mut config: AppConfig,
    source: SymbolSource,
    lookback: Option<u32>,
    from: Option<String>,
    to: Option<String>,
    probe_first: bool,
) -> Result<()> {
    let symbols = source.resolve()?;
    let window = FetchWindow {
        lookback,
        from: from.as_deref().map(parse_date).transpose()?,
        to: to.as_deref().map(parse_date).transpose()?,
        skip_existing: false,
    };
    config.driver.probe_first |= probe_first;

    println!(
        "🔄 Syncing {} symbols (lookback {} bars, price scale x{})",
        symbols.len(),
        lookback.unwrap_or(config.driver.lookback),
        config.upstream.price_scale.factor()
    );
    if window.from.is_some() || window.to.is_some() {
        println!(
            "📅 Keeping bars in [{}, {}]",
            window.from.map_or("-".to_string(), |d| d.to_string()),
            window.to.map_or("-".to_string(), |d| d.to_string())
        );
    }

    let driver = super::build_driver(&config)?;
    let summary = super::runtime()?.block_on(driver.run_stocks(&symbols, &window));
    super::finish(&summary)
}
