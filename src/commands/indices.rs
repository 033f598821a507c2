use crate::error::Result;
use crate::models::{AppConfig, ChangeBaseline, IndexTicker};
use crate::services::FetchWindow;
use crate::utils::split_list;

pub fn run(
    mut config: AppConfig,
    codes: Option<String>,
    lookback: Option<u32>,
    baseline: ChangeBaseline,
    probe_first: bool,
) -> Result<()> {
    let indices = match codes {
        Some(codes) => IndexTicker::resolve(&split_list(&codes))?,
        None => IndexTicker::all(),
    };
    let window = FetchWindow {
        lookback,
        ..FetchWindow::default()
    };
    config.driver.probe_first |= probe_first;

    println!(
        "🔄 Syncing {} indices: {} (first-bar baseline: {:?})",
        indices.len(),
        indices.iter().map(|i| i.code.as_str()).collect::<Vec<_>>().join(", "),
        baseline
    );

    let driver = super::build_driver(&config)?;
    let summary = super::runtime()?.block_on(driver.run_indices(&indices, &window, baseline));
    super::finish(&summary)
}
