use crate::error::Result;
use crate::models::{AppConfig, SymbolSource};
use crate::services::{find_gaps, missing_months};
use crate::utils::parse_range;
use chrono::NaiveDate;

/// Lines describing the holes in one symbol's stored dates; empty when complete
fn report_lines(
    dates: &[NaiveDate],
    from: NaiveDate,
    to: NaiveDate,
    max_gap_days: i64,
) -> Vec<String> {
    let (Some(&first), Some(&last)) = (dates.first(), dates.last()) else {
        return vec![format!("no stored bars in {} .. {}", from, to)];
    };

    let mut lines = Vec::new();
    if (first - from).num_days() > max_gap_days {
        lines.push(format!("starts late: first bar {} ({} days after {})", first, (first - from).num_days(), from));
    }
    for gap in find_gaps(dates, max_gap_days) {
        lines.push(format!("gap {} -> {} ({} days)", gap.from, gap.to, gap.days));
    }
    if (to - last).num_days() > max_gap_days {
        lines.push(format!("ends early: last bar {} ({} days before {})", last, (to - last).num_days(), to));
    }
    let months = missing_months(dates, from, to);
    if !months.is_empty() {
        lines.push(format!("missing months: {}", months.join(", ")));
    }
    lines
}

pub fn run(
    config: AppConfig,
    source: SymbolSource,
    from: String,
    to: Option<String>,
    max_gap_days: i64,
) -> Result<()> {
    let symbols = source.resolve()?;
    let (from, to) = parse_range(&from, to.as_deref(), config.upstream.timezone)?;
    let storage = super::storage_client(&config)?;
    let runtime = super::runtime()?;

    println!(
        "🔍 Checking {} symbols for gaps over {} days in {} .. {}",
        symbols.len(),
        max_gap_days,
        from,
        to
    );

    let mut complete = 0;
    let mut with_gaps = 0;
    let mut errors = 0;

    for symbol in &symbols {
        match runtime.block_on(storage.existing_dates(symbol, from, to)) {
            Ok(dates) => {
                let lines = report_lines(&dates, from, to, max_gap_days);
                if lines.is_empty() {
                    complete += 1;
                    println!("✅ {} ({} bars)", symbol, dates.len());
                } else {
                    with_gaps += 1;
                    println!("⚠️  {} ({} bars)", symbol, dates.len());
                    for line in lines {
                        println!("     {}", line);
                    }
                }
            }
            Err(e) => {
                errors += 1;
                tracing::warn!(symbol = %symbol, error = %e, "Failed to read stored dates");
                println!("❌ {} ({})", symbol, e);
            }
        }
    }

    println!(
        "\n📊 Complete: {} | With gaps: {} | Errors: {}",
        complete, with_gaps, errors
    );
    Ok(())
}
