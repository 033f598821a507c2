use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::commands;
use crate::constants::DEFAULT_MAX_GAP_DAYS;
use crate::error::{AppError, Result};
use crate::models::{AppConfig, ChangeBaseline, PriceScale, SymbolSource};

#[derive(Parser)]
#[command(name = "vnstock-sync")]
#[command(about = "Sync Vietnamese stock and index prices into Supabase", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub overrides: ConfigOverrides,

    #[command(subcommand)]
    pub command: Commands,
}

/// Command-line overrides for environment configuration
#[derive(Args, Debug, Default)]
pub struct ConfigOverrides {
    /// Pause between symbols in milliseconds
    #[arg(long, global = true)]
    pub delay_ms: Option<u64>,

    /// Rows per upsert request
    #[arg(long, global = true)]
    pub chunk_size: Option<usize>,

    /// Multiplier for upstream prices: 1 or 1000
    #[arg(long, global = true)]
    pub price_scale: Option<String>,

    /// Attempts per fetch, including the first
    #[arg(long, global = true)]
    pub max_attempts: Option<u32>,

    /// Proxy for upstream requests
    #[arg(long, global = true)]
    pub proxy: Option<String>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut AppConfig) -> Result<()> {
        if let Some(ms) = self.delay_ms {
            config.driver.request_delay = std::time::Duration::from_millis(ms);
        }
        if let Some(size) = self.chunk_size {
            config.storage.chunk_size = size;
        }
        if let Some(scale) = &self.price_scale {
            config.upstream.price_scale = PriceScale::from_str(scale).map_err(AppError::Config)?;
        }
        if let Some(attempts) = self.max_attempts {
            config.driver.retry.max_attempts = attempts;
        }
        if let Some(proxy) = &self.proxy {
            config.upstream.proxy = Some(proxy.clone());
        }
        config.validate()
    }
}

/// Which stocks a command works on
#[derive(Args, Debug, Default)]
pub struct SymbolArgs {
    /// Comma-separated symbols, e.g. FPT,HPG,VCB
    #[arg(long, conflicts_with_all = ["group", "groups_file"])]
    pub symbols: Option<String>,

    /// Group name; VN30 is built in, others need --groups-file
    #[arg(long)]
    pub group: Option<String>,

    /// JSON file of {"GROUP": ["SYM", ...]}
    #[arg(long, requires = "group")]
    pub groups_file: Option<PathBuf>,
}

impl SymbolArgs {
    pub fn source(&self) -> Result<SymbolSource> {
        match (&self.symbols, &self.group, &self.groups_file) {
            (Some(list), _, _) => Ok(SymbolSource::from_list(list)),
            (None, Some(name), Some(file)) => Ok(SymbolSource::Group {
                file: file.clone(),
                name: name.clone(),
            }),
            (None, Some(name), None) if name.eq_ignore_ascii_case("VN30") => Ok(SymbolSource::Vn30),
            (None, Some(name), None) => Err(AppError::InvalidInput(format!(
                "group '{}' needs --groups-file",
                name
            ))),
            (None, None, _) => Ok(SymbolSource::Vn30),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch recent daily bars for stocks and upsert them
    Sync {
        #[command(flatten)]
        symbols: SymbolArgs,

        /// Bars to request per symbol
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        lookback: Option<u32>,

        /// Keep bars on or after this date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// Keep bars on or before this date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Check upstream availability before the first symbol
        #[arg(long)]
        probe_first: bool,
    },
    /// Fetch daily bars for market indices and upsert them
    Indices {
        /// Comma-separated index codes (default: all known indices)
        #[arg(long)]
        codes: Option<String>,

        /// Bars to request per index
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        lookback: Option<u32>,

        /// Change baseline for the first bar: first-open or zero
        #[arg(long, default_value = "first-open")]
        baseline: String,

        #[arg(long)]
        probe_first: bool,
    },
    /// Backfill a historical range, skipping dates already stored
    Fill {
        #[command(flatten)]
        symbols: SymbolArgs,

        /// First date of the range (YYYY-MM-DD)
        #[arg(long)]
        from: String,

        /// Last date of the range (YYYY-MM-DD, default: today)
        #[arg(long)]
        to: Option<String>,

        /// Bars to request per symbol (default: enough to reach --from)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        lookback: Option<u32>,
    },
    /// Report gaps in stored daily bars
    Gaps {
        #[command(flatten)]
        symbols: SymbolArgs,

        #[arg(long)]
        from: String,

        #[arg(long)]
        to: Option<String>,

        /// Stored dates further apart than this count as a gap
        #[arg(long, default_value_t = DEFAULT_MAX_GAP_DAYS)]
        max_gap_days: i64,
    },
    /// Check whether the upstream currently accepts requests
    Probe,
    /// Write today's bar for stocks from the realtime quote API
    Realtime {
        #[command(flatten)]
        symbols: SymbolArgs,
    },
}

fn load_config(overrides: &ConfigOverrides) -> Result<AppConfig> {
    let mut config = AppConfig::from_env()?;
    overrides.apply(&mut config)?;
    Ok(config)
}

fn dispatch(cli: Cli) -> Result<()> {
    let config = load_config(&cli.overrides)?;

    match cli.command {
        Commands::Sync {
            symbols,
            lookback,
            from,
            to,
            probe_first,
        } => commands::sync::run(config, symbols.source()?, lookback, from, to, probe_first),
        Commands::Indices {
            codes,
            lookback,
            baseline,
            probe_first,
        } => {
            let baseline = ChangeBaseline::from_str(&baseline).map_err(AppError::InvalidInput)?;
            commands::indices::run(config, codes, lookback, baseline, probe_first)
        }
        Commands::Fill {
            symbols,
            from,
            to,
            lookback,
        } => commands::fill::run(config, symbols.source()?, from, to, lookback),
        Commands::Gaps {
            symbols,
            from,
            to,
            max_gap_days,
        } => commands::gaps::run(config, symbols.source()?, from, to, max_gap_days),
        Commands::Probe => commands::probe::run(config),
        Commands::Realtime { symbols } => commands::realtime::run(config, symbols.source()?),
    }
}

pub fn run() {
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli) {
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }
}
