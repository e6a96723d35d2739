#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the market data sync tool.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use entsoe_sync_cli_utils::{IndicatifProgress, MultiProgress, init_logger};
use entsoe_sync_geography::MarketConfig;
use entsoe_sync_ingest::sink::{OutputFormat, PointSink as _, sink_for};
use entsoe_sync_ingest::{
    SyncContext, SyncOutput, neighbor_plan, prices_window, sample_pairs, sync_flows,
    sync_latest_capacity, sync_prices, sync_production, sync_renewable,
};
use entsoe_sync_ingest_models::SyncOptions;
use entsoe_sync_market_models::ContractType;
use entsoe_sync_source::cancel::cancellation;
use entsoe_sync_source::clock::{Clock, FixedClock, SystemClock};
use entsoe_sync_source::registry::all_families;
use entsoe_sync_source::retry::{DEFAULT_BASE_URL, ReqwestTransport, ResilientFetcher};
use entsoe_sync_source::window::{PricePeriod, SubWindow, lookback, parse_instant};
use entsoe_sync_source_models::DocumentFamily;
use secrecy::SecretString;

/// Number of pairs shown by `pairs`.
const PAIR_SAMPLE_SIZE: usize = 10;

#[derive(Parser)]
#[command(name = "entsoe_sync", about = "Transparency platform market data sync")]
struct Cli {
    /// Market configuration file (overrides `ENTSOE_SYNC_CONFIG`; defaults
    /// to the built-in configuration)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct WindowArgs {
    /// Window start (ISO 8601, UTC). Requires `--end`.
    #[arg(long, requires = "end")]
    start: Option<String>,
    /// Window end, exclusive (ISO 8601, UTC). Requires `--start`.
    #[arg(long, requires = "start")]
    end: Option<String>,
    /// Without `--start/--end`: the last N hours up to the next full hour.
    #[arg(long, default_value = "24")]
    hours: u32,
}

#[derive(Args)]
struct RunArgs {
    /// Keep points per zone instead of aggregating per country
    #[arg(long)]
    no_aggregate: bool,
    /// Abort on the first failing zone
    #[arg(long)]
    strict: bool,
    /// Zones fetched at once (1 to 4)
    #[arg(long, default_value = "1")]
    concurrency: usize,
    /// Pause between zones, in milliseconds
    #[arg(long, default_value = "0")]
    delay_ms: u64,
    /// Output format (`json` or `csv`)
    #[arg(long, default_value = "json", value_parser = parse_format)]
    format: OutputFormat,
    /// Output file (defaults to stdout)
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Latest installed capacity per production type
    Capacity {
        /// Country code or `ALL`
        #[arg(long, default_value = "ALL")]
        country: String,
        /// Production type code (e.g. `B16`)
        #[arg(long)]
        psr_type: Option<String>,
        /// Anchor instant instead of the current time (ISO 8601)
        #[arg(long, value_parser = parse_utc)]
        now: Option<DateTime<Utc>>,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Actual generation per production type
    Generation {
        /// Country code or `ALL`
        #[arg(long, default_value = "ALL")]
        country: String,
        /// Production type code (e.g. `B16`)
        #[arg(long)]
        psr_type: Option<String>,
        #[command(flatten)]
        window: WindowArgs,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Day-ahead generation forecast
    Forecast {
        /// Country code or `ALL`
        #[arg(long, default_value = "ALL")]
        country: String,
        /// Production type code (e.g. `B16`)
        #[arg(long)]
        psr_type: Option<String>,
        #[command(flatten)]
        window: WindowArgs,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Wind and solar generation
    Renewable {
        /// Country code or `ALL`
        #[arg(long, default_value = "ALL")]
        country: String,
        /// Comma-separated production types to keep (default `B16,B18,B19`)
        #[arg(long, value_delimiter = ',')]
        psr_types: Vec<String>,
        #[command(flatten)]
        window: WindowArgs,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Day-ahead or intraday prices
    Prices {
        /// Country code or `ALL`
        #[arg(long, default_value = "ALL")]
        country: String,
        /// Contract type (`A01` day-ahead, `A07` intraday)
        #[arg(long, default_value = "A01", value_parser = parse_contract)]
        contract: ContractType,
        /// Named day instead of a window (`today` or `dayahead`)
        #[arg(long, value_parser = parse_period)]
        period: Option<PricePeriod>,
        #[command(flatten)]
        window: WindowArgs,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Cross-border physical flows, both directions of every border
    Flows {
        /// Comma-separated country codes or `ALL`
        #[arg(long, default_value = "ALL")]
        country: String,
        #[command(flatten)]
        window: WindowArgs,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Show the zone pairs `flows` would query, without fetching
    Pairs {
        /// Comma-separated country codes or `ALL`
        #[arg(long, default_value = "ALL")]
        country: String,
    },
    /// List the configured document families
    Families,
}

fn parse_utc(value: &str) -> Result<DateTime<Utc>, String> {
    parse_instant(value).ok_or_else(|| format!("invalid instant: {value}"))
}

fn parse_format(value: &str) -> Result<OutputFormat, String> {
    value
        .parse()
        .map_err(|_| format!("unknown format: {value} (expected json or csv)"))
}

fn parse_contract(value: &str) -> Result<ContractType, String> {
    value
        .parse()
        .map_err(|_| format!("unknown contract type: {value} (expected A01 or A07)"))
}

fn parse_period(value: &str) -> Result<PricePeriod, String> {
    value
        .parse()
        .map_err(|_| format!("unknown period: {value} (expected today or dayahead)"))
}

impl WindowArgs {
    fn resolve(&self, clock: &dyn Clock) -> Result<SubWindow, String> {
        match (&self.start, &self.end) {
            (Some(start), Some(end)) => Ok(SubWindow {
                start: parse_utc(start)?,
                end: parse_utc(end)?,
            }),
            _ => Ok(lookback(clock, self.hours)),
        }
    }
}

impl RunArgs {
    fn options(&self, window: SubWindow) -> SyncOptions {
        let mut options = SyncOptions::new(window.start, window.end);
        options.aggregate = !self.no_aggregate;
        options.strict = self.strict;
        options.concurrency = self.concurrency;
        options.entity_delay = Duration::from_millis(self.delay_ms);
        options
    }
}

fn load_market(cli_path: Option<PathBuf>) -> Result<MarketConfig, Box<dyn std::error::Error>> {
    let path = cli_path.or_else(|| std::env::var_os("ENTSOE_SYNC_CONFIG").map(PathBuf::from));
    Ok(MarketConfig::load(path.as_deref())?)
}

fn read_token() -> Result<SecretString, Box<dyn std::error::Error>> {
    std::env::var("ENTSOE_TOKEN")
        .or_else(|_| std::env::var("ENTSOE_API_KEY"))
        .ok()
        .filter(|t| !t.trim().is_empty())
        .map(SecretString::from)
        .ok_or_else(|| "ENTSOE_TOKEN (or ENTSOE_API_KEY) is not set".into())
}

fn build_context(
    market: MarketConfig,
    clock: Arc<dyn Clock>,
    multi: &MultiProgress,
    label: &str,
) -> Result<SyncContext, Box<dyn std::error::Error>> {
    let base_url =
        std::env::var("ENTSOE_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    let fetcher = ResilientFetcher::new(Arc::new(ReqwestTransport::new()?), base_url, read_token()?);

    let (handle, cancel) = cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling outstanding requests...");
            handle.cancel();
        }
    });

    Ok(SyncContext::new(fetcher, market)
        .with_clock(clock)
        .with_cancellation(cancel)
        .with_progress(IndicatifProgress::entities_bar(multi, label)))
}

fn write_output(output: &SyncOutput, run: &RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    if output.summary.failed > 0 {
        log::warn!("{}", output.summary);
    }

    if let Some(path) = &run.output {
        let writer = BufWriter::new(File::create(path)?);
        sink_for(run.format, writer).write_points(&output.points)?;
        log::info!("Wrote {} points to {}", output.points.len(), path.display());
    } else {
        let stdout = std::io::stdout();
        sink_for(run.format, stdout.lock()).write_points(&output.points)?;
    }

    Ok(())
}

#[allow(clippy::too_many_lines)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let multi = init_logger();
    let cli = Cli::parse();
    let system_clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let start = Instant::now();

    match cli.command {
        Commands::Families => {
            println!("{:<12} {:<6} {:<8} {:<6} NAME", "FAMILY", "DOC", "PROCESS", "AGG");
            println!("{}", "-".repeat(70));
            for def in all_families() {
                println!(
                    "{:<12} {:<6} {:<8} {:<6} {}",
                    def.family.as_ref(),
                    def.document_type,
                    def.process_type.as_deref().unwrap_or("-"),
                    def.aggregate.as_ref(),
                    def.name
                );
            }
            return Ok(());
        }
        Commands::Pairs { country } => {
            let market = load_market(cli.config)?;
            let plan = neighbor_plan(&market, &country)?;

            let mut out = std::io::stdout().lock();
            writeln!(out, "Zone pairs: {}", plan.pairs.len())?;
            writeln!(out, "Country edges: {}", plan.country_edges.len())?;
            for (country, count) in &plan.neighbor_counts {
                writeln!(out, "  {country}: {count} neighbor(s)")?;
            }
            if !plan.missing_neighbor_config.is_empty() {
                writeln!(
                    out,
                    "No neighbor config: {}",
                    plan.missing_neighbor_config.join(", ")
                )?;
            }
            if !plan.skipped_no_mapping.is_empty() {
                writeln!(
                    out,
                    "Skipped (no zone mapping): {}",
                    plan.skipped_no_mapping
                        .iter()
                        .map(String::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                )?;
            }
            for pair in sample_pairs(&plan.pairs, PAIR_SAMPLE_SIZE) {
                writeln!(out, "  {pair}")?;
            }
            return Ok(());
        }
        Commands::Capacity {
            country,
            psr_type,
            now,
            run,
        } => {
            let clock: Arc<dyn Clock> =
                now.map_or(system_clock, |now| Arc::new(FixedClock(now)) as Arc<dyn Clock>);
            let window = lookback(clock.as_ref(), 0);
            let ctx = build_context(load_market(cli.config)?, clock, &multi, "capacity")?;
            let output =
                sync_latest_capacity(&ctx, &country, psr_type, &run.options(window)).await?;
            write_output(&output, &run)?;
        }
        Commands::Generation {
            country,
            psr_type,
            window,
            run,
        } => {
            let window = window.resolve(system_clock.as_ref())?;
            let ctx = build_context(load_market(cli.config)?, system_clock, &multi, "generation")?;
            let output = sync_production(
                &ctx,
                DocumentFamily::Generation,
                &country,
                psr_type,
                &run.options(window),
            )
            .await?;
            write_output(&output, &run)?;
        }
        Commands::Forecast {
            country,
            psr_type,
            window,
            run,
        } => {
            let window = window.resolve(system_clock.as_ref())?;
            let ctx = build_context(load_market(cli.config)?, system_clock, &multi, "forecast")?;
            let output = sync_production(
                &ctx,
                DocumentFamily::Forecast,
                &country,
                psr_type,
                &run.options(window),
            )
            .await?;
            write_output(&output, &run)?;
        }
        Commands::Renewable {
            country,
            psr_types,
            window,
            run,
        } => {
            let window = window.resolve(system_clock.as_ref())?;
            let ctx = build_context(load_market(cli.config)?, system_clock, &multi, "renewable")?;
            let output = sync_renewable(&ctx, &country, &psr_types, &run.options(window)).await?;
            write_output(&output, &run)?;
        }
        Commands::Prices {
            country,
            contract,
            period,
            window,
            run,
        } => {
            let window = match period {
                Some(period) => prices_window(system_clock.as_ref(), period, contract)?,
                None => window.resolve(system_clock.as_ref())?,
            };
            let ctx = build_context(load_market(cli.config)?, system_clock, &multi, "prices")?;
            let output = sync_prices(&ctx, &country, contract, &run.options(window)).await?;
            write_output(&output, &run)?;
        }
        Commands::Flows {
            country,
            window,
            run,
        } => {
            let window = window.resolve(system_clock.as_ref())?;
            let ctx = build_context(load_market(cli.config)?, system_clock, &multi, "flows")?;
            let output = sync_flows(&ctx, &country, &run.options(window)).await?;
            write_output(&output, &run)?;
        }
    }

    log::info!("Done in {:.1}s", start.elapsed().as_secs_f64());

    Ok(())
}
