//! optscan CLI: option and equity scans over a symbol universe.
//!
//! Commands:
//! - `scan cps|wheel`: option scan with the credit-put-spread or wheel analyzer
//! - `equity`: equity regression scan
//! - `rank`: rank the latest (or a given) wheel scan CSV
//! - `loop`: re-run a wheel scan on a timer and alert on high scores

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand, ValueEnum};
use optscan_core::analysis::{Analyzer, CreditPutSpreadAnalyzer, RegressionAnalyzer};
use optscan_core::data::{
    ClientSet, DailyCache, PolygonClient, SyntheticMarket, TradierClient, Universe,
    YChartsRateClient, YahooDividendClient,
};
use optscan_runner::{
    fetch_index, format_ranking, latest_scan, load_scan, rank_contracts, Credentials, LogNotifier,
    LoopMonitor, Notifier, ScanReport, Scanner, Settings, SlackNotifier,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Benchmark the wheel and regression analyzers correlate against.
const INDEX_SYMBOL: &str = "SPY";
const WHEEL_SCAN_PREFIX: &str = "option_wheel_";

#[derive(Parser)]
#[command(name = "optscan", about = "optscan: concurrent options-market scanner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an option scan over a symbol universe.
    Scan {
        /// Option analyzer to run.
        #[arg(value_enum)]
        analyzer: OptionStrategy,

        #[command(flatten)]
        common: ScanArgs,
    },
    /// Run the equity regression scan over a symbol universe.
    Equity {
        #[command(flatten)]
        common: ScanArgs,
    },
    /// Rank wheel-put contracts from a saved scan.
    Rank {
        /// Scan CSV to rank. Defaults to the newest wheel scan in the scan directory.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Path to a TOML settings file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Re-run the wheel scan on a timer and alert on high-scoring contracts.
    Loop {
        #[command(flatten)]
        common: ScanArgs,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OptionStrategy {
    /// Credit put spreads.
    Cps,
    /// Cash-secured puts.
    Wheel,
}

#[derive(Args)]
struct ScanArgs {
    /// Symbols to scan (e.g., AAPL MSFT SPY).
    symbols: Vec<String>,

    /// Universe file (.csv or .toml). Used instead of listed symbols.
    #[arg(long)]
    universe: Option<PathBuf>,

    /// Path to a TOML settings file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use the deterministic offline market instead of live providers.
    #[arg(long, default_value_t = false)]
    synthetic: bool,

    /// Directory for the daily dividend and rate caches.
    #[arg(long, default_value = "cache")]
    cache_dir: PathBuf,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Scan { analyzer, common } => run_option_scan(analyzer, &common),
        Commands::Equity { common } => run_equity_scan(&common),
        Commands::Rank { input, config } => run_rank(input, config.as_deref()),
        Commands::Loop { common } => run_loop(&common),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("optscan=info,reqwest=warn,hyper=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Cancel flag set by Ctrl-C. A second Ctrl-C exits immediately.
fn install_cancel_handler() -> Result<Arc<AtomicBool>> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::Relaxed) {
            std::process::exit(130);
        }
        eprintln!("Cancelling: finishing in-flight symbols...");
    })
    .context("failed to install Ctrl-C handler")?;
    Ok(cancel)
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => Settings::from_file(path)
            .with_context(|| format!("loading settings from {}", path.display())),
        None => Ok(Settings::default()),
    }
}

fn load_universe(args: &ScanArgs) -> Result<Universe> {
    let universe = match (&args.universe, args.symbols.is_empty()) {
        (Some(_), false) => bail!("pass either symbols or --universe, not both"),
        (Some(path), true) => Universe::from_file(path)?,
        (None, false) => Universe::from_list(args.symbols.iter().map(String::as_str))?,
        (None, true) => bail!("no symbols given: list them or pass --universe"),
    };
    Ok(universe)
}

/// Clients for a scan plus the daily caches to persist once it finishes.
struct Market {
    clients: ClientSet,
    caches: Vec<Arc<DailyCache>>,
}

impl Market {
    fn open(args: &ScanArgs) -> Result<Self> {
        let today = Local::now().date_naive();
        if args.synthetic {
            tracing::warn!("using the synthetic market: results are not real quotes");
            return Ok(Self {
                clients: ClientSet::single(Arc::new(SyntheticMarket::new(today))),
                caches: Vec::new(),
            });
        }

        let creds = Credentials::from_env().context("reading provider credentials")?;
        let dividends_cache = Arc::new(DailyCache::open(&args.cache_dir, "dividends", today));
        let rates_cache = Arc::new(DailyCache::open(&args.cache_dir, "risk_free_rate", today));

        let clients = ClientSet {
            options: Arc::new(TradierClient::new(
                creds.tradier_endpoint.as_str(),
                creds.tradier_api_key.as_str(),
            )),
            quotes: Arc::new(PolygonClient::new(
                creds.polygon_v1_endpoint.as_str(),
                creds.polygon_v2_endpoint.as_str(),
                creds.polygon_api_key.as_str(),
            )),
            dividends: Arc::new(
                YahooDividendClient::new(creds.yfinance_endpoint.as_str())
                    .with_cache(dividends_cache.clone()),
            ),
            rates: Arc::new(
                YChartsRateClient::new(creds.ycharts_endpoint.as_str())
                    .with_cache(rates_cache.clone()),
            ),
        };
        Ok(Self {
            clients,
            caches: vec![dividends_cache, rates_cache],
        })
    }

    fn persist_caches(&self) {
        for cache in &self.caches {
            if let Err(e) = cache.persist() {
                tracing::warn!(path = %cache.path().display(), "cache not saved: {e}");
            }
        }
    }
}

fn run_option_scan(strategy: OptionStrategy, args: &ScanArgs) -> Result<()> {
    let settings = load_settings(args.config.as_deref())?;
    let universe = load_universe(args)?;
    let market = Market::open(args)?;
    let scanner = match strategy {
        OptionStrategy::Cps => Scanner::new(
            settings.scan.clone(),
            market.clients.clone(),
            Analyzer::option(CreditPutSpreadAnalyzer::new(settings.cps)),
        ),
        OptionStrategy::Wheel => Scanner::wheel_put(
            settings.scan.clone(),
            market.clients.clone(),
            settings.wheel,
            INDEX_SYMBOL,
        )?,
    };

    let cancel = install_cancel_handler()?;
    let report = scanner
        .with_cancel(cancel)
        .run(&universe);
    market.persist_caches();
    print_summary(&report?);
    Ok(())
}

fn run_equity_scan(args: &ScanArgs) -> Result<()> {
    let settings = load_settings(args.config.as_deref())?;
    let universe = load_universe(args)?;
    let market = Market::open(args)?;
    let index = fetch_index(&market.clients, INDEX_SYMBOL)?;
    let analyzer = Analyzer::equity(RegressionAnalyzer::new(settings.regression, &index));

    let cancel = install_cancel_handler()?;
    let report = Scanner::new(settings.scan.clone(), market.clients.clone(), analyzer)
        .with_cancel(cancel)
        .run(&universe);
    market.persist_caches();
    print_summary(&report?);
    Ok(())
}

fn run_rank(input: Option<PathBuf>, config: Option<&Path>) -> Result<()> {
    let settings = load_settings(config)?;
    let path = match input {
        Some(path) => path,
        None => match latest_scan(&settings.scan.scan_dir, WHEEL_SCAN_PREFIX) {
            Some(path) => path,
            None => bail!(
                "no {WHEEL_SCAN_PREFIX}*.csv scans in {}",
                settings.scan.scan_dir.display()
            ),
        },
    };

    let saved = load_scan(&path)?;
    let ranked = rank_contracts(saved.columns(), &saved.rows, &settings.rank)
        .with_context(|| format!("ranking {}", path.display()))?;

    println!("Ranked {} from {}", ranked.len(), path.display());
    println!();
    print!("{}", format_ranking(&ranked));
    Ok(())
}

fn run_loop(args: &ScanArgs) -> Result<()> {
    let settings = load_settings(args.config.as_deref())?;
    settings.monitor.validate()?;
    let universe = load_universe(args)?;
    let market = Market::open(args)?;

    let notifier: Arc<dyn Notifier> = match Credentials::from_env().ok().and_then(|c| c.slack) {
        Some(slack) => Arc::new(SlackNotifier::new(&slack)),
        None => {
            tracing::info!("no Slack credentials, alerts go to the log");
            Arc::new(LogNotifier)
        }
    };

    let cancel = install_cancel_handler()?;
    let mut monitor = LoopMonitor::new(settings.monitor.clone(), settings.rank, notifier);
    // The index window moves with the calendar, so each pass refetches it.
    let summary = monitor.run(&cancel, || {
        let report = Scanner::wheel_put(
            settings.scan.clone(),
            market.clients.clone(),
            settings.wheel,
            INDEX_SYMBOL,
        )?
        .with_cancel(cancel.clone())
        .with_as_of(today())
        .run(&universe);
        market.persist_caches();
        report
    })?;

    println!(
        "Monitor stopped after {} scans ({} failed), {} alerts sent.",
        summary.iterations, summary.failed_scans, summary.alerts_sent
    );
    Ok(())
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn print_summary(report: &ScanReport) {
    println!();
    println!("=== Scan Result ===");
    println!("Scan:             {}", report.scan_name);
    println!("Result keys:      {}", report.results.len());
    println!("Rows:             {}", report.row_count());
    println!("Fetch failures:   {}", report.fetch_failure_count);
    println!("Analysis errors:  {}", report.analysis_failure_count);
    println!("Skipped:          {}", report.skipped_count);
    println!("Elapsed:          {:.1}s", report.elapsed_secs);
    if report.cancelled {
        println!();
        println!("WARNING: scan was cancelled; results are partial");
    }
    println!();
}
