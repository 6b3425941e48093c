/*!
 * Spokes CLI - Command Line Interface
 *
 * Configuration layers, later ones winning: defaults, `--config` TOML file,
 * environment variables, command-line flags.
 */

use clap::{Parser, Subcommand, ValueEnum};
use spokes::{
    cli_progress::CliProgressRenderer,
    config::{LogLevel, PipelineConfig},
    error::{Result, SpokesError, EXIT_INTERRUPTED, EXIT_SUCCESS},
    logging,
    progress::ProgressPublisher,
    report,
    selection::SelectionStrategy,
    source::{PostgresSource, StatisticsSource},
    CancelFlag, RoutePipeline, RoutingClient, ValhallaClient,
};
use std::path::PathBuf;
use tracing::{info, warn};

const PROGRESS_BUFFER: usize = 1024;

#[derive(Parser)]
#[command(name = "spokes")]
#[command(
    version,
    about = "Generate bicycle route geometries for the most ridden bike-share station pairs",
    long_about = None
)]
struct Cli {
    /// TOML configuration file
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Global scope: the N most ridden pairs network-wide
    #[arg(long, value_name = "N", conflicts_with_all = ["global_pct", "no_global"])]
    global_top: Option<usize>,

    /// Global scope: pairs covering PCT percent of all trips
    #[arg(long, value_name = "PCT", conflicts_with = "no_global")]
    global_pct: Option<f64>,

    /// Disable the global scope
    #[arg(long)]
    no_global: bool,

    /// Per-station scope: the N most ridden pairs from each station
    #[arg(long, value_name = "N", conflicts_with_all = ["individual_pct", "no_individual"])]
    individual_top: Option<usize>,

    /// Per-station scope: pairs covering PCT percent of each station's trips
    #[arg(long, value_name = "PCT", conflicts_with = "no_individual")]
    individual_pct: Option<f64>,

    /// Disable per-station files
    #[arg(long)]
    no_individual: bool,

    /// Aggregate scope: the N most ridden pairs of every station, one file
    #[arg(long, value_name = "N", conflicts_with_all = ["aggregate_pct", "no_aggregate"])]
    aggregate_top: Option<usize>,

    /// Aggregate scope: per-station coverage of PCT percent, one file
    #[arg(long, value_name = "PCT", conflicts_with = "no_aggregate")]
    aggregate_pct: Option<f64>,

    /// Disable the aggregate scope
    #[arg(long)]
    no_aggregate: bool,

    /// Ignore station pairs with fewer trips
    #[arg(long, value_name = "N")]
    min_trips: Option<u64>,

    /// Parallel routing requests (1 = sequential)
    #[arg(short = 'w', long, value_name = "N")]
    workers: Option<usize>,

    /// Output directory for route files
    #[arg(short = 'o', long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Valhalla base URL
    #[arg(long, value_name = "URL")]
    valhalla_url: Option<String>,

    /// Log level
    #[arg(long, value_enum)]
    log_level: Option<LogLevelArg>,

    /// Write JSON logs to this file instead of stdout
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Verbose output (debug logging, failed routes listed)
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the effective configuration to a TOML file and exit
    InitConfig {
        /// Destination file
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },

    /// Check database and routing service connectivity
    Check,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;

    match &cli.command {
        Some(Commands::InitConfig { path }) => {
            config.to_file(path)?;
            println!("Wrote configuration to {}", path.display());
            return Ok(());
        }
        Some(Commands::Check) => {
            logging::init_logging(&config)?;
            return check(&config);
        }
        None => {}
    }

    config.validate()?;
    logging::init_logging(&config)?;

    let cancel = CancelFlag::new();
    install_interrupt_handler(cancel.clone())?;

    let source = PostgresSource::connect(&config.database)?;
    let client = ValhallaClient::new(&config.valhalla)?;
    let show_progress = config.show_progress;
    let verbose = config.verbose;
    let mut pipeline = RoutePipeline::new(config, source, client)?;

    let renderer = if show_progress {
        let (publisher, subscriber) = ProgressPublisher::new(PROGRESS_BUFFER);
        pipeline = pipeline.with_progress(publisher);
        Some(CliProgressRenderer::new(subscriber, verbose).spawn())
    } else {
        None
    };

    let outcome = pipeline.run(&cancel);
    // Dropping the pipeline closes the progress channel
    drop(pipeline);
    if let Some(handle) = renderer {
        let _ = handle.join();
    }

    let summary = outcome?;
    report::print_summary(&summary);

    if summary.cancelled {
        return Err(SpokesError::Interrupted);
    }
    Ok(())
}

/// File, then environment, then flags
fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    config.apply_env()?;

    let selection = &mut config.selection;
    if let Some(n) = cli.global_top {
        selection.global = Some(SelectionStrategy::top_n(n)?);
    } else if let Some(pct) = cli.global_pct {
        selection.global = Some(SelectionStrategy::coverage(pct)?);
    } else if cli.no_global {
        selection.global = None;
    }

    if let Some(n) = cli.individual_top {
        selection.individual = Some(SelectionStrategy::top_n(n)?);
    } else if let Some(pct) = cli.individual_pct {
        selection.individual = Some(SelectionStrategy::coverage(pct)?);
    } else if cli.no_individual {
        selection.individual = None;
    }

    if let Some(n) = cli.aggregate_top {
        selection.aggregate = Some(SelectionStrategy::top_n(n)?);
    } else if let Some(pct) = cli.aggregate_pct {
        selection.aggregate = Some(SelectionStrategy::coverage(pct)?);
    } else if cli.no_aggregate {
        selection.aggregate = None;
    }

    if let Some(min_trips) = cli.min_trips {
        selection.min_trips = min_trips;
    }
    if let Some(workers) = cli.workers {
        config.generation.workers = workers;
    }
    if let Some(ref dir) = cli.output_dir {
        config.output.base_dir = dir.clone();
    }
    if let Some(ref url) = cli.valhalla_url {
        config.valhalla.base_url = url.clone();
    }
    if let Some(level) = cli.log_level {
        config.log_level = level.into();
    }
    if let Some(ref file) = cli.log_file {
        config.log_file = Some(file.clone());
    }
    if cli.verbose {
        config.verbose = true;
    }
    if cli.no_progress {
        config.show_progress = false;
    }

    Ok(config)
}

fn check(config: &PipelineConfig) -> Result<()> {
    config.validate()?;

    let mut source = PostgresSource::connect(&config.database)?;
    let summary = source.summary()?;
    println!("Database: {}", summary);

    let client = ValhallaClient::new(&config.valhalla)?;
    client
        .status()
        .map_err(|e| SpokesError::ServiceUnavailable(e.to_string()))?;
    println!("Valhalla: {} is ready", config.valhalla.base_url);
    Ok(())
}

/// First Ctrl-C cancels the run (results so far are still written); a
/// second one exits immediately.
fn install_interrupt_handler(cancel: CancelFlag) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    std::thread::Builder::new()
        .name("spokes-signal".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    if cancel.is_cancelled() {
                        std::process::exit(EXIT_INTERRUPTED);
                    }
                    warn!("Interrupt received; finishing in-flight routes and writing output");
                    cancel.cancel();
                }
            });
        })?;

    info!("Press Ctrl-C to stop early and keep the routes generated so far");
    Ok(())
}
