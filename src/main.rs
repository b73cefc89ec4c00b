/*!
 * snmp-alarm CLI
 *
 * One invocation is one polling run: rotate the incident ledger, load
 * exclusions, evaluate every inventory device from the walker's readings
 * file, page, and log the totals. Scheduling is left to cron.
 */

use clap::{Parser, Subcommand, ValueEnum};
use snmp_alarm::{
    config::{LogLevel, MonitorConfig, RegistryBackend},
    core::{
        ledger::{IncidentLedger, LedgerPreview},
        registry::{IncidentStore, PagingStore},
        Poller, SystemClock,
    },
    error::{MonitorError, Result, EXIT_SUCCESS},
    inventory::load_inventory,
    logging,
    pager::{DryRunPager, Pager, PagerDutyClient},
    source::ReadingsFile,
    stats::format_duration,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "snmp-alarm")]
#[command(version, about = "Page on SNMP hardware faults without flooding the paging system", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short = 'c', long = "config", value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Device inventory: hostname[,manufacturer[,model]] per line
    #[arg(short = 'i', long = "inventory", value_name = "PATH", global = true)]
    inventory: Option<PathBuf>,

    /// JSON Lines readings written by the SNMP walker
    #[arg(short = 'r', long = "readings", value_name = "PATH", global = true)]
    readings: Option<PathBuf>,

    /// Log level
    #[arg(long = "log-level", value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Write JSON logs to this file instead of stdout
    #[arg(long = "log", value_name = "PATH", global = true)]
    log: Option<PathBuf>,

    /// Verbose output (debug level)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Log paging calls instead of sending them; state files are left untouched
    #[arg(short = 'n', long = "dry-run", global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll every inventory device once (default)
    Run,

    /// Show the incidents the next run would consider open
    Previous,

    /// Check the configuration and print the device families
    Validate,
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

    let mut config = match cli.config {
        Some(ref path) => MonitorConfig::from_file(path)?,
        None => MonitorConfig::default(),
    };

    // CLI flags override file values
    if let Some(level) = cli.log_level {
        config.log_level = level.into();
    }
    if cli.log.is_some() {
        config.log_file = cli.log.clone();
    }
    if cli.inventory.is_some() {
        config.inventory = cli.inventory.clone();
    }
    if cli.readings.is_some() {
        config.readings = cli.readings.clone();
    }
    config.verbose |= cli.verbose;
    config.dry_run |= cli.dry_run;

    if let Err(e) = logging::init_logging(&config) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_poll(&config),
        Commands::Previous => show_previous(&config),
        Commands::Validate => validate(&config),
    }
}

fn build_pager(config: &MonitorConfig) -> Result<Arc<dyn Pager>> {
    if config.dry_run {
        let inner: Option<Arc<dyn Pager>> = if config.paging.api_token.is_empty() {
            None
        } else {
            Some(Arc::new(PagerDutyClient::new(&config.paging)?))
        };
        return Ok(Arc::new(DryRunPager::new(inner)));
    }

    if config.paging.service_key.is_empty() {
        return Err(MonitorError::Config(
            "paging.service_key is required (or use --dry-run)".to_string(),
        ));
    }
    if config.registry.backend == RegistryBackend::Paging && config.paging.api_token.is_empty() {
        return Err(MonitorError::Config(
            "paging.api_token is required for the paging registry backend".to_string(),
        ));
    }
    Ok(Arc::new(PagerDutyClient::new(&config.paging)?))
}

fn run_poll(config: &MonitorConfig) -> Result<()> {
    let inventory_path = config
        .inventory
        .as_ref()
        .ok_or_else(|| MonitorError::Config("Inventory file required (--inventory)".to_string()))?;
    let readings_path = config
        .readings
        .as_ref()
        .ok_or_else(|| MonitorError::Config("Readings file required (--readings)".to_string()))?;

    // Inputs are loaded before the ledger rotates so a bad input leaves state untouched
    let inventory = load_inventory(inventory_path)?;
    let mut readings = ReadingsFile::load(readings_path).map_err(|e| {
        error!("Not polling, readings unavailable: {}", e);
        MonitorError::from(e)
    })?;

    let pager = build_pager(config)?;
    if config.dry_run {
        info!("Dry run: paging calls are logged, not sent");
    }

    let mut poller = Poller::prepare(config, pager, Box::new(SystemClock))?;
    let totals = poller.run(&inventory, &mut readings);

    info!(
        "Finished polling {} devices ({} skipped) in {}",
        totals.devices(),
        totals.skipped_hosts(),
        format_duration(totals.elapsed())
    );
    Ok(())
}

fn show_previous(config: &MonitorConfig) -> Result<()> {
    let store: Box<dyn IncidentStore> = match config.registry.backend {
        RegistryBackend::File => Box::new(LedgerPreview::new(IncidentLedger::new(
            &config.registry.state_dir,
            &config.registry.file_prefix,
        ))),
        RegistryBackend::Paging => {
            let pager = build_pager(&MonitorConfig {
                dry_run: true,
                ..config.clone()
            })?;
            Box::new(PagingStore::new(
                pager,
                config.paging.open_statuses.clone(),
            ))
        }
    };

    let open = store.load_open()?;
    println!("{} open ({})", open.len(), store.describe());
    for key in open {
        println!("{}", key);
    }
    Ok(())
}

fn validate(config: &MonitorConfig) -> Result<()> {
    config.validate()?;

    println!(
        "Gate: {:02}:00-{:02}:59 for {:?}",
        config.gate.start_hour, config.gate.end_hour, config.gate.gated_classes
    );
    for family in &config.families {
        println!(
            "{}: manufacturers={:?} agent_check={} timeout={}s retries={} overrides={}",
            family.name,
            family.manufacturers,
            family.agent_check,
            family.timeout_secs,
            family.retries,
            family.overrides.len()
        );
        for rule in &family.suppression {
            println!(
                "  {}: {} -> {}",
                rule.flag,
                rule.parents.join(","),
                rule.children.join(",")
            );
        }
    }
    Ok(())
}
