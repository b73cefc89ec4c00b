/*!
 * Logging for one polling run
 *
 * Each cron invocation is one run. Without a log file, human-readable lines
 * go to stdout. With one, JSON lines are appended to it so consecutive runs
 * accumulate in the same file. `RUST_LOG` overrides the configured level.
 */

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};

/// HTTP client crates stay at warn unless `RUST_LOG` says otherwise
const QUIET_DEPENDENCIES: &str = "reqwest=warn,hyper=warn,rustls=warn";

/// Install the global subscriber for this run
pub fn init_logging(config: &MonitorConfig) -> Result<()> {
    let filter = run_filter(effective_level(config))?;

    match config.log_file {
        Some(ref path) => {
            let file = open_log_file(path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(file)
                        .with_ansi(false)
                        .with_file(true)
                        .with_line_number(true)
                        .json(),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(false).compact())
                .init();
        }
    }

    Ok(())
}

/// `verbose` forces DEBUG regardless of the configured level
fn effective_level(config: &MonitorConfig) -> Level {
    if config.verbose {
        Level::DEBUG
    } else {
        config.log_level.to_tracing_level()
    }
}

fn run_filter(level: Level) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("snmp_alarm={},{}", level, QUIET_DEPENDENCIES)))
        .map_err(|e| MonitorError::Config(format!("Failed to create log filter: {}", e)))
}

/// Open `path` for appending, creating it and its directory when missing
fn open_log_file(path: &Path) -> Result<File> {
    let log_err = |e: std::io::Error| {
        MonitorError::Config(format!("Failed to open log file '{}': {}", path.display(), e))
    };

    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).map_err(log_err)?;
        }
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(log_err)
}
