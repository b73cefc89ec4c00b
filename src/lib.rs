/*!
 * snmp-alarm - alarm lifecycle and suppression for SNMP hardware pollers
 *
 * Decides, for every evaluated hardware component, whether to open an
 * incident, resolve one, or stay quiet:
 * - exclusion list of alarm keys that never page
 * - incident registry from the paging system or a previous-run file
 * - per-device parent/child suppression declared as data
 * - day/night gate for device-unreachable alarms
 * - per-category (checked, ok, failed) tallies
 */

pub mod config;
pub mod core;
pub mod error;
pub mod inventory;
pub mod logging;
pub mod pager;
pub mod source;
pub mod stats;

// Re-export commonly used types
pub use config::{LogLevel, MonitorConfig, RegistryBackend};
pub use core::{Action, AlarmDispatcher, AlarmKey, Poller, Verdict};
pub use error::{MonitorError, Result};
pub use pager::{DryRunPager, Pager, PagerDutyClient};
pub use source::{ReadingsFile, SensorSource};
pub use stats::{RunTotals, Tally};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
