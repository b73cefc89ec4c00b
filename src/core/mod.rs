/*!
 * Alarm lifecycle and suppression engine
 */

pub mod dispatcher;
pub mod exclusion;
pub mod gate;
pub mod key;
pub mod ledger;
pub mod poller;
pub mod registry;
pub mod suppression;
pub mod verdict;

pub use dispatcher::{Action, Alarm, AlarmDispatcher, ResolvePolicy};
pub use exclusion::{ExclusionSet, ExclusionStore};
pub use gate::{AlarmClass, Clock, DayNightGate, FixedClock, SystemClock};
pub use key::AlarmKey;
pub use ledger::IncidentLedger;
pub use poller::{poll_device, DeviceOutcome, DeviceReport, Poller};
pub use registry::{IncidentRegistry, IncidentStore, PagingStore};
pub use suppression::{SuppressionContext, SuppressionPolicy, SuppressionRule};
pub use verdict::{ComponentReading, Verdict};
