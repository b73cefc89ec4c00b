/*!
 * Per-run orchestration: inventory in, paging decisions and totals out
 *
 * Devices are evaluated strictly one after another. For each device:
 *
 * 1. connectivity, gated on failure; an unreachable device is skipped
 * 2. vendor agent probe, for families that ask for it
 * 3. every check the walker offers; readings in child categories are held
 *    back and dispatched after all parents, lowest rank first
 * 4. the nothing-to-monitor check
 * 5. one STATS line
 */

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::dispatcher::AlarmDispatcher;
use super::exclusion::{
    ExclusionSet, ExclusionSource, ExclusionStore, FileExclusionSource, MirroredExclusionSource,
};
use super::gate::Clock;
use super::ledger::{IncidentLedger, LedgerPreview};
use super::registry::{IncidentRegistry, IncidentStore, PagingStore};
use super::suppression::{SuppressionContext, SuppressionPolicy};
use super::verdict::ComponentReading;
use crate::config::{ExclusionConfig, FamilyConfig, MonitorConfig, RegistryBackend};
use crate::error::{MonitorError, Result};
use crate::inventory::InventoryEntry;
use crate::pager::Pager;
use crate::source::{DeviceTarget, SensorSource, SourceError};
use crate::stats::{CategoryTallies, RunTotals};

/// How far a device got
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOutcome {
    Polled,
    Unreachable,
    AgentMissing,
}

#[derive(Debug, Clone)]
pub struct DeviceReport {
    pub host: String,
    pub outcome: DeviceOutcome,
    pub tallies: CategoryTallies,
}

/// Load this run's exclusions, mirroring the remote list first when one is configured
pub fn load_exclusions(config: &ExclusionConfig) -> ExclusionSet {
    let source: Box<dyn ExclusionSource> = match &config.mirror_url {
        Some(url) => Box::new(MirroredExclusionSource::new(
            url.clone(),
            config.path.clone(),
            Duration::from_secs(config.timeout_secs),
        )),
        None => Box::new(FileExclusionSource::new(config.path.clone())),
    };

    let mut store = ExclusionStore::new();
    store.load(source.as_ref());
    store.into_set()
}

/// Open the incident registry for this run. Rotation happens here, before any check.
pub fn open_registry(config: &MonitorConfig, pager: Arc<dyn Pager>) -> IncidentRegistry {
    let store: Box<dyn IncidentStore> = match config.registry.backend {
        RegistryBackend::Paging => Box::new(PagingStore::new(
            pager,
            config.paging.open_statuses.clone(),
        )),
        RegistryBackend::File => {
            let ledger = IncidentLedger::new(&config.registry.state_dir, &config.registry.file_prefix);
            if config.dry_run {
                Box::new(LedgerPreview::new(ledger))
            } else {
                Box::new(ledger)
            }
        }
    };
    IncidentRegistry::open(store)
}

/// Evaluate one device end to end
pub fn poll_device(
    dispatcher: &mut AlarmDispatcher,
    family: &FamilyConfig,
    policy: &SuppressionPolicy,
    target: &DeviceTarget,
    source: &mut dyn SensorSource,
) -> DeviceReport {
    let host = target.host.as_str();
    let mut report = DeviceReport {
        host: host.to_string(),
        outcome: DeviceOutcome::Polled,
        tallies: CategoryTallies::new(),
    };

    debug!(
        host,
        family = %family.name,
        timeout_secs = target.timeout.as_secs(),
        retries = target.retries,
        "Polling device"
    );

    match source.connect(target) {
        Ok(()) => {
            dispatcher.connectivity(host, Ok(()));
        }
        Err(e) => {
            dispatcher.connectivity(host, Err(unreachable_reason(e)));
            report.outcome = DeviceOutcome::Unreachable;
            return report;
        }
    }

    if family.agent_check {
        let probe = source.probe_agent(target).map_err(unreachable_reason);
        let present = matches!(probe, Ok(Some(_)));
        dispatcher.agent(&family.name, host, probe);
        if !present {
            report.outcome = DeviceOutcome::AgentMissing;
            return report;
        }
    }

    let note = family.dispatch_note.as_deref();
    let mut ctx = SuppressionContext::new(policy);
    let mut deferred: Vec<ComponentReading> = Vec::new();

    for check in source.checks(target) {
        let items = match source.walk(target, &check) {
            Ok(items) => items,
            Err(e) => {
                error!("{}\t{}\tERROR\tCheck failed, skipping: {}", host, check, e);
                continue;
            }
        };

        for item in items {
            match item {
                Ok(reading) if policy.is_child(&reading.category) => deferred.push(reading),
                Ok(reading) => {
                    dispatcher.evaluate_component(host, &reading, &mut ctx, &mut report.tallies, note);
                }
                Err(e) => {
                    warn!("{}\t{}\tERROR\tSkipping component: {}", host, check, e);
                }
            }
        }
    }

    // Stable: walk order is kept within a rank
    deferred.sort_by_key(|reading| policy.rank(&reading.category));
    for reading in &deferred {
        dispatcher.evaluate_component(host, reading, &mut ctx, &mut report.tallies, note);
    }

    dispatcher.nothing_to_monitor(host, report.tallies.total().checked);

    info!(
        "{}\tSTATS\t(Checked,OK,Error) || {}",
        host,
        report.tallies.summary()
    );
    report
}

fn unreachable_reason(e: SourceError) -> String {
    match e {
        SourceError::Unreachable(reason) => reason,
        other => other.to_string(),
    }
}

/// One polling run over an inventory
pub struct Poller {
    dispatcher: AlarmDispatcher,
    config: MonitorConfig,
    policies: HashMap<String, SuppressionPolicy>,
}

impl Poller {
    pub fn new(config: &MonitorConfig, dispatcher: AlarmDispatcher) -> Result<Self> {
        let mut policies = HashMap::with_capacity(config.families.len());
        for family in &config.families {
            let policy = family.suppression_policy().map_err(|e| {
                MonitorError::Config(format!("family '{}': {}", family.name, e))
            })?;
            policies.insert(family.name.clone(), policy);
        }

        Ok(Self {
            dispatcher,
            config: config.clone(),
            policies,
        })
    }

    /// Load exclusions, open the registry and build the dispatcher
    pub fn prepare(config: &MonitorConfig, pager: Arc<dyn Pager>, clock: Box<dyn Clock>) -> Result<Self> {
        let exclusions = load_exclusions(&config.exclusions);
        let registry = open_registry(config, pager.clone());
        let dispatcher = AlarmDispatcher::new(pager, exclusions, registry, config.gate.to_gate(), clock);
        Self::new(config, dispatcher)
    }

    pub fn dispatcher(&self) -> &AlarmDispatcher {
        &self.dispatcher
    }

    /// Poll every inventory entry in order and log the run totals
    pub fn run(&mut self, inventory: &[InventoryEntry], source: &mut dyn SensorSource) -> RunTotals {
        let mut totals = RunTotals::new();
        let mut seen: HashMap<String, usize> = HashMap::new();
        info!(
            "Polling {} inventory entries using {}",
            inventory.len(),
            source.describe()
        );

        for entry in inventory {
            if self.config.is_invalid_host(&entry.hostname) {
                debug!("{}\tSkipping invalid host", entry.hostname);
                totals.record_skipped();
                continue;
            }

            let count = seen.entry(entry.hostname.to_lowercase()).or_insert(0);
            *count += 1;
            if *count > 1 {
                debug!("{}\tSkipping duplicate inventory entry", entry.hostname);
                totals.record_skipped();
                continue;
            }

            let Some((family, policy)) = self
                .config
                .family_for(entry)
                .and_then(|f| self.policies.get(&f.name).map(|p| (f, p)))
            else {
                debug!(
                    "{}\tNo device family for manufacturer {:?}",
                    entry.hostname, entry.manufacturer
                );
                totals.record_skipped();
                continue;
            };

            let target = family.target_for(entry);
            let report = poll_device(&mut self.dispatcher, family, policy, &target, source);
            totals.record_device(&family.name, &report.tallies);
        }

        totals.log_summary(self.dispatcher.counts());
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gate::{DayNightGate, FixedClock};
    use crate::core::key::AlarmKey;
    use crate::pager::IncidentRef;
    use crate::source::ReadingsFile;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<String>>,
    }

    impl Pager for Recorder {
        fn trigger(&self, key: &AlarmKey, _summary: &str, _details: &str) -> Result<IncidentRef> {
            self.calls.borrow_mut().push(format!("trigger {}", key));
            Ok(IncidentRef(key.to_string()))
        }

        fn resolve(&self, key: &AlarmKey, _summary: &str, _details: &str) -> Result<IncidentRef> {
            self.calls.borrow_mut().push(format!("resolve {}", key));
            Ok(IncidentRef(key.to_string()))
        }

        fn list_open_incidents(&self, _statuses: &[String]) -> Result<Vec<AlarmKey>> {
            Ok(Vec::new())
        }
    }

    fn dispatcher(pager: Arc<Recorder>) -> AlarmDispatcher {
        AlarmDispatcher::new(
            pager,
            ExclusionSet::new(),
            IncidentRegistry::empty(),
            DayNightGate::default(),
            Box::new(FixedClock::at_hour(12)),
        )
    }

    #[test]
    fn test_child_walked_first_is_deferred() {
        let readings = r#"
{"kind":"component","host":"c7000","category":"enclosure","index":1,"healthy":false,"detail":"degraded"}
{"kind":"component","host":"c7000","category":"power_enclosure","index":1,"healthy":false,"detail":"degraded"}
{"kind":"component","host":"c7000","category":"power","index":2,"healthy":false,"detail":"failed"}
"#;
        let mut source = ReadingsFile::parse(readings);
        let pager = Arc::new(Recorder::default());
        let mut d = dispatcher(pager.clone());
        let family = FamilyConfig::new("blade", &["blade"]);
        let policy = SuppressionPolicy::blade_enclosure();

        let report = poll_device(
            &mut d,
            &family,
            &policy,
            &DeviceTarget::new("c7000", "blade"),
            &mut source,
        );

        assert_eq!(report.outcome, DeviceOutcome::Polled);
        let calls = pager.calls.borrow();
        assert_eq!(
            *calls,
            vec![
                "resolve snmp/connect/c7000".to_string(),
                "trigger snmp/power/c7000/2".to_string(),
            ]
        );
        assert_eq!(report.tallies.get("enclosure").failed, 1);
        assert_eq!(report.tallies.get("power_enclosure").failed, 1);
        assert_eq!(d.counts().suppressed, 2);
    }

    #[test]
    fn test_failed_check_and_unreadable_component_do_not_abort_device() {
        let readings = r#"
{"kind":"component","host":"sw1","category":"fan","index":1,"healthy":false,"detail":"critical"}
{"kind":"error","host":"sw1","check":"fan","index":2,"detail":"no such instance"}
{"kind":"component","host":"sw1","category":"fan","index":3,"healthy":true,"detail":"normal"}
{"kind":"error","host":"sw1","check":"temperature","detail":"table not supported"}
{"kind":"component","host":"sw1","category":"psu","index":1,"healthy":false,"detail":"failed"}
"#;
        let mut source = ReadingsFile::parse(readings);
        let pager = Arc::new(Recorder::default());
        let mut d = dispatcher(pager.clone());
        let family = FamilyConfig::new("switch", &["cisco"]);

        let report = poll_device(
            &mut d,
            &family,
            &SuppressionPolicy::none(),
            &DeviceTarget::new("sw1", "switch"),
            &mut source,
        );

        assert_eq!(report.outcome, DeviceOutcome::Polled);
        assert_eq!(report.tallies.get("fan").checked, 2);
        assert_eq!(report.tallies.get("fan").failed, 1);
        assert_eq!(report.tallies.get("temperature").checked, 0);
        assert_eq!(report.tallies.get("psu").failed, 1);
        assert_eq!(
            *pager.calls.borrow(),
            vec![
                "resolve snmp/connect/sw1".to_string(),
                "trigger snmp/fan/sw1/1".to_string(),
                "trigger snmp/psu/sw1/1".to_string(),
            ]
        );
    }

    #[test]
    fn test_unreachable_device_skips_checks() {
        let readings = r#"{"kind":"connect","host":"sw1","ok":false,"detail":"timeout"}"#;
        let mut source = ReadingsFile::parse(readings);
        let pager = Arc::new(Recorder::default());
        let mut d = dispatcher(pager.clone());
        let family = FamilyConfig::new("switch", &["cisco"]);

        let report = poll_device(
            &mut d,
            &family,
            &SuppressionPolicy::none(),
            &DeviceTarget::new("sw1", "switch"),
            &mut source,
        );
        assert_eq!(report.outcome, DeviceOutcome::Unreachable);
        assert!(report.tallies.is_empty());
        assert_eq!(*pager.calls.borrow(), vec!["trigger snmp/connect/sw1".to_string()]);
    }

    #[test]
    fn test_missing_agent_skips_device() {
        let readings = r#"
{"kind":"agent","host":"srv1","present":false}
{"kind":"component","host":"srv1","category":"hdd","index":1,"healthy":false,"detail":"failed"}
"#;
        let mut source = ReadingsFile::parse(readings);
        let pager = Arc::new(Recorder::default());
        let mut d = dispatcher(pager.clone());
        let mut family = FamilyConfig::new("hp", &["hp"]);
        family.agent_check = true;

        let report = poll_device(
            &mut d,
            &family,
            &SuppressionPolicy::array_controller(),
            &DeviceTarget::new("srv1", "hp"),
            &mut source,
        );
        assert_eq!(report.outcome, DeviceOutcome::AgentMissing);
        assert_eq!(
            *pager.calls.borrow(),
            vec![
                "resolve snmp/connect/srv1".to_string(),
                "trigger snmp/hp_agent/srv1".to_string(),
            ]
        );
    }

    #[test]
    fn test_run_skips_invalid_and_unknown_hosts() {
        let readings = r#"
{"kind":"component","host":"sw1","category":"fan","index":3,"healthy":true,"detail":"normal"}
"#;
        let mut source = ReadingsFile::parse(readings);
        let pager = Arc::new(Recorder::default());
        let config = MonitorConfig::default();
        let mut poller = Poller::new(&config, dispatcher(pager.clone())).unwrap();

        let inventory = vec![
            InventoryEntry::new("localhost", Some("Cisco"), None),
            InventoryEntry::new("sw1", Some("Cisco"), None),
            InventoryEntry::new("SW1", Some("Cisco"), None),
            InventoryEntry::new("box1", Some("Acme"), None),
        ];
        let totals = poller.run(&inventory, &mut source);

        assert_eq!(totals.devices(), 1);
        assert_eq!(totals.skipped_hosts(), 3);
        assert_eq!(totals.family("switch").unwrap().tallies.get("fan").ok, 1);
        assert_eq!(poller.dispatcher().counts().no_op, 2);
        assert_eq!(poller.dispatcher().counts().resolved, 1);
    }
}
