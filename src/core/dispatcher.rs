/*!
 * Alarm dispatcher: the per-key paging state machine
 *
 * No state is stored per key. Each decision is inferred from the verdict,
 * the exclusion set, the registry snapshot taken at run start and the
 * device's suppression context:
 *
 * ```text
 * suppression flag raised          -> Suppressed  (log only)
 * Unhealthy + excluded             -> Excluded    (log only)
 * Unhealthy + gated class, closed  -> Gated       (dropped, not queued)
 * Unhealthy                        -> Trigger     (paging system dedupes)
 * Healthy   + open in registry     -> Resolve
 * Healthy   + not open             -> NoOp        (no network call)
 * ```
 *
 * A key open at run start that is neither triggered nor resolved is
 * recorded again, so the incident stays open for the next run.
 *
 * Device-level pseudo-components (`connect`, vendor agent) resolve
 * unconditionally on success: that happens once per device per run, not
 * once per component.
 */

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::exclusion::ExclusionSet;
use super::gate::{AlarmClass, Clock, DayNightGate};
use super::key::AlarmKey;
use super::registry::IncidentRegistry;
use super::suppression::SuppressionContext;
use super::verdict::{ComponentReading, Verdict};
use crate::pager::Pager;
use crate::stats::{CategoryTallies, DispatchCounts};

/// What the dispatcher did with one alarm
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Triggered,
    TriggerFailed,
    Excluded,
    Resolved,
    ResolveFailed,
    NoOp,
    Suppressed { flag: String },
    Gated,
}

impl Action {
    pub fn label(&self) -> &'static str {
        match self {
            Action::Triggered => "triggered",
            Action::TriggerFailed => "trigger_failed",
            Action::Excluded => "excluded",
            Action::Resolved => "resolved",
            Action::ResolveFailed => "resolve_failed",
            Action::NoOp => "no_op",
            Action::Suppressed { .. } => "suppressed",
            Action::Gated => "gated",
        }
    }
}

/// When a healthy verdict may send a resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvePolicy {
    /// Only when the registry holds an open incident for the key
    IfOpen,
    /// Every time (device-level pseudo-components)
    Always,
}

/// One alarm decision request
#[derive(Debug, Clone)]
pub struct Alarm {
    pub key: AlarmKey,
    pub class: AlarmClass,
    pub verdict: Verdict,
    pub summary: String,
    /// Appended to trigger details, e.g. a vendor dispatch line
    pub note: Option<String>,
    pub resolve: ResolvePolicy,
}

impl Alarm {
    pub fn new(key: AlarmKey, class: AlarmClass, verdict: Verdict, summary: impl Into<String>) -> Self {
        Self {
            key,
            class,
            verdict,
            summary: summary.into(),
            note: None,
            resolve: ResolvePolicy::IfOpen,
        }
    }

    pub fn with_note(mut self, note: Option<&str>) -> Self {
        self.note = note.map(str::to_string);
        self
    }

    pub fn resolve_always(mut self) -> Self {
        self.resolve = ResolvePolicy::Always;
        self
    }

    fn trigger_details(&self) -> String {
        match &self.note {
            Some(note) => format!("{} {}", self.verdict.detail(), note),
            None => self.verdict.detail().to_string(),
        }
    }
}

/// Per-run dispatcher owning everything a paging decision needs
pub struct AlarmDispatcher {
    pager: Arc<dyn Pager>,
    exclusions: ExclusionSet,
    registry: IncidentRegistry,
    gate: DayNightGate,
    clock: Box<dyn Clock>,
    counts: DispatchCounts,
}

impl AlarmDispatcher {
    pub fn new(
        pager: Arc<dyn Pager>,
        exclusions: ExclusionSet,
        registry: IncidentRegistry,
        gate: DayNightGate,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            pager,
            exclusions,
            registry,
            gate,
            clock,
            counts: DispatchCounts::default(),
        }
    }

    pub fn registry(&self) -> &IncidentRegistry {
        &self.registry
    }

    pub fn exclusions(&self) -> &ExclusionSet {
        &self.exclusions
    }

    pub fn counts(&self) -> &DispatchCounts {
        &self.counts
    }

    /// Decide and perform the paging action for one alarm.
    ///
    /// `suppressed_by` names a raised suppression flag governing this alarm.
    pub fn dispatch(&mut self, alarm: &Alarm, suppressed_by: Option<&str>) -> Action {
        let action = self.decide_and_send(alarm, suppressed_by);

        // An incident still open after this run must survive the rotation
        let settled = matches!(action, Action::Triggered | Action::Resolved);
        if !settled && self.registry.is_open(&alarm.key) {
            debug!(key = %alarm.key, action = action.label(), "Open incident carried to the next run");
            self.registry.record_triggered(&alarm.key);
        }
        debug!(key = %alarm.key, host = alarm.key.host().unwrap_or(""), action = action.label(), "dispatched");
        self.counts.record(&action);
        action
    }

    fn decide_and_send(&mut self, alarm: &Alarm, suppressed_by: Option<&str>) -> Action {
        let key = &alarm.key;

        if let Some(flag) = suppressed_by {
            info!(key = %key, reason = flag, "PAGER\tAlarm suppressed by related alarm on this device");
            return Action::Suppressed {
                flag: flag.to_string(),
            };
        }

        match &alarm.verdict {
            Verdict::Unhealthy(_) => {
                if self.exclusions.contains(key) {
                    info!(key = %key, "PAGER\tAlarm Excluded");
                    return Action::Excluded;
                }

                let now = self.clock.now();
                if !self.gate.allow(alarm.class, now) {
                    info!(
                        key = %key,
                        class = %alarm.class,
                        "PAGER\tAlarm outside paging window at {}, not sent",
                        now.format("%H:%M")
                    );
                    return Action::Gated;
                }

                match self.pager.trigger(key, &alarm.summary, &alarm.trigger_details()) {
                    Ok(incident) => {
                        info!(key = %key, incident = %incident.0, "PAGER\tCreating Alarm");
                        self.registry.record_triggered(key);
                        Action::Triggered
                    }
                    Err(e) => {
                        warn!(key = %key, "PAGER\tERROR\tFailed to trigger alarm: {}", e);
                        Action::TriggerFailed
                    }
                }
            }
            Verdict::Healthy(detail) => {
                if alarm.resolve == ResolvePolicy::IfOpen && !self.registry.is_open(key) {
                    debug!(key = %key, "No open incident, nothing to resolve");
                    return Action::NoOp;
                }

                match self.pager.resolve(key, &alarm.summary, detail) {
                    Ok(_) => {
                        info!(key = %key, "PAGER\tResolving Open Incident");
                        Action::Resolved
                    }
                    Err(e) => {
                        warn!(key = %key, "PAGER\tERROR\tFailed to resolve alarm: {}", e);
                        Action::ResolveFailed
                    }
                }
            }
        }
    }

    /// Evaluate one component reading: tally it, apply suppression, dispatch,
    /// then let the reading raise any parent flags for later children.
    pub fn evaluate_component(
        &mut self,
        host: &str,
        reading: &ComponentReading,
        ctx: &mut SuppressionContext<'_>,
        tallies: &mut CategoryTallies,
        note: Option<&str>,
    ) -> Action {
        let healthy = reading.verdict.is_healthy();
        tallies.record(&reading.category, healthy);

        if healthy {
            debug!(
                "{}\t{}\tOK for {}({}): {}",
                host,
                reading.category.to_uppercase(),
                reading.category,
                reading.index,
                reading.verdict.detail()
            );
        } else {
            warn!(
                "{}\t{}\tError for {}({}): {}",
                host,
                reading.category.to_uppercase(),
                reading.category,
                reading.index,
                reading.verdict.detail()
            );
        }

        let suppressed_by = ctx.suppressed_by(&reading.category);
        let alarm = Alarm::new(
            reading.key(host),
            AlarmClass::Component,
            reading.verdict.clone(),
            reading.summary_for(host),
        )
        .with_note(note);

        let action = self.dispatch(&alarm, suppressed_by.as_deref());
        ctx.observe(&reading.category, healthy);
        action
    }

    /// Connectivity pseudo-component, evaluated once per device before any table walk
    pub fn connectivity(&mut self, host: &str, outcome: Result<(), String>) -> Action {
        let alarm = match outcome {
            Ok(()) => Alarm::new(
                AlarmKey::connect(host),
                AlarmClass::Connect,
                Verdict::healthy(format!("Successfully connected to {}.", host)),
                format!("SNMP is responding on {}", host),
            ),
            Err(reason) => {
                warn!("{}\tERROR\tUnable to connect: {}", host, reason);
                Alarm::new(
                    AlarmKey::connect(host),
                    AlarmClass::Connect,
                    Verdict::unhealthy(format!("Unable to connect to {}: {}", host, reason)),
                    format!("Unable to query SNMP on {}", host),
                )
            }
        };
        self.dispatch(&alarm.resolve_always(), None)
    }

    /// Vendor sub-agent pseudo-component.
    ///
    /// `Ok(Some(_))` means the agent answered, `Ok(None)` that it is absent.
    pub fn agent(&mut self, family: &str, host: &str, outcome: Result<Option<String>, String>) -> Action {
        let key = AlarmKey::agent(family, host);
        let alarm = match outcome {
            Ok(Some(version)) => Alarm::new(
                key,
                AlarmClass::Agent,
                Verdict::healthy(format!(
                    "Successfully queried {} SNMP agent on {} ({}).",
                    family, host, version
                )),
                format!("{} SNMP agent is responding on {}", family, host),
            ),
            Ok(None) => agent_missing(key, family, host, "agent did not answer"),
            Err(reason) => agent_missing(key, family, host, &reason),
        };
        self.dispatch(&alarm.resolve_always(), None)
    }

    /// Device-level "found nothing to monitor" check
    pub fn nothing_to_monitor(&mut self, host: &str, evaluated: u64) -> Action {
        let key = AlarmKey::components(host);
        let alarm = if evaluated == 0 {
            warn!("{}\tERROR\tDid not find any hardware components to monitor", host);
            Alarm::new(
                key,
                AlarmClass::Components,
                Verdict::unhealthy("Did not find any hardware components to monitor"),
                format!(
                    "Unable to monitor any values on {}. Make sure snmpd and the vendor agent are working correctly.",
                    host
                ),
            )
        } else {
            Alarm::new(
                key,
                AlarmClass::Components,
                Verdict::healthy(format!("Monitoring {} components", evaluated)),
                format!("Hardware components are being monitored on {}", host),
            )
        };
        self.dispatch(&alarm, None)
    }
}

fn agent_missing(key: AlarmKey, family: &str, host: &str, reason: &str) -> Alarm {
    warn!("{}\tERROR\t{} SNMP agent is not responding: {}", host, family, reason);
    Alarm::new(
        key,
        AlarmClass::Agent,
        Verdict::unhealthy(format!(
            "{} SNMP agent is not responding on {}: {}. Make sure the latest agent is installed and restart snmpd.",
            family, host, reason
        )),
        format!("{} SNMP agent is not responding on {}", family, host),
    )
}
