#![allow(dead_code)]

use std::cell::RefCell;
use std::path::Path;
use std::sync::Arc;

use snmp_alarm::config::MonitorConfig;
use snmp_alarm::core::{
    AlarmDispatcher, AlarmKey, DayNightGate, ExclusionSet, FixedClock, IncidentRegistry,
};
use snmp_alarm::error::{MonitorError, Result};
use snmp_alarm::pager::{IncidentRef, Pager};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Trigger(String),
    Resolve(String),
}

/// In-memory pager that records every call
#[derive(Default)]
pub struct RecordingPager {
    calls: RefCell<Vec<Call>>,
    open: Vec<String>,
    fail_listing: bool,
}

impl RecordingPager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_open(keys: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            open: keys.iter().map(|k| k.to_string()).collect(),
            ..Self::default()
        })
    }

    pub fn failing_listing() -> Arc<Self> {
        Arc::new(Self {
            fail_listing: true,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn triggers(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Trigger(key) => Some(key),
                Call::Resolve(_) => None,
            })
            .collect()
    }

    pub fn resolves(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Resolve(key) => Some(key),
                Call::Trigger(_) => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }
}

impl Pager for RecordingPager {
    fn trigger(&self, key: &AlarmKey, _summary: &str, _details: &str) -> Result<IncidentRef> {
        self.calls
            .borrow_mut()
            .push(Call::Trigger(key.to_string()));
        Ok(IncidentRef(key.to_string()))
    }

    fn resolve(&self, key: &AlarmKey, _summary: &str, _details: &str) -> Result<IncidentRef> {
        self.calls
            .borrow_mut()
            .push(Call::Resolve(key.to_string()));
        Ok(IncidentRef(key.to_string()))
    }

    fn list_open_incidents(&self, _statuses: &[String]) -> Result<Vec<AlarmKey>> {
        if self.fail_listing {
            return Err(MonitorError::Http("connection refused".to_string()));
        }
        Ok(self.open.iter().map(|k| AlarmKey::from(k.as_str())).collect())
    }
}

pub fn dispatcher(
    pager: Arc<RecordingPager>,
    exclusions: ExclusionSet,
    registry: IncidentRegistry,
    hour: u32,
) -> AlarmDispatcher {
    AlarmDispatcher::new(
        pager,
        exclusions,
        registry,
        DayNightGate::default(),
        Box::new(FixedClock::at_hour(hour)),
    )
}

/// Default config with every state file under `dir`
pub fn config_in(dir: &Path) -> MonitorConfig {
    let mut config = MonitorConfig::default();
    config.registry.state_dir = dir.join("state");
    config.exclusions.path = dir.join("exclusions");
    config
}
