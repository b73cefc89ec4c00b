/*!
 * Sensor-reading collaborator
 *
 * SNMP walking and vendor field interpretation happen outside this crate.
 * [`SensorSource`] is the seam: it answers whether a device is reachable,
 * whether its vendor sub-agent answers, and yields one verdict per physical
 * component for each named check.
 *
 * [`ReadingsFile`] is the adapter the binary uses: a JSON Lines file written
 * by an external walker, one record per line:
 *
 * ```text
 * {"kind":"connect","host":"sw1","ok":true}
 * {"kind":"agent","host":"srv1","present":true,"version":"11.0"}
 * {"kind":"component","host":"sw1","category":"fan","index":3,"healthy":false,"detail":"State = critical(3)"}
 * {"kind":"error","host":"sw1","check":"fan","index":4,"detail":"no such instance"}
 * {"kind":"error","host":"sw1","check":"temperature","detail":"table not supported"}
 * ```
 *
 * An `error` record with an index is a partial read failure of one
 * component; without an index the whole check failed.
 */

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::verdict::{ComponentReading, Verdict};

/// Everything the walker needs to query one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTarget {
    pub host: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub family: String,
    pub timeout: Duration,
    pub retries: u32,
    pub community: String,
}

impl DeviceTarget {
    pub fn new(host: &str, family: &str) -> Self {
        Self {
            host: host.to_string(),
            manufacturer: None,
            model: None,
            family: family.to_string(),
            timeout: Duration::from_secs(5),
            retries: 3,
            community: "public".to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Device unreachable: {0}")]
    Unreachable(String),

    #[error("Check '{check}' failed: {reason}")]
    Check { check: String, reason: String },

    #[error("Component {check}({index}) unreadable: {reason}")]
    Component {
        check: String,
        index: String,
        reason: String,
    },

    #[error("Failed to read readings file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One component reading, or the reason it could not be read
pub type ComponentResult = Result<ComponentReading, SourceError>;

pub trait SensorSource {
    fn describe(&self) -> String;

    /// Can the device's SNMP agent be reached at all
    fn connect(&mut self, target: &DeviceTarget) -> Result<(), SourceError>;

    /// `Ok(Some(version))` when the vendor sub-agent answers, `Ok(None)` when absent
    fn probe_agent(&mut self, target: &DeviceTarget) -> Result<Option<String>, SourceError>;

    /// Checks available for this device, in walk order
    fn checks(&self, target: &DeviceTarget) -> Vec<String>;

    /// Walk one check. An outer `Err` means the whole check failed;
    /// inner `Err`s are single unreadable components.
    fn walk(&mut self, target: &DeviceTarget, check: &str) -> Result<Vec<ComponentResult>, SourceError>;
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Record {
    Connect {
        host: String,
        ok: bool,
        #[serde(default)]
        detail: String,
    },
    Agent {
        host: String,
        present: bool,
        #[serde(default)]
        version: Option<String>,
    },
    Component {
        host: String,
        category: String,
        index: serde_json::Value,
        healthy: bool,
        #[serde(default)]
        detail: String,
        #[serde(default)]
        summary: Option<String>,
    },
    Error {
        host: String,
        check: String,
        #[serde(default)]
        index: Option<serde_json::Value>,
        detail: String,
    },
}

fn index_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone)]
enum Item {
    Reading(ComponentReading),
    Unreadable { index: String, reason: String },
}

#[derive(Debug, Clone, Default)]
struct CheckRecords {
    items: Vec<Item>,
    failure: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct HostRecords {
    connect: Option<Result<(), String>>,
    agent: Option<Option<String>>,
    checks: Vec<(String, CheckRecords)>,
}

impl HostRecords {
    fn check_mut(&mut self, name: &str) -> &mut CheckRecords {
        let pos = match self.checks.iter().position(|(n, _)| n == name) {
            Some(pos) => pos,
            None => {
                self.checks.push((name.to_string(), CheckRecords::default()));
                self.checks.len() - 1
            }
        };
        &mut self.checks[pos].1
    }
}

/// Readings captured by an external walker, grouped per host
#[derive(Debug, Clone, Default)]
pub struct ReadingsFile {
    origin: String,
    hosts: HashMap<String, HostRecords>,
    skipped_lines: usize,
}

impl ReadingsFile {
    pub fn load(path: &Path) -> Result<Self, SourceError> {
        let contents = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut readings = Self::parse(&contents);
        readings.origin = path.display().to_string();
        Ok(readings)
    }

    /// Parse JSON Lines. Malformed lines are logged and skipped.
    pub fn parse(contents: &str) -> Self {
        let mut readings = Self {
            origin: "inline".to_string(),
            ..Self::default()
        };

        for (n, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match serde_json::from_str::<Record>(line) {
                Ok(record) => readings.add(record),
                Err(e) => {
                    warn!("Skipping readings line {}: {}", n + 1, e);
                    readings.skipped_lines += 1;
                }
            }
        }
        readings
    }

    fn add(&mut self, record: Record) {
        match record {
            Record::Connect { host, ok, detail } => {
                let outcome = if ok { Ok(()) } else { Err(detail) };
                self.host_mut(&host).connect = Some(outcome);
            }
            Record::Agent {
                host,
                present,
                version,
            } => {
                let version = present.then(|| version.unwrap_or_else(|| "unknown".to_string()));
                self.host_mut(&host).agent = Some(version);
            }
            Record::Component {
                host,
                category,
                index,
                healthy,
                detail,
                summary,
            } => {
                let verdict = if healthy {
                    Verdict::Healthy(detail)
                } else {
                    Verdict::Unhealthy(detail)
                };
                let mut reading = ComponentReading::new(category.as_str(), index_string(&index), verdict);
                if let Some(summary) = summary {
                    reading = reading.with_summary(summary);
                }
                self.host_mut(&host)
                    .check_mut(&category)
                    .items
                    .push(Item::Reading(reading));
            }
            Record::Error {
                host,
                check,
                index,
                detail,
            } => {
                let records = self.host_mut(&host).check_mut(&check);
                match index {
                    Some(index) => records.items.push(Item::Unreadable {
                        index: index_string(&index),
                        reason: detail,
                    }),
                    None => records.failure = Some(detail),
                }
            }
        }
    }

    // Hostnames match case-insensitively, like the inventory
    fn host_mut(&mut self, host: &str) -> &mut HostRecords {
        self.hosts.entry(host.to_lowercase()).or_default()
    }

    fn host(&self, host: &str) -> Option<&HostRecords> {
        self.hosts.get(&host.to_lowercase())
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }
}

impl SensorSource for ReadingsFile {
    fn describe(&self) -> String {
        format!("readings file {}", self.origin)
    }

    fn connect(&mut self, target: &DeviceTarget) -> Result<(), SourceError> {
        match self.host(&target.host) {
            None => Err(SourceError::Unreachable("no readings for host".to_string())),
            Some(records) => match &records.connect {
                Some(Err(reason)) => Err(SourceError::Unreachable(reason.clone())),
                Some(Ok(())) | None => Ok(()),
            },
        }
    }

    fn probe_agent(&mut self, target: &DeviceTarget) -> Result<Option<String>, SourceError> {
        let agent = self
            .host(&target.host)
            .and_then(|records| records.agent.clone())
            .flatten();
        debug!(host = %target.host, "agent probe: {:?}", agent);
        Ok(agent)
    }

    fn checks(&self, target: &DeviceTarget) -> Vec<String> {
        self.host(&target.host)
            .map(|records| records.checks.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default()
    }

    fn walk(&mut self, target: &DeviceTarget, check: &str) -> Result<Vec<ComponentResult>, SourceError> {
        let records = self
            .host(&target.host)
            .and_then(|h| h.checks.iter().find(|(name, _)| name == check))
            .map(|(_, records)| records);

        let Some(records) = records else {
            return Ok(Vec::new());
        };

        if let Some(reason) = &records.failure {
            return Err(SourceError::Check {
                check: check.to_string(),
                reason: reason.clone(),
            });
        }

        Ok(records
            .items
            .iter()
            .map(|item| match item {
                Item::Reading(reading) => Ok(reading.clone()),
                Item::Unreadable { index, reason } => Err(SourceError::Component {
                    check: check.to_string(),
                    index: index.clone(),
                    reason: reason.clone(),
                }),
            })
            .collect())
    }
}
