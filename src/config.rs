/*!
 * Configuration types for the alarm engine
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::core::gate::{AlarmClass, DayNightGate};
use crate::core::suppression::{PolicyError, SuppressionPolicy, SuppressionRule};
use crate::inventory::InventoryEntry;
use crate::source::DeviceTarget;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Gate hour {0} is out of range (0-23)")]
    GateHour(u32),

    #[error("Device family has an empty name")]
    UnnamedFamily,

    #[error("Device family '{0}' is defined twice")]
    DuplicateFamily(String),

    #[error("Family '{family}': {source}")]
    Suppression {
        family: String,
        #[source]
        source: PolicyError,
    },

    #[error("Family '{family}': invalid host pattern '{pattern}': {reason}")]
    Pattern {
        family: String,
        pattern: String,
        reason: String,
    },
}

/// Main configuration for a polling run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Paging system endpoints and credentials
    #[serde(default)]
    pub paging: PagingConfig,

    /// Where the open-incident snapshot comes from
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Operator-declared alarm keys that never page
    #[serde(default)]
    pub exclusions: ExclusionConfig,

    /// Paging window for gated alarm classes
    #[serde(default)]
    pub gate: GateConfig,

    /// Device families, matched against inventory manufacturers in order
    #[serde(default = "default_families")]
    pub families: Vec<FamilyConfig>,

    /// Hostnames that are never polled
    #[serde(default = "default_invalid_hosts")]
    pub invalid_hosts: Vec<String>,

    /// Device inventory file
    #[serde(default)]
    pub inventory: Option<PathBuf>,

    /// Readings file written by the external walker
    #[serde(default)]
    pub readings: Option<PathBuf>,

    /// Log paging calls instead of sending them
    #[serde(default)]
    pub dry_run: bool,

    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            paging: PagingConfig::default(),
            registry: RegistryConfig::default(),
            exclusions: ExclusionConfig::default(),
            gate: GateConfig::default(),
            families: default_families(),
            invalid_hosts: default_invalid_hosts(),
            inventory: None,
            readings: None,
            dry_run: false,
            log_level: LogLevel::Info,
            log_file: None,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagingConfig {
    /// Events API endpoint used for trigger and resolve
    #[serde(default = "default_events_url")]
    pub events_url: String,

    /// REST API base used to list open incidents
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default)]
    pub api_token: String,

    #[serde(default)]
    pub service_key: String,

    /// Per-request timeout
    #[serde(default = "default_paging_timeout")]
    pub timeout_secs: u64,

    /// Incident statuses that count as open
    #[serde(default = "default_open_statuses")]
    pub open_statuses: Vec<String>,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            events_url: default_events_url(),
            api_url: default_api_url(),
            api_token: String::new(),
            service_key: String::new(),
            timeout_secs: default_paging_timeout(),
            open_statuses: default_open_statuses(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackend {
    /// Live open-incident list from the paging system
    Paging,
    /// This poller's own previous-run file
    #[default]
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub backend: RegistryBackend,

    /// Directory holding `{prefix}_current` and `{prefix}_previous`
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: RegistryBackend::default(),
            state_dir: default_state_dir(),
            file_prefix: default_file_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExclusionConfig {
    /// Newline-delimited alarm keys; a missing file means no exclusions
    #[serde(default = "default_exclusion_path")]
    pub path: PathBuf,

    /// Remote list mirrored into `path` at run start
    #[serde(default)]
    pub mirror_url: Option<String>,

    #[serde(default = "default_mirror_timeout")]
    pub timeout_secs: u64,
}

impl Default for ExclusionConfig {
    fn default() -> Self {
        Self {
            path: default_exclusion_path(),
            mirror_url: None,
            timeout_secs: default_mirror_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default = "default_start_hour")]
    pub start_hour: u32,

    #[serde(default = "default_end_hour")]
    pub end_hour: u32,

    #[serde(default = "default_gated_classes")]
    pub gated_classes: Vec<AlarmClass>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            start_hour: default_start_hour(),
            end_hour: default_end_hour(),
            gated_classes: default_gated_classes(),
        }
    }
}

impl GateConfig {
    pub fn to_gate(&self) -> DayNightGate {
        DayNightGate::new(
            self.start_hour,
            self.end_hour,
            self.gated_classes.iter().copied(),
        )
    }
}

/// One device family: how its devices are routed, probed and suppressed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyConfig {
    pub name: String,

    /// Inventory manufacturer strings routed to this family; `*` matches any
    #[serde(default)]
    pub manufacturers: Vec<String>,

    /// Appended to every trigger's details
    #[serde(default)]
    pub dispatch_note: Option<String>,

    /// Probe the vendor sub-agent after connecting
    #[serde(default)]
    pub agent_check: bool,

    #[serde(default)]
    pub suppression: Vec<SuppressionRule>,

    #[serde(default = "default_snmp_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_snmp_retries")]
    pub retries: u32,

    #[serde(default = "default_community")]
    pub community: String,

    #[serde(default)]
    pub overrides: Vec<HostOverride>,
}

impl FamilyConfig {
    pub fn new(name: &str, manufacturers: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            manufacturers: manufacturers.iter().map(|m| m.to_string()).collect(),
            dispatch_note: None,
            agent_check: false,
            suppression: Vec::new(),
            timeout_secs: default_snmp_timeout(),
            retries: default_snmp_retries(),
            community: default_community(),
            overrides: Vec::new(),
        }
    }

    /// Case-insensitive manufacturer match
    pub fn handles(&self, manufacturer: Option<&str>) -> bool {
        self.manufacturers.iter().any(|m| {
            m == "*"
                || manufacturer
                    .map(|given| given.to_lowercase().contains(&m.to_lowercase()))
                    .unwrap_or(false)
        })
    }

    pub fn suppression_policy(&self) -> Result<SuppressionPolicy, PolicyError> {
        SuppressionPolicy::new(self.suppression.clone())
    }

    /// Walker parameters for one inventory entry, with the first matching override applied
    pub fn target_for(&self, entry: &InventoryEntry) -> DeviceTarget {
        let mut timeout_secs = self.timeout_secs;
        let mut retries = self.retries;
        let mut community = self.community.clone();

        if let Some(o) = self.overrides.iter().find(|o| o.matches(&entry.hostname)) {
            timeout_secs = o.timeout_secs.unwrap_or(timeout_secs);
            retries = o.retries.unwrap_or(retries);
            if let Some(c) = &o.community {
                community = c.clone();
            }
        }

        DeviceTarget {
            host: entry.hostname.clone(),
            manufacturer: entry.manufacturer.clone(),
            model: entry.model.clone(),
            family: self.name.clone(),
            timeout: Duration::from_secs(timeout_secs),
            retries,
            community,
        }
    }
}

/// Per-host walker settings, selected by hostname glob
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostOverride {
    pub pattern: String,

    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub retries: Option<u32>,

    #[serde(default)]
    pub community: Option<String>,
}

impl HostOverride {
    pub fn matches(&self, host: &str) -> bool {
        let options = glob::MatchOptions {
            case_sensitive: false,
            ..Default::default()
        };
        glob::Pattern::new(&self.pattern)
            .map(|p| p.matches_with(host, options))
            .unwrap_or(false)
    }
}

/// Log level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

fn default_events_url() -> String {
    "https://events.pagerduty.com/generic/2010-04-15/create_event.json".to_string()
}

fn default_api_url() -> String {
    "https://api.pagerduty.com".to_string()
}

fn default_paging_timeout() -> u64 {
    10
}

fn default_open_statuses() -> Vec<String> {
    vec!["triggered".to_string(), "acknowledged".to_string()]
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/snmp-alarm")
}

fn default_file_prefix() -> String {
    "snmp_alarms".to_string()
}

fn default_exclusion_path() -> PathBuf {
    PathBuf::from("/etc/snmp-alarm/exclusions")
}

fn default_mirror_timeout() -> u64 {
    10
}

fn default_start_hour() -> u32 {
    7
}

fn default_end_hour() -> u32 {
    19
}

fn default_gated_classes() -> Vec<AlarmClass> {
    vec![AlarmClass::Connect, AlarmClass::Agent]
}

fn default_snmp_timeout() -> u64 {
    5
}

fn default_snmp_retries() -> u32 {
    3
}

fn default_community() -> String {
    "public".to_string()
}

fn default_invalid_hosts() -> Vec<String> {
    vec!["localhost".to_string(), "host".to_string()]
}

/// Families known out of the box: HP servers with array controllers and
/// blade enclosures carry suppression rules, the rest walk flat tables
fn default_families() -> Vec<FamilyConfig> {
    let mut hp = FamilyConfig::new("hp", &["hp", "hewlett"]);
    hp.agent_check = true;
    hp.suppression = SuppressionPolicy::array_controller().rules().to_vec();

    let mut blade = FamilyConfig::new("blade", &["blade"]);
    blade.suppression = SuppressionPolicy::blade_enclosure().rules().to_vec();

    let mut san = FamilyConfig::new("san", &["brocade"]);
    san.timeout_secs = 30;
    san.retries = 1;

    vec![
        blade,
        hp,
        FamilyConfig::new("switch", &["cisco", "arista", "juniper"]),
        san,
        FamilyConfig::new("firewall", &["palo alto", "fortinet"]),
    ]
}

impl MonitorConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: MonitorConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks; credentials are checked where a pager is built
    pub fn validate(&self) -> Result<(), ConfigError> {
        for hour in [self.gate.start_hour, self.gate.end_hour] {
            if hour > 23 {
                return Err(ConfigError::GateHour(hour));
            }
        }

        let mut names = BTreeSet::new();
        for family in &self.families {
            if family.name.trim().is_empty() {
                return Err(ConfigError::UnnamedFamily);
            }
            if !names.insert(family.name.as_str()) {
                return Err(ConfigError::DuplicateFamily(family.name.clone()));
            }
            family
                .suppression_policy()
                .map_err(|source| ConfigError::Suppression {
                    family: family.name.clone(),
                    source,
                })?;
            for o in &family.overrides {
                if let Err(e) = glob::Pattern::new(&o.pattern) {
                    return Err(ConfigError::Pattern {
                        family: family.name.clone(),
                        pattern: o.pattern.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn is_invalid_host(&self, host: &str) -> bool {
        self.invalid_hosts
            .iter()
            .any(|h| h.eq_ignore_ascii_case(host))
    }

    /// First family whose manufacturer list matches the entry
    pub fn family_for(&self, entry: &InventoryEntry) -> Option<&FamilyConfig> {
        self.families
            .iter()
            .find(|f| f.handles(entry.manufacturer.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert_eq!(config.registry.backend, RegistryBackend::File);
        assert_eq!(config.gate.start_hour, 7);
        assert_eq!(config.gate.end_hour, 19);
        assert_eq!(
            config.paging.open_statuses,
            vec!["triggered".to_string(), "acknowledged".to_string()]
        );
        assert!(config.is_invalid_host("LOCALHOST"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_readme_config_example() {
        let toml_str = r#"
            invalid_hosts = ["localhost", "host", "decom-01"]
            log_level = "debug"

            [paging]
            service_key = "abc123"
            api_token = "tok"

            [registry]
            backend = "paging"

            [gate]
            start_hour = 8
            end_hour = 18
            gated_classes = ["connect"]

            [[families]]
            name = "hp"
            manufacturers = ["HP"]
            agent_check = true
            dispatch_note = "***** HP Dispatch: 800-555-0100 *****"

            [[families.suppression]]
            flag = "storage_alarm"
            parents = ["hdd", "accelerator"]
            children = ["controller"]

            [[families.overrides]]
            pattern = "lab-*"
            timeout_secs = 30
            retries = 1
        "#;

        let config: MonitorConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.registry.backend, RegistryBackend::Paging);
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.families.len(), 1);

        let hp = &config.families[0];
        assert!(hp.agent_check);
        assert_eq!(hp.suppression_policy().unwrap().rank("controller"), 1);
        assert!(config.is_invalid_host("decom-01"));

        let gate = config.gate.to_gate();
        assert!(gate.in_window(8));
        assert!(!gate.in_window(19));
    }

    #[test]
    fn test_family_routing() {
        let config = MonitorConfig::default();
        let entry = InventoryEntry::new("srv1", Some("Hewlett-Packard"), None);
        assert_eq!(config.family_for(&entry).unwrap().name, "hp");

        let unknown = InventoryEntry::new("box1", Some("Acme"), None);
        assert!(config.family_for(&unknown).is_none());

        let bare = InventoryEntry::new("box2", None, None);
        assert!(config.family_for(&bare).is_none());
    }

    #[test]
    fn test_host_override_applies() {
        let mut family = FamilyConfig::new("switch", &["cisco"]);
        family.overrides.push(HostOverride {
            pattern: "WAN-*".to_string(),
            timeout_secs: Some(30),
            retries: Some(1),
            community: Some("secret".to_string()),
        });

        let slow = family.target_for(&InventoryEntry::new("wan-edge1", Some("Cisco"), None));
        assert_eq!(slow.timeout, Duration::from_secs(30));
        assert_eq!(slow.retries, 1);
        assert_eq!(slow.community, "secret");

        let normal = family.target_for(&InventoryEntry::new("core1", Some("Cisco"), None));
        assert_eq!(normal.timeout, Duration::from_secs(5));
        assert_eq!(normal.retries, 3);
        assert_eq!(normal.family, "switch");
    }

    #[test]
    fn test_validate_rejects_cycles_and_bad_hours() {
        let mut config = MonitorConfig::default();
        config.gate.end_hour = 24;
        assert!(matches!(config.validate(), Err(ConfigError::GateHour(24))));

        let mut config = MonitorConfig::default();
        config.families[0].suppression = vec![
            SuppressionRule::new("a", &["x"], &["y"]),
            SuppressionRule::new("b", &["y"], &["x"]),
        ];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Suppression { .. })
        ));

        let mut config = MonitorConfig::default();
        let dup = config.families[0].clone();
        config.families.push(dup);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateFamily(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[gate]\nstart_hour = 6").unwrap();
        let config = MonitorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.gate.start_hour, 6);
        assert_eq!(config.gate.end_hour, 19);
        assert!(!config.families.is_empty());

        let mut bad = NamedTempFile::new().unwrap();
        writeln!(bad, "[gate\nstart_hour = ").unwrap();
        assert!(matches!(
            MonitorConfig::from_file(bad.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Error.to_tracing_level(), tracing::Level::ERROR);
        assert_eq!(LogLevel::Debug.to_tracing_level(), tracing::Level::DEBUG);
    }
}
