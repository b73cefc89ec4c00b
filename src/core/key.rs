/*!
 * Alarm keys: stable fingerprints for one monitorable fact
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Leading segment shared by every key this engine produces
pub const KEY_PREFIX: &str = "snmp";

/// Category of the connectivity pseudo-component
pub const CONNECT_CATEGORY: &str = "connect";

/// Category raised when a reachable device yields nothing to monitor
pub const COMPONENTS_CATEGORY: &str = "components";

/// Stable string fingerprint: `snmp/{category}/{host}[/{index}]`
///
/// Keys must be identical across runs for the same physical component,
/// otherwise a resolve never finds the trigger it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlarmKey(String);

impl AlarmKey {
    /// Key for one indexed component, e.g. `snmp/fan/sw1/3`
    pub fn component(category: &str, host: &str, index: impl fmt::Display) -> Self {
        AlarmKey(format!("{}/{}/{}/{}", KEY_PREFIX, category, host, index))
    }

    /// Key for a device-level fact, e.g. `snmp/connect/sw1`
    pub fn device(category: &str, host: &str) -> Self {
        AlarmKey(format!("{}/{}/{}", KEY_PREFIX, category, host))
    }

    pub fn connect(host: &str) -> Self {
        Self::device(CONNECT_CATEGORY, host)
    }

    /// Vendor sub-agent key, e.g. `snmp/hp_agent/srv7`
    pub fn agent(family: &str, host: &str) -> Self {
        Self::device(&format!("{}_agent", family.to_lowercase()), host)
    }

    pub fn components(host: &str) -> Self {
        Self::device(COMPONENTS_CATEGORY, host)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The category segment, if the key follows the `snmp/...` layout
    pub fn category(&self) -> Option<&str> {
        self.segments().map(|(category, _)| category)
    }

    /// The host segment, if the key follows the `snmp/...` layout
    pub fn host(&self) -> Option<&str> {
        self.segments().map(|(_, host)| host)
    }

    fn segments(&self) -> Option<(&str, &str)> {
        let mut parts = self.0.splitn(4, '/');
        if parts.next()? != KEY_PREFIX {
            return None;
        }
        let category = parts.next()?;
        let host = parts.next()?;
        Some((category, host))
    }
}

impl fmt::Display for AlarmKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for AlarmKey {
    fn from(raw: String) -> Self {
        AlarmKey(raw)
    }
}

impl From<&str> for AlarmKey {
    fn from(raw: &str) -> Self {
        AlarmKey(raw.to_string())
    }
}

impl AsRef<str> for AlarmKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_key_layout() {
        let key = AlarmKey::component("fan", "sw1", 3);
        assert_eq!(key.as_str(), "snmp/fan/sw1/3");
        assert_eq!(key.category(), Some("fan"));
        assert_eq!(key.host(), Some("sw1"));
    }

    #[test]
    fn test_device_keys() {
        assert_eq!(AlarmKey::connect("sw1").as_str(), "snmp/connect/sw1");
        assert_eq!(AlarmKey::agent("HP", "srv7").as_str(), "snmp/hp_agent/srv7");
        assert_eq!(
            AlarmKey::components("srv7").as_str(),
            "snmp/components/srv7"
        );
    }

    #[test]
    fn test_keys_are_deterministic() {
        assert_eq!(
            AlarmKey::component("power", "enc1", "2.1"),
            AlarmKey::from("snmp/power/enc1/2.1")
        );
    }

    #[test]
    fn test_foreign_key_has_no_segments() {
        let key = AlarmKey::from("manual/ticket/42");
        assert_eq!(key.category(), None);
        assert_eq!(key.host(), None);
    }
}
