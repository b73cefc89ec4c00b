/*!
 * Health verdicts and the component readings that carry them
 */

use serde::{Deserialize, Serialize};

use super::key::AlarmKey;

/// Outcome of evaluating one component against its allowed values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "lowercase")]
pub enum Verdict {
    Healthy(String),
    Unhealthy(String),
}

impl Verdict {
    pub fn healthy(detail: impl Into<String>) -> Self {
        Verdict::Healthy(detail.into())
    }

    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Verdict::Unhealthy(detail.into())
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, Verdict::Healthy(_))
    }

    /// Human-readable detail, used as the incident body
    pub fn detail(&self) -> &str {
        match self {
            Verdict::Healthy(detail) | Verdict::Unhealthy(detail) => detail,
        }
    }
}

/// One evaluated physical component, as produced by a vendor walker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentReading {
    /// Check category, e.g. `fan`, `power`, `hdd`
    pub category: String,

    /// Component index within the device table
    pub index: String,

    pub verdict: Verdict,

    /// Overrides the generated incident summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl ComponentReading {
    pub fn new(category: impl Into<String>, index: impl ToString, verdict: Verdict) -> Self {
        Self {
            category: category.into(),
            index: index.to_string(),
            verdict,
            summary: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn key(&self, host: &str) -> AlarmKey {
        AlarmKey::component(&self.category, host, &self.index)
    }

    /// Summary line sent with the paging call
    pub fn summary_for(&self, host: &str) -> String {
        match &self.summary {
            Some(summary) => summary.clone(),
            None => default_summary(&self.category, host, self.verdict.is_healthy()),
        }
    }
}

/// `Fan issue detected on sw1` / `No fan issues detected`
pub fn default_summary(category: &str, host: &str, healthy: bool) -> String {
    let label = category.replace('_', " ");
    if healthy {
        format!("No {} issues detected", label)
    } else {
        let mut chars = label.chars();
        let capitalized = match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        };
        format!("{} issue detected on {}", capitalized, host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_summaries() {
        assert_eq!(default_summary("fan", "sw1", false), "Fan issue detected on sw1");
        assert_eq!(default_summary("fan", "sw1", true), "No fan issues detected");
        assert_eq!(
            default_summary("power_enclosure", "enc1", false),
            "Power enclosure issue detected on enc1"
        );
    }

    #[test]
    fn test_reading_key_and_summary_override() {
        let reading = ComponentReading::new("psu", 1, Verdict::unhealthy("OperStatus = off(3)"))
            .with_summary("Power supply issue detected on sw1");
        assert_eq!(reading.key("sw1").as_str(), "snmp/psu/sw1/1");
        assert_eq!(reading.summary_for("sw1"), "Power supply issue detected on sw1");
        assert_eq!(reading.verdict.detail(), "OperStatus = off(3)");
        assert!(!reading.verdict.is_healthy());
    }

    #[test]
    fn test_verdict_serde_shape() {
        let json = serde_json::to_string(&Verdict::healthy("ok")).unwrap();
        assert_eq!(json, r#"{"state":"healthy","detail":"ok"}"#);
    }
}
