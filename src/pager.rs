/*!
 * Paging system collaborator
 *
 * The engine talks to the paging system only through [`Pager`]. Every call
 * is a single blocking request with a bounded timeout; results are logged
 * by the caller and never retried.
 */

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::PagingConfig;
use crate::core::key::AlarmKey;
use crate::error::{MonitorError, Result};

/// Reference returned by the paging system for an accepted event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentRef(pub String);

pub trait Pager {
    /// Open (or reinforce) the incident for `key`
    fn trigger(&self, key: &AlarmKey, summary: &str, details: &str) -> Result<IncidentRef>;

    /// Close the incident for `key`
    fn resolve(&self, key: &AlarmKey, summary: &str, details: &str) -> Result<IncidentRef>;

    /// Incident keys whose status is one of `statuses`
    fn list_open_incidents(&self, statuses: &[String]) -> Result<Vec<AlarmKey>>;
}

#[derive(Debug, Serialize)]
struct EventRequest<'a> {
    service_key: &'a str,
    event_type: &'a str,
    incident_key: &'a str,
    description: &'a str,
    details: &'a str,
}

#[derive(Debug, Deserialize)]
struct EventResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    incident_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IncidentPage {
    #[serde(default)]
    incidents: Vec<IncidentRecord>,
    #[serde(default)]
    more: bool,
}

#[derive(Debug, Deserialize)]
struct IncidentRecord {
    #[serde(default)]
    incident_key: Option<String>,
}

const PAGE_LIMIT: usize = 100;

/// PagerDuty over HTTP: Events API for trigger/resolve, REST API for listing
pub struct PagerDutyClient {
    http: reqwest::blocking::Client,
    events_url: String,
    api_url: String,
    api_token: String,
    service_key: String,
}

impl PagerDutyClient {
    pub fn new(config: &PagingConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            events_url: config.events_url.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            service_key: config.service_key.clone(),
        })
    }

    fn send_event(
        &self,
        event_type: &str,
        key: &AlarmKey,
        summary: &str,
        details: &str,
    ) -> Result<IncidentRef> {
        let request = EventRequest {
            service_key: &self.service_key,
            event_type,
            incident_key: key.as_str(),
            description: summary,
            details,
        };

        let response = self.http.post(&self.events_url).json(&request).send()?;
        let status = response.status();
        let body: EventResponse = response.json()?;

        if !status.is_success() || body.status != "success" {
            return Err(MonitorError::Paging(format!(
                "{} for {} rejected ({}): {}",
                event_type, key, status, body.message
            )));
        }

        Ok(IncidentRef(
            body.incident_key.unwrap_or_else(|| key.to_string()),
        ))
    }
}

impl Pager for PagerDutyClient {
    fn trigger(&self, key: &AlarmKey, summary: &str, details: &str) -> Result<IncidentRef> {
        self.send_event("trigger", key, summary, details)
    }

    fn resolve(&self, key: &AlarmKey, summary: &str, details: &str) -> Result<IncidentRef> {
        self.send_event("resolve", key, summary, details)
    }

    fn list_open_incidents(&self, statuses: &[String]) -> Result<Vec<AlarmKey>> {
        let url = format!("{}/incidents", self.api_url);
        let mut keys = Vec::new();
        let mut offset = 0;

        loop {
            let mut query: Vec<(&str, String)> = statuses
                .iter()
                .map(|s| ("statuses[]", s.clone()))
                .collect();
            query.push(("limit", PAGE_LIMIT.to_string()));
            query.push(("offset", offset.to_string()));

            let page: IncidentPage = self
                .http
                .get(&url)
                .header("Authorization", format!("Token token={}", self.api_token))
                .header("Accept", "application/vnd.pagerduty+json;version=2")
                .query(&query)
                .send()?
                .error_for_status()?
                .json()?;

            let fetched = page.incidents.len();
            keys.extend(
                page.incidents
                    .into_iter()
                    .filter_map(|i| i.incident_key)
                    .map(AlarmKey::from),
            );
            debug!("Fetched {} open incidents at offset {}", fetched, offset);

            if !page.more || fetched == 0 {
                break;
            }
            offset += fetched;
        }

        Ok(keys)
    }
}

/// Logs what would be sent instead of sending it.
///
/// Listing is still delegated so that resolve decisions in a dry run match
/// what a real run would do.
pub struct DryRunPager {
    inner: Option<Arc<dyn Pager>>,
}

impl DryRunPager {
    pub fn new(inner: Option<Arc<dyn Pager>>) -> Self {
        Self { inner }
    }
}

impl Pager for DryRunPager {
    fn trigger(&self, key: &AlarmKey, summary: &str, details: &str) -> Result<IncidentRef> {
        info!(key = %key, "[dry-run] trigger: {} | {}", summary, details);
        Ok(IncidentRef(key.to_string()))
    }

    fn resolve(&self, key: &AlarmKey, summary: &str, details: &str) -> Result<IncidentRef> {
        info!(key = %key, "[dry-run] resolve: {} | {}", summary, details);
        Ok(IncidentRef(key.to_string()))
    }

    fn list_open_incidents(&self, statuses: &[String]) -> Result<Vec<AlarmKey>> {
        match &self.inner {
            Some(inner) => inner.list_open_incidents(statuses),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_request_shape() {
        let key = AlarmKey::from("snmp/fan/sw1/3");
        let request = EventRequest {
            service_key: "svc",
            event_type: "trigger",
            incident_key: key.as_str(),
            description: "Fan issue detected on sw1",
            details: "State = critical(3)",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["event_type"], "trigger");
        assert_eq!(json["incident_key"], "snmp/fan/sw1/3");
        assert_eq!(json["service_key"], "svc");
    }

    #[test]
    fn test_incident_page_parsing() {
        let body = r#"{
            "incidents": [
                {"id": "P1", "incident_key": "snmp/fan/sw1/3"},
                {"id": "P2", "incident_key": null},
                {"id": "P3"}
            ],
            "limit": 100,
            "offset": 0,
            "more": false
        }"#;
        let page: IncidentPage = serde_json::from_str(body).unwrap();
        assert!(!page.more);
        let keys: Vec<_> = page.incidents.into_iter().filter_map(|i| i.incident_key).collect();
        assert_eq!(keys, vec!["snmp/fan/sw1/3".to_string()]);
    }

    #[test]
    fn test_dry_run_never_fails() {
        let pager = DryRunPager::new(None);
        let key = AlarmKey::from("snmp/connect/sw1");
        assert!(pager.trigger(&key, "down", "timeout").is_ok());
        assert!(pager.resolve(&key, "up", "ok").is_ok());
        assert!(pager
            .list_open_incidents(&["triggered".to_string()])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_unreachable_paging_endpoint_is_an_error() {
        let config = PagingConfig {
            events_url: "http://127.0.0.1:9/create_event.json".to_string(),
            api_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
            ..PagingConfig::default()
        };
        let client = PagerDutyClient::new(&config).unwrap();
        let err = client
            .trigger(&AlarmKey::from("snmp/fan/sw1/3"), "s", "d")
            .unwrap_err();
        assert!(err.is_transient());
    }
}
