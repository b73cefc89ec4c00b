/*!
 * Incident registry: which alarm keys currently have an open incident
 *
 * The registry is built once per run and is the sole source of truth for
 * whether a resolve should be sent. Two backings are supported:
 *
 * - a live snapshot of the paging system's open incidents, for when other
 *   pollers or operators may open and close incidents too;
 * - the file-backed [`IncidentLedger`](super::ledger::IncidentLedger), for
 *   when only what this poller triggered last run should count.
 *
 * Any failure degrades to an empty registry: every resolve becomes a no-op.
 */

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{info, warn};

use super::key::AlarmKey;
use crate::error::Result;
use crate::pager::Pager;

/// Backing store for the registry snapshot
pub trait IncidentStore {
    fn describe(&self) -> String;

    /// Prepare for a new run. Called once, before any check executes.
    fn rotate(&mut self) -> Result<()> {
        Ok(())
    }

    /// Keys considered open at the start of this run
    fn load_open(&self) -> Result<BTreeSet<AlarmKey>>;

    /// Remember a key triggered during this run
    fn record_triggered(&mut self, _key: &AlarmKey) -> Result<()> {
        Ok(())
    }
}

/// Open incidents as reported by the paging system
pub struct PagingStore {
    pager: Arc<dyn Pager>,
    statuses: Vec<String>,
}

impl PagingStore {
    pub fn new(pager: Arc<dyn Pager>, statuses: Vec<String>) -> Self {
        Self { pager, statuses }
    }
}

impl IncidentStore for PagingStore {
    fn describe(&self) -> String {
        format!("paging system ({})", self.statuses.join(","))
    }

    fn load_open(&self) -> Result<BTreeSet<AlarmKey>> {
        Ok(self
            .pager
            .list_open_incidents(&self.statuses)?
            .into_iter()
            .collect())
    }
}

/// Read-only view of open incidents for the duration of one run
pub struct IncidentRegistry {
    store: Box<dyn IncidentStore>,
    open: BTreeSet<AlarmKey>,
}

impl IncidentRegistry {
    /// Rotate the store, then snapshot it.
    pub fn open(mut store: Box<dyn IncidentStore>) -> Self {
        if let Err(e) = store.rotate() {
            warn!("Failed to rotate incident store {}: {}", store.describe(), e);
        }

        let open = match store.load_open() {
            Ok(open) => open,
            Err(e) => {
                warn!(
                    "Failed to load open incidents from {}, treating registry as empty: {}",
                    store.describe(),
                    e
                );
                BTreeSet::new()
            }
        };

        info!(
            "Incident registry loaded from {}: {} open",
            store.describe(),
            open.len()
        );
        for key in &open {
            info!(key = %key, "open incident");
        }

        Self { store, open }
    }

    /// A registry with nothing open and nothing persisted
    pub fn empty() -> Self {
        Self {
            store: Box::new(NullStore),
            open: BTreeSet::new(),
        }
    }

    pub fn is_open(&self, key: &AlarmKey) -> bool {
        self.open.contains(key)
    }

    pub fn snapshot(&self) -> &BTreeSet<AlarmKey> {
        &self.open
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    /// Record a key as open with the backing store, either newly triggered
    /// or carried over unresolved. The snapshot itself is not touched:
    /// decisions in this run stay based on the last run.
    pub fn record_triggered(&mut self, key: &AlarmKey) {
        if let Err(e) = self.store.record_triggered(key) {
            warn!(key = %key, "Failed to record triggered alarm: {}", e);
        }
    }
}

struct NullStore;

impl IncidentStore for NullStore {
    fn describe(&self) -> String {
        "nothing".to_string()
    }

    fn load_open(&self) -> Result<BTreeSet<AlarmKey>> {
        Ok(BTreeSet::new())
    }
}
