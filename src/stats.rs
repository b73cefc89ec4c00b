/*!
 * Run tallies: (checked, ok, failed) per check category, per device family
 *
 * Tallies are purely observational. They roll up from category to device
 * to family and are logged as STATS / TOTAL lines; nothing reads them to
 * make a decision.
 */

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use crate::core::dispatcher::Action;

/// `(checked, ok, failed)` for one category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub checked: u64,
    pub ok: u64,
    pub failed: u64,
}

impl Tally {
    pub fn new(checked: u64, ok: u64, failed: u64) -> Self {
        Self { checked, ok, failed }
    }

    pub fn record(&mut self, healthy: bool) {
        self.checked += 1;
        if healthy {
            self.ok += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn merge(&mut self, other: &Tally) {
        self.checked += other.checked;
        self.ok += other.ok;
        self.failed += other.failed;
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.checked, self.ok, self.failed)
    }
}

/// Tallies keyed by check category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryTallies {
    by_category: BTreeMap<String, Tally>,
}

impl CategoryTallies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, category: &str, healthy: bool) {
        self.by_category
            .entry(category.to_string())
            .or_default()
            .record(healthy);
    }

    pub fn get(&self, category: &str) -> Tally {
        self.by_category.get(category).copied().unwrap_or_default()
    }

    pub fn merge(&mut self, other: &CategoryTallies) {
        for (category, tally) in &other.by_category {
            self.by_category
                .entry(category.clone())
                .or_default()
                .merge(tally);
        }
    }

    pub fn total(&self) -> Tally {
        let mut total = Tally::default();
        for tally in self.by_category.values() {
            total.merge(tally);
        }
        total
    }

    pub fn is_empty(&self) -> bool {
        self.by_category.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tally)> {
        self.by_category.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// `fan(2,2,0) || psu(1,0,1)`
    pub fn summary(&self) -> String {
        if self.by_category.is_empty() {
            return "none".to_string();
        }
        self.by_category
            .iter()
            .map(|(category, tally)| format!("{}{}", category, tally))
            .collect::<Vec<_>>()
            .join(" || ")
    }
}

/// Totals for one device family
#[derive(Debug, Clone, Default, Serialize)]
pub struct FamilyTotals {
    pub devices: u64,
    pub tallies: CategoryTallies,
}

/// Counts of dispatcher outcomes over a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchCounts {
    pub triggered: u64,
    pub trigger_failed: u64,
    pub resolved: u64,
    pub resolve_failed: u64,
    pub excluded: u64,
    pub suppressed: u64,
    pub gated: u64,
    pub no_op: u64,
}

impl DispatchCounts {
    pub fn record(&mut self, action: &Action) {
        match action {
            Action::Triggered => self.triggered += 1,
            Action::TriggerFailed => self.trigger_failed += 1,
            Action::Resolved => self.resolved += 1,
            Action::ResolveFailed => self.resolve_failed += 1,
            Action::Excluded => self.excluded += 1,
            Action::Suppressed { .. } => self.suppressed += 1,
            Action::Gated => self.gated += 1,
            Action::NoOp => self.no_op += 1,
        }
    }

    /// Calls that reached the paging system's trigger or resolve endpoint
    pub fn paging_calls(&self) -> u64 {
        self.triggered + self.trigger_failed + self.resolved + self.resolve_failed
    }
}

/// Run-wide totals, owned by the caller for the duration of one run
#[derive(Debug, Clone)]
pub struct RunTotals {
    families: BTreeMap<String, FamilyTotals>,
    skipped_hosts: u64,
    started: Instant,
}

impl Default for RunTotals {
    fn default() -> Self {
        Self::new()
    }
}

impl RunTotals {
    pub fn new() -> Self {
        Self {
            families: BTreeMap::new(),
            skipped_hosts: 0,
            started: Instant::now(),
        }
    }

    pub fn record_device(&mut self, family: &str, tallies: &CategoryTallies) {
        let totals = self.families.entry(family.to_string()).or_default();
        totals.devices += 1;
        totals.tallies.merge(tallies);
    }

    pub fn record_skipped(&mut self) {
        self.skipped_hosts += 1;
    }

    pub fn family(&self, family: &str) -> Option<&FamilyTotals> {
        self.families.get(family)
    }

    pub fn devices(&self) -> u64 {
        self.families.values().map(|f| f.devices).sum()
    }

    pub fn skipped_hosts(&self) -> u64 {
        self.skipped_hosts
    }

    /// Sum over every family and category
    pub fn grand_total(&self) -> Tally {
        let mut total = Tally::default();
        for family in self.families.values() {
            total.merge(&family.tallies.total());
        }
        total
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Emit one TOTAL line per family, one per alarm category, and the dispatch counts
    pub fn log_summary(&self, dispatch: &DispatchCounts) {
        let mut by_category = CategoryTallies::new();
        for (family, totals) in &self.families {
            info!(
                "TOTAL\tSTATS\t{}\t(Checked,OK,Error) || {} || Devices({})",
                family,
                totals.tallies.summary(),
                totals.devices
            );
            by_category.merge(&totals.tallies);
        }
        for (category, tally) in by_category.iter() {
            info!("TOTAL\tCATEGORY\t{}\t(Checked,OK,Error) {}", category, tally);
        }
        info!(
            "TOTAL\tPAGER\ttriggered={} resolved={} excluded={} suppressed={} gated={} failed={} skipped_hosts={} elapsed={}",
            dispatch.triggered,
            dispatch.resolved,
            dispatch.excluded,
            dispatch.suppressed,
            dispatch.gated,
            dispatch.trigger_failed + dispatch.resolve_failed,
            self.skipped_hosts,
            format_duration(self.elapsed())
        );
    }
}

/// Format duration into human-readable format
pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis() as u64;
    if ms < 1000 {
        return format!("{}ms", ms);
    }

    let seconds = ms / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes % 60, seconds % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}
