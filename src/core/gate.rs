/*!
 * Day/night gate for nuisance-prone alarm classes
 *
 * Device-unreachable style alarms are only allowed to page inside a local
 * hour window. Outside it they are dropped for this evaluation, not queued:
 * the next poll re-evaluates from scratch.
 */

use chrono::{Local, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Classes of alarm the gate distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmClass {
    /// Component health (fans, disks, ...); never gated
    Component,
    /// SNMP agent unreachable
    Connect,
    /// Vendor sub-agent not responding
    Agent,
    /// Reachable device with nothing to monitor
    Components,
}

impl fmt::Display for AlarmClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlarmClass::Component => write!(f, "component"),
            AlarmClass::Connect => write!(f, "connect"),
            AlarmClass::Agent => write!(f, "agent"),
            AlarmClass::Components => write!(f, "components"),
        }
    }
}

/// Source of "now" for gate decisions
pub trait Clock {
    fn now(&self) -> NaiveTime;
}

/// Local wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveTime {
        Local::now().time()
    }
}

/// A clock stuck at one time of day
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveTime);

impl FixedClock {
    /// Clock fixed at the top of `hour`; out-of-range hours clamp to 23:00
    pub fn at_hour(hour: u32) -> Self {
        FixedClock(NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveTime {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayNightGate {
    start_hour: u32,
    end_hour: u32,
    gated: BTreeSet<AlarmClass>,
}

impl Default for DayNightGate {
    fn default() -> Self {
        Self::new(7, 19, [AlarmClass::Connect, AlarmClass::Agent])
    }
}

impl DayNightGate {
    /// Window is `start_hour..=end_hour` local time. A start after the end
    /// describes a window spanning midnight.
    pub fn new(start_hour: u32, end_hour: u32, gated: impl IntoIterator<Item = AlarmClass>) -> Self {
        Self {
            start_hour,
            end_hour,
            gated: gated.into_iter().collect(),
        }
    }

    /// A gate that never blocks anything
    pub fn open() -> Self {
        Self::new(0, 23, [])
    }

    pub fn allow(&self, class: AlarmClass, now: impl Timelike) -> bool {
        if class == AlarmClass::Component || !self.gated.contains(&class) {
            return true;
        }
        self.in_window(now.hour())
    }

    pub fn in_window(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour <= self.end_hour
        } else {
            hour >= self.start_hour || hour <= self.end_hour
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn test_default_window_is_inclusive() {
        let gate = DayNightGate::default();
        assert!(!gate.allow(AlarmClass::Connect, at(6, 59)));
        assert!(gate.allow(AlarmClass::Connect, at(7, 0)));
        assert!(gate.allow(AlarmClass::Connect, at(19, 59)));
        assert!(!gate.allow(AlarmClass::Connect, at(20, 0)));
    }

    #[test]
    fn test_components_bypass_gate() {
        let gate = DayNightGate::new(7, 19, [AlarmClass::Component, AlarmClass::Connect]);
        assert!(gate.allow(AlarmClass::Component, at(3, 0)));
    }

    #[test]
    fn test_ungated_class_always_allowed() {
        let gate = DayNightGate::default();
        assert!(gate.allow(AlarmClass::Components, at(2, 0)));
    }

    #[test]
    fn test_window_across_midnight() {
        let gate = DayNightGate::new(22, 4, [AlarmClass::Connect]);
        assert!(gate.allow(AlarmClass::Connect, at(23, 30)));
        assert!(gate.allow(AlarmClass::Connect, at(3, 0)));
        assert!(!gate.allow(AlarmClass::Connect, at(12, 0)));
    }

    #[test]
    fn test_fixed_clock() {
        assert_eq!(FixedClock::at_hour(9).now(), at(9, 0));
        assert_eq!(FixedClock::at_hour(42).now(), at(23, 0));
    }
}
