/*!
 * Parent/child alarm suppression
 *
 * One physical fault often shows up in two SNMP tables: a failed disk also
 * degrades its RAID controller, a dead power supply also degrades the power
 * enclosure. Suppression rules declare, per device family, which parent
 * categories raise a named flag and which child categories stay silent
 * while that flag is raised. The flags live in a [`SuppressionContext`]
 * created fresh for each device.
 */

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One declarative rule: any unhealthy parent raises `flag`, which silences the children
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressionRule {
    pub flag: String,
    pub parents: Vec<String>,
    pub children: Vec<String>,
}

impl SuppressionRule {
    pub fn new(flag: &str, parents: &[&str], children: &[&str]) -> Self {
        Self {
            flag: flag.to_string(),
            parents: parents.iter().map(|s| s.to_string()).collect(),
            children: children.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Suppression rule '{flag}' has no parent categories")]
    NoParents { flag: String },

    #[error("Suppression rules form a cycle through category '{category}'")]
    Cycle { category: String },
}

/// Validated parent/child relationships for one device family
#[derive(Debug, Clone, Default)]
pub struct SuppressionPolicy {
    rules: Vec<SuppressionRule>,
    ranks: HashMap<String, usize>,
}

impl SuppressionPolicy {
    /// Build a policy, rejecting rules that could never order parents before children
    pub fn new(rules: Vec<SuppressionRule>) -> Result<Self, PolicyError> {
        for rule in &rules {
            if rule.parents.is_empty() {
                return Err(PolicyError::NoParents {
                    flag: rule.flag.clone(),
                });
            }
        }

        let mut policy = Self {
            rules,
            ranks: HashMap::new(),
        };
        let categories: BTreeSet<String> = policy
            .rules
            .iter()
            .flat_map(|r| r.parents.iter().chain(r.children.iter()).cloned())
            .collect();
        for category in categories {
            let rank = policy.compute_rank(&category, &mut Vec::new())?;
            policy.ranks.insert(category, rank);
        }
        Ok(policy)
    }

    /// A policy with no relationships; nothing is ever suppressed
    pub fn none() -> Self {
        Self::default()
    }

    /// HP servers: a failed disk or array accelerator silences its controller
    pub fn array_controller() -> Self {
        let rules = vec![SuppressionRule::new(
            "storage_alarm",
            &["hdd", "accelerator"],
            &["controller"],
        )];
        Self::new(rules).unwrap_or_default()
    }

    /// Blade enclosures: a failed power supply silences the power enclosure,
    /// and any failed sub-component silences the enclosure-level alarm
    pub fn blade_enclosure() -> Self {
        let rules = vec![
            SuppressionRule::new("power_alarm", &["power"], &["power_enclosure"]),
            SuppressionRule::new(
                "any_alarm",
                &["fan", "temperature", "power", "power_enclosure", "manager", "blade"],
                &["enclosure"],
            ),
        ];
        // Built-in rules are acyclic
        Self::new(rules).unwrap_or_default()
    }

    pub fn rules(&self) -> &[SuppressionRule] {
        &self.rules
    }

    /// Evaluation order: 0 for categories no rule silences, otherwise one
    /// more than the deepest parent that can silence it.
    pub fn rank(&self, category: &str) -> usize {
        self.ranks.get(category).copied().unwrap_or(0)
    }

    pub fn is_child(&self, category: &str) -> bool {
        self.rank(category) > 0
    }

    /// Flags raised when `category` is unhealthy
    pub fn flags_raised_by<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.rules
            .iter()
            .filter(move |r| r.parents.iter().any(|p| p == category))
            .map(|r| r.flag.as_str())
    }

    /// Flags that silence `category`
    pub fn flags_governing<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.rules
            .iter()
            .filter(move |r| r.children.iter().any(|c| c == category))
            .map(|r| r.flag.as_str())
    }

    fn compute_rank(&self, category: &str, path: &mut Vec<String>) -> Result<usize, PolicyError> {
        if path.iter().any(|c| c == category) {
            return Err(PolicyError::Cycle {
                category: category.to_string(),
            });
        }
        path.push(category.to_string());

        let mut rank = 0;
        for rule in self.rules.iter().filter(|r| r.children.iter().any(|c| c == category)) {
            for parent in &rule.parents {
                rank = rank.max(self.compute_rank(parent, path)? + 1);
            }
        }

        path.pop();
        Ok(rank)
    }
}

/// Per-device record of which suppression flags have been raised
#[derive(Debug)]
pub struct SuppressionContext<'p> {
    policy: &'p SuppressionPolicy,
    raised: BTreeSet<String>,
}

impl<'p> SuppressionContext<'p> {
    pub fn new(policy: &'p SuppressionPolicy) -> Self {
        Self {
            policy,
            raised: BTreeSet::new(),
        }
    }

    pub fn policy(&self) -> &SuppressionPolicy {
        self.policy
    }

    /// Note a verdict for `category`; unhealthy parents raise their flags
    pub fn observe(&mut self, category: &str, healthy: bool) {
        if healthy {
            return;
        }
        for flag in self.policy.flags_raised_by(category) {
            self.raised.insert(flag.to_string());
        }
    }

    pub fn is_raised(&self, flag: &str) -> bool {
        self.raised.contains(flag)
    }

    /// The raised flag silencing `category`, if any
    pub fn suppressed_by(&self, category: &str) -> Option<String> {
        self.policy
            .flags_governing(category)
            .find(|flag| self.raised.contains(*flag))
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_raises_flag_for_child() {
        let policy = SuppressionPolicy::array_controller();
        let mut ctx = SuppressionContext::new(&policy);

        assert_eq!(ctx.suppressed_by("controller"), None);
        ctx.observe("hdd", true);
        assert_eq!(ctx.suppressed_by("controller"), None);
        ctx.observe("hdd", false);
        assert_eq!(ctx.suppressed_by("controller").as_deref(), Some("storage_alarm"));
        assert_eq!(ctx.suppressed_by("hdd"), None);
    }

    #[test]
    fn test_context_is_per_device() {
        let policy = SuppressionPolicy::array_controller();
        let mut first = SuppressionContext::new(&policy);
        first.observe("accelerator", false);
        assert!(first.is_raised("storage_alarm"));

        let second = SuppressionContext::new(&policy);
        assert!(!second.is_raised("storage_alarm"));
    }

    #[test]
    fn test_ranks_order_chained_rules() {
        let policy = SuppressionPolicy::blade_enclosure();
        assert_eq!(policy.rank("power"), 0);
        assert_eq!(policy.rank("fan"), 0);
        assert_eq!(policy.rank("power_enclosure"), 1);
        assert_eq!(policy.rank("enclosure"), 2);
        assert_eq!(policy.rank("unrelated"), 0);
        assert!(policy.is_child("enclosure"));
    }

    #[test]
    fn test_power_supply_raises_both_flags() {
        let policy = SuppressionPolicy::blade_enclosure();
        let mut ctx = SuppressionContext::new(&policy);
        ctx.observe("power", false);
        assert_eq!(ctx.suppressed_by("power_enclosure").as_deref(), Some("power_alarm"));
        assert_eq!(ctx.suppressed_by("enclosure").as_deref(), Some("any_alarm"));
    }

    #[test]
    fn test_cycle_rejected() {
        let rules = vec![
            SuppressionRule::new("a", &["x"], &["y"]),
            SuppressionRule::new("b", &["y"], &["x"]),
        ];
        assert!(matches!(
            SuppressionPolicy::new(rules),
            Err(PolicyError::Cycle { .. })
        ));
    }

    #[test]
    fn test_rule_without_parents_rejected() {
        let rules = vec![SuppressionRule::new("orphan", &[], &["controller"])];
        assert_eq!(
            SuppressionPolicy::new(rules).unwrap_err(),
            PolicyError::NoParents {
                flag: "orphan".to_string()
            }
        );
    }

    #[test]
    fn test_none_policy_never_suppresses() {
        let policy = SuppressionPolicy::none();
        let mut ctx = SuppressionContext::new(&policy);
        ctx.observe("hdd", false);
        assert_eq!(ctx.suppressed_by("controller"), None);
    }
}
