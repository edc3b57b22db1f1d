//! ==============================================================================
//! rules.rs - sensor type rule table
//! ==============================================================================
//!
//! purpose:
//!     maps an object type token (second segment of a sensor id) to the
//!     resource suffix holding its value and to its display metadata.
//!     sensors whose type has no rule are not shown at all.
//!
//! ==============================================================================

use crate::config::RuleConfig;
use crate::domain::{DisplayKind, SensorId};
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq)]
pub struct RuleEntry {
    pub type_id: String,
    pub value_suffix: String,
    pub display_units: String,
    pub display_kind: DisplayKind,
}

impl RuleEntry {
    fn new(type_id: &str, value_suffix: &str, display_units: &str, display_kind: DisplayKind) -> Self {
        Self {
            type_id: type_id.to_string(),
            value_suffix: value_suffix.to_string(),
            display_units: display_units.to_string(),
            display_kind,
        }
    }

    /// resource path the value and stat endpoints are queried with
    pub fn resource_for(&self, id: &SensorId) -> String {
        format!("{}{}", id.as_str(), self.value_suffix)
    }
}

#[derive(Clone, Debug)]
pub struct RuleTable {
    entries: HashMap<String, RuleEntry>,
}

impl RuleTable {
    /// ipso temperature, humidity and the light-control object
    pub fn builtin() -> Self {
        let entries = [
            RuleEntry::new("3303", ".5700", "celsius", DisplayKind::Temperature),
            RuleEntry::new("3304", ".5700", "percents", DisplayKind::Humidity),
            RuleEntry::new("1024", ".1", "power", DisplayKind::Bulb),
        ];

        Self {
            entries: entries.into_iter().map(|e| (e.type_id.clone(), e)).collect(),
        }
    }

    /// builtin rules with configured entries layered on top
    pub fn with_overrides(overrides: &[RuleConfig]) -> Self {
        let mut table = Self::builtin();
        for rule in overrides {
            let kind = DisplayKind::from_reported(&rule.kind);
            let entry = RuleEntry::new(&rule.type_id, &rule.value_suffix, &rule.units, kind);
            if table.entries.insert(entry.type_id.clone(), entry).is_some() {
                tracing::debug!(type_id = %rule.type_id, "config rule replaces builtin rule");
            }
        }
        table
    }

    pub fn lookup(&self, id: &SensorId) -> Option<&RuleEntry> {
        id.type_segment().and_then(|token| self.entries.get(token))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::builtin()
    }
}
