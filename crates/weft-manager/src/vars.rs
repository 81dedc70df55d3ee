//! The two-level variable store.

use crate::Config;
use parking_lot::RwLock;
use std::collections::BTreeMap;

struct Maps {
    globals: BTreeMap<String, String>,
    rules: BTreeMap<String, BTreeMap<String, String>>,
}

/// Live variable values, global and per rule, behind one lock.
///
/// Lookups and mutations resolve the global scope first, then the rule's
/// locals; rule locals shadow globals only where a global of that name
/// does not exist (validation forbids declaring such shadows).
pub(crate) struct VarStore {
    maps: RwLock<Maps>,
}

impl VarStore {
    /// Seeds the store from the configuration's initial values.
    pub(crate) fn from_config(config: &Config) -> Self {
        let globals = config.vars.clone();
        let rules = config
            .rules
            .iter()
            .map(|(name, rule)| (name.clone(), rule.vars.clone()))
            .collect();

        Self {
            maps: RwLock::new(Maps { globals, rules }),
        }
    }

    /// Reads a variable visible from `rule`.
    pub(crate) fn get(&self, rule: &str, name: &str) -> Option<String> {
        let maps = self.maps.read();
        if let Some(value) = maps.globals.get(name) {
            return Some(value.clone());
        }
        maps.rules.get(rule)?.get(name).cloned()
    }

    /// Writes a variable visible from `rule`; returns `false` when no
    /// such variable exists in either scope.
    pub(crate) fn set(&self, rule: &str, name: &str, value: String) -> bool {
        let mut maps = self.maps.write();
        if let Some(slot) = maps.globals.get_mut(name) {
            *slot = value;
            return true;
        }
        if let Some(slot) = maps.rules.get_mut(rule).and_then(|vars| vars.get_mut(name)) {
            *slot = value;
            return true;
        }
        false
    }

    /// Snapshot of everything visible from `rule`: globals overlaid with
    /// the rule's locals, sorted by name.
    pub(crate) fn scope(&self, rule: &str) -> Vec<(String, String)> {
        let maps = self.maps.read();
        let mut visible = maps.globals.clone();
        if let Some(locals) = maps.rules.get(rule) {
            for (name, value) in locals {
                visible.insert(name.clone(), value.clone());
            }
        }
        visible.into_iter().collect()
    }
}
