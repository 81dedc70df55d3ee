//! The YAML configuration schema.
//!
//! Maps are ordered (`BTreeMap`) so rule evaluation is deterministic for
//! a given configuration.

use crate::ConfigError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

fn default_jq_timeout_ms() -> u64 {
    1_000
}

fn default_jq_iteration_limit() -> usize {
    10_000
}

/// Root configuration for a manager.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL the manager serves the hub at; the node lives under
    /// `{baseURL}/p`.
    #[serde(rename = "baseURL")]
    pub base_url: String,

    /// Port the manager listens on.
    pub port: u16,

    /// Deadline for a single jq evaluation.
    #[serde(rename = "jq-timeout-ms", default = "default_jq_timeout_ms")]
    pub jq_timeout_ms: u64,

    /// Upper bound on outputs consumed from a single jq evaluation.
    #[serde(rename = "jq-iteration-limit", default = "default_jq_iteration_limit")]
    pub jq_iteration_limit: usize,

    /// Global variables and their initial values.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,

    /// The rules, keyed by name.
    #[serde(default)]
    pub rules: BTreeMap<String, RuleConfig>,
}

impl Config {
    /// Reads and parses a configuration file.
    ///
    /// Parsing alone does not make the config usable; pass it through
    /// [`validate`](crate::validate) (or [`Manager::new`]) before use.
    ///
    /// # Errors
    ///
    /// Returns the read or parse failure. The `Vec` shape matches the
    /// validator so callers can report either uniformly.
    ///
    /// [`Manager::new`]: crate::Manager::new
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Vec<ConfigError>> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| {
            vec![ConfigError::Read {
                path: path.display().to_string(),
                source,
            }]
        })?;

        serde_yaml::from_str(&content).map_err(|err| vec![ConfigError::Yaml(err)])
    }
}

/// One rule: local variables, the triggers that fire it, and the actions
/// taken when it fires.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    /// Rule-local variables; they shadow globals inside this rule.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,

    /// Triggers, keyed by name.
    #[serde(default)]
    pub triggers: BTreeMap<String, TriggerConfig>,

    /// Actions, keyed by name.
    #[serde(default)]
    pub actions: BTreeMap<String, ActionConfig>,
}

/// One trigger: the topic that fires it and variable mutations applied
/// before any action runs.
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerConfig {
    /// Event URL whose publishes fire this trigger.
    pub event: String,

    /// Variable mutations applied when the trigger fires.
    #[serde(rename = "modify-vars", default)]
    pub modify_vars: BTreeMap<String, VarModifierConfig>,
}

/// One action: an optional gate, the target event, the data query, and
/// variable mutations.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionConfig {
    /// Condition gating the action.
    #[serde(rename = "if")]
    pub condition: Option<ConditionConfig>,

    /// Literal target event URL.
    pub event: Option<String>,

    /// jq query computing the target event URL; mutually exclusive with
    /// `event`.
    #[serde(rename = "dynamic-event")]
    pub dynamic_event: Option<String>,

    /// jq query computing the published `data` field.
    #[serde(rename = "data-jq")]
    pub data_jq: Option<String>,

    /// Variable mutations applied when the action fires, before its
    /// queries are evaluated.
    #[serde(rename = "modify-vars", default)]
    pub modify_vars: BTreeMap<String, VarModifierConfig>,
}

/// A single-variable mutation: exactly one of the three operations.
#[derive(Debug, Clone, Deserialize)]
pub struct VarModifierConfig {
    /// Set to a literal string.
    pub set: Option<String>,

    /// Set to the rendered result of a jq query.
    pub jq: Option<String>,

    /// Reset to the configured initial value.
    pub reset: Option<bool>,
}

/// One node of a condition tree.
///
/// `jq`/`var` source a value, `is` tests it; `eventIs` and `triggeredBy`
/// test the firing context. Atoms at one node are AND-combined, then
/// combined with the recursive results of `and` or `or` children.
#[derive(Debug, Clone, Deserialize)]
pub struct ConditionConfig {
    /// jq query sourcing the tested value.
    pub jq: Option<String>,

    /// Variable sourcing the tested value (an optional `$` prefix is
    /// accepted).
    pub var: Option<String>,

    /// String the sourced value must equal.
    pub is: Option<String>,

    /// Topic the firing event must equal.
    #[serde(rename = "eventIs")]
    pub event_is: Option<String>,

    /// Trigger name that must have fired the rule.
    #[serde(rename = "triggeredBy")]
    pub triggered_by: Option<String>,

    /// Children AND-combined with this node; mutually exclusive with
    /// `or`.
    pub and: Option<Vec<ConditionConfig>>,

    /// Children OR-combined with this node; mutually exclusive with
    /// `and`.
    pub or: Option<Vec<ConditionConfig>>,
}
