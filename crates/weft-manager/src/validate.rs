//! Two-phase configuration validation.
//!
//! Phase one collects the global variable names; phase two walks every
//! rule under the scope those names establish. All errors are collected
//! and returned together rather than stopping at the first.

use crate::config::{ActionConfig, ConditionConfig, Config, VarModifierConfig};
use crate::jq::JqRunner;
use crate::ConfigError;
use std::collections::{BTreeMap, BTreeSet};
use weft_event::parse_event_url;

/// Built-in variable names visible to every query.
const BUILTIN_VARS: [&str; 4] = ["_rule", "_trigger", "_event", "_msg"];

/// Checks a parsed configuration, returning every problem found.
///
/// An empty result means the configuration is usable.
#[must_use]
pub fn validate(config: &Config) -> Vec<ConfigError> {
    let mut errors = Vec::new();

    let mut globals: BTreeSet<String> = BTreeSet::new();
    for name in config.vars.keys() {
        if name.starts_with('_') {
            errors.push(ConfigError::ReservedVarName {
                location: "vars".into(),
                name: name.clone(),
            });
        } else {
            globals.insert(name.clone());
        }
    }

    for (rule_name, rule) in &config.rules {
        let rule_location = format!("rules.{rule_name}");

        let mut locals: BTreeSet<String> = BTreeSet::new();
        for name in rule.vars.keys() {
            if name.starts_with('_') {
                errors.push(ConfigError::ReservedVarName {
                    location: format!("{rule_location}.vars"),
                    name: name.clone(),
                });
            } else if globals.contains(name) {
                errors.push(ConfigError::ShadowsGlobal {
                    location: format!("{rule_location}.vars"),
                    name: name.clone(),
                });
            } else {
                locals.insert(name.clone());
            }
        }

        // Query variables visible inside this rule, built-ins included.
        let scope: Vec<String> = globals
            .union(&locals)
            .cloned()
            .chain(BUILTIN_VARS.iter().map(|s| (*s).to_string()))
            .collect();
        let scope_set: BTreeSet<&str> = scope.iter().map(String::as_str).collect();
        let trigger_names: BTreeSet<&str> = rule.triggers.keys().map(String::as_str).collect();

        for (trigger_name, trigger) in &rule.triggers {
            let location = format!("{rule_location}.triggers.{trigger_name}");

            if let Err(source) = parse_event_url(&trigger.event) {
                errors.push(ConfigError::InvalidEvent {
                    location: format!("{location}.event"),
                    source,
                });
            }

            validate_modifiers(&trigger.modify_vars, &scope, &scope_set, &location, &mut errors);
        }

        for (action_name, action) in &rule.actions {
            let location = format!("{rule_location}.actions.{action_name}");
            validate_action(
                action,
                &scope,
                &scope_set,
                &trigger_names,
                &location,
                &mut errors,
            );
        }
    }

    errors
}

fn validate_action(
    action: &ActionConfig,
    scope: &[String],
    scope_set: &BTreeSet<&str>,
    trigger_names: &BTreeSet<&str>,
    location: &str,
    errors: &mut Vec<ConfigError>,
) {
    if let Some(condition) = &action.condition {
        validate_condition(
            condition,
            scope,
            scope_set,
            trigger_names,
            &format!("{location}.if"),
            errors,
        );
    }

    match (&action.event, &action.dynamic_event) {
        (Some(_), Some(_)) => errors.push(ConfigError::InvalidAction {
            location: location.to_string(),
            message: "'event' and 'dynamic-event' are mutually exclusive".into(),
        }),
        (None, None) => errors.push(ConfigError::InvalidAction {
            location: location.to_string(),
            message: "one of 'event' or 'dynamic-event' must be set".into(),
        }),
        (Some(url), None) => {
            if let Err(source) = parse_event_url(url) {
                errors.push(ConfigError::InvalidEvent {
                    location: format!("{location}.event"),
                    source,
                });
            }
        }
        (None, Some(query)) => {
            check_query(query, scope, &format!("{location}.dynamic-event"), errors);
        }
    }

    match &action.data_jq {
        None => errors.push(ConfigError::InvalidAction {
            location: location.to_string(),
            message: "'data-jq' must be set".into(),
        }),
        Some(query) => check_query(query, scope, &format!("{location}.data-jq"), errors),
    }

    validate_modifiers(&action.modify_vars, scope, scope_set, location, errors);
}

fn validate_condition(
    condition: &ConditionConfig,
    scope: &[String],
    scope_set: &BTreeSet<&str>,
    trigger_names: &BTreeSet<&str>,
    location: &str,
    errors: &mut Vec<ConfigError>,
) {
    if condition.and.is_some() && condition.or.is_some() {
        errors.push(ConfigError::InvalidCondition {
            location: location.to_string(),
            message: "'and' and 'or' are mutually exclusive".into(),
        });
    }
    if condition.jq.is_some() && condition.var.is_some() {
        errors.push(ConfigError::InvalidCondition {
            location: location.to_string(),
            message: "'jq' and 'var' are mutually exclusive".into(),
        });
    }

    let has_source = condition.jq.is_some() || condition.var.is_some();
    if condition.is.is_some() && !has_source {
        errors.push(ConfigError::InvalidCondition {
            location: location.to_string(),
            message: "'is' requires a value sourced by 'jq' or 'var'".into(),
        });
    }
    if has_source && condition.is.is_none() {
        errors.push(ConfigError::InvalidCondition {
            location: location.to_string(),
            message: "a value sourced by 'jq' or 'var' needs an 'is' to test against".into(),
        });
    }

    if let Some(query) = &condition.jq {
        check_query(query, scope, &format!("{location}.jq"), errors);
    }
    if let Some(name) = &condition.var {
        let plain = name.trim_start_matches('$');
        if !scope_set.contains(plain) {
            errors.push(ConfigError::UnknownVariable {
                location: format!("{location}.var"),
                name: plain.to_string(),
            });
        }
    }
    if let Some(event) = &condition.event_is {
        if let Err(source) = parse_event_url(event) {
            errors.push(ConfigError::InvalidEvent {
                location: format!("{location}.eventIs"),
                source,
            });
        }
    }
    if let Some(trigger) = &condition.triggered_by {
        if !trigger_names.contains(trigger.as_str()) {
            errors.push(ConfigError::InvalidCondition {
                location: format!("{location}.triggeredBy"),
                message: format!("unknown trigger {trigger:?}"),
            });
        }
    }

    let meaningful = condition.is.is_some()
        || condition.event_is.is_some()
        || condition.triggered_by.is_some()
        || condition.and.is_some()
        || condition.or.is_some();
    if !meaningful {
        errors.push(ConfigError::InvalidCondition {
            location: location.to_string(),
            message: "condition is meaningless: nothing is tested".into(),
        });
    }

    for (index, child) in condition.and.iter().flatten().enumerate() {
        validate_condition(
            child,
            scope,
            scope_set,
            trigger_names,
            &format!("{location}.and[{index}]"),
            errors,
        );
    }
    for (index, child) in condition.or.iter().flatten().enumerate() {
        validate_condition(
            child,
            scope,
            scope_set,
            trigger_names,
            &format!("{location}.or[{index}]"),
            errors,
        );
    }
}

fn validate_modifiers(
    modifiers: &BTreeMap<String, VarModifierConfig>,
    scope: &[String],
    scope_set: &BTreeSet<&str>,
    location: &str,
    errors: &mut Vec<ConfigError>,
) {
    for (name, modifier) in modifiers {
        let location = format!("{location}.modify-vars.{name}");

        if !scope_set.contains(name.as_str()) || name.starts_with('_') {
            errors.push(ConfigError::UnknownVariable {
                location: location.clone(),
                name: name.clone(),
            });
        }

        let operations =
            usize::from(modifier.set.is_some()) + usize::from(modifier.jq.is_some())
                + usize::from(modifier.reset.is_some());
        if operations != 1 {
            errors.push(ConfigError::InvalidModifier {
                location: location.clone(),
                message: "exactly one of 'set', 'jq', or 'reset' must be given".into(),
            });
        } else if modifier.reset == Some(false) {
            errors.push(ConfigError::InvalidModifier {
                location: location.clone(),
                message: "'reset' must be true when given".into(),
            });
        }

        if let Some(query) = &modifier.jq {
            check_query(query, scope, &location, errors);
        }
    }
}

/// Parses and compiles a query under the scope's variables, without
/// executing it.
fn check_query(query: &str, scope: &[String], location: &str, errors: &mut Vec<ConfigError>) {
    if let Err(err) = JqRunner::check(query, scope) {
        errors.push(ConfigError::InvalidQuery {
            location: location.to_string(),
            message: err.to_string(),
        });
    }
}
