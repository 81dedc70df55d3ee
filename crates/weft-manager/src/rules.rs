//! Trigger evaluation: conditions, variable modifiers, and actions.

use crate::config::{ActionConfig, ConditionConfig, RuleConfig, TriggerConfig, VarModifierConfig};
use crate::manager::Manager;
use crate::RuleError;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::error;
use weft_event::parse_event_url;

/// Everything one trigger firing carries through evaluation.
pub(crate) struct TriggerContext<'a> {
    pub(crate) rule_name: &'a str,
    pub(crate) trigger_name: &'a str,
    pub(crate) rule: &'a RuleConfig,
    pub(crate) trigger: &'a TriggerConfig,
    /// The normalized topic of the sniffed publish.
    pub(crate) event: &'a str,
    /// The decoded message envelope.
    pub(crate) envelope: &'a Value,
    /// The envelope's `data` field, the input of every query.
    pub(crate) input: &'a Value,
}

/// Renders a query result the way variables store values: strings stay
/// bare, everything else is its JSON text.
fn render(value: Option<Value>) -> String {
    match value {
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => "null".to_string(),
    }
}

impl Manager {
    /// Runs one fired trigger: the trigger's own variable modifiers
    /// first, then each action in name order.
    ///
    /// Returns the errors of this invocation; any error aborts the
    /// remainder of the invocation, and the next one starts clean.
    pub(crate) async fn rule_triggered(&self, ctx: &TriggerContext<'_>) -> Vec<RuleError> {
        let mut errors = Vec::new();

        for (name, modifier) in &ctx.trigger.modify_vars {
            if let Err(err) = self.apply_modifier(name, modifier, ctx).await {
                errors.push(err);
            }
        }
        if !errors.is_empty() {
            return errors;
        }

        for action in ctx.rule.actions.values() {
            if let Err(err) = self.fire_action(action, ctx).await {
                errors.push(err);
                break;
            }
        }

        errors
    }

    /// Evaluates one action: condition, the action's modifiers, target
    /// URL, data query, then an asynchronous publish.
    ///
    /// The modifiers run before the queries, so the event-URL and data
    /// queries observe the mutated variable state.
    async fn fire_action(
        &self,
        action: &ActionConfig,
        ctx: &TriggerContext<'_>,
    ) -> Result<(), RuleError> {
        if let Some(condition) = &action.condition {
            if !self.check_condition(condition, ctx).await? {
                return Ok(());
            }
        }

        for (name, modifier) in &action.modify_vars {
            self.apply_modifier(name, modifier, ctx).await?;
        }

        let event_url = match (&action.dynamic_event, &action.event) {
            (Some(query), _) => {
                let value = self.query(query, ctx).await?;
                let Some(Value::String(url)) = value else {
                    return Err(RuleError::DynamicEventNotString);
                };
                parse_event_url(&url)?;
                url
            }
            (None, Some(url)) => url.clone(),
            // Validation guarantees one of the two is present.
            (None, None) => return Ok(()),
        };

        let data_query = action.data_jq.as_deref().unwrap_or(".");
        let data = self.query(data_query, ctx).await?.unwrap_or(Value::Null);

        let node = Arc::clone(self.node());
        tokio::spawn(async move {
            if let Err(err) = node.broadcast_any(&event_url, &data).await {
                error!(event_url, error = %err, "could not publish action event");
            }
        });

        Ok(())
    }

    /// Evaluates a condition tree.
    ///
    /// Atoms at one node are AND-combined; that result is then folded
    /// into the `and`/`or` children. A node with no test fails closed.
    pub(crate) fn check_condition<'a>(
        &'a self,
        condition: &'a ConditionConfig,
        ctx: &'a TriggerContext<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<bool, RuleError>> + Send + 'a>> {
        Box::pin(async move {
            let mut value: Option<String> = None;
            if let Some(query) = &condition.jq {
                value = Some(render(self.query(query, ctx).await?));
            }
            if let Some(name) = &condition.var {
                value = Some(self.var(ctx.rule_name, name.trim_start_matches('$'))?);
            }

            let mut atoms: Vec<bool> = Vec::new();
            if let Some(expected) = &condition.is {
                atoms.push(value.as_deref() == Some(expected.as_str()));
            }
            if let Some(expected) = &condition.event_is {
                atoms.push(expected.trim_end_matches('/') == ctx.event);
            }
            if let Some(expected) = &condition.triggered_by {
                atoms.push(expected == ctx.trigger_name);
            }

            let own = if atoms.is_empty() {
                None
            } else {
                Some(atoms.iter().all(|passed| *passed))
            };

            if let Some(children) = &condition.and {
                let mut all = own.unwrap_or(true);
                for child in children {
                    if !all {
                        break;
                    }
                    all = self.check_condition(child, ctx).await?;
                }
                Ok(all)
            } else if let Some(children) = &condition.or {
                let mut any = own.unwrap_or(false);
                for child in children {
                    if any {
                        break;
                    }
                    any = self.check_condition(child, ctx).await?;
                }
                Ok(any)
            } else {
                Ok(own.unwrap_or(false))
            }
        })
    }

    /// Applies one variable modifier.
    pub(crate) async fn apply_modifier(
        &self,
        name: &str,
        modifier: &VarModifierConfig,
        ctx: &TriggerContext<'_>,
    ) -> Result<(), RuleError> {
        if let Some(literal) = &modifier.set {
            self.set_var(ctx.rule_name, name, literal.clone())
        } else if let Some(query) = &modifier.jq {
            let value = render(self.query(query, ctx).await?);
            self.set_var(ctx.rule_name, name, value)
        } else if modifier.reset == Some(true) {
            self.reset_var(ctx.rule_name, name)
        } else {
            Err(RuleError::InvalidModifier {
                name: name.to_string(),
            })
        }
    }

    /// Runs a query against the context: input is the envelope's data,
    /// and the visible variables plus the built-ins are bound.
    pub(crate) async fn query(
        &self,
        code: &str,
        ctx: &TriggerContext<'_>,
    ) -> Result<Option<Value>, RuleError> {
        let mut vars: Vec<(String, Value)> = self
            .scope_vars(ctx.rule_name)
            .into_iter()
            .map(|(name, value)| (name, Value::String(value)))
            .collect();
        vars.push(("_rule".into(), Value::String(ctx.rule_name.into())));
        vars.push(("_trigger".into(), Value::String(ctx.trigger_name.into())));
        vars.push(("_event".into(), Value::String(ctx.event.into())));
        vars.push(("_msg".into(), ctx.envelope.clone()));

        self.jq().run(code, ctx.input.clone(), vars).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_keeps_strings_bare() {
        assert_eq!(render(Some(Value::String("on".into()))), "on");
        assert_eq!(render(Some(serde_json::json!(42))), "42");
        assert_eq!(render(Some(serde_json::json!({"a": 1}))), "{\"a\":1}");
        assert_eq!(render(None), "null");
    }
}
