//! Manager composition: hub + node + sniffers behind one router.

use crate::jq::JqRunner;
use crate::rules::TriggerContext;
use crate::vars::VarStore;
use crate::{validate, Config, ConfigError, RuleError};
use axum::Router;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error};
use weft_event::PAYLOAD_CONTENT_TYPE;
use weft_node::Node;
use weft_websub::{Hub, PublishObserver};

/// A hub colocated with a node and a rule engine sniffing all traffic.
///
/// Constructed from a validated [`Config`]; refuses to start otherwise.
/// The hub serves at the configured base URL, the node under
/// `{baseURL}/p`, both through [`Manager::router`].
pub struct Manager {
    weak: Weak<Manager>,
    hub: Arc<Hub>,
    node: Arc<Node>,
    config: Config,
    vars: VarStore,
    jq: JqRunner,
}

impl Manager {
    /// Validates the configuration and assembles the manager.
    ///
    /// # Errors
    ///
    /// Returns every validation error found; the manager is not built
    /// while any remain.
    pub fn new(config: Config) -> Result<Arc<Self>, Vec<ConfigError>> {
        let errors = validate(&config);
        if !errors.is_empty() {
            return Err(errors);
        }

        let base_url = config.base_url.trim_end_matches('/').to_string();
        let hub = Hub::new(&base_url);
        let node = Node::new(&format!("{base_url}/p"), &base_url);
        let vars = VarStore::from_config(&config);
        let jq = JqRunner::new(
            Duration::from_millis(config.jq_timeout_ms),
            config.jq_iteration_limit,
        );

        let manager = Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            hub,
            node,
            config,
            vars,
            jq,
        });
        manager.install_sniffers();
        Ok(manager)
    }

    fn shared(&self) -> Arc<Self> {
        self.weak.upgrade().expect("manager is alive while borrowed")
    }

    /// Loads, validates, and assembles from a configuration file.
    ///
    /// # Errors
    ///
    /// Returns the load failure or every validation error found.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Arc<Self>, Vec<ConfigError>> {
        Self::new(Config::load(path)?)
    }

    /// The colocated hub.
    #[must_use]
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// The colocated node; the rule engine publishes through it.
    #[must_use]
    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// The validated configuration this manager runs.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The combined HTTP surface: hub at the root, node under `/p`.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .nest("/p", self.node.router())
            .merge(self.hub.router())
    }

    /// Reads a variable visible from `rule` (globals first).
    ///
    /// # Errors
    ///
    /// Fails when the variable exists in no visible scope.
    pub fn var(&self, rule: &str, name: &str) -> Result<String, RuleError> {
        self.vars
            .get(rule, name)
            .ok_or_else(|| RuleError::UnknownVariable {
                name: name.to_string(),
            })
    }

    /// Writes a variable visible from `rule` (globals first).
    ///
    /// # Errors
    ///
    /// Fails when the variable exists in no visible scope.
    pub fn set_var(&self, rule: &str, name: &str, value: String) -> Result<(), RuleError> {
        if self.vars.set(rule, name, value) {
            Ok(())
        } else {
            Err(RuleError::UnknownVariable {
                name: name.to_string(),
            })
        }
    }

    /// The configured initial value of a variable visible from `rule`.
    ///
    /// # Errors
    ///
    /// Fails when the variable exists in no visible scope.
    pub fn var_default(&self, rule: &str, name: &str) -> Result<String, RuleError> {
        if let Some(value) = self.config.vars.get(name) {
            return Ok(value.clone());
        }
        self.config
            .rules
            .get(rule)
            .and_then(|r| r.vars.get(name))
            .cloned()
            .ok_or_else(|| RuleError::UnknownVariable {
                name: name.to_string(),
            })
    }

    /// Restores a variable to its configured initial value.
    ///
    /// # Errors
    ///
    /// Fails when the variable exists in no visible scope.
    pub fn reset_var(&self, rule: &str, name: &str) -> Result<(), RuleError> {
        let initial = self.var_default(rule, name)?;
        self.set_var(rule, name, initial)
    }

    pub(crate) fn scope_vars(&self, rule: &str) -> Vec<(String, String)> {
        self.vars.scope(rule)
    }

    pub(crate) fn jq(&self) -> &JqRunner {
        &self.jq
    }

    /// Registers this manager on every topic named by a trigger, plus a
    /// catch-all publish counter.
    fn install_sniffers(&self) {
        let mut topics: BTreeSet<String> = BTreeSet::new();
        for rule in self.config.rules.values() {
            for trigger in rule.triggers.values() {
                topics.insert(trigger.event.trim_end_matches('/').to_string());
            }
        }

        for topic in topics {
            // Both slash variants arrive on the wire; watch both.
            self.hub
                .add_sniffer(format!("{topic}/"), self.shared() as Arc<dyn PublishObserver>);
            self.hub
                .add_sniffer(topic, self.shared() as Arc<dyn PublishObserver>);
        }

        self.hub.add_sniffer("", Arc::new(PublishCounter::default()));
    }
}

#[async_trait::async_trait]
impl PublishObserver for Manager {
    /// The sniffer: matches the publish against every trigger and runs
    /// the fired rules.
    async fn on_publish(&self, topic: &str, content_type: &str, body: &[u8]) {
        if content_type != PAYLOAD_CONTENT_TYPE {
            return;
        }

        let topic = topic.trim_end_matches('/');

        let envelope: Value = match serde_json::from_slice(body) {
            Ok(envelope) => envelope,
            Err(err) => {
                debug!(topic, error = %err, "sniffed publish is not a message envelope");
                return;
            }
        };
        let input = envelope.get("data").cloned().unwrap_or(Value::Null);

        for (rule_name, rule) in &self.config.rules {
            for (trigger_name, trigger) in &rule.triggers {
                if trigger.event.trim_end_matches('/') != topic {
                    continue;
                }

                let ctx = TriggerContext {
                    rule_name,
                    trigger_name,
                    rule,
                    trigger,
                    event: topic,
                    envelope: &envelope,
                    input: &input,
                };

                let errors = self.rule_triggered(&ctx).await;
                for err in &errors {
                    error!(
                        rule = rule_name,
                        trigger = trigger_name,
                        error = %err,
                        "error triggering rule"
                    );
                }
            }
        }
    }
}

/// Catch-all sniffer counting every publish through the hub.
#[derive(Default)]
struct PublishCounter {
    count: AtomicU64,
}

#[async_trait::async_trait]
impl PublishObserver for PublishCounter {
    async fn on_publish(&self, topic: &str, _content_type: &str, _body: &[u8]) {
        let publish = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(publish, topic, "publish passed through hub");
    }
}
