//! Manager: a hub colocated with a node and a declarative rule engine.
//!
//! The [`Manager`] runs a [`Hub`] and a [`Node`] behind one HTTP surface
//! and sniffs every publish that passes through the hub. A YAML
//! configuration declares *rules*; each rule has *triggers* (topics that
//! fire it) and *actions* (conditions, variable mutations, and new event
//! publications computed with jq queries).
//!
//! ```text
//!           publish                 ┌──────────────────────────┐
//!  Nodes ──────────────► Hub ─────► │ sniffer                  │
//!    ▲                              │  └ rule triggers         │
//!    │                              │     └ conditions (jq)    │
//!    │        new events            │        └ actions         │
//!    └────────────────── Node ◄─────│           └ publish      │
//!                                   └──────────────────────────┘
//! ```
//!
//! # Variables
//!
//! The configuration declares string variables at the global level and
//! per rule; rule locals shadow globals. Queries see every variable in
//! scope as `$name`, plus the built-ins `$_rule`, `$_trigger`, `$_event`,
//! and `$_msg` (the full message envelope). The query input is the
//! envelope's `data` field. Names starting with `_` are reserved.
//!
//! # Failure policy
//!
//! Configuration problems are collected exhaustively by [`validate`] and
//! reported as a list; the manager refuses to start. Runtime rule errors
//! (query failures, timeouts, missing variables) abort the current
//! trigger invocation, are logged, and the next publish is served
//! normally.
//!
//! [`Hub`]: weft_websub::Hub
//! [`Node`]: weft_node::Node

mod config;
mod error;
mod jq;
mod manager;
mod rules;
mod validate;
mod vars;

pub use config::{
    ActionConfig, ConditionConfig, Config, RuleConfig, TriggerConfig, VarModifierConfig,
};
pub use error::{ConfigError, RuleError};
pub use manager::Manager;
pub use validate::validate;
