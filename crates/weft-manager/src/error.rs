//! Error types for configuration and rule evaluation.

use thiserror::Error;
use weft_event::EventError;

/// A problem found while loading or validating the configuration.
///
/// Validation collects every error it can find rather than stopping at
/// the first; the manager does not start while any remain.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Read {
        /// Path that was attempted.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid YAML for the config schema.
    #[error("cannot parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A variable name uses the reserved `_` prefix.
    #[error("{location}: variable name must not start with an underscore: {name:?}")]
    ReservedVarName {
        /// Where in the config tree the name appears.
        location: String,
        /// The offending name.
        name: String,
    },

    /// A rule-local variable hides a global of the same name.
    #[error("{location}: variable {name:?} shadows a global variable")]
    ShadowsGlobal {
        /// Where in the config tree the name appears.
        location: String,
        /// The offending name.
        name: String,
    },

    /// A reference to a variable that is not in scope.
    #[error("{location}: variable {name:?} does not exist")]
    UnknownVariable {
        /// Where in the config tree the reference appears.
        location: String,
        /// The referenced name.
        name: String,
    },

    /// An `event` or `eventIs` string is not a valid event URL.
    #[error("{location}: {source}")]
    InvalidEvent {
        /// Where in the config tree the string appears.
        location: String,
        /// The parse failure.
        source: EventError,
    },

    /// A jq query does not parse or compile under the visible variables.
    #[error("{location}: {message}")]
    InvalidQuery {
        /// Where in the config tree the query appears.
        location: String,
        /// What went wrong.
        message: String,
    },

    /// A condition node is malformed.
    #[error("{location}: {message}")]
    InvalidCondition {
        /// Where in the config tree the condition appears.
        location: String,
        /// What went wrong.
        message: String,
    },

    /// A variable modifier is malformed.
    #[error("{location}: {message}")]
    InvalidModifier {
        /// Where in the config tree the modifier appears.
        location: String,
        /// What went wrong.
        message: String,
    },

    /// An action is malformed.
    #[error("{location}: {message}")]
    InvalidAction {
        /// Where in the config tree the action appears.
        location: String,
        /// What went wrong.
        message: String,
    },
}

/// A runtime failure while evaluating a trigger.
///
/// These abort the current trigger invocation and are reported through
/// the rule's error aggregate; the manager keeps serving.
#[derive(Debug, Error)]
pub enum RuleError {
    /// A variable was referenced that exists in no visible scope.
    #[error("variable {name:?} does not exist")]
    UnknownVariable {
        /// The referenced name.
        name: String,
    },

    /// The query text does not parse.
    #[error("invalid jq query {query:?}: {errors} parse error(s)")]
    QueryParse {
        /// The query text.
        query: String,
        /// How many parse errors were reported.
        errors: usize,
    },

    /// The query parsed but does not compile under the bound variables.
    #[error("jq query {query:?} failed to compile: {errors} error(s)")]
    QueryCompile {
        /// The query text.
        query: String,
        /// How many compile errors were reported.
        errors: usize,
    },

    /// The query failed during execution.
    #[error("jq evaluation failed: {message}")]
    QueryEval {
        /// The evaluator's failure description.
        message: String,
    },

    /// The query ran past the configured deadline.
    #[error("jq evaluation timed out after {timeout_ms} ms")]
    QueryTimeout {
        /// The configured timeout.
        timeout_ms: u64,
    },

    /// The query produced more outputs than the configured bound.
    #[error("jq evaluation exceeded the iteration limit ({limit})")]
    IterationLimit {
        /// The configured bound.
        limit: usize,
    },

    /// A `dynamic-event` query produced something other than a string.
    #[error("dynamic event query produced a non-string value")]
    DynamicEventNotString,

    /// A modifier reached evaluation without exactly one operation set.
    #[error("variable modifier for {name:?} must set exactly one of 'set', 'jq', or 'reset'")]
    InvalidModifier {
        /// The targeted variable.
        name: String,
    },

    /// An event URL computed at runtime failed validation.
    #[error(transparent)]
    Event(#[from] EventError),
}
