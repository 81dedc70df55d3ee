//! Embedded jq evaluation.
//!
//! Queries are compiled with the visible variables bound as `$name`
//! globals and executed on a blocking task. Two bounds apply: a wall
//! deadline (`jq-timeout-ms`, enforced with [`tokio::time::timeout`] and
//! re-checked between outputs) and an output count limit. A filter that
//! diverges without yielding keeps its blocking thread until process
//! exit; the caller still gets its timeout error on schedule.

use crate::RuleError;
use jaq_core::load::{Arena, File, Loader};
use jaq_core::{Compiler, Ctx, FilterT as _, RcIter};
use jaq_json::Val;
use serde_json::Value;
use std::time::{Duration, Instant};

/// Bounded jq query executor.
pub(crate) struct JqRunner {
    timeout: Duration,
    iteration_limit: usize,
}

impl JqRunner {
    pub(crate) fn new(timeout: Duration, iteration_limit: usize) -> Self {
        Self {
            timeout,
            iteration_limit,
        }
    }

    /// Parses and compiles a query without executing it.
    ///
    /// `var_names` are the plain (un-prefixed) variable names that will
    /// be in scope at execution time.
    pub(crate) fn check(code: &str, var_names: &[String]) -> Result<(), RuleError> {
        let dollar_names: Vec<String> = var_names.iter().map(|n| format!("${n}")).collect();

        let arena = Arena::default();
        let loader = Loader::new(jaq_std::defs().chain(jaq_json::defs()));
        let modules = loader
            .load(&arena, File { code, path: () })
            .map_err(|errors| RuleError::QueryParse {
                query: code.to_string(),
                errors: errors.len(),
            })?;

        Compiler::default()
            .with_funs(jaq_std::funs().chain(jaq_json::funs()))
            .with_global_vars(dollar_names.iter().map(String::as_str))
            .compile(modules)
            .map(|_| ())
            .map_err(|errors| RuleError::QueryCompile {
                query: code.to_string(),
                errors: errors.len(),
            })
    }

    /// Runs a query, returning the first non-null output, or `None` when
    /// the query produces nothing but nulls.
    pub(crate) async fn run(
        &self,
        code: &str,
        input: Value,
        vars: Vec<(String, Value)>,
    ) -> Result<Option<Value>, RuleError> {
        let code = code.to_string();
        let timeout = self.timeout;
        let limit = self.iteration_limit;

        let task =
            tokio::task::spawn_blocking(move || evaluate(&code, input, vars, timeout, limit));

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(RuleError::QueryEval {
                message: join_error.to_string(),
            }),
            Err(_elapsed) => Err(RuleError::QueryTimeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

fn evaluate(
    code: &str,
    input: Value,
    vars: Vec<(String, Value)>,
    timeout: Duration,
    limit: usize,
) -> Result<Option<Value>, RuleError> {
    let dollar_names: Vec<String> = vars.iter().map(|(name, _)| format!("${name}")).collect();

    let arena = Arena::default();
    let loader = Loader::new(jaq_std::defs().chain(jaq_json::defs()));
    let modules = loader
        .load(&arena, File { code, path: () })
        .map_err(|errors| RuleError::QueryParse {
            query: code.to_string(),
            errors: errors.len(),
        })?;

    let filter = Compiler::default()
        .with_funs(jaq_std::funs().chain(jaq_json::funs()))
        .with_global_vars(dollar_names.iter().map(String::as_str))
        .compile(modules)
        .map_err(|errors| RuleError::QueryCompile {
            query: code.to_string(),
            errors: errors.len(),
        })?;

    let values: Vec<Val> = vars.into_iter().map(|(_, value)| Val::from(value)).collect();

    let inputs = RcIter::new(core::iter::empty());
    let deadline = Instant::now() + timeout;
    let mut produced = 0usize;

    for output in filter.run((Ctx::new(values, &inputs), Val::from(input))) {
        if Instant::now() >= deadline {
            return Err(RuleError::QueryTimeout {
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        produced += 1;
        if produced > limit {
            return Err(RuleError::IterationLimit { limit });
        }

        let value = output.map_err(|err| RuleError::QueryEval {
            message: err.to_string(),
        })?;
        if !matches!(value, Val::Null) {
            return Ok(Some(Value::from(value)));
        }
    }

    Ok(None)
}
