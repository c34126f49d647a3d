//! Cross-step context accumulator
//!
//! Each step's executor returns a delta of key/value results. Downstream
//! steps read those results through this accumulator, keyed by the step
//! that produced them. A read of data an upstream step never produced
//! (skipped or failed) yields an explicit `MissingUpstream` error so the
//! caller can log the fallback it applies instead of silently defaulting.

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::catalog::StepId;
use crate::errors::OrchestratorError;

/// Results a step executor hands back to the engine
pub type ContextDelta = Map<String, Value>;

/// Accumulated step results, keyed by producing step
#[derive(Debug, Clone, Default)]
pub struct StepContext {
    data: HashMap<StepId, Map<String, Value>>,
}

impl StepContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a step's result delta into the accumulator
    pub fn absorb(&mut self, step: StepId, delta: ContextDelta) {
        self.data.entry(step).or_default().extend(delta);
    }

    /// Read one value produced by an upstream step
    pub fn get(&self, step: StepId, key: &str) -> Result<&Value, OrchestratorError> {
        self.data
            .get(&step)
            .and_then(|m| m.get(key))
            .ok_or_else(|| OrchestratorError::MissingUpstream {
                step,
                key: key.to_string(),
            })
    }

    /// Read a string value produced by an upstream step
    pub fn get_str(&self, step: StepId, key: &str) -> Result<&str, OrchestratorError> {
        self.get(step, key)?
            .as_str()
            .ok_or_else(|| OrchestratorError::MissingUpstream {
                step,
                key: key.to_string(),
            })
    }

    /// Read a string value, falling back to a default when the upstream
    /// step never produced it
    pub fn str_or<'a>(&'a self, step: StepId, key: &str, default: &'a str) -> &'a str {
        match self.get_str(step, key) {
            Ok(v) => v,
            Err(_) => default,
        }
    }

    /// Read a boolean value with a fallback default
    pub fn bool_or(&self, step: StepId, key: &str, default: bool) -> bool {
        self.get(step, key)
            .ok()
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    /// All data produced by one step, if any
    pub fn for_step(&self, step: StepId) -> Option<&Map<String, Value>> {
        self.data.get(&step)
    }

    /// Flattened copy of the whole accumulator, keyed by step wire id
    pub fn snapshot(&self) -> Map<String, Value> {
        let mut out = Map::new();
        for (step, values) in &self.data {
            out.insert(step.as_str().to_string(), Value::Object(values.clone()));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absorb_and_get() {
        let mut ctx = StepContext::new();
        let mut delta = Map::new();
        delta.insert("region".to_string(), json!("eu-west"));
        ctx.absorb(StepId::GeolocationDetection, delta);

        assert_eq!(
            ctx.get_str(StepId::GeolocationDetection, "region").unwrap(),
            "eu-west"
        );
    }

    #[test]
    fn test_missing_upstream_is_explicit() {
        let ctx = StepContext::new();
        let err = ctx.get(StepId::SystemDetection, "package_manager").unwrap_err();

        match err {
            OrchestratorError::MissingUpstream { step, key } => {
                assert_eq!(step, StepId::SystemDetection);
                assert_eq!(key, "package_manager");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_fallback_defaults() {
        let ctx = StepContext::new();

        assert_eq!(ctx.str_or(StepId::SystemDetection, "package_manager", "apt"), "apt");
        assert!(!ctx.bool_or(StepId::GeolocationDetection, "restricted_network", false));
    }

    #[test]
    fn test_absorb_merges_deltas() {
        let mut ctx = StepContext::new();
        let mut first = Map::new();
        first.insert("os_id".to_string(), json!("ubuntu"));
        let mut second = Map::new();
        second.insert("arch".to_string(), json!("x86_64"));

        ctx.absorb(StepId::SystemDetection, first);
        ctx.absorb(StepId::SystemDetection, second);

        let data = ctx.for_step(StepId::SystemDetection).unwrap();
        assert_eq!(data.len(), 2);
    }
}
