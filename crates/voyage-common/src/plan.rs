//! Plan steps and the plan store.
//!
//! The plan is an ordered list of [`PlanStep`]s forming a DAG through their
//! dependency ids. It is the single source of truth for step status and is
//! mutated only by the control loop between batches.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Status of a step in the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Waiting to be scheduled
    #[default]
    Pending,
    /// Selected by the scheduler for the current batch
    Running,
    /// Tool call succeeded
    Completed,
    /// Tool call failed (terminal unless repaired)
    Failed,
}

impl StepStatus {
    /// Check if the step is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check if the step still has work ahead of it.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

/// Errors raised while manipulating step arguments.
#[derive(Debug, Error)]
pub enum ArgsError {
    #[error("Step arguments must be a JSON object, got {0}")]
    NotAnObject(String),
}

/// Tool arguments as a key-sorted JSON object.
///
/// Keys are kept in a `BTreeMap` so the serialized form is canonical, which
/// the invoker relies on for cache keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepArgs(BTreeMap<String, Value>);

impl StepArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an arbitrary JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self, ArgsError> {
        match value {
            Value::Object(map) => Ok(Self(map.into_iter().collect())),
            other => Err(ArgsError::NotAnObject(other.to_string())),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Shallow-merge `delta` into these arguments; keys in `delta` win.
    pub fn merge(&mut self, delta: &StepArgs) {
        for (key, value) in &delta.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Convert into a plain JSON object value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<Map<_, _>>())
    }
}

/// A single tool invocation in the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Unique within the plan
    pub id: String,
    /// Name of the tool in the capability map
    pub tool_name: String,
    #[serde(default)]
    pub args: StepArgs,
    /// Ids of steps that must complete before this one
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration_ms: Option<u64>,
    #[serde(default)]
    pub status: StepStatus,
}

impl PlanStep {
    pub fn new(id: &str, tool_name: &str, args: StepArgs) -> Self {
        Self {
            id: id.to_string(),
            tool_name: tool_name.to_string(),
            args,
            dependencies: BTreeSet::new(),
            estimated_cost: None,
            estimated_duration_ms: None,
            status: StepStatus::Pending,
        }
    }

    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Working-set key for a successful result of this step.
    pub fn output_key(&self) -> String {
        format!("{}_{}_output", self.tool_name, self.id)
    }

    /// Working-set key for a failure of this step.
    pub fn error_key(&self) -> String {
        format!("{}_{}_error", self.tool_name, self.id)
    }
}

/// The plan store: an ordered list of steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan {
    steps: Vec<PlanStep>,
}

impl Plan {
    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.steps.iter().any(|s| s.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut PlanStep> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    pub fn status_of(&self, id: &str) -> Option<StepStatus> {
        self.get(id).map(|s| s.status)
    }

    /// Append a step. Id uniqueness is checked by the DAG validator.
    pub fn push(&mut self, step: PlanStep) {
        self.steps.push(step);
    }

    /// Remove a step by id, returning it if it existed.
    pub fn remove(&mut self, id: &str) -> Option<PlanStep> {
        let index = self.steps.iter().position(|s| s.id == id)?;
        Some(self.steps.remove(index))
    }

    pub fn set_status(&mut self, id: &str, status: StepStatus) -> bool {
        match self.get_mut(id) {
            Some(step) => {
                step.status = status;
                true
            }
            None => false,
        }
    }

    pub fn steps_with_status(&self, status: StepStatus) -> impl Iterator<Item = &PlanStep> {
        self.steps.iter().filter(move |s| s.status == status)
    }

    pub fn steps_for_tool<'a>(&'a self, tool_name: &'a str) -> impl Iterator<Item = &'a PlanStep> {
        self.steps.iter().filter(move |s| s.tool_name == tool_name)
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.steps_with_status(status).count()
    }

    /// Any step still pending or running.
    pub fn has_active(&self) -> bool {
        self.steps.iter().any(|s| s.status.is_active())
    }

    /// Every step is completed or failed.
    pub fn all_terminal(&self) -> bool {
        self.steps.iter().all(|s| s.status.is_terminal())
    }

    /// First id of the form `{prefix}_{n}` not already in the plan.
    pub fn fresh_id(&self, prefix: &str) -> String {
        (1..)
            .map(|n| format!("{}_{}", prefix, n))
            .find(|candidate| !self.contains(candidate))
            .unwrap_or_else(|| prefix.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_status_terminal() {
        assert!(!StepStatus::Pending.is_terminal());
        assert!(!StepStatus::Running.is_terminal());
        assert!(StepStatus::Completed.is_terminal());
        assert!(StepStatus::Failed.is_terminal());
        assert!(StepStatus::Running.is_active());
    }

    #[test]
    fn test_args_merge_overrides_and_keeps() {
        let mut args = StepArgs::new().with("origin", "SFO").with("max_results", 5);
        let delta = StepArgs::new().with("max_results", 2).with("avoid_overnight", true);
        args.merge(&delta);

        assert_eq!(args.get_str("origin"), Some("SFO"));
        assert_eq!(args.get_u64("max_results"), Some(2));
        assert_eq!(args.get("avoid_overnight"), Some(&json!(true)));
    }

    #[test]
    fn test_args_from_value_rejects_non_object() {
        assert!(StepArgs::from_value(json!([1, 2])).is_err());
        let args = StepArgs::from_value(json!({"b": 1, "a": 2})).unwrap();
        // Keys serialize sorted
        assert_eq!(serde_json::to_string(&args).unwrap(), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn test_working_set_keys() {
        let step = PlanStep::new("flights_sfo", "flights", StepArgs::new());
        assert_eq!(step.output_key(), "flights_flights_sfo_output");
        assert_eq!(step.error_key(), "flights_flights_sfo_error");
    }

    #[test]
    fn test_plan_store_operations() {
        let mut plan = Plan::new(vec![
            PlanStep::new("a", "flights", StepArgs::new()),
            PlanStep::new("b", "lodging", StepArgs::new()).depends_on(["a"]),
        ]);

        assert_eq!(plan.len(), 2);
        assert!(plan.has_active());
        assert!(!plan.all_terminal());

        plan.set_status("a", StepStatus::Completed);
        plan.set_status("b", StepStatus::Failed);
        assert!(plan.all_terminal());
        assert_eq!(plan.count(StepStatus::Completed), 1);

        let removed = plan.remove("a").unwrap();
        assert_eq!(removed.id, "a");
        assert!(!plan.contains("a"));
        assert!(plan.remove("missing").is_none());
    }

    #[test]
    fn test_fresh_id_skips_taken() {
        let plan = Plan::new(vec![
            PlanStep::new("events_1", "events", StepArgs::new()),
            PlanStep::new("events_2", "events", StepArgs::new()),
        ]);
        assert_eq!(plan.fresh_id("events"), "events_3");
        assert_eq!(plan.fresh_id("weather"), "weather_1");
    }
}
