//! Execution state tracking for one batch of steps.
//!
//! This module provides types for recording the result of each executed
//! step and summarizing a batch.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Result of executing a single step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub tool_name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Served from the tool cache
    pub cached: bool,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl StepResult {
    /// Create a successful step result.
    pub fn success(step_id: &str, tool_name: &str, data: Value, cached: bool, duration: Duration) -> Self {
        Self {
            step_id: step_id.to_string(),
            tool_name: tool_name.to_string(),
            success: true,
            data: Some(data),
            error: None,
            cached,
            duration,
        }
    }

    /// Create a failed step result.
    pub fn failure(step_id: &str, tool_name: &str, error: &str, duration: Duration) -> Self {
        Self {
            step_id: step_id.to_string(),
            tool_name: tool_name.to_string(),
            success: false,
            data: None,
            error: Some(error.to_string()),
            cached: false,
            duration,
        }
    }
}

/// Summary of one executed batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_steps: usize,
    pub completed: usize,
    pub failed: usize,
    pub cached: usize,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    #[serde(default)]
    pub step_results: BTreeMap<String, StepResult>,
}

impl BatchSummary {
    pub fn new(total_steps: usize) -> Self {
        Self {
            total_steps,
            ..Default::default()
        }
    }

    pub fn add_result(&mut self, result: StepResult) {
        if result.success {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
        if result.cached {
            self.cached += 1;
        }
        self.step_results.insert(result.step_id.clone(), result);
    }

    pub fn all_success(&self) -> bool {
        self.failed == 0 && self.completed == self.total_steps
    }
}

/// Tracks execution timing.
pub struct ExecutionTimer {
    start: Instant,
}

impl ExecutionTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Serde helpers for Duration serialization.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
