//! Audit trail entries for tool calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plan::StepArgs;

/// One execution attempt of a plan step that reached the tool layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub step_id: String,
    pub args: StepArgs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Served from the tool-result cache
    #[serde(default)]
    pub cached: bool,
    pub timestamp: DateTime<Utc>,
}

impl ToolCallRecord {
    pub fn new(tool_name: &str, step_id: &str, args: StepArgs) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            step_id: step_id.to_string(),
            args,
            result: None,
            duration_ms: None,
            error: None,
            cached: false,
            timestamp: Utc::now(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}
