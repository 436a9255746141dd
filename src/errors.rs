//! Typed error hierarchy for the Voyage orchestrator.
//!
//! Four enums cover the subsystems:
//! - `ToolError`: a single tool call (validation, execution, timeout)
//! - `PlanError`: structural defects in a plan (fatal at planning time)
//! - `PatchError`: a rejected repair patch (logged, never fatal)
//! - `OrchestratorError`: failures that abort a whole run

use std::time::Duration;
use thiserror::Error;

/// Errors from a single tool invocation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ToolError {
    #[error("Input validation failed: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Execution(String),

    #[error("Tool '{tool}' timed out after {}ms", .timeout.as_millis())]
    Timeout { tool: String, timeout: Duration },

    #[error("Unknown tool '{0}'")]
    UnknownTool(String),
}

impl ToolError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Execution(_) | Self::Timeout { .. })
    }
}

/// Structural defects in a plan.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlanError {
    #[error("Duplicate step id: {0}")]
    DuplicateStep(String),

    #[error("Unknown dependency '{dependency}' in step '{step}': no step with that id exists")]
    UnknownDependency { step: String, dependency: String },

    #[error("Cycle detected in step dependencies. Involved steps: {0:?}")]
    Cycle(Vec<String>),
}

/// A repair patch that could not be applied.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PatchError {
    #[error("Patch targets unknown step '{0}'")]
    UnknownStep(String),

    #[error("Patch rejected: {0}")]
    InvalidPlan(#[from] PlanError),
}

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Planner produced an invalid plan: {0}")]
    Plan(#[from] PlanError),

    #[error("Plan store corrupted: {0}")]
    Corrupted(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
