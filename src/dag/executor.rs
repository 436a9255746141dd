//! Batch executor for running steps.
//!
//! The executor dispatches every `Running` step to its tool handle
//! concurrently and waits for all of them (fan-out / join barrier). Results
//! are collected into a [`BatchOutcome`] and merged into the run state only
//! after the join, so steps in the same batch never see each other's
//! outputs.

use crate::dag::state::{BatchSummary, ExecutionTimer, StepResult};
use crate::errors::{OrchestratorError, ToolError};
use crate::orchestrator::RunState;
use crate::tools::ToolSet;
use futures::future::join_all;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Semaphore;
use voyage_common::{Plan, PlanStep, StepStatus, ToolCallRecord};

/// One executed step: its result plus the audit record.
#[derive(Debug, Clone)]
pub struct StepExecution {
    pub result: StepResult,
    pub record: ToolCallRecord,
}

/// Everything a batch produced, not yet applied to the run state.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub executions: Vec<StepExecution>,
    pub summary: BatchSummary,
}

impl BatchOutcome {
    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }

    /// Merge the batch into the run state.
    ///
    /// Each step becomes `Completed` (output stored) or `Failed` (error
    /// stored), and its record is appended to the tool-call log.
    pub fn apply(self, state: &mut RunState) -> Result<BatchSummary, OrchestratorError> {
        for execution in self.executions {
            let StepExecution { result, record } = execution;
            let step = state.plan.get_mut(&result.step_id).ok_or_else(|| {
                OrchestratorError::Corrupted(format!(
                    "executed step '{}' is no longer in the plan",
                    result.step_id
                ))
            })?;

            if step.status != StepStatus::Running {
                return Err(OrchestratorError::Corrupted(format!(
                    "executed step '{}' is {:?}, expected Running",
                    step.id, step.status
                )));
            }

            if result.success {
                step.status = StepStatus::Completed;
                let key = step.output_key();
                state
                    .working_set
                    .insert(&key, result.data.unwrap_or(Value::Null));
            } else {
                step.status = StepStatus::Failed;
                let key = step.error_key();
                state
                    .working_set
                    .insert(&key, Value::String(result.error.unwrap_or_default()));
            }

            state.tool_calls.push(record);
        }

        Ok(self.summary)
    }
}

/// Runs the `Running` steps of a plan against a capability map.
pub struct DagExecutor<'a> {
    tools: &'a ToolSet,
    limiter: Option<Semaphore>,
}

impl<'a> DagExecutor<'a> {
    pub fn new(tools: &'a ToolSet) -> Self {
        Self {
            tools,
            limiter: None,
        }
    }

    /// Bound the number of tool calls in flight at once.
    pub fn with_max_in_flight(mut self, max_in_flight: Option<usize>) -> Self {
        self.limiter = max_in_flight.map(|n| Semaphore::new(n.max(1)));
        self
    }

    /// Execute every `Running` step concurrently.
    ///
    /// Never retries; retry policy belongs to the tool handle.
    pub async fn run(&self, plan: &Plan) -> BatchOutcome {
        let timer = ExecutionTimer::start();
        let running: Vec<&PlanStep> = plan.steps_with_status(StepStatus::Running).collect();

        if running.is_empty() {
            return BatchOutcome::default();
        }

        tracing::info!(steps = running.len(), "executing batch");

        let executions = join_all(running.iter().map(|step| self.run_step(step))).await;

        let mut summary = BatchSummary::new(executions.len());
        for execution in &executions {
            summary.add_result(execution.result.clone());
        }
        summary.duration = timer.elapsed();

        tracing::info!(
            completed = summary.completed,
            failed = summary.failed,
            cached = summary.cached,
            duration_ms = timer.elapsed_ms(),
            "batch finished"
        );

        BatchOutcome {
            executions,
            summary,
        }
    }

    async fn run_step(&self, step: &PlanStep) -> StepExecution {
        // Held until the call finishes; the semaphore is never closed.
        let _permit = match &self.limiter {
            Some(limiter) => limiter.acquire().await.ok(),
            None => None,
        };

        let mut record = ToolCallRecord::new(&step.tool_name, &step.id, step.args.clone());

        let Some(handle) = self.tools.get(&step.tool_name) else {
            let error = ToolError::UnknownTool(step.tool_name.clone()).to_string();
            tracing::warn!(step = %step.id, tool = %step.tool_name, "no tool registered for step");
            self.tools
                .metrics()
                .record_tool_call(&step.tool_name, false, false, 0);
            record.error = Some(error.clone());
            record.duration_ms = Some(0);
            return StepExecution {
                result: StepResult::failure(&step.id, &step.tool_name, &error, Duration::ZERO),
                record,
            };
        };

        let invocation = handle.invoke(&step.args, self.tools.max_retries()).await;
        let duration = Duration::from_millis(invocation.duration_ms);

        record.duration_ms = Some(invocation.duration_ms);
        record.cached = invocation.cached;

        let result = match (invocation.success, invocation.data) {
            (true, Some(data)) => {
                record.result = Some(data.clone());
                StepResult::success(&step.id, &step.tool_name, data, invocation.cached, duration)
            }
            (true, None) => StepResult::success(&step.id, &step.tool_name, Value::Null, invocation.cached, duration),
            (false, _) => {
                let error = invocation.error.unwrap_or_else(|| "unknown tool error".to_string());
                record.error = Some(error.clone());
                StepResult::failure(&step.id, &step.tool_name, &error, duration)
            }
        };

        StepExecution { result, record }
    }
}
