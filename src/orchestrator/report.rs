use crate::dag::BlockedStep;
use crate::metrics::MetricsSnapshot;
use crate::orchestrator::RunState;
use serde::{Deserialize, Serialize};
use std::fmt;
use voyage_common::Violation;

/// Why the control loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Every step is terminal and verification found nothing
    Completed,
    /// Plan and violations did not change between two iterations
    NoProgress,
    /// `max_iterations` reached
    IterationBudgetExhausted,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Completed => "completed",
            Termination::NoProgress => "no_progress",
            Termination::IterationBudgetExhausted => "iteration_budget_exhausted",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Termination::Completed)
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final result of a run, handed to downstream synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub termination: Termination,
    pub state: RunState,
    /// Pending steps whose dependencies are not all completed
    pub blocked: Vec<BlockedStep>,
    pub failed_steps: Vec<String>,
    pub metrics: MetricsSnapshot,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.termination.is_success()
    }

    pub fn iterations(&self) -> u32 {
        self.state.iteration
    }

    pub fn violations(&self) -> &[Violation] {
        &self.state.violations
    }
}
