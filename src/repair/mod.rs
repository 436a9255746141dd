//! Plan repair after verification.
//!
//! A [`RepairStrategy`] looks at the violations and proposes patches; the
//! [`Repairer`] applies them to the plan store one by one. A patch that
//! would corrupt the plan is rejected and logged while the rest still
//! apply. Violations are then cleared so the next verifier pass judges the
//! repaired plan afresh.

mod patch;
mod rules;

pub use patch::apply_patch;
pub use rules::RuleBasedRepair;

use crate::orchestrator::RunState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use voyage_common::working_set::REPAIR_REASONING_KEY;
use voyage_common::{ConstraintSet, Plan, PlanStep, StepArgs, Violation, WorkingSet};

/// One edit to the plan store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RepairPatch {
    /// Merge `arg_delta` into the step's args and reset it to pending
    Modify { step_id: String, arg_delta: StepArgs },
    /// Delete the step; its dependents stay blocked
    Remove { step_id: String },
    /// Append a new step
    Add { step: PlanStep },
}

impl RepairPatch {
    pub fn step_id(&self) -> &str {
        match self {
            RepairPatch::Modify { step_id, .. } | RepairPatch::Remove { step_id } => step_id,
            RepairPatch::Add { step } => &step.id,
        }
    }
}

/// Patches proposed by a strategy, with its explanation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepairProposal {
    pub patches: Vec<RepairPatch>,
    pub reasoning: String,
}

/// Source of repair patches.
#[async_trait]
pub trait RepairStrategy: Send + Sync {
    async fn propose(
        &self,
        constraints: &ConstraintSet,
        plan: &Plan,
        violations: &[Violation],
        working_set: &WorkingSet,
    ) -> RepairProposal;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedPatch {
    pub patch: RepairPatch,
    pub reason: String,
}

/// What a repair pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepairReport {
    pub applied: Vec<RepairPatch>,
    pub rejected: Vec<RejectedPatch>,
    pub reasoning: String,
    /// Violations cleared by this pass
    pub cleared: usize,
}

impl RepairReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty() && self.rejected.is_empty() && self.cleared == 0
    }
}

/// Applies a strategy's proposals to the run state.
pub struct Repairer {
    strategy: Box<dyn RepairStrategy>,
}

impl Default for Repairer {
    fn default() -> Self {
        Self::new(Box::new(RuleBasedRepair))
    }
}

impl Repairer {
    pub fn new(strategy: Box<dyn RepairStrategy>) -> Self {
        Self { strategy }
    }

    /// Patch the plan for the current violations, then clear them.
    ///
    /// Does nothing when there are no violations.
    pub async fn repair(&self, state: &mut RunState) -> RepairReport {
        if state.violations.is_empty() {
            return RepairReport::default();
        }

        let proposal = self
            .strategy
            .propose(
                &state.constraints,
                &state.plan,
                &state.violations,
                &state.working_set,
            )
            .await;

        let mut report = RepairReport {
            reasoning: proposal.reasoning,
            ..RepairReport::default()
        };

        for patch in proposal.patches {
            match apply_patch(&mut state.plan, &patch) {
                Ok(()) => {
                    tracing::info!(step = patch.step_id(), ?patch, "repair patch applied");
                    report.applied.push(patch);
                }
                Err(err) => {
                    tracing::warn!(step = patch.step_id(), error = %err, "repair patch rejected");
                    report.rejected.push(RejectedPatch {
                        patch,
                        reason: err.to_string(),
                    });
                }
            }
        }

        state
            .working_set
            .note(REPAIR_REASONING_KEY, report.reasoning.clone());

        report.cleared = state.violations.len();
        state.violations.clear();

        report
    }
}
