//! Step selection over the plan store.
//!
//! The scheduler picks the steps whose dependencies have all completed and
//! marks them running in place. It also computes execution waves for dry
//! runs and explains why pending steps cannot start.

use crate::dag::builder::DagBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use voyage_common::{Plan, PlanStep, StepStatus};

/// Whether every dependency of `step` maps to a completed step.
///
/// An id naming no step is never satisfied.
pub fn dependencies_satisfied(plan: &Plan, step: &PlanStep) -> bool {
    step.dependencies
        .iter()
        .all(|dep| plan.status_of(dep) == Some(StepStatus::Completed))
}

/// Select every ready step and mark it `Running`.
///
/// Ready means `Pending` with all dependencies `Completed`. There is no
/// priority and no cap; a second call before the batch runs selects
/// nothing new.
pub fn select_ready(plan: &mut Plan) -> Vec<String> {
    let ready: Vec<String> = plan
        .steps_with_status(StepStatus::Pending)
        .filter(|step| dependencies_satisfied(plan, step))
        .map(|step| step.id.clone())
        .collect();

    for id in &ready {
        plan.set_status(id, StepStatus::Running);
    }

    if !ready.is_empty() {
        tracing::debug!(steps = ?ready, "steps selected for execution");
    }

    ready
}

/// Group steps into waves that could run in parallel, ignoring status.
///
/// Steps that can never run (dangling or cyclic dependencies) appear in no
/// wave.
pub fn compute_waves(plan: &Plan) -> Vec<Vec<String>> {
    let Ok(graph) = DagBuilder::from_plan(plan).allow_dangling().build() else {
        return Vec::new();
    };
    let blocked: HashSet<&str> = graph.dangling().iter().map(|(step, _)| step.as_str()).collect();

    let mut waves = Vec::new();
    let mut done: HashSet<usize> = HashSet::new();

    loop {
        let ready: Vec<usize> = (0..graph.len())
            .filter(|i| !done.contains(i))
            .filter(|&i| graph.get_step(i).is_some_and(|s| !blocked.contains(s.id.as_str())))
            .filter(|&i| graph.dependencies(i).iter().all(|d| done.contains(d)))
            .collect();

        if ready.is_empty() {
            break;
        }

        done.extend(ready.iter().copied());
        waves.push(
            ready
                .into_iter()
                .filter_map(|i| graph.get_step(i).map(|s| s.id.clone()))
                .collect(),
        );
    }

    waves
}

/// Why a dependency is not yet satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// No step with this id exists
    Missing,
    /// The dependency failed and will not complete unless repaired
    Failed,
    /// The dependency has not run yet
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmetDependency {
    pub id: String,
    pub reason: BlockReason,
}

/// A pending step and the dependencies holding it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedStep {
    pub step_id: String,
    pub waiting_on: Vec<UnmetDependency>,
}

impl BlockedStep {
    /// Whether the step can never start without a plan change.
    pub fn is_stuck(&self) -> bool {
        self.waiting_on
            .iter()
            .any(|d| matches!(d.reason, BlockReason::Missing | BlockReason::Failed))
    }
}

/// Every pending step with at least one unmet dependency.
pub fn blocked_steps(plan: &Plan) -> Vec<BlockedStep> {
    plan.steps_with_status(StepStatus::Pending)
        .filter_map(|step| {
            let waiting_on: Vec<UnmetDependency> = step
                .dependencies
                .iter()
                .filter_map(|dep| {
                    let reason = match plan.status_of(dep) {
                        None => BlockReason::Missing,
                        Some(StepStatus::Failed) => BlockReason::Failed,
                        Some(StepStatus::Completed) => return None,
                        Some(StepStatus::Pending | StepStatus::Running) => BlockReason::Pending,
                    };
                    Some(UnmetDependency {
                        id: dep.clone(),
                        reason,
                    })
                })
                .collect();

            (!waiting_on.is_empty()).then(|| BlockedStep {
                step_id: step.id.clone(),
                waiting_on,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use voyage_common::StepArgs;

    fn step(id: &str, deps: &[&str]) -> PlanStep {
        PlanStep::new(id, "flights", StepArgs::new()).depends_on(deps.iter().copied())
    }

    #[test]
    fn test_select_ready_gates_on_dependencies() {
        let mut plan = Plan::new(vec![step("a", &[]), step("b", &["a"]), step("c", &["a"])]);

        assert_eq!(select_ready(&mut plan), vec!["a"]);
        assert_eq!(plan.status_of("a"), Some(StepStatus::Running));
        assert_eq!(plan.status_of("b"), Some(StepStatus::Pending));

        // Nothing new until the batch finishes.
        assert!(select_ready(&mut plan).is_empty());

        plan.set_status("a", StepStatus::Completed);
        assert_eq!(select_ready(&mut plan), vec!["b", "c"]);
    }

    #[test]
    fn test_failed_dependency_never_satisfies() {
        let mut plan = Plan::new(vec![step("a", &[]), step("b", &["a"])]);
        plan.set_status("a", StepStatus::Failed);

        assert!(select_ready(&mut plan).is_empty());
        let blocked = blocked_steps(&plan);
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].waiting_on[0].reason, BlockReason::Failed);
        assert!(blocked[0].is_stuck());
    }

    #[test]
    fn test_dangling_dependency_reported_missing() {
        let mut plan = Plan::new(vec![step("b", &["gone"])]);

        assert!(select_ready(&mut plan).is_empty());
        let blocked = blocked_steps(&plan);
        assert_eq!(
            blocked[0].waiting_on,
            vec![UnmetDependency {
                id: "gone".into(),
                reason: BlockReason::Missing
            }]
        );
    }

    #[test]
    fn test_blocked_on_pending_is_not_stuck() {
        let plan = Plan::new(vec![step("a", &[]), step("b", &["a"])]);
        let blocked = blocked_steps(&plan);
        assert_eq!(blocked.len(), 1);
        assert!(!blocked[0].is_stuck());
    }

    #[test]
    fn test_wave_computation_diamond() {
        let plan = Plan::new(vec![
            step("a", &[]),
            step("b", &["a"]),
            step("c", &["a"]),
            step("d", &["b", "c"]),
        ]);

        let waves = compute_waves(&plan);

        assert_eq!(waves.len(), 3);
        assert_eq!(waves[0], vec!["a"]);
        assert_eq!(waves[1], vec!["b", "c"]);
        assert_eq!(waves[2], vec!["d"]);
    }

    #[test]
    fn test_wave_computation_skips_unreachable() {
        let plan = Plan::new(vec![step("a", &[]), step("b", &["gone"]), step("c", &["b"])]);
        assert_eq!(compute_waves(&plan), vec![vec!["a".to_string()]]);
    }
}
