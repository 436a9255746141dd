//! DAG builder for validating step dependency graphs.
//!
//! The builder takes plan steps with their dependency ids and constructs an
//! index-based graph, rejecting duplicate ids, dangling dependencies and
//! cycles.

use crate::errors::PlanError;
use std::collections::HashMap;
use voyage_common::{Plan, PlanStep};

/// Index into the step list.
pub type StepIndex = usize;

/// A directed acyclic graph of plan steps.
#[derive(Debug)]
pub struct StepGraph<'a> {
    steps: Vec<&'a PlanStep>,
    /// index -> steps that depend on it
    forward_edges: Vec<Vec<StepIndex>>,
    /// index -> steps it depends on
    reverse_edges: Vec<Vec<StepIndex>>,
    /// (step id, dependency id) pairs that name no step
    dangling: Vec<(String, String)>,
}

impl<'a> StepGraph<'a> {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get_step(&self, index: StepIndex) -> Option<&'a PlanStep> {
        self.steps.get(index).copied()
    }

    /// Steps that depend on the given step.
    pub fn dependents(&self, index: StepIndex) -> &[StepIndex] {
        self.forward_edges.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Steps the given step depends on.
    pub fn dependencies(&self, index: StepIndex) -> &[StepIndex] {
        self.reverse_edges.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Dependencies naming no step in the graph.
    pub fn dangling(&self) -> &[(String, String)] {
        &self.dangling
    }
}

/// Builder for step graphs.
pub struct DagBuilder<'a> {
    steps: Vec<&'a PlanStep>,
    allow_dangling: bool,
}

impl<'a> DagBuilder<'a> {
    pub fn new(steps: impl IntoIterator<Item = &'a PlanStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            allow_dangling: false,
        }
    }

    pub fn from_plan(plan: &'a Plan) -> Self {
        Self::new(plan.steps())
    }

    /// Record unknown dependency ids instead of rejecting them.
    ///
    /// A plan can legitimately hold such ids after a repair removed a step;
    /// the dependents then stay blocked.
    pub fn allow_dangling(mut self) -> Self {
        self.allow_dangling = true;
        self
    }

    /// Build the step graph.
    ///
    /// This validates the graph structure:
    /// - Step ids must be unique
    /// - All dependencies must reference existing steps (unless allowed)
    /// - No cycles are allowed
    pub fn build(self) -> Result<StepGraph<'a>, PlanError> {
        let mut index_map = HashMap::new();
        for (i, &step) in self.steps.iter().enumerate() {
            if index_map.insert(step.id.as_str(), i).is_some() {
                return Err(PlanError::DuplicateStep(step.id.clone()));
            }
        }

        let mut forward_edges: Vec<Vec<StepIndex>> = vec![Vec::new(); self.steps.len()];
        let mut reverse_edges: Vec<Vec<StepIndex>> = vec![Vec::new(); self.steps.len()];
        let mut dangling = Vec::new();

        for (to_idx, step) in self.steps.iter().enumerate() {
            for dep in &step.dependencies {
                match index_map.get(dep.as_str()) {
                    Some(&from_idx) => {
                        forward_edges[from_idx].push(to_idx);
                        reverse_edges[to_idx].push(from_idx);
                    }
                    None if self.allow_dangling => dangling.push((step.id.clone(), dep.clone())),
                    None => {
                        return Err(PlanError::UnknownDependency {
                            step: step.id.clone(),
                            dependency: dep.clone(),
                        });
                    }
                }
            }
        }

        let graph = StepGraph {
            steps: self.steps,
            forward_edges,
            reverse_edges,
            dangling,
        };

        Self::validate_no_cycles(&graph)?;

        Ok(graph)
    }

    /// Validate that the graph has no cycles using Kahn's algorithm.
    fn validate_no_cycles(graph: &StepGraph<'_>) -> Result<(), PlanError> {
        let mut in_degree: Vec<usize> = graph.reverse_edges.iter().map(Vec::len).collect();

        let mut queue: Vec<StepIndex> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(i, _)| i)
            .collect();

        let mut processed = 0;

        while let Some(node) = queue.pop() {
            processed += 1;

            for &dependent in graph.dependents(node) {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push(dependent);
                }
            }
        }

        if processed != graph.len() {
            let involved: Vec<String> = in_degree
                .iter()
                .enumerate()
                .filter(|&(_, deg)| *deg > 0)
                .filter_map(|(i, _)| graph.get_step(i).map(|s| s.id.clone()))
                .collect();

            return Err(PlanError::Cycle(involved));
        }

        Ok(())
    }
}

/// Check that appending `proposed` to `plan` keeps it a valid DAG.
///
/// New steps must have fresh ids and depend only on steps that exist after
/// the merge. Dangling ids already present in `plan` are tolerated.
pub fn validate_extension(plan: &Plan, proposed: &[PlanStep]) -> Result<(), PlanError> {
    if proposed.is_empty() {
        return Ok(());
    }

    for step in proposed {
        for dep in &step.dependencies {
            let known = plan.contains(dep) || proposed.iter().any(|p| &p.id == dep);
            if !known {
                return Err(PlanError::UnknownDependency {
                    step: step.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    DagBuilder::new(plan.steps().iter().chain(proposed.iter()))
        .allow_dangling()
        .build()
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use voyage_common::StepArgs;

    fn step(id: &str, deps: &[&str]) -> PlanStep {
        PlanStep::new(id, "flights", StepArgs::new()).depends_on(deps.iter().copied())
    }

    #[test]
    fn test_build_simple_graph() {
        let steps = [
            step("a", &[]),
            step("b", &["a"]),
            step("c", &["a"]),
            step("d", &["b", "c"]),
        ];

        let graph = DagBuilder::new(&steps).build().unwrap();

        assert_eq!(graph.len(), 4);
        assert!(graph.dependencies(0).is_empty());
        let dependents = graph.dependents(0);
        assert!(dependents.contains(&1));
        assert!(dependents.contains(&2));
        assert_eq!(graph.dependencies(3).len(), 2);
    }

    #[test]
    fn test_cycle_detection() {
        let steps = [step("a", &["c"]), step("b", &["a"]), step("c", &["b"])];

        let err = DagBuilder::new(&steps).build().unwrap_err();
        match err {
            PlanError::Cycle(ids) => assert_eq!(ids.len(), 3),
            other => panic!("Expected PlanError::Cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_dependency() {
        let steps = [step("a", &["nonexistent"])];

        let err = DagBuilder::new(&steps).build().unwrap_err();
        assert!(err.to_string().contains("nonexistent"));
    }

    #[test]
    fn test_dangling_allowed_when_requested() {
        let steps = [step("a", &[]), step("b", &["gone"])];

        let graph = DagBuilder::new(&steps).allow_dangling().build().unwrap();
        assert_eq!(graph.dangling(), &[("b".to_string(), "gone".to_string())]);
        assert!(graph.dependencies(1).is_empty());
    }

    #[test]
    fn test_duplicate_step_id() {
        let steps = [step("a", &[]), step("a", &[])];

        let err = DagBuilder::new(&steps).build().unwrap_err();
        assert_eq!(err, PlanError::DuplicateStep("a".into()));
    }

    #[test]
    fn test_empty_graph() {
        let steps: Vec<PlanStep> = Vec::new();
        let graph = DagBuilder::new(&steps).build().unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn test_validate_extension() {
        let plan = Plan::new(vec![step("flights_sfo", &[]), step("lodging_1", &["flights_sfo"])]);

        assert!(validate_extension(&plan, &[step("events_1", &["lodging_1"])]).is_ok());
        assert!(validate_extension(&plan, &[step("x", &["y"]), step("y", &[])]).is_ok());

        assert_eq!(
            validate_extension(&plan, &[step("lodging_1", &[])]).unwrap_err(),
            PlanError::DuplicateStep("lodging_1".into())
        );
        assert!(matches!(
            validate_extension(&plan, &[step("events_1", &["nope"])]),
            Err(PlanError::UnknownDependency { .. })
        ));
        assert!(matches!(
            validate_extension(&plan, &[step("x", &["y"]), step("y", &["x"])]),
            Err(PlanError::Cycle(_))
        ));
    }
}
