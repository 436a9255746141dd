//! Run orchestration.
//!
//! [`Orchestrator::run`] owns the [`RunState`] for one trip request and
//! drives it through plan, route, execute, verify and repair until every
//! step is terminal with no violations, the loop stops making progress, or
//! the iteration cap is reached.

mod report;
mod runner;
mod state;

pub use report::{RunOutcome, Termination};
pub use runner::{DEFAULT_MAX_ITERATIONS, LoopEvent, Orchestrator};
pub use state::{LoopPhase, RunState, TripRequest};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InvokerSettings;
    use crate::dag::BlockReason;
    use crate::errors::{OrchestratorError, PlanError};
    use crate::metrics::MetricsCollector;
    use crate::planner::{PlanProposal, Planner};
    use crate::tools::{FixtureTool, ToolSet};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use voyage_common::{
        Constraint, ConstraintSet, Plan, PlanStep, StepArgs, StepStatus, WorkingSet,
    };

    /// Proposes a fixed set of steps for an empty plan, nothing afterwards.
    struct Scripted(Vec<PlanStep>);

    #[async_trait]
    impl Planner for Scripted {
        async fn plan(
            &self,
            _constraints: &ConstraintSet,
            current_plan: &Plan,
            _working_set: &WorkingSet,
        ) -> PlanProposal {
            PlanProposal {
                steps: if current_plan.is_empty() { self.0.clone() } else { Vec::new() },
                reasoning: "scripted".into(),
            }
        }
    }

    fn toolset() -> ToolSet {
        let settings = InvokerSettings::default().with_jitter(Duration::ZERO, Duration::ZERO);
        ToolSet::new(settings, Arc::new(MetricsCollector::new())).with_max_retries(0)
    }

    fn chain() -> Scripted {
        Scripted(vec![
            PlanStep::new("a", "alpha", StepArgs::new()),
            PlanStep::new("b", "beta", StepArgs::new()).depends_on(["a"]),
        ])
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_failed_step_blocks_dependent_and_stalls() {
        let beta = Arc::new(FixtureTool::new("beta", json!({"ok": true})));
        let mut tools = toolset().with_tool(FixtureTool::new("alpha", json!({})).always_failing("boom"));
        tools.register(beta.clone());

        let outcome = Orchestrator::new(tools)
            .with_planner(Box::new(chain()))
            .run(TripRequest::default())
            .await
            .unwrap();

        assert_eq!(outcome.termination, Termination::NoProgress);
        assert_eq!(outcome.iterations(), 2);
        assert_eq!(outcome.failed_steps, vec!["a"]);
        assert_eq!(outcome.blocked.len(), 1);
        assert_eq!(outcome.blocked[0].step_id, "b");
        assert_eq!(outcome.blocked[0].waiting_on[0].reason, BlockReason::Failed);
        assert_eq!(outcome.state.plan.status_of("b"), Some(StepStatus::Pending));
        assert!(outcome.state.working_set.contains_key("alpha_a_error"));
        assert_eq!(beta.call_count(), 0);
    }

    #[tokio::test]
    async fn test_iteration_cap() {
        let tools = toolset()
            .with_tool(FixtureTool::new("alpha", json!({})).always_failing("boom"))
            .with_tool(FixtureTool::new("beta", json!({})));

        let outcome = Orchestrator::new(tools)
            .with_planner(Box::new(chain()))
            .with_max_iterations(1)
            .run(TripRequest::default())
            .await
            .unwrap();

        assert_eq!(outcome.termination, Termination::IterationBudgetExhausted);
        assert_eq!(outcome.iterations(), 1);
        assert_eq!(outcome.failed_steps, vec!["a"]);
    }

    #[tokio::test]
    async fn test_invalid_plan_aborts() {
        let planner = Scripted(vec![PlanStep::new("a", "alpha", StepArgs::new()).depends_on(["ghost"])]);

        let err = Orchestrator::new(toolset())
            .with_planner(Box::new(planner))
            .run(TripRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrchestratorError::Plan(PlanError::UnknownDependency { .. })
        ));
    }

    #[tokio::test]
    async fn test_budget_overage_repaired_to_completion() {
        let tools = toolset()
            .with_tool(FixtureTool::new(
                "flights",
                json!({"flights": [{"flight_number": "UA837", "price_usd": 1200.0,
                    "departure_time": "2025-04-01T11:00:00", "arrival_time": "2025-04-02T15:00:00"}]}),
            ))
            .with_tool(
                FixtureTool::new(
                    "lodging",
                    json!({"lodgings": [{"total_price": 900.0, "price_per_night": 180.0}]}),
                )
                .with_variant(
                    StepArgs::new().with("max_results", 2),
                    json!({"lodgings": [{"total_price": 500.0, "price_per_night": 100.0}]}),
                ),
            )
            .with_tool(FixtureTool::new("transit", json!({"routes": [{"cost_usd": 20.0}]})));

        let request = TripRequest::new(ConstraintSet::new(vec![
            Constraint::budget(2000.0),
            Constraint::dates(date("2025-04-01"), date("2025-04-06")),
            Constraint::airports(&["SFO"], "NRT"),
            Constraint::preference("Destination: Tokyo"),
        ]));

        let outcome = Orchestrator::new(tools).run(request).await.unwrap();

        assert_eq!(outcome.termination, Termination::Completed);
        assert!(outcome.violations().is_empty());
        assert_eq!(outcome.state.budget.total, 1720.0);
        assert_eq!(outcome.state.tool_calls.len(), 5);
        assert_eq!(outcome.metrics.runs, 1);
        assert_eq!(outcome.metrics.tools["flights"].calls, 2);
        assert!(outcome.metrics.phases.contains_key("verify"));
        assert!(outcome.failed_steps.is_empty());
        assert!(outcome.blocked.is_empty());
    }

    #[tokio::test]
    async fn test_events_are_streamed() {
        let (tx, mut rx) = mpsc::channel(1024);
        let tools = toolset().with_tool(FixtureTool::new("alpha", json!({})));
        let planner = Scripted(vec![PlanStep::new("a", "alpha", StepArgs::new())]);

        let outcome = Orchestrator::new(tools)
            .with_planner(Box::new(planner))
            .with_event_channel(tx)
            .run(TripRequest::default())
            .await
            .unwrap();
        assert_eq!(outcome.termination, Termination::Completed);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        assert!(matches!(
            events.first(),
            Some(LoopEvent::PhaseStarted { iteration: 1, phase: LoopPhase::Plan })
        ));
        assert!(events.iter().any(|e| matches!(e, LoopEvent::BatchFinished { .. })));
        assert!(matches!(
            events.last(),
            Some(LoopEvent::Terminated {
                termination: Termination::Completed,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_dry_run_plans_without_executing() {
        let alpha = Arc::new(FixtureTool::new("alpha", json!({})));
        let mut tools = toolset();
        tools.register(alpha.clone());

        let state = Orchestrator::new(tools)
            .with_planner(Box::new(chain()))
            .dry_run(TripRequest::default())
            .await
            .unwrap();

        assert_eq!(state.plan.len(), 2);
        assert_eq!(state.plan.count(StepStatus::Pending), 2);
        assert_eq!(alpha.call_count(), 0);
    }
}
