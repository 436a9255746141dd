//! The plan → route → execute → verify → repair control loop.

use crate::config::VoyageConfig;
use crate::dag::{BatchSummary, DagExecutor, ExecutionTimer, blocked_steps, select_ready, validate_extension};
use crate::errors::OrchestratorError;
use crate::orchestrator::{LoopPhase, RunOutcome, RunState, Termination, TripRequest};
use crate::planner::{PlanProposal, Planner, TravelPlanner};
use crate::repair::Repairer;
use crate::tools::ToolSet;
use crate::verifier::Verifier;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::Instrument;
use voyage_common::StepStatus;
use voyage_common::working_set::PLANNER_REASONING_KEY;

/// Default iteration cap when none is configured.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Progress events emitted while the loop runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    /// The loop entered a phase.
    PhaseStarted { iteration: u32, phase: LoopPhase },
    /// The planner appended steps.
    PlanExtended { iteration: u32, steps: Vec<String> },
    /// A batch of ready steps was dispatched.
    BatchStarted { iteration: u32, steps: Vec<String> },
    /// A batch finished and was merged into the run state.
    BatchFinished { iteration: u32, summary: BatchSummary },
    /// Verification finished.
    Verified {
        iteration: u32,
        violations: usize,
        total_cost: f64,
    },
    /// A repair pass finished.
    Repaired {
        iteration: u32,
        applied: usize,
        rejected: usize,
    },
    /// The loop stopped.
    Terminated { iteration: u32, termination: Termination },
}

/// Drives one run from constraints to a terminal state.
pub struct Orchestrator {
    tools: ToolSet,
    planner: Box<dyn Planner>,
    repairer: Repairer,
    verifier: Verifier,
    currency: String,
    max_iterations: u32,
    max_in_flight: Option<usize>,
    event_tx: Option<mpsc::Sender<LoopEvent>>,
}

impl Orchestrator {
    pub fn new(tools: ToolSet) -> Self {
        Self {
            tools,
            planner: Box::new(TravelPlanner),
            repairer: Repairer::default(),
            verifier: Verifier::default(),
            currency: "USD".to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_in_flight: None,
            event_tx: None,
        }
    }

    /// Build with the loop limits and currency from resolved configuration.
    pub fn from_config(config: &VoyageConfig, tools: ToolSet) -> Self {
        Self::new(tools)
            .with_max_iterations(config.max_iterations())
            .with_max_in_flight(config.toml.run_loop.max_in_flight)
            .with_currency(&config.toml.budget.currency)
    }

    pub fn with_planner(mut self, planner: Box<dyn Planner>) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_repairer(mut self, repairer: Repairer) -> Self {
        self.repairer = repairer;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: Option<usize>) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    /// Currency used for budget counters when no budget constraint names one.
    pub fn with_currency(mut self, currency: &str) -> Self {
        self.currency = currency.to_string();
        self.verifier = Verifier::new(currency);
        self
    }

    pub fn with_event_channel(mut self, tx: mpsc::Sender<LoopEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    async fn emit_event(&self, event: LoopEvent) {
        if let Some(ref tx) = self.event_tx {
            tx.send(event).await.ok();
        }
    }

    async fn enter(&self, state: &mut RunState, phase: LoopPhase) {
        state.phase = phase;
        tracing::debug!(iteration = state.iteration, %phase, "entering phase");
        self.emit_event(LoopEvent::PhaseStarted {
            iteration: state.iteration,
            phase,
        })
        .await;
    }

    fn record_phase(&self, phase: LoopPhase, timer: &ExecutionTimer) {
        self.tools
            .metrics()
            .record_phase_timing(phase.as_str(), timer.elapsed_ms());
    }

    /// Ask the planner for steps and merge them after validation.
    async fn plan_step(&self, state: &mut RunState) -> Result<Vec<String>, OrchestratorError> {
        let PlanProposal { steps, reasoning } = self
            .planner
            .plan(&state.constraints, &state.plan, &state.working_set)
            .await;

        validate_extension(&state.plan, &steps)?;

        let ids: Vec<String> = steps.iter().map(|s| s.id.clone()).collect();
        for step in steps {
            state.plan.push(step);
        }
        state.working_set.note(PLANNER_REASONING_KEY, reasoning);

        if !ids.is_empty() {
            tracing::info!(steps = ?ids, total = state.plan.len(), "plan extended");
        }
        Ok(ids)
    }

    /// Produce the initial plan without executing anything.
    pub async fn dry_run(&self, request: TripRequest) -> Result<RunState, OrchestratorError> {
        let mut state = RunState::new(request, &self.currency);
        state.phase = LoopPhase::Plan;
        self.plan_step(&mut state).await?;
        Ok(state)
    }

    /// Run the control loop until it completes, stalls, or hits the
    /// iteration cap.
    ///
    /// Tool failures never abort the run; only a structurally invalid plan
    /// does.
    pub async fn run(&self, request: TripRequest) -> Result<RunOutcome, OrchestratorError> {
        let mut state = RunState::new(request, &self.currency);
        let mut last_fingerprint: Option<String> = None;

        tracing::info!(
            run_id = %state.run_id,
            constraints = state.constraints.len(),
            max_iterations = self.max_iterations,
            "run started"
        );

        let termination = loop {
            if state.iteration >= self.max_iterations {
                // Repair cleared the last verdict; report the one that stands.
                let verification = self.verifier.verify(&state.constraints, &state.working_set);
                state.budget = verification.budget;
                state.violations = verification.violations;
                break Termination::IterationBudgetExhausted;
            }
            state.iteration += 1;

            let span = tracing::info_span!("iteration", n = state.iteration);
            let verdict = self
                .iterate(&mut state, &mut last_fingerprint)
                .instrument(span)
                .await?;
            if let Some(termination) = verdict {
                break termination;
            }
        };

        state.phase = LoopPhase::Done;
        self.tools.metrics().record_run();

        let blocked = blocked_steps(&state.plan);
        let failed_steps = state.failed_steps();

        tracing::info!(
            run_id = %state.run_id,
            %termination,
            iterations = state.iteration,
            violations = state.violations.len(),
            failed = failed_steps.len(),
            blocked = blocked.len(),
            "run finished"
        );

        self.emit_event(LoopEvent::Terminated {
            iteration: state.iteration,
            termination,
        })
        .await;

        Ok(RunOutcome {
            termination,
            state,
            blocked,
            failed_steps,
            metrics: self.tools.metrics().snapshot(),
        })
    }

    /// One pass through the loop; `Some` when the run should stop.
    async fn iterate(
        &self,
        state: &mut RunState,
        last_fingerprint: &mut Option<String>,
    ) -> Result<Option<Termination>, OrchestratorError> {
        let iteration = state.iteration;

        self.enter(state, LoopPhase::Plan).await;
        let timer = ExecutionTimer::start();
        let added = self.plan_step(state).await?;
        self.record_phase(LoopPhase::Plan, &timer);
        if !added.is_empty() {
            self.emit_event(LoopEvent::PlanExtended {
                iteration,
                steps: added,
            })
            .await;
        }

        self.enter(state, LoopPhase::Route).await;
        let timer = ExecutionTimer::start();
        let ready = select_ready(&mut state.plan);
        self.record_phase(LoopPhase::Route, &timer);

        self.enter(state, LoopPhase::Execute).await;
        if !ready.is_empty() {
            self.emit_event(LoopEvent::BatchStarted {
                iteration,
                steps: ready,
            })
            .await;
            let timer = ExecutionTimer::start();
            let outcome = DagExecutor::new(&self.tools)
                .with_max_in_flight(self.max_in_flight)
                .run(&state.plan)
                .await;
            let summary = outcome.apply(state)?;
            self.record_phase(LoopPhase::Execute, &timer);
            self.emit_event(LoopEvent::BatchFinished { iteration, summary })
                .await;
        }

        self.enter(state, LoopPhase::Verify).await;
        let timer = ExecutionTimer::start();
        let verification = self.verifier.verify(&state.constraints, &state.working_set);
        state.budget = verification.budget;
        state.violations = verification.violations;
        self.record_phase(LoopPhase::Verify, &timer);
        for violation in &state.violations {
            tracing::info!(severity = %violation.severity, kind = ?violation.constraint_kind, "{}", violation.description);
        }
        self.emit_event(LoopEvent::Verified {
            iteration,
            violations: state.violations.len(),
            total_cost: state.budget.total,
        })
        .await;

        let fingerprint = state.fingerprint();
        if last_fingerprint.as_deref() == Some(fingerprint.as_str()) {
            tracing::warn!(
                pending = state.plan.count(StepStatus::Pending),
                violations = state.violations.len(),
                "no progress since the previous iteration"
            );
            return Ok(Some(Termination::NoProgress));
        }
        *last_fingerprint = Some(fingerprint);

        if !state.violations.is_empty() {
            self.enter(state, LoopPhase::Repair).await;
            let timer = ExecutionTimer::start();
            let report = self.repairer.repair(state).await;
            self.record_phase(LoopPhase::Repair, &timer);
            self.emit_event(LoopEvent::Repaired {
                iteration,
                applied: report.applied.len(),
                rejected: report.rejected.len(),
            })
            .await;
            return Ok(None);
        }

        if state.plan.all_terminal() {
            return Ok(Some(Termination::Completed));
        }
        Ok(None)
    }
}

