//! Step graph, routing and batch execution.
//!
//! The plan store is a DAG of tool steps. This module has three parts:
//!
//! 1. **Builder** - validates a set of steps as a DAG (unique ids, known
//!    dependencies, no cycles)
//! 2. **Scheduler** - selects ready steps and marks them running; also
//!    computes parallel waves and reports blocked steps
//! 3. **Executor** - runs every running step concurrently and merges the
//!    results into the run state after the join
//!
//! ## Example
//!
//! ```
//! use voyage::dag::{compute_waves, select_ready};
//! use voyage_common::{Plan, PlanStep, StepArgs};
//!
//! let mut plan = Plan::new(vec![
//!     PlanStep::new("flights_sfo", "flights", StepArgs::new()),
//!     PlanStep::new("weather_1", "weather", StepArgs::new()),
//!     PlanStep::new("lodging_1", "lodging", StepArgs::new()).depends_on(["flights_sfo"]),
//! ]);
//!
//! // Wave 0: [flights_sfo, weather_1]
//! // Wave 1: [lodging_1]
//! assert_eq!(compute_waves(&plan).len(), 2);
//!
//! let ready = select_ready(&mut plan);
//! assert_eq!(ready, vec!["flights_sfo", "weather_1"]);
//! ```

mod builder;
mod executor;
mod scheduler;
mod state;

pub use builder::{DagBuilder, StepGraph, StepIndex, validate_extension};
pub use executor::{BatchOutcome, DagExecutor, StepExecution};
pub use scheduler::{
    BlockReason, BlockedStep, UnmetDependency, blocked_steps, compute_waves,
    dependencies_satisfied, select_ready,
};
pub use state::{BatchSummary, ExecutionTimer, StepResult};
