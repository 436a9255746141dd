//! Shared domain types for the Voyage planning loop.
//!
//! Everything the control loop passes between its components lives here:
//! constraints, plan steps and the plan store, the working set, tool-call
//! records, violations, and budget counters. All of it is serializable so a
//! downstream summarizer can consume a finished run as-is.

pub mod budget;
pub mod constraint;
pub mod plan;
pub mod record;
pub mod violation;
pub mod working_set;

pub use budget::BudgetCounters;
pub use constraint::{Constraint, ConstraintKind, ConstraintSet, ConstraintValue};
pub use plan::{ArgsError, Plan, PlanStep, StepArgs, StepStatus};
pub use record::ToolCallRecord;
pub use violation::{Severity, Violation, ViolationDetail};
pub use working_set::WorkingSet;
