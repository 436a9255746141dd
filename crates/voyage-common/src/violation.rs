//! Constraint violations produced by the verifier.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constraint::ConstraintKind;

/// How serious a violation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Machine-readable context for repair strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViolationDetail {
    BudgetOverage {
        total: f64,
        limit: f64,
        overage: f64,
    },
    OvernightFlight {
        step_id: String,
        flight_number: String,
    },
    /// `date` is the forecast's date string as reported by the tool.
    RainyDay {
        date: String,
    },
    MissingPreference {
        preference: String,
    },
}

/// A detected breach of a hard or soft constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub constraint_kind: ConstraintKind,
    pub description: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
    pub detail: ViolationDetail,
}

impl Violation {
    pub fn new(
        constraint_kind: ConstraintKind,
        severity: Severity,
        description: impl Into<String>,
        detail: ViolationDetail,
    ) -> Self {
        Self {
            constraint_kind,
            description: description.into(),
            severity,
            suggested_fix: None,
            detail,
        }
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(fix.into());
        self
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.severity, self.constraint_kind, self.description
        )
    }
}
