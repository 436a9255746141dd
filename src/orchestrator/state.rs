use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;
use voyage_common::{
    BudgetCounters, ConstraintSet, Plan, ToolCallRecord, Violation, WorkingSet,
};

/// Stage of the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    #[default]
    Extract,
    Plan,
    Route,
    Execute,
    Verify,
    Repair,
    Done,
}

impl LoopPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopPhase::Extract => "extract",
            LoopPhase::Plan => "plan",
            LoopPhase::Route => "route",
            LoopPhase::Execute => "execute",
            LoopPhase::Verify => "verify",
            LoopPhase::Repair => "repair",
            LoopPhase::Done => "done",
        }
    }
}

impl fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upstream input: extracted constraints plus the raw extraction payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TripRequest {
    pub constraints: ConstraintSet,
    #[serde(default)]
    pub extracted_data: Value,
}

impl TripRequest {
    pub fn new(constraints: ConstraintSet) -> Self {
        Self {
            constraints,
            extracted_data: Value::Null,
        }
    }

    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse request file: {}", path.display()))
    }
}

/// Everything the control loop owns for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub constraints: ConstraintSet,
    pub plan: Plan,
    pub working_set: WorkingSet,
    pub tool_calls: Vec<ToolCallRecord>,
    pub budget: BudgetCounters,
    pub violations: Vec<Violation>,
    pub iteration: u32,
    pub phase: LoopPhase,
}

impl RunState {
    pub fn new(request: TripRequest, currency: &str) -> Self {
        let working_set = if request.extracted_data.is_null() {
            WorkingSet::new()
        } else {
            WorkingSet::seeded(request.extracted_data)
        };

        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            constraints: request.constraints,
            plan: Plan::default(),
            working_set,
            tool_calls: Vec::new(),
            budget: BudgetCounters::new(currency),
            violations: Vec::new(),
            iteration: 0,
            phase: LoopPhase::Extract,
        }
    }

    /// Digest of the plan (ids, tools, args, dependencies, statuses) and
    /// the current violations.
    ///
    /// Two iterations with the same fingerprint mean the loop is not
    /// moving.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for step in self.plan.steps() {
            hasher.update(step.id.as_bytes());
            hasher.update(b"|");
            hasher.update(step.tool_name.as_bytes());
            hasher.update(b"|");
            hasher.update(step.args.to_value().to_string().as_bytes());
            hasher.update(b"|");
            for dep in &step.dependencies {
                hasher.update(dep.as_bytes());
                hasher.update(b",");
            }
            hasher.update(b"|");
            hasher.update(format!("{:?}", step.status).as_bytes());
            hasher.update(b"\n");
        }
        for violation in &self.violations {
            hasher.update(violation.to_string().as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }

    /// Ids of failed steps, in plan order.
    pub fn failed_steps(&self) -> Vec<String> {
        self.plan
            .steps_with_status(voyage_common::StepStatus::Failed)
            .map(|s| s.id.clone())
            .collect()
    }
}
