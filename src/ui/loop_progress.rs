//! Control-loop progress UI.
//!
//! Renders [`LoopEvent`]s as they arrive. Supports three output modes:
//! - `full`: colored lines plus a spinner while a batch runs
//! - `minimal`: one line per batch and a final status line
//! - `json`: one JSON event per line

use crate::dag::BatchSummary;
use crate::orchestrator::{LoopEvent, RunOutcome, Termination};
use crate::ui::icons::{BLOCKER, CACHED, CHECK, CROSS, PLAN, REPAIR, RUNNING, SPARKLE, WARN};
use clap::ValueEnum;
use console::{Term, style};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum UiMode {
    #[default]
    Full,
    Minimal,
    Json,
}

pub struct LoopUI {
    mode: UiMode,
    verbose: bool,
    term: Term,
    /// Spinner shown while a batch is in flight
    spinner: Mutex<Option<ProgressBar>>,
}

impl LoopUI {
    pub fn new(mode: UiMode, verbose: bool) -> Self {
        Self {
            mode,
            verbose,
            term: Term::stdout(),
            spinner: Mutex::new(None),
        }
    }

    pub fn handle_event(&self, event: &LoopEvent) {
        match self.mode {
            UiMode::Json => self.handle_json(event),
            UiMode::Minimal => self.handle_minimal(event),
            UiMode::Full => self.handle_full(event),
        }
    }

    fn line(&self, text: String) {
        let _ = writeln!(&self.term, "{}", text);
    }

    fn handle_json(&self, event: &LoopEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            self.line(json);
        }
    }

    fn handle_minimal(&self, event: &LoopEvent) {
        match event {
            LoopEvent::BatchFinished { iteration, summary } => {
                self.line(format!(
                    "Iteration {}: {} completed, {} failed",
                    iteration, summary.completed, summary.failed
                ));
            }
            LoopEvent::Terminated {
                iteration,
                termination,
            } => {
                self.line(format!("Done after {} iteration(s): {}", iteration, termination));
            }
            _ => {}
        }
    }

    fn handle_full(&self, event: &LoopEvent) {
        match event {
            LoopEvent::PhaseStarted { iteration, phase } => {
                if self.verbose {
                    self.line(format!(
                        "  {}",
                        style(format!("iteration {} · {}", iteration, phase)).dim()
                    ));
                }
            }
            LoopEvent::PlanExtended { iteration, steps } => {
                self.line(format!(
                    "{}Iteration {}: planned {}",
                    PLAN,
                    style(iteration).cyan(),
                    style(steps.join(", ")).yellow()
                ));
            }
            LoopEvent::BatchStarted { steps, .. } => self.start_spinner(steps),
            LoopEvent::BatchFinished { summary, .. } => {
                self.stop_spinner();
                self.print_batch(summary);
            }
            LoopEvent::Verified {
                violations,
                total_cost,
                ..
            } => {
                if *violations == 0 {
                    self.line(format!(
                        "  {}Constraints satisfied (estimated total {:.2})",
                        CHECK, total_cost
                    ));
                } else {
                    self.line(format!(
                        "  {}{} violation(s), estimated total {:.2}",
                        WARN,
                        style(violations).yellow().bold(),
                        total_cost
                    ));
                }
            }
            LoopEvent::Repaired {
                applied, rejected, ..
            } => {
                let rejected = if *rejected > 0 {
                    format!(", {} rejected", style(rejected).red())
                } else {
                    String::new()
                };
                self.line(format!("  {}Repair: {} patch(es) applied{}", REPAIR, applied, rejected));
            }
            LoopEvent::Terminated { .. } => self.stop_spinner(),
        }
    }

    fn start_spinner(&self, steps: &[String]) {
        let bar = ProgressBar::new_spinner();
        if let Ok(spinner_style) = ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg}") {
            bar.set_style(spinner_style);
        }
        bar.set_message(format!("{}running {}", RUNNING, steps.join(", ")));
        bar.enable_steady_tick(Duration::from_millis(100));

        if let Ok(mut spinner) = self.spinner.lock() {
            if let Some(previous) = spinner.replace(bar) {
                previous.finish_and_clear();
            }
        }
    }

    fn stop_spinner(&self) {
        if let Ok(mut spinner) = self.spinner.lock()
            && let Some(bar) = spinner.take()
        {
            bar.finish_and_clear();
        }
    }

    fn print_batch(&self, summary: &BatchSummary) {
        for (step_id, result) in &summary.step_results {
            if result.success {
                let cached = if result.cached {
                    format!(" {}", CACHED)
                } else {
                    String::new()
                };
                self.line(format!(
                    "  {}{} {}{}",
                    CHECK,
                    style(step_id).green(),
                    style(format_duration(result.duration)).dim(),
                    cached
                ));
            } else {
                self.line(format!(
                    "  {}{}: {}",
                    CROSS,
                    style(step_id).red().bold(),
                    result.error.as_deref().unwrap_or("unknown error")
                ));
            }
        }
    }

    /// Final summary of a run.
    pub fn print_outcome(&self, outcome: &RunOutcome) {
        if self.mode == UiMode::Json {
            if let Ok(json) = serde_json::to_string_pretty(outcome) {
                self.line(json);
            }
            return;
        }

        let state = &outcome.state;
        self.line(String::new());
        let headline = match outcome.termination {
            Termination::Completed => format!(
                "{}Run {} in {} iteration(s)",
                SPARKLE,
                style("completed").green().bold(),
                outcome.iterations()
            ),
            other => format!(
                "{}Run stopped ({}) after {} iteration(s)",
                WARN,
                style(other).yellow().bold(),
                outcome.iterations()
            ),
        };
        self.line(headline);

        let budget = &state.budget;
        self.line(format!(
            "  Budget ({}): flights {:.2}, lodging {:.2}, activities {:.2}, transport {:.2}, total {}",
            budget.currency,
            budget.flights,
            budget.lodging,
            budget.activities,
            budget.transport,
            style(format!("{:.2}", budget.total)).bold()
        ));
        self.line(format!(
            "  Steps: {} total, {} tool call(s)",
            state.plan.len(),
            state.tool_calls.len()
        ));

        for violation in outcome.violations() {
            self.line(format!("  {}{}", WARN, violation));
        }
        for step in &outcome.failed_steps {
            self.line(format!("  {}{} failed", CROSS, style(step).red()));
        }
        for blocked in &outcome.blocked {
            let waiting: Vec<String> = blocked
                .waiting_on
                .iter()
                .map(|d| format!("{} ({:?})", d.id, d.reason))
                .collect();
            self.line(format!(
                "  {}{} waiting on {}",
                BLOCKER,
                style(&blocked.step_id).yellow(),
                waiting.join(", ")
            ));
        }
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}s", secs)
    } else {
        format!("{}ms", d.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ui_mode_values() {
        assert_eq!(UiMode::from_str("json", false).unwrap(), UiMode::Json);
        assert_eq!(UiMode::from_str("MINIMAL", true).unwrap(), UiMode::Minimal);
        assert!(UiMode::from_str("fancy", true).is_err());
        assert_eq!(UiMode::default(), UiMode::Full);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
    }
}
