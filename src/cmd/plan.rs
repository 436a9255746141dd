//! Dry-run planning: `voyage plan`.

use anyhow::{Context, Result};
use console::style;
use std::path::{Path, PathBuf};

use super::super::Cli;
use super::run::load_config;

pub async fn cmd_plan(cli: &Cli, project_dir: PathBuf, request: &Path, json: bool) -> Result<()> {
    use voyage::dag::compute_waves;
    use voyage::metrics::MetricsCollector;
    use voyage::orchestrator::{Orchestrator, TripRequest};
    use voyage::tools::ToolSet;
    use voyage_common::working_set::PLANNER_REASONING_KEY;

    let config = load_config(cli, project_dir)?;
    let request = TripRequest::load(request)?;

    // Planning needs no tools; the map stays empty.
    let tools = ToolSet::new(config.invoker_settings(), std::sync::Arc::new(MetricsCollector::new()));
    let state = Orchestrator::from_config(&config, tools)
        .dry_run(request)
        .await
        .context("Planning failed")?;

    let waves = compute_waves(&state.plan);

    if json {
        let doc = serde_json::json!({
            "plan": state.plan,
            "waves": waves,
            "reasoning": state.working_set.get_note(PLANNER_REASONING_KEY),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&doc).context("Failed to serialize plan")?
        );
        return Ok(());
    }

    println!();
    println!("{}", style("Plan").bold());
    println!("{}", style("====").bold());
    if let Some(reasoning) = state.working_set.get_note(PLANNER_REASONING_KEY) {
        println!("{}", style(reasoning).dim());
    }
    println!();

    for (i, wave) in waves.iter().enumerate() {
        println!("Wave {}:", style(i).cyan().bold());
        for id in wave {
            let Some(step) = state.plan.get(id) else {
                continue;
            };
            let deps: Vec<&str> = step.dependencies.iter().map(String::as_str).collect();
            let after = if deps.is_empty() {
                String::new()
            } else {
                format!(" {}", style(format!("(after {})", deps.join(", "))).dim())
            };
            println!(
                "  {} {}{}",
                style(&step.id).yellow(),
                style(format!("[{}]", step.tool_name)).dim(),
                after
            );
        }
    }
    println!();
    println!(
        "{} step(s) in {} wave(s)",
        state.plan.len(),
        waves.len()
    );

    Ok(())
}
