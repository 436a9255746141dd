//! Control loop execution: `voyage run`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::super::Cli;
use voyage::config::VoyageConfig;
use voyage::metrics::MetricsCollector;
use voyage::tools::{FixtureFile, ToolSet};
use voyage::ui::UiMode;

pub struct RunOptions {
    pub request: PathBuf,
    pub fixtures: PathBuf,
    pub ui: UiMode,
    pub json: bool,
    pub metrics: bool,
}

/// Load resolved configuration and start logging.
pub fn load_config(cli: &Cli, project_dir: PathBuf) -> Result<VoyageConfig> {
    let config = VoyageConfig::with_cli_args(project_dir, cli.verbose, cli.max_iterations)?;
    voyage::telemetry::init(&config.log_level(), config.log_format());
    for warning in config.toml.validate() {
        tracing::warn!("{}", warning);
    }
    Ok(config)
}

/// Capability map backed by the fixtures file.
fn load_tools(config: &VoyageConfig, fixtures: &Path) -> Result<ToolSet> {
    let file = FixtureFile::load(fixtures)?;
    let mut tools = ToolSet::new(config.invoker_settings(), Arc::new(MetricsCollector::new()))
        .with_max_retries(config.max_retries());
    for tool in file.into_tools() {
        tools.register(Arc::new(tool));
    }
    if tools.is_empty() {
        anyhow::bail!("No tools defined in {}", fixtures.display());
    }
    tracing::debug!(tools = ?tools.names().collect::<Vec<_>>(), "tools registered");
    Ok(tools)
}

pub async fn cmd_run(cli: &Cli, project_dir: PathBuf, options: RunOptions) -> Result<()> {
    use tokio::sync::mpsc;
    use voyage::orchestrator::{LoopEvent, Orchestrator, TripRequest};
    use voyage::ui::LoopUI;

    let config = load_config(cli, project_dir)?;
    let request = TripRequest::load(&options.request)?;
    let tools = load_tools(&config, &options.fixtures)?;

    let mut orchestrator = Orchestrator::from_config(&config, tools);
    let ui = Arc::new(LoopUI::new(options.ui, cli.verbose));

    // Progress is rendered on a separate task; the loop only waits on it
    // when the event buffer is full.
    let printer = if options.json {
        None
    } else {
        let (event_tx, mut event_rx) = mpsc::channel::<LoopEvent>(100);
        orchestrator = orchestrator.with_event_channel(event_tx);
        let ui = ui.clone();
        Some(tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                ui.handle_event(&event);
            }
        }))
    };

    let result = orchestrator.run(request).await;
    // Closes the event channel so the printer drains and exits.
    drop(orchestrator);
    if let Some(printer) = printer {
        printer.await.ok();
    }
    let outcome = result.context("Run aborted")?;

    if options.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("Failed to serialize run outcome")?
        );
    } else {
        ui.print_outcome(&outcome);
    }

    if options.metrics {
        println!();
        print!("{}", outcome.metrics.to_prometheus());
    }

    Ok(())
}
