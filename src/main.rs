use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use voyage::ui::UiMode;

mod cmd;

#[derive(Parser)]
#[command(name = "voyage")]
#[command(version, about = "Itinerary planning orchestrator")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Maximum loop iterations. Overrides voyage.toml and VOYAGE_MAX_ITERATIONS.
    #[arg(long, global = true)]
    pub max_iterations: Option<u32>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Plan, execute, verify and repair a trip request against fixture tools
    Run {
        /// Trip request JSON (constraints plus extracted data)
        #[arg(short, long)]
        request: PathBuf,

        /// Tool fixtures JSON (tool name -> canned payloads)
        #[arg(short, long)]
        fixtures: PathBuf,

        /// Progress output
        #[arg(long, value_enum, default_value_t = UiMode::Full)]
        ui: UiMode,

        /// Print only the final outcome as JSON
        #[arg(long)]
        json: bool,

        /// Append metrics in Prometheus text format
        #[arg(long)]
        metrics: bool,
    },
    /// Show the initial plan and its parallel waves without executing it
    Plan {
        /// Trip request JSON
        #[arg(short, long)]
        request: PathBuf,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default voyage.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Run {
            request,
            fixtures,
            ui,
            json,
            metrics,
        } => {
            let options = cmd::RunOptions {
                request: request.clone(),
                fixtures: fixtures.clone(),
                ui: *ui,
                json: *json,
                metrics: *metrics,
            };
            cmd::cmd_run(&cli, project_dir, options).await?;
        }
        Commands::Plan { request, json } => {
            cmd::cmd_plan(&cli, project_dir, request, *json).await?;
        }
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}
