//! Configuration view and validation commands: `voyage config`.

use anyhow::Result;

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    use voyage::config::{CONFIG_FILE, VOYAGE_DIR, VoyageConfig, VoyageToml};

    let voyage_dir = project_dir.join(VOYAGE_DIR);
    let config_path = voyage_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Voyage Configuration");
            println!("====================");
            println!();

            let toml = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                VoyageToml::load(&config_path)?
            } else {
                println!("No voyage.toml found at {}", config_path.display());
                println!("Using default configuration.");
                VoyageToml::default()
            };
            println!();

            println!("[tools]");
            println!("  max_retries = {}", toml.tools.max_retries);
            println!("  timeout_secs = {}", toml.tools.timeout_secs);
            println!("  cache_ttl_secs = {}", toml.tools.cache_ttl_secs);
            println!("  retry_jitter_min_ms = {}", toml.tools.retry_jitter_min_ms);
            println!("  retry_jitter_max_ms = {}", toml.tools.retry_jitter_max_ms);
            println!();

            println!("[loop]");
            println!("  max_iterations = {}", toml.run_loop.max_iterations);
            match toml.run_loop.max_in_flight {
                Some(n) => println!("  max_in_flight = {}", n),
                None => println!("  max_in_flight = (unbounded)"),
            }
            println!();

            println!("[budget]");
            println!("  currency = \"{}\"", toml.budget.currency);
            println!();

            println!("[logging]");
            println!("  level = \"{}\"", toml.logging.level);
            println!("  format = \"{:?}\"", toml.logging.format);
            println!();

            // Show effective values (including env overrides)
            println!("Effective values (with env/CLI overrides):");
            let config = VoyageConfig::new(project_dir.to_path_buf())?;
            println!("  max_iterations = {}", config.max_iterations());
            println!("  max_retries = {}", config.max_retries());
            println!("  log_level = \"{}\"", config.log_level());
            println!();

            if !config_path.exists() {
                println!("Run 'voyage config init' to create a voyage.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No voyage.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = VoyageToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("voyage.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if !voyage_dir.exists() {
                std::fs::create_dir_all(&voyage_dir)?;
            }

            let toml = VoyageToml::default();
            toml.save(&config_path)?;

            println!("Created voyage.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [tools] retries, timeouts, cache TTL");
            println!("  - [loop] max_iterations, max_in_flight");
            println!("  - [budget] currency, [logging] level and format");
            println!();
        }
    }

    Ok(())
}
