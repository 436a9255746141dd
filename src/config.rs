//! Unified configuration for Voyage.
//!
//! Settings are read from `.voyage/voyage.toml` and layered
//! file → environment → CLI.
//!
//! # Configuration File Format
//!
//! ```toml
//! [tools]
//! max_retries = 1
//! timeout_secs = 30
//! cache_ttl_secs = 900
//! retry_jitter_min_ms = 100
//! retry_jitter_max_ms = 500
//!
//! [loop]
//! max_iterations = 10
//! # max_in_flight = 8
//!
//! [budget]
//! currency = "USD"
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the project-local configuration directory.
pub const VOYAGE_DIR: &str = ".voyage";
/// Name of the configuration file inside [`VOYAGE_DIR`].
pub const CONFIG_FILE: &str = "voyage.toml";

/// Tool invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsSection {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-attempt timeout, unless the tool declares its own
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Lifetime of cached successful results
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_jitter_min_ms")]
    pub retry_jitter_min_ms: u64,
    #[serde(default = "default_jitter_max_ms")]
    pub retry_jitter_max_ms: u64,
}

fn default_max_retries() -> u32 {
    1
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_cache_ttl_secs() -> u64 {
    15 * 60
}

fn default_jitter_min_ms() -> u64 {
    100
}

fn default_jitter_max_ms() -> u64 {
    500
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            retry_jitter_min_ms: default_jitter_min_ms(),
            retry_jitter_max_ms: default_jitter_max_ms(),
        }
    }
}

/// Control-loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopSection {
    /// Hard cap on plan→verify iterations
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Bound on concurrent tool calls within one batch (unbounded if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_in_flight: Option<usize>,
}

fn default_max_iterations() -> u32 {
    10
}

impl Default for LoopSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_in_flight: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetSection {
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Default for BudgetSection {
    fn default() -> Self {
        Self {
            currency: default_currency(),
        }
    }
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: pretty, json", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Filter directive, e.g. "info" or "voyage=debug"
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// The complete voyage.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoyageToml {
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default, rename = "loop")]
    pub run_loop: LoopSection,
    #[serde(default)]
    pub budget: BudgetSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl VoyageToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse voyage.toml")
    }

    /// Load from `<voyage_dir>/voyage.toml`, or defaults if it doesn't exist.
    pub fn load_or_default(voyage_dir: &Path) -> Result<Self> {
        let config_path = voyage_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize voyage.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.tools.retry_jitter_min_ms > self.tools.retry_jitter_max_ms {
            warnings.push(format!(
                "retry_jitter_min_ms ({}) is greater than retry_jitter_max_ms ({}); the minimum will be used",
                self.tools.retry_jitter_min_ms, self.tools.retry_jitter_max_ms
            ));
        }
        if self.tools.timeout_secs == 0 {
            warnings.push("tools.timeout_secs is 0: every tool call will time out".to_string());
        }
        if self.run_loop.max_iterations == 0 {
            warnings.push("loop.max_iterations is 0: runs will stop before planning".to_string());
        }
        if self.run_loop.max_in_flight == Some(0) {
            warnings.push("loop.max_in_flight is 0; it will be treated as 1".to_string());
        }

        warnings
    }
}

/// Resolved configuration combining the file, environment, and CLI.
#[derive(Debug, Clone)]
pub struct VoyageConfig {
    pub project_dir: PathBuf,
    pub voyage_dir: PathBuf,
    pub toml: VoyageToml,
    /// CLI override for max_iterations
    pub cli_max_iterations: Option<u32>,
    /// CLI verbose flag
    pub verbose: bool,
}

impl VoyageConfig {
    /// Load configuration for a project directory.
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let voyage_dir = project_dir.join(VOYAGE_DIR);
        let toml = VoyageToml::load_or_default(&voyage_dir)?;

        Ok(Self {
            project_dir,
            voyage_dir,
            toml,
            cli_max_iterations: None,
            verbose: false,
        })
    }

    /// Load configuration with CLI overrides.
    pub fn with_cli_args(
        project_dir: PathBuf,
        verbose: bool,
        max_iterations: Option<u32>,
    ) -> Result<Self> {
        let mut config = Self::new(project_dir)?;
        config.verbose = verbose;
        config.cli_max_iterations = max_iterations;
        Ok(config)
    }

    pub fn config_file(&self) -> PathBuf {
        self.voyage_dir.join(CONFIG_FILE)
    }

    /// Iteration cap (CLI → env → file).
    pub fn max_iterations(&self) -> u32 {
        self.cli_max_iterations
            .or_else(|| env_parse("VOYAGE_MAX_ITERATIONS"))
            .unwrap_or(self.toml.run_loop.max_iterations)
    }

    /// Retry bound (env → file).
    pub fn max_retries(&self) -> u32 {
        env_parse("VOYAGE_MAX_RETRIES").unwrap_or(self.toml.tools.max_retries)
    }

    /// Log filter directive (verbose → env → file).
    pub fn log_level(&self) -> String {
        if self.verbose {
            return "debug".to_string();
        }
        std::env::var("VOYAGE_LOG").unwrap_or_else(|_| self.toml.logging.level.clone())
    }

    pub fn log_format(&self) -> LogFormat {
        self.toml.logging.format
    }

    /// Settings for the tool invoker.
    pub fn invoker_settings(&self) -> InvokerSettings {
        InvokerSettings::from_section(&self.toml.tools)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Resolved settings handed to every tool handle.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokerSettings {
    pub default_timeout: Duration,
    pub cache_ttl: Duration,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
}

impl Default for InvokerSettings {
    fn default() -> Self {
        Self::from_section(&ToolsSection::default())
    }
}

impl InvokerSettings {
    pub fn from_section(tools: &ToolsSection) -> Self {
        let jitter_min = tools.retry_jitter_min_ms;
        let jitter_max = tools.retry_jitter_max_ms.max(jitter_min);
        Self {
            default_timeout: Duration::from_secs(tools.timeout_secs),
            cache_ttl: Duration::from_secs(tools.cache_ttl_secs),
            jitter_min: Duration::from_millis(jitter_min),
            jitter_max: Duration::from_millis(jitter_max),
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_jitter(mut self, min: Duration, max: Duration) -> Self {
        self.jitter_min = min;
        self.jitter_max = max.max(min);
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let toml = VoyageToml::default();
        assert_eq!(toml.tools.max_retries, 1);
        assert_eq!(toml.tools.cache_ttl_secs, 900);
        assert_eq!(toml.tools.retry_jitter_min_ms, 100);
        assert_eq!(toml.tools.retry_jitter_max_ms, 500);
        assert_eq!(toml.run_loop.max_iterations, 10);
        assert!(toml.run_loop.max_in_flight.is_none());
        assert_eq!(toml.budget.currency, "USD");
        assert_eq!(toml.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let toml = VoyageToml::parse(
            r#"
[loop]
max_iterations = 4
max_in_flight = 2

[logging]
format = "json"
"#,
        )
        .unwrap();
        assert_eq!(toml.run_loop.max_iterations, 4);
        assert_eq!(toml.run_loop.max_in_flight, Some(2));
        assert_eq!(toml.logging.format, LogFormat::Json);
        assert_eq!(toml.tools.timeout_secs, 30);
    }

    #[test]
    fn test_parse_invalid_toml_errors() {
        let result = VoyageToml::parse("[tools\nmax_retries = ");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_warnings() {
        let mut toml = VoyageToml::default();
        assert!(toml.validate().is_empty());

        toml.tools.retry_jitter_min_ms = 900;
        toml.run_loop.max_iterations = 0;
        let warnings = toml.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("retry_jitter_min_ms"));
    }

    #[test]
    fn test_save_and_load_roundtrip_through_dir() {
        let dir = tempdir().unwrap();
        let voyage_dir = dir.path().join(VOYAGE_DIR);
        fs::create_dir_all(&voyage_dir).unwrap();

        let mut toml = VoyageToml::default();
        toml.run_loop.max_iterations = 3;
        toml.save(&voyage_dir.join(CONFIG_FILE)).unwrap();

        let config = VoyageConfig::with_cli_args(dir.path().to_path_buf(), false, None).unwrap();
        assert_eq!(config.toml.run_loop.max_iterations, 3);

        let config = VoyageConfig::with_cli_args(dir.path().to_path_buf(), true, Some(7)).unwrap();
        assert_eq!(config.max_iterations(), 7);
        assert_eq!(config.log_level(), "debug");
    }

    #[test]
    fn test_invoker_settings_clamp_jitter() {
        let section = ToolsSection {
            retry_jitter_min_ms: 300,
            retry_jitter_max_ms: 100,
            ..ToolsSection::default()
        };
        let settings = InvokerSettings::from_section(&section);
        assert_eq!(settings.jitter_min, Duration::from_millis(300));
        assert_eq!(settings.jitter_max, Duration::from_millis(300));
        assert_eq!(settings.cache_ttl, Duration::from_secs(900));
    }
}
