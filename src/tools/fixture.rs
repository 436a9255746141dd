//! Canned-response tools for the CLI and for tests.
//!
//! A fixture file maps tool names to payloads:
//!
//! ```json
//! {
//!   "flights": {
//!     "payload": {"flights": [{"flight_number": "UA837", "price_usd": 1200.0}]},
//!     "variants": [
//!       {"when": {"avoid_overnight": true}, "payload": {"flights": []}}
//!     ],
//!     "fail_first": 1
//!   }
//! }
//! ```

use crate::errors::ToolError;
use crate::tools::Tool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use voyage_common::StepArgs;

/// Payload served when every `when` entry equals the step argument of the same name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureVariant {
    pub when: BTreeMap<String, Value>,
    pub payload: Value,
}

impl FixtureVariant {
    fn matches(&self, args: &StepArgs) -> bool {
        self.when.iter().all(|(key, expected)| args.get(key) == Some(expected))
    }
}

/// One tool's entry in a fixture file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureSpec {
    #[serde(default)]
    pub description: Option<String>,
    pub payload: Value,
    #[serde(default)]
    pub variants: Vec<FixtureVariant>,
    /// Fail this many calls before succeeding
    #[serde(default)]
    pub fail_first: usize,
    /// Error message for every call; the tool never succeeds
    #[serde(default)]
    pub always_fail: Option<String>,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// A fixture file: tool name to spec.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FixtureFile {
    pub tools: BTreeMap<String, FixtureSpec>,
}

impl FixtureFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixtures file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse fixtures file: {}", path.display()))
    }

    /// Build one [`FixtureTool`] per entry.
    pub fn into_tools(self) -> Vec<FixtureTool> {
        self.tools
            .into_iter()
            .map(|(name, spec)| FixtureTool::from_spec(&name, spec))
            .collect()
    }
}

/// A [`Tool`] returning a canned payload, with optional scripted failures.
#[derive(Debug)]
pub struct FixtureTool {
    name: String,
    description: String,
    payload: Value,
    variants: Vec<FixtureVariant>,
    fail_first: usize,
    always_fail: Option<String>,
    delay: Option<Duration>,
    timeout: Option<Duration>,
    calls: AtomicUsize,
}

impl FixtureTool {
    pub fn new(name: &str, payload: Value) -> Self {
        Self {
            name: name.to_string(),
            description: format!("Fixture data for {}", name),
            payload,
            variants: Vec::new(),
            fail_first: 0,
            always_fail: None,
            delay: None,
            timeout: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn from_spec(name: &str, spec: FixtureSpec) -> Self {
        let mut tool = Self::new(name, spec.payload);
        if let Some(description) = spec.description {
            tool.description = description;
        }
        tool.variants = spec.variants;
        tool.fail_first = spec.fail_first;
        tool.always_fail = spec.always_fail;
        tool.delay = (spec.delay_ms > 0).then(|| Duration::from_millis(spec.delay_ms));
        tool.timeout = spec.timeout_ms.map(Duration::from_millis);
        tool
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_variant(mut self, when: StepArgs, payload: Value) -> Self {
        let when = when.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        self.variants.push(FixtureVariant { when, payload });
        self
    }

    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    pub fn always_failing(mut self, message: &str) -> Self {
        self.always_fail = Some(message.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Number of `execute` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for FixtureTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn execute(&self, args: &StepArgs) -> Result<Value, ToolError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.always_fail {
            return Err(ToolError::Execution(message.clone()));
        }
        if call < self.fail_first {
            return Err(ToolError::Execution(format!(
                "{} unavailable (scripted failure {} of {})",
                self.name,
                call + 1,
                self.fail_first
            )));
        }

        let payload = self
            .variants
            .iter()
            .find(|v| v.matches(args))
            .map(|v| &v.payload)
            .unwrap_or(&self.payload);
        Ok(payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_variant_selected_by_args() {
        let tool = FixtureTool::new("flights", json!({"flights": ["red-eye"]}))
            .with_variant(StepArgs::new().with("avoid_overnight", true), json!({"flights": ["day"]}));

        let plain = tool.execute(&StepArgs::new()).await.unwrap();
        let day = tool
            .execute(&StepArgs::new().with("avoid_overnight", true).with("origin", "SFO"))
            .await
            .unwrap();

        assert_eq!(plain, json!({"flights": ["red-eye"]}));
        assert_eq!(day, json!({"flights": ["day"]}));
        assert_eq!(tool.call_count(), 2);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let tool = FixtureTool::new("lodging", json!({})).failing_first(2);
        assert!(tool.execute(&StepArgs::new()).await.is_err());
        assert!(tool.execute(&StepArgs::new()).await.is_err());
        assert!(tool.execute(&StepArgs::new()).await.is_ok());
    }

    #[test]
    fn test_fixture_file_parsing() {
        let file: FixtureFile = serde_json::from_value(json!({
            "weather": {"payload": {"daily_forecast": []}, "delay_ms": 5},
            "events": {"payload": {"events": []}, "always_fail": "quota exceeded"}
        }))
        .unwrap();

        let tools = file.into_tools();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name(), "events");
        assert_eq!(tools[0].always_fail.as_deref(), Some("quota exceeded"));
        assert_eq!(tools[1].delay, Some(Duration::from_millis(5)));
    }
}
