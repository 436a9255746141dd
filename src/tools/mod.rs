//! Tool capabilities and the invoker that wraps them.
//!
//! A [`Tool`] is an opaque capability (flight search, weather lookup...).
//! Each registered tool is wrapped in a [`ToolHandle`] that owns its result
//! cache and applies validation, bounded retries and timeouts. Handles are
//! collected in a [`ToolSet`], the capability map injected into the
//! executor; there is no global registry.

mod cache;
mod fixture;
mod invoker;
pub mod schema;

pub use cache::{ToolCache, cache_key};
pub use fixture::{FixtureFile, FixtureSpec, FixtureTool, FixtureVariant};
pub use invoker::{ToolHandle, ToolInvocation};
pub use schema::ToolRequest;

use crate::config::InvokerSettings;
use crate::errors::ToolError;
use crate::metrics::MetricsCollector;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use voyage_common::StepArgs;

/// Uniform contract for every capability the planner can schedule.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Per-attempt timeout; the invoker default applies when `None`.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Check arguments against the tool's declared input schema.
    fn validate(&self, args: &StepArgs) -> Result<(), ToolError> {
        schema::validate_args(self.name(), args)
    }

    async fn execute(&self, args: &StepArgs) -> Result<Value, ToolError>;
}

/// The capability map: tool name to handle.
pub struct ToolSet {
    handles: BTreeMap<String, ToolHandle>,
    settings: InvokerSettings,
    metrics: Arc<MetricsCollector>,
    max_retries: u32,
}

impl ToolSet {
    pub fn new(settings: InvokerSettings, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            handles: BTreeMap::new(),
            settings,
            metrics,
            max_retries: 1,
        }
    }

    /// Retry bound applied to every invocation made through this set.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    /// Register a tool, replacing any previous tool of the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let handle = ToolHandle::new(tool, self.settings.clone(), Arc::clone(&self.metrics));
        self.handles.insert(handle.name().to_string(), handle);
    }

    pub fn get(&self, name: &str) -> Option<&ToolHandle> {
        self.handles.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handles.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool_set() -> ToolSet {
        ToolSet::new(InvokerSettings::default(), Arc::new(MetricsCollector::new()))
    }

    #[test]
    fn test_register_and_lookup() {
        let tools = tool_set()
            .with_tool(FixtureTool::new("weather", json!({"daily_forecast": []})))
            .with_tool(FixtureTool::new("flights", json!({"flights": []})));

        assert_eq!(tools.len(), 2);
        assert!(tools.contains("weather"));
        assert!(tools.get("lodging").is_none());
        assert_eq!(tools.names().collect::<Vec<_>>(), vec!["flights", "weather"]);
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut tools = tool_set().with_tool(FixtureTool::new("events", json!({"events": []})));
        tools.register(Arc::new(
            FixtureTool::new("events", json!({"events": [{"name": "Zoo"}]})).with_description("second"),
        ));

        assert_eq!(tools.len(), 1);
        assert_eq!(tools.get("events").map(|h| h.description()), Some("second"));
    }

    #[test]
    fn test_default_retry_bound() {
        assert_eq!(tool_set().max_retries(), 1);
        assert_eq!(tool_set().with_max_retries(3).max_retries(), 3);
    }
}
