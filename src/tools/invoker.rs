//! Cached, validated, bounded-retry invocation of a single tool.

use crate::config::InvokerSettings;
use crate::errors::ToolError;
use crate::metrics::MetricsCollector;
use crate::tools::Tool;
use crate::tools::cache::{ToolCache, cache_key};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use voyage_common::StepArgs;

/// Outcome of one invocation through a [`ToolHandle`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub cached: bool,
    pub duration_ms: u64,
    /// Attempts that reached the tool (0 for cache hits and rejected input)
    pub attempts: u32,
}

impl ToolInvocation {
    fn success(data: Value, cached: bool, attempts: u32, started: Instant) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            cached,
            duration_ms: elapsed_ms(started),
            attempts,
        }
    }

    fn failure(error: String, attempts: u32, started: Instant) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            cached: false,
            duration_ms: elapsed_ms(started),
            attempts,
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// A registered tool plus its private cache.
pub struct ToolHandle {
    tool: Arc<dyn Tool>,
    cache: ToolCache,
    settings: InvokerSettings,
    metrics: Arc<MetricsCollector>,
}

impl ToolHandle {
    pub fn new(tool: Arc<dyn Tool>, settings: InvokerSettings, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            tool,
            cache: ToolCache::new(settings.cache_ttl),
            settings,
            metrics,
        }
    }

    pub fn name(&self) -> &str {
        self.tool.name()
    }

    pub fn description(&self) -> &str {
        self.tool.description()
    }

    pub fn cache(&self) -> &ToolCache {
        &self.cache
    }

    fn timeout(&self) -> Duration {
        self.tool.timeout().unwrap_or(self.settings.default_timeout)
    }

    fn retry_delay(&self) -> Duration {
        let min = self.settings.jitter_min;
        let max = self.settings.jitter_max;
        if max <= min {
            return min;
        }
        let lo = u64::try_from(min.as_millis()).unwrap_or(u64::MAX);
        let hi = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
    }

    /// Invoke the tool with up to `max_retries + 1` attempts.
    ///
    /// Never returns an error: failures are reported in the
    /// [`ToolInvocation`] so a failing tool cannot abort the run.
    /// Concurrent calls with equal arguments reach the tool once.
    pub async fn invoke(&self, args: &StepArgs, max_retries: u32) -> ToolInvocation {
        let started = Instant::now();
        let key = cache_key(self.name(), args);

        if let Some(data) = self.cache.get(&key) {
            tracing::debug!(tool = self.name(), "tool cache hit");
            return self.finish(ToolInvocation::success(data, true, 0, started));
        }

        let lock = self.cache.key_lock(&key);
        let outcome = {
            let _guard = lock.lock().await;
            match self.cache.get(&key) {
                Some(data) => {
                    tracing::debug!(tool = self.name(), "tool cache hit after waiting on identical call");
                    ToolInvocation::success(data, true, 0, started)
                }
                None => self.execute_uncached(&key, args, max_retries, started).await,
            }
        };
        self.cache.release_key(&key, lock);
        self.finish(outcome)
    }

    async fn execute_uncached(
        &self,
        key: &str,
        args: &StepArgs,
        max_retries: u32,
        started: Instant,
    ) -> ToolInvocation {
        if let Err(err) = self.tool.validate(args) {
            tracing::warn!(tool = self.name(), error = %err, "tool input rejected");
            return ToolInvocation::failure(err.to_string(), 0, started);
        }

        let attempts = max_retries.saturating_add(1);
        let timeout = self.timeout();
        let mut last_error: Option<ToolError> = None;

        for attempt in 1..=attempts {
            let error = match tokio::time::timeout(timeout, self.tool.execute(args)).await {
                Ok(Ok(data)) => {
                    self.cache.insert(key.to_string(), data.clone());
                    return ToolInvocation::success(data, false, attempt, started);
                }
                Ok(Err(err)) => err,
                Err(_) => ToolError::Timeout {
                    tool: self.name().to_string(),
                    timeout,
                },
            };

            if !error.is_retryable() {
                tracing::warn!(tool = self.name(), attempt, error = %error, "tool failed, not retrying");
                return ToolInvocation::failure(error.to_string(), attempt, started);
            }

            tracing::warn!(tool = self.name(), attempt, attempts, error = %error, "tool attempt failed");
            last_error = Some(error);

            if attempt < attempts {
                tokio::time::sleep(self.retry_delay()).await;
            }
        }

        let last = last_error.map(|e| e.to_string()).unwrap_or_default();
        ToolInvocation::failure(
            format!("Tool execution failed after {} attempts: {}", attempts, last),
            attempts,
            started,
        )
    }

    fn finish(&self, outcome: ToolInvocation) -> ToolInvocation {
        self.metrics
            .record_tool_call(self.name(), outcome.success, outcome.cached, outcome.duration_ms);
        tracing::info!(
            tool = self.name(),
            success = outcome.success,
            cached = outcome.cached,
            attempts = outcome.attempts,
            duration_ms = outcome.duration_ms,
            "tool invocation finished"
        );
        outcome
    }
}
