//! In-process metrics for tool calls and loop phases.
//!
//! A [`MetricsCollector`] is shared (behind an `Arc`) between the tool
//! handles and the orchestrator. Counters live behind a single `Mutex`;
//! readers take a [`MetricsSnapshot`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write as _;
use std::sync::Mutex;
use std::time::Instant;

/// Samples kept per phase timing series.
const MAX_SAMPLES: usize = 1000;

#[derive(Debug, Default)]
struct Counters {
    phase_timings: BTreeMap<String, VecDeque<u64>>,
    tool_calls: BTreeMap<String, u64>,
    tool_errors: BTreeMap<String, u64>,
    tool_latency_ms: BTreeMap<String, u64>,
    cache_hits: u64,
    cache_misses: u64,
    runs: u64,
}

/// Thread-safe metrics sink.
#[derive(Debug)]
pub struct MetricsCollector {
    inner: Mutex<Counters>,
    started: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Counters::default()),
            started: Instant::now(),
        }
    }

    fn with_counters<R>(&self, f: impl FnOnce(&mut Counters) -> R) -> R {
        // A panic while holding the lock leaves plain counters, still usable.
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Record one tool invocation, cached or not.
    pub fn record_tool_call(&self, tool_name: &str, success: bool, cached: bool, duration_ms: u64) {
        self.with_counters(|c| {
            *c.tool_calls.entry(tool_name.to_string()).or_default() += 1;
            *c.tool_latency_ms.entry(tool_name.to_string()).or_default() += duration_ms;
            if !success {
                *c.tool_errors.entry(tool_name.to_string()).or_default() += 1;
            }
            if cached {
                c.cache_hits += 1;
            } else {
                c.cache_misses += 1;
            }
        });
    }

    /// Record the duration of one loop phase.
    pub fn record_phase_timing(&self, phase: &str, duration_ms: u64) {
        self.with_counters(|c| {
            let samples = c.phase_timings.entry(phase.to_string()).or_default();
            samples.push_back(duration_ms);
            if samples.len() > MAX_SAMPLES {
                samples.pop_front();
            }
        });
    }

    pub fn record_run(&self) {
        self.with_counters(|c| c.runs += 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let uptime_seconds = self.started.elapsed().as_secs_f64();
        self.with_counters(|c| {
            let lookups = c.cache_hits + c.cache_misses;
            let hit_rate = if lookups > 0 {
                c.cache_hits as f64 / lookups as f64
            } else {
                0.0
            };

            let tools = c
                .tool_calls
                .iter()
                .map(|(name, &calls)| {
                    let errors = c.tool_errors.get(name).copied().unwrap_or(0);
                    let latency = c.tool_latency_ms.get(name).copied().unwrap_or(0);
                    let stats = ToolStats {
                        calls,
                        errors,
                        error_rate: if calls > 0 { errors as f64 / calls as f64 } else { 0.0 },
                        avg_latency_ms: if calls > 0 { latency as f64 / calls as f64 } else { 0.0 },
                    };
                    (name.clone(), stats)
                })
                .collect();

            let phases = c
                .phase_timings
                .iter()
                .filter_map(|(name, samples)| {
                    TimingStats::from_samples(samples).map(|stats| (name.clone(), stats))
                })
                .collect();

            MetricsSnapshot {
                uptime_seconds,
                runs: c.runs,
                cache: CacheStats {
                    hits: c.cache_hits,
                    misses: c.cache_misses,
                    hit_rate,
                },
                phases,
                tools,
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolStats {
    pub calls: u64,
    pub errors: u64,
    pub error_rate: f64,
    pub avg_latency_ms: f64,
}

/// Summary statistics over a phase timing series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingStats {
    pub count: usize,
    pub avg_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
}

impl TimingStats {
    fn from_samples(samples: &VecDeque<u64>) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<u64> = samples.iter().copied().collect();
        sorted.sort_unstable();
        let sum: u64 = sorted.iter().sum();

        Some(Self {
            count: sorted.len(),
            avg_ms: sum as f64 / sorted.len() as f64,
            min_ms: sorted[0],
            max_ms: sorted[sorted.len() - 1],
            p95_ms: percentile(&sorted, 95),
            p99_ms: percentile(&sorted, 99),
        })
    }
}

/// Nearest-rank percentile over sorted, non-empty samples.
fn percentile(sorted: &[u64], pct: usize) -> u64 {
    let index = (pct * sorted.len()) / 100;
    sorted[index.min(sorted.len() - 1)]
}

/// Point-in-time view of the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: f64,
    pub runs: u64,
    pub cache: CacheStats,
    pub phases: BTreeMap<String, TimingStats>,
    pub tools: BTreeMap<String, ToolStats>,
}

impl MetricsSnapshot {
    /// Render in the Prometheus text exposition format.
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "# HELP voyage_uptime_seconds Process uptime in seconds");
        let _ = writeln!(out, "# TYPE voyage_uptime_seconds counter");
        let _ = writeln!(out, "voyage_uptime_seconds {}", self.uptime_seconds);
        let _ = writeln!(out);

        let _ = writeln!(out, "# HELP voyage_runs_total Total orchestrator runs");
        let _ = writeln!(out, "# TYPE voyage_runs_total counter");
        let _ = writeln!(out, "voyage_runs_total {}", self.runs);
        let _ = writeln!(out);

        let _ = writeln!(out, "# HELP voyage_cache_hit_rate Tool cache hit rate");
        let _ = writeln!(out, "# TYPE voyage_cache_hit_rate gauge");
        let _ = writeln!(out, "voyage_cache_hit_rate {}", self.cache.hit_rate);
        let _ = writeln!(out);

        let _ = writeln!(out, "# HELP voyage_cache_operations_total Tool cache lookups");
        let _ = writeln!(out, "# TYPE voyage_cache_operations_total counter");
        let _ = writeln!(out, "voyage_cache_operations_total{{type=\"hit\"}} {}", self.cache.hits);
        let _ = writeln!(out, "voyage_cache_operations_total{{type=\"miss\"}} {}", self.cache.misses);
        let _ = writeln!(out);

        let _ = writeln!(out, "# HELP voyage_phase_duration_ms Loop phase duration in milliseconds");
        let _ = writeln!(out, "# TYPE voyage_phase_duration_ms summary");
        for (phase, stats) in &self.phases {
            let _ = writeln!(
                out,
                "voyage_phase_duration_ms{{phase=\"{phase}\",quantile=\"0.95\"}} {}",
                stats.p95_ms
            );
            let _ = writeln!(
                out,
                "voyage_phase_duration_ms{{phase=\"{phase}\",quantile=\"0.99\"}} {}",
                stats.p99_ms
            );
            let _ = writeln!(
                out,
                "voyage_phase_duration_ms_sum{{phase=\"{phase}\"}} {}",
                stats.avg_ms * stats.count as f64
            );
            let _ = writeln!(out, "voyage_phase_duration_ms_count{{phase=\"{phase}\"}} {}", stats.count);
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "# HELP voyage_tool_calls_total Total tool calls");
        let _ = writeln!(out, "# TYPE voyage_tool_calls_total counter");
        let _ = writeln!(out, "# HELP voyage_tool_errors_total Total failed tool calls");
        let _ = writeln!(out, "# TYPE voyage_tool_errors_total counter");
        for (tool, stats) in &self.tools {
            let _ = writeln!(out, "voyage_tool_calls_total{{tool=\"{tool}\"}} {}", stats.calls);
            let _ = writeln!(out, "voyage_tool_errors_total{{tool=\"{tool}\"}} {}", stats.errors);
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_calls_and_cache_rate() {
        let metrics = MetricsCollector::new();
        metrics.record_tool_call("flights", true, false, 40);
        metrics.record_tool_call("flights", true, true, 0);
        metrics.record_tool_call("lodging", false, false, 20);

        let snap = metrics.snapshot();
        assert_eq!(snap.cache.hits, 1);
        assert_eq!(snap.cache.misses, 2);
        assert!((snap.cache.hit_rate - 1.0 / 3.0).abs() < 1e-9);

        let flights = &snap.tools["flights"];
        assert_eq!(flights.calls, 2);
        assert_eq!(flights.errors, 0);
        assert_eq!(flights.avg_latency_ms, 20.0);
        assert_eq!(snap.tools["lodging"].error_rate, 1.0);
    }

    #[test]
    fn test_phase_timing_stats() {
        let metrics = MetricsCollector::new();
        for ms in 1..=100 {
            metrics.record_phase_timing("execute", ms);
        }

        let snap = metrics.snapshot();
        let stats = &snap.phases["execute"];
        assert_eq!(stats.count, 100);
        assert_eq!(stats.min_ms, 1);
        assert_eq!(stats.max_ms, 100);
        assert_eq!(stats.avg_ms, 50.5);
        assert_eq!(stats.p95_ms, 96);
        assert_eq!(stats.p99_ms, 100);
    }

    #[test]
    fn test_timing_series_is_bounded() {
        let metrics = MetricsCollector::new();
        for ms in 0..(MAX_SAMPLES as u64 + 10) {
            metrics.record_phase_timing("verify", ms);
        }
        let snap = metrics.snapshot();
        assert_eq!(snap.phases["verify"].count, MAX_SAMPLES);
        assert_eq!(snap.phases["verify"].min_ms, 10);
    }

    #[test]
    fn test_empty_snapshot_has_zero_hit_rate() {
        let snap = MetricsCollector::new().snapshot();
        assert_eq!(snap.cache.hit_rate, 0.0);
        assert!(snap.tools.is_empty());
        assert!(snap.phases.is_empty());
    }

    #[test]
    fn test_prometheus_rendering() {
        let metrics = MetricsCollector::new();
        metrics.record_run();
        metrics.record_tool_call("weather", false, false, 5);
        metrics.record_phase_timing("plan", 3);

        let text = metrics.snapshot().to_prometheus();
        assert!(text.contains("voyage_runs_total 1"));
        assert!(text.contains("voyage_tool_errors_total{tool=\"weather\"} 1"));
        assert!(text.contains("voyage_phase_duration_ms_count{phase=\"plan\"} 1"));
        assert!(text.contains("voyage_cache_operations_total{type=\"miss\"} 1"));
    }
}
