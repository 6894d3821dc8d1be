/**
 * Execution Monitor
 *
 * DESIGN DECISION: A single append-only event log plus incrementally
 * maintained rolling aggregates, rather than recomputing aggregates from
 * the log on every read
 * WHY: this Monitor runs indefinitely alongside live execution, so
 * aggregates are updated as each event arrives and read in O(1) rather
 * than replaying the whole history.
 *
 * REASONING CHAIN:
 * 1. Every recorded event updates the rolling counts, the per-category/
 *    priority histograms, the memory high-water mark, and (for started/
 *    completed/failed) the learning state the Scorer reads back.
 * 2. Bottleneck analysis and system health are derived views over the
 *    current aggregates, computed on demand rather than stored.
 * 3. History itself (the event log) is retained indefinitely — the
 *    Monitor does not age it out itself; external eviction is the
 *    caller's responsibility.
 *
 * PATTERN: Pattern-MONITOR-001 (Real-Time Metrics), built on an aggregate
 * counter plus on-demand health-check structure.
 */

use crate::model::{PriorityLevel, TaskCategory, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Kind of a recorded execution event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Started,
    Completed,
    Failed,
    Cancelled,
    Retried,
}

/// A single recorded task execution event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub task_id: TaskId,
    pub kind: EventKind,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub duration: Option<Duration>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub memory_bytes: Option<u64>,
    #[serde(default)]
    pub category: Option<TaskCategory>,
    #[serde(default)]
    pub priority: Option<PriorityLevel>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Rolling counts and derived statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub total_retries: u64,
    #[serde(with = "duration_millis")]
    pub average_execution_time: Duration,
    pub success_rate: f64,
    /// Keyed by `{:?}` of the category, JSON-object-friendly.
    pub category_histogram: HashMap<String, u64>,
    pub priority_histogram: HashMap<String, u64>,
    pub memory_high_water: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BottleneckKind {
    SlowExecution,
    MemoryPressure,
    Reliability,
}

/// `{kind, severity, recommendation}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bottleneck {
    pub kind: BottleneckKind,
    pub severity: Severity,
    pub recommendation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

/// Four-dimension system health classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SystemHealth {
    pub overall: HealthStatus,
    pub memory: HealthStatus,
    pub performance: HealthStatus,
    pub reliability: HealthStatus,
}

const SLOW_EXECUTION_THRESHOLD: Duration = Duration::from_secs(15 * 60);
const MEMORY_PRESSURE_THRESHOLD: u64 = 512 * 1024 * 1024;
const RELIABILITY_RETRY_FRACTION_THRESHOLD: f64 = 0.10;

/// Bounded per-task timing stats fed back into the Scorer's learning state.
#[derive(Debug, Clone, Copy, Default)]
struct TaskTiming {
    total_duration: Duration,
    attempts: u64,
}

/// Records execution events, maintains rolling aggregates, and derives
/// bottleneck/health views.
#[derive(Debug, Default)]
pub struct ExecutionMonitor {
    events: Vec<ExecutionEvent>,
    running_tasks: std::collections::HashSet<TaskId>,
    completed: u64,
    failed: u64,
    cancelled: u64,
    total_retries: u64,
    total_duration: Duration,
    duration_samples: u64,
    category_histogram: HashMap<String, u64>,
    priority_histogram: HashMap<String, u64>,
    memory_high_water: u64,
    task_timing: HashMap<TaskId, TaskTiming>,
}

impl ExecutionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event and updates all rolling aggregates in O(1).
    pub fn record(&mut self, event: ExecutionEvent) {
        match event.kind {
            EventKind::Started => {
                self.running_tasks.insert(event.task_id.clone());
            }
            EventKind::Completed => {
                self.running_tasks.remove(&event.task_id);
                self.completed += 1;
                if let Some(duration) = event.duration {
                    self.total_duration += duration;
                    self.duration_samples += 1;
                    let timing = self.task_timing.entry(event.task_id.clone()).or_default();
                    timing.total_duration += duration;
                    timing.attempts += 1;
                }
            }
            EventKind::Failed => {
                self.running_tasks.remove(&event.task_id);
                self.failed += 1;
                if let Some(duration) = event.duration {
                    let timing = self.task_timing.entry(event.task_id.clone()).or_default();
                    timing.total_duration += duration;
                    timing.attempts += 1;
                }
            }
            EventKind::Cancelled => {
                self.running_tasks.remove(&event.task_id);
                self.cancelled += 1;
            }
            EventKind::Retried => {
                self.total_retries += 1;
            }
        }

        if let Some(category) = event.category {
            *self.category_histogram.entry(format!("{category:?}")).or_insert(0) += 1;
        }
        if let Some(priority) = event.priority {
            *self.priority_histogram.entry(format!("{priority:?}")).or_insert(0) += 1;
        }
        if let Some(bytes) = event.memory_bytes {
            self.memory_high_water = self.memory_high_water.max(bytes);
        }

        self.events.push(event);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let average_execution_time = if self.duration_samples == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.duration_samples as u32
        };
        let settled = self.completed + self.failed;
        let success_rate = if settled == 0 {
            1.0
        } else {
            self.completed as f64 / settled as f64
        };

        MetricsSnapshot {
            total: self.events.len() as u64,
            running: self.running_tasks.len() as u64,
            completed: self.completed,
            failed: self.failed,
            cancelled: self.cancelled,
            total_retries: self.total_retries,
            average_execution_time,
            success_rate,
            category_histogram: self.category_histogram.clone(),
            priority_histogram: self.priority_histogram.clone(),
            memory_high_water: self.memory_high_water,
        }
    }

    /// Derives bottlenecks from the current aggregates against the fixed
    /// thresholds.
    pub fn bottlenecks(&self) -> Vec<Bottleneck> {
        let snapshot = self.snapshot();
        let mut bottlenecks = Vec::new();

        if snapshot.average_execution_time > SLOW_EXECUTION_THRESHOLD {
            let severity = if snapshot.average_execution_time > SLOW_EXECUTION_THRESHOLD * 2 {
                Severity::Critical
            } else {
                Severity::High
            };
            bottlenecks.push(Bottleneck {
                kind: BottleneckKind::SlowExecution,
                severity,
                recommendation: "consider splitting long-running tasks or raising concurrency".to_string(),
            });
        }

        if snapshot.memory_high_water > MEMORY_PRESSURE_THRESHOLD {
            let severity = if snapshot.memory_high_water > MEMORY_PRESSURE_THRESHOLD * 2 {
                Severity::Critical
            } else {
                Severity::Medium
            };
            bottlenecks.push(Bottleneck {
                kind: BottleneckKind::MemoryPressure,
                severity,
                recommendation: "reduce batch size or add a memory resource constraint".to_string(),
            });
        }

        let total_attempts = snapshot.completed + snapshot.failed;
        if total_attempts > 0 {
            let retry_fraction = snapshot.total_retries as f64 / total_attempts as f64;
            if retry_fraction > RELIABILITY_RETRY_FRACTION_THRESHOLD {
                let severity = if retry_fraction > RELIABILITY_RETRY_FRACTION_THRESHOLD * 3.0 {
                    Severity::Critical
                } else {
                    Severity::Medium
                };
                bottlenecks.push(Bottleneck {
                    kind: BottleneckKind::Reliability,
                    severity,
                    recommendation: "investigate repeated failures before raising concurrency".to_string(),
                });
            }
        }

        bottlenecks
    }

    /// Four-dimension classification derived from the current aggregates.
    pub fn system_health(&self) -> SystemHealth {
        let snapshot = self.snapshot();
        let bottlenecks = self.bottlenecks();

        let memory = classify(
            snapshot.memory_high_water,
            MEMORY_PRESSURE_THRESHOLD,
            MEMORY_PRESSURE_THRESHOLD * 2,
        );
        let performance = classify(
            snapshot.average_execution_time.as_secs(),
            SLOW_EXECUTION_THRESHOLD.as_secs(),
            SLOW_EXECUTION_THRESHOLD.as_secs() * 2,
        );
        let reliability = if snapshot.success_rate >= 0.95 {
            HealthStatus::Healthy
        } else if snapshot.success_rate >= 0.80 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Critical
        };

        let overall = if bottlenecks.iter().any(|b| b.severity == Severity::Critical) {
            HealthStatus::Critical
        } else if !bottlenecks.is_empty() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        SystemHealth {
            overall,
            memory,
            performance,
            reliability,
        }
    }

    /// Per-task observed mean duration and attempt count, the shape the
    /// Scorer's learning loop reads back.
    pub fn learning_feed(&self, task_id: &TaskId) -> Option<(Duration, u64)> {
        self.task_timing
            .get(task_id)
            .filter(|t| t.attempts > 0)
            .map(|t| (t.total_duration / t.attempts as u32, t.attempts))
    }

    pub fn events(&self) -> &[ExecutionEvent] {
        &self.events
    }
}

fn classify(value: u64, degraded_at: u64, critical_at: u64) -> HealthStatus {
    if value > critical_at {
        HealthStatus::Critical
    } else if value > degraded_at {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(task: &str, kind: EventKind, duration: Option<Duration>) -> ExecutionEvent {
        ExecutionEvent {
            task_id: TaskId::new(task),
            kind,
            timestamp: Utc::now(),
            duration,
            error: None,
            memory_bytes: None,
            category: None,
            priority: None,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn success_rate_is_completed_over_settled() {
        let mut monitor = ExecutionMonitor::new();
        monitor.record(event("A", EventKind::Started, None));
        monitor.record(event("A", EventKind::Completed, Some(Duration::from_secs(5))));
        monitor.record(event("B", EventKind::Started, None));
        monitor.record(event("B", EventKind::Failed, Some(Duration::from_secs(5))));

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.success_rate, 0.5);
    }

    #[test]
    fn slow_execution_bottleneck_detected_past_fifteen_minutes() {
        let mut monitor = ExecutionMonitor::new();
        monitor.record(event("A", EventKind::Completed, Some(Duration::from_secs(20 * 60))));
        let bottlenecks = monitor.bottlenecks();
        assert!(bottlenecks.iter().any(|b| b.kind == BottleneckKind::SlowExecution));
    }

    #[test]
    fn memory_pressure_bottleneck_detected_past_512mb() {
        let mut monitor = ExecutionMonitor::new();
        let mut e = event("A", EventKind::Completed, Some(Duration::from_secs(1)));
        e.memory_bytes = Some(600 * 1024 * 1024);
        monitor.record(e);
        let bottlenecks = monitor.bottlenecks();
        assert!(bottlenecks.iter().any(|b| b.kind == BottleneckKind::MemoryPressure));
    }

    #[test]
    fn reliability_bottleneck_detected_past_ten_percent_retries() {
        let mut monitor = ExecutionMonitor::new();
        for _ in 0..9 {
            monitor.record(event("A", EventKind::Completed, Some(Duration::from_secs(1))));
        }
        monitor.record(event("A", EventKind::Failed, Some(Duration::from_secs(1))));
        for _ in 0..5 {
            monitor.record(event("A", EventKind::Retried, None));
        }
        let bottlenecks = monitor.bottlenecks();
        assert!(bottlenecks.iter().any(|b| b.kind == BottleneckKind::Reliability));
    }

    #[test]
    fn healthy_system_with_no_events() {
        let monitor = ExecutionMonitor::new();
        let health = monitor.system_health();
        assert_eq!(health.overall, HealthStatus::Healthy);
    }

    #[test]
    fn learning_feed_reflects_recorded_durations() {
        let mut monitor = ExecutionMonitor::new();
        monitor.record(event("A", EventKind::Completed, Some(Duration::from_secs(10))));
        monitor.record(event("A", EventKind::Completed, Some(Duration::from_secs(20))));
        let (mean, attempts) = monitor.learning_feed(&TaskId::new("A")).unwrap();
        assert_eq!(mean, Duration::from_secs(15));
        assert_eq!(attempts, 2);
    }
}
