/**
 * Task Data Model
 *
 * DESIGN DECISION: TaskId as a newtype over String rather than a bare alias
 * WHY: The Analyzer's resource-edge tie-breaker and the critical-path tie-
 * breaker both require lexicographic ordering on ids; wrapping the string
 * makes `Ord` part of the type's contract instead of something callers have
 * to remember `String` happens to provide.
 *
 * PATTERN: Pattern-001 (Planning Core Data Model)
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Stable task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Closed set of task categories, used by the Analyzer's structural-ordering
/// pass and the Scorer's category-aware weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Analysis,
    Design,
    Feature,
    Testing,
    Documentation,
    Deployment,
    Build,
    Other,
}

impl TaskCategory {
    /// Position in the canonical analysis → design → feature/build → testing
    /// → deployment chain. `None` for categories the structural pass does
    /// not order (documentation, other).
    pub fn structural_rank(self) -> Option<u8> {
        match self {
            TaskCategory::Analysis => Some(0),
            TaskCategory::Design => Some(1),
            TaskCategory::Feature | TaskCategory::Build => Some(2),
            TaskCategory::Testing => Some(3),
            TaskCategory::Deployment => Some(4),
            TaskCategory::Documentation | TaskCategory::Other => None,
        }
    }
}

/// Priority level (critical > high > medium > low), with a fixed mapping to
/// the numeric `basePriority` the Scorer uses internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl PriorityLevel {
    /// basePriority mapping: critical=100, high=75, medium=50, low=25.
    pub fn base_priority(self) -> u8 {
        match self {
            PriorityLevel::Critical => 100,
            PriorityLevel::High => 75,
            PriorityLevel::Medium => 50,
            PriorityLevel::Low => 25,
        }
    }

    /// Resolves a numeric threshold (0-100) to the named level, using the
    /// boundaries carried in `EngineConfig::priority_thresholds`. Values at
    /// or above a threshold take that level; `thresholds` must be sorted
    /// ascending (low, medium, high, critical) by the caller.
    pub fn from_numeric(value: u8, thresholds: &PriorityThresholds) -> Self {
        if value >= thresholds.critical {
            PriorityLevel::Critical
        } else if value >= thresholds.high {
            PriorityLevel::High
        } else if value >= thresholds.medium {
            PriorityLevel::Medium
        } else {
            PriorityLevel::Low
        }
    }
}

/// Numeric boundaries for mapping a basePriority-style score back onto a
/// `PriorityLevel` (`priorityThresholds`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityThresholds {
    pub critical: u8,
    pub high: u8,
    pub medium: u8,
    pub low: u8,
}

impl Default for PriorityThresholds {
    fn default() -> Self {
        Self {
            critical: 90,
            high: 70,
            medium: 40,
            low: 0,
        }
    }
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Queued,
    Scheduled,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// A task in one of these states has left the core's active attention
    /// though the Monitor retains its history.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Kind of a declared dependency reference (as authored on a task).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyReferenceKind {
    Prerequisite,
    SoftPrerequisite,
    ResourceShared,
    Temporal,
}

/// A declared dependency reference on a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyReference {
    pub target: TaskId,
    pub kind: DependencyReferenceKind,
    /// May be ignored if the target is absent: optional deps contribute
    /// confidence-0.5 edges and are omitted from validation errors when
    /// the target is unresolved.
    #[serde(default)]
    pub optional: bool,
}

impl DependencyReference {
    pub fn new(target: impl Into<TaskId>, kind: DependencyReferenceKind) -> Self {
        Self {
            target: target.into(),
            kind,
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// A single recorded execution attempt, retained in `Task::execution_history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionAttempt {
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    pub success: bool,
    #[serde(default)]
    pub observed_resource_usage: HashMap<String, f64>,
}

/// A task descriptor — the unit of work the Analyzer, Scorer, and Planner
/// operate over. The core never mutates semantic fields; only history and
/// derived caches change after registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_category")]
    pub category: TaskCategory,
    pub priority: PriorityLevel,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default, with = "duration_millis")]
    pub estimated_duration: Duration,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub resource_demand: HashMap<String, f64>,
    #[serde(default)]
    pub dependencies: Vec<DependencyReference>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub execution_history: Vec<ExecutionAttempt>,
}

fn default_category() -> TaskCategory {
    TaskCategory::Other
}

impl Task {
    /// Historical success rate, defaulting to 1.0 when no attempts have been
    /// recorded yet.
    pub fn success_rate(&self) -> f64 {
        if self.execution_history.is_empty() {
            return 1.0;
        }
        let successes = self.execution_history.iter().filter(|a| a.success).count();
        successes as f64 / self.execution_history.len() as f64
    }

    /// Rolling mean observed duration across recorded attempts, falling back
    /// to the declared estimate when there is no history.
    pub fn observed_mean_duration(&self) -> Duration {
        if self.execution_history.is_empty() {
            return self.estimated_duration;
        }
        let total: Duration = self.execution_history.iter().map(|a| a.duration).sum();
        total / self.execution_history.len() as u32
    }
}

/// Serializes `Duration` as milliseconds (`estimatedDuration (milliseconds)`
/// at the wire boundary), rather than chrono's struct form.
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

    fn sample_task(id: &str) -> Task {
        Task {
            id: TaskId::new(id),
            title: "Sample task".to_string(),
            description: String::new(),
            category: TaskCategory::Feature,
            priority: PriorityLevel::Medium,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deadline: None,
            estimated_duration: Duration::from_secs(60),
            capabilities: vec![],
            resource_demand: HashMap::new(),
            dependencies: vec![],
            retry_count: 0,
            last_error: None,
            execution_history: vec![],
        }
    }

    #[test]
    fn task_id_orders_lexicographically() {
        let mut ids = vec![TaskId::new("C"), TaskId::new("A"), TaskId::new("B")];
        ids.sort();
        assert_eq!(ids, vec![TaskId::new("A"), TaskId::new("B"), TaskId::new("C")]);
    }

    #[test]
    fn priority_level_base_priority_mapping() {
        assert_eq!(PriorityLevel::Critical.base_priority(), 100);
        assert_eq!(PriorityLevel::High.base_priority(), 75);
        assert_eq!(PriorityLevel::Medium.base_priority(), 50);
        assert_eq!(PriorityLevel::Low.base_priority(), 25);
    }

    #[test]
    fn success_rate_defaults_to_one_without_history() {
        let task = sample_task("T-1");
        assert_eq!(task.success_rate(), 1.0);
    }

    #[test]
    fn success_rate_reflects_history() {
        let mut task = sample_task("T-1");
        task.execution_history.push(ExecutionAttempt {
            started_at: Utc::now(),
            ended_at: Some(Utc::now()),
            duration: Duration::from_secs(10),
            success: true,
            observed_resource_usage: HashMap::new(),
        });
        task.execution_history.push(ExecutionAttempt {
            started_at: Utc::now(),
            ended_at: Some(Utc::now()),
            duration: Duration::from_secs(20),
            success: false,
            observed_resource_usage: HashMap::new(),
        });
        assert_eq!(task.success_rate(), 0.5);
        assert_eq!(task.observed_mean_duration(), Duration::from_secs(15));
    }

    #[test]
    fn structural_rank_orders_categories() {
        assert!(TaskCategory::Analysis.structural_rank() < TaskCategory::Design.structural_rank());
        assert!(TaskCategory::Testing.structural_rank() < TaskCategory::Deployment.structural_rank());
        assert_eq!(TaskCategory::Documentation.structural_rank(), None);
    }

    #[test]
    fn task_serde_round_trip() {
        let task = sample_task("T-1");
        let json = serde_json::to_string(&task).unwrap();
        let back: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(task, back);
    }
}
