/**
 * Task Dependency & Scheduling Core
 *
 * Builds and maintains a multi-kind dependency graph over a task set, scores
 * tasks by a weighted composite priority, sequences them into parallel
 * execution groups under a pluggable strategy, optimizes the resulting
 * queue against a chosen objective, and monitors execution, feeding learned
 * state back into scoring.
 *
 * Five components, one façade:
 * - [`analyzer`] — Dependency Analyzer: multi-pass edge discovery, cycle
 *   detection, critical path.
 * - [`scorer`] — Priority Scorer: weighted composite priority score.
 * - [`planner`] — Execution Planner: strategy-driven level sequencing and
 *   conflict validation.
 * - [`optimizer`] — Queue Optimizer: objective-driven recommendations and
 *   batching, with a bounded learning history.
 * - [`monitor`] — Execution Monitor: rolling metrics, bottlenecks, system
 *   health.
 * - [`facade`] — `DependencyManager`: the async orchestration surface
 *   tying all of the above together behind one task repository.
 *
 * PATTERN: Pattern-001 (Planning Core Data Model)
 */

pub mod analyzer;
pub mod config;
pub mod error;
pub mod events;
pub mod facade;
pub mod graph;
pub mod model;
pub mod monitor;
pub mod ops;
pub mod optimizer;
pub mod planner;
pub mod scorer;

pub use analyzer::{DependencyAnalysis, DependencyAnalyzer, ValidationError, ValidationErrorKind};
pub use config::{
    BatchingStrategy, ConfigValidator, EngineConfig, EngineConfigBuilder, OptimizationObjective,
    ResourceBudget, ScoreWeights, SequencingStrategy,
};
pub use error::{Error, Result};
pub use events::{EngineEvent, EventBus, Subscription};
pub use facade::{DependencyManager, PlanningEngine};
pub use graph::{CircularChain, DependencyEdge, DependencyGraph, EdgeKind};
pub use model::{
    DependencyReference, DependencyReferenceKind, ExecutionAttempt, PriorityLevel,
    PriorityThresholds, Task, TaskCategory, TaskId, TaskStatus,
};
pub use monitor::{
    Bottleneck, BottleneckKind, EventKind, ExecutionEvent, ExecutionMonitor, HealthStatus,
    MetricsSnapshot, Severity as MonitorSeverity, SystemHealth,
};
pub use ops::CancellationToken;
pub use optimizer::{
    Batch, LearningMetrics, OptimizationRecord, OptimizerEvent, QueueOptimizer, Recommendation,
    RecommendationKind, RuntimeMetrics,
};
pub use planner::{
    Conflict, ConflictKind, ExecutionPlan, ExecutionPlanner, ParallelGroup, PlanMetadata,
    PlanValidation, Severity as PlanSeverity,
};
pub use scorer::{LearningState, PriorityBreakdown, PriorityScore, PriorityScorer};

/// Crate version, exposed for diagnostics and façade metadata.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
