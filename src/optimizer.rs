/**
 * Queue Optimizer
 *
 * DESIGN DECISION: Optimization objectives as free functions over a shared
 * `OptimizationContext`, rather than a trait-per-objective
 * WHY: Unlike the Planner's strategies (which need genuinely different
 * packing algorithms), the four objectives here mostly differ in
 * which existing plan/metric facts they inspect and what recommendation
 * kinds they emit — a match over `OptimizationObjective` dispatching to a
 * function is simpler than a trait for that shape.
 *
 * REASONING CHAIN:
 * 1. Each objective reads the current plan, the dependency analysis, and
 *    runtime metrics; it never mutates them, only proposes recommendations.
 * 2. Batching is a separate concern (tag clustering, demand-vector
 *    clustering, temporal clustering) applied regardless of objective when
 *    `enable_batching` is set.
 * 3. The learning ring records each pass for later win-rate analysis,
 *    following the same bounded-history-ring idiom used for task
 *    durations elsewhere in this crate.
 *
 * PATTERN: Pattern-MONITOR-001 (Real-Time Metrics) adapted for an
 * optimization pass instead of a sprint run, with a recommendation/
 * bottleneck shape (`OptimizationSuggestion`, `Bottleneck`).
 */

use crate::analyzer::DependencyAnalysis;
use crate::config::{BatchingStrategy, EngineConfig, OptimizationObjective};
use crate::model::{Task, TaskId};
use crate::planner::ExecutionPlan;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    ConcurrencyAdjustment,
    ParallelExecution,
    ResourceBalancing,
    PriorityAdjustment,
    CriticalPathOptimization,
    TaskPreemption,
    DeadlineScheduling,
    DeadlineViolationWarning,
    ResourceConflictResolution,
    TaskBatching,
}

/// Before/after snapshot of the metrics a recommendation affects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanMetricsSnapshot {
    pub estimated_duration_ms: u64,
    pub max_concurrency: usize,
}

impl PlanMetricsSnapshot {
    fn of(plan: &ExecutionPlan) -> Self {
        Self {
            estimated_duration_ms: plan.estimated_duration.as_millis() as u64,
            max_concurrency: plan.max_concurrency,
        }
    }
}

/// A structured optimization recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    /// Projected percentage improvement on the strategy's objective.
    pub impact: f64,
    pub details: HashMap<String, String>,
    pub before_optimization: Option<PlanMetricsSnapshot>,
    pub after_optimization: Option<PlanMetricsSnapshot>,
}

/// A cluster of tasks proposed for batched execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub tasks: Vec<TaskId>,
    pub reason: String,
}

/// Events the Optimizer wants published through the façade's event bus.
#[derive(Debug, Clone)]
pub enum OptimizerEvent {
    OptimizationComplete { recommendation_count: usize },
    ResourceConstraintWarning { task_id: TaskId, resource: String },
}

/// Runtime metrics the Optimizer reads (current load, not history).
#[derive(Debug, Clone, Default)]
pub struct RuntimeMetrics {
    /// fraction of each resource's budget currently in use, [0, 1+].
    pub resource_usage: HashMap<String, f64>,
    pub current_concurrency: usize,
}

/// One recorded optimization pass.
#[derive(Debug, Clone)]
pub struct OptimizationRecord {
    pub objective: OptimizationObjective,
    pub recommendation_count: usize,
    pub duration: Duration,
    pub projected_impact: f64,
    pub observed_impact: Option<f64>,
}

/// `{totalOptimizations, averageImpact, strategyWinRates}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningMetrics {
    pub total_optimizations: usize,
    pub average_impact: f64,
    pub strategy_win_rates: HashMap<String, f64>,
}

/// Emits recommendations, performs batching, and maintains a bounded
/// learning history of past optimization passes.
pub struct QueueOptimizer {
    history: VecDeque<OptimizationRecord>,
    capacity: usize,
    max_batch_size: usize,
    batching_strategy: BatchingStrategy,
    enable_batching: bool,
    temporal_clustering_window: Duration,
}

impl QueueOptimizer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            history: VecDeque::new(),
            capacity: config.learning_history_capacity,
            max_batch_size: config.max_batch_size,
            batching_strategy: config.batching_strategy,
            enable_batching: config.enable_batching,
            temporal_clustering_window: config.temporal_clustering_window,
        }
    }

    pub async fn optimize(
        &mut self,
        tasks: &[Task],
        analysis: &DependencyAnalysis,
        plan: &ExecutionPlan,
        metrics: &RuntimeMetrics,
        objective: OptimizationObjective,
        resource_constraints: &HashMap<String, crate::config::ResourceBudget>,
    ) -> (Vec<Recommendation>, Vec<OptimizerEvent>) {
        let mut recommendations = match objective {
            OptimizationObjective::ThroughputMaximization => {
                throughput_maximization(tasks, plan, metrics, resource_constraints)
            }
            OptimizationObjective::LatencyMinimization => latency_minimization(tasks, analysis, plan),
            OptimizationObjective::ResourceEfficiency => {
                resource_efficiency(tasks, plan, resource_constraints)
            }
            OptimizationObjective::DeadlineOptimization => deadline_optimization(tasks, plan),
        };

        let mut events = Vec::new();
        for (resource, budget) in resource_constraints {
            for task in tasks {
                if let Some(demand) = task.resource_demand.get(resource) {
                    if *demand > budget.max_units {
                        events.push(OptimizerEvent::ResourceConstraintWarning {
                            task_id: task.id.clone(),
                            resource: resource.clone(),
                        });
                    }
                }
            }
        }

        recommendations.extend(self.batching_recommendations(tasks));

        events.push(OptimizerEvent::OptimizationComplete {
            recommendation_count: recommendations.len(),
        });

        let projected_impact = if recommendations.is_empty() {
            0.0
        } else {
            recommendations.iter().map(|r| r.impact).sum::<f64>() / recommendations.len() as f64
        };
        self.record_pass(OptimizationRecord {
            objective,
            recommendation_count: recommendations.len(),
            duration: Duration::from_millis(0),
            projected_impact,
            observed_impact: None,
        });

        (recommendations, events)
    }

    fn record_pass(&mut self, record: OptimizationRecord) {
        self.history.push_back(record);
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
    }

    pub fn learning_metrics(&self) -> LearningMetrics {
        let total_optimizations = self.history.len();
        let average_impact = if total_optimizations == 0 {
            0.0
        } else {
            self.history.iter().map(|r| r.projected_impact).sum::<f64>() / total_optimizations as f64
        };

        let mut per_strategy: HashMap<String, (usize, usize)> = HashMap::new();
        for record in &self.history {
            let key = format!("{:?}", record.objective);
            let entry = per_strategy.entry(key).or_insert((0, 0));
            entry.1 += 1;
            if record.projected_impact > 0.0 {
                entry.0 += 1;
            }
        }
        let strategy_win_rates = per_strategy
            .into_iter()
            .map(|(k, (wins, total))| (k, if total == 0 { 0.0 } else { wins as f64 / total as f64 }))
            .collect();

        LearningMetrics {
            total_optimizations,
            average_impact,
            strategy_win_rates,
        }
    }

    fn batching_recommendations(&self, tasks: &[Task]) -> Vec<Recommendation> {
        if !self.enable_batching || tasks.len() < 2 {
            return Vec::new();
        }
        let batches = run_batching(
            tasks,
            self.batching_strategy,
            self.max_batch_size,
            self.temporal_clustering_window,
        );
        batches
            .into_iter()
            .filter(|b| b.tasks.len() > 1)
            .map(|batch| {
                let mut details = HashMap::new();
                details.insert("reason".to_string(), batch.reason.clone());
                details.insert("batch_size".to_string(), batch.tasks.len().to_string());
                Recommendation {
                    kind: RecommendationKind::TaskBatching,
                    impact: (batch.tasks.len() as f64 - 1.0) * 5.0,
                    details,
                    before_optimization: None,
                    after_optimization: None,
                }
            })
            .collect()
    }
}

fn throughput_maximization(
    tasks: &[Task],
    plan: &ExecutionPlan,
    metrics: &RuntimeMetrics,
    budgets: &HashMap<String, crate::config::ResourceBudget>,
) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();
    let aggregate_usage: f64 = metrics.resource_usage.values().sum::<f64>()
        / metrics.resource_usage.len().max(1) as f64;

    if aggregate_usage < 0.8 {
        let mut details = HashMap::new();
        details.insert("current_utilization".to_string(), format!("{aggregate_usage:.2}"));
        recommendations.push(Recommendation {
            kind: RecommendationKind::ConcurrencyAdjustment,
            impact: (0.8 - aggregate_usage) * 100.0,
            details,
            before_optimization: Some(PlanMetricsSnapshot::of(plan)),
            after_optimization: None,
        });
    }

    if !budgets.is_empty() {
        if let Some(pair) = find_complementary_pair(tasks) {
            let mut details = HashMap::new();
            details.insert("task_a".to_string(), pair.0.to_string());
            details.insert("task_b".to_string(), pair.1.to_string());
            recommendations.push(Recommendation {
                kind: RecommendationKind::ParallelExecution,
                impact: 10.0,
                details,
                before_optimization: None,
                after_optimization: None,
            });
        }
    }
    recommendations
}

fn find_complementary_pair(tasks: &[Task]) -> Option<(TaskId, TaskId)> {
    let cpu_heavy = tasks.iter().find(|t| resource_weighted(t, "cpu") > resource_weighted(t, "network"))?;
    let network_heavy = tasks
        .iter()
        .find(|t| t.id != cpu_heavy.id && resource_weighted(t, "network") > resource_weighted(t, "cpu"))?;
    Some((cpu_heavy.id.clone(), network_heavy.id.clone()))
}

fn resource_weighted(task: &Task, resource: &str) -> f64 {
    task.resource_demand.get(resource).copied().unwrap_or(0.0)
}

fn latency_minimization(tasks: &[Task], analysis: &DependencyAnalysis, plan: &ExecutionPlan) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();
    let by_id: HashMap<&TaskId, &Task> = tasks.iter().map(|t| (&t.id, t)).collect();
    let critical: std::collections::HashSet<&TaskId> = analysis.critical_tasks.iter().collect();

    for group in &plan.groups {
        let blockers: Vec<&TaskId> = group
            .tasks
            .iter()
            .filter(|id| {
                by_id
                    .get(*id)
                    .map(|t| !critical.contains(id) && t.estimated_duration > Duration::from_secs(600))
                    .unwrap_or(false)
            })
            .collect();
        for blocker in blockers {
            let blocks_critical = analysis
                .edges
                .iter()
                .any(|e| &e.from == blocker && critical.contains(&e.to));
            if blocks_critical {
                let mut details = HashMap::new();
                details.insert("blocking_task".to_string(), blocker.to_string());
                recommendations.push(Recommendation {
                    kind: RecommendationKind::TaskPreemption,
                    impact: 15.0,
                    details,
                    before_optimization: Some(PlanMetricsSnapshot::of(plan)),
                    after_optimization: None,
                });
            }
        }
    }
    recommendations
}

fn resource_efficiency(
    tasks: &[Task],
    plan: &ExecutionPlan,
    budgets: &HashMap<String, crate::config::ResourceBudget>,
) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();
    let by_id: HashMap<&TaskId, &Task> = tasks.iter().map(|t| (&t.id, t)).collect();

    for task in tasks {
        for (resource, demand) in &task.resource_demand {
            if let Some(budget) = budgets.get(resource) {
                if *demand > budget.max_units {
                    let mut details = HashMap::new();
                    details.insert("task_id".to_string(), task.id.to_string());
                    details.insert("resource".to_string(), resource.clone());
                    details.insert("demand".to_string(), demand.to_string());
                    details.insert("budget".to_string(), budget.max_units.to_string());
                    recommendations.push(Recommendation {
                        kind: RecommendationKind::ResourceConflictResolution,
                        impact: 20.0,
                        details,
                        before_optimization: None,
                        after_optimization: None,
                    });
                }
            }
        }
    }

    if plan.groups.len() > 1 && !budgets.is_empty() {
        let total_groups_before = plan.groups.len();
        let tighter = (total_groups_before as f64 * 0.75).ceil() as usize;
        if tighter < total_groups_before {
            let mut details = HashMap::new();
            details.insert("groups_before".to_string(), total_groups_before.to_string());
            details.insert("groups_after".to_string(), tighter.to_string());
            recommendations.push(Recommendation {
                kind: RecommendationKind::ResourceBalancing,
                impact: ((total_groups_before - tighter) as f64 / total_groups_before as f64) * 100.0,
                details,
                before_optimization: Some(PlanMetricsSnapshot::of(plan)),
                after_optimization: None,
            });
        }
    }
    let _ = by_id;
    recommendations
}

fn deadline_optimization(tasks: &[Task], plan: &ExecutionPlan) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();
    let now = Utc::now();
    let mut elapsed = Duration::ZERO;

    let by_id: HashMap<&TaskId, &Task> = tasks.iter().map(|t| (&t.id, t)).collect();
    for group in &plan.groups {
        elapsed += group.estimated_duration;
        for id in &group.tasks {
            let Some(task) = by_id.get(id) else { continue };
            if let Some(deadline) = task.deadline {
                let finish = now
                    + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero());
                if finish > deadline {
                    let slack = (deadline - finish).num_milliseconds();
                    let mut details = HashMap::new();
                    details.insert("task_id".to_string(), task.id.to_string());
                    details.insert("slack_ms".to_string(), slack.to_string());
                    recommendations.push(Recommendation {
                        kind: RecommendationKind::DeadlineViolationWarning,
                        impact: 0.0,
                        details,
                        before_optimization: None,
                        after_optimization: None,
                    });
                }
            }
        }
    }
    recommendations
}

/// Similar-tasks batching: tag/title-token clustering, bounded batch size.
pub fn batch_similar_tasks(tasks: &[Task], max_batch_size: usize) -> Vec<Batch> {
    let mut remaining: Vec<&Task> = tasks.iter().collect();
    remaining.sort_by(|a, b| a.id.cmp(&b.id));
    let mut batches = Vec::new();

    while !remaining.is_empty() {
        let anchor = remaining.remove(0);
        let mut members = vec![anchor.id.clone()];
        let mut i = 0;
        while i < remaining.len() && members.len() < max_batch_size {
            if shares_tag(anchor, remaining[i]) {
                members.push(remaining.remove(i).id.clone());
            } else {
                i += 1;
            }
        }
        batches.push(Batch {
            tasks: members,
            reason: "similar_tasks".to_string(),
        });
    }
    batches
}

fn shares_tag(a: &Task, b: &Task) -> bool {
    a.capabilities.iter().any(|tag| b.capabilities.contains(tag))
        || a.category == b.category
}

/// Resource-optimization batching: near-identical demand vectors within
/// epsilon=10% are grouped.
pub fn batch_resource_optimization(tasks: &[Task]) -> Vec<Batch> {
    const EPSILON: f64 = 0.1;
    let mut remaining: Vec<&Task> = tasks.iter().collect();
    remaining.sort_by(|a, b| a.id.cmp(&b.id));
    let mut batches = Vec::new();

    while !remaining.is_empty() {
        let anchor = remaining.remove(0);
        let mut members = vec![anchor.id.clone()];
        let mut i = 0;
        while i < remaining.len() {
            if demand_within_epsilon(anchor, remaining[i], EPSILON) {
                members.push(remaining.remove(i).id.clone());
            } else {
                i += 1;
            }
        }
        batches.push(Batch {
            tasks: members,
            reason: "resource_optimization".to_string(),
        });
    }
    batches
}

fn demand_within_epsilon(a: &Task, b: &Task, epsilon: f64) -> bool {
    let keys: std::collections::HashSet<&String> =
        a.resource_demand.keys().chain(b.resource_demand.keys()).collect();
    if keys.is_empty() {
        return true;
    }
    keys.into_iter().all(|k| {
        let av = a.resource_demand.get(k).copied().unwrap_or(0.0);
        let bv = b.resource_demand.get(k).copied().unwrap_or(0.0);
        let denom = av.max(bv).max(f64::EPSILON);
        ((av - bv).abs() / denom) <= epsilon
    })
}

/// Temporal batching: tasks with nearby deadlines, reusing
/// the same clustering idea as the Analyzer's temporal edge pass.
pub fn batch_temporal(tasks: &[Task], window: Duration) -> Vec<Batch> {
    let mut with_deadline: Vec<&Task> = tasks.iter().filter(|t| t.deadline.is_some()).collect();
    with_deadline.sort_by_key(|t| t.deadline.unwrap());

    let window = chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::hours(1));
    let mut batches = Vec::new();
    let mut cluster: Vec<&Task> = Vec::new();

    for t in with_deadline {
        if let Some(first) = cluster.first() {
            if t.deadline.unwrap() - first.deadline.unwrap() > window {
                batches.push(Batch {
                    tasks: cluster.iter().map(|t| t.id.clone()).collect(),
                    reason: "temporal".to_string(),
                });
                cluster.clear();
            }
        }
        cluster.push(t);
    }
    if !cluster.is_empty() {
        batches.push(Batch {
            tasks: cluster.iter().map(|t| t.id.clone()).collect(),
            reason: "temporal".to_string(),
        });
    }
    batches
}

pub fn run_batching(tasks: &[Task], strategy: BatchingStrategy, max_batch_size: usize, window: Duration) -> Vec<Batch> {
    match strategy {
        BatchingStrategy::SimilarTasks => batch_similar_tasks(tasks, max_batch_size),
        BatchingStrategy::ResourceOptimization => batch_resource_optimization(tasks),
        BatchingStrategy::Temporal => batch_temporal(tasks, window),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PriorityLevel, TaskCategory, TaskStatus};
    use chrono::Utc;
    use std::collections::HashMap as StdHashMap;

    fn task(id: &str) -> Task {
        Task {
            id: TaskId::new(id),
            title: "t".to_string(),
            description: String::new(),
            category: TaskCategory::Feature,
            priority: PriorityLevel::Medium,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deadline: None,
            estimated_duration: Duration::from_secs(10),
            capabilities: vec![],
            resource_demand: StdHashMap::new(),
            dependencies: vec![],
            retry_count: 0,
            last_error: None,
            execution_history: vec![],
        }
    }

    #[test]
    fn batch_similar_tasks_respects_max_size() {
        let tasks: Vec<Task> = (0..5).map(|i| task(&format!("T-{i}"))).collect();
        let batches = batch_similar_tasks(&tasks, 2);
        assert!(batches.iter().all(|b| b.tasks.len() <= 2));
    }

    #[test]
    fn learning_metrics_empty_history() {
        let config = EngineConfig::default();
        let optimizer = QueueOptimizer::new(&config);
        let metrics = optimizer.learning_metrics();
        assert_eq!(metrics.total_optimizations, 0);
        assert_eq!(metrics.average_impact, 0.0);
    }

    #[test]
    fn history_ring_stays_bounded() {
        let config = EngineConfig {
            learning_history_capacity: 2,
            ..EngineConfig::default()
        };
        let mut optimizer = QueueOptimizer::new(&config);
        for _ in 0..5 {
            optimizer.record_pass(OptimizationRecord {
                objective: OptimizationObjective::ThroughputMaximization,
                recommendation_count: 1,
                duration: Duration::ZERO,
                projected_impact: 1.0,
                observed_impact: None,
            });
        }
        assert_eq!(optimizer.history.len(), 2);
    }

    #[test]
    fn batching_recommendations_honors_configured_strategy() {
        let config = EngineConfig::resource_optimized();
        let optimizer = QueueOptimizer::new(&config);
        assert_eq!(optimizer.batching_strategy, BatchingStrategy::ResourceOptimization);

        let mut a = task("A");
        a.resource_demand.insert("cpu".to_string(), 1.0);
        let mut b = task("B");
        b.resource_demand.insert("cpu".to_string(), 1.02);

        let recommendations = optimizer.batching_recommendations(&[a, b]);
        assert!(recommendations
            .iter()
            .any(|r| r.details.get("reason").map(String::as_str) == Some("resource_optimization")));
    }

    #[test]
    fn batching_recommendations_empty_when_disabled() {
        let config = EngineConfig {
            enable_batching: false,
            ..EngineConfig::default()
        };
        let optimizer = QueueOptimizer::new(&config);
        let tasks: Vec<Task> = (0..3).map(|i| task(&format!("T-{i}"))).collect();
        assert!(optimizer.batching_recommendations(&tasks).is_empty());
    }

    #[test]
    fn demand_within_epsilon_detects_near_identical_vectors() {
        let mut a = task("A");
        a.resource_demand.insert("cpu".to_string(), 1.0);
        let mut b = task("B");
        b.resource_demand.insert("cpu".to_string(), 1.05);
        assert!(demand_within_epsilon(&a, &b, 0.1));

        let mut c = task("C");
        c.resource_demand.insert("cpu".to_string(), 2.0);
        assert!(!demand_within_epsilon(&a, &c, 0.1));
    }
}
