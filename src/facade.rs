/**
 * Dependency Manager Façade
 *
 * DESIGN DECISION: One async-trait contract (`PlanningEngine`) plus a single
 * concrete `DependencyManager` implementing it, rather than exposing the
 * five components directly
 * WHY: callers (and tests) get a single seam to mock or swap, while the
 * real implementation still owns the Analyzer/Scorer/Planner/Optimizer/
 * Monitor underneath.
 *
 * REASONING CHAIN:
 * 1. Task storage and the dependency graph snapshot are the only state
 *    guarded by `tokio::sync::RwLock`; the five components are themselves
 *    cheap to reconstruct or already carry their own interior state.
 * 2. `analyze()` is fingerprinted and cached (`lru::LruCache`) since it is
 *    the one operation every other operation depends on and tasks change
 *    far less often than plans are requested.
 * 3. Per-task scoring during `plan()` is embarrassingly parallel — `rayon`
 *    scores every task independently before the Planner packs levels.
 * 4. Every public operation accepts a `CancellationToken` and an optional
 *    timeout, and publishes exactly one completion event through the
 *    `EventBus` on success.
 * 5. An invariant violation flips `degraded` and the façade refuses
 *    further mutation until `dispose()`/a fresh manager is created.
 *
 * PATTERN: Pattern-001 (Planning Core), composing every other module behind
 * a single async-trait-agent seam.
 */

use crate::analyzer::{DependencyAnalysis, DependencyAnalyzer};
use crate::config::{EngineConfig, OptimizationObjective, ResourceBudget, ScoreWeights};
use crate::error::{Error, Result};
use crate::events::{EngineEvent, EventBus, Subscription};
use crate::model::{DependencyReference, Task, TaskId};
use crate::monitor::{ExecutionEvent, ExecutionMonitor, MetricsSnapshot, SystemHealth};
use crate::ops::{with_timeout, CancellationToken};
use crate::optimizer::{LearningMetrics, OptimizerEvent, QueueOptimizer, Recommendation, RuntimeMetrics};
use crate::planner::{ExecutionPlan, ExecutionPlanner, PlanValidation};
use crate::scorer::PriorityScorer;
use async_trait::async_trait;
use lru::LruCache;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, instrument, warn};

/// The façade's public async contract. Exists primarily so tests and
/// downstream callers can substitute a mock implementation instead of
/// depending on `DependencyManager` directly.
#[async_trait]
pub trait PlanningEngine: Send + Sync {
    async fn analyze(
        &self,
        token: CancellationToken,
        timeout: Option<std::time::Duration>,
    ) -> Result<Arc<DependencyAnalysis>>;

    async fn plan(
        &self,
        token: CancellationToken,
        timeout: Option<std::time::Duration>,
    ) -> Result<ExecutionPlan>;

    async fn optimize(
        &self,
        plan: &ExecutionPlan,
        metrics: RuntimeMetrics,
        objective: OptimizationObjective,
        token: CancellationToken,
        timeout: Option<std::time::Duration>,
    ) -> Result<(Vec<Recommendation>, Vec<OptimizerEvent>)>;
}

struct EngineState {
    config: EngineConfig,
    tasks: HashMap<TaskId, Task>,
    scorer: PriorityScorer,
    optimizer: QueueOptimizer,
    monitor: ExecutionMonitor,
}

/// Orchestrates the Analyzer, Scorer, Planner, Optimizer, and Monitor over
/// a shared task repository.
pub struct DependencyManager {
    state: RwLock<EngineState>,
    analysis_cache: Mutex<LruCache<u64, Arc<DependencyAnalysis>>>,
    events: EventBus,
    degraded: AtomicBool,
}

impl DependencyManager {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let cache_capacity = NonZeroUsize::new(config.analysis_cache_capacity.max(1)).unwrap();
        let scorer = PriorityScorer::new(&config);
        let optimizer = QueueOptimizer::new(&config);
        Ok(Self {
            state: RwLock::new(EngineState {
                config,
                tasks: HashMap::new(),
                scorer,
                optimizer,
                monitor: ExecutionMonitor::new(),
            }),
            analysis_cache: Mutex::new(LruCache::new(cache_capacity)),
            events: EventBus::new(),
            degraded: AtomicBool::new(false),
        })
    }

    fn check_not_degraded(&self) -> Result<()> {
        if self.degraded.load(Ordering::SeqCst) {
            Err(Error::InvariantViolation(
                "façade is in degraded read-only mode after an invariant violation".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn enter_degraded(&self, reason: &str) {
        warn!(reason, "entering degraded read-only mode");
        self.degraded.store(true, Ordering::SeqCst);
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    #[instrument(skip(self, task))]
    pub async fn register_task(&self, task: Task) -> Result<()> {
        self.check_not_degraded()?;
        if task.id.as_str().is_empty() {
            return Err(Error::MalformedDescriptor("task id must not be empty".to_string()));
        }
        let mut state = self.state.write().await;
        if state.tasks.contains_key(&task.id) {
            return Err(Error::DuplicateTask(task.id.to_string()));
        }
        state.tasks.insert(task.id.clone(), task);
        drop(state);
        self.invalidate_cache().await;
        Ok(())
    }

    /// Replaces a task's declared dependency references, invalidating the
    /// analysis cache and publishing `DependencyUpdated`.
    #[instrument(skip(self, dependencies))]
    pub async fn update_dependencies(
        &self,
        task_id: &TaskId,
        dependencies: Vec<DependencyReference>,
    ) -> Result<()> {
        self.check_not_degraded()?;
        {
            let mut state = self.state.write().await;
            let task = state
                .tasks
                .get_mut(task_id)
                .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;
            task.dependencies = dependencies;
            task.updated_at = chrono::Utc::now();
        }
        self.invalidate_cache().await;
        let sequence = self.events.next_sequence();
        self.events.publish(EngineEvent::DependencyUpdated {
            sequence,
            task_id: task_id.clone(),
        });
        Ok(())
    }

    async fn invalidate_cache(&self) {
        self.analysis_cache.lock().await.clear();
    }

    async fn fingerprint(&self) -> u64 {
        let state = self.state.read().await;
        let mut hasher = DefaultHasher::new();
        let mut ids: Vec<&TaskId> = state.tasks.keys().collect();
        ids.sort();
        for id in ids {
            let task = &state.tasks[id];
            id.as_str().hash(&mut hasher);
            task.priority.hash(&mut hasher);
            task.status.hash_discriminant(&mut hasher);
            let mut deps: Vec<String> = task
                .dependencies
                .iter()
                .map(|d| format!("{}:{:?}:{}", d.target, d.kind, d.optional))
                .collect();
            deps.sort();
            for d in deps {
                d.hash(&mut hasher);
            }
        }
        if let Ok(json) = serde_json::to_string(&state.config) {
            json.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Snapshot of the current task repository, sorted by id for
    /// deterministic downstream processing.
    async fn task_snapshot(&self) -> Vec<Task> {
        let state = self.state.read().await;
        let mut tasks: Vec<Task> = state.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        tasks
    }

    #[instrument(skip(self, task_id))]
    pub async fn record_execution(&self, event: ExecutionEvent) -> Result<()> {
        self.check_not_degraded()?;
        let task_id = event.task_id.clone();
        let kind = event.kind;
        {
            let mut state = self.state.write().await;
            if let (Some(duration), Some(success)) = (event.duration, success_of(kind)) {
                state.scorer.record_execution(&task_id, success, duration);
            }
            state.monitor.record(event);
        }
        let sequence = self.events.next_sequence();
        self.events.publish(EngineEvent::TaskEventRecorded {
            sequence,
            task_id,
            kind,
        });
        Ok(())
    }

    pub async fn get_metrics(&self) -> MetricsSnapshot {
        self.state.read().await.monitor.snapshot()
    }

    pub async fn system_health(&self) -> SystemHealth {
        self.state.read().await.monitor.system_health()
    }

    pub async fn get_learning_insights(&self) -> LearningMetrics {
        self.state.read().await.optimizer.learning_metrics()
    }

    /// Self-tuning pass: nudges `ScoreWeights::urgency` up when the
    /// Optimizer's recent win rate is poor (recommendations are trending
    /// net-zero or negative), since that typically means deadline-sensitive
    /// work is under-prioritized. A no-op below the minimum sample size.
    #[instrument(skip(self))]
    pub async fn tune_weights(&self) -> Result<ScoreWeights> {
        self.check_not_degraded()?;
        let mut state = self.state.write().await;
        let insights = state.optimizer.learning_metrics();
        let mut weights = state.scorer.weights();
        if insights.total_optimizations >= 5 && insights.average_impact < 1.0 {
            weights.urgency *= 1.1;
            state.scorer.set_weights(weights);
            info!(average_impact = insights.average_impact, "raised urgency weight");
        }
        Ok(weights)
    }

    pub async fn update_system_load(&self, resource: impl Into<String>, available_fraction: f64) {
        self.state.write().await.scorer.update_system_load(resource, available_fraction);
    }

    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    /// Clears the analysis cache and revokes the façade's own references to
    /// the configuration/task state, so no further analysis work happens
    /// against it. Existing `Subscription` handles are unaffected; they
    /// simply stop receiving new events once publishers drop their side.
    pub async fn dispose(&self) {
        self.invalidate_cache().await;
        self.degraded.store(true, Ordering::SeqCst);
    }

    async fn analyze_uncached(&self) -> Result<DependencyAnalysis> {
        let tasks = self.task_snapshot().await;
        let state = self.state.read().await;
        let analyzer = DependencyAnalyzer::new(&state.config);
        analyzer.analyze(&tasks).await
    }
}

#[async_trait]
impl PlanningEngine for DependencyManager {
    #[instrument(skip(self, token))]
    async fn analyze(
        &self,
        token: CancellationToken,
        timeout: Option<std::time::Duration>,
    ) -> Result<Arc<DependencyAnalysis>> {
        self.check_not_degraded()?;
        token.check()?;

        let fingerprint = self.fingerprint().await;
        if let Some(hit) = self.analysis_cache.lock().await.get(&fingerprint) {
            return Ok(Arc::clone(hit));
        }

        let analysis = with_timeout(timeout, async { self.analyze_uncached().await }).await?;
        token.check()?;
        if let Err(reason) = check_edge_consistency(&analysis) {
            self.enter_degraded(&reason);
            return Err(Error::InvariantViolation(reason));
        }
        let analysis = Arc::new(analysis);

        self.analysis_cache
            .lock()
            .await
            .put(fingerprint, Arc::clone(&analysis));

        let sequence = self.events.next_sequence();
        self.events.publish(EngineEvent::AnalysisComplete {
            sequence,
            task_count: analysis.nodes.len(),
            circular_chain_count: analysis.circular_chains.len(),
        });
        Ok(analysis)
    }

    #[instrument(skip(self, token))]
    async fn plan(
        &self,
        token: CancellationToken,
        timeout: Option<std::time::Duration>,
    ) -> Result<ExecutionPlan> {
        self.check_not_degraded()?;
        let analysis = self.analyze(token.clone(), timeout).await?;
        token.check()?;

        let tasks = self.task_snapshot().await;
        let critical: std::collections::HashSet<&TaskId> = analysis.critical_tasks.iter().collect();
        let now = chrono::Utc::now();

        let scores: HashMap<TaskId, f64> = {
            let state = self.state.read().await;
            let dependent_counts: HashMap<&TaskId, usize> = {
                let mut counts = HashMap::new();
                for edge in &analysis.edges {
                    *counts.entry(&edge.from).or_insert(0) += 1;
                }
                counts
            };
            use rayon::prelude::*;
            tasks
                .par_iter()
                .map(|task| {
                    let dependent_count = dependent_counts.get(&task.id).copied().unwrap_or(0);
                    let on_critical_path = critical.contains(&task.id);
                    let score = state
                        .scorer
                        .score(task, dependent_count, on_critical_path, now)
                        .map(|s| s.total)
                        .unwrap_or(0.0);
                    (task.id.clone(), score)
                })
                .collect()
        };

        token.check()?;
        let state = self.state.read().await;
        let planner = ExecutionPlanner::new(&state.config);
        let plan = with_timeout(timeout, async { planner.plan(&tasks, &analysis, &scores).await }).await?;

        let sequence = self.events.next_sequence();
        self.events.publish(EngineEvent::PlanComplete {
            sequence,
            group_count: plan.groups.len(),
            estimated_duration_ms: plan.estimated_duration.as_millis() as u64,
        });
        Ok(plan)
    }

    #[instrument(skip(self, plan, token))]
    async fn optimize(
        &self,
        plan: &ExecutionPlan,
        metrics: RuntimeMetrics,
        objective: OptimizationObjective,
        token: CancellationToken,
        timeout: Option<std::time::Duration>,
    ) -> Result<(Vec<Recommendation>, Vec<OptimizerEvent>)> {
        self.check_not_degraded()?;
        let analysis = self.analyze(token.clone(), timeout).await?;
        token.check()?;

        let tasks = self.task_snapshot().await;
        let mut state = self.state.write().await;
        let resource_constraints: HashMap<String, ResourceBudget> = state.config.resource_constraints.clone();
        let (recommendations, optimizer_events) = with_timeout(timeout, async {
            Ok(state
                .optimizer
                .optimize(&tasks, &analysis, plan, &metrics, objective, &resource_constraints)
                .await)
        })
        .await?;

        for event in &optimizer_events {
            if let OptimizerEvent::ResourceConstraintWarning { task_id, resource } = event {
                let sequence = self.events.next_sequence();
                self.events.publish(EngineEvent::ResourceConstraintWarning {
                    sequence,
                    task_id: task_id.clone(),
                    resource: resource.clone(),
                });
            }
        }
        let sequence = self.events.next_sequence();
        self.events.publish(EngineEvent::OptimizationComplete {
            sequence,
            recommendation_count: recommendations.len(),
        });

        Ok((recommendations, optimizer_events))
    }
}

impl DependencyManager {
    #[instrument(skip(self, plan))]
    pub async fn validate(&self, plan: &ExecutionPlan) -> Result<PlanValidation> {
        self.check_not_degraded()?;
        let analysis = self
            .analyze(CancellationToken::new(), None)
            .await?;
        let tasks = self.task_snapshot().await;
        let state = self.state.read().await;
        let planner = ExecutionPlanner::new(&state.config);
        Ok(planner.validate(&tasks, &analysis, &plan.groups))
    }
}

/// Defends against the one failure mode that is fatal rather than
/// data-level: an edge whose endpoint does not appear in the node set the
/// same analysis reports, which would mean the graph and the node list
/// diverged inside the Analyzer.
fn check_edge_consistency(analysis: &DependencyAnalysis) -> std::result::Result<(), String> {
    let nodes: std::collections::HashSet<&TaskId> = analysis.nodes.iter().collect();
    for edge in &analysis.edges {
        if !nodes.contains(&edge.from) || !nodes.contains(&edge.to) {
            return Err(format!(
                "edge {}->{} references a task outside the analyzed node set",
                edge.from, edge.to
            ));
        }
    }
    Ok(())
}

fn success_of(kind: crate::monitor::EventKind) -> Option<bool> {
    use crate::monitor::EventKind;
    match kind {
        EventKind::Completed => Some(true),
        EventKind::Failed => Some(false),
        _ => None,
    }
}

trait StatusHashExt {
    fn hash_discriminant(&self, hasher: &mut DefaultHasher);
}

impl StatusHashExt for crate::model::TaskStatus {
    fn hash_discriminant(&self, hasher: &mut DefaultHasher) {
        format!("{self:?}").hash(hasher);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::model::{DependencyReferenceKind, PriorityLevel, TaskCategory, TaskStatus};
    use chrono::Utc;
    use std::time::Duration;

    fn task(id: &str, deps: Vec<&str>) -> Task {
        Task {
            id: TaskId::new(id),
            title: format!("Task {id}"),
            description: String::new(),
            category: TaskCategory::Feature,
            priority: PriorityLevel::Medium,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deadline: None,
            estimated_duration: Duration::from_secs(10),
            capabilities: vec![],
            resource_demand: HashMap::new(),
            dependencies: deps
                .into_iter()
                .map(|d| DependencyReference::new(d, DependencyReferenceKind::Prerequisite))
                .collect(),
            retry_count: 0,
            last_error: None,
            execution_history: vec![],
        }
    }

    #[tokio::test]
    async fn register_and_analyze_round_trip() {
        let manager = DependencyManager::new(EngineConfig::default()).unwrap();
        manager.register_task(task("A", vec![])).await.unwrap();
        manager.register_task(task("B", vec!["A"])).await.unwrap();

        let analysis = manager.analyze(CancellationToken::new(), None).await.unwrap();
        assert!(analysis.is_valid());
        assert_eq!(analysis.nodes.len(), 2);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let manager = DependencyManager::new(EngineConfig::default()).unwrap();
        manager.register_task(task("A", vec![])).await.unwrap();
        let err = manager.register_task(task("A", vec![])).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateTask(_)));
    }

    #[tokio::test]
    async fn analysis_cache_hits_on_repeat_call_without_mutation() {
        let manager = DependencyManager::new(EngineConfig::default()).unwrap();
        manager.register_task(task("A", vec![])).await.unwrap();

        let first = manager.analyze(CancellationToken::new(), None).await.unwrap();
        let second = manager.analyze(CancellationToken::new(), None).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn update_dependencies_invalidates_cache() {
        let manager = DependencyManager::new(EngineConfig::default()).unwrap();
        manager.register_task(task("A", vec![])).await.unwrap();
        manager.register_task(task("B", vec![])).await.unwrap();

        let first = manager.analyze(CancellationToken::new(), None).await.unwrap();
        manager
            .update_dependencies(
                &TaskId::new("B"),
                vec![DependencyReference::new("A", DependencyReferenceKind::Prerequisite)],
            )
            .await
            .unwrap();
        let second = manager.analyze(CancellationToken::new(), None).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.levels[&TaskId::new("B")], 1);
    }

    #[tokio::test]
    async fn plan_produces_groups_for_registered_tasks() {
        let manager = DependencyManager::new(EngineConfig::default()).unwrap();
        manager.register_task(task("A", vec![])).await.unwrap();
        manager.register_task(task("B", vec!["A"])).await.unwrap();

        let plan = manager.plan(CancellationToken::new(), None).await.unwrap();
        assert_eq!(plan.groups.len(), 2);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits_analyze() {
        let manager = DependencyManager::new(EngineConfig::default()).unwrap();
        manager.register_task(task("A", vec![])).await.unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let result = manager.analyze(token, None).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn dispose_degrades_the_manager() {
        let manager = DependencyManager::new(EngineConfig::default()).unwrap();
        manager.register_task(task("A", vec![])).await.unwrap();
        manager.dispose().await;
        assert!(manager.is_degraded());
        let result = manager.analyze(CancellationToken::new(), None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn subscriber_observes_analysis_complete_event() {
        let manager = DependencyManager::new(EngineConfig::default()).unwrap();
        let mut sub = manager.subscribe();
        manager.register_task(task("A", vec![])).await.unwrap();
        manager.analyze(CancellationToken::new(), None).await.unwrap();

        let event = sub.recv().await.unwrap();
        assert!(matches!(event, EngineEvent::AnalysisComplete { task_count: 1, .. }));
    }

    #[test]
    fn edge_consistency_rejects_dangling_endpoints() {
        let analysis = DependencyAnalysis {
            nodes: vec![TaskId::new("A")],
            edges: vec![crate::graph::DependencyEdge {
                from: TaskId::new("A"),
                to: TaskId::new("ghost"),
                kind: crate::graph::EdgeKind::Explicit,
                confidence: 1.0,
            }],
            levels: HashMap::new(),
            critical_path: vec![],
            independent_tasks: vec![],
            critical_tasks: vec![],
            circular_chains: vec![],
            edge_counts_by_kind: HashMap::new(),
            errors: vec![],
        };
        assert!(check_edge_consistency(&analysis).is_err());
    }

    #[tokio::test]
    async fn record_execution_feeds_scorer_and_monitor() {
        let manager = DependencyManager::new(EngineConfig::default()).unwrap();
        manager.register_task(task("A", vec![])).await.unwrap();
        manager
            .record_execution(ExecutionEvent {
                task_id: TaskId::new("A"),
                kind: crate::monitor::EventKind::Completed,
                timestamp: Utc::now(),
                duration: Some(Duration::from_secs(5)),
                error: None,
                memory_bytes: None,
                category: None,
                priority: None,
                metadata: HashMap::new(),
            })
            .await
            .unwrap();
        let metrics = manager.get_metrics().await;
        assert_eq!(metrics.completed, 1);
    }
}
