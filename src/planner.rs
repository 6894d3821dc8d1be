/**
 * Execution Planner / Sequencer
 *
 * DESIGN DECISION: Strategy as a small capability trait (`order_within_level`
 * + `pack`), with one implementing type per named strategy
 * WHY: strategy is a capability set — `score(task) -> number`,
 * `pack(level, demand, budget) -> groups` — so the five strategies
 * (FIFO/Priority/CriticalPath/ResourceOptimal/DependencyAware) are variants
 * of one trait rather than a single function with a match arm per
 * strategy threaded through every call site.
 *
 * REASONING CHAIN:
 * 1. Plan construction always proceeds level by level: a task may
 *    never appear in a group before all its predecessors have.
 * 2. What differs between strategies is (a) how tasks within a level are
 *    ordered and (b) whether/how a level's tasks are split into more than
 *    one parallel group.
 * 3. `ResourceOptimalStrategy` is the only one that performs real bin
 *    packing; the others emit one group per level by default, modulo the
 *    exclusive-resource-conflict split every strategy applies uniformly.
 *
 * PATTERN: Pattern-SCHEDULER-001 (Dynamic Dependency-Aware Scheduling),
 * built on a ready-tasks/assign loop, generalized from a single dynamic
 * scheduler into pluggable static strategies producing a whole plan up
 * front.
 */

use crate::analyzer::{DependencyAnalysis, ValidationErrorKind};
use crate::config::{EngineConfig, ResourceBudget, SequencingStrategy};
use crate::error::Result;
use crate::model::{Task, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// One batch of tasks scheduled to run concurrently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelGroup {
    pub tasks: Vec<TaskId>,
    pub estimated_duration: Duration,
    pub max_concurrency: usize,
    pub priority: f64,
}

/// Plan provenance metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanMetadata {
    pub algorithm: String,
    pub factors: Vec<String>,
    pub constraints: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Ordered sequence of parallel groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub strategy: SequencingStrategy,
    pub groups: Vec<ParallelGroup>,
    pub critical_path: Vec<TaskId>,
    pub estimated_duration: Duration,
    pub max_concurrency: usize,
    pub metadata: PlanMetadata,
}

/// Severity of a detected conflict.
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
pub enum ConflictKind {
    ResourceContention,
    PriorityInversion,
    MissingDependency,
    CircularDependency,
}

/// A named, scored obstruction to plan validity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub task_ids: Vec<TaskId>,
    pub severity: Severity,
    pub suggested_resolution: String,
}

/// `{isValid, errors, missingDependencies, circularDependencies}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanValidation {
    pub is_valid: bool,
    pub conflicts: Vec<Conflict>,
    pub missing_dependencies: Vec<TaskId>,
    pub circular_dependencies: Vec<Vec<TaskId>>,
}

/// Per-task facts the packer/orderer needs, precomputed once per plan call.
struct TaskFacts<'a> {
    task: &'a Task,
    score: f64,
    on_critical_path: bool,
}

trait SchedulingStrategy {
    fn name(&self) -> &'static str;

    /// Orders a level's tasks before packing.
    fn order_within_level(&self, tasks: &mut Vec<&TaskFacts>);

    /// Packs an already-ordered level into one or more parallel groups.
    fn pack(
        &self,
        ordered: &[&TaskFacts],
        budgets: &HashMap<String, ResourceBudget>,
    ) -> Vec<Vec<TaskId>>;
}

fn single_group_packer(ordered: &[&TaskFacts]) -> Vec<Vec<TaskId>> {
    vec![ordered.iter().map(|f| f.task.id.clone()).collect()]
}

struct FifoStrategy;
impl SchedulingStrategy for FifoStrategy {
    fn name(&self) -> &'static str {
        "fifo"
    }
    fn order_within_level(&self, tasks: &mut Vec<&TaskFacts>) {
        tasks.sort_by(|a, b| a.task.created_at.cmp(&b.task.created_at).then(a.task.id.cmp(&b.task.id)));
    }
    fn pack(&self, ordered: &[&TaskFacts], _budgets: &HashMap<String, ResourceBudget>) -> Vec<Vec<TaskId>> {
        single_group_packer(ordered)
    }
}

struct PriorityStrategy;
impl SchedulingStrategy for PriorityStrategy {
    fn name(&self) -> &'static str {
        "priority_first"
    }
    fn order_within_level(&self, tasks: &mut Vec<&TaskFacts>) {
        tasks.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.task.created_at.cmp(&b.task.created_at))
        });
    }
    fn pack(&self, ordered: &[&TaskFacts], _budgets: &HashMap<String, ResourceBudget>) -> Vec<Vec<TaskId>> {
        single_group_packer(ordered)
    }
}

struct CriticalPathStrategy;
impl SchedulingStrategy for CriticalPathStrategy {
    fn name(&self) -> &'static str {
        "critical_path"
    }
    fn order_within_level(&self, tasks: &mut Vec<&TaskFacts>) {
        // critical-path tasks contiguous first, off-path interleaved by score
        tasks.sort_by(|a, b| {
            b.on_critical_path
                .cmp(&a.on_critical_path)
                .then(b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal))
                .then(a.task.id.cmp(&b.task.id))
        });
    }
    fn pack(&self, ordered: &[&TaskFacts], _budgets: &HashMap<String, ResourceBudget>) -> Vec<Vec<TaskId>> {
        single_group_packer(ordered)
    }
}

struct DependencyAwareStrategy;
impl SchedulingStrategy for DependencyAwareStrategy {
    fn name(&self) -> &'static str {
        "dependency_aware"
    }
    fn order_within_level(&self, tasks: &mut Vec<&TaskFacts>) {
        tasks.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.task.id.cmp(&b.task.id))
        });
    }
    fn pack(&self, ordered: &[&TaskFacts], _budgets: &HashMap<String, ResourceBudget>) -> Vec<Vec<TaskId>> {
        single_group_packer(ordered)
    }
}

struct ResourceOptimalStrategy;
impl SchedulingStrategy for ResourceOptimalStrategy {
    fn name(&self) -> &'static str {
        "resource_optimal"
    }
    fn order_within_level(&self, tasks: &mut Vec<&TaskFacts>) {
        // largest-demand first for first-fit-decreasing
        tasks.sort_by(|a, b| {
            total_demand(b.task)
                .partial_cmp(&total_demand(a.task))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.task.id.cmp(&b.task.id))
        });
    }
    fn pack(&self, ordered: &[&TaskFacts], budgets: &HashMap<String, ResourceBudget>) -> Vec<Vec<TaskId>> {
        if budgets.is_empty() {
            return single_group_packer(ordered);
        }
        let mut groups: Vec<Vec<&TaskFacts>> = Vec::new();
        let mut group_usage: Vec<HashMap<String, f64>> = Vec::new();

        'task: for facts in ordered {
            for (group, usage) in groups.iter_mut().zip(group_usage.iter_mut()) {
                if fits(facts.task, usage, budgets) {
                    apply_demand(facts.task, usage);
                    group.push(facts);
                    continue 'task;
                }
            }
            let mut usage = HashMap::new();
            apply_demand(facts.task, &mut usage);
            groups.push(vec![facts]);
            group_usage.push(usage);
        }

        groups
            .into_iter()
            .map(|g| g.into_iter().map(|f| f.task.id.clone()).collect())
            .collect()
    }
}

fn total_demand(task: &Task) -> f64 {
    task.resource_demand.values().sum()
}

fn fits(task: &Task, usage: &HashMap<String, f64>, budgets: &HashMap<String, ResourceBudget>) -> bool {
    for (resource, demand) in &task.resource_demand {
        let budget = budgets.get(resource).map(|b| b.max_units).unwrap_or(f64::MAX);
        let used = usage.get(resource).copied().unwrap_or(0.0);
        if used + demand > budget {
            return false;
        }
    }
    true
}

fn apply_demand(task: &Task, usage: &mut HashMap<String, f64>) {
    for (resource, demand) in &task.resource_demand {
        *usage.entry(resource.clone()).or_insert(0.0) += demand;
    }
}

fn strategy_impl(strategy: SequencingStrategy) -> Box<dyn SchedulingStrategy> {
    match strategy {
        SequencingStrategy::Fifo => Box::new(FifoStrategy),
        SequencingStrategy::Priority => Box::new(PriorityStrategy),
        SequencingStrategy::CriticalPath => Box::new(CriticalPathStrategy),
        SequencingStrategy::ResourceOptimal => Box::new(ResourceOptimalStrategy),
        SequencingStrategy::DependencyAware => Box::new(DependencyAwareStrategy),
    }
}

/// Produces execution plans and detects plan-level conflicts.
pub struct ExecutionPlanner<'a> {
    config: &'a EngineConfig,
}

impl<'a> ExecutionPlanner<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    pub async fn plan(
        &self,
        tasks: &[Task],
        analysis: &DependencyAnalysis,
        scores: &HashMap<TaskId, f64>,
    ) -> Result<ExecutionPlan> {
        let strategy_kind = self.config.strategy;
        let strategy = strategy_impl(strategy_kind);
        let by_id: HashMap<TaskId, &Task> = tasks.iter().map(|t| (t.id.clone(), t)).collect();
        let critical_set: std::collections::HashSet<&TaskId> = analysis.critical_tasks.iter().collect();

        let mut constraints = Vec::new();
        if !analysis.circular_chains.is_empty() {
            constraints.push("circular_dependencies_detected".to_string());
            return Ok(ExecutionPlan {
                strategy: strategy_kind,
                groups: Vec::new(),
                critical_path: Vec::new(),
                estimated_duration: Duration::ZERO,
                max_concurrency: 0,
                metadata: PlanMetadata {
                    algorithm: strategy.name().to_string(),
                    factors: Vec::new(),
                    constraints,
                    generated_at: Utc::now(),
                },
            });
        }

        let mut by_level: Vec<(usize, Vec<TaskId>)> = {
            let mut map: HashMap<usize, Vec<TaskId>> = HashMap::new();
            for (id, level) in &analysis.levels {
                map.entry(*level).or_default().push(id.clone());
            }
            let mut levels: Vec<(usize, Vec<TaskId>)> = map.into_iter().collect();
            levels.sort_by_key(|(level, _)| *level);
            levels
        };
        for (_, ids) in &mut by_level {
            ids.sort();
        }

        let mut groups = Vec::new();
        for (_, ids) in &by_level {
            let facts: Vec<TaskFacts> = ids
                .iter()
                .filter_map(|id| {
                    by_id.get(id).map(|task| TaskFacts {
                        task,
                        score: scores.get(id).copied().unwrap_or(0.0),
                        on_critical_path: critical_set.contains(id),
                    })
                })
                .collect();
            let mut ordered: Vec<&TaskFacts> = facts.iter().collect();
            strategy.order_within_level(&mut ordered);

            let packed = strategy.pack(&ordered, &self.config.resource_constraints);
            for task_ids in packed {
                let member_facts: Vec<&TaskFacts> = task_ids
                    .iter()
                    .filter_map(|id| ordered.iter().find(|f| &f.task.id == id).copied())
                    .collect();
                let duration = member_facts
                    .iter()
                    .map(|f| f.task.estimated_duration)
                    .max()
                    .unwrap_or_default();
                let avg_priority = if member_facts.is_empty() {
                    0.0
                } else {
                    member_facts.iter().map(|f| f.score).sum::<f64>() / member_facts.len() as f64
                };
                groups.push(ParallelGroup {
                    max_concurrency: task_ids.len(),
                    tasks: task_ids,
                    estimated_duration: duration,
                    priority: avg_priority,
                });
            }
        }

        let groups = split_exclusive_conflicts(groups, &by_id);

        let estimated_duration: Duration = groups.iter().map(|g| g.estimated_duration).sum();
        let max_concurrency = groups.iter().map(|g| g.max_concurrency).max().unwrap_or(0);

        if !self.config.resource_constraints.is_empty() {
            constraints.push("resource_budget_enforced".to_string());
        }

        Ok(ExecutionPlan {
            strategy: strategy_kind,
            groups,
            critical_path: analysis.critical_path.clone(),
            estimated_duration,
            max_concurrency,
            metadata: PlanMetadata {
                algorithm: strategy.name().to_string(),
                factors: vec!["priority_score".to_string(), "dependency_level".to_string()],
                constraints,
                generated_at: Utc::now(),
            },
        })
    }

    /// Scans tasks, analysis, and the built groups for conflicts.
    /// Validation always returns the full error list; it never short-
    /// circuits on the first conflict.
    pub fn validate(
        &self,
        tasks: &[Task],
        analysis: &DependencyAnalysis,
        groups: &[ParallelGroup],
    ) -> PlanValidation {
        let by_id: HashMap<TaskId, &Task> = tasks.iter().map(|t| (t.id.clone(), t)).collect();
        let mut conflicts = Vec::new();

        // Capability contention is a property of tasks that would have been
        // eligible to run at the same time — the same dependency level —
        // not of the final groups, since `split_exclusive_conflicts` has
        // already pulled contending tasks into separate sequential groups
        // by the time a plan reaches here.
        let mut by_level: HashMap<usize, Vec<&TaskId>> = HashMap::new();
        for id in groups.iter().flat_map(|g| g.tasks.iter()) {
            if let Some(&level) = analysis.levels.get(id) {
                by_level.entry(level).or_default().push(id);
            }
        }
        for ids in by_level.values() {
            let mut seen_capabilities: HashMap<&str, &TaskId> = HashMap::new();
            for &id in ids {
                let Some(task) = by_id.get(id) else { continue };
                for cap in &task.capabilities {
                    if let Some(other) = seen_capabilities.get(cap.as_str()) {
                        conflicts.push(Conflict {
                            kind: ConflictKind::ResourceContention,
                            task_ids: vec![(*other).clone(), id.clone()],
                            severity: Severity::Medium,
                            suggested_resolution: format!(
                                "both tasks claim exclusive resource '{cap}' at the same dependency level"
                            ),
                        });
                    } else {
                        seen_capabilities.insert(cap.as_str(), id);
                    }
                }
            }
        }

        for edge in &analysis.edges {
            let (Some(from), Some(to)) = (by_id.get(&edge.from), by_id.get(&edge.to)) else {
                continue;
            };
            if from.priority < to.priority {
                conflicts.push(Conflict {
                    kind: ConflictKind::PriorityInversion,
                    task_ids: vec![edge.from.clone(), edge.to.clone()],
                    severity: Severity::Low,
                    suggested_resolution: format!(
                        "{} (priority {:?}) blocks higher-priority {} (priority {:?})",
                        edge.from, from.priority, edge.to, to.priority
                    ),
                });
            }
        }

        let mut missing_dependencies = Vec::new();
        for error in &analysis.errors {
            if error.kind == ValidationErrorKind::MissingDependency {
                missing_dependencies.extend(error.task_ids.clone());
                conflicts.push(Conflict {
                    kind: ConflictKind::MissingDependency,
                    task_ids: error.task_ids.clone(),
                    severity: Severity::High,
                    suggested_resolution: "register the missing task or mark the reference optional".to_string(),
                });
            }
        }
        missing_dependencies.sort();
        missing_dependencies.dedup();

        for chain in &analysis.circular_chains {
            conflicts.push(Conflict {
                kind: ConflictKind::CircularDependency,
                task_ids: chain.clone(),
                severity: Severity::Critical,
                suggested_resolution: "break the cycle by removing or redirecting one edge".to_string(),
            });
        }

        let is_valid = missing_dependencies.is_empty() && analysis.circular_chains.is_empty();

        PlanValidation {
            is_valid,
            conflicts,
            missing_dependencies,
            circular_dependencies: analysis.circular_chains.clone(),
        }
    }
}

/// Forces tasks claiming the same capability apart into singleton groups,
/// preserving relative order: exclusive resource claims force separate
/// groups.
fn split_exclusive_conflicts(
    groups: Vec<ParallelGroup>,
    by_id: &HashMap<TaskId, &Task>,
) -> Vec<ParallelGroup> {
    let mut result = Vec::with_capacity(groups.len());
    for group in groups {
        let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut conflicted = false;
        for id in &group.tasks {
            if let Some(task) = by_id.get(id) {
                for cap in &task.capabilities {
                    if !seen.insert(cap.clone()) {
                        conflicted = true;
                    }
                }
            }
        }
        if !conflicted {
            result.push(group);
            continue;
        }
        for id in group.tasks {
            let duration = by_id.get(&id).map(|t| t.estimated_duration).unwrap_or_default();
            result.push(ParallelGroup {
                tasks: vec![id],
                estimated_duration: duration,
                max_concurrency: 1,
                priority: group.priority,
            });
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::DependencyAnalyzer;
    use crate::model::{DependencyReference, DependencyReferenceKind, PriorityLevel, TaskCategory, TaskStatus};
    use chrono::Utc;
    use std::collections::HashMap as StdHashMap;

    fn task(id: &str, priority: PriorityLevel, deps: Vec<&str>) -> Task {
        Task {
            id: TaskId::new(id),
            title: format!("Task {id}"),
            description: String::new(),
            category: TaskCategory::Other,
            priority,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deadline: None,
            estimated_duration: Duration::from_secs(10),
            capabilities: vec![],
            resource_demand: StdHashMap::new(),
            dependencies: deps
                .into_iter()
                .map(|d| DependencyReference::new(d, DependencyReferenceKind::Prerequisite))
                .collect(),
            retry_count: 0,
            last_error: None,
            execution_history: vec![],
        }
    }

    async fn analyze(tasks: &[Task], config: &EngineConfig) -> DependencyAnalysis {
        DependencyAnalyzer::new(config).analyze(tasks).await.unwrap()
    }

    #[tokio::test]
    async fn s2_diamond_groups() {
        let tasks = vec![
            task("A", PriorityLevel::Medium, vec![]),
            task("B", PriorityLevel::Medium, vec!["A"]),
            task("C", PriorityLevel::Medium, vec!["A"]),
            task("D", PriorityLevel::Medium, vec!["B", "C"]),
        ];
        let config = EngineConfig::default();
        let analysis = analyze(&tasks, &config).await;
        let scores: HashMap<TaskId, f64> = tasks.iter().map(|t| (t.id.clone(), 0.0)).collect();
        let planner = ExecutionPlanner::new(&config);
        let plan = planner.plan(&tasks, &analysis, &scores).await.unwrap();

        assert_eq!(plan.groups.len(), 3);
        assert_eq!(plan.groups[1].tasks.len(), 2);
        assert_eq!(plan.max_concurrency, 2);
    }

    #[tokio::test]
    async fn resource_contention_survives_exclusive_group_split() {
        let mut a = task("A", PriorityLevel::Medium, vec![]);
        a.capabilities.push("exclusive-lock".to_string());
        let mut b = task("B", PriorityLevel::Medium, vec![]);
        b.capabilities.push("exclusive-lock".to_string());
        let tasks = vec![a, b];

        let config = EngineConfig::default();
        let analysis = analyze(&tasks, &config).await;
        let planner = ExecutionPlanner::new(&config);
        let scores: HashMap<TaskId, f64> = tasks.iter().map(|t| (t.id.clone(), 0.0)).collect();
        let plan = planner.plan(&tasks, &analysis, &scores).await.unwrap();

        // split_exclusive_conflicts already forced the pair into separate
        // singleton groups...
        assert_eq!(plan.groups.len(), 2);
        assert!(plan.groups.iter().all(|g| g.tasks.len() == 1));

        // ...but validate must still report the contention that caused it.
        let validation = planner.validate(&tasks, &analysis, &plan.groups);
        assert!(validation
            .conflicts
            .iter()
            .any(|c| c.kind == ConflictKind::ResourceContention));
    }

    #[tokio::test]
    async fn s5_priority_inversion_detected() {
        let tasks = vec![
            task("low_task", PriorityLevel::Low, vec![]),
            task("high_task", PriorityLevel::High, vec!["low_task"]),
        ];
        let config = EngineConfig::default();
        let analysis = analyze(&tasks, &config).await;
        let planner = ExecutionPlanner::new(&config);
        let scores: HashMap<TaskId, f64> = tasks.iter().map(|t| (t.id.clone(), 0.0)).collect();
        let plan = planner.plan(&tasks, &analysis, &scores).await.unwrap();
        let validation = planner.validate(&tasks, &analysis, &plan.groups);

        assert!(validation
            .conflicts
            .iter()
            .any(|c| c.kind == ConflictKind::PriorityInversion));
    }

    #[tokio::test]
    async fn s3_cycle_produces_empty_plan() {
        let tasks = vec![
            task("X", PriorityLevel::Medium, vec!["Z"]),
            task("Y", PriorityLevel::Medium, vec!["X"]),
            task("Z", PriorityLevel::Medium, vec!["Y"]),
        ];
        let config = EngineConfig::default();
        let analysis = analyze(&tasks, &config).await;
        let planner = ExecutionPlanner::new(&config);
        let scores: HashMap<TaskId, f64> = tasks.iter().map(|t| (t.id.clone(), 0.0)).collect();
        let plan = planner.plan(&tasks, &analysis, &scores).await.unwrap();

        assert!(plan.groups.is_empty());
        assert!(plan.metadata.constraints.contains(&"circular_dependencies_detected".to_string()));
    }

    #[tokio::test]
    async fn resource_optimal_respects_budget() {
        let mut a = task("A", PriorityLevel::Medium, vec![]);
        a.resource_demand.insert("cpu".to_string(), 6.0);
        let mut b = task("B", PriorityLevel::Medium, vec![]);
        b.resource_demand.insert("cpu".to_string(), 6.0);
        let tasks = vec![a, b];

        let config = EngineConfig::builder()
            .strategy(SequencingStrategy::ResourceOptimal)
            .resource_constraint("cpu", 8.0)
            .build()
            .unwrap();
        let analysis = analyze(&tasks, &config).await;
        let scores: HashMap<TaskId, f64> = tasks.iter().map(|t| (t.id.clone(), 0.0)).collect();
        let planner = ExecutionPlanner::new(&config);
        let plan = planner.plan(&tasks, &analysis, &scores).await.unwrap();

        // Combined demand (12.0) exceeds the 8.0 budget, so A and B must land
        // in separate groups despite sharing a level.
        assert_eq!(plan.groups.len(), 2);
    }
}
