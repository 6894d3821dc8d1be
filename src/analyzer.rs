/**
 * Dependency Analyzer
 *
 * DESIGN DECISION: Edge discovery as four independent, composable passes
 * over the task set, fed into a single `DependencyGraph`
 * WHY: Each pass has a distinct confidence semantic (explicit is certain,
 * the rest are heuristics); keeping them separate functions makes each
 * independently testable and lets configuration disable a pass without
 * touching the others.
 *
 * REASONING CHAIN:
 * 1. Explicit pass resolves declared dependency references first, since
 *    later passes check "no explicit edge already exists" before adding
 *    heuristic edges of their own.
 * 2. Implicit/structural/resource/temporal passes each emit a disjoint set
 *    of edges with their own confidence, all added to the same graph.
 * 3. Cycle detection runs on the union graph (all kinds together).
 * 4. Critical path and level computation only proceed on an acyclic graph;
 *    if cycles exist, the Analyzer reports them and stops there.
 *
 * PATTERN: Pattern-001 (Planning Core), built on in/out-degree adjacency
 * bookkeeping, extended with typed multi-kind edges and a stop-word /
 * precedence-vocabulary content pass.
 */

use crate::config::EngineConfig;
use crate::error::Result;
use crate::graph::{CircularChain, DependencyEdge, DependencyGraph, EdgeKind};
use crate::model::{DependencyReferenceKind, PriorityLevel, Task, TaskCategory, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Kind of a reported validation problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    MissingDependency,
    MalformedDescriptor,
    CircularDependency,
}

/// A single validation problem, carrying the involved task ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub task_ids: Vec<TaskId>,
    pub message: String,
}

/// Result of `DependencyAnalyzer::analyze`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyAnalysis {
    pub nodes: Vec<TaskId>,
    pub edges: Vec<DependencyEdge>,
    pub levels: HashMap<TaskId, usize>,
    pub critical_path: Vec<TaskId>,
    pub independent_tasks: Vec<TaskId>,
    pub critical_tasks: Vec<TaskId>,
    pub circular_chains: Vec<CircularChain>,
    pub edge_counts_by_kind: HashMap<EdgeKind, usize>,
    pub errors: Vec<ValidationError>,
}

impl DependencyAnalysis {
    pub fn is_valid(&self) -> bool {
        self.circular_chains.is_empty()
            && !self
                .errors
                .iter()
                .any(|e| e.kind != ValidationErrorKind::MalformedDescriptor)
    }
}

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "if", "then", "else", "for", "to", "of", "in", "on",
    "at", "by", "with", "from", "as", "is", "are", "was", "were", "be", "been", "being", "this",
    "that", "these", "those", "it", "its", "will", "would", "should", "can", "could", "may",
    "might", "must", "shall", "do", "does", "did", "has", "have", "had", "not", "no", "so",
    "than", "too", "very", "just", "into", "about", "up", "down", "out", "over", "under",
    "again", "further", "once", "here", "there", "all", "each", "both", "more", "most", "other",
    "some", "such", "own", "same",
];

const PRECEDENCE_VOCABULARY: &[&str] = &[
    "setup", "initialize", "init", "configure", "analyze", "design", "plan", "research",
    "investigate", "scaffold", "bootstrap", "define", "draft",
];

fn word_boundary() -> &'static regex::Regex {
    static PATTERN: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    PATTERN.get_or_init(|| regex::Regex::new(r"[A-Za-z0-9]+").expect("static pattern compiles"))
}

/// Splits on non-alphanumeric boundaries, lowercases, and drops stop words.
/// No stemming.
fn tokenize(text: &str) -> HashSet<String> {
    word_boundary()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

fn matches_precedence_vocabulary(title: &str) -> bool {
    let tokens = tokenize(title);
    PRECEDENCE_VOCABULARY
        .iter()
        .any(|word| tokens.contains(*word))
}

/// Builds the dependency graph from task descriptors and derives the full
/// analysis record.
pub struct DependencyAnalyzer<'a> {
    config: &'a EngineConfig,
}

impl<'a> DependencyAnalyzer<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    pub async fn analyze(&self, tasks: &[Task]) -> Result<DependencyAnalysis> {
        let mut errors = Vec::new();

        // Malformed descriptors (empty id) are skipped with a warning; the
        // pass completes for the remainder.
        let tasks: Vec<&Task> = tasks
            .iter()
            .filter(|t| {
                if t.id.as_str().is_empty() {
                    errors.push(ValidationError {
                        kind: ValidationErrorKind::MalformedDescriptor,
                        task_ids: vec![t.id.clone()],
                        message: "task id must not be empty".to_string(),
                    });
                    false
                } else {
                    true
                }
            })
            .collect();

        let known_ids: HashSet<TaskId> = tasks.iter().map(|t| t.id.clone()).collect();
        let mut by_id: HashMap<TaskId, &Task> = HashMap::new();
        for t in &tasks {
            by_id.insert(t.id.clone(), t);
        }

        let mut graph = DependencyGraph::new();
        for t in &tasks {
            graph.add_node(t.id.clone());
        }

        self.discover_explicit(&tasks, &known_ids, &mut graph, &mut errors);
        self.discover_implicit_by_content(&tasks, &mut graph);
        self.discover_structural(&tasks, &mut graph);
        self.discover_resource_shared(&tasks, &mut graph);
        self.discover_temporal(&tasks, &mut graph);

        let circular_chains = graph.find_cycles();
        if !circular_chains.is_empty() {
            for chain in &circular_chains {
                errors.push(ValidationError {
                    kind: ValidationErrorKind::CircularDependency,
                    task_ids: chain.clone(),
                    message: format!(
                        "circular dependency: {}",
                        chain
                            .iter()
                            .map(|id| id.as_str())
                            .collect::<Vec<_>>()
                            .join(" -> ")
                    ),
                });
            }
        }

        let mut nodes: Vec<TaskId> = graph.nodes().cloned().collect();
        nodes.sort();

        let mut edge_counts_by_kind = HashMap::new();
        for edge in graph.edges() {
            *edge_counts_by_kind.entry(edge.kind).or_insert(0usize) += 1;
        }

        let (levels, critical_path, mut critical_tasks) = if circular_chains.is_empty() {
            let levels = graph.levels();
            let critical_path = self.critical_path(&graph, &levels, &by_id);
            let critical: HashSet<TaskId> = critical_path.iter().cloned().collect();
            (levels, critical_path, critical)
        } else {
            (HashMap::new(), Vec::new(), HashSet::new())
        };

        if circular_chains.is_empty() {
            for t in self.articulation_critical_tasks(&graph) {
                critical_tasks.insert(t);
            }
        }

        let mut critical_tasks: Vec<TaskId> = critical_tasks.into_iter().collect();
        critical_tasks.sort();

        let independent_tasks = graph.independent_tasks();
        let edges = graph.edges().to_vec();

        Ok(DependencyAnalysis {
            nodes,
            edges,
            levels,
            critical_path,
            independent_tasks,
            critical_tasks,
            circular_chains,
            edge_counts_by_kind,
            errors,
        })
    }

    /// Pass 1 — explicit edges from declared dependency references.
    fn discover_explicit(
        &self,
        tasks: &[&Task],
        known_ids: &HashSet<TaskId>,
        graph: &mut DependencyGraph,
        errors: &mut Vec<ValidationError>,
    ) {
        for task in tasks {
            for dep in &task.dependencies {
                if !known_ids.contains(&dep.target) {
                    if !dep.optional {
                        errors.push(ValidationError {
                            kind: ValidationErrorKind::MissingDependency,
                            task_ids: vec![task.id.clone(), dep.target.clone()],
                            message: format!(
                                "task {} declares dependency on missing task {}",
                                task.id, dep.target
                            ),
                        });
                    }
                    continue;
                }
                // Optional/soft references contribute confidence-0.5 edges;
                // firm prerequisite/resource-shared/temporal references are 1.0.
                let confidence = if dep.optional || dep.kind == DependencyReferenceKind::SoftPrerequisite {
                    0.5
                } else {
                    1.0
                };
                graph.add_edge(DependencyEdge {
                    from: dep.target.clone(),
                    to: task.id.clone(),
                    kind: EdgeKind::Explicit,
                    confidence,
                });
            }
        }
    }

    /// Pass 2 — implicit edges from keyword overlap and precedence vocabulary.
    fn discover_implicit_by_content(&self, tasks: &[&Task], graph: &mut DependencyGraph) {
        let mut tagged: Vec<(&Task, HashSet<String>)> = tasks
            .iter()
            .map(|t| {
                let mut tokens = tokenize(&t.title);
                tokens.extend(tokenize(&t.description));
                (*t, tokens)
            })
            .collect();
        tagged.sort_by(|a, b| a.0.created_at.cmp(&b.0.created_at).then(a.0.id.cmp(&b.0.id)));

        for i in 0..tagged.len() {
            for j in 0..tagged.len() {
                if i == j {
                    continue;
                }
                let (a, a_tokens) = &tagged[i];
                let (b, b_tokens) = &tagged[j];
                if a.created_at > b.created_at {
                    continue;
                }
                if a.id == b.id {
                    continue;
                }
                let overlap = jaccard(a_tokens, b_tokens);
                if overlap > self.config.implicit_jaccard_threshold
                    && matches_precedence_vocabulary(&a.title)
                {
                    graph.add_edge(DependencyEdge {
                        from: a.id.clone(),
                        to: b.id.clone(),
                        kind: EdgeKind::Implicit,
                        confidence: overlap,
                    });
                }
            }
        }
    }

    /// Pass 3 — structural ordering by category (analysis → design →
    /// feature/build → testing → deployment), skipping pairs that already
    /// have an explicit edge.
    fn discover_structural(&self, tasks: &[&Task], graph: &mut DependencyGraph) {
        for a in tasks {
            for b in tasks {
                if a.id == b.id {
                    continue;
                }
                let (Some(rank_a), Some(rank_b)) = (
                    a.category.structural_rank(),
                    b.category.structural_rank(),
                ) else {
                    continue;
                };
                if rank_a >= rank_b {
                    continue;
                }
                let has_explicit = graph
                    .edges()
                    .iter()
                    .any(|e| e.from == a.id && e.to == b.id && e.kind == EdgeKind::Explicit);
                if has_explicit {
                    continue;
                }
                graph.add_edge(DependencyEdge {
                    from: a.id.clone(),
                    to: b.id.clone(),
                    kind: EdgeKind::Implicit,
                    confidence: 0.5,
                });
            }
        }
    }

    /// Pass 4 — resource-shared edges within capability-tag groups, ordered
    /// lexicographically on id for determinism.
    fn discover_resource_shared(&self, tasks: &[&Task], graph: &mut DependencyGraph) {
        let mut groups: HashMap<&str, Vec<&TaskId>> = HashMap::new();
        for t in tasks {
            for cap in &t.capabilities {
                groups.entry(cap.as_str()).or_default().push(&t.id);
            }
        }
        for members in groups.values() {
            if members.len() < 2 {
                continue;
            }
            let mut sorted: Vec<TaskId> = members.iter().map(|id| (*id).clone()).collect();
            sorted.sort();
            sorted.dedup();
            for pair in sorted.windows(2) {
                graph.add_edge(DependencyEdge {
                    from: pair[0].clone(),
                    to: pair[1].clone(),
                    kind: EdgeKind::Resource,
                    confidence: 0.7,
                });
            }
        }
    }

    /// Pass 5 — temporal chain edges within the configured deadline window.
    fn discover_temporal(&self, tasks: &[&Task], graph: &mut DependencyGraph) {
        let mut with_deadline: Vec<&Task> = tasks.iter().filter_map(|t| t.deadline.map(|_| *t)).collect();
        with_deadline.sort_by_key(|t| t.deadline.unwrap());

        let window = chrono::Duration::from_std(self.config.temporal_clustering_window)
            .unwrap_or_else(|_| chrono::Duration::hours(1));

        let mut cluster: Vec<&Task> = Vec::new();
        let mut flush = |cluster: &mut Vec<&Task>, graph: &mut DependencyGraph| {
            if cluster.len() >= 2 {
                for pair in cluster.windows(2) {
                    graph.add_edge(DependencyEdge {
                        from: pair[0].id.clone(),
                        to: pair[1].id.clone(),
                        kind: EdgeKind::Temporal,
                        confidence: 0.6,
                    });
                }
            }
            cluster.clear();
        };

        for t in with_deadline {
            if let Some(first) = cluster.first() {
                let span = t.deadline.unwrap() - first.deadline.unwrap();
                if span > window {
                    flush(&mut cluster, graph);
                }
            }
            cluster.push(t);
        }
        flush(&mut cluster, graph);
    }

    /// Longest-path critical path computation on the acyclic projection via
    /// topological relaxation, ties broken by higher priority then
    /// lexicographic id.
    fn critical_path(
        &self,
        graph: &DependencyGraph,
        levels: &HashMap<TaskId, usize>,
        by_id: &HashMap<TaskId, &Task>,
    ) -> Vec<TaskId> {
        let Some(order) = graph.topological_order() else {
            return Vec::new();
        };

        let mut best_duration: HashMap<TaskId, std::time::Duration> = HashMap::new();
        let mut best_predecessor: HashMap<TaskId, Option<TaskId>> = HashMap::new();

        for id in &order {
            let own_duration = by_id
                .get(id)
                .map(|t| t.estimated_duration)
                .unwrap_or_default();

            let mut best: Option<(std::time::Duration, &TaskId)> = None;
            for pred in graph.predecessors(id) {
                if let Some(pred_total) = best_duration.get(pred) {
                    let candidate = *pred_total;
                    best = match best {
                        None => Some((candidate, pred)),
                        Some((current, current_pred)) => {
                            if candidate > current {
                                Some((candidate, pred))
                            } else if candidate == current {
                                Some(tie_break(by_id, current, current_pred, candidate, pred))
                            } else {
                                Some((current, current_pred))
                            }
                        }
                    };
                }
            }

            let total = best.map(|(d, _)| d).unwrap_or_default() + own_duration;
            best_duration.insert(id.clone(), total);
            best_predecessor.insert(id.clone(), best.map(|(_, pred)| pred.clone()));
        }

        let Some(end) = best_duration
            .iter()
            .max_by(|(id_a, dur_a), (id_b, dur_b)| {
                dur_a
                    .cmp(dur_b)
                    .then_with(|| priority_of(by_id, id_a).cmp(&priority_of(by_id, id_b)))
                    .then_with(|| id_b.cmp(id_a))
            })
            .map(|(id, _)| id.clone())
        else {
            return Vec::new();
        };

        let mut path = vec![end.clone()];
        let mut current = end;
        while let Some(Some(pred)) = best_predecessor.get(&current) {
            path.push(pred.clone());
            current = pred.clone();
        }
        path.reverse();
        path
    }

    /// Additional critical-task marking: tasks whose removal disconnects
    /// more than 25% of the remaining tasks from their roots.
    fn articulation_critical_tasks(&self, graph: &DependencyGraph) -> Vec<TaskId> {
        let all: Vec<TaskId> = graph.nodes().cloned().collect();
        if all.len() < 2 {
            return Vec::new();
        }
        let total_others = all.len() - 1;
        let mut result = Vec::new();

        for candidate in &all {
            let reachable = reachable_excluding(graph, candidate);
            let disconnected = total_others.saturating_sub(reachable.len());
            if total_others > 0 && (disconnected as f64 / total_others as f64) > 0.25 {
                result.push(candidate.clone());
            }
        }
        result
    }
}

fn priority_of(by_id: &HashMap<TaskId, &Task>, id: &TaskId) -> u8 {
    by_id
        .get(id)
        .map(|t| t.priority.base_priority())
        .unwrap_or(PriorityLevel::Low.base_priority())
}

fn tie_break<'a>(
    by_id: &HashMap<TaskId, &Task>,
    current_dur: std::time::Duration,
    current: &'a TaskId,
    candidate_dur: std::time::Duration,
    candidate: &'a TaskId,
) -> (std::time::Duration, &'a TaskId) {
    let _ = candidate_dur;
    let current_priority = priority_of(by_id, current);
    let candidate_priority = priority_of(by_id, candidate);
    if candidate_priority > current_priority {
        (current_dur, candidate)
    } else if candidate_priority < current_priority {
        (current_dur, current)
    } else if candidate < current {
        (current_dur, candidate)
    } else {
        (current_dur, current)
    }
}

/// Roots with `excluded` removed from the graph, then BFS-reachable nodes
/// from those roots (also excluding `excluded` from traversal).
fn reachable_excluding(graph: &DependencyGraph, excluded: &TaskId) -> HashSet<TaskId> {
    let roots: Vec<TaskId> = graph
        .nodes()
        .filter(|id| *id != excluded && graph.in_degree(id) == 0)
        .cloned()
        .collect();

    let mut visited: HashSet<TaskId> = HashSet::new();
    let mut queue: std::collections::VecDeque<TaskId> = roots.into_iter().collect();

    while let Some(id) = queue.pop_front() {
        if id == *excluded || !visited.insert(id.clone()) {
            continue;
        }
        for succ in graph.successors(&id) {
            if succ != excluded && !visited.contains(succ) {
                queue.push_back(succ.clone());
            }
        }
    }
    visited.remove(excluded);
    visited
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DependencyReference, PriorityLevel, TaskCategory, TaskStatus};
    use chrono::Utc;
    use std::time::Duration;

    fn task(id: &str, deps: Vec<&str>) -> Task {
        Task {
            id: TaskId::new(id),
            title: format!("Task {id}"),
            description: String::new(),
            category: TaskCategory::Other,
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
    async fn s1_linear_chain() {
        let tasks = vec![task("A", vec![]), task("B", vec!["A"]), task("C", vec!["B"])];
        let config = EngineConfig::default();
        let analyzer = DependencyAnalyzer::new(&config);
        let analysis = analyzer.analyze(&tasks).await.unwrap();

        assert!(analysis.is_valid());
        assert_eq!(analysis.critical_path, vec![TaskId::new("A"), TaskId::new("B"), TaskId::new("C")]);
        assert!(analysis.independent_tasks.is_empty());
    }

    #[tokio::test]
    async fn s3_cycle_reported_not_broken() {
        let tasks = vec![
            task("X", vec!["Z"]),
            task("Y", vec!["X"]),
            task("Z", vec!["Y"]),
        ];
        let config = EngineConfig::default();
        let analyzer = DependencyAnalyzer::new(&config);
        let analysis = analyzer.analyze(&tasks).await.unwrap();

        assert!(!analysis.is_valid());
        assert_eq!(analysis.circular_chains.len(), 1);
        assert!(analysis.critical_path.is_empty());
    }

    #[tokio::test]
    async fn missing_dependency_reported_unless_optional() {
        let mut with_optional = task("A", vec![]);
        with_optional
            .dependencies
            .push(DependencyReference::new("ghost", DependencyReferenceKind::Prerequisite).optional());
        let mut with_required = task("B", vec![]);
        with_required
            .dependencies
            .push(DependencyReference::new("ghost", DependencyReferenceKind::Prerequisite));

        let config = EngineConfig::default();
        let analyzer = DependencyAnalyzer::new(&config);
        let analysis = analyzer.analyze(&[with_optional, with_required]).await.unwrap();

        let missing: Vec<_> = analysis
            .errors
            .iter()
            .filter(|e| e.kind == ValidationErrorKind::MissingDependency)
            .collect();
        assert_eq!(missing.len(), 1);
        assert!(missing[0].task_ids.contains(&TaskId::new("B")));
    }

    #[tokio::test]
    async fn resource_shared_edges_use_lexicographic_order() {
        let mut a = task("B", vec![]);
        a.capabilities.push("database".to_string());
        let mut b = task("A", vec![]);
        b.capabilities.push("database".to_string());

        let config = EngineConfig::default();
        let analyzer = DependencyAnalyzer::new(&config);
        let analysis = analyzer.analyze(&[a, b]).await.unwrap();

        let resource_edges: Vec<_> = analysis
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Resource)
            .collect();
        assert_eq!(resource_edges.len(), 1);
        assert_eq!(resource_edges[0].from, TaskId::new("A"));
        assert_eq!(resource_edges[0].to, TaskId::new("B"));
    }

    #[test]
    fn tokenize_filters_stop_words() {
        let tokens = tokenize("Set up the Database and Configure it");
        assert!(tokens.contains("database"));
        assert!(tokens.contains("configure"));
        assert!(!tokens.contains("the"));
        assert!(!tokens.contains("and"));
    }
}
