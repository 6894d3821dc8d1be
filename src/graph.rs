/**
 * Dependency Graph Store
 *
 * DESIGN DECISION: Two flat adjacency tables (predecessors/successors) over
 * stable ids, rather than an owning node-pointer graph
 * WHY: Cycles are data to report, not a runtime hazard to guard against at
 * construction. Flat tables make a cycle just another reachable set of
 * rows instead of something the graph has to refuse to build.
 *
 * REASONING CHAIN:
 * 1. Analyzer, Planner, and Monitor all need different views of the same
 *    edges (by source, by target, by kind).
 * 2. A flat `HashMap<TaskId, Vec<TaskId>>` per direction answers all three
 *    in O(1) amortized lookup plus a linear scan of the row.
 * 3. Levels and critical path are derived, recomputed per analysis pass,
 *    never stored as mutable back-pointers on nodes.
 *
 * PATTERN: Pattern-001 (Planning Core Data Model), built on in_degree/
 * dependents bookkeeping, generalized to typed, confidence-carrying edges
 * and Tarjan cycle enumeration instead of Kahn's existence-only check.
 */

use crate::model::TaskId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Edge classification produced by the Analyzer's discovery passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Explicit,
    Implicit,
    Resource,
    Temporal,
}

/// A derived dependency edge. `from` must complete before `to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: TaskId,
    pub to: TaskId,
    pub kind: EdgeKind,
    pub confidence: f64,
}

/// A simple cycle, reported as the ordered id list closing back on the
/// first element (`[X, Y, Z, X]`).
pub type CircularChain = Vec<TaskId>;

/// The mutable, in-memory dependency graph all components read.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    nodes: HashSet<TaskId>,
    edges: Vec<DependencyEdge>,
    predecessors: HashMap<TaskId, Vec<TaskId>>,
    successors: HashMap<TaskId, Vec<TaskId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: TaskId) {
        if self.nodes.insert(id.clone()) {
            self.predecessors.entry(id.clone()).or_default();
            self.successors.entry(id).or_default();
        }
    }

    /// Adds an edge. Both endpoints must already be registered via
    /// `add_node` — callers (the Analyzer) are responsible for reporting a
    /// missing-dependency error instead of calling this for an absent node.
    pub fn add_edge(&mut self, edge: DependencyEdge) {
        self.successors
            .entry(edge.from.clone())
            .or_default()
            .push(edge.to.clone());
        self.predecessors
            .entry(edge.to.clone())
            .or_default()
            .push(edge.from.clone());
        self.edges.push(edge);
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TaskId> {
        self.nodes.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.nodes.contains(id)
    }

    pub fn predecessors(&self, id: &TaskId) -> &[TaskId] {
        self.predecessors.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn successors(&self, id: &TaskId) -> &[TaskId] {
        self.successors.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn in_degree(&self, id: &TaskId) -> usize {
        self.predecessors(id).len()
    }

    pub fn out_degree(&self, id: &TaskId) -> usize {
        self.successors(id).len()
    }

    /// Tasks with in-degree = 0 and out-degree = 0.
    pub fn independent_tasks(&self) -> Vec<TaskId> {
        let mut result: Vec<TaskId> = self
            .nodes
            .iter()
            .filter(|id| self.in_degree(id) == 0 && self.out_degree(id) == 0)
            .cloned()
            .collect();
        result.sort();
        result
    }

    /// Computes `level(t) = 1 + max(level(p) for p in predecessors(t))`, or 0
    /// if none. Only meaningful on the acyclic projection;
    /// nodes participating in a cycle are assigned `None`.
    pub fn levels(&self) -> HashMap<TaskId, usize> {
        let mut levels: HashMap<TaskId, usize> = HashMap::new();
        let order = match self.topological_order() {
            Some(order) => order,
            None => return levels,
        };
        for id in &order {
            let level = self
                .predecessors(id)
                .iter()
                .filter_map(|p| levels.get(p))
                .max()
                .map(|l| l + 1)
                .unwrap_or(0);
            levels.insert(id.clone(), level);
        }
        levels
    }

    /// Kahn's algorithm topological order; `None` if the graph has a cycle.
    /// Used internally by `levels()` and by callers that have already
    /// confirmed acyclicity via `find_cycles()`.
    pub fn topological_order(&self) -> Option<Vec<TaskId>> {
        let mut in_degree: HashMap<TaskId, usize> = self
            .nodes
            .iter()
            .map(|id| (id.clone(), self.in_degree(id)))
            .collect();
        let mut ready: Vec<TaskId> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| id.clone())
            .collect();
        ready.sort();

        let mut order = Vec::with_capacity(self.nodes.len());
        let mut queue: std::collections::VecDeque<TaskId> = ready.into_iter().collect();

        while let Some(id) = queue.pop_front() {
            order.push(id.clone());
            let mut newly_ready = Vec::new();
            for succ in self.successors(&id) {
                if let Some(d) = in_degree.get_mut(succ) {
                    *d -= 1;
                    if *d == 0 {
                        newly_ready.push(succ.clone());
                    }
                }
            }
            newly_ready.sort();
            queue.extend(newly_ready);
        }

        if order.len() == self.nodes.len() {
            Some(order)
        } else {
            None
        }
    }

    /// Tarjan's strongly connected components over the union graph (all edge
    /// kinds together). Any SCC of size > 1, or a single node with a
    /// self-loop, becomes a circular
    /// chain. Iterative (explicit stack) to avoid recursion-depth limits on
    /// large graphs.
    pub fn find_cycles(&self) -> Vec<CircularChain> {
        let mut ordered: Vec<&TaskId> = self.nodes.iter().collect();
        ordered.sort();

        let mut index_counter = 0usize;
        let mut indices: HashMap<TaskId, usize> = HashMap::new();
        let mut lowlink: HashMap<TaskId, usize> = HashMap::new();
        let mut on_stack: HashSet<TaskId> = HashSet::new();
        let mut stack: Vec<TaskId> = Vec::new();
        let mut sccs: Vec<Vec<TaskId>> = Vec::new();

        enum Frame {
            Enter(TaskId),
            Finish(TaskId),
        }

        for root in ordered {
            if indices.contains_key(root) {
                continue;
            }
            let mut work: Vec<Frame> = vec![Frame::Enter(root.clone())];
            // successor iteration cursor per node being visited, so we can
            // resume a partially-explored node after a child returns.
            let mut cursor: HashMap<TaskId, usize> = HashMap::new();

            while let Some(frame) = work.pop() {
                match frame {
                    Frame::Enter(id) => {
                        if indices.contains_key(&id) {
                            continue;
                        }
                        indices.insert(id.clone(), index_counter);
                        lowlink.insert(id.clone(), index_counter);
                        index_counter += 1;
                        stack.push(id.clone());
                        on_stack.insert(id.clone());
                        cursor.insert(id.clone(), 0);
                        work.push(Frame::Finish(id.clone()));

                        let mut succs: Vec<TaskId> = self.successors(&id).to_vec();
                        succs.sort();
                        for succ in succs {
                            if !indices.contains_key(&succ) {
                                work.push(Frame::Enter(succ));
                            } else if on_stack.contains(&succ) {
                                let succ_index = indices[&succ];
                                let current_low = lowlink[&id];
                                lowlink.insert(id.clone(), current_low.min(succ_index));
                            }
                        }
                    }
                    Frame::Finish(id) => {
                        // Propagate lowlink from already-finished successors
                        // that are still on the stack (covers cases handled
                        // purely by the Enter branch above, plus children
                        // visited via recursive Enter frames).
                        let mut succs: Vec<TaskId> = self.successors(&id).to_vec();
                        succs.sort();
                        for succ in succs {
                            if let Some(&succ_low) = lowlink.get(&succ) {
                                if on_stack.contains(&succ) {
                                    let current_low = lowlink[&id];
                                    lowlink.insert(id.clone(), current_low.min(succ_low));
                                }
                            }
                        }

                        if lowlink[&id] == indices[&id] {
                            let mut component = Vec::new();
                            loop {
                                let member = stack.pop().expect("stack non-empty while unwinding SCC");
                                on_stack.remove(&member);
                                let is_root = member == id;
                                component.push(member);
                                if is_root {
                                    break;
                                }
                            }
                            sccs.push(component);
                        }
                    }
                }
            }
        }

        let mut chains = Vec::new();
        for mut scc in sccs {
            scc.sort();
            let is_cycle = scc.len() > 1
                || scc
                    .first()
                    .map(|id| self.successors(id).contains(id))
                    .unwrap_or(false);
            if !is_cycle {
                continue;
            }
            let root = scc[0].clone();
            let chain = self.render_cycle(&scc, &root);
            chains.push(chain);
        }
        chains.sort();
        chains
    }

    /// Walks an SCC from its lowest-id member back to itself, following
    /// successor edges restricted to the component, producing the ordered
    /// id list closing back on the first element, e.g. `[X, Y, Z, X]`.
    fn render_cycle(&self, scc: &[TaskId], root: &TaskId) -> CircularChain {
        let members: HashSet<&TaskId> = scc.iter().collect();
        let mut path = vec![root.clone()];
        let mut visited: HashSet<TaskId> = HashSet::new();
        visited.insert(root.clone());
        let mut current = root.clone();

        loop {
            let mut next_candidates: Vec<&TaskId> = self
                .successors(&current)
                .iter()
                .filter(|s| members.contains(s))
                .collect();
            next_candidates.sort();

            if next_candidates.iter().any(|s| *s == root) && path.len() > 1 {
                path.push(root.clone());
                break;
            }

            let next = next_candidates
                .into_iter()
                .find(|s| !visited.contains(*s))
                .cloned();

            match next {
                Some(n) => {
                    visited.insert(n.clone());
                    path.push(n.clone());
                    current = n;
                }
                None => {
                    // Self-loop or a component with no unvisited successor;
                    // close the chain on the root.
                    path.push(root.clone());
                    break;
                }
            }
        }
        path
    }
}
