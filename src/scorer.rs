/**
 * Priority Scorer
 *
 * DESIGN DECISION: A breakdown struct of named f64 components plus a
 * fluent builder
 * WHY: several independently-computed [0,1]-ish dimensions combine into
 * one weighted score; a named breakdown struct keeps each dimension
 * independently inspectable instead of collapsing straight to a scalar.
 *
 * REASONING CHAIN:
 * 1. Each of the six components is computed by its own pure
 *    function, independently testable.
 * 2. `PriorityBreakdown::calculate` validates ranges, then applies the
 *    configured weights and clamps.
 * 3. `PriorityScorer` holds the mutable state the breakdown functions
 *    read from: current system load (resource availability) and the
 *    per-task learning state the Monitor feeds back.
 *
 * PATTERN: Pattern-SCORE-001 (Weighted Composite Score, validate-then-
 * calculate).
 */

use crate::config::{EngineConfig, ScoreWeights};
use crate::error::{Error, Result};
use crate::model::{Task, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-task learning state fed back by the Monitor:
/// updates are commutative (sum + count), so out-of-order delivery is safe.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LearningState {
    pub success_count: u64,
    pub failure_count: u64,
    pub total_duration: std::time::Duration,
    pub attempt_count: u64,
}

impl LearningState {
    pub fn record(&mut self, success: bool, duration: std::time::Duration) {
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.total_duration += duration;
        self.attempt_count += 1;
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            1.0
        } else {
            self.success_count as f64 / total as f64
        }
    }

    pub fn mean_duration(&self) -> Option<std::time::Duration> {
        if self.attempt_count == 0 {
            None
        } else {
            Some(self.total_duration / self.attempt_count as u32)
        }
    }
}

/// The six named components of a priority score, each already
/// normalized to a comparable scale before weighting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityBreakdown {
    pub base_priority: f64,
    pub urgency: f64,
    pub impact: f64,
    pub duration_factor: f64,
    pub resource_availability: f64,
    pub success_rate: f64,
}

impl Default for PriorityBreakdown {
    fn default() -> Self {
        Self {
            base_priority: 0.5,
            urgency: 0.0,
            impact: 0.0,
            duration_factor: 0.5,
            resource_availability: 1.0,
            success_rate: 1.0,
        }
    }
}

impl PriorityBreakdown {
    /// Weighted sum of the six components, clamped to a non-negative score.
    /// Base priority is expressed on a 0-100 scale elsewhere; here every
    /// component is normalized to roughly [0,1] before weighting so the
    /// weights in `ScoreWeights` are directly comparable across dimensions.
    pub fn calculate(self, weights: &ScoreWeights) -> Result<f64> {
        self.validate()?;
        let score = self.base_priority * weights.base_priority
            + self.urgency * weights.urgency
            + self.impact * weights.impact
            + self.duration_factor * weights.duration_factor
            + self.resource_availability * weights.resource_availability
            + self.success_rate * weights.success_rate;
        Ok(score.max(0.0))
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("base_priority", self.base_priority),
            ("urgency", self.urgency),
            ("resource_availability", self.resource_availability),
            ("success_rate", self.success_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::InvariantViolation(format!(
                    "priority breakdown component {name} out of range [0,1]: {value}"
                )));
            }
        }
        Ok(())
    }

    pub fn builder() -> PriorityBreakdownBuilder {
        PriorityBreakdownBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct PriorityBreakdownBuilder {
    base_priority: Option<f64>,
    urgency: Option<f64>,
    impact: Option<f64>,
    duration_factor: Option<f64>,
    resource_availability: Option<f64>,
    success_rate: Option<f64>,
}

impl PriorityBreakdownBuilder {
    pub fn base_priority(mut self, value: f64) -> Self {
        self.base_priority = Some(value);
        self
    }
    pub fn urgency(mut self, value: f64) -> Self {
        self.urgency = Some(value);
        self
    }
    pub fn impact(mut self, value: f64) -> Self {
        self.impact = Some(value);
        self
    }
    pub fn duration_factor(mut self, value: f64) -> Self {
        self.duration_factor = Some(value);
        self
    }
    pub fn resource_availability(mut self, value: f64) -> Self {
        self.resource_availability = Some(value);
        self
    }
    pub fn success_rate(mut self, value: f64) -> Self {
        self.success_rate = Some(value);
        self
    }

    pub fn build(self) -> PriorityBreakdown {
        let default = PriorityBreakdown::default();
        PriorityBreakdown {
            base_priority: self.base_priority.unwrap_or(default.base_priority),
            urgency: self.urgency.unwrap_or(default.urgency),
            impact: self.impact.unwrap_or(default.impact),
            duration_factor: self.duration_factor.unwrap_or(default.duration_factor),
            resource_availability: self
                .resource_availability
                .unwrap_or(default.resource_availability),
            success_rate: self.success_rate.unwrap_or(default.success_rate),
        }
    }
}

/// A task's computed priority score and the breakdown that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityScore {
    pub total: f64,
    pub breakdown: PriorityBreakdown,
}

const AGING_WINDOW: std::time::Duration = std::time::Duration::from_secs(24 * 3600);
const REFERENCE_DURATION: std::time::Duration = std::time::Duration::from_secs(60);

/// Computes and maintains priority scores, tracking current system
/// resource load and per-task learning state fed back by the Monitor.
#[derive(Debug)]
pub struct PriorityScorer {
    weights: ScoreWeights,
    /// fraction of each resource currently available, [0,1]; 1.0 if unset.
    resource_load: HashMap<String, f64>,
    learning: HashMap<TaskId, LearningState>,
    aging_boosts: HashMap<TaskId, f64>,
}

impl PriorityScorer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            weights: config.score_weights,
            resource_load: HashMap::new(),
            learning: HashMap::new(),
            aging_boosts: HashMap::new(),
        }
    }

    /// Scales resource availability: `1.0` is fully available, `0.0` is
    /// fully saturated.
    pub fn update_system_load(&mut self, resource: impl Into<String>, available_fraction: f64) {
        self.resource_load
            .insert(resource.into(), available_fraction.clamp(0.0, 1.0));
    }

    /// Feeds an observed execution outcome back into the task's learning
    /// state.
    pub fn record_execution(&mut self, task_id: &TaskId, success: bool, duration: std::time::Duration) {
        self.learning
            .entry(task_id.clone())
            .or_default()
            .record(success, duration);
    }

    /// Applies an explicit aging boost added on top of the computed
    /// urgency component for the given task.
    pub fn apply_aging_boost(&mut self, task_id: &TaskId, boost: f64) {
        *self.aging_boosts.entry(task_id.clone()).or_insert(0.0) += boost;
    }

    /// Replaces the active component weights, e.g. when the façade's
    /// self-tuning loop shifts emphasis based on learning history.
    pub fn set_weights(&mut self, weights: ScoreWeights) {
        self.weights = weights;
    }

    pub fn weights(&self) -> ScoreWeights {
        self.weights
    }

    pub fn score(
        &self,
        task: &Task,
        dependent_count: usize,
        on_critical_path: bool,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<PriorityScore> {
        let base_priority = task.priority.base_priority() as f64 / 100.0;

        let age = (now - task.created_at)
            .to_std()
            .unwrap_or_default();
        let age_fraction = (age.as_secs_f64() / AGING_WINDOW.as_secs_f64()).min(1.0);
        let deadline_proximity = task
            .deadline
            .map(|deadline| {
                let remaining = (deadline - now).to_std().unwrap_or_default();
                let estimated = task.estimated_duration.as_secs_f64().max(1.0);
                (1.0 - remaining.as_secs_f64() / estimated).clamp(0.0, 1.0)
            })
            .unwrap_or(0.0);
        let mut urgency = (age_fraction * 0.5 + deadline_proximity * 0.5).clamp(0.0, 1.0);
        if let Some(boost) = self.aging_boosts.get(&task.id) {
            urgency = (urgency + boost).clamp(0.0, 1.0);
        }

        let dependent_term = (1.0 + dependent_count as f64).ln();
        let cp_term = if on_critical_path { 1.0 } else { 0.0 };
        // Impact is unbounded by construction (log of dependent count); it
        // is not one of the ranges `validate()` checks, so the normalized
        // value passed into the breakdown is already caller-relative.
        let impact = (dependent_term * 0.6 + cp_term * 0.4).min(1.0);

        let duration_factor = 1.0
            / (1.0 + task.estimated_duration.as_secs_f64() / REFERENCE_DURATION.as_secs_f64());

        let resource_availability = if task.resource_demand.is_empty() {
            1.0
        } else {
            task.resource_demand
                .keys()
                .map(|resource| self.resource_load.get(resource).copied().unwrap_or(1.0))
                .fold(1.0_f64, f64::min)
                .clamp(0.0, 1.0)
        };

        let success_rate = self
            .learning
            .get(&task.id)
            .map(LearningState::success_rate)
            .unwrap_or_else(|| task.success_rate());

        let breakdown = PriorityBreakdown {
            base_priority,
            urgency,
            impact,
            duration_factor,
            resource_availability,
            success_rate,
        };
        let total = breakdown.calculate(&self.weights)?;
        Ok(PriorityScore { total, breakdown })
    }
}
