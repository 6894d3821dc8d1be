/**
 * Engine Configuration
 *
 * DESIGN DECISION: A stateless `ConfigValidator` separate from the config
 * struct itself, collecting all violations rather than failing fast
 * WHY: callers configuring an engine want every problem at once, not one
 * round-trip per mistake.
 *
 * PATTERN: Pattern-CONFIG-001 (Hierarchical Configuration), themed around
 * engine planning/scheduling options and resource budgets.
 */

use crate::error::{Error, Result};
use crate::model::PriorityThresholds;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Sequencing strategy selected for the Execution Planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencingStrategy {
    Fifo,
    Priority,
    CriticalPath,
    ResourceOptimal,
    DependencyAware,
}

/// Batching strategy used by the Queue Optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchingStrategy {
    SimilarTasks,
    ResourceOptimization,
    Temporal,
}

/// Optimization objective the Optimizer targets on a given pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationObjective {
    ThroughputMaximization,
    LatencyMinimization,
    ResourceEfficiency,
    DeadlineOptimization,
}

/// Per-resource budget (`maxUnits`) used by `resourceConstraints`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceBudget {
    pub max_units: f64,
}

/// Weights used by the Priority Scorer's weighted sum. Defaults:
/// priority 3x, urgency/impact 2x, duration/resource/success 1x.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub base_priority: f64,
    pub urgency: f64,
    pub impact: f64,
    pub duration_factor: f64,
    pub resource_availability: f64,
    pub success_rate: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            base_priority: 3.0,
            urgency: 2.0,
            impact: 2.0,
            duration_factor: 1.0,
            resource_availability: 1.0,
            success_rate: 1.0,
        }
    }
}

/// Engine-wide configuration recognized by the façade and its components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub strategy: SequencingStrategy,
    pub batching_strategy: BatchingStrategy,
    pub resource_constraints: HashMap<String, ResourceBudget>,
    #[serde(with = "duration_millis")]
    pub optimization_interval: Duration,
    pub enable_batching: bool,
    pub enable_parallel_optimization: bool,
    pub priority_thresholds: PriorityThresholds,
    pub auto_dependency_learning: bool,
    pub performance_monitoring: bool,
    pub max_concurrent_tasks: u32,
    #[serde(with = "duration_millis")]
    pub default_timeout: Duration,
    pub default_max_retries: u32,

    /// Analyzer's implicit-by-content Jaccard threshold.
    pub implicit_jaccard_threshold: f64,
    /// Analyzer's temporal clustering window.
    #[serde(with = "duration_millis")]
    pub temporal_clustering_window: Duration,
    /// Scorer weight table.
    pub score_weights: ScoreWeights,
    /// Maximum batch size for the `similar_tasks` batching strategy.
    pub max_batch_size: usize,
    /// Bound on the Optimizer's learning-history ring.
    pub learning_history_capacity: usize,
    /// Bound on the façade's fingerprinted analysis cache.
    pub analysis_cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strategy: SequencingStrategy::DependencyAware,
            batching_strategy: BatchingStrategy::SimilarTasks,
            resource_constraints: HashMap::new(),
            optimization_interval: Duration::from_secs(60),
            enable_batching: true,
            enable_parallel_optimization: true,
            priority_thresholds: PriorityThresholds::default(),
            auto_dependency_learning: true,
            performance_monitoring: true,
            max_concurrent_tasks: 8,
            default_timeout: Duration::from_secs(300),
            default_max_retries: 3,
            implicit_jaccard_threshold: 0.25,
            temporal_clustering_window: Duration::from_secs(3600),
            score_weights: ScoreWeights::default(),
            max_batch_size: 10,
            learning_history_capacity: 256,
            analysis_cache_capacity: 64,
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Validates the configuration, rejecting negative `maxUnits` or
    /// `maxConcurrentTasks < 1` at construction.
    pub fn validate(&self) -> Result<()> {
        match ConfigValidator::validate(self) {
            Ok(()) => Ok(()),
            Err(errors) => Err(Error::InvalidConfiguration(errors.join("; "))),
        }
    }

    /// `HIGH_PERFORMANCE`: cache-heavy, shallow implicit analysis.
    pub fn high_performance() -> Self {
        let config = Self {
            implicit_jaccard_threshold: 0.45,
            analysis_cache_capacity: 512,
            strategy: SequencingStrategy::Priority,
            max_concurrent_tasks: 32,
            ..Self::default()
        };
        config.validate().expect("preset config must be valid");
        config
    }

    /// `COMPREHENSIVE`: all edge kinds, strict validation.
    pub fn comprehensive() -> Self {
        let config = Self {
            implicit_jaccard_threshold: 0.15,
            strategy: SequencingStrategy::DependencyAware,
            performance_monitoring: true,
            auto_dependency_learning: true,
            ..Self::default()
        };
        config.validate().expect("preset config must be valid");
        config
    }

    /// `RESOURCE_OPTIMIZED`: resource-optimal planner.
    pub fn resource_optimized() -> Self {
        let config = Self {
            strategy: SequencingStrategy::ResourceOptimal,
            batching_strategy: BatchingStrategy::ResourceOptimization,
            enable_parallel_optimization: true,
            ..Self::default()
        };
        config.validate().expect("preset config must be valid");
        config
    }

    /// `QUALITY_FOCUSED`: maximum confidence thresholds, sequential
    /// validation.
    pub fn quality_focused() -> Self {
        let config = Self {
            implicit_jaccard_threshold: 0.6,
            strategy: SequencingStrategy::CriticalPath,
            enable_parallel_optimization: false,
            max_concurrent_tasks: 1,
            ..Self::default()
        };
        config.validate().expect("preset config must be valid");
        config
    }
}

/// Fluent builder: defaults plus overrides, validated on `.build()`.
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: OverrideSet,
}

#[derive(Debug, Default)]
struct OverrideSet {
    strategy: Option<SequencingStrategy>,
    batching_strategy: Option<BatchingStrategy>,
    resource_constraints: Option<HashMap<String, ResourceBudget>>,
    max_concurrent_tasks: Option<u32>,
    default_timeout: Option<Duration>,
    default_max_retries: Option<u32>,
    score_weights: Option<ScoreWeights>,
}

impl EngineConfigBuilder {
    pub fn strategy(mut self, strategy: SequencingStrategy) -> Self {
        self.config.strategy = Some(strategy);
        self
    }

    pub fn batching_strategy(mut self, strategy: BatchingStrategy) -> Self {
        self.config.batching_strategy = Some(strategy);
        self
    }

    pub fn resource_constraint(mut self, resource: impl Into<String>, max_units: f64) -> Self {
        self.config
            .resource_constraints
            .get_or_insert_with(HashMap::new)
            .insert(resource.into(), ResourceBudget { max_units });
        self
    }

    pub fn max_concurrent_tasks(mut self, value: u32) -> Self {
        self.config.max_concurrent_tasks = Some(value);
        self
    }

    pub fn default_timeout(mut self, value: Duration) -> Self {
        self.config.default_timeout = Some(value);
        self
    }

    pub fn default_max_retries(mut self, value: u32) -> Self {
        self.config.default_max_retries = Some(value);
        self
    }

    pub fn score_weights(mut self, weights: ScoreWeights) -> Self {
        self.config.score_weights = Some(weights);
        self
    }

    pub fn build(self) -> Result<EngineConfig> {
        let mut config = EngineConfig::default();
        if let Some(v) = self.config.strategy {
            config.strategy = v;
        }
        if let Some(v) = self.config.batching_strategy {
            config.batching_strategy = v;
        }
        if let Some(v) = self.config.resource_constraints {
            config.resource_constraints = v;
        }
        if let Some(v) = self.config.max_concurrent_tasks {
            config.max_concurrent_tasks = v;
        }
        if let Some(v) = self.config.default_timeout {
            config.default_timeout = v;
        }
        if let Some(v) = self.config.default_max_retries {
            config.default_max_retries = v;
        }
        if let Some(v) = self.config.score_weights {
            config.score_weights = v;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Validation result type: `Result<(), Vec<String>>`, collecting all
/// violations rather than failing fast.
pub type ValidationResult = std::result::Result<(), Vec<String>>;

/// Stateless configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &EngineConfig) -> ValidationResult {
        let mut errors = Vec::new();

        if config.max_concurrent_tasks < 1 {
            errors.push("max_concurrent_tasks must be >= 1".to_string());
        }

        for (resource, budget) in &config.resource_constraints {
            if budget.max_units < 0.0 {
                errors.push(format!(
                    "resource_constraints.{resource}.max_units must be >= 0, got {}",
                    budget.max_units
                ));
            }
        }

        if !(0.0..=1.0).contains(&config.implicit_jaccard_threshold) {
            errors.push(format!(
                "implicit_jaccard_threshold must be within [0, 1], got {}",
                config.implicit_jaccard_threshold
            ));
        }

        if config.max_batch_size == 0 {
            errors.push("max_batch_size must be >= 1".to_string());
        }

        let weights = &config.score_weights;
        for (name, value) in [
            ("base_priority", weights.base_priority),
            ("urgency", weights.urgency),
            ("impact", weights.impact),
            ("duration_factor", weights.duration_factor),
            ("resource_availability", weights.resource_availability),
            ("success_rate", weights.success_rate),
        ] {
            if value < 0.0 {
                errors.push(format!("score_weights.{name} must be >= 0, got {value}"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
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

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_negative_max_units() {
        let mut config = EngineConfig::default();
        config
            .resource_constraints
            .insert("cpu".to_string(), ResourceBudget { max_units: -1.0 });
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_max_concurrent_tasks() {
        let config = EngineConfig {
            max_concurrent_tasks: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validator_collects_all_errors_not_just_first() {
        let config = EngineConfig {
            max_concurrent_tasks: 0,
            max_batch_size: 0,
            ..EngineConfig::default()
        };
        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn builder_overrides_apply_and_validate() {
        let config = EngineConfig::builder()
            .strategy(SequencingStrategy::ResourceOptimal)
            .max_concurrent_tasks(4)
            .build()
            .unwrap();
        assert_eq!(config.strategy, SequencingStrategy::ResourceOptimal);
        assert_eq!(config.max_concurrent_tasks, 4);
    }

    #[test]
    fn builder_rejects_invalid_override() {
        let result = EngineConfig::builder().max_concurrent_tasks(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn presets_are_all_valid() {
        assert!(EngineConfig::high_performance().validate().is_ok());
        assert!(EngineConfig::comprehensive().validate().is_ok());
        assert!(EngineConfig::resource_optimized().validate().is_ok());
        assert!(EngineConfig::quality_focused().validate().is_ok());
    }
}
