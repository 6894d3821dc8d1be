/**
 * Error Handling Module
 *
 * DESIGN DECISION: Centralized error types using thiserror for consistent error semantics
 * WHY: Library code must never panic; all errors returned as Result
 *
 * REASONING CHAIN:
 * 1. thiserror provides ergonomic error derive macros without boilerplate
 * 2. Centralized error types enable consistent error handling across modules
 * 3. Error conversion (From trait) enables ? operator for error propagation
 * 4. Custom error types provide domain-specific context for debugging
 *
 * PATTERN: Pattern-001 (Planning Core Error Taxonomy)
 *
 * # Propagation Policy
 *
 * The Analyzer and Planner never raise for data-level problems (missing
 * dependency targets, cycles, capacity overruns) — those are enumerated as
 * structured results (`ValidationResult`, `Conflict`, `Recommendation`).
 * `Error` is reserved for programming errors, invariant violations,
 * cancellation, and timeouts: the cases that are genuinely exceptional
 * rather than an expected outcome of the input.
 *
 * # Examples
 *
 * ```rust
 * use taskforge_core::{Error, Result};
 *
 * fn require_known_task(id: &str, exists: bool) -> Result<()> {
 *     if !exists {
 *         return Err(Error::TaskNotFound(id.to_string()));
 *     }
 *     Ok(())
 * }
 * ```
 */

use thiserror::Error;

/**
 * Primary error type for the planning core
 *
 * DESIGN DECISION: Enum-based error type with structured variants
 * WHY: Type-safe error handling with exhaustive pattern matching
 *
 * REASONING CHAIN:
 * 1. Each variant represents a distinct exceptional failure mode
 * 2. Structured errors carry contextual data (task id, field name, etc.)
 * 3. thiserror generates Display impl for human-readable messages
 * 4. Enum exhaustiveness ensures all errors handled at call sites
 *
 * PATTERN: Rust error handling best practices
 * RELATED: Result type alias, From conversions
 */
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /**
     * Task repository errors
     *
     * DESIGN DECISION: Separate variants for repository lookups
     * WHY: Distinguish "unknown id" from "duplicate registration" at call sites
     */

    /// Task not found in the repository by id
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// Duplicate task id registered with the façade
    #[error("duplicate task id: {0}")]
    DuplicateTask(String),

    /// Malformed task descriptor (missing id, null dependency list treated
    /// as empty rather than erroring — this variant is for structurally
    /// unusable descriptors only, e.g. an empty id)
    #[error("malformed task descriptor: {0}")]
    MalformedDescriptor(String),

    /**
     * Invariant violations
     *
     * DESIGN DECISION: Distinct from data-level validation errors
     * WHY: An invariant violation means internal state is inconsistent
     * (e.g. an edge referencing a deleted node); it is fatal and the
     * façade transitions to a degraded read-only mode rather than
     * continuing to serve potentially-corrupt results.
     */

    /// Internal graph or cache state inconsistency
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /**
     * Configuration errors
     *
     * DESIGN DECISION: Rejected eagerly at construction, not deferred
     * WHY: A negative resource budget or zero concurrency is never valid;
     * catching it at `EngineConfig::validate` time avoids corrupting a
     * plan built against it later
     */

    /// Configuration failed validation (negative budget, zero concurrency, etc.)
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /**
     * Cooperative cancellation and timeouts
     *
     * DESIGN DECISION: Distinct outcomes, never confused with failure
     * WHY: a caller that cancelled or timed out an operation needs to tell
     * that apart from an actual failure, not wrap it as a generic error it
     * then has to inspect
     */

    /// Operation was cancelled via its cancellation signal before completion
    #[error("operation cancelled")]
    Cancelled,

    /// Operation exceeded its caller-supplied deadline
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /**
     * Generic fallback
     *
     * DESIGN DECISION: Catch-all variant for unexpected internal errors
     * WHY: Enables conversion from poisoned locks and other library-
     * internal failures that have no more specific variant
     */

    /// Unexpected internal error (should not occur in normal operation)
    #[error("internal error: {0}")]
    Internal(String),
}

/**
 * Result type alias for planning-core operations
 *
 * DESIGN DECISION: Type alias for consistent Result usage across library
 * WHY: Reduces boilerplate and ensures a single source of truth for the
 * error type
 *
 * PATTERN: Rust error handling best practices
 */
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(format!("serialization error: {err}"))
    }
}
