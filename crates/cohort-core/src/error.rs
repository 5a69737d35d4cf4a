//! Typed error taxonomy for the engine core.
//!
//! Runtime failures the scheduler itself can raise (as opposed to loader or
//! executor errors, which live in their own crates/modules) are collected
//! here as one enum so callers can match on the kind rather than parse a
//! message.

use thiserror::Error;

/// Errors raised by the action/service engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// [`crate::resolver::resolve`] hit a `$NAME` token with no matching
    /// attribute or variable in any resolver layer.
    #[error("variable [{name}] undefined in [{command}]")]
    UndefinedVariable { name: String, command: String },

    /// `retry` was assigned on an action whose `delay` is `0`.
    #[error("no way to specify retry without a delay")]
    RetryWithoutDelay,

    /// An action or service name collided with an existing entry.
    #[error("duplicate name '{0}' in this scope")]
    DuplicateName(String),

    /// A dependency referenced a peer that does not exist.
    #[error("dependency '{0}' references unknown peer '{1}'")]
    UnknownDependency(String, String),

    /// The loader (or a manual graph build) would introduce a cycle.
    #[error("dependency cycle detected involving '{0}'")]
    CyclicDependency(String),
}

/// Convenience alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
