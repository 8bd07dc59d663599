//! Error types for the physics core.
//!
//! Only setup-time misconfiguration and genuinely unsupported collider pairs
//! surface as errors. "No collision" is an ordinary `None`, and numerical
//! trouble inside a step degrades to a logged fallback result.

use thiserror::Error;

/// Errors returned by the physics core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    /// A collider was asked to test against a shape it has no handler for.
    #[error("unsupported collider pair: {a} vs {b}")]
    UnsupportedColliderPair { a: &'static str, b: &'static str },

    /// Shape, body or world parameters are malformed.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An entity handed to the physics world lacks a required component.
    #[error("entity {entity:?} has no {component} component")]
    MissingComponent {
        entity: hecs::Entity,
        component: &'static str,
    },
}

/// Convenience alias for `Result<T, PhysicsError>`.
pub type PhysicsResult<T> = Result<T, PhysicsError>;
