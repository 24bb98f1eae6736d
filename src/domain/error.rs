//! Domain-level errors (no external dependencies)

use thiserror::Error;

/// Domain errors represent violations of the graph and policy model.
/// These are independent of infrastructure concerns.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("tenant not found: {0}")]
    TenantNotFound(String),

    #[error("malformed {class} object: {message}")]
    MalformedObject { class: String, message: String },
}
