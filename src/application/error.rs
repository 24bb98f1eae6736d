//! Application-level errors (wraps domain errors)

use thiserror::Error;

use crate::domain::DomainError;
use crate::infrastructure::traits::QueryError;

/// Application errors wrap domain errors and add application-level context.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("{0}")]
    Domain(#[from] DomainError),

    #[error("{0}")]
    Authentication(String),

    #[error("query failed: {context}")]
    Query {
        context: String,
        #[source]
        source: QueryError,
    },

    #[error("config error: {message}")]
    Config { message: String },

    #[error("render failed: {context}")]
    Render {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ApplicationError {
    /// Wrap a query failure, lifting authentication failures to their own variant.
    pub fn query(context: impl Into<String>, source: QueryError) -> Self {
        match source {
            QueryError::Authentication(message) => {
                Self::Authentication(format!("authentication failed: {message}"))
            }
            source => Self::Query {
                context: context.into(),
                source,
            },
        }
    }
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
