//! CLI-level errors (wraps infrastructure errors)

use thiserror::Error;

use crate::application::ApplicationError;
use crate::domain::DomainError;
use crate::exitcode;
use crate::infrastructure::traits::QueryError;
use crate::infrastructure::InfraError;

/// CLI errors are the top-level error type.
/// These are what get displayed to the user.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Infra(#[from] InfraError),

    #[error("{0}")]
    Usage(String),
}

impl From<ApplicationError> for CliError {
    fn from(e: ApplicationError) -> Self {
        CliError::Infra(InfraError::Application(e))
    }
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    /// Get the appropriate exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) => exitcode::USAGE,
            CliError::Infra(e) => match e {
                InfraError::Io { .. } => exitcode::IOERR,
                InfraError::Graphviz { .. } => exitcode::SOFTWARE,
                InfraError::Http { .. } => exitcode::SOFTWARE,
                InfraError::Application(e) => application_exit_code(e),
            },
        }
    }
}

fn application_exit_code(e: &ApplicationError) -> i32 {
    match e {
        ApplicationError::Domain(DomainError::TenantNotFound(_)) => exitcode::DATAERR,
        ApplicationError::Domain(DomainError::MalformedObject { .. }) => exitcode::DATAERR,
        ApplicationError::Domain(DomainError::UnknownNode(_)) => exitcode::SOFTWARE,
        ApplicationError::Authentication(_) => exitcode::NOPERM,
        ApplicationError::Query { source, .. } => match source {
            QueryError::Authentication(_) => exitcode::NOPERM,
            QueryError::Transport { .. } | QueryError::Status { .. } => exitcode::UNAVAILABLE,
            QueryError::Decode(_) => exitcode::DATAERR,
            QueryError::SessionClosed => exitcode::SOFTWARE,
        },
        ApplicationError::Config { .. } => exitcode::CONFIG,
        ApplicationError::Render { source, .. } => match source.downcast_ref::<InfraError>() {
            Some(InfraError::Io { .. }) => exitcode::UNAVAILABLE,
            _ => exitcode::SOFTWARE,
        },
    }
}
