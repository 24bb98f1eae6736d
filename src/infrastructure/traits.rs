//! I/O boundary traits for testability
//!
//! These traits abstract the remote policy source and external commands,
//! allowing services to be tested with mock implementations.

use std::fmt;
use std::io;
use std::process::Output;

use thiserror::Error;

use crate::domain::{Dn, ManagedObject};

/// Equality filter on one attribute of a class: `eq(class.attribute, "value")`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropFilter {
    pub class: String,
    pub attribute: String,
    pub value: String,
}

impl PropFilter {
    pub fn eq(class: &str, attribute: &str, value: &str) -> Self {
        Self {
            class: class.to_string(),
            attribute: attribute.to_string(),
            value: value.to_string(),
        }
    }
}

impl fmt::Display for PropFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "eq({}.{},\"{}\")",
            self.class,
            self.attribute,
            self.value.replace('"', "\\\"")
        )
    }
}

/// All objects of `class` below the hierarchy path `scope`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopedClassQuery {
    pub scope: Dn,
    pub class: String,
}

impl ScopedClassQuery {
    pub fn new(scope: &Dn, class: &str) -> Self {
        Self {
            scope: scope.clone(),
            class: class.to_string(),
        }
    }
}

impl fmt::Display for ScopedClassQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.class)
    }
}

/// Failure talking to the policy source.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("transport error: {message}")]
    Transport { message: String, retryable: bool },

    #[error("unexpected HTTP status {code}: {message}")]
    Status { code: u16, message: String },

    #[error("cannot decode response: {0}")]
    Decode(String),

    #[error("session is not logged in")]
    SessionClosed,
}

impl QueryError {
    /// Whether repeating the request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            QueryError::Transport { retryable, .. } => *retryable,
            QueryError::Status { code, .. } => *code >= 500,
            _ => false,
        }
    }
}

/// Remote source of managed objects.
///
/// `login` must succeed before any query; no queries follow `logout`.
pub trait PolicySource: Send + Sync {
    fn login(&self) -> Result<(), QueryError>;

    fn logout(&self) -> Result<(), QueryError>;

    /// All objects of a class, optionally filtered by one attribute.
    fn lookup_by_class(
        &self,
        class: &str,
        filter: Option<&PropFilter>,
    ) -> Result<Vec<ManagedObject>, QueryError>;

    /// All objects of a class that are descendants of a hierarchy path.
    fn query(&self, query: &ScopedClassQuery) -> Result<Vec<ManagedObject>, QueryError>;
}

/// External command runner abstraction.
pub trait CommandRunner: Send + Sync {
    /// Run a command with arguments, feeding `stdin` to it.
    fn run_with_stdin(&self, cmd: &str, args: &[&str], stdin: &str) -> io::Result<Output>;
}

// ============================================================
// REAL IMPLEMENTATIONS
// ============================================================

/// Real command runner implementation.
#[derive(Debug, Default)]
pub struct RealCommandRunner;

impl CommandRunner for RealCommandRunner {
    fn run_with_stdin(&self, cmd: &str, args: &[&str], stdin: &str) -> io::Result<Output> {
        use std::io::Write;
        use std::process::Stdio;

        let mut child = std::process::Command::new(cmd)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // stdin is closed before waiting so the child sees EOF
        let written = match child.stdin.take() {
            Some(mut child_stdin) => child_stdin.write_all(stdin.as_bytes()),
            None => Ok(()),
        };
        let output = child.wait_with_output()?;

        match written {
            // an engine that exits early closes its end; its status and stderr tell why
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe && !output.status.success() => {
                Ok(output)
            }
            Err(e) => Err(e),
            Ok(()) => Ok(output),
        }
    }
}
