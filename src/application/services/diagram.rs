//! Diagram service
//!
//! One run: login, walk, logout, render. Authentication and tenant lookup
//! failures abort before anything is written. The graph is handed to the
//! backend exactly once, after the session has been closed.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::application::services::walker::{PolicyWalker, WalkStats, WalkWarning};
use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::{GraphBackend, LayoutEngine};
use crate::infrastructure::traits::PolicySource;

/// What to draw and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramRequest {
    /// Restrict the walk to one tenant; `None` draws all tenants.
    pub tenant: Option<String>,
    pub destination: PathBuf,
    pub engine: LayoutEngine,
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct DiagramReport {
    pub destination: PathBuf,
    pub engine: LayoutEngine,
    /// DOT document handed to the backend.
    pub dot: String,
    pub tenants: Vec<String>,
    pub warnings: Vec<WalkWarning>,
    pub stats: WalkStats,
}

/// Produces one diagram per run from a policy source.
pub struct DiagramService {
    source: Arc<dyn PolicySource>,
    backend: Arc<dyn GraphBackend>,
}

impl DiagramService {
    pub fn new(source: Arc<dyn PolicySource>, backend: Arc<dyn GraphBackend>) -> Self {
        Self { source, backend }
    }

    /// Run the whole pipeline.
    ///
    /// # Errors
    /// - `ApplicationError::Authentication` if login is rejected
    /// - `ApplicationError::Domain(TenantNotFound)` for an unknown tenant
    /// - `ApplicationError::Query` for unrecoverable query failures
    /// - `ApplicationError::Render` if the backend fails
    #[instrument(skip(self))]
    pub fn run(&self, request: &DiagramRequest) -> ApplicationResult<DiagramReport> {
        self.source
            .login()
            .map_err(|e| ApplicationError::query("login", e))?;

        let walked = PolicyWalker::new(Arc::clone(&self.source)).walk(request.tenant.as_deref());

        // the session is closed on both paths; a walk error takes precedence
        if let Err(e) = self.source.logout() {
            warn!("logout failed: {}", e);
        }
        let output = walked?;
        debug!("run: walk finished {:?}", output.stats);

        info!(
            "Generating diagram {} with {}",
            request.destination.display(),
            request.engine
        );
        output
            .graph
            .render(self.backend.as_ref(), &request.destination, request.engine)
            .map_err(|source| ApplicationError::Render {
                context: request.destination.display().to_string(),
                source,
            })?;

        Ok(DiagramReport {
            destination: request.destination.clone(),
            engine: request.engine,
            dot: output.graph.to_dot(),
            tenants: output.tenants,
            warnings: output.warnings,
            stats: output.stats,
        })
    }
}
