//! Service container for dependency injection
//!
//! Wires up all services with their dependencies.

use std::sync::Arc;
use std::time::Duration;

use crate::application::services::DiagramService;
use crate::config::Settings;
use crate::domain::GraphBackend;
use crate::infrastructure::apic::{ApicConfig, ApicSession};
use crate::infrastructure::graphviz::GraphvizRenderer;
use crate::infrastructure::traits::{CommandRunner, PolicySource, RealCommandRunner};
use crate::infrastructure::InfraResult;

/// Container holding settings and the I/O boundary implementations.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Command runner abstraction (Graphviz)
    pub cmd: Arc<dyn CommandRunner>,
}

impl ServiceContainer {
    /// Create a new service container with real implementations.
    pub fn new(settings: Settings) -> Self {
        Self::with_deps(settings, Arc::new(RealCommandRunner))
    }

    /// Create a service container with custom dependencies (for testing).
    pub fn with_deps(settings: Settings, cmd: Arc<dyn CommandRunner>) -> Self {
        Self {
            settings: Arc::new(settings),
            cmd,
        }
    }

    /// Connection parameters: credentials from the caller, transport knobs from settings.
    pub fn apic_config(&self, url: &str, username: &str, password: &str) -> ApicConfig {
        ApicConfig {
            url: url.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            timeout: Duration::from_secs(self.settings.timeout_secs),
            verify_tls: self.settings.verify_tls,
            retry: self.settings.retry,
        }
    }

    /// Unauthenticated APIC session; `login` happens inside the diagram run.
    pub fn apic_session(&self, config: ApicConfig) -> InfraResult<Arc<dyn PolicySource>> {
        Ok(Arc::new(ApicSession::new(config)?))
    }

    pub fn renderer(&self) -> Arc<dyn GraphBackend> {
        Arc::new(GraphvizRenderer::new(Arc::clone(&self.cmd)))
    }

    /// Diagram service over `source`, rendering through Graphviz.
    pub fn diagram_service(&self, source: Arc<dyn PolicySource>) -> DiagramService {
        DiagramService::new(source, self.renderer())
    }
}
