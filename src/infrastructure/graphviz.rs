//! Graphviz rendering backend.
//!
//! Pipes the DOT document into the layout engine binary, which writes the
//! image to the destination file.

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::domain::{GraphBackend, LayoutEngine};
use crate::infrastructure::traits::CommandRunner;
use crate::infrastructure::InfraError;

const DEFAULT_FORMAT: &str = "png";

/// Renders through the Graphviz command line tools.
pub struct GraphvizRenderer {
    cmd: Arc<dyn CommandRunner>,
}

impl GraphvizRenderer {
    pub fn new(cmd: Arc<dyn CommandRunner>) -> Self {
        Self { cmd }
    }
}

/// Output format implied by the destination's extension (`out.svg` -> `svg`).
pub fn output_format(destination: &Path) -> String {
    destination
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| DEFAULT_FORMAT.to_string())
}

impl GraphBackend for GraphvizRenderer {
    fn draw(
        &self,
        document: &str,
        destination: &Path,
        engine: LayoutEngine,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let format = format!("-T{}", output_format(destination));
        let output_arg = format!("-o{}", destination.display());
        let args = [format.as_str(), output_arg.as_str()];
        debug!("draw: {} {:?}", engine.command(), args);

        let output = self
            .cmd
            .run_with_stdin(engine.command(), &args, document)
            .map_err(|e| InfraError::io(format!("run {}", engine.command()), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Box::new(InfraError::Graphviz {
                engine: engine.command(),
                message: stderr.trim().to_string(),
                exit_code: output.status.code(),
            }));
        }
        Ok(())
    }
}
