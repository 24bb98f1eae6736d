//! Application services
//!
//! Concrete services that orchestrate the domain. They depend on I/O
//! boundary traits (PolicySource, GraphBackend) but are themselves concrete
//! structs, not traits.

mod diagram;
mod walker;

pub use diagram::{DiagramReport, DiagramRequest, DiagramService};
pub use walker::{PolicyWalker, WalkOutput, WalkStats, WalkWarning};
