//! Infrastructure layer: I/O implementations and DI container
//!
//! This layer implements the I/O boundary traits (APIC REST, Graphviz) and
//! wires up services.

pub mod apic;
pub mod di;
pub mod error;
pub mod graphviz;
pub mod traits;

pub use error::{InfraError, InfraResult};
