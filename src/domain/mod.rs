//! Domain layer: policy records, node identity and the diagram graph
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod classifier;
pub mod entities;
pub mod error;
pub mod graph;
pub mod identity;
pub mod stabilizer;

pub use classifier::{classify, ContractDecision, ContractDrawing};
pub use entities::*;
pub use error::DomainError;
pub use graph::{
    Cluster, ClusterHandle, ClusterStyle, Color, Edge, EdgeHandle, EdgeSpec, EdgeStyle, Graph,
    GraphBackend, LayoutEngine, Node, NodeHandle, NodeSpec, NodeStyle, RankDir, Shape,
};
pub use identity::{NodeKey, SegmentKind, TenantKeys};
pub use stabilizer::stabilize;
