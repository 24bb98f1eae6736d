//! Topology diagrams of ACI fabric policy.
//!
//! Walks tenants, VRFs, bridge domains, L3Outs, application profiles, EPGs
//! and contracts on an APIC and renders them as a Graphviz diagram.

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
