//! Node identity keys derived from the tenant hierarchy.
//!
//! A key is the tenant cluster marker followed by one `kind-name` segment per
//! level below the tenant, joined with `/`:
//!
//! ```text
//! cluster-tn-prod/ap-web/epg-frontend
//! cluster-tn-prod/ctrct-http
//! ```
//!
//! Injectivity: every segment is tagged with a fixed [`SegmentKind`], and names
//! are escaped so they can never contain the `/` separator. Splitting a key on
//! `/` therefore recovers the exact `(kind, name)` sequence it was built from,
//! so distinct paths produce distinct keys.

use std::fmt;

/// Marker every tenant root key starts with.
///
/// Graphviz only draws a subgraph as a framed cluster when its name starts
/// with `cluster`, and L3Out/AP clusters reuse their node keys as names.
pub const TENANT_MARKER: &str = "cluster-tn-";

const ANCHOR_PREFIX: &str = "_ctx-dummy-";

/// Kind tag of one hierarchy level below the tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SegmentKind {
    Vrf,
    BridgeDomain,
    ApplicationProfile,
    EndpointGroup,
    Contract,
    L3Out,
    ExternalEpg,
}

impl SegmentKind {
    pub fn tag(self) -> &'static str {
        match self {
            SegmentKind::Vrf => "ctx",
            SegmentKind::BridgeDomain => "bd",
            SegmentKind::ApplicationProfile => "ap",
            SegmentKind::EndpointGroup => "epg",
            SegmentKind::Contract => "ctrct",
            SegmentKind::L3Out => "l3out",
            SegmentKind::ExternalEpg => "outside-epg",
        }
    }
}

/// Stable string key of a node or cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(String);

impl NodeKey {
    /// Root key of a tenant.
    pub fn tenant(name: &str) -> Self {
        Self(format!("{}{}", TENANT_MARKER, escape(name)))
    }

    /// Build a key from a tenant and an ordered list of segments.
    pub fn from_path(tenant: &str, segments: &[(SegmentKind, &str)]) -> Self {
        segments
            .iter()
            .fold(Self::tenant(tenant), |key, (kind, name)| key.child(*kind, name))
    }

    /// Extend this key by one segment.
    pub fn child(&self, kind: SegmentKind, name: &str) -> Self {
        Self(format!("{}/{}-{}", self.0, kind.tag(), escape(name)))
    }

    /// Key of the invisible layout anchor owned by this node.
    pub fn anchor(&self) -> Self {
        Self(format!("{}{}", ANCHOR_PREFIX, self.0))
    }

    pub fn is_anchor(&self) -> bool {
        self.0.starts_with(ANCHOR_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keys of the entities scoped under one tenant.
///
/// Contracts are keyed by tenant and contract name only, so every reference
/// to the same contract within a tenant lands on one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantKeys {
    root: NodeKey,
}

impl TenantKeys {
    pub fn new(tenant: &str) -> Self {
        Self {
            root: NodeKey::tenant(tenant),
        }
    }

    pub fn root(&self) -> &NodeKey {
        &self.root
    }

    pub fn vrf(&self, name: &str) -> NodeKey {
        self.root.child(SegmentKind::Vrf, name)
    }

    pub fn bridge_domain(&self, name: &str) -> NodeKey {
        self.root.child(SegmentKind::BridgeDomain, name)
    }

    pub fn application_profile(&self, name: &str) -> NodeKey {
        self.root.child(SegmentKind::ApplicationProfile, name)
    }

    pub fn endpoint_group(&self, ap: &str, epg: &str) -> NodeKey {
        self.application_profile(ap)
            .child(SegmentKind::EndpointGroup, epg)
    }

    pub fn contract(&self, name: &str) -> NodeKey {
        self.root.child(SegmentKind::Contract, name)
    }

    pub fn l3out(&self, name: &str) -> NodeKey {
        self.root.child(SegmentKind::L3Out, name)
    }

    pub fn external_epg(&self, l3out: &str, epg: &str) -> NodeKey {
        self.l3out(l3out).child(SegmentKind::ExternalEpg, epg)
    }
}

/// Escape `%` and `/` so a name never introduces a segment boundary.
fn escape(name: &str) -> String {
    if !name.contains(['%', '/']) {
        return name.to_string();
    }
    name.replace('%', "%25").replace('/', "%2F")
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn given_tenant_when_building_key_then_uses_cluster_marker() {
        assert_eq!(NodeKey::tenant("T1").as_str(), "cluster-tn-T1");
    }

    #[test]
    fn given_nested_path_when_building_key_then_extends_parent() {
        let keys = TenantKeys::new("T1");
        let epg = keys.endpoint_group("web", "E1");
        assert_eq!(epg.as_str(), "cluster-tn-T1/ap-web/epg-E1");
        assert!(epg
            .as_str()
            .starts_with(keys.application_profile("web").as_str()));
    }

    #[test]
    fn given_same_segments_when_rebuilding_then_key_is_identical() {
        let a = NodeKey::from_path(
            "T1",
            &[(SegmentKind::L3Out, "out"), (SegmentKind::ExternalEpg, "any")],
        );
        let b = TenantKeys::new("T1").external_epg("out", "any");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "cluster-tn-T1/l3out-out/outside-epg-any");
    }

    #[test]
    fn given_same_name_different_kinds_when_building_then_keys_differ() {
        let keys = TenantKeys::new("T1");
        let all: HashSet<NodeKey> = [
            keys.vrf("X"),
            keys.bridge_domain("X"),
            keys.application_profile("X"),
            keys.contract("X"),
            keys.l3out("X"),
            keys.endpoint_group("X", "X"),
            keys.external_epg("X", "X"),
        ]
        .into_iter()
        .collect();
        assert_eq!(all.len(), 7);
    }

    #[test]
    fn given_same_name_different_tenants_when_building_then_keys_differ() {
        assert_ne!(TenantKeys::new("T1").vrf("V"), TenantKeys::new("T2").vrf("V"));
    }

    #[test]
    fn given_names_with_separator_when_building_then_paths_do_not_collide() {
        // tenant "a/ctx-b" vs tenant "a" + VRF "b"
        let smuggled = NodeKey::tenant("a/ctx-b");
        let real = TenantKeys::new("a").vrf("b");
        assert_ne!(smuggled, real);

        let pct = NodeKey::tenant("a%2Fctx-b");
        assert_ne!(pct, smuggled);
    }

    #[test]
    fn given_node_key_when_deriving_anchor_then_anchor_is_unique_per_node() {
        let keys = TenantKeys::new("T1");
        let a = keys.bridge_domain("B1").anchor();
        let b = keys.bridge_domain("B2").anchor();
        assert_ne!(a, b);
        assert!(a.is_anchor());
        assert!(!keys.bridge_domain("B1").is_anchor());
        assert_eq!(a.as_str(), "_ctx-dummy-cluster-tn-T1/bd-B1");
    }
}
