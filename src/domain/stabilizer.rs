//! Layout stabilization for missing attachments.
//!
//! A bridge domain normally ranks one step right of its VRF. When it has no
//! VRF, an invisible anchor takes the VRF's rank so the bridge domain keeps
//! its column.

use crate::domain::error::DomainError;
use crate::domain::graph::{ClusterHandle, EdgeSpec, Graph, NodeSpec, NodeStyle, Shape};
use crate::domain::identity::NodeKey;

const ANCHOR_LABEL: &str = "Dummy Context";

/// Add an invisible anchor owned by `target` and an invisible edge anchor -> target.
///
/// Returns the anchor key. `target` must already be a node.
pub fn stabilize(
    graph: &mut Graph,
    scope: ClusterHandle,
    target: &NodeKey,
) -> Result<NodeKey, DomainError> {
    if !graph.contains_node(target) {
        return Err(DomainError::UnknownNode(target.to_string()));
    }
    let anchor = target.anchor();
    graph.add_node(
        scope,
        &anchor,
        NodeSpec::new(ANCHOR_LABEL)
            .shape(Shape::Circle)
            .style(NodeStyle::Invisible),
    );
    graph.add_edge(scope, &anchor, target, EdgeSpec::invisible())?;
    Ok(anchor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::EdgeStyle;
    use crate::domain::identity::TenantKeys;

    #[test]
    fn given_bridge_domain_when_stabilizing_then_adds_invisible_anchor_and_edge() {
        let mut g = Graph::default();
        let root = g.root();
        let bd = TenantKeys::new("T1").bridge_domain("B2");
        g.add_node(root, &bd, NodeSpec::new("Bridge Domain\nB2"));

        let anchor = stabilize(&mut g, root, &bd).unwrap();

        let node = g.node(&anchor).unwrap();
        assert_eq!(node.spec.style, NodeStyle::Invisible);
        let edges: Vec<_> = g.edges_touching(&bd).collect();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].from, anchor);
        assert_eq!(edges[0].spec.style, EdgeStyle::Invisible);
    }

    #[test]
    fn given_two_bridge_domains_when_stabilizing_then_anchors_are_not_shared() {
        let mut g = Graph::default();
        let root = g.root();
        let keys = TenantKeys::new("T1");
        for name in ["B1", "B2"] {
            g.add_node(root, &keys.bridge_domain(name), NodeSpec::new(name));
        }
        let a = stabilize(&mut g, root, &keys.bridge_domain("B1")).unwrap();
        let b = stabilize(&mut g, root, &keys.bridge_domain("B2")).unwrap();
        assert_ne!(a, b);
        assert_eq!(g.nodes().len(), 4);
    }

    #[test]
    fn given_missing_target_when_stabilizing_then_fails() {
        let mut g = Graph::default();
        let root = g.root();
        let bd = TenantKeys::new("T1").bridge_domain("nope");
        assert!(matches!(
            stabilize(&mut g, root, &bd),
            Err(DomainError::UnknownNode(_))
        ));
        assert!(g.nodes().is_empty());
    }
}
