//! Policy tree walker
//!
//! Walks the tenant hierarchy through scoped queries and builds the diagram
//! graph. Traversal order is fixed and is part of the output: per tenant,
//! VRFs, then L3Outs (with external EPGs and their contracts), then bridge
//! domains (with VRF/L3Out attachments), then application profiles (with
//! EPGs, their bridge domain and their contracts). Every child subtree is
//! finished before the next sibling is queried.

use std::fmt;
use std::sync::Arc;

use itertools::Itertools;
use tracing::{debug, info, instrument, warn};

use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::{
    classify, stabilize, ApplicationProfile, BdL3OutAttachment, BdSubnet, BdVrfAttachment,
    BridgeDomain, ClusterHandle, ClusterStyle, Color, ConsumedContract, ContractDecision,
    ContractRef, Dn, DomainError, EdgeSpec, EndpointGroup, EpgBdAttachment, ExternalEpg,
    ExternalSubnet, Graph, L3Out, L3OutVrfAttachment, NodeKey, NodeSpec, PolicyClass,
    ProvidedContract, RankDir, Shape, Tenant, TenantKeys, Vrf,
};
use crate::infrastructure::traits::{PolicySource, PropFilter, ScopedClassQuery};

/// Non-fatal outcome worth reporting to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkWarning {
    /// Contract reference in a state other than `formed` / `missing-target`; nothing drawn.
    UnclassifiedContractState {
        referencer: NodeKey,
        contract: String,
        state: String,
    },
    /// Attachment naming an entity that is not in the diagram; treated as absent.
    UnresolvedAttachment {
        relation: &'static str,
        from: NodeKey,
        missing: String,
    },
}

impl fmt::Display for WalkWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalkWarning::UnclassifiedContractState {
                referencer,
                contract,
                state,
            } => write!(
                f,
                "contract '{}' referenced by {} has unclassified state '{}', not drawn",
                contract, referencer, state
            ),
            WalkWarning::UnresolvedAttachment {
                relation,
                from,
                missing,
            } => write!(
                f,
                "{} attachment of {} points to {} which is not in the diagram",
                relation, from, missing
            ),
        }
    }
}

/// Counters for the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub tenants: usize,
    pub nodes: usize,
    pub edges: usize,
    pub clusters: usize,
    pub anchors: usize,
}

/// Finished walk: the graph plus what was degraded along the way.
#[derive(Debug)]
pub struct WalkOutput {
    pub graph: Graph,
    /// Tenant names in walk order.
    pub tenants: Vec<String>,
    pub warnings: Vec<WalkWarning>,
    pub stats: WalkStats,
}

/// Mutable state of one walk.
struct Walk {
    graph: Graph,
    tenants: Vec<String>,
    warnings: Vec<WalkWarning>,
    stats: WalkStats,
}

impl Walk {
    fn new() -> Self {
        Self {
            graph: Graph::new(RankDir::LeftToRight),
            tenants: Vec::new(),
            warnings: Vec::new(),
            stats: WalkStats::default(),
        }
    }

    /// Add an attachment edge, degrading to "absent" when an endpoint is not a node.
    fn attach(
        &mut self,
        scope: ClusterHandle,
        from: &NodeKey,
        to: &NodeKey,
        spec: EdgeSpec,
        relation: &'static str,
        owner: &NodeKey,
    ) -> bool {
        match self.graph.add_edge(scope, from, to, spec) {
            Ok(_) => true,
            Err(DomainError::UnknownNode(missing)) => {
                warn!("{} attachment of {} unresolved: {}", relation, owner, missing);
                self.warnings.push(WalkWarning::UnresolvedAttachment {
                    relation,
                    from: owner.clone(),
                    missing,
                });
                false
            }
            Err(e) => {
                warn!("{} attachment of {} failed: {}", relation, owner, e);
                false
            }
        }
    }

    fn finish(mut self) -> WalkOutput {
        self.stats.nodes = self.graph.nodes().len();
        self.stats.edges = self.graph.edges().len();
        self.stats.clusters = self.graph.cluster_count();
        self.stats.tenants = self.tenants.len();
        WalkOutput {
            graph: self.graph,
            tenants: self.tenants,
            warnings: self.warnings,
            stats: self.stats,
        }
    }
}

/// Position of the walk inside one tenant.
struct TenantScope {
    keys: TenantKeys,
    cluster: ClusterHandle,
}

/// Builds the diagram graph from a policy source.
pub struct PolicyWalker {
    source: Arc<dyn PolicySource>,
}

impl PolicyWalker {
    /// Create a walker over an already logged-in source.
    pub fn new(source: Arc<dyn PolicySource>) -> Self {
        Self { source }
    }

    /// Walk one tenant (by name) or all tenants.
    ///
    /// # Errors
    /// - `DomainError::TenantNotFound` if a named tenant does not exist
    /// - `ApplicationError::Query` if the source fails
    #[instrument(skip(self))]
    pub fn walk(&self, tenant: Option<&str>) -> ApplicationResult<WalkOutput> {
        let tenants = self.resolve_tenants(tenant)?;
        let mut walk = Walk::new();
        for tenant in &tenants {
            self.walk_tenant(&mut walk, tenant)?;
        }
        Ok(walk.finish())
    }

    fn resolve_tenants(&self, name: Option<&str>) -> ApplicationResult<Vec<Tenant>> {
        let filter = name.map(|n| PropFilter::eq(Tenant::CLASS, "name", n));
        let objects = self
            .source
            .lookup_by_class(Tenant::CLASS, filter.as_ref())
            .map_err(|e| ApplicationError::query("look up tenants", e))?;

        if let Some(name) = name {
            if objects.is_empty() {
                return Err(DomainError::TenantNotFound(name.to_string()).into());
            }
        }
        let tenants = objects
            .iter()
            .map(Tenant::decode)
            .collect::<Result<Vec<_>, _>>()?;
        debug!("resolve_tenants: {} tenants", tenants.len());
        Ok(tenants)
    }

    /// Query and decode all objects of `T` below `scope`.
    fn children<T: PolicyClass>(&self, scope: &Dn) -> ApplicationResult<Vec<T>> {
        let query = ScopedClassQuery::new(scope, T::CLASS);
        let objects = self
            .source
            .query(&query)
            .map_err(|e| ApplicationError::query(format!("query {query}"), e))?;
        let records = objects
            .iter()
            .map(T::decode)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn walk_tenant(&self, walk: &mut Walk, tenant: &Tenant) -> ApplicationResult<()> {
        info!("Processing tenant {}", tenant.name);
        let keys = TenantKeys::new(&tenant.name);
        let root = walk.graph.root();
        let cluster = walk.graph.add_cluster(
            root,
            keys.root(),
            format!("Tenant\n{}", tenant.name),
            ClusterStyle::colored(Color::Blue),
        );
        let tn = TenantScope { keys, cluster };
        walk.tenants.push(tenant.name.clone());

        self.plot_vrfs(walk, &tn, &tenant.dn)?;
        self.plot_l3outs(walk, &tn, &tenant.dn)?;
        self.plot_bridge_domains(walk, &tn, &tenant.dn)?;
        self.plot_application_profiles(walk, &tn, &tenant.dn)?;
        Ok(())
    }

    fn plot_vrfs(&self, walk: &mut Walk, tn: &TenantScope, dn: &Dn) -> ApplicationResult<()> {
        for vrf in self.children::<Vrf>(dn)? {
            debug!("plot_vrfs: {}", vrf.name);
            walk.graph.add_node(
                tn.cluster,
                &tn.keys.vrf(&vrf.name),
                NodeSpec::new(format!("VRF\n{}", vrf.name)).shape(Shape::Box),
            );
        }
        Ok(())
    }

    fn plot_l3outs(&self, walk: &mut Walk, tn: &TenantScope, dn: &Dn) -> ApplicationResult<()> {
        for l3out in self.children::<L3Out>(dn)? {
            debug!("plot_l3outs: {}", l3out.name);
            let key = tn.keys.l3out(&l3out.name);
            let cluster = walk
                .graph
                .add_cluster(tn.cluster, &key, "L3Out", ClusterStyle::default());
            walk.graph.add_node(
                cluster,
                &key,
                NodeSpec::new(format!("L3Out\n{}", l3out.name)).shape(Shape::Box),
            );

            for attachment in self.children::<L3OutVrfAttachment>(&l3out.dn)? {
                if let Some(vrf) = attachment.vrf {
                    walk.attach(
                        tn.cluster,
                        &tn.keys.vrf(&vrf),
                        &key,
                        EdgeSpec::dotted(),
                        "L3Out VRF",
                        &key,
                    );
                }
            }

            for ext in self.children::<ExternalEpg>(&l3out.dn)? {
                let subnets = self
                    .children::<ExternalSubnet>(&ext.dn)?
                    .into_iter()
                    .filter_map(|s| s.ip);
                let ext_key = tn.keys.external_epg(&l3out.name, &ext.name);
                walk.graph.add_node(
                    cluster,
                    &ext_key,
                    NodeSpec::new(label_with_subnets("Outside EPG", &ext.name, subnets)),
                );
                walk.graph
                    .add_edge(cluster, &key, &ext_key, EdgeSpec::solid())?;
                self.plot_contracts(walk, tn, cluster, &ext.dn, &ext_key)?;
            }
        }
        Ok(())
    }

    fn plot_bridge_domains(
        &self,
        walk: &mut Walk,
        tn: &TenantScope,
        dn: &Dn,
    ) -> ApplicationResult<()> {
        for bd in self.children::<BridgeDomain>(dn)? {
            debug!("plot_bridge_domains: {}", bd.name);
            let subnets = self
                .children::<BdSubnet>(&bd.dn)?
                .into_iter()
                .filter_map(|s| s.ip);
            let key = tn.keys.bridge_domain(&bd.name);
            walk.graph.add_node(
                tn.cluster,
                &key,
                NodeSpec::new(label_with_subnets("Bridge Domain", &bd.name, subnets))
                    .shape(Shape::Box),
            );

            // exactly one of: VRF edge, stabilizer anchor
            let mut attached = false;
            for attachment in self.children::<BdVrfAttachment>(&bd.dn)? {
                let Some(vrf) = attachment.vrf else {
                    continue;
                };
                if attached {
                    debug!("plot_bridge_domains: {} ignoring extra VRF {}", bd.name, vrf);
                    continue;
                }
                attached = walk.attach(
                    tn.cluster,
                    &tn.keys.vrf(&vrf),
                    &key,
                    EdgeSpec::solid(),
                    "bridge domain VRF",
                    &key,
                );
            }
            if !attached {
                debug!("plot_bridge_domains: {} has no VRF, anchoring", bd.name);
                stabilize(&mut walk.graph, tn.cluster, &key)?;
                walk.stats.anchors += 1;
            }

            for attachment in self.children::<BdL3OutAttachment>(&bd.dn)? {
                if let Some(l3out) = attachment.l3out {
                    walk.attach(
                        tn.cluster,
                        &key,
                        &tn.keys.l3out(&l3out),
                        EdgeSpec::dotted(),
                        "bridge domain L3Out",
                        &key,
                    );
                }
            }
        }
        Ok(())
    }

    fn plot_application_profiles(
        &self,
        walk: &mut Walk,
        tn: &TenantScope,
        dn: &Dn,
    ) -> ApplicationResult<()> {
        for ap in self.children::<ApplicationProfile>(dn)? {
            debug!("plot_application_profiles: {}", ap.name);
            let cluster = walk.graph.add_cluster(
                tn.cluster,
                &tn.keys.application_profile(&ap.name),
                format!("Application Profile\n{}", ap.name),
                ClusterStyle::default(),
            );

            for epg in self.children::<EndpointGroup>(&ap.dn)? {
                let key = tn.keys.endpoint_group(&ap.name, &epg.name);
                walk.graph
                    .add_node(cluster, &key, NodeSpec::new(format!("EPG\n{}", epg.name)));

                for attachment in self.children::<EpgBdAttachment>(&epg.dn)? {
                    if let Some(bd) = attachment.bridge_domain {
                        walk.attach(
                            tn.cluster,
                            &tn.keys.bridge_domain(&bd),
                            &key,
                            EdgeSpec::dotted(),
                            "EPG bridge domain",
                            &key,
                        );
                    }
                }
                self.plot_contracts(walk, tn, cluster, &epg.dn, &key)?;
            }
        }
        Ok(())
    }

    /// Provided contracts first, then consumed ones.
    fn plot_contracts(
        &self,
        walk: &mut Walk,
        tn: &TenantScope,
        scope: ClusterHandle,
        dn: &Dn,
        referencer: &NodeKey,
    ) -> ApplicationResult<()> {
        for ProvidedContract(reference) in self.children::<ProvidedContract>(dn)? {
            plot_contract(walk, tn, scope, referencer, &reference)?;
        }
        for ConsumedContract(reference) in self.children::<ConsumedContract>(dn)? {
            plot_contract(walk, tn, scope, referencer, &reference)?;
        }
        Ok(())
    }
}

fn plot_contract(
    walk: &mut Walk,
    tn: &TenantScope,
    scope: ClusterHandle,
    referencer: &NodeKey,
    reference: &ContractRef,
) -> ApplicationResult<()> {
    match classify(reference) {
        ContractDecision::Draw(drawing) => {
            let contract = tn.keys.contract(&drawing.contract);
            walk.graph.add_node(scope, &contract, drawing.node.clone());
            let (from, to) = drawing.endpoints(referencer, &contract);
            walk.graph.add_edge(scope, from, to, drawing.edge)?;
        }
        ContractDecision::Absent => {
            debug!("plot_contract: reference of {} names no contract", referencer);
        }
        ContractDecision::Unclassified(state) => {
            let contract = reference.contract.clone().unwrap_or_default();
            warn!(
                "contract {} of {} in state '{}', skipped",
                contract, referencer, state
            );
            walk.warnings.push(WalkWarning::UnclassifiedContractState {
                referencer: referencer.clone(),
                contract,
                state,
            });
        }
    }
    Ok(())
}

/// `prefix\nname\nsubnet...`
fn label_with_subnets(prefix: &str, name: &str, subnets: impl Iterator<Item = String>) -> String {
    [prefix.to_string(), name.to_string()]
        .into_iter()
        .chain(subnets)
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_subnets_when_labelling_then_one_line_each() {
        let label = label_with_subnets(
            "Bridge Domain",
            "B1",
            vec!["10.0.0.1/24".to_string(), "10.0.1.1/24".to_string()].into_iter(),
        );
        assert_eq!(label, "Bridge Domain\nB1\n10.0.0.1/24\n10.0.1.1/24");
    }

    #[test]
    fn given_no_subnets_when_labelling_then_prefix_and_name_only() {
        assert_eq!(
            label_with_subnets("Outside EPG", "any", std::iter::empty()),
            "Outside EPG\nany"
        );
    }

    #[test]
    fn given_warning_when_displaying_then_names_entity() {
        let w = WalkWarning::UnclassifiedContractState {
            referencer: TenantKeys::new("T1").endpoint_group("ap", "E1"),
            contract: "C9".into(),
            state: "unformed".into(),
        };
        let text = w.to_string();
        assert!(text.contains("C9"));
        assert!(text.contains("unformed"));
        assert!(text.contains("cluster-tn-T1/ap-ap/epg-E1"));
    }
}
