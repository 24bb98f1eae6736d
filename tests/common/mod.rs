//! Shared fixtures: an in-memory fabric behind `PolicySource` and a recording `GraphBackend`.
#![allow(dead_code)]

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use aciplot::domain::{
    Edge, Graph, GraphBackend, LayoutEngine, ManagedObject, NodeKey, TenantKeys,
};
use aciplot::infrastructure::traits::{PolicySource, PropFilter, QueryError, ScopedClassQuery};

pub type EventLog = Arc<Mutex<Vec<String>>>;

// ============================================================
// Fabric fixture
// ============================================================

pub fn tn_dn(tn: &str) -> String {
    format!("uni/tn-{tn}")
}

pub fn bd_dn(tn: &str, bd: &str) -> String {
    format!("{}/BD-{bd}", tn_dn(tn))
}

pub fn l3out_dn(tn: &str, l3out: &str) -> String {
    format!("{}/out-{l3out}", tn_dn(tn))
}

pub fn ext_epg_dn(tn: &str, l3out: &str, ext: &str) -> String {
    format!("{}/instP-{ext}", l3out_dn(tn, l3out))
}

pub fn ap_dn(tn: &str, ap: &str) -> String {
    format!("{}/ap-{ap}", tn_dn(tn))
}

pub fn epg_dn(tn: &str, ap: &str, epg: &str) -> String {
    format!("{}/epg-{epg}", ap_dn(tn, ap))
}

fn mo(class: &str, dn: String, name: &str) -> ManagedObject {
    ManagedObject::new(class).with("dn", dn).with("name", name)
}

/// Snapshot of managed objects, in the order the APIC would return them.
#[derive(Debug, Default, Clone)]
pub struct Fabric {
    objects: Vec<ManagedObject>,
}

impl Fabric {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object(mut self, mo: ManagedObject) -> Self {
        self.objects.push(mo);
        self
    }

    pub fn tenant(self, tn: &str) -> Self {
        self.object(mo("fvTenant", tn_dn(tn), tn))
    }

    pub fn vrf(self, tn: &str, name: &str) -> Self {
        self.object(mo("fvCtx", format!("{}/ctx-{name}", tn_dn(tn)), name))
    }

    /// Bridge domain with subnets and its VRF relation; `None` leaves the target name empty.
    pub fn bd(self, tn: &str, name: &str, vrf: Option<&str>, subnets: &[&str]) -> Self {
        let dn = bd_dn(tn, name);
        let mut fabric = self.object(mo("fvBD", dn.clone(), name));
        for ip in subnets {
            fabric = fabric.object(
                mo("fvSubnet", format!("{dn}/subnet-[{ip}]"), "").with("ip", *ip),
            );
        }
        fabric.object(
            mo("fvRsCtx", format!("{dn}/rsctx"), "").with("tnFvCtxName", vrf.unwrap_or_default()),
        )
    }

    /// Bridge domain without any VRF relation object.
    pub fn bare_bd(self, tn: &str, name: &str) -> Self {
        self.object(mo("fvBD", bd_dn(tn, name), name))
    }

    pub fn bd_to_l3out(self, tn: &str, bd: &str, l3out: &str) -> Self {
        self.object(
            mo("fvRsBDToOut", format!("{}/rsBDToOut-{l3out}", bd_dn(tn, bd)), "")
                .with("tnL3extOutName", l3out),
        )
    }

    pub fn l3out(self, tn: &str, name: &str, vrf: Option<&str>) -> Self {
        let dn = l3out_dn(tn, name);
        let fabric = self.object(mo("l3extOut", dn.clone(), name));
        match vrf {
            Some(vrf) => fabric.object(
                mo("l3extRsEctx", format!("{dn}/rsectx"), "").with("tnFvCtxName", vrf),
            ),
            None => fabric,
        }
    }

    pub fn ext_epg(self, tn: &str, l3out: &str, name: &str, subnets: &[&str]) -> Self {
        let dn = ext_epg_dn(tn, l3out, name);
        let mut fabric = self.object(mo("l3extInstP", dn.clone(), name));
        for ip in subnets {
            fabric = fabric.object(
                mo("l3extSubnet", format!("{dn}/extsubnet-[{ip}]"), "").with("ip", *ip),
            );
        }
        fabric
    }

    pub fn ap(self, tn: &str, name: &str) -> Self {
        self.object(mo("fvAp", ap_dn(tn, name), name))
    }

    /// Endpoint group and its bridge domain relation; `None` leaves the target name empty.
    pub fn epg(self, tn: &str, ap: &str, name: &str, bd: Option<&str>) -> Self {
        let dn = epg_dn(tn, ap, name);
        self.object(mo("fvAEPg", dn.clone(), name)).object(
            mo("fvRsBd", format!("{dn}/rsbd"), "").with("tnFvBDName", bd.unwrap_or_default()),
        )
    }

    /// Contract relation below `parent_dn`; `class` is `fvRsProv` or `fvRsCons`.
    pub fn contract_ref(self, parent_dn: &str, class: &str, contract: &str, state: &str) -> Self {
        let tag = if class == "fvRsProv" { "rsprov" } else { "rscons" };
        self.object(
            mo(class, format!("{parent_dn}/{tag}-{contract}"), "")
                .with("tnVzBrCPName", contract)
                .with("state", state),
        )
    }

    pub fn provides(self, parent_dn: &str, contract: &str, state: &str) -> Self {
        self.contract_ref(parent_dn, "fvRsProv", contract, state)
    }

    pub fn consumes(self, parent_dn: &str, contract: &str, state: &str) -> Self {
        self.contract_ref(parent_dn, "fvRsCons", contract, state)
    }

    pub fn source(self) -> MockPolicySource {
        MockPolicySource::new(self.objects)
    }

    /// Source that is already logged in, for driving the walker directly.
    pub fn connected(self) -> Arc<MockPolicySource> {
        let source = self.source();
        source.login().expect("mock login");
        source.events.lock().unwrap().clear();
        Arc::new(source)
    }
}

// ============================================================
// Mock policy source
// ============================================================

pub struct MockPolicySource {
    objects: Vec<ManagedObject>,
    pub events: EventLog,
    logged_in: Mutex<bool>,
    reject_login: bool,
    failing_class: Option<String>,
}

impl MockPolicySource {
    pub fn new(objects: Vec<ManagedObject>) -> Self {
        Self {
            objects,
            events: Arc::new(Mutex::new(Vec::new())),
            logged_in: Mutex::new(false),
            reject_login: false,
            failing_class: None,
        }
    }

    pub fn rejecting_login(mut self) -> Self {
        self.reject_login = true;
        self
    }

    /// Every scoped query for `class` fails with a transport error.
    pub fn failing_on(mut self, class: &str) -> Self {
        self.failing_class = Some(class.to_string());
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    fn ensure_logged_in(&self) -> Result<(), QueryError> {
        if *self.logged_in.lock().unwrap() {
            Ok(())
        } else {
            Err(QueryError::SessionClosed)
        }
    }
}

impl PolicySource for MockPolicySource {
    fn login(&self) -> Result<(), QueryError> {
        self.record("login".into());
        if self.reject_login {
            return Err(QueryError::Authentication("HTTP 401: bad credentials".into()));
        }
        *self.logged_in.lock().unwrap() = true;
        Ok(())
    }

    fn logout(&self) -> Result<(), QueryError> {
        self.record("logout".into());
        self.ensure_logged_in()?;
        *self.logged_in.lock().unwrap() = false;
        Ok(())
    }

    fn lookup_by_class(
        &self,
        class: &str,
        filter: Option<&PropFilter>,
    ) -> Result<Vec<ManagedObject>, QueryError> {
        self.ensure_logged_in()?;
        match filter {
            Some(f) => self.record(format!("lookup {class} {f}")),
            None => self.record(format!("lookup {class}")),
        }
        Ok(self
            .objects
            .iter()
            .filter(|mo| mo.class == class)
            .filter(|mo| filter.map_or(true, |f| mo.attr(&f.attribute) == Some(f.value.as_str())))
            .cloned()
            .collect())
    }

    fn query(&self, query: &ScopedClassQuery) -> Result<Vec<ManagedObject>, QueryError> {
        self.ensure_logged_in()?;
        self.record(format!("query {query}"));
        if self.failing_class.as_deref() == Some(query.class.as_str()) {
            return Err(QueryError::Transport {
                message: "operation timed out".into(),
                retryable: true,
            });
        }
        let prefix = format!("{}/", query.scope);
        Ok(self
            .objects
            .iter()
            .filter(|mo| mo.class == query.class)
            .filter(|mo| mo.attr("dn").is_some_and(|dn| dn.starts_with(&prefix)))
            .cloned()
            .collect())
    }
}

// ============================================================
// Recording backend
// ============================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawCall {
    pub document: String,
    pub destination: PathBuf,
    pub engine: LayoutEngine,
}

pub struct RecordingBackend {
    pub calls: Mutex<Vec<DrawCall>>,
    events: Option<EventLog>,
    fail: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            events: None,
            fail: false,
        }
    }

    /// Record "render" into a shared event log as well.
    pub fn sharing(events: EventLog) -> Self {
        Self {
            events: Some(events),
            ..Self::new()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<DrawCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl GraphBackend for RecordingBackend {
    fn draw(
        &self,
        document: &str,
        destination: &Path,
        engine: LayoutEngine,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        if let Some(events) = &self.events {
            events.lock().unwrap().push("render".into());
        }
        if self.fail {
            return Err("dot: not found".into());
        }
        self.calls.lock().unwrap().push(DrawCall {
            document: document.to_string(),
            destination: destination.to_path_buf(),
            engine,
        });
        Ok(())
    }
}

// ============================================================
// Graph helpers
// ============================================================

pub fn keys(tn: &str) -> TenantKeys {
    TenantKeys::new(tn)
}

pub fn edges_between<'a>(graph: &'a Graph, from: &NodeKey, to: &NodeKey) -> Vec<&'a Edge> {
    graph
        .edges()
        .iter()
        .filter(|e| &e.from == from && &e.to == to)
        .collect()
}

pub fn label_of(graph: &Graph, key: &NodeKey) -> String {
    graph
        .node(key)
        .map(|n| n.spec.label.clone())
        .unwrap_or_else(|| panic!("no node {key}"))
}
