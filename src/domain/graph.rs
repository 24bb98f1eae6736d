//! Backend-agnostic directed graph with nested clusters.
//!
//! The graph is append-only. Every scope (the root graph or a cluster) keeps
//! its members in insertion order, and [`Graph::to_dot`] writes them in that
//! order. Hierarchical layout engines are order-sensitive, so the order in
//! which callers add nodes, edges and clusters is part of the rendered output.

use std::collections::HashMap;
use std::error::Error;
use std::fmt::{self, Write as _};
use std::path::Path;
use std::str::FromStr;

use generational_arena::{Arena, Index};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::error::DomainError;
use crate::domain::identity::NodeKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Shape {
    #[default]
    Ellipse,
    Box,
    Circle,
}

impl Shape {
    fn dot(self) -> Option<&'static str> {
        match self {
            Shape::Ellipse => None,
            Shape::Box => Some("box"),
            Shape::Circle => Some("circle"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeStyle {
    #[default]
    Plain,
    Filled,
    Invisible,
}

impl NodeStyle {
    fn dot(self) -> Option<&'static str> {
        match self {
            NodeStyle::Plain => None,
            NodeStyle::Filled => Some("filled"),
            NodeStyle::Invisible => Some("invis"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeStyle {
    #[default]
    Solid,
    Dotted,
    Invisible,
}

impl EdgeStyle {
    fn dot(self) -> Option<&'static str> {
        match self {
            EdgeStyle::Solid => None,
            EdgeStyle::Dotted => Some("dotted"),
            EdgeStyle::Invisible => Some("invis"),
        }
    }
}

/// Named colors used by the diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Blue,
    /// Neutral fill for resolved contracts.
    LightGray,
    /// Alert fill for contracts whose target is missing.
    Coral,
}

impl Color {
    pub fn as_str(self) -> &'static str {
        match self {
            Color::Blue => "blue",
            Color::LightGray => "lightgray",
            Color::Coral => "coral2",
        }
    }
}

/// Graphviz layout engine used to render the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutEngine {
    #[default]
    Dot,
    Neato,
    Fdp,
    Sfdp,
    Circo,
    Twopi,
}

impl LayoutEngine {
    pub fn command(self) -> &'static str {
        match self {
            LayoutEngine::Dot => "dot",
            LayoutEngine::Neato => "neato",
            LayoutEngine::Fdp => "fdp",
            LayoutEngine::Sfdp => "sfdp",
            LayoutEngine::Circo => "circo",
            LayoutEngine::Twopi => "twopi",
        }
    }
}

impl fmt::Display for LayoutEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

impl FromStr for LayoutEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dot" => Ok(LayoutEngine::Dot),
            "neato" => Ok(LayoutEngine::Neato),
            "fdp" => Ok(LayoutEngine::Fdp),
            "sfdp" => Ok(LayoutEngine::Sfdp),
            "circo" => Ok(LayoutEngine::Circo),
            "twopi" => Ok(LayoutEngine::Twopi),
            other => Err(format!(
                "unknown layout engine '{other}' (expected dot, neato, fdp, sfdp, circo or twopi)"
            )),
        }
    }
}

/// Visual attributes of a node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeSpec {
    pub label: String,
    pub shape: Shape,
    pub style: NodeStyle,
    pub color: Option<Color>,
}

impl NodeSpec {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn shape(mut self, shape: Shape) -> Self {
        self.shape = shape;
        self
    }

    pub fn style(mut self, style: NodeStyle) -> Self {
        self.style = style;
        self
    }

    pub fn color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }
}

/// Visual attributes of an edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeSpec {
    pub style: EdgeStyle,
    pub label: Option<String>,
    pub directed: bool,
}

impl Default for EdgeSpec {
    fn default() -> Self {
        Self {
            style: EdgeStyle::Solid,
            label: None,
            directed: true,
        }
    }
}

impl EdgeSpec {
    pub fn solid() -> Self {
        Self::default()
    }

    pub fn dotted() -> Self {
        Self::default().style(EdgeStyle::Dotted)
    }

    pub fn invisible() -> Self {
        Self::default().style(EdgeStyle::Invisible)
    }

    pub fn style(mut self, style: EdgeStyle) -> Self {
        self.style = style;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn undirected(mut self) -> Self {
        self.directed = false;
        self
    }
}

/// Border styling of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClusterStyle {
    pub color: Option<Color>,
}

impl ClusterStyle {
    pub fn colored(color: Color) -> Self {
        Self { color: Some(color) }
    }
}

/// Handle of a scope: the root graph or one of its clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClusterHandle(Index);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeHandle(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Member {
    Node(usize),
    Edge(usize),
    Cluster(Index),
}

/// A scope and its members in insertion order.
#[derive(Debug)]
pub struct Cluster {
    /// `None` for the root graph
    pub key: Option<String>,
    pub label: Option<String>,
    pub style: ClusterStyle,
    parent: Option<Index>,
    members: Vec<Member>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub key: NodeKey,
    pub spec: NodeSpec,
    scope: ClusterHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: NodeKey,
    pub to: NodeKey,
    pub spec: EdgeSpec,
    scope: ClusterHandle,
}

impl Edge {
    pub fn touches(&self, key: &NodeKey) -> bool {
        &self.from == key || &self.to == key
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankDir {
    #[default]
    LeftToRight,
    TopToBottom,
}

/// Port to the rendering backend.
pub trait GraphBackend: Send + Sync {
    /// Lay out `document` with `engine` and write the result to `destination`.
    fn draw(
        &self,
        document: &str,
        destination: &Path,
        engine: LayoutEngine,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// Append-only directed graph.
#[derive(Debug)]
pub struct Graph {
    rankdir: RankDir,
    scopes: Arena<Cluster>,
    root: Index,
    cluster_keys: HashMap<String, Index>,
    nodes: Vec<Node>,
    node_keys: HashMap<NodeKey, usize>,
    edges: Vec<Edge>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(RankDir::default())
    }
}

impl Graph {
    pub fn new(rankdir: RankDir) -> Self {
        let mut scopes = Arena::new();
        let root = scopes.insert(Cluster {
            key: None,
            label: None,
            style: ClusterStyle::default(),
            parent: None,
            members: Vec::new(),
        });
        Self {
            rankdir,
            scopes,
            root,
            cluster_keys: HashMap::new(),
            nodes: Vec::new(),
            node_keys: HashMap::new(),
            edges: Vec::new(),
        }
    }

    /// Handle of the root graph.
    pub fn root(&self) -> ClusterHandle {
        ClusterHandle(self.root)
    }

    /// Create a cluster inside `parent`. Returns the existing cluster if `key` is taken.
    #[instrument(level = "trace", skip(self, label))]
    pub fn add_cluster(
        &mut self,
        parent: ClusterHandle,
        key: &NodeKey,
        label: impl Into<String>,
        style: ClusterStyle,
    ) -> ClusterHandle {
        if let Some(idx) = self.cluster_keys.get(key.as_str()) {
            return ClusterHandle(*idx);
        }
        let parent_idx = self.scope_index(parent);
        let idx = self.scopes.insert(Cluster {
            key: Some(key.as_str().to_string()),
            label: Some(label.into()),
            style,
            parent: Some(parent_idx),
            members: Vec::new(),
        });
        self.push_member(parent_idx, Member::Cluster(idx));
        self.cluster_keys.insert(key.as_str().to_string(), idx);
        ClusterHandle(idx)
    }

    /// Add a node to `scope`. A key that already exists is a no-op returning the existing node.
    #[instrument(level = "trace", skip(self, spec))]
    pub fn add_node(&mut self, scope: ClusterHandle, key: &NodeKey, spec: NodeSpec) -> NodeHandle {
        if let Some(existing) = self.node_keys.get(key) {
            debug!("add_node: {} exists, keeping first definition", key);
            return NodeHandle(*existing);
        }
        let scope_idx = self.scope_index(scope);
        let idx = self.nodes.len();
        self.nodes.push(Node {
            key: key.clone(),
            spec,
            scope: ClusterHandle(scope_idx),
        });
        self.node_keys.insert(key.clone(), idx);
        self.push_member(scope_idx, Member::Node(idx));
        NodeHandle(idx)
    }

    /// Append an edge to `scope`. Both endpoints must already be nodes.
    #[instrument(level = "trace", skip(self, spec))]
    pub fn add_edge(
        &mut self,
        scope: ClusterHandle,
        from: &NodeKey,
        to: &NodeKey,
        spec: EdgeSpec,
    ) -> Result<EdgeHandle, DomainError> {
        for key in [from, to] {
            if !self.node_keys.contains_key(key) {
                return Err(DomainError::UnknownNode(key.to_string()));
            }
        }
        let scope_idx = self.scope_index(scope);
        let idx = self.edges.len();
        self.edges.push(Edge {
            from: from.clone(),
            to: to.clone(),
            spec,
            scope: ClusterHandle(scope_idx),
        });
        self.push_member(scope_idx, Member::Edge(idx));
        Ok(EdgeHandle(idx))
    }

    /// Hand the finished graph to a rendering backend.
    pub fn render(
        &self,
        backend: &dyn GraphBackend,
        destination: &Path,
        engine: LayoutEngine,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        backend.draw(&self.to_dot(), destination, engine)
    }

    pub fn contains_node(&self, key: &NodeKey) -> bool {
        self.node_keys.contains_key(key)
    }

    pub fn node(&self, key: &NodeKey) -> Option<&Node> {
        self.node_keys.get(key).map(|idx| &self.nodes[*idx])
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Edges in insertion order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edges_touching<'a>(&'a self, key: &'a NodeKey) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.touches(key))
    }

    pub fn cluster(&self, key: &NodeKey) -> Option<&Cluster> {
        self.cluster_keys
            .get(key.as_str())
            .and_then(|idx| self.scopes.get(*idx))
    }

    /// Clusters, excluding the root graph.
    pub fn cluster_count(&self) -> usize {
        self.cluster_keys.len()
    }

    /// Key of the cluster a node was placed in, `None` for the root graph.
    pub fn scope_of(&self, key: &NodeKey) -> Option<&str> {
        let node = self.node(key)?;
        self.scopes.get(node.scope.0)?.key.as_deref()
    }

    /// Key of the cluster an edge was emitted in, `None` for the root graph.
    pub fn edge_scope(&self, edge: &Edge) -> Option<&str> {
        self.scopes.get(edge.scope.0)?.key.as_deref()
    }

    /// Key of the cluster enclosing `cluster`, `None` for top-level clusters.
    pub fn parent_of(&self, cluster: &NodeKey) -> Option<&str> {
        let parent = self.cluster(cluster)?.parent?;
        self.scopes.get(parent)?.key.as_deref()
    }

    /// Textual graph description in DOT syntax.
    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        out.push_str("digraph {\n");
        let rankdir = match self.rankdir {
            RankDir::LeftToRight => "LR",
            RankDir::TopToBottom => "TB",
        };
        let _ = writeln!(out, "  graph [rankdir={}];", rankdir);
        self.write_members(&mut out, self.root, 1);
        out.push_str("}\n");
        out
    }

    fn write_members(&self, out: &mut String, scope: Index, depth: usize) {
        let Some(cluster) = self.scopes.get(scope) else {
            return;
        };
        let pad = "  ".repeat(depth);
        for member in &cluster.members {
            match *member {
                Member::Node(idx) => {
                    let node = &self.nodes[idx];
                    let mut attrs = vec![("label", quote(&node.spec.label))];
                    if let Some(shape) = node.spec.shape.dot() {
                        attrs.push(("shape", shape.to_string()));
                    }
                    if let Some(style) = node.spec.style.dot() {
                        attrs.push(("style", style.to_string()));
                    }
                    if let Some(color) = node.spec.color {
                        attrs.push(("color", color.as_str().to_string()));
                    }
                    let key = quote(node.key.as_str());
                    let _ = writeln!(out, "{}{} [{}];", pad, key, join_attrs(&attrs));
                }
                Member::Edge(idx) => {
                    let edge = &self.edges[idx];
                    let mut attrs = Vec::new();
                    if let Some(style) = edge.spec.style.dot() {
                        attrs.push(("style", style.to_string()));
                    }
                    if let Some(label) = &edge.spec.label {
                        attrs.push(("label", quote(label)));
                    }
                    if !edge.spec.directed {
                        attrs.push(("dir", "none".to_string()));
                    }
                    let _ = write!(
                        out,
                        "{}{} -> {}",
                        pad,
                        quote(edge.from.as_str()),
                        quote(edge.to.as_str())
                    );
                    if attrs.is_empty() {
                        out.push_str(";\n");
                    } else {
                        let _ = writeln!(out, " [{}];", join_attrs(&attrs));
                    }
                }
                Member::Cluster(child) => {
                    let Some(sub) = self.scopes.get(child) else {
                        continue;
                    };
                    let key = sub.key.as_deref().unwrap_or_default();
                    let _ = writeln!(out, "{}subgraph {} {{", pad, quote(key));
                    let mut attrs = Vec::new();
                    if let Some(label) = &sub.label {
                        attrs.push(("label", quote(label)));
                    }
                    if let Some(color) = sub.style.color {
                        attrs.push(("color", color.as_str().to_string()));
                    }
                    if !attrs.is_empty() {
                        let _ = writeln!(out, "{}  graph [{}];", pad, join_attrs(&attrs));
                    }
                    self.write_members(out, child, depth + 1);
                    let _ = writeln!(out, "{}}}", pad);
                }
            }
        }
    }

    fn scope_index(&self, scope: ClusterHandle) -> Index {
        if self.scopes.contains(scope.0) {
            scope.0
        } else {
            self.root
        }
    }

    fn push_member(&mut self, scope: Index, member: Member) {
        if let Some(cluster) = self.scopes.get_mut(scope) {
            cluster.members.push(member);
        }
    }
}

fn join_attrs(attrs: &[(&str, String)]) -> String {
    attrs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Quote a DOT identifier, escaping quotes, backslashes and line breaks.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
