//! Core graph entity types.

use core::borrow::Borrow;
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::params::Params;

/// Opaque, caller-assigned identifier of a node.
///
/// Ids are plain strings so presets written by hand (`"sphere-1"`) and
/// generated ids (`"node-3f2a..."`) share one namespace. Uniqueness is the
/// caller's responsibility; the store does not check for collisions.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh id of the form `node-<uuid>`.
    pub fn generate() -> Self {
        Self(format!("node-{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl PartialEq<str> for NodeId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for NodeId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Identifier of an edge.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(String);

impl EdgeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(format!("edge-{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EdgeId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for EdgeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The three node categories.
///
/// - **Sources** produce something to render (a mesh, an image, an audio feed)
/// - **Effects** attach behavior to the nodes feeding them
/// - **Output** is the camera/sink the active set is resolved from
///
/// The kind is fixed when a node is created.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Source,
    Effect,
    Output,
}

/// 2D layout hint for the editor. Has no effect on evaluation.
#[derive(Clone, Copy, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A vertex in the composition graph.
///
/// A node does not store its inputs. They are derived from the edges held by
/// the [`GraphStore`](crate::GraphStore), see
/// [`GraphSnapshot::inputs`](crate::GraphSnapshot::inputs).
#[derive(Clone, PartialEq, Debug)]
pub struct Node {
    pub id: NodeId,
    kind: NodeKind,
    /// Tag selecting kind-specific logic, e.g. `"SphereNode"`.
    pub node_type: String,
    pub params: Params,
    pub position: Option<Position>,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, kind: NodeKind, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            node_type: node_type.into(),
            params: Params::new(),
            position: None,
        }
    }

    pub fn source(id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Source, node_type)
    }

    pub fn effect(id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Effect, node_type)
    }

    pub fn output(id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Output, node_type)
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<crate::ParamValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.position = Some(Position::new(x, y));
        self
    }

    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    #[inline]
    pub fn is_effect(&self) -> bool {
        self.kind == NodeKind::Effect
    }

    #[inline]
    pub fn is_output(&self) -> bool {
        self.kind == NodeKind::Output
    }
}

/// A partial update for [`GraphStore::update_node`](crate::GraphStore::update_node).
///
/// `params` is shallow-merged into the existing parameters. The id and the
/// kind of a node cannot be updated.
#[derive(Clone, Debug, Default)]
pub struct NodeUpdate {
    pub node_type: Option<String>,
    pub params: Option<Params>,
    pub position: Option<Position>,
}

impl NodeUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = Some(node_type.into());
        self
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params = Some(params);
        self
    }

    pub fn position(mut self, x: f32, y: f32) -> Self {
        self.position = Some(Position::new(x, y));
        self
    }
}

/// A directed `source -> target` connection. Edges are the authoritative
/// connectivity record.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
}

impl Edge {
    pub fn new(id: impl Into<EdgeId>, source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
        }
    }

    /// Create an edge with a generated id.
    pub fn connect(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            id: EdgeId::generate(),
            source: source.into(),
            target: target.into(),
        }
    }

    pub fn touches(&self, node: &str) -> bool {
        self.source == node || self.target == node
    }
}
