//! Graph store - owns the node/edge collections and selection state

use alloc::sync::Arc;
use alloc::vec::Vec;

use hashbrown::HashMap;
use tracing::{debug, trace};

use crate::node::{Edge, Node, NodeId, NodeUpdate};
use crate::nodes::output::default_output;
use crate::params::Params;

/// An immutable view of the graph at one revision.
///
/// Snapshots are cheap to clone. Every mutation of the [`GraphStore`] swaps
/// in new collections, so two snapshots share a collection exactly when it
/// did not change between them (see [`same_nodes`](Self::same_nodes)).
#[derive(Clone, Debug)]
pub struct GraphSnapshot {
    nodes: Arc<Vec<Node>>,
    edges: Arc<Vec<Edge>>,
    selected: Option<NodeId>,
    revision: u64,
}

impl GraphSnapshot {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn selected_node_id(&self) -> Option<&NodeId> {
        self.selected.as_ref()
    }

    /// Incremented on every mutation that changed something.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn nodes_by_type<'a, 'b>(
        &'a self,
        node_type: &'b str,
    ) -> impl Iterator<Item = &'a Node> + 'b
    where
        'a: 'b,
    {
        self.nodes.iter().filter(move |n| n.node_type == node_type)
    }

    /// The first output-kind node, if any.
    pub fn output_node(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.is_output())
    }

    /// Ids feeding `id`, one per incoming edge, in edge insertion order.
    ///
    /// Ids are not checked against the node collection; an edge whose source
    /// was never added yields a dangling id here.
    pub fn inputs<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a NodeId> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.target == id)
            .map(|e| &e.source)
    }

    /// Build an index of inputs for every target at once.
    pub fn input_index(&self) -> InputIndex<'_> {
        let mut by_target: HashMap<&str, Vec<&NodeId>> = HashMap::new();
        for edge in self.edges.iter() {
            by_target
                .entry(edge.target.as_str())
                .or_default()
                .push(&edge.source);
        }
        InputIndex { by_target }
    }

    /// Whether the node collection is the same allocation as in `other`.
    pub fn same_nodes(&self, other: &GraphSnapshot) -> bool {
        Arc::ptr_eq(&self.nodes, &other.nodes)
    }

    /// Whether the edge collection is the same allocation as in `other`.
    pub fn same_edges(&self, other: &GraphSnapshot) -> bool {
        Arc::ptr_eq(&self.edges, &other.edges)
    }
}

/// Inputs of every node, indexed by target id.
pub struct InputIndex<'a> {
    by_target: HashMap<&'a str, Vec<&'a NodeId>>,
}

impl<'a> InputIndex<'a> {
    pub fn get(&self, id: &str) -> &[&'a NodeId] {
        self.by_target.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// The canonical node/edge store.
///
/// All operations are synchronous and total: an unknown id is a silent no-op,
/// never an error. Mutations never edit a collection in place; they build a
/// new one and swap it in, so observers holding a [`GraphSnapshot`] keep a
/// consistent view and can detect changes by identity.
///
/// Node inputs are not stored. They are computed from the edges, which keeps
/// them consistent with the edge list by construction.
///
/// # Example
///
/// ```
/// use resonode::{Edge, GraphStore, Node, NodeId};
///
/// let mut store = GraphStore::new();
/// store.add_node(Node::source("sphere-1", "SphereNode"));
/// store.add_edge(Edge::new("e1", "sphere-1", "output-1"));
///
/// assert_eq!(store.inputs("output-1"), vec![NodeId::from("sphere-1")]);
/// ```
#[derive(Clone, Debug)]
pub struct GraphStore {
    current: GraphSnapshot,
}

impl GraphStore {
    /// Create a store holding only the default output node.
    pub fn new() -> Self {
        Self {
            current: GraphSnapshot {
                nodes: Arc::new(vec![default_output()]),
                edges: Arc::new(Vec::new()),
                selected: None,
                revision: 0,
            },
        }
    }

    /// Create a store with no nodes at all, not even an output.
    pub fn empty() -> Self {
        Self {
            current: GraphSnapshot {
                nodes: Arc::new(Vec::new()),
                edges: Arc::new(Vec::new()),
                selected: None,
                revision: 0,
            },
        }
    }

    /// The current state. Cheap to clone and keep.
    pub fn snapshot(&self) -> &GraphSnapshot {
        &self.current
    }

    pub fn nodes(&self) -> &[Node] {
        self.current.nodes()
    }

    pub fn edges(&self) -> &[Edge] {
        self.current.edges()
    }

    pub fn selected_node_id(&self) -> Option<&NodeId> {
        self.current.selected_node_id()
    }

    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.current.get_node(id)
    }

    pub fn get_nodes_by_type(&self, node_type: &str) -> Vec<&Node> {
        self.current.nodes_by_type(node_type).collect()
    }

    pub fn inputs(&self, id: &str) -> Vec<NodeId> {
        self.current.inputs(id).cloned().collect()
    }

    /// Append a node. The id is not checked for collisions.
    pub fn add_node(&mut self, node: Node) {
        debug!(id = %node.id, kind = ?node.kind(), node_type = %node.node_type, "add node");
        let mut nodes = Vec::with_capacity(self.current.nodes.len() + 1);
        nodes.extend(self.current.nodes.iter().cloned());
        nodes.push(node);
        self.commit(Some(nodes), None);
    }

    /// Remove a node, every edge touching it, and the selection if it pointed
    /// at the node.
    ///
    /// Returns `false` (and changes nothing) if no node has this id.
    pub fn remove_node(&mut self, id: &str) -> bool {
        if self.current.get_node(id).is_none() {
            trace!(id, "remove_node: unknown id");
            return false;
        }

        let nodes: Vec<Node> = self.current.nodes.iter().filter(|n| n.id != id).cloned().collect();
        let edges_before = self.current.edges.len();
        let edges: Vec<Edge> = self.current.edges.iter().filter(|e| !e.touches(id)).cloned().collect();
        let edges_removed = edges_before - edges.len();

        if self.current.selected.as_ref().is_some_and(|s| s == id) {
            self.current.selected = None;
        }

        debug!(id, edges_removed, "remove node");
        self.commit(Some(nodes), (edges_removed > 0).then_some(edges));
        true
    }

    /// Apply a partial update. `update.params` is shallow-merged.
    pub fn update_node(&mut self, id: &str, update: NodeUpdate) -> bool {
        self.map_node(id, |node| {
            if let Some(node_type) = update.node_type {
                node.node_type = node_type;
            }
            if let Some(params) = update.params {
                node.params.merge(params);
            }
            if let Some(position) = update.position {
                node.position = Some(position);
            }
        })
    }

    /// Shallow-merge `params` into a node's parameters. No validation against
    /// the node's type is done.
    pub fn update_node_params(&mut self, id: &str, params: Params) -> bool {
        self.map_node(id, |node| node.params.merge(params))
    }

    /// Append an edge. Neither duplicates nor the existence of either end are
    /// checked.
    pub fn add_edge(&mut self, edge: Edge) {
        debug!(id = %edge.id, source = %edge.source, target = %edge.target, "add edge");
        let mut edges = Vec::with_capacity(self.current.edges.len() + 1);
        edges.extend(self.current.edges.iter().cloned());
        edges.push(edge);
        self.commit(None, Some(edges));
    }

    /// Remove one edge by id. Its source then appears exactly once less in the
    /// target's inputs.
    pub fn remove_edge(&mut self, id: &str) -> bool {
        let Some(pos) = self.current.edges.iter().position(|e| e.id.as_str() == id) else {
            trace!(id, "remove_edge: unknown id");
            return false;
        };

        let mut edges = (*self.current.edges).clone();
        let edge = edges.remove(pos);
        debug!(id, source = %edge.source, target = %edge.target, "remove edge");
        self.commit(None, Some(edges));
        true
    }

    /// Select a node, or clear the selection with `None`. Selecting an unknown
    /// id is a no-op.
    pub fn set_selected_node(&mut self, id: Option<&str>) {
        match id {
            Some(id) if self.current.get_node(id).is_none() => {
                trace!(id, "set_selected_node: unknown id");
            }
            Some(id) => {
                self.current.selected = Some(NodeId::from(id));
                self.current.revision += 1;
            }
            None => {
                if self.current.selected.take().is_some() {
                    self.current.revision += 1;
                }
            }
        }
    }

    /// Reset to exactly one default output node, no edges and no selection.
    pub fn clear_graph(&mut self) {
        debug!("clear graph");
        self.current.selected = None;
        self.commit(Some(vec![default_output()]), Some(Vec::new()));
    }

    fn map_node(&mut self, id: &str, f: impl FnOnce(&mut Node)) -> bool {
        let Some(pos) = self.current.nodes.iter().position(|n| n.id == id) else {
            trace!(id, "update: unknown id");
            return false;
        };

        let mut nodes = (*self.current.nodes).clone();
        f(&mut nodes[pos]);
        debug!(id, "update node");
        self.commit(Some(nodes), None);
        true
    }

    fn commit(&mut self, nodes: Option<Vec<Node>>, edges: Option<Vec<Edge>>) {
        if let Some(nodes) = nodes {
            self.current.nodes = Arc::new(nodes);
        }
        if let Some(edges) = edges {
            self.current.edges = Arc::new(edges);
        }
        self.current.revision += 1;
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;

    fn store_with_chain() -> GraphStore {
        let mut store = GraphStore::new();
        store.add_node(Node::source("a", "SphereNode"));
        store.add_node(Node::effect("b", "AudioReactiveNode"));
        store.add_edge(Edge::new("ab", "a", "b"));
        store.add_edge(Edge::new("bo", "b", "output-1"));
        store
    }

    #[test]
    fn new_store_has_default_output() {
        let store = GraphStore::new();
        assert_eq!(store.nodes().len(), 1);
        assert_eq!(store.nodes()[0].kind(), NodeKind::Output);
        assert_eq!(store.nodes()[0].id, "output-1");
    }

    #[test]
    fn mutation_swaps_collections() {
        let mut store = store_with_chain();
        let before = store.snapshot().clone();

        store.update_node_params("a", Params::new().with("scale", 2.0));
        assert!(!store.snapshot().same_nodes(&before));
        assert!(store.snapshot().same_edges(&before));
        assert_eq!(before.get_node("a").unwrap().params.f64("scale"), None);
        assert_eq!(store.get_node("a").unwrap().params.f64("scale"), Some(2.0));
    }

    #[test]
    fn unknown_ids_change_nothing() {
        let mut store = store_with_chain();
        let before = store.snapshot().clone();

        assert!(!store.remove_node("nope"));
        assert!(!store.remove_edge("nope"));
        assert!(!store.update_node_params("nope", Params::new().with("x", 1.0)));
        store.set_selected_node(Some("nope"));

        assert!(store.snapshot().same_nodes(&before));
        assert!(store.snapshot().same_edges(&before));
        assert_eq!(store.snapshot().revision(), before.revision());
        assert!(store.selected_node_id().is_none());
    }

    #[test]
    fn remove_node_clears_selection() {
        let mut store = store_with_chain();
        store.set_selected_node(Some("b"));
        assert_eq!(store.selected_node_id().unwrap(), "b");

        store.remove_node("b");
        assert!(store.selected_node_id().is_none());
        assert!(store.inputs("output-1").is_empty());
    }

    #[test]
    fn update_node_keeps_kind_and_merges_params() {
        let mut store = store_with_chain();
        store.update_node_params("a", Params::new().with("color", "#f00"));
        store.update_node(
            "a",
            NodeUpdate::new()
                .params(Params::new().with("scale", 3.0))
                .position(10.0, 20.0),
        );

        let a = store.get_node("a").unwrap();
        assert_eq!(a.kind(), NodeKind::Source);
        assert_eq!(a.params.str("color"), Some("#f00"));
        assert_eq!(a.params.f64("scale"), Some(3.0));
        assert_eq!(a.position.unwrap().x, 10.0);
    }

    #[test]
    fn input_index_matches_per_node_inputs() {
        let mut store = store_with_chain();
        store.add_edge(Edge::new("ao", "a", "output-1"));

        let snapshot = store.snapshot();
        let index = snapshot.input_index();
        for node in snapshot.nodes() {
            let direct: Vec<&NodeId> = snapshot.inputs(node.id.as_str()).collect();
            assert_eq!(index.get(node.id.as_str()), direct.as_slice());
        }
        assert!(index.get("missing").is_empty());
    }

    #[test]
    fn nodes_by_type() {
        let store = store_with_chain();
        let spheres = store.get_nodes_by_type("SphereNode");
        assert_eq!(spheres.len(), 1);
        assert_eq!(spheres[0].id, "a");
    }

    #[test]
    fn nodes_by_type_outlives_the_type_name() {
        let store = store_with_chain();
        let effects = {
            let name = String::from("AudioReactiveNode");
            store.get_nodes_by_type(&name)
        };
        assert_eq!(effects.len(), 1);
        assert_eq!(effects[0].id, "b");
    }
}
