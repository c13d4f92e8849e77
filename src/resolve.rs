//! Active-set resolution.
//!
//! Decides which nodes matter on a given tick: everything reachable from the
//! output node by following inputs, plus every effect node in the graph.

use alloc::vec::Vec;

use hashbrown::HashSet;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::graph::{GraphSnapshot, InputIndex};
use crate::node::NodeId;

/// How the walk from the output treats a node reachable along several paths.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Traversal {
    /// Yield a node once per path that reaches it (so a shared source shows
    /// up once for every branch feeding into it).
    #[default]
    PerPath,
    /// Yield each node at most once.
    Unique,
}

/// The nodes that are live on this tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActiveSet {
    effects: Vec<NodeId>,
    reachable: Vec<NodeId>,
}

impl ActiveSet {
    /// Every effect-kind node, in graph order. Always unique.
    pub fn effects(&self) -> &[NodeId] {
        &self.effects
    }

    /// Nodes reached from the output, in depth-first pre-order.
    pub fn reachable(&self) -> &[NodeId] {
        &self.reachable
    }

    /// Effects first, then the reachable walk.
    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.effects.iter().chain(self.reachable.iter())
    }

    pub fn len(&self) -> usize {
        self.effects.len() + self.reachable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty() && self.reachable.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.iter().any(|n| n == id)
    }

    /// Distinct ids in first-seen order.
    pub fn unique(&self) -> Vec<&NodeId> {
        let mut seen = HashSet::new();
        self.iter().filter(|id| seen.insert(id.as_str())).collect()
    }
}

/// Resolve the active set of `graph`.
///
/// Without an output node the set is empty. The walk never descends into a
/// node already on the current path, so cyclic graphs terminate.
pub fn resolve(graph: &GraphSnapshot, traversal: Traversal) -> ActiveSet {
    let Some(output) = graph.output_node() else {
        trace!("no output node, active set is empty");
        return ActiveSet::default();
    };

    let effects = graph
        .nodes()
        .iter()
        .filter(|n| n.is_effect())
        .map(|n| n.id.clone())
        .collect();

    let index = graph.input_index();
    let mut walk = Walk {
        graph,
        index: &index,
        traversal,
        path: vec![output.id.as_str()],
        visited: HashSet::new(),
        out: Vec::new(),
    };
    walk.visit_inputs(output.id.as_str());

    ActiveSet {
        effects,
        reachable: walk.out,
    }
}

/// Whether following edges from any node can lead back to it.
pub fn is_cyclic(graph: &GraphSnapshot) -> bool {
    let g: DiGraphMap<&str, ()> = DiGraphMap::from_edges(
        graph
            .edges()
            .iter()
            .map(|e| (e.source.as_str(), e.target.as_str())),
    );
    petgraph::algo::is_cyclic_directed(&g)
}

struct Walk<'g, 'i> {
    graph: &'g GraphSnapshot,
    index: &'i InputIndex<'g>,
    traversal: Traversal,
    path: Vec<&'g str>,
    visited: HashSet<&'g str>,
    out: Vec<NodeId>,
}

impl<'g, 'i> Walk<'g, 'i> {
    fn visit_inputs(&mut self, id: &str) {
        let index = self.index;
        for &input in index.get(id) {
            self.visit(input);
        }
    }

    fn visit(&mut self, id: &'g NodeId) {
        let graph = self.graph;
        let Some(node) = graph.get_node(id.as_str()) else {
            trace!(%id, "dangling input");
            return;
        };
        let id = node.id.as_str();

        if self.path.contains(&id) {
            trace!(id, "cycle, not descending");
            return;
        }
        if self.traversal == Traversal::Unique && !self.visited.insert(id) {
            return;
        }

        self.out.push(node.id.clone());
        self.path.push(id);
        self.visit_inputs(id);
        self.path.pop();
    }
}

/// Caches the active set between ticks.
///
/// Resolution is recomputed only when the graph's node or edge collection
/// changed identity since the last call.
#[derive(Debug, Default)]
pub struct ActiveSetResolver {
    traversal: Traversal,
    last: Option<GraphSnapshot>,
    cached: ActiveSet,
}

impl ActiveSetResolver {
    pub fn new(traversal: Traversal) -> Self {
        Self {
            traversal,
            last: None,
            cached: ActiveSet::default(),
        }
    }

    pub fn traversal(&self) -> Traversal {
        self.traversal
    }

    pub fn set_traversal(&mut self, traversal: Traversal) {
        if self.traversal != traversal {
            self.traversal = traversal;
            self.last = None;
        }
    }

    pub fn resolve(&mut self, graph: &GraphSnapshot) -> &ActiveSet {
        let fresh = match &self.last {
            Some(last) => last.same_nodes(graph) && last.same_edges(graph),
            None => false,
        };

        if !fresh {
            if !self.last.as_ref().is_some_and(|l| l.same_edges(graph)) && is_cyclic(graph) {
                warn!(revision = graph.revision(), "graph contains a cycle");
            }
            self.cached = resolve(graph, self.traversal);
            self.last = Some(graph.clone());
        }

        &self.cached
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphStore;
    use crate::node::{Edge, Node};

    fn ids(list: &[NodeId]) -> Vec<&str> {
        list.iter().map(NodeId::as_str).collect()
    }

    #[test]
    fn empty_output_resolves_empty() {
        let store = GraphStore::new();
        assert!(resolve(store.snapshot(), Traversal::PerPath).is_empty());
    }

    #[test]
    fn no_output_means_nothing_is_active() {
        let mut store = GraphStore::empty();
        store.add_node(Node::effect("fx", "AudioReactiveNode"));
        assert!(resolve(store.snapshot(), Traversal::PerPath).is_empty());
    }

    #[test]
    fn single_source() {
        let mut store = GraphStore::new();
        store.add_node(Node::source("s", "SphereNode"));
        store.add_edge(Edge::new("e", "s", "output-1"));

        let set = resolve(store.snapshot(), Traversal::PerPath);
        assert_eq!(ids(set.reachable()), ["s"]);
        assert!(set.effects().is_empty());
    }

    #[test]
    fn unreachable_effects_are_active() {
        let mut store = GraphStore::new();
        store.add_node(Node::effect("fx", "ShaderEffectNode"));
        store.add_node(Node::source("lonely", "SphereNode"));

        let set = resolve(store.snapshot(), Traversal::PerPath);
        assert_eq!(ids(set.effects()), ["fx"]);
        assert!(set.reachable().is_empty());
        assert!(!set.contains("lonely"));
    }

    fn diamond() -> GraphStore {
        // s -> a -> out, s -> b -> out
        let mut store = GraphStore::new();
        store.add_node(Node::source("s", "SphereNode"));
        store.add_node(Node::effect("a", "AudioReactiveNode"));
        store.add_node(Node::effect("b", "AudioReactiveNode"));
        store.add_edge(Edge::new("sa", "s", "a"));
        store.add_edge(Edge::new("sb", "s", "b"));
        store.add_edge(Edge::new("ao", "a", "output-1"));
        store.add_edge(Edge::new("bo", "b", "output-1"));
        store
    }

    #[test]
    fn converging_paths_per_path() {
        let store = diamond();
        let set = resolve(store.snapshot(), Traversal::PerPath);
        assert_eq!(ids(set.reachable()), ["a", "s", "b", "s"]);
    }

    #[test]
    fn converging_paths_unique() {
        let store = diamond();
        let set = resolve(store.snapshot(), Traversal::Unique);
        assert_eq!(ids(set.reachable()), ["a", "s", "b"]);
        assert_eq!(set.unique().len(), 3);
    }

    #[test]
    fn cycles_terminate() {
        let mut store = GraphStore::new();
        store.add_node(Node::source("x", "SphereNode"));
        store.add_node(Node::source("y", "SphereNode"));
        store.add_edge(Edge::new("xy", "x", "y"));
        store.add_edge(Edge::new("yx", "y", "x"));
        store.add_edge(Edge::new("yo", "y", "output-1"));

        assert!(is_cyclic(store.snapshot()));
        let set = resolve(store.snapshot(), Traversal::PerPath);
        assert_eq!(ids(set.reachable()), ["y", "x"]);
    }

    #[test]
    fn dangling_inputs_are_skipped() {
        let mut store = GraphStore::new();
        store.add_edge(Edge::new("ghost", "missing", "output-1"));
        assert!(resolve(store.snapshot(), Traversal::PerPath).is_empty());
    }

    #[test]
    fn resolver_caches_until_graph_changes() {
        let mut store = diamond();
        let mut resolver = ActiveSetResolver::new(Traversal::Unique);
        assert_eq!(resolver.resolve(store.snapshot()).reachable().len(), 3);

        store.remove_edge("bo");
        assert_eq!(resolver.resolve(store.snapshot()).reachable().len(), 2);

        resolver.set_traversal(Traversal::PerPath);
        assert_eq!(resolver.resolve(store.snapshot()).reachable().len(), 2);
    }
}
