//! Dependency edges between representatives.
//!
//! Uses `petgraph::StableDiGraph` with:
//! - Nodes: representatives taking part in at least one edge
//! - Edges: `dependent -> dependency`, weighted by multiplicity
//!
//! An edge means: while `dependent` is reachable, `dependency` must not be
//! collected. Adding the same edge again bumps its multiplicity; only the first
//! occurrence has to be materialized in the host collector. Edges are removed
//! only when their dependent is collected.

use petgraph::Direction;
use petgraph::algo::has_path_connecting;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use rustc_hash::FxHashMap;
use tether_core::RepHandle;
use tracing::trace;

/// Outcome of [`DependencyGraph::add_edge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeInsert {
    /// First occurrence of this edge.
    New,
    /// The edge existed; its multiplicity is now the contained count.
    Repeated(u32),
    /// `dependent == dependency`; nothing recorded.
    SelfEdge,
}

/// Multigraph of dependency edges.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: StableDiGraph<RepHandle, u32>,
    nodes: FxHashMap<RepHandle, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&mut self, rep: RepHandle) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(&rep) {
            return idx;
        }
        let idx = self.graph.add_node(rep);
        self.nodes.insert(rep, idx);
        idx
    }

    /// Record `dependent -> dependency`.
    pub fn add_edge(&mut self, dependent: RepHandle, dependency: RepHandle) -> EdgeInsert {
        if dependent == dependency {
            return EdgeInsert::SelfEdge;
        }
        let from = self.node(dependent);
        let to = self.node(dependency);
        if let Some(edge) = self.graph.find_edge(from, to)
            && let Some(count) = self.graph.edge_weight_mut(edge)
        {
            *count += 1;
            trace!(%dependent, %dependency, multiplicity = *count, "repeated dependency edge");
            return EdgeInsert::Repeated(*count);
        }
        self.graph.add_edge(from, to, 1);
        trace!(%dependent, %dependency, "new dependency edge");
        EdgeInsert::New
    }

    /// Drop every edge whose dependent is `rep`.
    ///
    /// Returns the dependencies that were released with their multiplicities.
    /// Nodes left without any edge are pruned.
    pub fn remove_dependent(&mut self, rep: RepHandle) -> Vec<(RepHandle, u32)> {
        let Some(&idx) = self.nodes.get(&rep) else {
            return Vec::new();
        };
        let outgoing: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|edge| (edge.id(), edge.target()))
            .collect();

        let mut released = Vec::with_capacity(outgoing.len());
        for (edge, target) in outgoing {
            if let Some(count) = self.graph.remove_edge(edge) {
                released.push((self.graph[target], count));
            }
            self.prune(target);
        }
        self.prune(idx);
        released
    }

    fn prune(&mut self, idx: NodeIndex) {
        let isolated = self
            .graph
            .neighbors_undirected(idx)
            .next()
            .is_none();
        if isolated && let Some(rep) = self.graph.remove_node(idx) {
            self.nodes.remove(&rep);
        }
    }

    /// Direct dependencies of `rep`.
    pub fn dependencies_of(&self, rep: RepHandle) -> Vec<RepHandle> {
        self.neighbors(rep, Direction::Outgoing)
    }

    /// Representatives that directly depend on `rep`.
    pub fn dependents_of(&self, rep: RepHandle) -> Vec<RepHandle> {
        self.neighbors(rep, Direction::Incoming)
    }

    fn neighbors(&self, rep: RepHandle, dir: Direction) -> Vec<RepHandle> {
        match self.nodes.get(&rep) {
            Some(&idx) => self
                .graph
                .neighbors_directed(idx, dir)
                .map(|n| self.graph[n])
                .collect(),
            None => Vec::new(),
        }
    }

    /// Multiplicity of `dependent -> dependency`, zero if absent.
    pub fn multiplicity(&self, dependent: RepHandle, dependency: RepHandle) -> u32 {
        let (Some(&from), Some(&to)) = (self.nodes.get(&dependent), self.nodes.get(&dependency))
        else {
            return 0;
        };
        self.graph
            .find_edge(from, to)
            .and_then(|edge| self.graph.edge_weight(edge).copied())
            .unwrap_or(0)
    }

    pub fn contains_edge(&self, dependent: RepHandle, dependency: RepHandle) -> bool {
        self.multiplicity(dependent, dependency) > 0
    }

    /// Whether `to` is kept alive by `from`, directly or transitively.
    pub fn reaches(&self, from: RepHandle, to: RepHandle) -> bool {
        match (self.nodes.get(&from), self.nodes.get(&to)) {
            (Some(&a), Some(&b)) => has_path_connecting(&self.graph, a, b, None),
            _ => false,
        }
    }

    /// Number of distinct edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Number of representatives taking part in an edge.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.edge_count() == 0
    }
}
