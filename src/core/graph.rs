//! Undirected connectivity graph of ports that have exchanged cargo.

use crate::domain::model::{Coordinates, GraphStats, PortCode, PortNode};
use crate::utils::error::{RerouteError, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Nodes iterate in ascending port code order, which keeps every query and
/// ranking deterministic for a fixed graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortGraph {
    pub(crate) nodes: BTreeMap<PortCode, PortNode>,
    pub(crate) adjacency: BTreeMap<PortCode, BTreeSet<PortCode>>,
    pub(crate) edge_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildSummary {
    pub pairs_seen: usize,
    pub self_loops_rejected: usize,
    pub duplicate_pairs: usize,
}

impl PortGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_flows<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (PortCode, PortCode)>,
    {
        let mut builder = GraphBuilder::new();
        builder.extend(pairs);
        builder.build().0
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn contains(&self, code: PortCode) -> bool {
        self.nodes.contains_key(&code)
    }

    pub fn node(&self, code: PortCode) -> Option<&PortNode> {
        self.nodes.get(&code)
    }

    pub fn node_mut(&mut self, code: PortCode) -> Option<&mut PortNode> {
        self.nodes.get_mut(&code)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PortNode> {
        self.nodes.values()
    }

    pub fn codes(&self) -> impl Iterator<Item = PortCode> + '_ {
        self.nodes.keys().copied()
    }

    /// Each edge once, as `(smaller, larger)`.
    pub fn edges(&self) -> impl Iterator<Item = (PortCode, PortCode)> + '_ {
        self.adjacency.iter().flat_map(|(&a, neighbors)| {
            neighbors
                .range((std::ops::Bound::Excluded(a), std::ops::Bound::Unbounded))
                .map(move |&b| (a, b))
        })
    }

    pub fn has_edge(&self, a: PortCode, b: PortCode) -> bool {
        self.adjacency
            .get(&a)
            .is_some_and(|neighbors| neighbors.contains(&b))
    }

    pub fn neighbors(&self, code: PortCode) -> Result<Vec<PortCode>> {
        self.adjacency
            .get(&code)
            .map(|neighbors| neighbors.iter().copied().collect())
            .ok_or(RerouteError::PortNotFound { code })
    }

    pub fn degree(&self, code: PortCode) -> Option<usize> {
        self.adjacency.get(&code).map(BTreeSet::len)
    }

    pub fn coordinates(&self, code: PortCode) -> Result<Coordinates> {
        let node = self.node(code).ok_or(RerouteError::PortNotFound { code })?;
        node.coordinates
            .ok_or(RerouteError::MissingCoordinates { code })
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            nodes: self.node_count(),
            edges: self.edge_count(),
            edges_removed: 0,
        }
    }

    fn ensure_node(&mut self, code: PortCode) {
        self.nodes
            .entry(code)
            .or_insert_with(|| PortNode::bare(code));
        self.adjacency.entry(code).or_default();
    }

    /// Returns `false` when the edge already existed.
    fn insert_edge(&mut self, a: PortCode, b: PortCode) -> bool {
        self.ensure_node(a);
        self.ensure_node(b);
        let inserted = self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
        if inserted {
            self.edge_count += 1;
        }
        inserted
    }
}

/// Accumulates origin/destination pairs into a [`PortGraph`].
#[derive(Debug, Default)]
pub struct GraphBuilder {
    graph: PortGraph,
    summary: BuildSummary,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_flow(&mut self, origin: PortCode, destination: PortCode) -> &mut Self {
        self.summary.pairs_seen += 1;
        if origin == destination {
            tracing::debug!("Rejecting self-loop route at port {}", origin);
            self.summary.self_loops_rejected += 1;
            return self;
        }
        if !self.graph.insert_edge(origin, destination) {
            self.summary.duplicate_pairs += 1;
        }
        self
    }

    pub fn extend<I>(&mut self, pairs: I) -> &mut Self
    where
        I: IntoIterator<Item = (PortCode, PortCode)>,
    {
        for (origin, destination) in pairs {
            self.add_flow(origin, destination);
        }
        self
    }

    pub fn build(self) -> (PortGraph, BuildSummary) {
        (self.graph, self.summary)
    }
}
