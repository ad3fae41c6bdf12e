use crate::core::graph::PortGraph;
use crate::domain::model::DirectoryEntry;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BindSummary {
    pub matched: usize,
    pub unmatched: usize,
    pub without_coordinates: usize,
}

/// Copies directory metadata onto the nodes of `graph`.
///
/// Entries for codes absent from the graph are ignored; nodes with no
/// directory entry keep empty metadata.
pub fn bind_attributes<'a, I>(graph: &mut PortGraph, entries: I) -> BindSummary
where
    I: IntoIterator<Item = &'a DirectoryEntry>,
{
    let mut matched = BTreeSet::new();
    for entry in entries {
        if let Some(node) = graph.node_mut(entry.code) {
            entry.apply_to(node);
            matched.insert(entry.code);
        }
    }

    let without_coordinates = graph
        .nodes()
        .filter(|node| node.coordinates.is_none())
        .count();
    let summary = BindSummary {
        matched: matched.len(),
        unmatched: graph.node_count() - matched.len(),
        without_coordinates,
    };

    tracing::debug!(
        "Bound directory metadata: {} matched, {} unmatched, {} without coordinates",
        summary.matched,
        summary.unmatched,
        summary.without_coordinates
    );
    summary
}
