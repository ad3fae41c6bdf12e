//! Port outages modelled as node removal.

use crate::core::graph::PortGraph;
use crate::domain::model::{Coordinates, DirectoryEntry, DisruptionStatus, PortCode, PortNode};
use crate::utils::error::{RerouteError, Result};

/// Last-known state of a port taken out of the graph.
///
/// Kept alongside the mutated graph for the ranking call so distances can
/// still be measured from the disrupted port.
#[derive(Debug, Clone, PartialEq)]
pub struct DisruptedPort {
    pub node: PortNode,
    pub former_neighbors: Vec<PortCode>,
    pub status: DisruptionStatus,
}

impl DisruptedPort {
    /// Side record for a port that was never part of the graph.
    pub fn from_directory(code: PortCode, entry: Option<&DirectoryEntry>) -> Self {
        let node = entry
            .filter(|entry| entry.code == code)
            .map(DirectoryEntry::to_node)
            .unwrap_or_else(|| PortNode::bare(code));
        Self {
            node,
            former_neighbors: Vec::new(),
            status: DisruptionStatus::NotInGraph,
        }
    }

    pub fn code(&self) -> PortCode {
        self.node.code
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        self.node.coordinates
    }

    pub fn edges_removed(&self) -> usize {
        self.former_neighbors.len()
    }
}

impl PortGraph {
    /// Deletes `code` and every incident edge in place.
    ///
    /// A code that is not in the graph is reported as
    /// [`RerouteError::PortNotFound`] and leaves the graph untouched.
    pub fn remove(&mut self, code: PortCode) -> Result<DisruptedPort> {
        let node = self
            .nodes
            .remove(&code)
            .ok_or(RerouteError::PortNotFound { code })?;
        let former_neighbors: Vec<PortCode> = self
            .adjacency
            .remove(&code)
            .map(|neighbors| neighbors.into_iter().collect())
            .unwrap_or_default();

        for neighbor in &former_neighbors {
            if let Some(back_links) = self.adjacency.get_mut(neighbor) {
                back_links.remove(&code);
            }
        }
        self.edge_count -= former_neighbors.len();

        tracing::info!(
            "Port {} disabled: {} route(s) removed",
            node.label(),
            former_neighbors.len()
        );

        Ok(DisruptedPort {
            node,
            former_neighbors,
            status: DisruptionStatus::Removed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(value: u32) -> PortCode {
        PortCode::new(value)
    }

    fn sample_graph() -> PortGraph {
        PortGraph::from_flows(
            [(905, 906), (906, 907), (906, 908), (907, 908), (921, 905)]
                .into_iter()
                .map(|(a, b)| (code(a), code(b))),
        )
    }

    #[test]
    fn test_remove_drops_exactly_the_incident_edges() {
        let mut graph = sample_graph();
        let before_edges = graph.edge_count();
        let degree = graph.degree(code(906)).unwrap();
        let untouched: Vec<_> = graph
            .edges()
            .filter(|&(a, b)| a != code(906) && b != code(906))
            .collect();

        let disrupted = graph.remove(code(906)).unwrap();

        assert_eq!(disrupted.status, DisruptionStatus::Removed);
        assert_eq!(disrupted.edges_removed(), degree);
        assert_eq!(graph.edge_count(), before_edges - degree);
        assert!(!graph.contains(code(906)));
        assert_eq!(graph.edges().collect::<Vec<_>>(), untouched);
        assert_eq!(
            disrupted.former_neighbors,
            vec![code(905), code(907), code(908)]
        );
    }

    #[test]
    fn test_remove_keeps_last_known_attributes() {
        let mut graph = sample_graph();
        {
            let node = graph.node_mut(code(907)).unwrap();
            node.name = Some("TALCAHUANO".to_string());
            node.coordinates = Coordinates::new(-36.7167, -73.1167);
        }

        let disrupted = graph.remove(code(907)).unwrap();

        assert_eq!(disrupted.code(), code(907));
        assert_eq!(disrupted.node.name.as_deref(), Some("TALCAHUANO"));
        assert!(disrupted.coordinates().is_some());
    }

    #[test]
    fn test_remove_missing_port_reports_not_found() {
        let mut graph = sample_graph();
        let before = graph.clone();

        let result = graph.remove(code(999));

        assert!(matches!(result, Err(RerouteError::PortNotFound { code }) if code == PortCode::new(999)));
        assert_eq!(graph, before);
    }

    #[test]
    fn test_second_removal_is_distinguishable_from_the_first() {
        let mut graph = sample_graph();
        assert!(graph.remove(code(921)).is_ok());
        assert!(matches!(
            graph.remove(code(921)),
            Err(RerouteError::PortNotFound { .. })
        ));
    }

    #[test]
    fn test_from_directory_uses_matching_entry_only() {
        let entry = DirectoryEntry {
            code: code(907),
            name: "TALCAHUANO".to_string(),
            country: "CHILE".to_string(),
            port_type: None,
            coordinates: Coordinates::new(-36.7167, -73.1167),
        };

        let known = DisruptedPort::from_directory(code(907), Some(&entry));
        assert_eq!(known.status, DisruptionStatus::NotInGraph);
        assert!(known.coordinates().is_some());

        let mismatched = DisruptedPort::from_directory(code(908), Some(&entry));
        assert_eq!(mismatched.code(), code(908));
        assert!(mismatched.coordinates().is_none());
    }
}
