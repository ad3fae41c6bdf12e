//! Ranks alternative ports after a disruption.
//!
//! Direct historical neighbors of the origin come first. When the origin has
//! none left, the ports nearest to the disrupted one are proposed instead.

use crate::core::disruption::DisruptedPort;
use crate::core::geo::haversine_km;
use crate::core::graph::PortGraph;
use crate::domain::model::{
    Alternative, Coordinates, PortCode, Ranking, RankingBasis, RankingOptions,
};
use crate::utils::error::{RerouteError, Result};

#[derive(Debug, Clone, Default)]
pub struct ProximityRanker {
    options: RankingOptions,
}

impl ProximityRanker {
    pub fn new(options: RankingOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RankingOptions {
        &self.options
    }

    /// `graph` must already have the disruption applied.
    pub fn rank(
        &self,
        graph: &PortGraph,
        origin: PortCode,
        disrupted: &DisruptedPort,
    ) -> Result<Ranking> {
        let disrupted_code = disrupted.code();
        let mut neighbors = graph.neighbors(origin)?;
        neighbors.retain(|&code| code != disrupted_code);

        tracing::info!(
            "Port {} has {} direct neighbor(s) after disabling {}",
            origin,
            neighbors.len(),
            disrupted_code
        );

        if !neighbors.is_empty() {
            return Ok(self.rank_neighbors(graph, origin, disrupted, neighbors));
        }

        let Some(from) = disrupted.coordinates() else {
            tracing::warn!(
                "No coordinates for disrupted port {}; cannot rank by distance",
                disrupted_code
            );
            return Ok(Ranking {
                origin,
                disrupted: disrupted_code,
                basis: RankingBasis::CoordinatesUnavailable,
                alternatives: Vec::new(),
                skipped_without_coordinates: 0,
            });
        };

        Ok(self.rank_by_distance(graph, origin, disrupted_code, from))
    }

    fn rank_neighbors(
        &self,
        graph: &PortGraph,
        origin: PortCode,
        disrupted: &DisruptedPort,
        neighbors: Vec<PortCode>,
    ) -> Ranking {
        let from = disrupted.coordinates();
        let mut alternatives: Vec<Alternative> = neighbors
            .into_iter()
            .map(|code| Alternative {
                code,
                name: graph.node(code).and_then(|node| node.name.clone()),
                distance_km: distance_from(graph, from, code),
                path: vec![origin, code],
            })
            .collect();

        if self.options.sort_neighbors_by_distance {
            // Neighbors without a distance keep their relative order at the end.
            alternatives.sort_by(|a, b| match (a.distance_km, b.distance_km) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            });
        }
        if let Some(limit) = self.options.neighbor_limit {
            alternatives.truncate(limit);
        }

        Ranking {
            origin,
            disrupted: disrupted.code(),
            basis: RankingBasis::DirectNeighbors,
            alternatives,
            skipped_without_coordinates: 0,
        }
    }

    fn rank_by_distance(
        &self,
        graph: &PortGraph,
        origin: PortCode,
        disrupted: PortCode,
        from: Coordinates,
    ) -> Ranking {
        let mut skipped = 0;
        let mut candidates: Vec<(PortCode, f64)> = Vec::new();

        for code in graph.codes() {
            if code == origin || code == disrupted {
                continue;
            }
            match graph.coordinates(code) {
                Ok(to) => candidates.push((code, haversine_km(from, to))),
                Err(e) => {
                    tracing::debug!("Skipping candidate: {}", e);
                    skipped += 1;
                }
            }
        }
        if skipped > 0 {
            tracing::warn!(
                "{} candidate port(s) skipped for missing coordinates",
                skipped
            );
        }

        candidates.sort_by(|a, b| a.1.total_cmp(&b.1));
        let alternatives = candidates
            .into_iter()
            .take(self.options.limit)
            .map(|(code, distance)| Alternative {
                code,
                name: graph.node(code).and_then(|node| node.name.clone()),
                distance_km: Some(distance),
                path: Vec::new(),
            })
            .collect();

        Ranking {
            origin,
            disrupted,
            basis: RankingBasis::NearestByDistance,
            alternatives,
            skipped_without_coordinates: skipped,
        }
    }
}

fn distance_from(graph: &PortGraph, from: Option<Coordinates>, code: PortCode) -> Option<f64> {
    let to = graph.coordinates(code).ok()?;
    Some(haversine_km(from?, to))
}

impl From<RankingOptions> for ProximityRanker {
    fn from(options: RankingOptions) -> Self {
        Self::new(options)
    }
}
