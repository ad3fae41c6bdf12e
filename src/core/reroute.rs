use crate::adapters::directory::PortDirectory;
use crate::adapters::downloader::Downloader;
use crate::adapters::geocoder::CoordinateCompleter;
use crate::adapters::trade_flow::TradeFlowLoader;
use crate::core::attributes::bind_attributes;
use crate::core::disruption::DisruptedPort;
use crate::core::graph::{GraphBuilder, PortGraph};
use crate::core::ranker::ProximityRanker;
use crate::core::{ConfigProvider, Geocoder, Pipeline, Storage};
use crate::domain::model::{
    DeclarationKind, PortCode, RerouteReport, RerouteRequest, TradeFlow, TradeFlowBatch,
};
use crate::utils::error::{RerouteError, Result};
use serde::Serialize;

pub const REPORT_FILE: &str = "reroute_report.json";
pub const ALTERNATIVES_FILE: &str = "alternatives.csv";

#[derive(Debug, Serialize)]
struct AlternativeRow<'a> {
    rank: usize,
    code: u32,
    name: &'a str,
    distance_km: Option<String>,
    path: String,
}

/// Loads trade flows, disables one port and ranks the alternatives for an
/// origin port.
pub struct ReroutePipeline<S: Storage, C: ConfigProvider> {
    storage: S,
    config: C,
    request: RerouteRequest,
    geocoder: Option<Box<dyn Geocoder>>,
}

impl<S: Storage, C: ConfigProvider> ReroutePipeline<S, C> {
    pub fn new(storage: S, config: C, request: RerouteRequest) -> Self {
        Self {
            storage,
            config,
            request,
            geocoder: None,
        }
    }

    /// Enables coordinate completion for ports the directory cannot place.
    pub fn with_geocoder(mut self, geocoder: Box<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn request(&self) -> RerouteRequest {
        self.request
    }

    async fn complete_coordinates(&self, graph: &PortGraph, directory: &mut PortDirectory) {
        let Some(geocoder) = self.geocoder.as_deref() else {
            return;
        };

        let mut codes: Vec<PortCode> = graph.codes().collect();
        if !graph.contains(self.request.disrupted) {
            codes.push(self.request.disrupted);
        }

        let summary = CoordinateCompleter::new(geocoder)
            .complete(directory, codes)
            .await;
        tracing::info!(
            "Geocoding: {} attempted, {} resolved, {} unresolved, {} without a directory entry",
            summary.attempted,
            summary.resolved,
            summary.unresolved,
            summary.without_directory_entry
        );

        let persist = self.config.geocoder().map(|s| s.persist).unwrap_or(false);
        if persist && summary.changed() {
            if let Err(e) = directory.save(self.config.directory_path()) {
                tracing::warn!("Could not persist geocoded coordinates: {}", e);
            }
        }
    }
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for ReroutePipeline<S, C> {
    async fn extract(&self) -> Result<TradeFlowBatch> {
        if let Some(settings) = self.config.download() {
            let report = Downloader::new(settings.clone())?
                .acquire(self.config.data_dir())
                .await?;
            if !report.download.failed.is_empty() {
                tracing::warn!(
                    "{} source(s) could not be fetched; continuing with the files on disk",
                    report.download.failed.len()
                );
            }
        }

        let loader = TradeFlowLoader::new(
            self.config.flow_layout(DeclarationKind::Import).clone(),
            self.config.flow_layout(DeclarationKind::Export).clone(),
        )?;
        loader.load_dir(self.config.data_dir())
    }

    async fn transform(&self, batch: TradeFlowBatch) -> Result<RerouteReport> {
        let RerouteRequest { origin, disrupted } = self.request;

        let mut builder = GraphBuilder::new();
        builder.extend(batch.flows.iter().map(TradeFlow::pair));
        let (mut graph, build) = builder.build();
        tracing::info!(
            "Built port graph: {} ports, {} routes ({} self-loops rejected, {} duplicate pairs)",
            graph.node_count(),
            graph.edge_count(),
            build.self_loops_rejected,
            build.duplicate_pairs
        );
        if graph.is_empty() {
            return Err(RerouteError::NoRoutesAvailable);
        }

        let mut directory = PortDirectory::from_path_or_empty(self.config.directory_path())?;
        self.complete_coordinates(&graph, &mut directory).await;

        let bound = bind_attributes(&mut graph, &directory);
        tracing::debug!(
            "Directory matched {} port(s); {} graph port(s) unmatched, {} without coordinates",
            bound.matched,
            bound.unmatched,
            bound.without_coordinates
        );

        let mut stats = graph.stats();
        let disrupted_port = match graph.remove(disrupted) {
            Ok(port) => port,
            Err(RerouteError::PortNotFound { code }) => {
                tracing::warn!(
                    "Disrupted port {} never appeared in the trade flows; nothing was removed",
                    code
                );
                DisruptedPort::from_directory(code, directory.get(code))
            }
            Err(e) => return Err(e),
        };
        stats.edges_removed = disrupted_port.edges_removed();

        let ranking = ProximityRanker::new(self.config.ranking()).rank(
            &graph,
            origin,
            &disrupted_port,
        )?;

        Ok(RerouteReport {
            request: self.request,
            generated_at: chrono::Utc::now(),
            load: batch.summary,
            graph: stats,
            disruption: disrupted_port.status,
            ranking,
        })
    }

    async fn load(&self, report: &RerouteReport) -> Result<String> {
        let json = serde_json::to_vec_pretty(report)?;
        self.storage.write_file(REPORT_FILE, &json).await?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        for (index, alternative) in report.ranking.alternatives.iter().enumerate() {
            writer.serialize(AlternativeRow {
                rank: index + 1,
                code: alternative.code.value(),
                name: alternative.name.as_deref().unwrap_or(""),
                distance_km: alternative.distance_km.map(|d| format!("{:.2}", d)),
                path: alternative
                    .path
                    .iter()
                    .map(PortCode::to_string)
                    .collect::<Vec<_>>()
                    .join(">"),
            })?;
        }
        let table = writer
            .into_inner()
            .map_err(|e| RerouteError::IoError(std::io::Error::other(e.to_string())))?;
        self.storage.write_file(ALTERNATIVES_FILE, &table).await?;

        tracing::debug!(
            "Wrote {} and {} ({} alternative(s))",
            REPORT_FILE,
            ALTERNATIVES_FILE,
            report.ranking.alternatives.len()
        );
        Ok(format!("{}/{}", self.config.output_path(), REPORT_FILE))
    }
}
