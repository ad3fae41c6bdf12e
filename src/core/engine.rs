use crate::core::Pipeline;
use crate::domain::model::RankingBasis;
use crate::utils::error::Result;
use crate::utils::monitor::ResourceMonitor;

/// Drives a [`Pipeline`] through extract, transform and load.
pub struct RerouteEngine<P: Pipeline> {
    pipeline: P,
    monitor: ResourceMonitor,
}

impl<P: Pipeline> RerouteEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: ResourceMonitor::new(monitor_enabled),
        }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    /// Returns the path of the written report.
    pub async fn run(&self) -> Result<String> {
        tracing::info!("Starting reroute run");

        tracing::info!("Loading trade flows...");
        let batch = self.pipeline.extract().await?;
        tracing::info!(
            "Loaded {} trade flow(s) from {} file(s)",
            batch.summary.flows,
            batch.summary.files_read
        );
        self.monitor.log_phase("extract");

        tracing::info!("Ranking alternatives...");
        let report = self.pipeline.transform(batch).await?;
        match report.ranking.basis {
            RankingBasis::CoordinatesUnavailable => tracing::warn!(
                "No alternatives for origin {}: disrupted port {} has no coordinates",
                report.request.origin,
                report.request.disrupted
            ),
            basis => tracing::info!(
                "Found {} alternative(s) for origin {} ({:?})",
                report.ranking.alternatives.len(),
                report.request.origin,
                basis
            ),
        }
        self.monitor.log_phase("transform");

        let output_path = self.pipeline.load(&report).await?;
        tracing::info!("Report saved to: {}", output_path);
        self.monitor.log_phase("load");
        self.monitor.log_summary();

        Ok(output_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{
        DisruptionStatus, GraphStats, LoadSummary, PortCode, Ranking, RerouteReport,
        RerouteRequest, TradeFlowBatch,
    };
    use crate::utils::error::RerouteError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingPipeline {
        loads: AtomicUsize,
        fail_transform: bool,
    }

    #[async_trait::async_trait]
    impl Pipeline for CountingPipeline {
        async fn extract(&self) -> Result<TradeFlowBatch> {
            Ok(TradeFlowBatch::default())
        }

        async fn transform(&self, batch: TradeFlowBatch) -> Result<RerouteReport> {
            if self.fail_transform {
                return Err(RerouteError::NoRoutesAvailable);
            }
            let request = RerouteRequest {
                origin: PortCode::new(906),
                disrupted: PortCode::new(905),
            };
            Ok(RerouteReport {
                request,
                generated_at: chrono::Utc::now(),
                load: LoadSummary {
                    flows: batch.flows.len(),
                    ..Default::default()
                },
                graph: GraphStats::default(),
                disruption: DisruptionStatus::Removed,
                ranking: Ranking {
                    origin: request.origin,
                    disrupted: request.disrupted,
                    basis: RankingBasis::DirectNeighbors,
                    alternatives: Vec::new(),
                    skipped_without_coordinates: 0,
                },
            })
        }

        async fn load(&self, _report: &RerouteReport) -> Result<String> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok("out/reroute_report.json".to_string())
        }
    }

    #[tokio::test]
    async fn test_run_returns_load_path() {
        let engine = RerouteEngine::new(CountingPipeline::default());

        let path = engine.run().await.unwrap();

        assert_eq!(path, "out/reroute_report.json");
        assert_eq!(engine.pipeline().loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_transform_skips_load() {
        let engine = RerouteEngine::new_with_monitoring(
            CountingPipeline {
                fail_transform: true,
                ..Default::default()
            },
            true,
        );

        let result = engine.run().await;

        assert!(matches!(result, Err(RerouteError::NoRoutesAvailable)));
        assert_eq!(engine.pipeline().loads.load(Ordering::SeqCst), 0);
    }
}
