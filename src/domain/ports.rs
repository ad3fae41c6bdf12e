use crate::adapters::downloader::DownloadSettings;
use crate::adapters::geocoder::GeocoderSettings;
use crate::domain::model::{
    Coordinates, DeclarationKind, FlowLayout, RankingOptions, RerouteReport, TradeFlowBatch,
};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    /// Directory holding extracted declaration files.
    fn data_dir(&self) -> &str;
    /// Port directory CSV.
    fn directory_path(&self) -> &str;
    fn output_path(&self) -> &str;
    fn flow_layout(&self, kind: DeclarationKind) -> &FlowLayout;
    fn ranking(&self) -> RankingOptions;
    /// `None` disables coordinate completion.
    fn geocoder(&self) -> Option<&GeocoderSettings>;
    fn download(&self) -> Option<&DownloadSettings>;
}

/// Resolves a free-text place query to coordinates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` means the service answered but found nothing.
    async fn locate(&self, query: &str, country: &str) -> Result<Option<Coordinates>>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<TradeFlowBatch>;
    async fn transform(&self, batch: TradeFlowBatch) -> Result<RerouteReport>;
    async fn load(&self, report: &RerouteReport) -> Result<String>;
}
