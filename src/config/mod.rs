pub mod toml_config;

#[cfg(feature = "cli")]
use crate::adapters::downloader::DownloadSettings;
#[cfg(feature = "cli")]
use crate::adapters::geocoder::GeocoderSettings;
#[cfg(feature = "cli")]
use crate::core::ConfigProvider;
#[cfg(feature = "cli")]
use crate::domain::model::{DeclarationKind, FlowLayout, PortCode, RankingOptions, RerouteRequest};
#[cfg(feature = "cli")]
use crate::utils::error::Result;
#[cfg(feature = "cli")]
use crate::utils::validation::{self, Validate};
#[cfg(feature = "cli")]
use clap::Parser;

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_DIRECTORY_PATH: &str = "./ports.csv";
pub const DEFAULT_OUTPUT_PATH: &str = "./output";

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "port-reroute")]
#[command(about = "Rank alternative ports when a port in the trade network is disrupted")]
pub struct CliConfig {
    /// Port whose shipments need rerouting
    pub origin: PortCode,

    /// Port taken out of service
    pub disrupted: PortCode,

    /// TOML configuration file; flags given here override its values
    #[arg(long)]
    pub config: Option<String>,

    /// Directory holding the extracted declaration files
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Port directory CSV
    #[arg(long)]
    pub directory: Option<String>,

    #[arg(long)]
    pub output_path: Option<String>,

    /// Alternatives returned by the distance fallback
    #[arg(long)]
    pub limit: Option<usize>,

    /// Cap on the number of direct neighbors reported
    #[arg(long)]
    pub neighbor_limit: Option<usize>,

    /// Order direct neighbors by distance from the disrupted port
    #[arg(long)]
    pub sort_neighbors: bool,

    /// Look up missing coordinates with the geocoding service
    #[arg(long)]
    pub geocode: bool,

    /// Fetch the configured trade-flow archives before loading
    #[arg(long)]
    pub download: bool,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log memory and timing per phase")]
    pub monitor: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    #[arg(skip)]
    pub flow_layout: FlowLayout,

    #[arg(skip)]
    pub geocoder_settings: GeocoderSettings,
}

#[cfg(feature = "cli")]
impl CliConfig {
    pub fn request(&self) -> RerouteRequest {
        RerouteRequest {
            origin: self.origin,
            disrupted: self.disrupted,
        }
    }

    /// Applies the ranking flags on top of `base`.
    pub fn ranking_over(&self, base: RankingOptions) -> RankingOptions {
        RankingOptions {
            limit: self.limit.unwrap_or(base.limit),
            neighbor_limit: self.neighbor_limit.or(base.neighbor_limit),
            sort_neighbors_by_distance: self.sort_neighbors || base.sort_neighbors_by_distance,
        }
    }
}

#[cfg(feature = "cli")]
impl ConfigProvider for CliConfig {
    fn data_dir(&self) -> &str {
        self.data_dir.as_deref().unwrap_or(DEFAULT_DATA_DIR)
    }

    fn directory_path(&self) -> &str {
        self.directory.as_deref().unwrap_or(DEFAULT_DIRECTORY_PATH)
    }

    fn output_path(&self) -> &str {
        self.output_path.as_deref().unwrap_or(DEFAULT_OUTPUT_PATH)
    }

    fn flow_layout(&self, _kind: DeclarationKind) -> &FlowLayout {
        &self.flow_layout
    }

    fn ranking(&self) -> RankingOptions {
        self.ranking_over(RankingOptions::default())
    }

    fn geocoder(&self) -> Option<&GeocoderSettings> {
        self.geocode.then_some(&self.geocoder_settings)
    }

    // Sources are only configurable through a TOML file.
    fn download(&self) -> Option<&DownloadSettings> {
        None
    }
}

#[cfg(feature = "cli")]
impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_path("data_dir", self.data_dir())?;
        validation::validate_path("directory", self.directory_path())?;
        validation::validate_path("output_path", self.output_path())?;
        validation::validate_positive_number("limit", self.ranking().limit, 1)?;
        if let Some(neighbor_limit) = self.neighbor_limit {
            validation::validate_positive_number("neighbor_limit", neighbor_limit, 1)?;
        }
        if self.geocode {
            validation::validate_url("geocoder.endpoint", &self.geocoder_settings.endpoint)?;
        }
        Ok(())
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn test_parse_positional_ports_and_defaults() {
        let config = CliConfig::try_parse_from(["port-reroute", "906", "905"]).unwrap();

        assert_eq!(config.request().origin, PortCode::new(906));
        assert_eq!(config.request().disrupted, PortCode::new(905));
        assert_eq!(config.data_dir(), DEFAULT_DATA_DIR);
        assert_eq!(config.ranking(), RankingOptions::default());
        assert!(config.geocoder().is_none());
        assert!(config.download().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ranking_flags() {
        let config = CliConfig::try_parse_from([
            "port-reroute",
            "906",
            "905",
            "--limit",
            "3",
            "--neighbor-limit",
            "2",
            "--sort-neighbors",
            "--geocode",
        ])
        .unwrap();

        let ranking = config.ranking();
        assert_eq!(ranking.limit, 3);
        assert_eq!(ranking.neighbor_limit, Some(2));
        assert!(ranking.sort_neighbors_by_distance);
        assert!(config.geocoder().is_some());
    }

    #[test]
    fn test_rejects_non_numeric_port_and_zero_limit() {
        assert!(CliConfig::try_parse_from(["port-reroute", "SAI", "905"]).is_err());

        let config =
            CliConfig::try_parse_from(["port-reroute", "906", "905", "--limit", "0"]).unwrap();
        assert!(config.validate().is_err());
    }
}
