use crate::adapters::downloader::DownloadSettings;
use crate::adapters::geocoder::GeocoderSettings;
use crate::core::ConfigProvider;
use crate::domain::model::{DeclarationKind, FlowLayout, RankingOptions};
use crate::utils::error::{RerouteError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub trade_flows: TradeFlowsConfig,
    #[serde(default)]
    pub ranking: RankingOptions,
    pub geocoder: Option<GeocoderSettings>,
    pub download: Option<DownloadSettings>,
    pub monitoring: Option<MonitoringConfig>,
    /// Set by `--download`; acquisition never runs implicitly during a reroute.
    #[serde(skip)]
    pub download_requested: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "PathsConfig::default_data_dir")]
    pub data_dir: String,
    #[serde(default = "PathsConfig::default_directory")]
    pub directory: String,
    #[serde(default = "PathsConfig::default_output_path")]
    pub output_path: String,
}

impl PathsConfig {
    fn default_data_dir() -> String {
        super::DEFAULT_DATA_DIR.to_string()
    }

    fn default_directory() -> String {
        super::DEFAULT_DIRECTORY_PATH.to_string()
    }

    fn default_output_path() -> String {
        super::DEFAULT_OUTPUT_PATH.to_string()
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
            directory: Self::default_directory(),
            output_path: Self::default_output_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeFlowsConfig {
    #[serde(default)]
    pub imports: FlowLayout,
    #[serde(default)]
    pub exports: FlowLayout,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub json_logs: bool,
}

impl TomlConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| RerouteError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value. Unset variables are left as-is.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| {
            RerouteError::ConfigValidationError {
                field: "environment".to_string(),
                message: e.to_string(),
            }
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.into_owned())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_path("paths.data_dir", &self.paths.data_dir)?;
        validation::validate_path("paths.directory", &self.paths.directory)?;
        validation::validate_path("paths.output_path", &self.paths.output_path)?;
        validation::validate_positive_number("ranking.limit", self.ranking.limit, 1)?;
        if let Some(neighbor_limit) = self.ranking.neighbor_limit {
            validation::validate_positive_number("ranking.neighbor_limit", neighbor_limit, 1)?;
        }

        if let Some(geocoder) = &self.geocoder {
            validation::validate_url("geocoder.endpoint", &geocoder.endpoint)?;
            validation::validate_non_empty_string("geocoder.user_agent", &geocoder.user_agent)?;
            validation::validate_positive_number(
                "geocoder.retry_attempts",
                geocoder.retry_attempts as usize,
                1,
            )?;
        }

        if let Some(download) = &self.download {
            validation::validate_path("download.download_dir", &download.download_dir)?;
            validation::validate_range("download.workers", download.workers, 1, 64)?;
            validation::validate_positive_number(
                "download.retry_attempts",
                download.retry_attempts as usize,
                1,
            )?;
            for source in &download.sources {
                validation::validate_url("download.sources.url", &source.url)?;
                if let Some(parts) = source.parts {
                    validation::validate_range("download.sources.parts", parts, 1, 99)?;
                    if !source.url.contains(crate::adapters::downloader::PART_PLACEHOLDER) {
                        return Err(RerouteError::InvalidConfigValueError {
                            field: "download.sources.url".to_string(),
                            value: source.url.clone(),
                            reason: "multi-part sources need a {part} placeholder".to_string(),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Applies command-line flags on top of the file values.
    #[cfg(feature = "cli")]
    pub fn with_cli_overrides(mut self, cli: &super::CliConfig) -> Self {
        if let Some(data_dir) = &cli.data_dir {
            self.paths.data_dir = data_dir.clone();
        }
        if let Some(directory) = &cli.directory {
            self.paths.directory = directory.clone();
        }
        if let Some(output_path) = &cli.output_path {
            self.paths.output_path = output_path.clone();
        }
        self.ranking = cli.ranking_over(self.ranking);
        if cli.geocode {
            self.geocoder.get_or_insert_with(GeocoderSettings::default).enabled = true;
        }
        if cli.monitor || cli.json_logs {
            let monitoring = self.monitoring.get_or_insert_with(MonitoringConfig::default);
            monitoring.enabled |= cli.monitor;
            monitoring.json_logs |= cli.json_logs;
        }
        self.download_requested = cli.download;
        self
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    pub fn json_logs(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.json_logs).unwrap_or(false)
    }
}

impl ConfigProvider for TomlConfig {
    fn data_dir(&self) -> &str {
        &self.paths.data_dir
    }

    fn directory_path(&self) -> &str {
        &self.paths.directory
    }

    fn output_path(&self) -> &str {
        &self.paths.output_path
    }

    fn flow_layout(&self, kind: DeclarationKind) -> &FlowLayout {
        match kind {
            DeclarationKind::Import => &self.trade_flows.imports,
            DeclarationKind::Export => &self.trade_flows.exports,
        }
    }

    fn ranking(&self) -> RankingOptions {
        self.ranking
    }

    fn geocoder(&self) -> Option<&GeocoderSettings> {
        self.geocoder.as_ref().filter(|g| g.enabled)
    }

    fn download(&self) -> Option<&DownloadSettings> {
        self.download.as_ref().filter(|_| self.download_requested)
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
