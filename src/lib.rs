pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::toml_config::TomlConfig;

pub use adapters::storage::LocalStorage;
pub use crate::core::{engine::RerouteEngine, reroute::ReroutePipeline};
pub use domain::model::{PortCode, RerouteReport, RerouteRequest};
pub use utils::error::{RerouteError, Result};
