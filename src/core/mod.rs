pub mod attributes;
pub mod disruption;
pub mod engine;
pub mod geo;
pub mod graph;
pub mod ranker;
pub mod reroute;

pub use crate::domain::model::{RerouteReport, TradeFlowBatch};
pub use crate::domain::ports::{ConfigProvider, Geocoder, Pipeline, Storage};
pub use crate::utils::error::Result;
