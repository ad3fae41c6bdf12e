// Adapters layer: concrete implementations of the domain ports and the
// collaborators that feed the core (files, directory, geocoder, downloads).

pub mod directory;
pub mod downloader;
pub mod geocoder;
pub mod storage;
pub mod trade_flow;
