// Domain layer: port-network models and the seams (traits) adapters implement.

pub mod model;
pub mod ports;
