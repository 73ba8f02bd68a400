// Domain layer: parcel models and the ports the fetch pipeline is built on.

pub mod model;
pub mod ports;
