// Domain layer: identifiers, records and ports. No I/O here.

pub mod cusip;
pub mod model;
pub mod ports;
