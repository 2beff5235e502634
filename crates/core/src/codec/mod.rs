//! Wire codecs: static code tables (C1), the ML bus decoder (C2), and the
//! MLGW binary frame codec (C3).

pub mod ml;
pub mod mlgw;
pub mod tables;
