//! The two long-lived TCP sessions (C4, C5).

pub mod mlgw;
pub mod trace;
