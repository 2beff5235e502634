//! Protocol engine for a Bang & Olufsen MasterLink Gateway: the two wire
//! codecs, the two long-lived sessions, the per-device state tracker, the
//! gateway facade, and the event publisher.

pub mod codec;
pub mod error;
pub mod events;
pub mod gateway;
pub mod model;
pub mod session;
pub mod tracker;

pub use error::{Error, Result};
pub use gateway::{Gateway, GatewayConfig};
pub use model::{GatewayState, Product};
