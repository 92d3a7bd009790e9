//! Freight quote pricing for Hotshot ground and Air shipments.
//!
//! A request is resolved to a rating key (zone pair, beyond-zone pair or
//! mileage band), priced from an immutable rate snapshot, surcharged, and
//! checked against the tool's limits. See [`engine::QuoteEngine`].

pub mod domain;
pub mod engine;
pub mod infra;
pub mod util;

pub use domain::{Mode, QuoteResult, QuoteWarning, ShipmentRequest};
pub use engine::{QuoteEngine, QuoteError, QuotePayload, RateRepository, RateSnapshot, Readiness};
pub use infra::distance::{DistanceProvider, MapsDistanceClient};
pub use util::config::EngineConfig;
