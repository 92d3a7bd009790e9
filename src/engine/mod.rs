//! Quote pipeline: resolve the lane, look up the rate, add surcharges,
//! check tool limits.

pub mod error;
pub mod limits;
pub mod quote_engine;
pub mod repository;
pub mod resolver;
pub mod submission;
pub mod surcharge;

pub use error::{ErrorKind, ErrorPayload, QuoteError, QuoteStage, ZipField};
pub use limits::{PricedShipment, WarningRule, WarningRules};
pub use quote_engine::{QuoteEngine, SubmitError};
pub use repository::{
    RateLookup, RateRepository, RateSnapshot, RateSnapshotBuilder, Readiness, SnapshotError,
    SnapshotSummary,
};
pub use resolver::{ResolvedZone, ZoneResolver};
pub use submission::QuotePayload;
