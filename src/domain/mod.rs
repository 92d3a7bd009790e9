//! Shipment, rate and quote types shared by the engine and its collaborators.

pub mod quote;
pub mod rates;
pub mod shipment;

pub use quote::{
    AccessorialCharge, PricingBreakdown, QuoteParts, QuoteResult, QuoteWarning, ResolutionSource,
};
pub use rates::{
    bucket_miles, AccessorialCost, AccessorialKind, AccessorialTable, BandFit, BreakSelection,
    MileageBand, RateTable, RateTableEntry, WeightBreak, ZipZone, ZoneId, ZoneKey, ZonePair,
};
pub use shipment::{
    normalize_rate_set, Dimensions, Mode, ShipmentRequest, UnknownMode, WeightMethod, Zip,
    DEFAULT_RATE_SET,
};
