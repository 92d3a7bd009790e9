use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::rates::{ZoneId, ZoneKey};
use super::shipment::{Mode, WeightMethod, Zip};

/// Non-fatal condition attached to an otherwise complete quote.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuoteWarning {
    WeightExceedsToolLimit { weight: Decimal, limit: Decimal },
    CostExceedsToolLimit { total: Decimal, limit: Decimal },
    PieceWeightExceedsLimit { per_piece: Decimal, limit: Decimal },
    WeightBeyondTopBreak { weight: Decimal, top_break: Decimal },
    ZoneNotFound { zip: Zip },
    BeyondZoneRate { pair: String },
    DistanceBetweenBands { miles: f64, band: String },
    DistanceBeyondBands { miles: f64, band: String },
    RateSetFallback { requested: String, used: String },
}

impl fmt::Display for QuoteWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WeightExceedsToolLimit { weight, limit } => write!(
                f,
                "Weight {weight} lbs exceeds tool limit of {limit} lbs; contact operations for an exact quote"
            ),
            Self::CostExceedsToolLimit { total, limit } => write!(
                f,
                "Cost ${total} exceeds tool limit of ${limit}; contact operations for an exact quote"
            ),
            Self::PieceWeightExceedsLimit { per_piece, limit } => write!(
                f,
                "Air pieces average {per_piece} lbs, above the {limit} lbs per-piece limit of this tool"
            ),
            Self::WeightBeyondTopBreak { weight, top_break } => write!(
                f,
                "Weight {weight} lbs exceeds tabulated weight breaks (top break {top_break} lbs); priced at top tier, manual review advised"
            ),
            Self::ZoneNotFound { zip } => {
                write!(f, "Zone not found for ZIP {zip}, rated by road distance")
            }
            Self::BeyondZoneRate { pair } => {
                write!(f, "ZIP outside standard coverage, using beyond-zone rate for {pair}")
            }
            Self::DistanceBetweenBands { miles, band } => write!(
                f,
                "Distance {miles:.1} mi falls between mileage bands, priced at nearest band {band}"
            ),
            Self::DistanceBeyondBands { miles, band } => write!(
                f,
                "Distance {miles:.1} mi exceeds tabulated mileage bands, priced at top band {band}"
            ),
            Self::RateSetFallback { requested, used } => write!(
                f,
                "Rate set `{requested}` has no rate for this lane, using `{used}`"
            ),
        }
    }
}

/// How the rating key for a quote was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    ZoneTable,
    BeyondTable,
    Distance,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessorialCharge {
    pub code: String,
    pub name: String,
    pub amount: Decimal,
}

/// Price composition. Components are kept at full precision; only `total`
/// is rounded to cents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingBreakdown {
    pub base_rate: Decimal,
    pub accessorials: Vec<AccessorialCharge>,
    pub accessorial_total: Decimal,
    pub fuel_rate: Decimal,
    pub fuel_surcharge: Decimal,
    pub total: Decimal,
}

/// A priced shipment. Built once by the engine; read-only afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuoteResult {
    origin: Zip,
    destination: Zip,
    mode: Mode,
    rate_set: String,
    actual_weight: Decimal,
    billable_weight: Decimal,
    weight_method: WeightMethod,
    pieces: u32,
    zone: ZoneKey,
    resolution: ResolutionSource,
    origin_zone: Option<ZoneId>,
    destination_zone: Option<ZoneId>,
    miles: Option<f64>,
    pricing: PricingBreakdown,
    policy_version: String,
    snapshot_version: u64,
    warnings: Vec<QuoteWarning>,
}

/// Field bag for [`QuoteResult::new`].
pub struct QuoteParts {
    pub origin: Zip,
    pub destination: Zip,
    pub mode: Mode,
    pub rate_set: String,
    pub actual_weight: Decimal,
    pub billable_weight: Decimal,
    pub weight_method: WeightMethod,
    pub pieces: u32,
    pub zone: ZoneKey,
    pub resolution: ResolutionSource,
    pub origin_zone: Option<ZoneId>,
    pub destination_zone: Option<ZoneId>,
    pub miles: Option<f64>,
    pub pricing: PricingBreakdown,
    pub policy_version: String,
    pub snapshot_version: u64,
    pub warnings: Vec<QuoteWarning>,
}

impl QuoteResult {
    pub fn new(parts: QuoteParts) -> Self {
        let QuoteParts {
            origin,
            destination,
            mode,
            rate_set,
            actual_weight,
            billable_weight,
            weight_method,
            pieces,
            zone,
            resolution,
            origin_zone,
            destination_zone,
            miles,
            pricing,
            policy_version,
            snapshot_version,
            warnings,
        } = parts;
        Self {
            origin,
            destination,
            mode,
            rate_set,
            actual_weight,
            billable_weight,
            weight_method,
            pieces,
            zone,
            resolution,
            origin_zone,
            destination_zone,
            miles,
            pricing,
            policy_version,
            snapshot_version,
            warnings,
        }
    }

    pub fn origin(&self) -> &Zip {
        &self.origin
    }

    pub fn destination(&self) -> &Zip {
        &self.destination
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn rate_set(&self) -> &str {
        &self.rate_set
    }

    pub fn actual_weight(&self) -> Decimal {
        self.actual_weight
    }

    pub fn billable_weight(&self) -> Decimal {
        self.billable_weight
    }

    pub fn weight_method(&self) -> WeightMethod {
        self.weight_method
    }

    pub fn pieces(&self) -> u32 {
        self.pieces
    }

    pub fn zone(&self) -> &ZoneKey {
        &self.zone
    }

    pub fn resolution(&self) -> ResolutionSource {
        self.resolution
    }

    pub fn origin_zone(&self) -> Option<ZoneId> {
        self.origin_zone
    }

    pub fn destination_zone(&self) -> Option<ZoneId> {
        self.destination_zone
    }

    pub fn miles(&self) -> Option<f64> {
        self.miles
    }

    pub fn pricing(&self) -> &PricingBreakdown {
        &self.pricing
    }

    pub fn base_rate(&self) -> Decimal {
        self.pricing.base_rate
    }

    pub fn accessorials(&self) -> &[AccessorialCharge] {
        &self.pricing.accessorials
    }

    pub fn fuel_surcharge(&self) -> Decimal {
        self.pricing.fuel_surcharge
    }

    pub fn total(&self) -> Decimal {
        self.pricing.total
    }

    pub fn policy_version(&self) -> &str {
        &self.policy_version
    }

    pub fn snapshot_version(&self) -> u64 {
        self.snapshot_version
    }

    pub fn warnings(&self) -> &[QuoteWarning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Warning texts in evaluation order, for display and email bodies.
    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(ToString::to_string).collect()
    }
}
