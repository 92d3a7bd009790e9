//! Reference data the engine prices against: zones, weight breaks, mileage
//! bands and accessorial costs.

use std::collections::HashMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::shipment::Mode;

/// Numeric zone assigned to a ZIP code (`Dest Zone` in the zone table).
pub type ZoneId = u16;

/// Zone classification of a single ZIP.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZipZone {
    pub zone: ZoneId,
    /// Outside standard coverage; rated from the beyond-zone table.
    pub beyond: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZonePair {
    pub origin: ZoneId,
    pub destination: ZoneId,
}

impl ZonePair {
    pub fn new(origin: ZoneId, destination: ZoneId) -> Self {
        Self {
            origin,
            destination,
        }
    }
}

impl fmt::Display for ZonePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.origin, self.destination)
    }
}

/// Key of a rate table within a mode and rate set.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ZoneKey {
    Standard(ZonePair),
    Beyond(ZonePair),
    Band(String),
}

impl fmt::Display for ZoneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneKey::Standard(pair) => write!(f, "zone {pair}"),
            ZoneKey::Beyond(pair) => write!(f, "BEYOND {pair}"),
            ZoneKey::Band(label) => write!(f, "band {label}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightBreak {
    /// Inclusive upper bound in pounds.
    pub max_weight: Decimal,
    pub rate: Decimal,
}

/// Outcome of picking a weight break for a shipment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BreakSelection {
    pub selected: WeightBreak,
    /// The weight exceeded every break and the top tier was used.
    pub capped: bool,
}

/// Ordered, non-overlapping weight breaks for one rate key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateTable {
    breaks: Vec<WeightBreak>,
}

impl RateTable {
    /// Callers guarantee `breaks` is non-empty with distinct upper bounds.
    pub(crate) fn new(mut breaks: Vec<WeightBreak>) -> Self {
        breaks.sort_by(|a, b| a.max_weight.cmp(&b.max_weight));
        Self { breaks }
    }

    pub fn breaks(&self) -> &[WeightBreak] {
        &self.breaks
    }

    /// Lowest break whose upper bound covers `weight`, or the top break
    /// (flagged as capped) when the weight exceeds all of them.
    pub fn select(&self, weight: Decimal) -> Option<BreakSelection> {
        if let Some(found) = self.breaks.iter().find(|b| b.max_weight >= weight) {
            return Some(BreakSelection {
                selected: *found,
                capped: false,
            });
        }
        self.breaks.last().map(|top| BreakSelection {
            selected: *top,
            capped: true,
        })
    }
}

/// Mileage range used when a ZIP pair is rated by road distance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MileageBand {
    pub label: String,
    pub min_miles: f64,
    pub max_miles: f64,
}

impl MileageBand {
    pub fn contains(&self, miles: f64) -> bool {
        miles >= self.min_miles && miles <= self.max_miles
    }

    fn gap_to(&self, miles: f64) -> f64 {
        if miles < self.min_miles {
            self.min_miles - miles
        } else if miles > self.max_miles {
            miles - self.max_miles
        } else {
            0.0
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BandFit {
    Within,
    /// Fell between two bands; the nearest one was chosen.
    Nearest,
    /// Beyond every band; the highest band was chosen.
    AboveAll,
}

/// Buckets `miles` into `bands` (sorted ascending by `min_miles`).
/// Ties between two equally near bands go to the higher band.
pub fn bucket_miles(bands: &[MileageBand], miles: f64) -> Option<(&MileageBand, BandFit)> {
    if let Some(band) = bands.iter().find(|band| band.contains(miles)) {
        return Some((band, BandFit::Within));
    }

    let top = bands.last()?;
    if miles > top.max_miles {
        return Some((top, BandFit::AboveAll));
    }

    let mut nearest = &bands[0];
    for band in &bands[1..] {
        if band.gap_to(miles) <= nearest.gap_to(miles) {
            nearest = band;
        }
    }
    Some((nearest, BandFit::Nearest))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessorialKind {
    Flat,
    /// Amount per billable pound.
    PerPound,
    /// Percentage of the base rate.
    Percent,
}

impl AccessorialKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "flat" => Some(Self::Flat),
            "per_lb" | "per_pound" => Some(Self::PerPound),
            "percent" | "percentage" => Some(Self::Percent),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessorialCost {
    pub code: String,
    pub name: String,
    pub kind: AccessorialKind,
    pub amount: Decimal,
    pub modes: Vec<Mode>,
}

impl AccessorialCost {
    pub fn applies_to(&self, mode: Mode) -> bool {
        self.modes.contains(&mode)
    }

    /// Charge for this accessorial given the base rate and billable weight,
    /// or `None` if it overflows.
    pub fn charge(&self, base_rate: Decimal, billable_weight: Decimal) -> Option<Decimal> {
        match self.kind {
            AccessorialKind::Flat => Some(self.amount),
            AccessorialKind::PerPound => self.amount.checked_mul(billable_weight),
            AccessorialKind::Percent => base_rate
                .checked_mul(self.amount)?
                .checked_div(Decimal::ONE_HUNDRED),
        }
    }
}

/// Accessorial costs keyed by case-insensitive service code.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessorialTable {
    by_code: HashMap<String, AccessorialCost>,
}

impl AccessorialTable {
    pub fn insert(&mut self, cost: AccessorialCost) -> Option<AccessorialCost> {
        self.by_code.insert(cost.code.trim().to_ascii_lowercase(), cost)
    }

    pub fn get(&self, code: &str) -> Option<&AccessorialCost> {
        self.by_code.get(&code.trim().to_ascii_lowercase())
    }

    /// Codes offered for `mode`, sorted for stable presentation.
    pub fn options(&self, mode: Mode) -> Vec<&AccessorialCost> {
        let mut options: Vec<_> = self
            .by_code
            .values()
            .filter(|cost| cost.applies_to(mode))
            .collect();
        options.sort_by(|a, b| a.code.cmp(&b.code));
        options
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

/// The break a quote was priced from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateTableEntry {
    pub rate_set: String,
    pub mode: Mode,
    pub zone_key: ZoneKey,
    pub max_weight: Decimal,
    pub base_rate: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn table() -> RateTable {
        RateTable::new(vec![
            WeightBreak {
                max_weight: dec!(500),
                rate: dec!(200),
            },
            WeightBreak {
                max_weight: dec!(100),
                rate: dec!(150),
            },
            WeightBreak {
                max_weight: dec!(1000),
                rate: dec!(300),
            },
        ])
    }

    #[test]
    fn weight_at_break_uses_that_break() {
        let selection = table().select(dec!(100)).unwrap();
        assert_eq!(selection.selected.rate, dec!(150));
        assert!(!selection.capped);
    }

    #[test]
    fn weight_just_above_break_uses_next() {
        let selection = table().select(dec!(101)).unwrap();
        assert_eq!(selection.selected.rate, dec!(200));
    }

    #[test]
    fn weight_above_all_breaks_is_capped() {
        let selection = table().select(dec!(5000)).unwrap();
        assert_eq!(selection.selected.rate, dec!(300));
        assert!(selection.capped);
    }

    fn bands() -> Vec<MileageBand> {
        vec![
            MileageBand {
                label: "0-100".into(),
                min_miles: 0.0,
                max_miles: 100.0,
            },
            MileageBand {
                label: "200-300".into(),
                min_miles: 200.0,
                max_miles: 300.0,
            },
            MileageBand {
                label: "300-400".into(),
                min_miles: 300.01,
                max_miles: 400.0,
            },
        ]
    }

    #[test]
    fn bucket_within_band() {
        let bands = bands();
        let (band, fit) = bucket_miles(&bands, 310.0).unwrap();
        assert_eq!(band.label, "300-400");
        assert_eq!(fit, BandFit::Within);
    }

    #[test]
    fn bucket_gap_picks_nearest() {
        let bands = bands();
        let (band, fit) = bucket_miles(&bands, 120.0).unwrap();
        assert_eq!(band.label, "0-100");
        assert_eq!(fit, BandFit::Nearest);

        let (band, _) = bucket_miles(&bands, 150.0).unwrap();
        assert_eq!(band.label, "200-300", "ties go to the higher band");
    }

    #[test]
    fn bucket_above_all_uses_top_band() {
        let bands = bands();
        let (band, fit) = bucket_miles(&bands, 900.0).unwrap();
        assert_eq!(band.label, "300-400");
        assert_eq!(fit, BandFit::AboveAll);
        assert!(bucket_miles(&[], 10.0).is_none());
    }

    #[test]
    fn accessorial_charges_by_kind() {
        let mut cost = AccessorialCost {
            code: "liftgate".into(),
            name: "Liftgate".into(),
            kind: AccessorialKind::Flat,
            amount: dec!(75),
            modes: vec![Mode::Hotshot],
        };
        assert_eq!(cost.charge(dec!(200), dec!(40)), Some(dec!(75)));

        cost.kind = AccessorialKind::PerPound;
        cost.amount = dec!(0.25);
        assert_eq!(cost.charge(dec!(200), dec!(40)), Some(dec!(10)));

        cost.kind = AccessorialKind::Percent;
        cost.amount = dec!(25);
        assert_eq!(cost.charge(dec!(200), dec!(40)), Some(dec!(50)));

        cost.kind = AccessorialKind::PerPound;
        cost.amount = dec!(5);
        assert_eq!(cost.charge(dec!(200), Decimal::MAX), None);
    }

    #[test]
    fn accessorial_lookup_ignores_case() {
        let mut table = AccessorialTable::default();
        table.insert(AccessorialCost {
            code: "Liftgate".into(),
            name: "Liftgate".into(),
            kind: AccessorialKind::Flat,
            amount: dec!(75),
            modes: vec![Mode::Hotshot, Mode::Air],
        });
        assert!(table.get(" LIFTGATE ").is_some());
        assert_eq!(table.options(Mode::Air).len(), 1);
    }
}
