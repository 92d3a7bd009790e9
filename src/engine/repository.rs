//! Immutable rate snapshots and the repository that publishes them.
//!
//! A `RateSnapshot` is built once (from CSV files or in tests directly) and
//! never mutated. `RateRepository` swaps whole snapshots; quotes hold an
//! `Arc` to the snapshot they started with, so no lookup ever straddles two
//! table versions.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::info;

use crate::domain::{
    normalize_rate_set, AccessorialCost, AccessorialTable, MileageBand, Mode, QuoteWarning,
    RateTable, RateTableEntry, WeightBreak, ZipZone, ZoneId, ZoneKey, ZonePair,
    DEFAULT_RATE_SET,
};

use super::error::QuoteError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct RateKey {
    rate_set: String,
    mode: Mode,
    zone: ZoneKey,
}

/// Problems found while assembling a snapshot.
#[derive(Debug, Error, PartialEq)]
pub enum SnapshotError {
    #[error("ZIP {0} appears more than once in the zone table")]
    DuplicateZip(String),
    #[error("duplicate weight break {max_weight} lbs for {mode} {zone} in rate set `{rate_set}`")]
    DuplicateBreak {
        rate_set: String,
        mode: Mode,
        zone: ZoneKey,
        max_weight: Decimal,
    },
    #[error("band `{label}` ({mode}, rate set `{rate_set}`) is declared with different mileage bounds")]
    InconsistentBand {
        rate_set: String,
        mode: Mode,
        label: String,
    },
    #[error("bands `{first}` and `{second}` overlap ({mode}, rate set `{rate_set}`)")]
    OverlappingBands {
        rate_set: String,
        mode: Mode,
        first: String,
        second: String,
    },
    #[error("band `{label}` has min miles above max miles")]
    InvertedBand { label: String },
    #[error("negative {what}: {value}")]
    NegativeAmount { what: String, value: Decimal },
    #[error("duplicate accessorial code `{0}`")]
    DuplicateAccessorial(String),
    #[error("more than one fuel rate for {0}")]
    DuplicateFuelRate(Mode),
}

/// Accumulates rows, validating everything in [`RateSnapshotBuilder::build`].
#[derive(Debug, Default)]
pub struct RateSnapshotBuilder {
    zip_zones: Vec<(String, ZipZone)>,
    breaks: Vec<(RateKey, WeightBreak)>,
    bands: Vec<(String, Mode, MileageBand)>,
    accessorials: Vec<AccessorialCost>,
    fuel: Vec<(Mode, Decimal)>,
}

impl RateSnapshotBuilder {
    pub fn zip_zone(&mut self, zip: impl Into<String>, zone: ZoneId, beyond: bool) -> &mut Self {
        self.zip_zones.push((zip.into(), ZipZone { zone, beyond }));
        self
    }

    pub fn zone_rate(
        &mut self,
        rate_set: &str,
        mode: Mode,
        pair: ZonePair,
        max_weight: Decimal,
        rate: Decimal,
    ) -> &mut Self {
        self.push_break(rate_set, mode, ZoneKey::Standard(pair), max_weight, rate)
    }

    pub fn beyond_rate(
        &mut self,
        rate_set: &str,
        mode: Mode,
        pair: ZonePair,
        max_weight: Decimal,
        rate: Decimal,
    ) -> &mut Self {
        self.push_break(rate_set, mode, ZoneKey::Beyond(pair), max_weight, rate)
    }

    /// A mileage band row: declares the band and one weight break for it.
    pub fn band_rate(
        &mut self,
        rate_set: &str,
        mode: Mode,
        band: MileageBand,
        max_weight: Decimal,
        rate: Decimal,
    ) -> &mut Self {
        let label = band.label.clone();
        self.bands.push((normalize_rate_set(Some(rate_set)), mode, band));
        self.push_break(rate_set, mode, ZoneKey::Band(label), max_weight, rate)
    }

    pub fn accessorial(&mut self, cost: AccessorialCost) -> &mut Self {
        self.accessorials.push(cost);
        self
    }

    pub fn fuel_rate(&mut self, mode: Mode, rate: Decimal) -> &mut Self {
        self.fuel.push((mode, rate));
        self
    }

    fn push_break(
        &mut self,
        rate_set: &str,
        mode: Mode,
        zone: ZoneKey,
        max_weight: Decimal,
        rate: Decimal,
    ) -> &mut Self {
        let key = RateKey {
            rate_set: normalize_rate_set(Some(rate_set)),
            mode,
            zone,
        };
        self.breaks.push((key, WeightBreak { max_weight, rate }));
        self
    }

    pub fn build(&self, version: u64) -> Result<RateSnapshot, SnapshotError> {
        let mut zip_zones = HashMap::with_capacity(self.zip_zones.len());
        for (zip, zone) in &self.zip_zones {
            if zip_zones.insert(zip.clone(), *zone).is_some() {
                return Err(SnapshotError::DuplicateZip(zip.clone()));
            }
        }

        let mut grouped: BTreeMap<RateKey, Vec<WeightBreak>> = BTreeMap::new();
        for (key, weight_break) in &self.breaks {
            for (what, value) in [
                ("rate", weight_break.rate),
                ("max weight", weight_break.max_weight),
            ] {
                if value < Decimal::ZERO {
                    return Err(SnapshotError::NegativeAmount {
                        what: format!("{what} for {} {}", key.mode, key.zone),
                        value,
                    });
                }
            }
            let breaks = grouped.entry(key.clone()).or_default();
            if breaks
                .iter()
                .any(|existing| existing.max_weight == weight_break.max_weight)
            {
                return Err(SnapshotError::DuplicateBreak {
                    rate_set: key.rate_set.clone(),
                    mode: key.mode,
                    zone: key.zone.clone(),
                    max_weight: weight_break.max_weight,
                });
            }
            breaks.push(*weight_break);
        }
        let rates = grouped
            .into_iter()
            .map(|(key, breaks)| (key, RateTable::new(breaks)))
            .collect();

        let bands = build_bands(&self.bands)?;

        let mut accessorials = AccessorialTable::default();
        for cost in &self.accessorials {
            if cost.amount < Decimal::ZERO {
                return Err(SnapshotError::NegativeAmount {
                    what: format!("accessorial `{}`", cost.code),
                    value: cost.amount,
                });
            }
            if accessorials.insert(cost.clone()).is_some() {
                return Err(SnapshotError::DuplicateAccessorial(cost.code.clone()));
            }
        }

        let mut fuel = HashMap::new();
        for (mode, rate) in &self.fuel {
            if *rate < Decimal::ZERO {
                return Err(SnapshotError::NegativeAmount {
                    what: format!("{mode} fuel rate"),
                    value: *rate,
                });
            }
            if fuel.insert(*mode, *rate).is_some() {
                return Err(SnapshotError::DuplicateFuelRate(*mode));
            }
        }

        Ok(RateSnapshot {
            version,
            loaded_at: OffsetDateTime::now_utc(),
            zip_zones,
            rates,
            bands,
            accessorials,
            fuel,
        })
    }
}

fn build_bands(
    rows: &[(String, Mode, MileageBand)],
) -> Result<HashMap<(String, Mode), Vec<MileageBand>>, SnapshotError> {
    let mut bands: HashMap<(String, Mode), Vec<MileageBand>> = HashMap::new();
    for (rate_set, mode, band) in rows {
        if band.min_miles > band.max_miles {
            return Err(SnapshotError::InvertedBand {
                label: band.label.clone(),
            });
        }
        let declared = bands.entry((rate_set.clone(), *mode)).or_default();
        match declared.iter().find(|existing| existing.label == band.label) {
            Some(existing) if existing != band => {
                return Err(SnapshotError::InconsistentBand {
                    rate_set: rate_set.clone(),
                    mode: *mode,
                    label: band.label.clone(),
                });
            }
            Some(_) => {}
            None => declared.push(band.clone()),
        }
    }

    for ((rate_set, mode), declared) in bands.iter_mut() {
        declared.sort_by(|a, b| a.min_miles.total_cmp(&b.min_miles));
        for pair in declared.windows(2) {
            if pair[1].min_miles < pair[0].max_miles {
                return Err(SnapshotError::OverlappingBands {
                    rate_set: rate_set.clone(),
                    mode: *mode,
                    first: pair[0].label.clone(),
                    second: pair[1].label.clone(),
                });
            }
        }
    }
    Ok(bands)
}

/// Result of a rate lookup: the base entry plus everything the surcharge
/// step needs.
#[derive(Debug)]
pub struct RateLookup<'a> {
    pub entry: RateTableEntry,
    pub accessorials: &'a AccessorialTable,
    pub fuel_rate: Decimal,
    pub warnings: Vec<QuoteWarning>,
}

/// One consistent version of all rate and zone tables.
#[derive(Debug)]
pub struct RateSnapshot {
    version: u64,
    loaded_at: OffsetDateTime,
    zip_zones: HashMap<String, ZipZone>,
    rates: HashMap<RateKey, RateTable>,
    bands: HashMap<(String, Mode), Vec<MileageBand>>,
    accessorials: AccessorialTable,
    fuel: HashMap<Mode, Decimal>,
}

impl RateSnapshot {
    pub fn builder() -> RateSnapshotBuilder {
        RateSnapshotBuilder::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn zip_zone(&self, zip: &str) -> Option<ZipZone> {
        self.zip_zones.get(zip).copied()
    }

    pub fn accessorials(&self) -> &AccessorialTable {
        &self.accessorials
    }

    pub fn fuel_rate(&self, mode: Mode) -> Option<Decimal> {
        self.fuel.get(&mode).copied()
    }

    fn table(&self, rate_set: &str, mode: Mode, zone: &ZoneKey) -> Option<&RateTable> {
        self.rates.get(&RateKey {
            rate_set: rate_set.to_string(),
            mode,
            zone: zone.clone(),
        })
    }

    /// Table for `zone` in `rate_set`, falling back to the default set.
    /// Returns the rate set actually used.
    fn table_with_fallback<'a>(
        &'a self,
        rate_set: &'a str,
        mode: Mode,
        zone: &ZoneKey,
    ) -> Option<(&'a str, &'a RateTable)> {
        if let Some(table) = self.table(rate_set, mode, zone) {
            return Some((rate_set, table));
        }
        if rate_set != DEFAULT_RATE_SET {
            return self
                .table(DEFAULT_RATE_SET, mode, zone)
                .map(|table| (DEFAULT_RATE_SET, table));
        }
        None
    }

    pub fn has_rate(&self, rate_set: &str, mode: Mode, zone: &ZoneKey) -> bool {
        self.table_with_fallback(rate_set, mode, zone).is_some()
    }

    /// Mileage bands for `mode`, taken from `rate_set` when it defines any,
    /// otherwise from the default set.
    pub fn bands(&self, rate_set: &str, mode: Mode) -> &[MileageBand] {
        self.bands
            .get(&(rate_set.to_string(), mode))
            .or_else(|| self.bands.get(&(DEFAULT_RATE_SET.to_string(), mode)))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Base rate for (`mode`, `zone`) at `weight`, with the accessorial
    /// table and the mode's fuel rate.
    pub fn lookup(
        &self,
        mode: Mode,
        rate_set: &str,
        zone: &ZoneKey,
        weight: Decimal,
    ) -> Result<RateLookup<'_>, QuoteError> {
        let (used_set, table) =
            self.table_with_fallback(rate_set, mode, zone)
                .ok_or_else(|| QuoteError::ZoneNotRated {
                    mode,
                    zone: zone.clone(),
                    rate_set: rate_set.to_string(),
                })?;

        let fuel_rate = self.fuel_rate(mode).ok_or_else(|| QuoteError::NotReady {
            missing: vec![format!("fuel_surcharges ({mode})")],
        })?;

        let selection = table.select(weight).ok_or_else(|| QuoteError::ZoneNotRated {
            mode,
            zone: zone.clone(),
            rate_set: used_set.to_string(),
        })?;

        let mut warnings = Vec::new();
        if used_set != rate_set {
            warnings.push(QuoteWarning::RateSetFallback {
                requested: rate_set.to_string(),
                used: used_set.to_string(),
            });
        }
        if selection.capped {
            warnings.push(QuoteWarning::WeightBeyondTopBreak {
                weight,
                top_break: selection.selected.max_weight,
            });
        }

        Ok(RateLookup {
            entry: RateTableEntry {
                rate_set: used_set.to_string(),
                mode,
                zone_key: zone.clone(),
                max_weight: selection.selected.max_weight,
                base_rate: selection.selected.rate,
            },
            accessorials: &self.accessorials,
            fuel_rate,
            warnings,
        })
    }

    /// Tables that must be present before `mode` can be quoted.
    pub fn missing_tables(&self, mode: Mode) -> Vec<String> {
        let mut missing = Vec::new();
        if self.zip_zones.is_empty() {
            missing.push("zip_zones".to_string());
        }
        if !self.rates.keys().any(|key| key.mode == mode) {
            missing.push(format!("rate tables ({mode})"));
        }
        if !self.fuel.contains_key(&mode) {
            missing.push(format!("fuel_surcharges ({mode})"));
        }
        missing
    }

    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            version: self.version,
            zip_zones: self.zip_zones.len(),
            rate_tables: self.rates.len(),
            mileage_bands: self.bands.values().map(Vec::len).sum(),
            accessorials: self.accessorials.len(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SnapshotSummary {
    pub version: u64,
    pub zip_zones: usize,
    pub rate_tables: usize,
    pub mileage_bands: usize,
    pub accessorials: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Readiness {
    Ready { version: u64 },
    NotReady { missing: Vec<String> },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready { .. })
    }
}

/// Publishes the current snapshot. The lock is held only to clone or swap
/// the `Arc`.
#[derive(Debug, Default)]
pub struct RateRepository {
    current: RwLock<Option<Arc<RateSnapshot>>>,
}

impl RateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: RateSnapshot) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(snapshot))),
        }
    }

    pub fn snapshot(&self) -> Option<Arc<RateSnapshot>> {
        self.current.read().clone()
    }

    pub fn current_version(&self) -> Option<u64> {
        self.current.read().as_ref().map(|snapshot| snapshot.version)
    }

    /// Publishes `snapshot` and returns its version. The first snapshot keeps
    /// the version it was built with; each later one is numbered one past the
    /// snapshot it replaces, assigned under the write lock.
    pub fn install(&self, mut snapshot: RateSnapshot) -> u64 {
        let mut current = self.current.write();
        let previous_version = current.as_ref().map(|old| old.version);
        if let Some(previous) = previous_version {
            snapshot.version = previous + 1;
        }
        let summary = snapshot.summary();
        let loaded_at = snapshot.loaded_at;
        *current = Some(Arc::new(snapshot));
        drop(current);

        info!(
            version = summary.version,
            %loaded_at,
            ?previous_version,
            zip_zones = summary.zip_zones,
            rate_tables = summary.rate_tables,
            mileage_bands = summary.mileage_bands,
            accessorials = summary.accessorials,
            "installed rate snapshot"
        );
        summary.version
    }

    /// Ready only when every mode has the tables it needs.
    pub fn readiness(&self) -> Readiness {
        let Some(snapshot) = self.snapshot() else {
            return Readiness::NotReady {
                missing: vec!["rate snapshot".to_string()],
            };
        };
        let mut missing: Vec<String> = Vec::new();
        for mode in Mode::ALL {
            for table in snapshot.missing_tables(mode) {
                if !missing.contains(&table) {
                    missing.push(table);
                }
            }
        }
        if missing.is_empty() {
            Readiness::Ready {
                version: snapshot.version,
            }
        } else {
            Readiness::NotReady { missing }
        }
    }
}
