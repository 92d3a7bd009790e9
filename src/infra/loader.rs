//! Builds a `RateSnapshot` from a directory of CSV tables.
//!
//! Headers must match exactly and in order. A missing file loads as an empty
//! table; readiness reporting then names it.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use csv::{ReaderBuilder, StringRecord, Trim};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{AccessorialCost, AccessorialKind, MileageBand, Mode, Zip, ZoneId, ZonePair};
use crate::engine::repository::{RateRepository, RateSnapshot, RateSnapshotBuilder, SnapshotError};

pub const ZIP_ZONES: &str = "zip_zones.csv";
pub const ZONE_RATES: &str = "zone_rates.csv";
pub const BEYOND_RATES: &str = "beyond_rates.csv";
pub const MILEAGE_RATES: &str = "mileage_rates.csv";
pub const ACCESSORIALS: &str = "accessorials.csv";
pub const FUEL_SURCHARGES: &str = "fuel_surcharges.csv";

const ZIP_ZONE_COLUMNS: &[&str] = &["Zipcode", "Dest Zone", "BEYOND"];
const PAIR_RATE_COLUMNS: &[&str] = &[
    "Rate Set",
    "Mode",
    "Origin Zone",
    "Dest Zone",
    "Max Weight",
    "Rate",
];
const MILEAGE_COLUMNS: &[&str] = &[
    "Rate Set",
    "Mode",
    "Band",
    "Min Miles",
    "Max Miles",
    "Max Weight",
    "Rate",
];
const ACCESSORIAL_COLUMNS: &[&str] = &["Code", "Name", "Kind", "Amount", "Modes"];
const FUEL_COLUMNS: &[&str] = &["Mode", "Fuel Rate"];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed CSV in {file}: {source}")]
    Csv {
        file: &'static str,
        #[source]
        source: csv::Error,
    },
    #[error("{file}: expected columns [{}], found [{}]", expected.join(", "), found.join(", "))]
    Columns {
        file: &'static str,
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("{file} line {line}: invalid {field} `{value}`")]
    Value {
        file: &'static str,
        line: u64,
        field: &'static str,
        value: String,
    },
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// One data row with its position, for error reporting.
struct Row {
    file: &'static str,
    line: u64,
    record: StringRecord,
}

impl Row {
    fn text(&self, index: usize) -> &str {
        self.record.get(index).map(str::trim).unwrap_or("")
    }

    fn invalid(&self, index: usize, field: &'static str) -> LoadError {
        LoadError::Value {
            file: self.file,
            line: self.line,
            field,
            value: self.text(index).to_string(),
        }
    }

    fn parse<T: FromStr>(&self, index: usize, field: &'static str) -> Result<T, LoadError> {
        self.text(index)
            .parse()
            .map_err(|_| self.invalid(index, field))
    }

    fn decimal(&self, index: usize, field: &'static str) -> Result<Decimal, LoadError> {
        let raw = self.text(index).trim_start_matches('$').replace(',', "");
        Decimal::from_str(&raw).map_err(|_| self.invalid(index, field))
    }

    fn mode(&self, index: usize) -> Result<Mode, LoadError> {
        self.parse(index, "mode")
    }

    fn zone(&self, index: usize, field: &'static str) -> Result<ZoneId, LoadError> {
        self.parse(index, field)
    }

    fn miles(&self, index: usize, field: &'static str) -> Result<f64, LoadError> {
        let miles: f64 = self.parse(index, field)?;
        if miles.is_finite() && miles >= 0.0 {
            Ok(miles)
        } else {
            Err(self.invalid(index, field))
        }
    }
}

fn read_table(dir: &Path, file: &'static str, expected: &[&str]) -> Result<Vec<Row>, LoadError> {
    let path = dir.join(file);
    if !path.exists() {
        warn!(path = %path.display(), "rate table file missing, loading as empty");
        return Ok(Vec::new());
    }

    let handle = File::open(&path).map_err(|source| LoadError::Io {
        path: path.clone(),
        source,
    })?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(handle);

    let found: Vec<String> = reader
        .headers()
        .map_err(|source| LoadError::Csv { file, source })?
        .iter()
        .map(|header| header.trim_start_matches('\u{feff}').trim().to_string())
        .collect();
    if found.iter().map(String::as_str).ne(expected.iter().copied()) {
        return Err(LoadError::Columns {
            file,
            expected: expected.iter().map(|col| col.to_string()).collect(),
            found,
        });
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|source| LoadError::Csv { file, source })?;
        if record.iter().all(|value| value.trim().is_empty()) {
            continue;
        }
        let line = record.position().map(|pos| pos.line()).unwrap_or(0);
        rows.push(Row { file, line, record });
    }
    Ok(rows)
}

fn load_zip_zones(dir: &Path, builder: &mut RateSnapshotBuilder) -> Result<usize, LoadError> {
    let rows = read_table(dir, ZIP_ZONES, ZIP_ZONE_COLUMNS)?;
    for row in &rows {
        let zip = Zip::parse(row.text(0)).ok_or_else(|| row.invalid(0, "zipcode"))?;
        let zone = row.zone(1, "dest zone")?;
        let beyond = match row.text(2).to_ascii_uppercase().as_str() {
            "Y" | "YES" | "TRUE" => true,
            "N" | "NO" | "FALSE" | "" => false,
            _ => return Err(row.invalid(2, "beyond flag")),
        };
        builder.zip_zone(zip.as_str(), zone, beyond);
    }
    Ok(rows.len())
}

fn load_pair_rates(
    dir: &Path,
    file: &'static str,
    beyond: bool,
    builder: &mut RateSnapshotBuilder,
) -> Result<usize, LoadError> {
    let rows = read_table(dir, file, PAIR_RATE_COLUMNS)?;
    for row in &rows {
        let rate_set = row.text(0);
        let mode = row.mode(1)?;
        let pair = ZonePair::new(row.zone(2, "origin zone")?, row.zone(3, "dest zone")?);
        let max_weight = row.decimal(4, "max weight")?;
        let rate = row.decimal(5, "rate")?;
        if beyond {
            builder.beyond_rate(rate_set, mode, pair, max_weight, rate);
        } else {
            builder.zone_rate(rate_set, mode, pair, max_weight, rate);
        }
    }
    Ok(rows.len())
}

fn load_mileage_rates(dir: &Path, builder: &mut RateSnapshotBuilder) -> Result<usize, LoadError> {
    let rows = read_table(dir, MILEAGE_RATES, MILEAGE_COLUMNS)?;
    for row in &rows {
        let label = row.text(2);
        if label.is_empty() {
            return Err(row.invalid(2, "band"));
        }
        let band = MileageBand {
            label: label.to_string(),
            min_miles: row.miles(3, "min miles")?,
            max_miles: row.miles(4, "max miles")?,
        };
        builder.band_rate(
            row.text(0),
            row.mode(1)?,
            band,
            row.decimal(5, "max weight")?,
            row.decimal(6, "rate")?,
        );
    }
    Ok(rows.len())
}

fn load_accessorials(dir: &Path, builder: &mut RateSnapshotBuilder) -> Result<usize, LoadError> {
    let rows = read_table(dir, ACCESSORIALS, ACCESSORIAL_COLUMNS)?;
    for row in &rows {
        let code = row.text(0);
        if code.is_empty() {
            return Err(row.invalid(0, "code"));
        }
        let kind = AccessorialKind::parse(row.text(2)).ok_or_else(|| row.invalid(2, "kind"))?;
        let modes = row
            .text(4)
            .split('|')
            .filter(|mode| !mode.trim().is_empty())
            .map(|mode| mode.parse::<Mode>().map_err(|_| row.invalid(4, "modes")))
            .collect::<Result<Vec<_>, _>>()?;
        if modes.is_empty() {
            return Err(row.invalid(4, "modes"));
        }
        builder.accessorial(AccessorialCost {
            code: code.to_string(),
            name: row.text(1).to_string(),
            kind,
            amount: row.decimal(3, "amount")?,
            modes,
        });
    }
    Ok(rows.len())
}

fn load_fuel(dir: &Path, builder: &mut RateSnapshotBuilder) -> Result<usize, LoadError> {
    let rows = read_table(dir, FUEL_SURCHARGES, FUEL_COLUMNS)?;
    for row in &rows {
        builder.fuel_rate(row.mode(0)?, row.decimal(1, "fuel rate")?);
    }
    Ok(rows.len())
}

/// Reads every table under `dir` into a snapshot tagged `version`.
pub fn load_snapshot(dir: &Path, version: u64) -> Result<RateSnapshot, LoadError> {
    let mut builder = RateSnapshot::builder();
    let zips = load_zip_zones(dir, &mut builder)?;
    let zone_rates = load_pair_rates(dir, ZONE_RATES, false, &mut builder)?;
    let beyond_rates = load_pair_rates(dir, BEYOND_RATES, true, &mut builder)?;
    let mileage_rates = load_mileage_rates(dir, &mut builder)?;
    let accessorials = load_accessorials(dir, &mut builder)?;
    let fuel = load_fuel(dir, &mut builder)?;

    let snapshot = builder.build(version)?;
    info!(
        dir = %dir.display(),
        version,
        zips,
        zone_rates,
        beyond_rates,
        mileage_rates,
        accessorials,
        fuel,
        "loaded rate tables"
    );
    Ok(snapshot)
}

/// Loads `dir` and installs it as the next snapshot version, returning that
/// version. On error the current snapshot stays published.
pub fn reload(repository: &RateRepository, dir: &Path) -> Result<u64, LoadError> {
    let expected = repository.current_version().map_or(1, |current| current + 1);
    let snapshot = load_snapshot(dir, expected)?;
    Ok(repository.install(snapshot))
}
