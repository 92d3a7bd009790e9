use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Rate set used when a request does not name one.
pub const DEFAULT_RATE_SET: &str = "default";

/// Shipping mode offered by the quote tool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Hotshot,
    Air,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Hotshot, Mode::Air];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Hotshot => "hotshot",
            Mode::Air => "air",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Mode::Hotshot => "Hotshot",
            Mode::Air => "Air",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown shipping mode `{0}`")]
pub struct UnknownMode(pub String);

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "hotshot" => Ok(Mode::Hotshot),
            "air" => Ok(Mode::Air),
            _ => Err(UnknownMode(raw.trim().to_string())),
        }
    }
}

/// A validated five-digit US ZIP code.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Zip(String);

impl Zip {
    /// Accepts `12345` or ZIP+4 (`12345-6789`), ignoring surrounding whitespace.
    /// ZIP+4 input keeps only its first five digits.
    pub fn parse(raw: &str) -> Option<Zip> {
        let trimmed = raw.trim();
        let (head, tail) = match trimmed.split_once('-') {
            Some((head, tail)) => (head, Some(tail)),
            None => (trimmed, None),
        };

        let is_digits = |part: &str, len: usize| {
            part.len() == len && part.bytes().all(|b| b.is_ascii_digit())
        };

        if !is_digits(head, 5) {
            return None;
        }
        if let Some(extension) = tail {
            if !is_digits(extension, 4) {
                return None;
            }
        }
        Some(Zip(head.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Zip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Package dimensions in inches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub length: Decimal,
    pub width: Decimal,
    pub height: Decimal,
}

impl Dimensions {
    pub fn new(length: Decimal, width: Decimal, height: Decimal) -> Self {
        Self {
            length,
            width,
            height,
        }
    }

    /// Cubic inches, or `None` when the product does not fit a `Decimal`.
    pub fn volume(&self) -> Option<Decimal> {
        self.length.checked_mul(self.width)?.checked_mul(self.height)
    }

    fn is_complete(&self) -> bool {
        self.length > Decimal::ZERO && self.width > Decimal::ZERO && self.height > Decimal::ZERO
    }
}

/// Whether the billable weight came from the scale or the package dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightMethod {
    Actual,
    Dimensional,
}

/// One shipment to be priced. Built once per API/form call and never mutated
/// by the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShipmentRequest {
    pub origin: String,
    pub destination: String,
    /// Scale weight in pounds.
    pub weight: Decimal,
    pub mode: Mode,
    #[serde(default)]
    pub accessorials: Vec<String>,
    #[serde(default = "default_pieces")]
    pub pieces: u32,
    #[serde(default)]
    pub dimensions: Option<Dimensions>,
    /// Caller-supplied dimensional weight; wins over `dimensions` when positive.
    #[serde(default)]
    pub dim_weight: Option<Decimal>,
    #[serde(default)]
    pub rate_set: Option<String>,
}

fn default_pieces() -> u32 {
    1
}

impl ShipmentRequest {
    pub fn new(
        origin: impl Into<String>,
        destination: impl Into<String>,
        weight: Decimal,
        mode: Mode,
    ) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
            weight,
            mode,
            accessorials: Vec::new(),
            pieces: 1,
            dimensions: None,
            dim_weight: None,
            rate_set: None,
        }
    }

    pub fn with_accessorials<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accessorials = codes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_pieces(mut self, pieces: u32) -> Self {
        self.pieces = pieces;
        self
    }

    pub fn with_dimensions(mut self, dimensions: Dimensions) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    pub fn with_dim_weight(mut self, dim_weight: Decimal) -> Self {
        self.dim_weight = Some(dim_weight);
        self
    }

    pub fn with_rate_set(mut self, rate_set: impl Into<String>) -> Self {
        self.rate_set = Some(rate_set.into());
        self
    }

    /// Dimensional weight for the whole shipment, zero when neither a
    /// pre-computed value nor complete dimensions are available. `None` when
    /// the dimensions are too large to compute with.
    pub fn dimensional_weight(&self, divisor: Decimal) -> Option<Decimal> {
        if let Some(supplied) = self.dim_weight.filter(|w| *w > Decimal::ZERO) {
            return Some(supplied);
        }
        match self.dimensions {
            Some(dims) if dims.is_complete() && divisor > Decimal::ZERO => dims
                .volume()?
                .checked_div(divisor)?
                .checked_mul(Decimal::from(self.pieces.max(1))),
            _ => Some(Decimal::ZERO),
        }
    }

    /// Billable weight is the larger of scale and dimensional weight.
    pub fn billable_weight(&self, divisor: Decimal) -> Option<(Decimal, WeightMethod)> {
        let dimensional = self.dimensional_weight(divisor)?;
        if dimensional > Decimal::ZERO && dimensional >= self.weight {
            Some((dimensional, WeightMethod::Dimensional))
        } else {
            Some((self.weight, WeightMethod::Actual))
        }
    }

    pub fn rate_set(&self) -> String {
        normalize_rate_set(self.rate_set.as_deref())
    }
}

/// Lowercase, trimmed rate-set identifier; empty input means the default set.
pub fn normalize_rate_set(raw: Option<&str>) -> String {
    let candidate = raw.unwrap_or(DEFAULT_RATE_SET).trim().to_ascii_lowercase();
    if candidate.is_empty() {
        DEFAULT_RATE_SET.to_string()
    } else {
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn zip_accepts_plain_and_plus_four() {
        assert_eq!(Zip::parse("30301").unwrap().as_str(), "30301");
        assert_eq!(Zip::parse(" 12345-6789 ").unwrap().as_str(), "12345");
    }

    #[test]
    fn zip_rejects_malformed_input() {
        for raw in ["1234", "123456", "12a45", "12345-678", "", "12345-"] {
            assert!(Zip::parse(raw).is_none(), "{raw} should be rejected");
        }
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("Hotshot".parse::<Mode>().unwrap(), Mode::Hotshot);
        assert_eq!(" AIR ".parse::<Mode>().unwrap(), Mode::Air);
        assert!("ground".parse::<Mode>().is_err());
    }

    #[test]
    fn dimensional_weight_wins_when_heavier() {
        let request = ShipmentRequest::new("30301", "60601", dec!(100), Mode::Air)
            .with_pieces(2)
            .with_dimensions(Dimensions::new(dec!(48), dec!(40), dec!(36)));
        let (billable, method) = request.billable_weight(dec!(166)).unwrap();
        // 48*40*36/166*2 = 832.77...
        assert!(billable > dec!(832) && billable < dec!(833));
        assert_eq!(method, WeightMethod::Dimensional);
    }

    #[test]
    fn supplied_dim_weight_overrides_dimensions() {
        let request = ShipmentRequest::new("30301", "60601", dec!(100), Mode::Air)
            .with_dimensions(Dimensions::new(dec!(10), dec!(10), dec!(10)))
            .with_dim_weight(dec!(250));
        assert_eq!(
            request.billable_weight(dec!(166)),
            Some((dec!(250), WeightMethod::Dimensional))
        );
    }

    #[test]
    fn actual_weight_used_without_dimensions() {
        let request = ShipmentRequest::new("30301", "60601", dec!(500), Mode::Hotshot);
        assert_eq!(
            request.billable_weight(dec!(166)),
            Some((dec!(500), WeightMethod::Actual))
        );
    }

    #[test]
    fn oversized_dimensions_do_not_overflow() {
        let huge = dec!(10000000000);
        let request = ShipmentRequest::new("30301", "60601", dec!(10), Mode::Air)
            .with_dimensions(Dimensions::new(huge, huge, huge));
        assert_eq!(request.dimensions.unwrap().volume(), None);
        assert_eq!(request.billable_weight(dec!(166)), None);
    }

    #[test]
    fn rate_set_is_normalized() {
        assert_eq!(normalize_rate_set(None), "default");
        assert_eq!(normalize_rate_set(Some("  ")), "default");
        assert_eq!(normalize_rate_set(Some(" MedCure ")), "medcure");
    }
}
