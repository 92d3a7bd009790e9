//! JSON body accepted from the quote form and API callers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Dimensions, Mode, ShipmentRequest, UnknownMode};

use super::error::QuoteError;

/// Raw quote submission. Numeric fields may be absent; conversion decides
/// which absences are errors.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotePayload {
    /// `hotshot` or `air`.
    pub quote_type: String,
    pub origin: String,
    pub destination: String,
    pub weight: Option<Decimal>,
    pub pieces: Option<u32>,
    pub length: Option<Decimal>,
    pub width: Option<Decimal>,
    pub height: Option<Decimal>,
    pub dim_weight: Option<Decimal>,
    pub accessorials: Vec<String>,
    pub rate_set: Option<String>,
}

impl QuotePayload {
    pub fn from_json(raw: &str) -> Result<Self, QuoteError> {
        serde_json::from_str(raw).map_err(|err| QuoteError::invalid("payload", err.to_string()))
    }

    pub fn into_request(self) -> Result<ShipmentRequest, QuoteError> {
        let mode: Mode = self
            .quote_type
            .parse()
            .map_err(|err: UnknownMode| QuoteError::invalid("quote_type", err.to_string()))?;
        let weight = self
            .weight
            .ok_or_else(|| QuoteError::invalid("weight", "is required"))?;

        let dimensions = match (self.length, self.width, self.height) {
            (None, None, None) => None,
            (Some(length), Some(width), Some(height)) => {
                Some(Dimensions::new(length, width, height))
            }
            _ => {
                return Err(QuoteError::invalid(
                    "dimensions",
                    "length, width and height must be given together",
                ))
            }
        };

        let accessorials: Vec<String> = self
            .accessorials
            .into_iter()
            .map(|code| code.trim().to_string())
            .filter(|code| !code.is_empty())
            .collect();

        let mut request = ShipmentRequest::new(self.origin, self.destination, weight, mode)
            .with_accessorials(accessorials)
            .with_pieces(self.pieces.unwrap_or(1));
        request.dimensions = dimensions;
        request.dim_weight = self.dim_weight;
        request.rate_set = self.rate_set.filter(|name| !name.trim().is_empty());
        Ok(request)
    }
}

impl TryFrom<QuotePayload> for ShipmentRequest {
    type Error = QuoteError;

    fn try_from(payload: QuotePayload) -> Result<Self, Self::Error> {
        payload.into_request()
    }
}
