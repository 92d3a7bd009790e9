use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::domain::{Mode, ZoneKey};
use crate::infra::distance::DistanceError;

/// Stages a quote passes through, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStage {
    Received,
    Validated,
    ZoneResolved,
    Rated,
    Surcharged,
    LimitsChecked,
    Complete,
}

impl fmt::Display for QuoteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::ZoneResolved => "zone_resolved",
            Self::Rated => "rated",
            Self::Surcharged => "surcharged",
            Self::LimitsChecked => "limits_checked",
            Self::Complete => "complete",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ZipField {
    Origin,
    Destination,
}

impl ZipField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Origin => "origin",
            Self::Destination => "destination",
        }
    }
}

impl fmt::Display for ZipField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable error category for rendering and metrics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    InvalidZip,
    DistanceLookup,
    ZoneNotRated,
    UnknownAccessorial,
    NotReady,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidZip => "invalid_zip",
            Self::DistanceLookup => "distance_lookup",
            Self::ZoneNotRated => "zone_not_rated",
            Self::UnknownAccessorial => "unknown_accessorial",
            Self::NotReady => "not_ready",
        };
        f.write_str(label)
    }
}

/// Terminal failure of a quote attempt.
#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("invalid {field}: {reason}")]
    InvalidRequest { field: &'static str, reason: String },

    #[error("{field} ZIP `{value}` must be 5 digits or ZIP+4")]
    InvalidZip { field: ZipField, value: String },

    #[error("distance lookup {origin} -> {destination} failed: {source}")]
    DistanceLookup {
        origin: String,
        destination: String,
        #[source]
        source: DistanceError,
    },

    #[error("no {mode} rate table for {zone} in rate set `{rate_set}`")]
    ZoneNotRated {
        mode: Mode,
        zone: ZoneKey,
        rate_set: String,
    },

    #[error("unknown accessorial `{code}` for {mode} shipments")]
    UnknownAccessorial { code: String, mode: Mode },

    #[error("quote engine not ready: missing {}", missing.join(", "))]
    NotReady { missing: Vec<String> },
}

impl QuoteError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            field,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Self::InvalidZip { .. } => ErrorKind::InvalidZip,
            Self::DistanceLookup { .. } => ErrorKind::DistanceLookup,
            Self::ZoneNotRated { .. } => ErrorKind::ZoneNotRated,
            Self::UnknownAccessorial { .. } => ErrorKind::UnknownAccessorial,
            Self::NotReady { .. } => ErrorKind::NotReady,
        }
    }

    /// The request field the error points at, when there is one.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::InvalidRequest { field, .. } => Some(*field),
            Self::InvalidZip { field, .. } => Some(field.as_str()),
            Self::DistanceLookup { .. } => Some("zip_pair"),
            Self::ZoneNotRated { .. } => Some("mode"),
            Self::UnknownAccessorial { .. } => Some("accessorials"),
            Self::NotReady { .. } => None,
        }
    }

    /// The last stage reached before this error stopped the quote.
    pub fn stage(&self) -> QuoteStage {
        match self {
            Self::InvalidRequest { .. } | Self::NotReady { .. } => QuoteStage::Received,
            Self::InvalidZip { .. } | Self::DistanceLookup { .. } => QuoteStage::Validated,
            Self::ZoneNotRated { .. } => QuoteStage::ZoneResolved,
            Self::UnknownAccessorial { .. } => QuoteStage::Rated,
        }
    }
}

/// Error body returned to callers of the submission interface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub field: Option<String>,
    pub message: String,
}

impl From<&QuoteError> for ErrorPayload {
    fn from(error: &QuoteError) -> Self {
        Self {
            kind: error.kind(),
            field: error.field().map(str::to_string),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_kind_and_field() {
        let error = QuoteError::InvalidZip {
            field: ZipField::Destination,
            value: "abc".into(),
        };
        let payload = ErrorPayload::from(&error);
        assert_eq!(payload.kind, ErrorKind::InvalidZip);
        assert_eq!(payload.field.as_deref(), Some("destination"));
        assert!(payload.message.contains("abc"));
    }

    #[test]
    fn errors_map_to_failing_stage() {
        let error = QuoteError::UnknownAccessorial {
            code: "teleport".into(),
            mode: Mode::Air,
        };
        assert_eq!(error.stage(), QuoteStage::Rated);
        assert_eq!(QuoteError::invalid("weight", "must be positive").stage(), QuoteStage::Received);
    }

    #[test]
    fn not_ready_lists_missing_tables() {
        let error = QuoteError::NotReady {
            missing: vec!["zip_zones".into(), "fuel_surcharges (air)".into()],
        };
        assert_eq!(
            error.to_string(),
            "quote engine not ready: missing zip_zones, fuel_surcharges (air)"
        );
    }
}
