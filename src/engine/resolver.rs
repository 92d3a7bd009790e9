use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::domain::{
    bucket_miles, BandFit, Mode, QuoteWarning, ResolutionSource, Zip, ZipZone, ZoneId, ZoneKey,
    ZonePair,
};
use crate::infra::distance::{DistanceError, DistanceProvider};

use super::error::{QuoteError, ZipField};
use super::repository::RateSnapshot;

/// Rating key for a ZIP pair plus how it was found.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedZone {
    pub origin: Zip,
    pub destination: Zip,
    pub origin_zone: Option<ZoneId>,
    pub destination_zone: Option<ZoneId>,
    pub key: ZoneKey,
    pub source: ResolutionSource,
    pub miles: Option<f64>,
    pub warnings: Vec<QuoteWarning>,
}

/// Maps ZIP pairs to rating keys: zone table first, beyond table second,
/// road distance last.
pub struct ZoneResolver {
    distance: Arc<dyn DistanceProvider>,
    deadline: Duration,
}

impl ZoneResolver {
    pub fn new(distance: Arc<dyn DistanceProvider>, deadline: Duration) -> Self {
        Self { distance, deadline }
    }

    pub async fn resolve(
        &self,
        snapshot: &RateSnapshot,
        mode: Mode,
        rate_set: &str,
        origin: &str,
        destination: &str,
    ) -> Result<ResolvedZone, QuoteError> {
        let origin = parse_zip(origin, ZipField::Origin)?;
        let destination = parse_zip(destination, ZipField::Destination)?;

        let origin_zone = snapshot.zip_zone(origin.as_str());
        let destination_zone = snapshot.zip_zone(destination.as_str());
        let mut warnings = Vec::new();

        if let (Some(from), Some(to)) = (origin_zone, destination_zone) {
            if let Some((key, source)) = zone_table_key(snapshot, mode, rate_set, from, to) {
                debug!(%origin, %destination, %key, "resolved from zone table");
                if source == ResolutionSource::BeyondTable {
                    warnings.push(QuoteWarning::BeyondZoneRate {
                        pair: ZonePair::new(from.zone, to.zone).to_string(),
                    });
                }
                return Ok(ResolvedZone {
                    origin,
                    destination,
                    origin_zone: Some(from.zone),
                    destination_zone: Some(to.zone),
                    key,
                    source,
                    miles: None,
                    warnings,
                });
            }
        }

        for (zip, zone) in [(&origin, origin_zone), (&destination, destination_zone)] {
            if zone.is_none() {
                warnings.push(QuoteWarning::ZoneNotFound { zip: zip.clone() });
            }
        }

        let bands = snapshot.bands(rate_set, mode);
        if bands.is_empty() {
            let zone = match (origin_zone, destination_zone) {
                (Some(from), Some(to)) => ZoneKey::Standard(ZonePair::new(from.zone, to.zone)),
                _ => ZoneKey::Band("none".to_string()),
            };
            return Err(QuoteError::ZoneNotRated {
                mode,
                zone,
                rate_set: rate_set.to_string(),
            });
        }

        let miles = self.lookup_miles(&origin, &destination).await?;
        let Some((band, fit)) = bucket_miles(bands, miles) else {
            return Err(QuoteError::ZoneNotRated {
                mode,
                zone: ZoneKey::Band("none".to_string()),
                rate_set: rate_set.to_string(),
            });
        };
        match fit {
            BandFit::Within => {}
            BandFit::Nearest => warnings.push(QuoteWarning::DistanceBetweenBands {
                miles,
                band: band.label.clone(),
            }),
            BandFit::AboveAll => warnings.push(QuoteWarning::DistanceBeyondBands {
                miles,
                band: band.label.clone(),
            }),
        }
        debug!(%origin, %destination, miles, band = %band.label, ?fit, "resolved by distance");

        Ok(ResolvedZone {
            origin,
            destination,
            origin_zone: origin_zone.map(|zone| zone.zone),
            destination_zone: destination_zone.map(|zone| zone.zone),
            key: ZoneKey::Band(band.label.clone()),
            source: ResolutionSource::Distance,
            miles: Some(miles),
            warnings,
        })
    }

    async fn lookup_miles(&self, origin: &Zip, destination: &Zip) -> Result<f64, QuoteError> {
        let outcome = tokio::time::timeout(
            self.deadline,
            self.distance.distance_miles(origin, destination),
        )
        .await
        .unwrap_or(Err(DistanceError::Deadline(self.deadline)))
        .and_then(|miles| {
            if miles.is_finite() && miles >= 0.0 {
                Ok(miles)
            } else {
                Err(DistanceError::Api(format!("invalid distance {miles}")))
            }
        });

        outcome.map_err(|source| {
            warn!(%origin, %destination, "distance lookup failed: {source}");
            QuoteError::DistanceLookup {
                origin: origin.to_string(),
                destination: destination.to_string(),
                source,
            }
        })
    }
}

fn parse_zip(raw: &str, field: ZipField) -> Result<Zip, QuoteError> {
    Zip::parse(raw).ok_or_else(|| QuoteError::InvalidZip {
        field,
        value: raw.trim().to_string(),
    })
}

/// Standard pair rate if one exists, else the beyond-zone rate when either
/// ZIP carries the BEYOND flag.
fn zone_table_key(
    snapshot: &RateSnapshot,
    mode: Mode,
    rate_set: &str,
    from: ZipZone,
    to: ZipZone,
) -> Option<(ZoneKey, ResolutionSource)> {
    let pair = ZonePair::new(from.zone, to.zone);
    let standard = ZoneKey::Standard(pair);
    if snapshot.has_rate(rate_set, mode, &standard) {
        return Some((standard, ResolutionSource::ZoneTable));
    }
    if from.beyond || to.beyond {
        let beyond = ZoneKey::Beyond(pair);
        if snapshot.has_rate(rate_set, mode, &beyond) {
            return Some((beyond, ResolutionSource::BeyondTable));
        }
    }
    None
}
