use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::domain::{QuoteParts, QuoteResult, ShipmentRequest};
use crate::infra::distance::DistanceProvider;
use crate::infra::sink::{QuoteSink, SinkError, StoredQuote};
use crate::util::config::EngineConfig;
use crate::util::version::pricing_policy_version;

use super::error::{QuoteError, QuoteStage};
use super::limits::{PricedShipment, WarningRules};
use super::repository::{RateRepository, Readiness};
use super::resolver::ZoneResolver;
use super::surcharge;

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Quote(#[from] QuoteError),
    #[error("quote priced but not stored: {0}")]
    Sink(#[from] SinkError),
}

/// Turns shipment requests into priced quotes against the current snapshot.
pub struct QuoteEngine {
    repository: Arc<RateRepository>,
    resolver: ZoneResolver,
    rules: WarningRules,
    dim_divisor: Decimal,
}

impl QuoteEngine {
    pub fn new(
        repository: Arc<RateRepository>,
        distance: Arc<dyn DistanceProvider>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            repository,
            resolver: ZoneResolver::new(distance, config.distance.lookup_deadline()),
            rules: WarningRules::from_config(&config.limits),
            dim_divisor: config.dim_divisor,
        }
    }

    pub fn repository(&self) -> &Arc<RateRepository> {
        &self.repository
    }

    pub fn readiness(&self) -> Readiness {
        self.repository.readiness()
    }

    /// Prices `request`. Either every stage succeeds and a complete quote is
    /// returned, or the first failing stage's error is.
    pub async fn quote(&self, request: &ShipmentRequest) -> Result<QuoteResult, QuoteError> {
        match self.run(request).await {
            Ok(quote) => {
                info!(
                    origin = %quote.origin(),
                    destination = %quote.destination(),
                    mode = %quote.mode(),
                    zone = %quote.zone(),
                    total = %quote.total(),
                    warnings = quote.warnings().len(),
                    "quote complete"
                );
                Ok(quote)
            }
            Err(error) => {
                warn!(
                    stage = %error.stage(),
                    kind = %error.kind(),
                    origin = %request.origin,
                    destination = %request.destination,
                    mode = %request.mode,
                    "quote failed: {error}"
                );
                Err(error)
            }
        }
    }

    /// Prices `request` and hands the result to `sink`.
    pub async fn quote_and_store(
        &self,
        request: &ShipmentRequest,
        sink: &dyn QuoteSink,
    ) -> Result<(QuoteResult, StoredQuote), SubmitError> {
        let quote = self.quote(request).await?;
        let stored = sink.store(&quote).await?;
        info!(id = %stored.id, "quote stored");
        Ok((quote, stored))
    }

    async fn run(&self, request: &ShipmentRequest) -> Result<QuoteResult, QuoteError> {
        stage(QuoteStage::Received);
        validate(request)?;
        let (billable_weight, weight_method) = request
            .billable_weight(self.dim_divisor)
            .ok_or_else(|| QuoteError::invalid("dimensions", "too large to price"))?;
        let rate_set = request.rate_set();

        let snapshot = self.repository.snapshot().ok_or_else(|| QuoteError::NotReady {
            missing: vec!["rate snapshot".to_string()],
        })?;
        let missing = snapshot.missing_tables(request.mode);
        if !missing.is_empty() {
            return Err(QuoteError::NotReady { missing });
        }
        stage(QuoteStage::Validated);

        let resolved = self
            .resolver
            .resolve(
                &snapshot,
                request.mode,
                &rate_set,
                &request.origin,
                &request.destination,
            )
            .await?;
        stage(QuoteStage::ZoneResolved);

        let lookup = snapshot.lookup(request.mode, &rate_set, &resolved.key, billable_weight)?;
        stage(QuoteStage::Rated);

        let pricing = surcharge::apply(
            lookup.entry.base_rate,
            &request.accessorials,
            billable_weight,
            request.mode,
            lookup.accessorials,
            lookup.fuel_rate,
        )?;
        stage(QuoteStage::Surcharged);

        let mut warnings = resolved.warnings;
        warnings.extend(lookup.warnings);
        warnings.extend(self.rules.evaluate(&PricedShipment {
            mode: request.mode,
            billable_weight,
            pieces: request.pieces,
            total: pricing.total,
        }));
        stage(QuoteStage::LimitsChecked);

        let quote = QuoteResult::new(QuoteParts {
            origin: resolved.origin,
            destination: resolved.destination,
            mode: request.mode,
            rate_set: lookup.entry.rate_set,
            actual_weight: request.weight,
            billable_weight,
            weight_method,
            pieces: request.pieces,
            zone: resolved.key,
            resolution: resolved.source,
            origin_zone: resolved.origin_zone,
            destination_zone: resolved.destination_zone,
            miles: resolved.miles,
            pricing,
            policy_version: pricing_policy_version().to_string(),
            snapshot_version: snapshot.version(),
            warnings,
        });
        stage(QuoteStage::Complete);
        Ok(quote)
    }
}

fn stage(stage: QuoteStage) {
    debug!(%stage, "quote stage reached");
}

fn validate(request: &ShipmentRequest) -> Result<(), QuoteError> {
    if request.weight <= Decimal::ZERO {
        return Err(QuoteError::invalid("weight", "must be greater than zero"));
    }
    if request.pieces == 0 {
        return Err(QuoteError::invalid("pieces", "must be at least 1"));
    }
    if let Some(dimensions) = request.dimensions {
        for (field, value) in [
            ("length", dimensions.length),
            ("width", dimensions.width),
            ("height", dimensions.height),
        ] {
            if value < Decimal::ZERO {
                return Err(QuoteError::invalid(field, "must not be negative"));
            }
        }
    }
    if request.dim_weight.is_some_and(|weight| weight < Decimal::ZERO) {
        return Err(QuoteError::invalid("dim_weight", "must not be negative"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Dimensions, Mode};
    use rust_decimal_macros::dec;

    #[test]
    fn validation_rejects_bad_numbers() {
        let request = ShipmentRequest::new("30301", "60601", dec!(0), Mode::Air);
        assert_eq!(validate(&request).unwrap_err().field(), Some("weight"));

        let request = ShipmentRequest::new("30301", "60601", dec!(10), Mode::Air).with_pieces(0);
        assert_eq!(validate(&request).unwrap_err().field(), Some("pieces"));

        let request = ShipmentRequest::new("30301", "60601", dec!(10), Mode::Air)
            .with_dimensions(Dimensions::new(dec!(10), dec!(-1), dec!(10)));
        assert_eq!(validate(&request).unwrap_err().field(), Some("width"));
    }

    #[test]
    fn validation_accepts_plain_request() {
        let request = ShipmentRequest::new("30301", "60601", dec!(0.5), Mode::Hotshot);
        assert!(validate(&request).is_ok());
    }
}
