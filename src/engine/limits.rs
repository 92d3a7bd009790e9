use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::{Mode, QuoteWarning};
use crate::util::config::LimitsConfig;

/// What a rule gets to look at once a quote is priced.
#[derive(Clone, Copy, Debug)]
pub struct PricedShipment {
    pub mode: Mode,
    pub billable_weight: Decimal,
    pub pieces: u32,
    pub total: Decimal,
}

/// Independent, non-blocking check on a priced shipment.
pub trait WarningRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn evaluate(&self, shipment: &PricedShipment) -> Option<QuoteWarning>;
}

pub struct WeightLimit {
    limits: LimitsConfig,
}

impl WarningRule for WeightLimit {
    fn name(&self) -> &'static str {
        "weight_limit"
    }

    fn evaluate(&self, shipment: &PricedShipment) -> Option<QuoteWarning> {
        let limit = self.limits.for_mode(shipment.mode).max_weight;
        (shipment.billable_weight > limit).then(|| QuoteWarning::WeightExceedsToolLimit {
            weight: shipment.billable_weight,
            limit,
        })
    }
}

pub struct CostLimit {
    limits: LimitsConfig,
}

impl WarningRule for CostLimit {
    fn name(&self) -> &'static str {
        "cost_limit"
    }

    fn evaluate(&self, shipment: &PricedShipment) -> Option<QuoteWarning> {
        let limit = self.limits.for_mode(shipment.mode).max_total;
        (shipment.total > limit).then(|| QuoteWarning::CostExceedsToolLimit {
            total: shipment.total,
            limit,
        })
    }
}

/// Air only: average billable pounds per piece.
pub struct AirPieceLimit {
    limit: Decimal,
}

impl WarningRule for AirPieceLimit {
    fn name(&self) -> &'static str {
        "air_piece_limit"
    }

    fn evaluate(&self, shipment: &PricedShipment) -> Option<QuoteWarning> {
        if shipment.mode != Mode::Air || shipment.pieces == 0 {
            return None;
        }
        let per_piece = shipment.billable_weight / Decimal::from(shipment.pieces);
        (per_piece > self.limit).then(|| QuoteWarning::PieceWeightExceedsLimit {
            per_piece: per_piece.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
            limit: self.limit,
        })
    }
}

/// Rules in evaluation order. Every rule runs; none blocks the quote.
pub struct WarningRules {
    rules: Vec<Box<dyn WarningRule>>,
}

impl WarningRules {
    pub fn new(rules: Vec<Box<dyn WarningRule>>) -> Self {
        Self { rules }
    }

    pub fn from_config(limits: &LimitsConfig) -> Self {
        Self::new(vec![
            Box::new(WeightLimit {
                limits: limits.clone(),
            }),
            Box::new(CostLimit {
                limits: limits.clone(),
            }),
            Box::new(AirPieceLimit {
                limit: limits.air_max_piece_weight,
            }),
        ])
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    pub fn evaluate(&self, shipment: &PricedShipment) -> Vec<QuoteWarning> {
        self.rules
            .iter()
            .filter_map(|rule| rule.evaluate(shipment))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn shipment(mode: Mode, weight: Decimal, pieces: u32, total: Decimal) -> PricedShipment {
        PricedShipment {
            mode,
            billable_weight: weight,
            pieces,
            total,
        }
    }

    #[test]
    fn rules_run_in_order() {
        let rules = WarningRules::from_config(&LimitsConfig::default());
        assert_eq!(rules.names(), vec!["weight_limit", "cost_limit", "air_piece_limit"]);

        let warnings = rules.evaluate(&shipment(Mode::Air, dec!(1500), 2, dec!(7000)));
        assert_eq!(warnings.len(), 3);
        assert!(matches!(warnings[0], QuoteWarning::WeightExceedsToolLimit { .. }));
        assert!(matches!(warnings[1], QuoteWarning::CostExceedsToolLimit { .. }));
        assert!(matches!(warnings[2], QuoteWarning::PieceWeightExceedsLimit { .. }));
    }

    #[test]
    fn limits_are_exclusive_at_the_boundary() {
        let rules = WarningRules::from_config(&LimitsConfig::default());
        let warnings = rules.evaluate(&shipment(Mode::Hotshot, dec!(3000), 1, dec!(6000)));
        assert!(warnings.is_empty());
    }

    #[test]
    fn piece_limit_ignores_hotshot() {
        let rules = WarningRules::from_config(&LimitsConfig::default());
        let warnings = rules.evaluate(&shipment(Mode::Hotshot, dec!(900), 1, dec!(100)));
        assert!(warnings.is_empty());

        let warnings = rules.evaluate(&shipment(Mode::Air, dec!(900), 3, dec!(100)));
        assert!(warnings.is_empty(), "300 lbs per piece is within the limit");
    }
}
