//! Accessorial and fuel surcharges on top of a base rate.
//!
//! Composition order is base, then accessorials, then fuel on the subtotal.
//! Components keep full precision; only the total is rounded to cents.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::{AccessorialCharge, AccessorialTable, Mode, PricingBreakdown};

use super::error::QuoteError;

pub fn apply(
    base_rate: Decimal,
    requested: &[String],
    billable_weight: Decimal,
    mode: Mode,
    table: &AccessorialTable,
    fuel_rate: Decimal,
) -> Result<PricingBreakdown, QuoteError> {
    let mut charges: Vec<AccessorialCharge> = Vec::with_capacity(requested.len());
    for code in requested {
        let cost = table
            .get(code)
            .filter(|cost| cost.applies_to(mode))
            .ok_or_else(|| QuoteError::UnknownAccessorial {
                code: code.trim().to_string(),
                mode,
            })?;
        if charges
            .iter()
            .any(|charge| charge.code.eq_ignore_ascii_case(&cost.code))
        {
            continue;
        }
        charges.push(AccessorialCharge {
            code: cost.code.clone(),
            name: cost.name.clone(),
            amount: cost
                .charge(base_rate, billable_weight)
                .ok_or_else(overflow)?,
        });
    }

    let accessorial_total = charges
        .iter()
        .try_fold(Decimal::ZERO, |sum, charge| sum.checked_add(charge.amount))
        .ok_or_else(overflow)?;
    let subtotal = base_rate
        .checked_add(accessorial_total)
        .ok_or_else(overflow)?;
    let fuel_surcharge = subtotal.checked_mul(fuel_rate).ok_or_else(overflow)?;
    let total = round_cents(subtotal.checked_add(fuel_surcharge).ok_or_else(overflow)?);

    Ok(PricingBreakdown {
        base_rate,
        accessorials: charges,
        accessorial_total,
        fuel_rate,
        fuel_surcharge,
        total,
    })
}

fn overflow() -> QuoteError {
    QuoteError::invalid("weight", "too large to price")
}

pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccessorialCost, AccessorialKind};
    use rust_decimal_macros::dec;

    fn table() -> AccessorialTable {
        let mut table = AccessorialTable::default();
        for (code, kind, amount, modes) in [
            ("liftgate", AccessorialKind::Flat, dec!(75), vec![Mode::Hotshot]),
            ("inside", AccessorialKind::PerPound, dec!(0.05), vec![Mode::Hotshot, Mode::Air]),
            ("guarantee", AccessorialKind::Percent, dec!(25), vec![Mode::Air]),
        ] {
            table.insert(AccessorialCost {
                code: code.into(),
                name: code.to_uppercase(),
                kind,
                amount,
                modes,
            });
        }
        table
    }

    #[test]
    fn fuel_applies_to_base_without_extras() {
        let pricing = apply(dec!(150), &[], dec!(100), Mode::Hotshot, &table(), dec!(0.10)).unwrap();
        assert_eq!(pricing.fuel_surcharge, dec!(15));
        assert_eq!(pricing.total, dec!(165.00));
    }

    #[test]
    fn fuel_applies_to_base_plus_accessorials() {
        let requested = vec!["LIFTGATE".to_string(), "inside".to_string()];
        let pricing =
            apply(dec!(200), &requested, dec!(100), Mode::Hotshot, &table(), dec!(0.10)).unwrap();
        // 75 + 0.05 * 100
        assert_eq!(pricing.accessorial_total, dec!(80));
        assert_eq!(pricing.fuel_surcharge, dec!(28));
        assert_eq!(pricing.total, dec!(308));
        assert_eq!(pricing.accessorials.len(), 2);
    }

    #[test]
    fn duplicate_codes_are_charged_once() {
        let requested = vec!["liftgate".to_string(), " Liftgate ".to_string()];
        let pricing =
            apply(dec!(100), &requested, dec!(10), Mode::Hotshot, &table(), dec!(0)).unwrap();
        assert_eq!(pricing.accessorial_total, dec!(75));
    }

    #[test]
    fn percent_accessorial_scales_base() {
        let requested = vec!["guarantee".to_string()];
        let pricing = apply(dec!(400), &requested, dec!(10), Mode::Air, &table(), dec!(0)).unwrap();
        assert_eq!(pricing.accessorial_total, dec!(100));
    }

    #[test]
    fn unknown_or_wrong_mode_code_is_rejected() {
        let error = apply(
            dec!(100),
            &["teleport".to_string()],
            dec!(10),
            Mode::Hotshot,
            &table(),
            dec!(0.1),
        )
        .unwrap_err();
        assert!(matches!(error, QuoteError::UnknownAccessorial { ref code, .. } if code == "teleport"));

        let error = apply(
            dec!(100),
            &["liftgate".to_string()],
            dec!(10),
            Mode::Air,
            &table(),
            dec!(0.1),
        )
        .unwrap_err();
        assert!(matches!(error, QuoteError::UnknownAccessorial { mode: Mode::Air, .. }));
    }

    #[test]
    fn overflowing_charges_are_invalid_requests() {
        let mut table = table();
        table.insert(AccessorialCost {
            code: "hazmat".into(),
            name: "HAZMAT".into(),
            kind: AccessorialKind::PerPound,
            amount: dec!(5),
            modes: vec![Mode::Hotshot],
        });
        let heavy = Decimal::from_i128_with_scale(20_000_000_000_000_000_000_000_000_000, 0);
        let requested = vec!["hazmat".to_string()];
        let error =
            apply(dec!(100), &requested, heavy, Mode::Hotshot, &table, dec!(0)).unwrap_err();
        assert_eq!(error.field(), Some("weight"));

        let error = apply(Decimal::MAX, &[], dec!(1), Mode::Air, &self::table(), dec!(2)).unwrap_err();
        assert!(matches!(error, QuoteError::InvalidRequest { .. }));
    }

    #[test]
    fn only_total_is_rounded() {
        let pricing = apply(dec!(100.005), &[], dec!(1), Mode::Air, &table(), dec!(0)).unwrap();
        assert_eq!(pricing.base_rate, dec!(100.005));
        assert_eq!(pricing.total, dec!(100.01));
    }
}
