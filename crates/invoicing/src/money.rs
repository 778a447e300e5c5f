//! Monetary math for invoice lines and totals.
//!
//! All amounts are `rust_decimal::Decimal`. Every line is rounded on its own
//! (half away from zero, 2 decimals) and invoice totals are plain sums of
//! those rounded values, never re-rounded.

use core::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use invoicedesk_core::{DomainError, DomainResult, ValueObject};

/// Fractional digits of money amounts (unit price, line and invoice totals).
pub const MONEY_SCALE: u32 = 2;
/// Fractional digits of quantities.
pub const QTY_SCALE: u32 = 3;
/// Fractional digits of tax rates, stored as fractions (0.2000 = 20%).
pub const RATE_SCALE: u32 = 4;

/// Largest absolute money amount a column of precision (18, 2) can hold.
fn money_limit() -> Decimal {
    Decimal::from(10_i64.pow(16))
}

/// Tax treatment of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VatType {
    /// Domestic supply, taxed at the line's rate.
    Domestic,
    /// Intra-EU supply; the buyer accounts for VAT.
    IntraEuReverseCharge,
    /// Export outside the EU, zero-rated.
    ExportOutsideEu,
    /// Exempt supply.
    VatExempt,
}

impl VatType {
    pub const ALL: [VatType; 4] = [
        VatType::Domestic,
        VatType::IntraEuReverseCharge,
        VatType::ExportOutsideEu,
        VatType::VatExempt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VatType::Domestic => "Domestic",
            VatType::IntraEuReverseCharge => "IntraEuReverseCharge",
            VatType::ExportOutsideEu => "ExportOutsideEu",
            VatType::VatExempt => "VatExempt",
        }
    }

    /// Whether the line's tax rate applies at all.
    pub fn is_taxed(&self) -> bool {
        matches!(self, VatType::Domestic)
    }
}

impl core::fmt::Display for VatType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VatType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VatType::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::validation(format!("unknown VAT type: {s}")))
    }
}

/// Round a money amount to 2 decimals, half away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Computed amounts of a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineAmounts {
    pub base: Decimal,
    pub vat: Decimal,
    pub total: Decimal,
}

impl ValueObject for LineAmounts {}

/// `base = round(qty * unit_price)`, `vat = round(base * rate)` for domestic
/// lines and zero otherwise, `total = base + vat`.
pub fn line_amounts(
    qty: Decimal,
    unit_price: Decimal,
    tax_rate: Decimal,
    vat_type: VatType,
) -> DomainResult<LineAmounts> {
    let raw = qty
        .checked_mul(unit_price)
        .ok_or_else(out_of_range)?;
    let base = round_money(raw);

    let vat = if vat_type.is_taxed() {
        round_money(base.checked_mul(tax_rate).ok_or_else(out_of_range)?)
    } else {
        Decimal::ZERO
    };

    let total = base.checked_add(vat).ok_or_else(out_of_range)?;
    if total.abs() >= money_limit() || base.abs() >= money_limit() {
        return Err(out_of_range());
    }

    Ok(LineAmounts { base, vat, total })
}

/// Invoice level totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub sub_total: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
}

impl ValueObject for InvoiceTotals {}

/// Sum already rounded line amounts.
pub fn invoice_totals<I>(lines: I) -> DomainResult<InvoiceTotals>
where
    I: IntoIterator<Item = LineAmounts>,
{
    let mut sub_total = Decimal::ZERO;
    let mut tax_total = Decimal::ZERO;
    for line in lines {
        sub_total = sub_total.checked_add(line.base).ok_or_else(out_of_range)?;
        tax_total = tax_total.checked_add(line.vat).ok_or_else(out_of_range)?;
    }
    let total = sub_total.checked_add(tax_total).ok_or_else(out_of_range)?;
    if total.abs() >= money_limit() || sub_total.abs() >= money_limit() {
        return Err(out_of_range());
    }

    Ok(InvoiceTotals {
        sub_total: with_money_scale(sub_total),
        tax_total: with_money_scale(tax_total),
        total: with_money_scale(total),
    })
}

/// Same value, rendered with exactly 2 decimals.
pub(crate) fn with_money_scale(mut value: Decimal) -> Decimal {
    value.rescale(MONEY_SCALE);
    value
}

fn out_of_range() -> DomainError {
    DomainError::validation("amount exceeds the supported range")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn midpoint_rounds_away_from_zero() {
        assert_eq!(round_money(dec!(30.015)), dec!(30.02));
        assert_eq!(round_money(dec!(-30.015)), dec!(-30.02));
        assert_eq!(round_money(dec!(30.014)), dec!(30.01));
    }

    #[test]
    fn domestic_line_rounds_base_then_vat() {
        let amounts = line_amounts(dec!(3), dec!(10.005), dec!(0.20), VatType::Domestic).unwrap();
        assert_eq!(amounts.base, dec!(30.02));
        assert_eq!(amounts.vat, dec!(6.00));
        assert_eq!(amounts.total, dec!(36.02));
    }

    #[test]
    fn untaxed_categories_carry_no_vat() {
        for vat_type in [
            VatType::IntraEuReverseCharge,
            VatType::ExportOutsideEu,
            VatType::VatExempt,
        ] {
            let amounts = line_amounts(dec!(2), dec!(50.00), dec!(0.20), vat_type).unwrap();
            assert_eq!(amounts.vat, Decimal::ZERO);
            assert_eq!(amounts.total, dec!(100.00));
        }
    }

    #[test]
    fn totals_sum_rounded_lines_without_rerounding() {
        // Each line: base 0.01 (0.005 rounds up), vat 0.00.
        let line = line_amounts(dec!(1), dec!(0.005), dec!(0.20), VatType::Domestic).unwrap();
        let totals = invoice_totals([line, line, line]).unwrap();
        assert_eq!(totals.sub_total, dec!(0.03));
        assert_eq!(totals.tax_total, dec!(0.00));
        assert_eq!(totals.total, dec!(0.03));
    }

    #[test]
    fn overflow_is_a_validation_error() {
        let err = line_amounts(Decimal::MAX, dec!(2), dec!(0), VatType::Domestic).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        let err = line_amounts(dec!(1000000000000), dec!(100000), dec!(0), VatType::VatExempt)
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn vat_type_parses_case_insensitively() {
        assert_eq!("domestic".parse::<VatType>().unwrap(), VatType::Domestic);
        assert_eq!(
            VatType::IntraEuReverseCharge.as_str().parse::<VatType>().unwrap(),
            VatType::IntraEuReverseCharge
        );
        assert!("zero".parse::<VatType>().is_err());
    }

    fn qty() -> impl Strategy<Value = Decimal> {
        (0i64..1_000_000).prop_map(|n| Decimal::new(n, QTY_SCALE))
    }

    fn price() -> impl Strategy<Value = Decimal> {
        (0i64..10_000_000).prop_map(|n| Decimal::new(n, MONEY_SCALE))
    }

    fn rate() -> impl Strategy<Value = Decimal> {
        (0i64..=10_000).prop_map(|n| Decimal::new(n, RATE_SCALE))
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

        #[test]
        fn reverse_charge_never_adds_tax(q in qty(), p in price(), r in rate()) {
            let amounts = line_amounts(q, p, r, VatType::IntraEuReverseCharge).unwrap();
            prop_assert_eq!(amounts.vat, Decimal::ZERO);
            prop_assert_eq!(amounts.total, amounts.base);
        }

        #[test]
        fn line_amounts_have_money_scale(q in qty(), p in price(), r in rate()) {
            let amounts = line_amounts(q, p, r, VatType::Domestic).unwrap();
            prop_assert!(amounts.base.scale() <= MONEY_SCALE);
            prop_assert!(amounts.vat.scale() <= MONEY_SCALE);
            prop_assert_eq!(amounts.total, amounts.base + amounts.vat);
            prop_assert!((amounts.base - q * p).abs() <= dec!(0.005));
        }

        #[test]
        fn totals_equal_sum_of_lines(lines in prop::collection::vec((qty(), price(), rate()), 0..20)) {
            let amounts: Vec<LineAmounts> = lines
                .iter()
                .map(|(q, p, r)| line_amounts(*q, *p, *r, VatType::Domestic).unwrap())
                .collect();
            let totals = invoice_totals(amounts.iter().copied()).unwrap();
            let base: Decimal = amounts.iter().map(|a| a.base).sum();
            let vat: Decimal = amounts.iter().map(|a| a.vat).sum();
            prop_assert_eq!(totals.sub_total, base);
            prop_assert_eq!(totals.tax_total, vat);
            prop_assert_eq!(totals.total, base + vat);
        }
    }
}
