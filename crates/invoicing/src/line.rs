use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use invoicedesk_core::{CompanyId, DomainError, DomainResult, InvoiceLineId};

use crate::money::{self, LineAmounts, MONEY_SCALE, QTY_SCALE, RATE_SCALE, VatType};

const DESCRIPTION_MAX: usize = 400;

/// A line of an invoice.
///
/// `company_id` duplicates the owning invoice's company so lines can be
/// filtered by tenant directly. `line_total` is derived and recomputed on
/// every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub id: InvoiceLineId,
    pub company_id: CompanyId,
    pub description: String,
    pub qty: Decimal,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
    pub vat_type: VatType,
    pub line_total: Decimal,
}

impl InvoiceLine {
    pub fn amounts(&self) -> DomainResult<LineAmounts> {
        money::line_amounts(self.qty, self.unit_price, self.tax_rate, self.vat_type)
    }

    fn recalculate(&mut self) -> DomainResult<LineAmounts> {
        let amounts = self.amounts()?;
        self.line_total = money::with_money_scale(amounts.total);
        Ok(amounts)
    }
}

/// Incoming line data for a draft save.
///
/// `id` identifies an existing line to update in place; `None` (or an id the
/// invoice doesn't have) adds a new line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInput {
    pub id: Option<InvoiceLineId>,
    pub description: String,
    pub qty: Decimal,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
    pub vat_type: VatType,
}

impl LineInput {
    /// Validate and bring values to their canonical scales.
    fn normalized(&self) -> DomainResult<LineInput> {
        let description = self.description.trim().to_string();
        if description.is_empty() {
            return Err(DomainError::validation("line description is required"));
        }
        if description.chars().count() > DESCRIPTION_MAX {
            return Err(DomainError::validation(format!(
                "line description must be at most {DESCRIPTION_MAX} characters"
            )));
        }
        if self.tax_rate < Decimal::ZERO || self.tax_rate > Decimal::ONE {
            return Err(DomainError::validation("tax rate must be between 0 and 1"));
        }

        Ok(LineInput {
            id: self.id,
            description,
            qty: fixed_scale("quantity", self.qty, QTY_SCALE, 15)?,
            unit_price: fixed_scale("unit price", self.unit_price, MONEY_SCALE, 16)?,
            tax_rate: fixed_scale("tax rate", self.tax_rate, RATE_SCALE, 1)?,
            vat_type: self.vat_type,
        })
    }
}

/// Reject values with more fractional digits than `scale` or more integer
/// digits than `int_digits`, then rescale to exactly `scale`.
fn fixed_scale(field: &str, value: Decimal, scale: u32, int_digits: u32) -> DomainResult<Decimal> {
    if value.normalize().scale() > scale {
        return Err(DomainError::validation(format!(
            "{field} allows at most {scale} decimal places"
        )));
    }
    if value.abs().trunc() >= Decimal::from(10_i64.pow(int_digits)) {
        return Err(DomainError::validation(format!("{field} is too large")));
    }
    let mut value = value;
    value.rescale(scale);
    Ok(value)
}

/// Merge `incoming` into `current`.
///
/// Lines of `current` absent from `incoming` are removed, matched lines are
/// updated in place (keeping their id) and unmatched ones are added with a
/// fresh id bound to `company_id`. The result follows the incoming order.
pub(crate) fn merge_lines(
    company_id: CompanyId,
    current: &[InvoiceLine],
    incoming: &[LineInput],
) -> DomainResult<Vec<InvoiceLine>> {
    let mut merged = Vec::with_capacity(incoming.len());
    for input in incoming {
        let input = input.normalized()?;
        let id = input
            .id
            .filter(|id| current.iter().any(|line| line.id == *id))
            .filter(|id| !merged.iter().any(|line: &InvoiceLine| line.id == *id))
            .unwrap_or_else(InvoiceLineId::new);

        let mut line = InvoiceLine {
            id,
            company_id,
            description: input.description,
            qty: input.qty,
            unit_price: input.unit_price,
            tax_rate: input.tax_rate,
            vat_type: input.vat_type,
            line_total: Decimal::ZERO,
        };
        line.recalculate()?;
        merged.push(line);
    }
    Ok(merged)
}

/// Recompute every line total and return the per-line amounts.
pub(crate) fn recalculate_all(lines: &mut [InvoiceLine]) -> DomainResult<Vec<LineAmounts>> {
    lines.iter_mut().map(InvoiceLine::recalculate).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn input(id: Option<InvoiceLineId>, description: &str) -> LineInput {
        LineInput {
            id,
            description: description.to_string(),
            qty: dec!(2),
            unit_price: dec!(50.00),
            tax_rate: dec!(0.20),
            vat_type: VatType::Domestic,
        }
    }

    #[test]
    fn merge_updates_matched_removes_missing_and_inserts_new() {
        let company_id = CompanyId::new();
        let current = merge_lines(
            company_id,
            &[],
            &[input(None, "keep"), input(None, "drop")],
        )
        .unwrap();
        let keep_id = current[0].id;
        let drop_id = current[1].id;

        let merged = merge_lines(
            company_id,
            &current,
            &[input(Some(keep_id), "kept and edited"), input(None, "added")],
        )
        .unwrap();

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id, keep_id);
        assert_eq!(merged[0].description, "kept and edited");
        assert_ne!(merged[1].id, drop_id);
        assert!(merged.iter().all(|l| l.id != drop_id));
        assert!(merged.iter().all(|l| l.company_id == company_id));
    }

    #[test]
    fn foreign_line_ids_are_treated_as_new() {
        let stranger = InvoiceLineId::new();
        let merged = merge_lines(CompanyId::new(), &[], &[input(Some(stranger), "x")]).unwrap();
        assert_ne!(merged[0].id, stranger);
    }

    #[test]
    fn duplicate_ids_in_one_save_get_distinct_lines() {
        let company_id = CompanyId::new();
        let current = merge_lines(company_id, &[], &[input(None, "a")]).unwrap();
        let id = current[0].id;
        let merged = merge_lines(
            company_id,
            &current,
            &[input(Some(id), "a"), input(Some(id), "b")],
        )
        .unwrap();
        assert_eq!(merged[0].id, id);
        assert_ne!(merged[1].id, id);
    }

    #[test]
    fn values_are_rescaled_and_totals_derived() {
        let merged = merge_lines(CompanyId::new(), &[], &[input(None, "  Consulting  ")]).unwrap();
        let line = &merged[0];
        assert_eq!(line.description, "Consulting");
        assert_eq!(line.qty.scale(), QTY_SCALE);
        assert_eq!(line.unit_price.scale(), MONEY_SCALE);
        assert_eq!(line.tax_rate.scale(), RATE_SCALE);
        assert_eq!(line.line_total, dec!(120.00));
    }

    #[test]
    fn rejects_excess_precision() {
        let mut bad = input(None, "x");
        bad.unit_price = dec!(10.005);
        match merge_lines(CompanyId::new(), &[], &[bad]) {
            Err(DomainError::Validation(msg)) if msg.contains("unit price") => {}
            other => panic!("expected validation error, got {other:?}"),
        }

        let mut bad = input(None, "x");
        bad.qty = dec!(1.0001);
        assert!(merge_lines(CompanyId::new(), &[], &[bad]).is_err());

        let mut bad = input(None, "x");
        bad.tax_rate = dec!(0.12345);
        assert!(merge_lines(CompanyId::new(), &[], &[bad]).is_err());
    }

    #[test]
    fn trailing_zeros_do_not_count_as_precision() {
        let mut ok = input(None, "x");
        ok.unit_price = dec!(10.5000);
        assert!(merge_lines(CompanyId::new(), &[], &[ok]).is_ok());
    }

    #[test]
    fn rejects_rate_outside_unit_interval_and_blank_description() {
        let mut bad = input(None, "x");
        bad.tax_rate = dec!(20);
        assert!(merge_lines(CompanyId::new(), &[], &[bad]).is_err());
        assert!(merge_lines(CompanyId::new(), &[], &[input(None, "   ")]).is_err());
    }
}
