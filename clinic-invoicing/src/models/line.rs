//! Invoice line model and per-line amount computation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Billable line owned by exactly one invoice. Lines may only be appended
/// while the parent invoice is draft.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoiceLine {
    pub line_id: Uuid,
    pub invoice_id: Uuid,
    pub tenant_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Percentage of the line covered by an insurer/third party, excluded
    /// from the patient-payable tax base.
    pub third_party_rate: Decimal,
    /// Tax percentage applied to the non-third-party portion.
    pub tax_rate: Decimal,
    /// Patient-payable amount, computed at append time.
    pub amount: Decimal,
    pub created_utc: DateTime<Utc>,
}

/// Input for appending a line to a draft invoice.
#[derive(Debug, Clone)]
pub struct CreateInvoiceLine {
    pub invoice_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub third_party_rate: Decimal,
    pub tax_rate: Decimal,
}

/// Intermediate amounts for one billable line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineAmounts {
    pub line_total: Decimal,
    pub third_party_amount: Decimal,
    pub taxable_base: Decimal,
    pub tax_amount: Decimal,
    pub amount: Decimal,
}

/// The patient-payable amount for one line:
/// the third-party share is removed from the gross total, and tax applies
/// only to the remaining base.
pub fn compute_line_amounts(
    quantity: Decimal,
    unit_price: Decimal,
    third_party_rate: Decimal,
    tax_rate: Decimal,
) -> LineAmounts {
    let hundred = Decimal::from(100);
    let line_total = quantity * unit_price;
    let third_party_amount = line_total * (third_party_rate / hundred);
    let taxable_base = line_total - third_party_amount;
    let tax_amount = taxable_base * (tax_rate / hundred);
    let amount = taxable_base + tax_amount;

    LineAmounts {
        line_total,
        third_party_amount,
        taxable_base,
        tax_amount,
        amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn line_amount_formula_reference_values() {
        let amounts = compute_line_amounts(dec("3"), dec("100"), dec("20"), dec("10"));
        assert_eq!(amounts.line_total, dec("300"));
        assert_eq!(amounts.third_party_amount, dec("60"));
        assert_eq!(amounts.taxable_base, dec("240"));
        assert_eq!(amounts.tax_amount, dec("24"));
        assert_eq!(amounts.amount, dec("264"));
    }

    #[test]
    fn zero_rates_leave_gross_amount_unchanged() {
        let amounts = compute_line_amounts(dec("1"), dec("50"), Decimal::ZERO, Decimal::ZERO);
        assert_eq!(amounts.third_party_amount, Decimal::ZERO);
        assert_eq!(amounts.tax_amount, Decimal::ZERO);
        assert_eq!(amounts.amount, dec("50"));
    }

    #[test]
    fn full_third_party_coverage_zeroes_the_payable_amount() {
        let amounts = compute_line_amounts(dec("2"), dec("75"), dec("100"), dec("20"));
        assert_eq!(amounts.taxable_base, Decimal::ZERO);
        assert_eq!(amounts.amount, Decimal::ZERO);
    }

    #[test]
    fn fractional_quantities_are_exact() {
        let amounts = compute_line_amounts(dec("1.5"), dec("10"), Decimal::ZERO, Decimal::ZERO);
        assert_eq!(amounts.amount, dec("15"));
    }
}
