//! GST arithmetic: rounding to storage precision, the CGST/SGST split and the
//! optional server-side recomputation of caller totals.

use crate::models::{DiscountType, NewInvoice, NewLineItem};
use rust_decimal::{Decimal, RoundingStrategy};

const MONEY_DP: u32 = 2;
const QUANTITY_DP: u32 = 3;
const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Rounds a rupee amount to paise.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Rounds a quantity to the precision stored for stock.
pub fn round_quantity(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(QUANTITY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Rounds a tax percentage (e.g. `18`, `2.5`).
pub fn round_rate(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Splits an intra-state GST amount into equal central and state halves.
///
/// The amount is first rounded to paise, so each half is exact at three
/// decimal places and the halves always sum back to the stored amount.
pub fn split_gst(gst_amount: Decimal) -> (Decimal, Decimal) {
    let gst_amount = round_money(gst_amount);
    let half = gst_amount / Decimal::TWO;
    (half, half)
}

/// Pre-tax amount for a line, or `None` if it does not fit a decimal.
pub fn line_base_amount(quantity: Decimal, rate: Decimal) -> Option<Decimal> {
    quantity.checked_mul(rate).map(round_money)
}

/// Tax-inclusive amount for a line, or `None` on overflow.
pub fn line_total_with_gst(base_amount: Decimal, gst_percentage: Decimal) -> Option<Decimal> {
    let tax = base_amount.checked_mul(gst_percentage)? / HUNDRED;
    base_amount.checked_add(tax).map(round_money)
}

/// Discount in rupees for a subtotal, or `None` on overflow.
pub fn discount_amount(
    subtotal: Decimal,
    discount_type: DiscountType,
    value: Decimal,
) -> Option<Decimal> {
    match discount_type {
        DiscountType::Percentage => subtotal
            .checked_mul(value)
            .map(|amount| round_money(amount / HUNDRED)),
        DiscountType::Absolute => Some(round_money(value)),
    }
}

fn within(actual: Decimal, expected: Decimal, tolerance: Decimal) -> bool {
    actual
        .checked_sub(expected)
        .is_some_and(|difference| difference.abs() <= tolerance)
}

fn too_large(what: &str) -> String {
    format!("{} is too large to compute", what)
}

fn checked_sum(mut values: impl Iterator<Item = Option<Decimal>>) -> Option<Decimal> {
    values.try_fold(Decimal::ZERO, |acc, value| acc.checked_add(value?))
}

fn check_line(index: usize, item: &NewLineItem, tolerance: Decimal) -> Result<(), String> {
    let base = line_base_amount(item.quantity, item.rate)
        .ok_or_else(|| too_large(&format!("Product {} amount", index + 1)))?;
    if !within(item.base_amount, base, tolerance) {
        return Err(format!(
            "Product {} amount {} does not match quantity x rate ({})",
            index + 1,
            item.base_amount,
            base
        ));
    }

    let total = line_total_with_gst(item.base_amount, item.gst_percentage)
        .ok_or_else(|| too_large(&format!("Product {} price including GST", index + 1)))?;
    if !within(item.total_with_gst, total, tolerance) {
        return Err(format!(
            "Product {} price including GST {} does not match {}% GST on {} ({})",
            index + 1,
            item.total_with_gst,
            item.gst_percentage.normalize(),
            item.base_amount,
            total
        ));
    }

    Ok(())
}

/// Recomputes every derived figure from quantities, rates and percentages and
/// compares it with what the caller sent.
pub fn verify_totals(invoice: &NewInvoice, tolerance: Decimal) -> Result<(), String> {
    for (index, item) in invoice.items.iter().enumerate() {
        check_line(index, item, tolerance)?;
    }

    let header = &invoice.header;

    let subtotal = checked_sum(invoice.items.iter().map(|i| Some(i.total_with_gst)))
        .ok_or_else(|| too_large("Total with GST"))?;
    if !within(header.subtotal, subtotal, tolerance) {
        return Err(format!(
            "Total with GST {} does not match the sum of products ({})",
            header.subtotal, subtotal
        ));
    }

    let gst = checked_sum(
        invoice
            .items
            .iter()
            .map(|i| i.total_with_gst.checked_sub(i.base_amount)),
    )
    .ok_or_else(|| too_large("GST amount"))?;
    if !within(header.gst_amount, gst, tolerance) {
        return Err(format!(
            "GST amount {} does not match the GST on products ({})",
            header.gst_amount, gst
        ));
    }

    let total = discount_amount(header.subtotal, header.discount_type, header.discount_value)
        .and_then(|discount| header.subtotal.checked_sub(discount))
        .and_then(|net| net.checked_add(header.transport_charge))
        .map(round_money)
        .ok_or_else(|| too_large("Invoice total"))?;
    if !within(header.total_amount, total, tolerance) {
        return Err(format!(
            "Invoice total {} does not match subtotal less discount plus transport ({})",
            header.total_amount, total
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewCustomer, NewInvoiceHeader, PaymentType};
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn item(quantity: &str, rate: &str, gst: &str, base: &str, total: &str) -> NewLineItem {
        NewLineItem {
            product_id: 1,
            hsn_code: Some("1006".into()),
            quantity: d(quantity),
            unit: Some("kg".into()),
            rate: d(rate),
            gst_percentage: d(gst),
            base_amount: d(base),
            total_with_gst: d(total),
        }
    }

    fn invoice(items: Vec<NewLineItem>, subtotal: &str, gst: &str, total: &str) -> NewInvoice {
        let (cgst, sgst) = split_gst(d(gst));
        NewInvoice {
            customer: NewCustomer::default(),
            header: NewInvoiceHeader {
                invoice_number: Some("INV-1".into()),
                invoice_date: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
                place_of_supply: None,
                vehicle_number: None,
                subtotal: d(subtotal),
                gst_percentage: d("18"),
                gst_amount: d(gst),
                cgst_amount: cgst,
                sgst_amount: sgst,
                discount_type: DiscountType::Absolute,
                discount_value: d("10"),
                transport_charge: d("50"),
                total_amount: d(total),
                payment_type: PaymentType::Cash,
                advance_amount: Decimal::ZERO,
            },
            items,
            created_by: "1".into(),
        }
    }

    #[test]
    fn split_gst_halves_sum_to_whole() {
        for raw in ["0", "0.01", "0.05", "18", "180.99", "12345.67"] {
            let gst = d(raw);
            let (cgst, sgst) = split_gst(gst);
            assert_eq!(cgst, sgst);
            assert_eq!(cgst + sgst, round_money(gst));
        }
    }

    #[test]
    fn split_gst_rounds_excess_precision_first() {
        let (cgst, sgst) = split_gst(d("10.005"));
        assert_eq!(cgst + sgst, d("10.01"));
        assert_eq!(cgst, d("5.005"));
    }

    #[test]
    fn discount_by_percentage_and_absolute() {
        assert_eq!(
            discount_amount(d("1000"), DiscountType::Percentage, d("5")),
            Some(d("50"))
        );
        assert_eq!(
            discount_amount(d("1000"), DiscountType::Absolute, d("75.5")),
            Some(d("75.5"))
        );
    }

    #[test]
    fn consistent_invoice_passes_verification() {
        // 2 x 250 at 18% = 500 + 90; 1 x 100 at 5% = 100 + 5
        let items = vec![
            item("2", "250", "18", "500", "590"),
            item("1", "100", "5", "100", "105"),
        ];
        let invoice = invoice(items, "695", "95", "735");
        assert_eq!(verify_totals(&invoice, d("0.01")), Ok(()));
    }

    #[test]
    fn tampered_line_total_is_rejected() {
        let items = vec![item("2", "250", "18", "500", "550")];
        let invoice = invoice(items, "550", "50", "590");
        let err = verify_totals(&invoice, d("0.01")).unwrap_err();
        assert!(err.contains("Product 1 price including GST"), "{}", err);
    }

    #[test]
    fn tampered_grand_total_is_rejected() {
        let items = vec![item("2", "250", "18", "500", "590")];
        let invoice = invoice(items, "590", "90", "1.00");
        let err = verify_totals(&invoice, d("0.01")).unwrap_err();
        assert!(err.starts_with("Invoice total"), "{}", err);
    }

    #[test]
    fn rounding_noise_within_tolerance_is_accepted() {
        // 3 x 33.33 = 99.99; with 12% GST 111.9888 rounds to 111.99
        let items = vec![item("3", "33.33", "12", "99.99", "111.99")];
        let invoice = invoice(items, "111.99", "12.00", "151.99");
        assert_eq!(verify_totals(&invoice, d("0.01")), Ok(()));
    }

    #[test]
    fn line_arithmetic_overflow_is_none() {
        assert_eq!(line_base_amount(Decimal::MAX, d("2")), None);
        assert_eq!(line_total_with_gst(Decimal::MAX, d("18")), None);
        assert_eq!(discount_amount(Decimal::MAX, DiscountType::Percentage, d("5")), None);
    }

    #[test]
    fn oversized_figures_are_rejected_not_panicked() {
        let items = vec![item("79000000000000000000000000000", "2", "18", "1", "1")];
        let invoice = invoice(items, "1", "0", "1");
        let err = verify_totals(&invoice, d("0.01")).unwrap_err();
        assert!(err.contains("too large"), "{}", err);
    }

    #[test]
    fn oversized_sum_of_lines_is_rejected() {
        let huge = Decimal::MAX;
        let mut first = item("1", "0", "0", "0", "0");
        first.total_with_gst = huge;
        first.base_amount = huge;
        first.rate = huge;
        let second = first.clone();
        let invoice = invoice(vec![first, second], "1", "0", "1");
        let err = verify_totals(&invoice, d("0.01")).unwrap_err();
        assert!(err.starts_with("Total with GST is too large"), "{}", err);
    }
}
