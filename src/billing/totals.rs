// billing/totals.rs
// Subtotal / tax / total computation for quotations, invoices and receipts.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::{LineItem, QuoteLineItem};

/// Flat VAT rate (16%).
pub const VAT_RATE: Decimal = Decimal::from_parts(16, 0, 0, false, 2); // 0.16

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

impl Totals {
    fn new(subtotal: Decimal, tax: Decimal, discount: Decimal) -> Self {
        Totals {
            subtotal,
            tax,
            discount,
            total: subtotal + tax - discount,
        }
    }
}

/// Quotation totals: only items flagged `apply_tax` are taxed.
pub fn quotation_totals(items: &[QuoteLineItem], discount: Decimal) -> Totals {
    let subtotal = items.iter().map(QuoteLineItem::line_total).sum();
    let tax = items
        .iter()
        .filter(|item| item.apply_tax)
        .map(|item| item.line_total() * VAT_RATE)
        .sum();
    Totals::new(subtotal, tax, discount)
}

/// Invoice and receipt totals: VAT applies to every item.
pub fn flat_totals(items: &[LineItem], discount: Decimal) -> Totals {
    let subtotal: Decimal = items.iter().map(LineItem::line_total).sum();
    Totals::new(subtotal, subtotal * VAT_RATE, discount)
}
