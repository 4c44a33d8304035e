// billing/lifecycle.rs
// Status transitions for quotations and invoices, and the invoice edit gate.

use rust_decimal::Decimal;

use crate::error::{AppError, AppResult};
use crate::models::{Invoice, InvoiceStatus, LineItem, PaymentStatus, QuotationStatus};

/// Invoice statuses the overdue sweep may flip.
pub const OVERDUE_CANDIDATES: [InvoiceStatus; 4] = [
    InvoiceStatus::Pending,
    InvoiceStatus::Partial,
    InvoiceStatus::Sent,
    InvoiceStatus::Viewed,
];

/// Invoice statuses from which cancellation is allowed.
pub const CANCELABLE: [InvoiceStatus; 3] = [
    InvoiceStatus::Sent,
    InvoiceStatus::Draft,
    InvoiceStatus::Pending,
];

/// Quotations can only be decided (accepted/rejected) while still open.
pub fn check_quotation_decision(
    current: QuotationStatus,
    target: QuotationStatus,
) -> AppResult<()> {
    if !matches!(target, QuotationStatus::Accepted | QuotationStatus::Rejected) {
        return Err(AppError::InvalidState(format!(
            "Invalid status `{}`; expected accepted or rejected",
            target.as_str()
        )));
    }
    if !matches!(
        current,
        QuotationStatus::Draft | QuotationStatus::Sent | QuotationStatus::Viewed
    ) {
        return Err(AppError::InvalidState(format!(
            "Cannot change status of a {} quotation",
            current.as_str()
        )));
    }
    Ok(())
}

pub fn check_cancel(invoice: &Invoice) -> AppResult<()> {
    if CANCELABLE.contains(&invoice.status) {
        Ok(())
    } else {
        Err(AppError::InvalidState(format!(
            "Cannot cancel an invoice with status {}",
            invoice.status.as_str()
        )))
    }
}

/// What kind of edit an invoice currently allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMode {
    Open,
    AppendOnly,
    Locked,
}

/// Derived from what has been paid, not from the status string.
pub fn edit_mode(invoice: &Invoice) -> EditMode {
    let paid = invoice.payment.amount_paid;
    if invoice.status == InvoiceStatus::Canceled
        || invoice.status == InvoiceStatus::Paid
        || invoice.payment.status == PaymentStatus::Paid
        || (paid > Decimal::ZERO && paid >= invoice.total)
    {
        EditMode::Locked
    } else if paid > Decimal::ZERO {
        EditMode::AppendOnly
    } else {
        EditMode::Open
    }
}

/// Existing items must come back unchanged and in order; only new items may follow.
pub fn check_append_only(existing: &[LineItem], incoming: &[LineItem]) -> AppResult<()> {
    if incoming.len() < existing.len() {
        return Err(AppError::ImmutableState(
            "Line items cannot be removed from a partially paid invoice".to_string(),
        ));
    }
    if let Some(index) = existing
        .iter()
        .zip(incoming)
        .position(|(stored, sent)| stored != sent)
    {
        return Err(AppError::ImmutableState(format!(
            "Line item {} cannot be modified on a partially paid invoice",
            index + 1
        )));
    }
    if incoming.len() == existing.len() {
        return Err(AppError::validation("No new line items to append"));
    }
    Ok(())
}

/// `sent` documents become `viewed` when the client opens them.
pub fn invoice_after_view(status: InvoiceStatus) -> Option<InvoiceStatus> {
    (status == InvoiceStatus::Sent).then_some(InvoiceStatus::Viewed)
}

pub fn quotation_after_view(status: QuotationStatus) -> Option<QuotationStatus> {
    (status == QuotationStatus::Sent).then_some(QuotationStatus::Viewed)
}
