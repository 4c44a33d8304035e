// billing/payment.rs
// Payment application rules: method validation, status derivation, over-payment cap, ledger append.

use mongodb::bson::{DateTime, oid::ObjectId};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::models::{
    Invoice, InvoiceStatus, MpesaChannel, PaymentDetails, PaymentHistoryEntry, PaymentStatus,
};

/// Accepted range for a single submitted payment.
#[derive(Debug, Clone, Copy)]
pub struct PaymentLimits {
    pub min: Decimal,
    pub max: Decimal,
}

impl PaymentLimits {
    pub fn check(&self, amount: Decimal) -> AppResult<()> {
        if amount < self.min || amount > self.max {
            return Err(AppError::validation(format!(
                "Payment amount must be between {} and {}",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

fn require(value: &str, field: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("Payment field `{field}` is required")));
    }
    Ok(())
}

/// Check the method-specific fields. Invoices do not accept cash.
pub fn validate_details(details: &PaymentDetails, allow_cash: bool) -> AppResult<()> {
    match details {
        PaymentDetails::Mpesa { channel, .. } => match channel {
            MpesaChannel::Paybill { till_number } => require(till_number, "till_number"),
            MpesaChannel::SendMoney { phone_number, .. } => require(phone_number, "phone_number"),
        },
        PaymentDetails::Bank {
            bank_name,
            account_number,
            ..
        } => {
            require(bank_name, "bank_name")?;
            require(account_number, "account_number")
        }
        PaymentDetails::Cash { received_by } => {
            if !allow_cash {
                return Err(AppError::validation("Cash is not a valid invoice payment method"));
            }
            require(received_by, "received_by")
        }
    }
}

/// Human readable summary of a payment method, used by rendered documents.
pub fn describe(details: &PaymentDetails) -> (String, String) {
    match details {
        PaymentDetails::Mpesa { channel, transaction_id } => {
            let mut line = match channel {
                MpesaChannel::Paybill { till_number } => format!("Till Number: {till_number}"),
                MpesaChannel::SendMoney { phone_number, .. } => format!("Phone Number: {phone_number}"),
            };
            if let Some(id) = transaction_id {
                line.push_str(&format!(" (Transaction: {id})"));
            }
            ("M-Pesa".to_string(), line)
        }
        PaymentDetails::Bank {
            bank_name,
            account_number,
            transaction_reference,
        } => {
            let mut line = format!("Bank: {bank_name}, Account: {account_number}");
            if let Some(reference) = transaction_reference {
                line.push_str(&format!(" (Reference: {reference})"));
            }
            ("Bank Transfer".to_string(), line)
        }
        PaymentDetails::Cash { received_by } => {
            ("Cash".to_string(), format!("Received by: {received_by}"))
        }
    }
}

/// Payment status as a function of what has been paid.
pub fn derive_status(amount_paid: Decimal, total: Decimal) -> PaymentStatus {
    if amount_paid >= total && amount_paid > Decimal::ZERO {
        PaymentStatus::Paid
    } else if amount_paid > Decimal::ZERO {
        PaymentStatus::Partial
    } else {
        PaymentStatus::Pending
    }
}

/// Outcome of applying one payment to an invoice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedPayment {
    pub submitted: Decimal,
    pub applied: Decimal,
    pub overpayment: Decimal,
    pub previous_amount: Decimal,
    pub amount_paid: Decimal,
    pub balance_due: Decimal,
    pub payment_status: PaymentStatus,
    pub invoice_status: InvoiceStatus,
}

/// Decide how much of `amount` lands on the invoice and what the invoice becomes.
///
/// Amounts above the outstanding balance are capped; the excess is returned as
/// `overpayment`. Canceled invoices and invoices with nothing left to pay are rejected.
/// Overdue invoices stay overdue until settled.
pub fn apply_payment(
    invoice: &Invoice,
    amount: Decimal,
    limits: &PaymentLimits,
) -> AppResult<AppliedPayment> {
    if invoice.status == InvoiceStatus::Canceled
        || invoice.payment.status == PaymentStatus::Canceled
    {
        return Err(AppError::InvalidState(
            "Payments cannot be recorded on a canceled invoice".to_string(),
        ));
    }
    let outstanding = invoice.outstanding();
    if outstanding <= Decimal::ZERO {
        return Err(AppError::ImmutableState(
            "Invoice is already fully paid".to_string(),
        ));
    }
    limits.check(amount)?;

    let previous_amount = invoice.payment.amount_paid;
    let applied = amount.min(outstanding);
    let amount_paid = previous_amount + applied;
    let derived = derive_status(amount_paid, invoice.total);

    let (payment_status, invoice_status) = match derived {
        PaymentStatus::Paid => (PaymentStatus::Paid, InvoiceStatus::Paid),
        _ if invoice.status == InvoiceStatus::Overdue => {
            (PaymentStatus::Overdue, InvoiceStatus::Overdue)
        }
        _ => (PaymentStatus::Partial, InvoiceStatus::Partial),
    };

    Ok(AppliedPayment {
        submitted: amount,
        applied,
        overpayment: amount - applied,
        previous_amount,
        amount_paid,
        balance_due: invoice.total - amount_paid,
        payment_status,
        invoice_status,
    })
}

pub struct LedgerInput {
    pub amount: Decimal,
    pub previous_amount: Decimal,
    pub details: PaymentDetails,
    pub notes: Option<String>,
    pub date: DateTime,
    pub user: ObjectId,
    pub receipt_number: Option<String>,
}

/// Append a ledger entry to the in-memory invoice; the caller persists it.
///
/// The increment must reach `min` unless it settles the remaining balance.
pub fn record_payment_history<'a>(
    invoice: &'a mut Invoice,
    input: LedgerInput,
    min: Decimal,
) -> AppResult<&'a PaymentHistoryEntry> {
    let settles = input.previous_amount + input.amount >= invoice.total;
    if input.amount <= Decimal::ZERO || (input.amount < min && !settles) {
        return Err(AppError::validation(format!(
            "Payment increment must be at least {min}"
        )));
    }
    invoice.payment_history.push(PaymentHistoryEntry {
        date: input.date,
        amount: input.amount,
        previous_amount: input.previous_amount,
        details: input.details,
        notes: input.notes,
        created_by: input.user,
        receipt_number: input.receipt_number,
    });
    invoice
        .payment_history
        .last()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("payment history append failed")))
}

/// Ledger newest first.
pub fn history_newest_first(invoice: &Invoice) -> Vec<PaymentHistoryEntry> {
    let mut entries = invoice.payment_history.clone();
    entries.sort_by(|a, b| b.date.cmp(&a.date));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::testing::invoice_with_total;
    use rust_decimal_macros::dec;

    fn limits() -> PaymentLimits {
        PaymentLimits {
            min: dec!(5),
            max: dec!(500000),
        }
    }

    fn pay(invoice: &mut Invoice, amount: Decimal) -> AppliedPayment {
        let applied = apply_payment(invoice, amount, &limits()).unwrap();
        invoice.payment.amount_paid = applied.amount_paid;
        invoice.payment.status = applied.payment_status;
        invoice.status = applied.invoice_status;
        applied
    }

    #[test]
    fn sequential_payments_cap_at_total() {
        let mut invoice = invoice_with_total(dec!(1000));
        assert_eq!(pay(&mut invoice, dec!(400)).invoice_status, InvoiceStatus::Partial);
        assert_eq!(pay(&mut invoice, dec!(400)).invoice_status, InvoiceStatus::Partial);

        let last = pay(&mut invoice, dec!(300));
        assert_eq!(last.invoice_status, InvoiceStatus::Paid);
        assert_eq!(last.applied, dec!(200));
        assert_eq!(last.overpayment, dec!(100));
        assert_eq!(invoice.payment.amount_paid, dec!(1000));
        assert_eq!(last.balance_due, Decimal::ZERO);
    }

    #[test]
    fn paid_invoice_rejects_more_payments() {
        let mut invoice = invoice_with_total(dec!(100));
        pay(&mut invoice, dec!(100));
        let err = apply_payment(&invoice, dec!(10), &limits()).unwrap_err();
        assert!(matches!(err, AppError::ImmutableState(_)));
    }

    #[test]
    fn canceled_invoice_rejects_payments() {
        let mut invoice = invoice_with_total(dec!(100));
        invoice.status = InvoiceStatus::Canceled;
        let err = apply_payment(&invoice, dec!(10), &limits()).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[test]
    fn amount_outside_limits_is_rejected() {
        let invoice = invoice_with_total(dec!(1000000));
        assert!(matches!(
            apply_payment(&invoice, dec!(4.99), &limits()),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            apply_payment(&invoice, dec!(500001), &limits()),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn overdue_stays_overdue_until_settled() {
        let mut invoice = invoice_with_total(dec!(500));
        invoice.status = InvoiceStatus::Overdue;
        invoice.payment.status = PaymentStatus::Overdue;
        assert_eq!(pay(&mut invoice, dec!(100)).invoice_status, InvoiceStatus::Overdue);
        assert_eq!(pay(&mut invoice, dec!(400)).invoice_status, InvoiceStatus::Paid);
    }

    #[test]
    fn derive_status_boundaries() {
        assert_eq!(derive_status(dec!(0), dec!(10)), PaymentStatus::Pending);
        assert_eq!(derive_status(dec!(9.99), dec!(10)), PaymentStatus::Partial);
        assert_eq!(derive_status(dec!(10), dec!(10)), PaymentStatus::Paid);
    }

    #[test]
    fn ledger_rejects_small_increment_unless_it_settles() {
        let mut invoice = invoice_with_total(dec!(100));
        let user = ObjectId::new();
        let entry = |amount, previous_amount| LedgerInput {
            amount,
            previous_amount,
            details: PaymentDetails::Cash {
                received_by: "Front desk".into(),
            },
            notes: None,
            date: DateTime::now(),
            user,
            receipt_number: None,
        };

        assert!(record_payment_history(&mut invoice, entry(dec!(2), dec!(0)), dec!(5)).is_err());
        assert!(invoice.payment_history.is_empty());

        record_payment_history(&mut invoice, entry(dec!(97), dec!(0)), dec!(5)).unwrap();
        let last = record_payment_history(&mut invoice, entry(dec!(3), dec!(97)), dec!(5)).unwrap();
        assert_eq!(last.previous_amount, dec!(97));
        assert_eq!(invoice.payment_history.len(), 2);
    }

    #[test]
    fn invoice_methods_exclude_cash() {
        let cash = PaymentDetails::Cash {
            received_by: "Amina".into(),
        };
        assert!(validate_details(&cash, false).is_err());
        assert!(validate_details(&cash, true).is_ok());

        let paybill = PaymentDetails::Mpesa {
            channel: MpesaChannel::Paybill {
                till_number: " ".into(),
            },
            transaction_id: None,
        };
        assert!(validate_details(&paybill, false).is_err());
    }

    #[test]
    fn tagged_payload_requires_channel_fields() {
        let parsed: Result<PaymentDetails, _> = serde_json::from_value(serde_json::json!({
            "method": "mpesa",
            "channel": { "type": "send_money" }
        }));
        assert!(parsed.is_err());

        let parsed: PaymentDetails = serde_json::from_value(serde_json::json!({
            "method": "bank",
            "bank_name": "KCB",
            "account_number": "0011223344"
        }))
        .unwrap();
        assert_eq!(parsed.method_str(), "bank");
    }
}
