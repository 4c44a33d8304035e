// billing module: pure document rules (totals, numbering, payments, allocation, lifecycle).
// Nothing here touches MongoDB; state::* calls into it and persists the results.

pub mod allocation;
pub mod lifecycle;
pub mod numbering;
pub mod payment;
pub mod totals;
pub mod validate;

pub use allocation::allocate_receipt_items;
pub use numbering::{document_number, receipt_number};
pub use payment::{AppliedPayment, PaymentLimits, apply_payment, record_payment_history};
pub use totals::{Totals, VAT_RATE, flat_totals, quotation_totals};

#[cfg(test)]
pub(crate) mod testing {
    use mongodb::bson::{DateTime, oid::ObjectId};
    use rust_decimal::Decimal;

    use crate::models::{
        ClientSnapshot, CreatorSnapshot, Currency, Invoice, InvoicePayment, InvoiceStatus,
        ItemCategory, LineItem, MpesaChannel, PaymentDetails, PaymentStatus,
    };

    pub fn line(description: &str, quantity: Decimal, unit_price: Decimal) -> LineItem {
        LineItem {
            description: description.to_string(),
            quantity,
            unit_price,
            category: ItemCategory::Service,
            other_name: None,
            discount: Decimal::ZERO,
        }
    }

    /// Invoice whose total is exactly `total` (no tax, no discount).
    pub fn invoice_with_total(total: Decimal) -> Invoice {
        Invoice {
            id: Some(ObjectId::new()),
            invoice_number: "00001".into(),
            name: "Website".into(),
            project_description: String::new(),
            notes: String::new(),
            client: ObjectId::new(),
            creator: ObjectId::new(),
            template: ObjectId::new(),
            currency: Currency::KSH,
            due_date: DateTime::now(),
            line_items: vec![line("Website", Decimal::ONE, total)],
            subtotal: total,
            tax: Decimal::ZERO,
            discount: Decimal::ZERO,
            total,
            payment: InvoicePayment {
                details: PaymentDetails::Mpesa {
                    channel: MpesaChannel::Paybill {
                        till_number: "123456".into(),
                    },
                    transaction_id: None,
                },
                status: PaymentStatus::Pending,
                amount_paid: Decimal::ZERO,
                date_paid: None,
            },
            payment_history: Vec::new(),
            status: InvoiceStatus::Sent,
            quotation: None,
            client_snapshot: ClientSnapshot::default(),
            creator_snapshot: CreatorSnapshot::default(),
            version: 0,
            is_deleted: false,
            deleted_at: None,
            created_at: DateTime::now(),
            updated_at: None,
        }
    }
}
