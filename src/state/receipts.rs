use chrono::Utc;
use futures::stream::TryStreamExt;
use mongodb::bson::{DateTime, doc, oid::ObjectId};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::billing::{
    AppliedPayment, allocate_receipt_items, apply_payment, flat_totals,
    payment::{LedgerInput, validate_details},
    receipt_number, record_payment_history,
    validate::{check_discount, check_line_items},
};
use crate::emails;
use crate::error::{AppError, AppResult, is_duplicate_key_error};
use crate::models::{
    Currency, Invoice, InvoiceSnapshot, InvoiceStatus, LineItem, NotificationType, PaymentDetails,
    PaymentStatus, Receipt, ReceiptPayment, TemplateKind,
};

use super::{
    AppState, Counter, ListQuery, Page, apply_search, default_template, get_client, get_invoice,
    get_template, next_counter, notify, overpayment_note, owner_filter, paginate, parse_date,
    parse_id, parse_payload, payment_limits, require_fields, require_user, to_bson,
    update_invoice_versioned,
};

const ROLLBACK_ATTEMPTS: u32 = 2;

/// Dotted paths a receipt payload must carry once invoice defaults are filled in.
pub const RECEIPT_REQUIRED: [&str; 7] = [
    "client",
    "items",
    "currency",
    "template",
    "payment",
    "payment.amount_paid",
    "payment.details",
];

#[derive(Debug, Clone, Deserialize)]
pub struct ReceiptPaymentInput {
    pub details: PaymentDetails,
    pub amount_paid: Decimal,
    #[serde(default)]
    pub status: Option<PaymentStatus>,
    #[serde(default)]
    pub date_paid: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReceiptInput {
    pub client: String,
    pub template: String,
    pub currency: Currency,
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub discount: Decimal,
    pub payment: ReceiptPaymentInput,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub invoice: Option<String>,
}

fn invoice_snapshot(invoice: &Invoice, applied: &AppliedPayment) -> InvoiceSnapshot {
    InvoiceSnapshot {
        invoice_number: invoice.invoice_number.clone(),
        invoice_date: invoice.created_at,
        invoice_total: invoice.total,
        previously_paid: applied.previous_amount,
        balance_due: applied.balance_due,
    }
}

fn is_canceled(invoice: &Invoice) -> bool {
    invoice.status == InvoiceStatus::Canceled || invoice.payment.status == PaymentStatus::Canceled
}

/// Fill client, items, currency and template from the invoice where the payload left them out.
fn fill_from_invoice(payload: &mut Value, invoice: &Invoice) -> AppResult<()> {
    let Some(map) = payload.as_object_mut() else {
        return Err(AppError::validation("Receipt payload must be an object"));
    };
    let blank = |v: Option<&Value>| match v {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        _ => false,
    };
    if blank(map.get("client")) {
        map.insert("client".into(), json!(invoice.client.to_hex()));
    }
    if blank(map.get("items")) {
        let items = serde_json::to_value(&invoice.line_items)
            .map_err(|e| AppError::Internal(e.into()))?;
        map.insert("items".into(), items);
    }
    if blank(map.get("currency")) {
        map.insert("currency".into(), json!(invoice.currency.as_str()));
    }
    if blank(map.get("template")) {
        map.insert("template".into(), json!(invoice.template.to_hex()));
    }
    Ok(())
}

/// Reserve a receipt number and insert; a number collision gets one fresh retry.
async fn insert_with_fresh_number(
    state: &AppState,
    user: &ObjectId,
    mut receipt: Receipt,
) -> AppResult<Receipt> {
    let mut retried = false;
    loop {
        let counter = next_counter(state, user, Counter::Receipt).await?;
        receipt.receipt_number = receipt_number(counter, Utc::now());
        match state.receipts.insert_one(&receipt).await {
            Ok(res) => {
                receipt.id = res.inserted_id.as_object_id();
                return Ok(receipt);
            }
            Err(err) if is_duplicate_key_error(&err) && !retried => {
                warn!(receipt_number = %receipt.receipt_number, "receipt number taken, retrying");
                retried = true;
            }
            Err(err) if is_duplicate_key_error(&err) => {
                return Err(AppError::Duplicate(format!(
                    "Receipt number {} already exists",
                    receipt.receipt_number
                )));
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Record a receipt. With `invoice` set the payment is also applied to that invoice
/// (ledger entry, amount paid, status) under its version check.
pub async fn create_receipt(state: &AppState, user_id: &ObjectId, mut payload: Value) -> AppResult<Receipt> {
    let linked = match payload.get("invoice").and_then(Value::as_str) {
        Some(raw) if !raw.trim().is_empty() => {
            let invoice_id = parse_id(raw, "invoice")?;
            let invoice = get_invoice(state, user_id, &invoice_id).await?;
            if is_canceled(&invoice) {
                return Err(AppError::InvalidState(
                    "Cannot issue a receipt against a canceled invoice".to_string(),
                ));
            }
            fill_from_invoice(&mut payload, &invoice)?;
            if let Some(raw) = payload.get("client").and_then(Value::as_str) {
                if parse_id(raw, "client")? != invoice.client {
                    return Err(AppError::validation(
                        "Receipt client must be the client of the linked invoice",
                    ));
                }
            }
            Some(invoice)
        }
        _ => None,
    };

    require_fields(&payload, &RECEIPT_REQUIRED)?;
    let input: ReceiptInput = parse_payload(payload)?;
    if input.payment.status == Some(PaymentStatus::Canceled) {
        return Err(AppError::InvalidState(
            "Cannot issue a receipt for a canceled payment".to_string(),
        ));
    }
    validate_details(&input.payment.details, true)?;
    check_line_items(&input.items)?;
    check_discount(input.discount)?;
    let date_paid = match input.payment.date_paid.as_deref() {
        Some(raw) => parse_date(raw, "payment.date_paid")?,
        None => DateTime::now(),
    };
    let client_id = parse_id(&input.client, "client")?;
    let template_id = parse_id(&input.template, "template")?;

    let (user, client, _template) = tokio::try_join!(
        require_user(state, user_id),
        get_client(state, user_id, &client_id),
        get_template(state, &template_id),
    )?;

    let limits = payment_limits(state);
    let applied = match &linked {
        Some(invoice) => Some(apply_payment(invoice, input.payment.amount_paid, &limits)?),
        None => {
            limits.check(input.payment.amount_paid)?;
            None
        }
    };

    let totals = flat_totals(&input.items, input.discount);
    let payment = ReceiptPayment {
        details: input.payment.details.clone(),
        status: match &applied {
            Some(applied) => applied.payment_status,
            None => input.payment.status.unwrap_or(PaymentStatus::Paid),
        },
        amount_paid: applied
            .as_ref()
            .map_or(input.payment.amount_paid, |a| a.applied),
        date_paid,
    };
    let receipt = Receipt {
        id: None,
        receipt_number: String::new(),
        client: client_id,
        creator: *user_id,
        template: template_id,
        currency: input.currency,
        items: input.items,
        subtotal: totals.subtotal,
        tax: totals.tax,
        discount: totals.discount,
        total: totals.total,
        payment,
        notes: input.notes,
        invoice: linked.as_ref().and_then(|i| i.id),
        invoice_snapshot: linked
            .as_ref()
            .zip(applied.as_ref())
            .map(|(invoice, applied)| invoice_snapshot(invoice, applied)),
        client_snapshot: client.snapshot(),
        creator_snapshot: user.snapshot(""),
        is_deleted: false,
        deleted_at: None,
        created_at: DateTime::now(),
    };
    let receipt = insert_with_fresh_number(state, user_id, receipt).await?;

    if let (Some(invoice), Some(applied)) = (linked, applied.as_ref()) {
        let note = (!receipt.notes.trim().is_empty()).then(|| receipt.notes.clone());
        if let Err(err) = apply_to_invoice(state, user_id, invoice, applied, &receipt, note).await {
            let Some(id) = receipt.id else {
                return Err(err);
            };
            let receipts = state.receipts.clone();
            let delete = || {
                let receipts = receipts.clone();
                async move {
                    receipts
                        .delete_one(doc! { "_id": id })
                        .await
                        .map(drop)
                        .map_err(anyhow::Error::from)
                }
            };
            return Err(roll_back_receipt(&receipt.receipt_number, receipt.invoice, err, delete).await);
        }
    }

    notify(
        state,
        user_id,
        "New Receipt Created",
        &format!("Receipt {} was issued to {}", receipt.receipt_number, client.name),
        NotificationType::Success,
    );
    Ok(receipt)
}

/// Remove a receipt whose invoice update failed, trying the delete twice. `cause` is
/// returned once the receipt is gone; a receipt that survives is named in the error.
async fn roll_back_receipt<F, Fut>(
    receipt_number: &str,
    invoice: Option<ObjectId>,
    cause: AppError,
    mut delete: F,
) -> AppError
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let mut failure = None;
    for attempt in 1..=ROLLBACK_ATTEMPTS {
        match delete().await {
            Ok(()) => return cause,
            Err(err) => {
                error!(
                    receipt = receipt_number,
                    invoice = ?invoice,
                    attempt,
                    error = %err,
                    "failed to roll back receipt"
                );
                failure = Some(err);
            }
        }
    }
    let detail = failure.map(|err| err.to_string()).unwrap_or_default();
    AppError::Internal(anyhow::anyhow!(
        "Receipt {receipt_number} was stored but not applied to its invoice ({cause}) and could not be removed: {detail}"
    ))
}

async fn apply_to_invoice(
    state: &AppState,
    user: &ObjectId,
    mut invoice: Invoice,
    applied: &AppliedPayment,
    receipt: &Receipt,
    notes: Option<String>,
) -> AppResult<Invoice> {
    let limits = payment_limits(state);
    let notes = overpayment_note(notes, applied, invoice.currency);
    let entry = record_payment_history(
        &mut invoice,
        LedgerInput {
            amount: applied.applied,
            previous_amount: applied.previous_amount,
            details: receipt.payment.details.clone(),
            notes,
            date: receipt.payment.date_paid,
            user: *user,
            receipt_number: Some(receipt.receipt_number.clone()),
        },
        limits.min,
    )?
    .clone();
    let updated = update_invoice_versioned(
        state,
        &invoice,
        doc! {
            "$set": {
                "payment.amount_paid": to_bson(&applied.amount_paid)?,
                "payment.status": applied.payment_status.as_str(),
                "payment.date_paid": receipt.payment.date_paid,
                "status": applied.invoice_status.as_str(),
                "updated_at": DateTime::now(),
            },
            "$push": { "payment_history": to_bson(&entry)? },
        },
    )
    .await?;
    info!(
        invoice = ?updated.id,
        receipt = %receipt.receipt_number,
        applied = %applied.applied,
        status = applied.invoice_status.as_str(),
        "receipt applied to invoice"
    );
    Ok(updated)
}

/// Receipt for a payment already recorded on `invoice`. Items are the invoice items
/// scaled to the applied amount; the ledger entry is not touched.
pub async fn auto_generate_receipt(
    state: &AppState,
    invoice: &Invoice,
    applied: &AppliedPayment,
    details: &PaymentDetails,
    date_paid: DateTime,
) -> AppResult<Receipt> {
    let items = allocate_receipt_items(&invoice.line_items, applied.applied);
    if items.is_empty() {
        return Err(AppError::validation("Payment too small to allocate to any line item"));
    }
    let template = match default_template(state, TemplateKind::Receipt).await? {
        Some(template) => template.id.unwrap_or(invoice.template),
        None => invoice.template,
    };
    let user = require_user(state, &invoice.creator).await?;
    let totals = flat_totals(&items, Decimal::ZERO);
    let receipt = Receipt {
        id: None,
        receipt_number: String::new(),
        client: invoice.client,
        creator: invoice.creator,
        template,
        currency: invoice.currency,
        items,
        subtotal: totals.subtotal,
        tax: totals.tax,
        discount: totals.discount,
        total: totals.total,
        payment: ReceiptPayment {
            details: details.clone(),
            status: applied.payment_status,
            amount_paid: applied.applied,
            date_paid,
        },
        notes: format!("Payment towards invoice #{}", invoice.invoice_number),
        invoice: invoice.id,
        invoice_snapshot: Some(invoice_snapshot(invoice, applied)),
        client_snapshot: invoice.client_snapshot.clone(),
        creator_snapshot: user.snapshot(""),
        is_deleted: false,
        deleted_at: None,
        created_at: DateTime::now(),
    };
    let receipt = insert_with_fresh_number(state, &invoice.creator, receipt).await?;
    info!(invoice = ?invoice.id, receipt = %receipt.receipt_number, "receipt generated");
    notify(
        state,
        &invoice.creator,
        "Receipt Generated",
        &format!(
            "Receipt {} was generated for invoice #{}",
            receipt.receipt_number, invoice.invoice_number
        ),
        NotificationType::Success,
    );
    Ok(receipt)
}

pub async fn list_receipts(
    state: &AppState,
    user: &ObjectId,
    query: &ListQuery,
) -> AppResult<Page<Receipt>> {
    let mut filter = owner_filter(user, false);
    if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
        filter.insert("payment.status", status);
    }
    apply_search(
        &mut filter,
        &["receipt_number", "client_snapshot.name", "invoice_snapshot.invoice_number"],
        query.search.as_deref(),
    );
    paginate(&state.receipts, filter, doc! { "created_at": -1 }, query).await
}

pub async fn list_deleted_receipts(
    state: &AppState,
    user: &ObjectId,
    query: &ListQuery,
) -> AppResult<Page<Receipt>> {
    super::trash(&state.receipts, user, query).await
}

pub async fn get_receipt(state: &AppState, user: &ObjectId, id: &ObjectId) -> AppResult<Receipt> {
    state
        .receipts
        .find_one(doc! { "_id": id, "creator": user, "is_deleted": { "$ne": true } })
        .await?
        .ok_or_else(|| AppError::not_found("Receipt"))
}

pub async fn receipts_for_invoice(
    state: &AppState,
    user: &ObjectId,
    invoice: &ObjectId,
) -> AppResult<Vec<Receipt>> {
    let mut filter = owner_filter(user, false);
    filter.insert("invoice", invoice);
    let mut cursor = state
        .receipts
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .await?;
    let mut items = Vec::new();
    while let Some(receipt) = cursor.try_next().await? {
        items.push(receipt);
    }
    Ok(items)
}

/// Email the receipt to its client. Delivery errors surface.
pub async fn send_receipt(state: &AppState, user: &ObjectId, id: &ObjectId) -> AppResult<Receipt> {
    let receipt = get_receipt(state, user, id).await?;
    emails::deliver(state, emails::receipt_email(state, &receipt)).await?;
    Ok(receipt)
}

/// Public view: no owner check.
pub async fn view_receipt(state: &AppState, id: &ObjectId) -> AppResult<Receipt> {
    state
        .receipts
        .find_one(doc! { "_id": id, "is_deleted": { "$ne": true } })
        .await?
        .ok_or_else(|| AppError::not_found("Receipt"))
}

pub async fn delete_receipt(state: &AppState, user: &ObjectId, id: &ObjectId) -> AppResult<()> {
    super::soft_delete(&state.receipts, user, id, "Receipt").await
}

pub async fn restore_receipt(state: &AppState, user: &ObjectId, id: &ObjectId) -> AppResult<Receipt> {
    super::restore(&state.receipts, user, id, "Receipt").await?;
    get_receipt(state, user, id).await
}
