use futures::stream::TryStreamExt;
use mongodb::{
    bson::{DateTime, Document, doc, oid::ObjectId},
    options::ReturnDocument,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::billing::{
    AppliedPayment, PaymentLimits, apply_payment, document_number, flat_totals,
    lifecycle::{
        EditMode, OVERDUE_CANDIDATES, check_append_only, check_cancel, edit_mode, invoice_after_view,
    },
    payment::{LedgerInput, history_newest_first, validate_details},
    record_payment_history,
    validate::{check_discount, check_line_items},
};
use crate::emails;
use crate::error::{AppError, AppResult};
use crate::models::{
    Currency, Invoice, InvoicePayment, InvoiceStatus, LineItem, NotificationType, PaymentDetails,
    PaymentHistoryEntry, PaymentStatus, Quotation, Receipt, User,
};

use super::{
    AppState, Counter, ListQuery, Page, apply_search, auto_generate_receipt, get_client,
    get_quotation, get_template, next_counter, notify, owner_filter, paginate, parse_date,
    parse_id, parse_payload, require_user, to_bson,
};

/// Keys a partially paid invoice still accepts in an edit.
const APPEND_ONLY_KEYS: [&str; 2] = ["line_items", "version"];

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentInput {
    pub details: PaymentDetails,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateInvoiceInput {
    pub client: String,
    pub template: String,
    pub name: String,
    #[serde(default)]
    pub project_description: String,
    #[serde(default)]
    pub notes: String,
    pub currency: Currency,
    pub due_date: String,
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub discount: Decimal,
    pub payment: PaymentInput,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FromQuotationInput {
    pub payment: PaymentInput,
    pub due_date: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoicePatch {
    #[serde(alias = "__v")]
    pub version: Option<i64>,
    pub name: Option<String>,
    pub project_description: Option<String>,
    pub notes: Option<String>,
    pub currency: Option<Currency>,
    pub due_date: Option<String>,
    pub template: Option<String>,
    pub line_items: Option<Vec<LineItem>>,
    pub discount: Option<Decimal>,
    pub payment: Option<PaymentInput>,
}

/// Body of `PATCH /api/invoices/{id}/status`: either `status: "canceled"` or a payment.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentUpdate {
    #[serde(alias = "__v")]
    pub version: i64,
    pub status: Option<String>,
    pub amount: Option<Decimal>,
    pub details: Option<PaymentDetails>,
    pub notes: Option<String>,
    pub date_paid: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentOutcome {
    pub invoice: Invoice,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied: Option<AppliedPayment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<Receipt>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentHistoryView {
    pub history: Vec<PaymentHistoryEntry>,
    pub current_status: InvoiceStatus,
    pub amount_paid: Decimal,
    pub total: Decimal,
}

pub fn payment_limits(state: &AppState) -> PaymentLimits {
    PaymentLimits {
        min: state.config.payment_min,
        max: state.config.payment_max,
    }
}

/// Apply `update` only if the stored invoice still carries `invoice.version`; bumps the version.
pub(crate) async fn update_invoice_versioned(
    state: &AppState,
    invoice: &Invoice,
    mut update: Document,
) -> AppResult<Invoice> {
    let id = invoice
        .id
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("invoice has no id")))?;
    update.insert("$inc", doc! { "version": 1_i64 });
    let updated = state
        .invoices
        .find_one_and_update(
            doc! {
                "_id": id,
                "creator": invoice.creator,
                "version": invoice.version,
                "is_deleted": { "$ne": true },
            },
            update,
        )
        .return_document(ReturnDocument::After)
        .await?;
    if let Some(invoice) = updated {
        return Ok(invoice);
    }
    let current = state
        .invoices
        .find_one(doc! { "_id": id, "creator": invoice.creator, "is_deleted": { "$ne": true } })
        .await?
        .ok_or_else(|| AppError::not_found("Invoice"))?;
    Err(AppError::version_conflict(current.version, invoice.version))
}

fn new_invoice(user: &User, creator: ObjectId, number: i64, fields: NewInvoiceFields) -> Invoice {
    let totals = flat_totals(&fields.line_items, fields.discount);
    Invoice {
        id: None,
        invoice_number: document_number(number),
        name: fields.name,
        project_description: fields.project_description,
        notes: fields.notes,
        client: fields.client,
        creator,
        template: fields.template,
        currency: fields.currency,
        due_date: fields.due_date,
        line_items: fields.line_items,
        subtotal: totals.subtotal,
        tax: totals.tax,
        discount: totals.discount,
        total: totals.total,
        payment: InvoicePayment {
            details: fields.details,
            status: PaymentStatus::Pending,
            amount_paid: Decimal::ZERO,
            date_paid: None,
        },
        payment_history: Vec::new(),
        status: InvoiceStatus::Draft,
        quotation: fields.quotation,
        client_snapshot: fields.client_snapshot,
        creator_snapshot: user.snapshot(&fields.terms),
        version: 0,
        is_deleted: false,
        deleted_at: None,
        created_at: DateTime::now(),
        updated_at: None,
    }
}

struct NewInvoiceFields {
    name: String,
    project_description: String,
    notes: String,
    client: ObjectId,
    template: ObjectId,
    currency: Currency,
    due_date: DateTime,
    line_items: Vec<LineItem>,
    discount: Decimal,
    details: PaymentDetails,
    quotation: Option<ObjectId>,
    client_snapshot: crate::models::ClientSnapshot,
    terms: String,
}

async fn insert_invoice(state: &AppState, mut invoice: Invoice) -> AppResult<Invoice> {
    match state.invoices.insert_one(&invoice).await {
        Ok(res) => {
            invoice.id = res.inserted_id.as_object_id();
            Ok(invoice)
        }
        Err(err) if crate::error::is_duplicate_key_error(&err) => Err(AppError::Duplicate(
            "An invoice with this number or quotation already exists".to_string(),
        )),
        Err(err) => Err(err.into()),
    }
}

pub async fn create_invoice(
    state: &AppState,
    user_id: &ObjectId,
    input: CreateInvoiceInput,
) -> AppResult<Invoice> {
    if input.name.trim().is_empty() {
        return Err(AppError::validation("Invoice name is required"));
    }
    check_line_items(&input.line_items)?;
    check_discount(input.discount)?;
    validate_details(&input.payment.details, false)?;
    let due_date = parse_date(&input.due_date, "due_date")?;
    let client_id = parse_id(&input.client, "client")?;
    let template_id = parse_id(&input.template, "template")?;

    let (user, client, _template) = tokio::try_join!(
        require_user(state, user_id),
        get_client(state, user_id, &client_id),
        get_template(state, &template_id),
    )?;

    let number = next_counter(state, user_id, Counter::Invoice).await?;
    let terms = user.invoice_terms.clone();
    let invoice = new_invoice(
        &user,
        *user_id,
        number,
        NewInvoiceFields {
            name: input.name.trim().to_string(),
            project_description: input.project_description,
            notes: input.notes,
            client: client_id,
            template: template_id,
            currency: input.currency,
            due_date,
            line_items: input.line_items,
            discount: input.discount,
            details: input.payment.details,
            quotation: None,
            client_snapshot: client.snapshot(),
            terms,
        },
    );
    let invoice = insert_invoice(state, invoice).await?;
    notify(
        state,
        user_id,
        "New Invoice Created",
        &format!("Invoice #{} was created for {}", invoice.invoice_number, client.name),
        NotificationType::Success,
    );
    Ok(invoice)
}

/// Insert the invoice for `quotation`. Quotation-only fields are dropped and tax is
/// recomputed at the flat rate. A second invoice for the same quotation is a `Duplicate`.
pub async fn insert_invoice_from_quotation(
    state: &AppState,
    user: &User,
    quotation: &Quotation,
    details: PaymentDetails,
    due_date: DateTime,
) -> AppResult<Invoice> {
    let user_id = user.id.ok_or_else(|| AppError::not_found("User"))?;
    let number = next_counter(state, &user_id, Counter::Invoice).await?;
    let terms = if user.invoice_terms.trim().is_empty() {
        quotation.creator_snapshot.terms.clone()
    } else {
        user.invoice_terms.clone()
    };
    let invoice = new_invoice(
        user,
        user_id,
        number,
        NewInvoiceFields {
            name: format!("Invoice for {}", quotation.name),
            project_description: quotation.project_description.clone(),
            notes: quotation.notes.clone(),
            client: quotation.client,
            template: quotation.template,
            currency: quotation.currency,
            due_date,
            line_items: quotation.line_items.iter().cloned().map(LineItem::from).collect(),
            discount: quotation.discount,
            details,
            quotation: quotation.id,
            client_snapshot: quotation.client_snapshot.clone(),
            terms,
        },
    );
    insert_invoice(state, invoice).await
}

pub async fn create_invoice_from_quotation(
    state: &AppState,
    user_id: &ObjectId,
    quotation_id: &ObjectId,
    input: FromQuotationInput,
) -> AppResult<Invoice> {
    validate_details(&input.payment.details, false)?;
    let due_date = parse_date(&input.due_date, "due_date")?;
    let (user, quotation) = tokio::try_join!(
        require_user(state, user_id),
        get_quotation(state, user_id, quotation_id),
    )?;
    let existing = state
        .invoices
        .find_one(doc! { "quotation": quotation_id, "creator": user_id })
        .await?;
    if quotation.invoice.is_some() || existing.is_some() {
        return Err(AppError::Duplicate(
            "An invoice already exists for this quotation".to_string(),
        ));
    }

    let invoice =
        insert_invoice_from_quotation(state, &user, &quotation, input.payment.details, due_date).await?;
    state
        .quotations
        .update_one(
            doc! { "_id": quotation_id, "creator": user_id },
            doc! { "$set": { "invoice": invoice.id, "updated_at": DateTime::now() } },
        )
        .await?;
    notify(
        state,
        user_id,
        "Invoice Created from Quotation",
        &format!(
            "Invoice #{} was created from quotation #{}",
            invoice.invoice_number, quotation.quote_number
        ),
        NotificationType::Success,
    );
    Ok(invoice)
}

pub async fn list_invoices(
    state: &AppState,
    user: &ObjectId,
    query: &ListQuery,
) -> AppResult<Page<Invoice>> {
    let mut filter = owner_filter(user, false);
    if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
        filter.insert("status", status);
    }
    apply_search(
        &mut filter,
        &["name", "invoice_number", "client_snapshot.name"],
        query.search.as_deref(),
    );
    paginate(&state.invoices, filter, doc! { "created_at": -1 }, query).await
}

pub async fn list_deleted_invoices(
    state: &AppState,
    user: &ObjectId,
    query: &ListQuery,
) -> AppResult<Page<Invoice>> {
    super::trash(&state.invoices, user, query).await
}

pub async fn get_invoice(state: &AppState, user: &ObjectId, id: &ObjectId) -> AppResult<Invoice> {
    state
        .invoices
        .find_one(doc! { "_id": id, "creator": user, "is_deleted": { "$ne": true } })
        .await?
        .ok_or_else(|| AppError::not_found("Invoice"))
}

/// Edit gate by payment progress: nothing once paid, only appended line items
/// while partially paid, the whitelist otherwise. Every edit is version-checked.
pub async fn edit_invoice(
    state: &AppState,
    user: &ObjectId,
    id: &ObjectId,
    payload: Value,
) -> AppResult<Invoice> {
    let current = get_invoice(state, user, id).await?;
    let mode = edit_mode(&current);
    if mode == EditMode::Locked {
        return Err(AppError::ImmutableState(
            "Paid or canceled invoices cannot be edited".to_string(),
        ));
    }
    if mode == EditMode::AppendOnly {
        let extra: Vec<&String> = payload
            .as_object()
            .map(|map| map.keys().filter(|k| !APPEND_ONLY_KEYS.contains(&k.as_str())).collect())
            .unwrap_or_default();
        if !extra.is_empty() {
            return Err(AppError::ImmutableState(
                "Only new line items can be added to a partially paid invoice".to_string(),
            ));
        }
    }

    let patch: InvoicePatch = parse_payload(payload)?;
    match patch.version {
        Some(provided) if provided != current.version => {
            return Err(AppError::version_conflict(current.version, provided));
        }
        _ => {}
    }

    let mut set = doc! { "updated_at": DateTime::now() };
    if mode == EditMode::AppendOnly {
        let items = patch
            .line_items
            .ok_or_else(|| AppError::validation("No new line items to append"))?;
        check_append_only(&current.line_items, &items)?;
        check_line_items(&items)?;
        put_items(&mut set, &items, current.discount)?;
    } else {
        if let Some(name) = patch.name {
            if name.trim().is_empty() {
                return Err(AppError::validation("Invoice name is required"));
            }
            set.insert("name", name.trim());
        }
        if let Some(description) = patch.project_description {
            set.insert("project_description", description);
        }
        if let Some(notes) = patch.notes {
            set.insert("notes", notes);
        }
        if let Some(currency) = patch.currency {
            set.insert("currency", currency.as_str());
        }
        if let Some(due_date) = patch.due_date {
            set.insert("due_date", parse_date(&due_date, "due_date")?);
        }
        if let Some(template) = patch.template {
            let template_id = parse_id(&template, "template")?;
            get_template(state, &template_id).await?;
            set.insert("template", template_id);
        }
        if let Some(payment) = patch.payment {
            validate_details(&payment.details, false)?;
            set.insert("payment.details", to_bson(&payment.details)?);
        }
        if patch.line_items.is_some() || patch.discount.is_some() {
            let items = patch.line_items.unwrap_or_else(|| current.line_items.clone());
            let discount = patch.discount.unwrap_or(current.discount);
            check_line_items(&items)?;
            check_discount(discount)?;
            put_items(&mut set, &items, discount)?;
        }
    }

    let updated = update_invoice_versioned(state, &current, doc! { "$set": set }).await?;
    notify(
        state,
        user,
        "Invoice Updated",
        &format!("Invoice #{} was updated", updated.invoice_number),
        NotificationType::Info,
    );
    Ok(updated)
}

fn put_items(set: &mut Document, items: &[LineItem], discount: Decimal) -> AppResult<()> {
    let totals = flat_totals(items, discount);
    set.insert("line_items", to_bson(&items)?);
    set.insert("subtotal", to_bson(&totals.subtotal)?);
    set.insert("tax", to_bson(&totals.tax)?);
    set.insert("discount", to_bson(&totals.discount)?);
    set.insert("total", to_bson(&totals.total)?);
    Ok(())
}

/// Cancel an invoice or record a payment against it, guarded by the caller's version.
pub async fn update_invoice_payment_status(
    state: &AppState,
    user: &ObjectId,
    id: &ObjectId,
    update: PaymentUpdate,
) -> AppResult<PaymentOutcome> {
    let mut current = get_invoice(state, user, id).await?;
    if current.version != update.version {
        return Err(AppError::version_conflict(current.version, update.version));
    }

    if let Some(status) = update.status.as_deref() {
        if status != InvoiceStatus::Canceled.as_str() {
            return Err(AppError::InvalidState(format!(
                "Invalid status `{status}`; only canceled can be set directly"
            )));
        }
        check_cancel(&current)?;
        let invoice = update_invoice_versioned(
            state,
            &current,
            doc! { "$set": {
                "status": "canceled",
                "payment.status": "canceled",
                "updated_at": DateTime::now(),
            } },
        )
        .await?;
        notify(
            state,
            user,
            "Invoice Canceled",
            &format!("Invoice #{} was canceled", invoice.invoice_number),
            NotificationType::Warning,
        );
        return Ok(PaymentOutcome {
            invoice,
            applied: None,
            receipt: None,
        });
    }

    let amount = update
        .amount
        .ok_or_else(|| AppError::validation("Either `status: canceled` or `amount` is required"))?;
    let details = match update.details {
        Some(details) => {
            validate_details(&details, false)?;
            details
        }
        None => {
            validate_details(&current.payment.details, false).map_err(|err| {
                AppError::validation(format!("Stored payment details are incomplete ({err}); send `details`"))
            })?;
            current.payment.details.clone()
        }
    };
    let date_paid = match update.date_paid.as_deref() {
        Some(raw) => parse_date(raw, "date_paid")?,
        None => DateTime::now(),
    };

    let limits = payment_limits(state);
    let applied = apply_payment(&current, amount, &limits)?;
    let notes = overpayment_note(update.notes, &applied, current.currency);
    let entry = record_payment_history(
        &mut current,
        LedgerInput {
            amount: applied.applied,
            previous_amount: applied.previous_amount,
            details: details.clone(),
            notes,
            date: date_paid,
            user: *user,
            receipt_number: None,
        },
        limits.min,
    )?
    .clone();

    let invoice = update_invoice_versioned(
        state,
        &current,
        doc! {
            "$set": {
                "payment.amount_paid": to_bson(&applied.amount_paid)?,
                "payment.status": applied.payment_status.as_str(),
                "payment.details": to_bson(&details)?,
                "payment.date_paid": date_paid,
                "status": applied.invoice_status.as_str(),
                "updated_at": DateTime::now(),
            },
            "$push": { "payment_history": to_bson(&entry)? },
        },
    )
    .await?;
    info!(
        invoice = %id,
        applied = %applied.applied,
        overpayment = %applied.overpayment,
        status = applied.invoice_status.as_str(),
        "payment recorded"
    );
    notify(
        state,
        user,
        "Payment Recorded",
        &format!(
            "Payment of {} {} recorded on invoice #{}",
            invoice.currency.as_str(),
            applied.applied,
            invoice.invoice_number
        ),
        NotificationType::Success,
    );

    let receipt = if state.config.auto_receipts {
        match auto_generate_receipt(state, &invoice, &applied, &details, date_paid).await {
            Ok(receipt) => Some(receipt),
            Err(err) => {
                warn!(invoice = %id, error = %err, "automatic receipt failed");
                None
            }
        }
    } else {
        None
    };

    Ok(PaymentOutcome {
        invoice,
        applied: Some(applied),
        receipt,
    })
}

pub(crate) fn overpayment_note(
    notes: Option<String>,
    applied: &AppliedPayment,
    currency: Currency,
) -> Option<String> {
    if applied.overpayment <= Decimal::ZERO {
        return notes;
    }
    let change = format!(
        "Overpayment of {} {} returned as change",
        currency.as_str(),
        applied.overpayment
    );
    Some(match notes.filter(|n| !n.trim().is_empty()) {
        Some(notes) => format!("{notes} ({change})"),
        None => change,
    })
}

/// Flip past-due invoices to overdue. `user` narrows the sweep to one owner.
pub async fn check_overdue_invoices(state: &AppState, user: Option<&ObjectId>) -> AppResult<u64> {
    let statuses: Vec<&str> = OVERDUE_CANDIDATES.iter().map(InvoiceStatus::as_str).collect();
    let mut filter = doc! {
        "due_date": { "$lt": DateTime::now() },
        "status": { "$in": statuses },
        "is_deleted": { "$ne": true },
    };
    if let Some(user) = user {
        filter.insert("creator", user);
    }
    let res = state
        .invoices
        .update_many(
            filter,
            doc! {
                "$set": {
                    "status": "overdue",
                    "payment.status": "overdue",
                    "updated_at": DateTime::now(),
                },
                "$inc": { "version": 1_i64 },
            },
        )
        .await?;
    if res.modified_count > 0 {
        info!(count = res.modified_count, "invoices marked overdue");
    }
    Ok(res.modified_count)
}

/// Past-due invoices that still have something to pay, earliest due first.
pub async fn list_overdue_invoices(state: &AppState, user: &ObjectId) -> AppResult<Vec<Invoice>> {
    let mut filter = owner_filter(user, false);
    filter.insert("due_date", doc! { "$lt": DateTime::now() });
    filter.insert("status", doc! { "$nin": ["paid", "canceled"] });
    let mut cursor = state
        .invoices
        .find(filter)
        .sort(doc! { "due_date": 1 })
        .await?;
    let mut items = Vec::new();
    while let Some(invoice) = cursor.try_next().await? {
        items.push(invoice);
    }
    Ok(items)
}

pub async fn get_invoice_payment_history(
    state: &AppState,
    user: &ObjectId,
    id: &ObjectId,
) -> AppResult<PaymentHistoryView> {
    let invoice = get_invoice(state, user, id).await?;
    Ok(PaymentHistoryView {
        history: history_newest_first(&invoice),
        current_status: invoice.status,
        amount_paid: invoice.payment.amount_paid,
        total: invoice.total,
    })
}

/// Email the invoice to its client; a draft becomes `sent`. Delivery errors surface.
pub async fn send_invoice(state: &AppState, user: &ObjectId, id: &ObjectId) -> AppResult<Invoice> {
    let invoice = get_invoice(state, user, id).await?;
    emails::deliver(state, emails::invoice_email(state, &invoice)).await?;
    if invoice.status != InvoiceStatus::Draft {
        return Ok(invoice);
    }
    update_invoice_versioned(
        state,
        &invoice,
        doc! { "$set": { "status": "sent", "updated_at": DateTime::now() } },
    )
    .await
}

/// Public view: no owner check. A `sent` invoice becomes `viewed`.
pub async fn view_invoice(state: &AppState, id: &ObjectId) -> AppResult<Invoice> {
    let invoice = state
        .invoices
        .find_one(doc! { "_id": id, "is_deleted": { "$ne": true } })
        .await?
        .ok_or_else(|| AppError::not_found("Invoice"))?;
    let Some(next) = invoice_after_view(invoice.status) else {
        return Ok(invoice);
    };
    match update_invoice_versioned(
        state,
        &invoice,
        doc! { "$set": { "status": next.as_str(), "updated_at": DateTime::now() } },
    )
    .await
    {
        Ok(updated) => Ok(updated),
        // Someone else moved it first; show what they left.
        Err(AppError::Conflict { .. }) => state
            .invoices
            .find_one(doc! { "_id": id })
            .await?
            .ok_or_else(|| AppError::not_found("Invoice")),
        Err(err) => Err(err),
    }
}

pub async fn delete_invoice(state: &AppState, user: &ObjectId, id: &ObjectId) -> AppResult<()> {
    super::soft_delete(&state.invoices, user, id, "Invoice").await
}

pub async fn restore_invoice(state: &AppState, user: &ObjectId, id: &ObjectId) -> AppResult<Invoice> {
    super::restore(&state.invoices, user, id, "Invoice").await?;
    get_invoice(state, user, id).await
}
