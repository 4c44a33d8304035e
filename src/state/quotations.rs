use chrono::{Duration as ChronoDuration, Utc};
use futures::stream::TryStreamExt;
use mongodb::bson::{DateTime, doc, oid::ObjectId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::billing::{
    document_number,
    lifecycle::{check_quotation_decision, quotation_after_view},
    payment::validate_details,
    quotation_totals,
    validate::{check_discount, check_quote_items},
};
use crate::emails;
use crate::error::{AppError, AppResult};
use crate::models::{
    Conversion, ConversionState, Currency, Invoice, InvoiceStatus, MpesaChannel, NotificationType, PaymentDetails,
    Quotation, QuotationStatus, QuoteLineItem, User,
};

use super::{
    AppState, Counter, ListQuery, Page, apply_search, get_client, get_template, insert_invoice_from_quotation,
    next_counter, notify, owner_filter, paginate, parse_date, parse_id, require_user, send_invoice, to_bson,
};

/// Fields a quotation payload must carry.
pub const QUOTATION_REQUIRED: [&str; 6] =
    ["client", "line_items", "valid_until", "currency", "name", "template"];

/// Days between quotation acceptance and the due date of the generated invoice.
pub const ACCEPTED_INVOICE_DUE_DAYS: i64 = 7;

/// Conversion attempts before the retry sweep gives up.
pub const MAX_CONVERSION_ATTEMPTS: i32 = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateQuotationInput {
    pub client: String,
    pub template: String,
    pub name: String,
    #[serde(default)]
    pub project_description: String,
    #[serde(default)]
    pub notes: String,
    pub currency: Currency,
    pub valid_until: String,
    pub line_items: Vec<QuoteLineItem>,
    #[serde(default)]
    pub discount: Decimal,
}

/// Mutable quotation fields. Anything else in an edit payload is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuotationPatch {
    pub name: Option<String>,
    pub project_description: Option<String>,
    pub notes: Option<String>,
    pub currency: Option<Currency>,
    pub valid_until: Option<String>,
    pub template: Option<String>,
    pub line_items: Option<Vec<QuoteLineItem>>,
    pub discount: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuotationStatusChange {
    pub quotation: Quotation,
    pub invoice: Option<Invoice>,
    pub conversion_error: Option<String>,
}

pub async fn create_quotation(
    state: &AppState,
    user_id: &ObjectId,
    input: CreateQuotationInput,
) -> AppResult<Quotation> {
    if input.name.trim().is_empty() {
        return Err(AppError::validation("Quotation name is required"));
    }
    check_quote_items(&input.line_items)?;
    check_discount(input.discount)?;
    let valid_until = parse_date(&input.valid_until, "valid_until")?;
    let client_id = parse_id(&input.client, "client")?;
    let template_id = parse_id(&input.template, "template")?;

    let (user, client, _template) = tokio::try_join!(
        require_user(state, user_id),
        get_client(state, user_id, &client_id),
        get_template(state, &template_id),
    )?;

    let number = next_counter(state, user_id, Counter::Quote).await?;
    let totals = quotation_totals(&input.line_items, input.discount);
    let mut quotation = Quotation {
        id: None,
        quote_number: document_number(number),
        name: input.name.trim().to_string(),
        project_description: input.project_description,
        notes: input.notes,
        client: client_id,
        creator: *user_id,
        template: template_id,
        currency: input.currency,
        valid_until,
        line_items: input.line_items,
        subtotal: totals.subtotal,
        tax: totals.tax,
        discount: totals.discount,
        total: totals.total,
        status: QuotationStatus::Draft,
        client_snapshot: client.snapshot(),
        creator_snapshot: user.snapshot(&user.quote_terms),
        invoice: None,
        conversion: None,
        is_deleted: false,
        deleted_at: None,
        created_at: DateTime::now(),
        updated_at: None,
    };
    let res = state.quotations.insert_one(&quotation).await?;
    quotation.id = res.inserted_id.as_object_id();

    notify(
        state,
        user_id,
        "New Quotation Created",
        &format!("Quotation #{} was created for {}", quotation.quote_number, client.name),
        NotificationType::Success,
    );
    Ok(quotation)
}

pub async fn list_quotations(
    state: &AppState,
    user: &ObjectId,
    query: &ListQuery,
) -> AppResult<Page<Quotation>> {
    let mut filter = owner_filter(user, false);
    if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
        filter.insert("status", status);
    }
    apply_search(
        &mut filter,
        &["name", "quote_number", "client_snapshot.name"],
        query.search.as_deref(),
    );
    paginate(&state.quotations, filter, doc! { "created_at": -1 }, query).await
}

pub async fn list_deleted_quotations(
    state: &AppState,
    user: &ObjectId,
    query: &ListQuery,
) -> AppResult<Page<Quotation>> {
    super::trash(&state.quotations, user, query).await
}

pub async fn get_quotation(state: &AppState, user: &ObjectId, id: &ObjectId) -> AppResult<Quotation> {
    state
        .quotations
        .find_one(doc! { "_id": id, "creator": user, "is_deleted": { "$ne": true } })
        .await?
        .ok_or_else(|| AppError::not_found("Quotation"))
}

pub async fn edit_quotation(
    state: &AppState,
    user: &ObjectId,
    id: &ObjectId,
    patch: QuotationPatch,
) -> AppResult<Quotation> {
    let current = get_quotation(state, user, id).await?;
    let mut set = doc! { "updated_at": DateTime::now() };

    if let Some(name) = patch.name {
        if name.trim().is_empty() {
            return Err(AppError::validation("Quotation name is required"));
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
    if let Some(valid_until) = patch.valid_until {
        set.insert("valid_until", parse_date(&valid_until, "valid_until")?);
    }
    if let Some(template) = patch.template {
        let template_id = parse_id(&template, "template")?;
        get_template(state, &template_id).await?;
        set.insert("template", template_id);
    }

    if patch.line_items.is_some() || patch.discount.is_some() {
        let items = patch.line_items.unwrap_or(current.line_items);
        let discount = patch.discount.unwrap_or(current.discount);
        check_quote_items(&items)?;
        check_discount(discount)?;
        let totals = quotation_totals(&items, discount);
        set.insert("line_items", to_bson(&items)?);
        set.insert("subtotal", to_bson(&totals.subtotal)?);
        set.insert("tax", to_bson(&totals.tax)?);
        set.insert("discount", to_bson(&totals.discount)?);
        set.insert("total", to_bson(&totals.total)?);
    }

    let res = state
        .quotations
        .update_one(
            doc! { "_id": id, "creator": user, "is_deleted": { "$ne": true } },
            doc! { "$set": set },
        )
        .await?;
    if res.matched_count == 0 {
        return Err(AppError::not_found("Quotation"));
    }
    get_quotation(state, user, id).await
}

/// Accept or reject an open quotation. Accepting also produces its invoice; a failed
/// conversion is reported in the result and left pending for the retry sweep.
pub async fn update_quotation_status(
    state: &AppState,
    user: &ObjectId,
    id: &ObjectId,
    target: QuotationStatus,
    payment: Option<PaymentDetails>,
) -> AppResult<QuotationStatusChange> {
    let current = get_quotation(state, user, id).await?;
    check_quotation_decision(current.status, target)?;
    if let Some(details) = &payment {
        validate_details(details, false)?;
    }

    let mut set = doc! { "status": target.as_str(), "updated_at": DateTime::now() };
    if target == QuotationStatus::Accepted {
        let conversion = Conversion {
            state: ConversionState::Pending,
            attempts: 0,
            last_error: None,
            invoice: None,
            payment,
        };
        set.insert("conversion", to_bson(&conversion)?);
    }
    let res = state
        .quotations
        .update_one(
            doc! {
                "_id": id,
                "creator": user,
                "status": current.status.as_str(),
                "is_deleted": { "$ne": true },
            },
            doc! { "$set": set },
        )
        .await?;
    if res.matched_count == 0 {
        return Err(AppError::InvalidState(
            "Quotation status was changed by another request".to_string(),
        ));
    }

    notify(
        state,
        user,
        "Quotation Status Updated",
        &format!("Quotation #{} was {}", current.quote_number, target.as_str()),
        NotificationType::Info,
    );

    let (invoice, conversion_error) = if target == QuotationStatus::Accepted {
        let accepted = get_quotation(state, user, id).await?;
        match convert_quotation(state, &accepted).await {
            Ok(invoice) => (Some(invoice), None),
            Err(err) => (None, Some(err.to_string())),
        }
    } else {
        (None, None)
    };

    Ok(QuotationStatusChange {
        quotation: get_quotation(state, user, id).await?,
        invoice,
        conversion_error,
    })
}

fn placeholder_payment(user: &User) -> PaymentDetails {
    PaymentDetails::Mpesa {
        channel: MpesaChannel::SendMoney {
            phone_number: user.phone.clone(),
            is_new_number: false,
        },
        transaction_id: None,
    }
}

async fn find_invoice_for(state: &AppState, quotation: &ObjectId, creator: &ObjectId) -> AppResult<Option<Invoice>> {
    Ok(state
        .invoices
        .find_one(doc! { "quotation": quotation, "creator": creator })
        .await?)
}

async fn ensure_invoice(state: &AppState, qid: &ObjectId, quotation: &Quotation) -> AppResult<Invoice> {
    if let Some(invoice) = find_invoice_for(state, qid, &quotation.creator).await? {
        return Ok(invoice);
    }
    let user = require_user(state, &quotation.creator).await?;
    let payment = quotation
        .conversion
        .as_ref()
        .and_then(|c| c.payment.clone())
        .unwrap_or_else(|| placeholder_payment(&user));
    validate_details(&payment, false).map_err(|err| {
        AppError::validation(format!(
            "No usable payment details for the invoice ({err}); add a phone number to your profile or accept with payment details"
        ))
    })?;
    let due = Utc::now() + ChronoDuration::days(ACCEPTED_INVOICE_DUE_DAYS);
    match insert_invoice_from_quotation(state, &user, quotation, payment, DateTime::from_chrono(due)).await {
        Ok(invoice) => Ok(invoice),
        // A concurrent conversion won the race on the quotation index.
        Err(err) if err.is_duplicate_key() => find_invoice_for(state, qid, &quotation.creator)
            .await?
            .ok_or(err),
        Err(err) => Err(err),
    }
}

async fn ensure_sent(state: &AppState, quotation: &Quotation, invoice: Invoice) -> Invoice {
    let Some(invoice_id) = invoice.id else {
        return invoice;
    };
    if invoice.status != InvoiceStatus::Draft {
        return invoice;
    }
    match send_invoice(state, &quotation.creator, &invoice_id).await {
        Ok(sent) => sent,
        Err(err) => {
            warn!(invoice = %invoice_id, error = %err, "invoice email failed after quotation acceptance");
            invoice
        }
    }
}

/// Create (or find) the invoice for an accepted quotation, email it and mark it sent.
/// Safe to repeat: an invoice already linked to the quotation is reused.
pub async fn convert_quotation(state: &AppState, quotation: &Quotation) -> AppResult<Invoice> {
    let qid = quotation
        .id
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("quotation has no id")))?;

    let result = match ensure_invoice(state, &qid, quotation).await {
        Ok(invoice) => Ok(ensure_sent(state, quotation, invoice).await),
        Err(err) => Err(err),
    };

    match &result {
        Ok(invoice) => {
            state
                .quotations
                .update_one(
                    doc! { "_id": qid },
                    doc! {
                        "$set": {
                            "conversion.state": "done",
                            "conversion.invoice": invoice.id,
                            "conversion.last_error": null,
                            "invoice": invoice.id,
                            "updated_at": DateTime::now(),
                        },
                        "$inc": { "conversion.attempts": 1 },
                    },
                )
                .await?;
            info!(quotation = %qid, invoice = ?invoice.id, "quotation converted to invoice");
            notify(
                state,
                &quotation.creator,
                "Invoice Created from Quotation",
                &format!(
                    "Invoice #{} was created from quotation #{}",
                    invoice.invoice_number, quotation.quote_number
                ),
                NotificationType::Success,
            );
        }
        Err(err) => {
            warn!(quotation = %qid, error = %err, "quotation conversion failed");
            state
                .quotations
                .update_one(
                    doc! { "_id": qid },
                    doc! {
                        "$set": {
                            "conversion.state": "failed",
                            "conversion.last_error": err.to_string(),
                            "updated_at": DateTime::now(),
                        },
                        "$inc": { "conversion.attempts": 1 },
                    },
                )
                .await?;
            notify(
                state,
                &quotation.creator,
                "Invoice Creation Failed",
                &format!(
                    "Quotation #{} was accepted but its invoice could not be created yet; it will be retried",
                    quotation.quote_number
                ),
                NotificationType::Warning,
            );
        }
    }
    result
}

/// Sweep step: retry conversions that failed, or that have been pending for a while.
pub async fn retry_pending_conversions(state: &AppState) -> AppResult<u64> {
    let stale = DateTime::from_chrono(Utc::now() - ChronoDuration::minutes(5));
    let mut cursor = state
        .quotations
        .find(doc! {
            "status": "accepted",
            "is_deleted": { "$ne": true },
            "conversion.attempts": { "$lt": MAX_CONVERSION_ATTEMPTS },
            "$or": [
                { "conversion.state": "failed" },
                { "conversion.state": "pending", "updated_at": { "$lt": stale } },
            ],
        })
        .await?;
    let mut converted = 0;
    while let Some(quotation) = cursor.try_next().await? {
        if convert_quotation(state, &quotation).await.is_ok() {
            converted += 1;
        }
    }
    Ok(converted)
}

/// Email the quotation to its client; a draft becomes `sent`. Delivery errors surface.
pub async fn send_quotation(state: &AppState, user: &ObjectId, id: &ObjectId) -> AppResult<Quotation> {
    let quotation = get_quotation(state, user, id).await?;
    emails::deliver(state, emails::quotation_email(state, &quotation)).await?;
    if quotation.status == QuotationStatus::Draft {
        state
            .quotations
            .update_one(
                doc! { "_id": id, "creator": user, "status": "draft" },
                doc! { "$set": { "status": "sent", "updated_at": DateTime::now() } },
            )
            .await?;
    }
    get_quotation(state, user, id).await
}

/// Public view: no owner check. A `sent` quotation becomes `viewed`.
pub async fn view_quotation(state: &AppState, id: &ObjectId) -> AppResult<Quotation> {
    let quotation = state
        .quotations
        .find_one(doc! { "_id": id, "is_deleted": { "$ne": true } })
        .await?
        .ok_or_else(|| AppError::not_found("Quotation"))?;
    let Some(next) = quotation_after_view(quotation.status) else {
        return Ok(quotation);
    };
    state
        .quotations
        .update_one(
            doc! { "_id": id, "status": quotation.status.as_str() },
            doc! { "$set": { "status": next.as_str(), "updated_at": DateTime::now() } },
        )
        .await?;
    Ok(Quotation {
        status: next,
        ..quotation
    })
}

pub async fn delete_quotation(state: &AppState, user: &ObjectId, id: &ObjectId) -> AppResult<()> {
    super::soft_delete(&state.quotations, user, id, "Quotation").await
}

pub async fn restore_quotation(state: &AppState, user: &ObjectId, id: &ObjectId) -> AppResult<Quotation> {
    super::restore(&state.quotations, user, id, "Quotation").await?;
    get_quotation(state, user, id).await
}
