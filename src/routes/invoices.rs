// routes/invoices.rs
// /api/invoices: create (direct or from a quotation), edit, payments/cancel, overdue, history, send.

use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    response::Html,
};
use serde_json::{Value, json};

use crate::error::AppResult;
use crate::models::NotificationType;
use crate::render::DocumentRef;
use crate::session::SessionUser;
use crate::state::{
    AppState, CreateInvoiceInput, FromQuotationInput, ListQuery, PaymentUpdate, RequestMeta,
    check_overdue_invoices, create_invoice, create_invoice_from_quotation, delete_invoice,
    edit_invoice, get_invoice, get_invoice_payment_history, list_deleted_invoices, list_invoices,
    list_overdue_invoices, notify, parse_id, parse_payload, restore_invoice, send_invoice,
    update_invoice_payment_status,
};

use super::view::{PreviewQuery, preview_html};
use super::{ApiResponse, audit, created, ok};

pub async fn invoices_index(
    session: SessionUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResponse {
    let page = list_invoices(&state, session.user_id(), &query).await?;
    ok("Invoices retrieved", page)
}

pub async fn invoices_trash(
    session: SessionUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResponse {
    let page = list_deleted_invoices(&state, session.user_id(), &query).await?;
    ok("Deleted invoices retrieved", page)
}

pub async fn invoices_overdue(session: SessionUser, State(state): State<Arc<AppState>>) -> ApiResponse {
    let invoices = list_overdue_invoices(&state, session.user_id()).await?;
    ok(format!("{} overdue invoices", invoices.len()), invoices)
}

pub async fn invoices_check_overdue(
    session: SessionUser,
    State(state): State<Arc<AppState>>,
) -> ApiResponse {
    let updated = check_overdue_invoices(&state, Some(session.user_id())).await?;
    ok(
        format!("{updated} invoices marked overdue"),
        json!({ "updated": updated }),
    )
}

pub async fn invoices_create(
    session: SessionUser,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> ApiResponse {
    let input: CreateInvoiceInput = parse_payload(body)?;
    let invoice = create_invoice(&state, session.user_id(), input).await?;
    audit(
        &state,
        &session,
        &meta,
        "invoice_created",
        format!("Created invoice #{}", invoice.invoice_number),
        Some(json!({ "invoice": invoice.id, "total": invoice.total })),
    )
    .await;
    created("Invoice created", invoice)
}

pub async fn invoices_from_quotation(
    session: SessionUser,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path(quotation_id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResponse {
    let quotation_id = parse_id(&quotation_id, "quotation")?;
    let input: FromQuotationInput = parse_payload(body)?;
    let invoice = create_invoice_from_quotation(&state, session.user_id(), &quotation_id, input).await?;
    audit(
        &state,
        &session,
        &meta,
        "invoice_created",
        format!("Created invoice #{} from a quotation", invoice.invoice_number),
        Some(json!({ "invoice": invoice.id, "quotation": quotation_id })),
    )
    .await;
    created("Invoice created from quotation", invoice)
}

pub async fn invoices_show(
    session: SessionUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse {
    let id = parse_id(&id, "invoice")?;
    let invoice = get_invoice(&state, session.user_id(), &id).await?;
    ok("Invoice retrieved", invoice)
}

pub async fn invoices_update(
    session: SessionUser,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResponse {
    let id = parse_id(&id, "invoice")?;
    let invoice = edit_invoice(&state, session.user_id(), &id, body).await?;
    audit(
        &state,
        &session,
        &meta,
        "invoice_updated",
        format!("Updated invoice #{}", invoice.invoice_number),
        Some(json!({ "invoice": invoice.id, "version": invoice.version })),
    )
    .await;
    ok("Invoice updated", invoice)
}

pub async fn invoices_status(
    session: SessionUser,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResponse {
    let id = parse_id(&id, "invoice")?;
    let update: PaymentUpdate = parse_payload(body)?;
    let outcome = update_invoice_payment_status(&state, session.user_id(), &id, update).await?;
    let invoice = &outcome.invoice;
    let (action, message) = match &outcome.applied {
        Some(applied) if applied.overpayment > rust_decimal::Decimal::ZERO => (
            "invoice_payment",
            format!(
                "Payment recorded on invoice #{}; {} {} returned as change",
                invoice.invoice_number,
                invoice.currency.as_str(),
                applied.overpayment
            ),
        ),
        Some(_) => (
            "invoice_payment",
            format!("Payment recorded on invoice #{}", invoice.invoice_number),
        ),
        None => (
            "invoice_canceled",
            format!("Invoice #{} canceled", invoice.invoice_number),
        ),
    };
    audit(
        &state,
        &session,
        &meta,
        action,
        message.clone(),
        Some(json!({
            "invoice": invoice.id,
            "status": invoice.status.as_str(),
            "version": invoice.version,
            "receipt": outcome.receipt.as_ref().map(|r| r.receipt_number.clone()),
        })),
    )
    .await;
    ok(message, outcome)
}

pub async fn invoices_payment_history(
    session: SessionUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse {
    let id = parse_id(&id, "invoice")?;
    let view = get_invoice_payment_history(&state, session.user_id(), &id).await?;
    let message = if view.history.is_empty() {
        "No payments recorded yet".to_string()
    } else {
        format!("{} payments recorded", view.history.len())
    };
    ok(message, view)
}

pub async fn invoices_send(
    session: SessionUser,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse {
    let id = parse_id(&id, "invoice")?;
    let invoice = send_invoice(&state, session.user_id(), &id).await?;
    audit(
        &state,
        &session,
        &meta,
        "invoice_sent",
        format!(
            "Sent invoice #{} to {}",
            invoice.invoice_number, invoice.client_snapshot.contact_email
        ),
        Some(json!({ "invoice": invoice.id })),
    )
    .await;
    ok("Invoice sent", invoice)
}

pub async fn invoices_preview(
    session: SessionUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<PreviewQuery>,
) -> AppResult<Html<String>> {
    let id = parse_id(&id, "invoice")?;
    let invoice = get_invoice(&state, session.user_id(), &id).await?;
    preview_html(&state, DocumentRef::Invoice(&invoice), query.include_pdf_script).await
}

pub async fn invoices_delete(
    session: SessionUser,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse {
    let id = parse_id(&id, "invoice")?;
    let invoice = get_invoice(&state, session.user_id(), &id).await?;
    delete_invoice(&state, session.user_id(), &id).await?;
    notify(
        &state,
        session.user_id(),
        "Invoice Deleted",
        &format!("Invoice #{} was moved to the trash", invoice.invoice_number),
        NotificationType::Warning,
    );
    audit(
        &state,
        &session,
        &meta,
        "invoice_deleted",
        format!("Deleted invoice #{}", invoice.invoice_number),
        Some(json!({ "invoice": id })),
    )
    .await;
    ok("Invoice moved to trash", json!({ "id": id }))
}

pub async fn invoices_restore(
    session: SessionUser,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse {
    let id = parse_id(&id, "invoice")?;
    let invoice = restore_invoice(&state, session.user_id(), &id).await?;
    notify(
        &state,
        session.user_id(),
        "Invoice Restored",
        &format!("Invoice #{} was restored", invoice.invoice_number),
        NotificationType::Info,
    );
    audit(
        &state,
        &session,
        &meta,
        "invoice_restored",
        format!("Restored invoice #{}", invoice.invoice_number),
        Some(json!({ "invoice": id })),
    )
    .await;
    ok("Invoice restored", invoice)
}
