// routes/quotations.rs
// /api/quotations: create, list, edit, accept/reject, send, preview, soft delete.

use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    response::Html,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::AppResult;
use crate::models::{NotificationType, PaymentDetails, QuotationStatus};
use crate::render::DocumentRef;
use crate::session::SessionUser;
use crate::state::{
    AppState, CreateQuotationInput, ListQuery, QUOTATION_REQUIRED, QuotationPatch, RequestMeta,
    create_quotation, delete_quotation, edit_quotation, get_quotation, list_deleted_quotations,
    list_quotations, notify, parse_id, parse_payload, require_fields, restore_quotation,
    send_quotation, update_quotation_status,
};

use super::view::{PreviewQuery, preview_html};
use super::{ApiResponse, audit, created, ok};

#[derive(Deserialize)]
pub struct StatusBody {
    pub status: QuotationStatus,
    #[serde(default)]
    pub payment: Option<PaymentDetails>,
}

pub async fn quotations_index(
    session: SessionUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResponse {
    let page = list_quotations(&state, session.user_id(), &query).await?;
    ok("Quotations retrieved", page)
}

pub async fn quotations_trash(
    session: SessionUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResponse {
    let page = list_deleted_quotations(&state, session.user_id(), &query).await?;
    ok("Deleted quotations retrieved", page)
}

pub async fn quotations_create(
    session: SessionUser,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> ApiResponse {
    require_fields(&body, &QUOTATION_REQUIRED)?;
    let input: CreateQuotationInput = parse_payload(body)?;
    let quotation = create_quotation(&state, session.user_id(), input).await?;
    audit(
        &state,
        &session,
        &meta,
        "quotation_created",
        format!("Created quotation #{}", quotation.quote_number),
        Some(json!({ "quotation": quotation.id, "total": quotation.total })),
    )
    .await;
    created("Quotation created", quotation)
}

pub async fn quotations_show(
    session: SessionUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse {
    let id = parse_id(&id, "quotation")?;
    let quotation = get_quotation(&state, session.user_id(), &id).await?;
    ok("Quotation retrieved", quotation)
}

pub async fn quotations_update(
    session: SessionUser,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResponse {
    let id = parse_id(&id, "quotation")?;
    let patch: QuotationPatch = parse_payload(body)?;
    let quotation = edit_quotation(&state, session.user_id(), &id, patch).await?;
    notify(
        &state,
        session.user_id(),
        "Quotation Updated",
        &format!("Quotation #{} was updated", quotation.quote_number),
        NotificationType::Info,
    );
    audit(
        &state,
        &session,
        &meta,
        "quotation_updated",
        format!("Updated quotation #{}", quotation.quote_number),
        Some(json!({ "quotation": quotation.id })),
    )
    .await;
    ok("Quotation updated", quotation)
}

pub async fn quotations_status(
    session: SessionUser,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResponse {
    let id = parse_id(&id, "quotation")?;
    let body: StatusBody = parse_payload(body)?;
    let change =
        update_quotation_status(&state, session.user_id(), &id, body.status, body.payment).await?;
    audit(
        &state,
        &session,
        &meta,
        "quotation_status_changed",
        format!(
            "Quotation #{} marked {}",
            change.quotation.quote_number,
            change.quotation.status.as_str()
        ),
        Some(json!({
            "quotation": change.quotation.id,
            "invoice": change.invoice.as_ref().and_then(|i| i.id),
        })),
    )
    .await;
    let message = match (&change.invoice, &change.conversion_error) {
        (Some(invoice), _) => format!(
            "Quotation {} and invoice #{} created",
            change.quotation.status.as_str(),
            invoice.invoice_number
        ),
        (None, Some(err)) => format!(
            "Quotation {}, but the invoice could not be created yet ({err}); it will be retried",
            change.quotation.status.as_str()
        ),
        (None, None) => format!("Quotation {}", change.quotation.status.as_str()),
    };
    ok(message, change)
}

pub async fn quotations_send(
    session: SessionUser,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse {
    let id = parse_id(&id, "quotation")?;
    let quotation = send_quotation(&state, session.user_id(), &id).await?;
    audit(
        &state,
        &session,
        &meta,
        "quotation_sent",
        format!(
            "Sent quotation #{} to {}",
            quotation.quote_number, quotation.client_snapshot.contact_email
        ),
        Some(json!({ "quotation": quotation.id })),
    )
    .await;
    ok("Quotation sent", quotation)
}

pub async fn quotations_preview(
    session: SessionUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<PreviewQuery>,
) -> AppResult<Html<String>> {
    let id = parse_id(&id, "quotation")?;
    let quotation = get_quotation(&state, session.user_id(), &id).await?;
    preview_html(&state, DocumentRef::Quotation(&quotation), query.include_pdf_script).await
}

pub async fn quotations_delete(
    session: SessionUser,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse {
    let id = parse_id(&id, "quotation")?;
    let quotation = get_quotation(&state, session.user_id(), &id).await?;
    delete_quotation(&state, session.user_id(), &id).await?;
    notify(
        &state,
        session.user_id(),
        "Quotation Deleted",
        &format!("Quotation #{} was moved to the trash", quotation.quote_number),
        NotificationType::Warning,
    );
    audit(
        &state,
        &session,
        &meta,
        "quotation_deleted",
        format!("Deleted quotation #{}", quotation.quote_number),
        Some(json!({ "quotation": id })),
    )
    .await;
    ok("Quotation moved to trash", json!({ "id": id }))
}

pub async fn quotations_restore(
    session: SessionUser,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse {
    let id = parse_id(&id, "quotation")?;
    let quotation = restore_quotation(&state, session.user_id(), &id).await?;
    notify(
        &state,
        session.user_id(),
        "Quotation Restored",
        &format!("Quotation #{} was restored", quotation.quote_number),
        NotificationType::Info,
    );
    audit(
        &state,
        &session,
        &meta,
        "quotation_restored",
        format!("Restored quotation #{}", quotation.quote_number),
        Some(json!({ "quotation": id })),
    )
    .await;
    ok("Quotation restored", quotation)
}
