// routes/receipts.rs
// /api/receipts: create (standalone or against an invoice), list, by invoice, send, preview, soft delete.

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
    AppState, ListQuery, RequestMeta, create_receipt, delete_receipt, get_receipt,
    list_deleted_receipts, list_receipts, notify, parse_id, receipts_for_invoice, restore_receipt,
    send_receipt,
};

use super::view::{PreviewQuery, preview_html};
use super::{ApiResponse, audit, created, ok};

pub async fn receipts_index(
    session: SessionUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResponse {
    let page = list_receipts(&state, session.user_id(), &query).await?;
    ok("Receipts retrieved", page)
}

pub async fn receipts_trash(
    session: SessionUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResponse {
    let page = list_deleted_receipts(&state, session.user_id(), &query).await?;
    ok("Deleted receipts retrieved", page)
}

pub async fn receipts_for_invoice_index(
    session: SessionUser,
    State(state): State<Arc<AppState>>,
    Path(invoice_id): Path<String>,
) -> ApiResponse {
    let invoice_id = parse_id(&invoice_id, "invoice")?;
    let receipts = receipts_for_invoice(&state, session.user_id(), &invoice_id).await?;
    ok("Receipts retrieved", receipts)
}

pub async fn receipts_create(
    session: SessionUser,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> ApiResponse {
    let receipt = create_receipt(&state, session.user_id(), body).await?;
    audit(
        &state,
        &session,
        &meta,
        "receipt_created",
        format!("Issued receipt {}", receipt.receipt_number),
        Some(json!({
            "receipt": receipt.id,
            "invoice": receipt.invoice,
            "amount_paid": receipt.payment.amount_paid,
        })),
    )
    .await;
    created("Receipt created", receipt)
}

pub async fn receipts_show(
    session: SessionUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse {
    let id = parse_id(&id, "receipt")?;
    let receipt = get_receipt(&state, session.user_id(), &id).await?;
    ok("Receipt retrieved", receipt)
}

pub async fn receipts_send(
    session: SessionUser,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse {
    let id = parse_id(&id, "receipt")?;
    let receipt = send_receipt(&state, session.user_id(), &id).await?;
    audit(
        &state,
        &session,
        &meta,
        "receipt_sent",
        format!(
            "Sent receipt {} to {}",
            receipt.receipt_number, receipt.client_snapshot.contact_email
        ),
        Some(json!({ "receipt": receipt.id })),
    )
    .await;
    ok("Receipt sent", receipt)
}

pub async fn receipts_preview(
    session: SessionUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<PreviewQuery>,
) -> AppResult<Html<String>> {
    let id = parse_id(&id, "receipt")?;
    let receipt = get_receipt(&state, session.user_id(), &id).await?;
    preview_html(&state, DocumentRef::Receipt(&receipt), query.include_pdf_script).await
}

pub async fn receipts_delete(
    session: SessionUser,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse {
    let id = parse_id(&id, "receipt")?;
    let receipt = get_receipt(&state, session.user_id(), &id).await?;
    delete_receipt(&state, session.user_id(), &id).await?;
    notify(
        &state,
        session.user_id(),
        "Receipt Deleted",
        &format!("Receipt {} was moved to the trash", receipt.receipt_number),
        NotificationType::Warning,
    );
    audit(
        &state,
        &session,
        &meta,
        "receipt_deleted",
        format!("Deleted receipt {}", receipt.receipt_number),
        Some(json!({ "receipt": id })),
    )
    .await;
    ok("Receipt moved to trash", json!({ "id": id }))
}

pub async fn receipts_restore(
    session: SessionUser,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse {
    let id = parse_id(&id, "receipt")?;
    let receipt = restore_receipt(&state, session.user_id(), &id).await?;
    notify(
        &state,
        session.user_id(),
        "Receipt Restored",
        &format!("Receipt {} was restored", receipt.receipt_number),
        NotificationType::Info,
    );
    audit(
        &state,
        &session,
        &meta,
        "receipt_restored",
        format!("Restored receipt {}", receipt.receipt_number),
        Some(json!({ "receipt": id })),
    )
    .await;
    ok("Receipt restored", receipt)
}
