// routes/view.rs
// Public document view (/view/{kind}/{id}) and the authenticated HTML preview helper.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::Html,
};
use serde::Deserialize;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::TemplateKind;
use crate::render::{DocumentRef, inject_pdf_styles, render_document};
use crate::state::{AppState, parse_id, view_invoice, view_quotation, view_receipt};

#[derive(Debug, Default, Deserialize)]
pub struct PreviewQuery {
    #[serde(default)]
    pub include_pdf_script: bool,
}

/// Rendered template with print styles (and optionally the auto-print script).
pub async fn preview_html(
    state: &AppState,
    document: DocumentRef<'_>,
    include_script: bool,
) -> AppResult<Html<String>> {
    let html = render_document(state, document).await?;
    Ok(Html(inject_pdf_styles(&html, include_script)))
}

/// Client-facing link target. Opening a sent quotation or invoice marks it viewed.
pub async fn view_document(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, String)>,
    Query(query): Query<PreviewQuery>,
) -> AppResult<Html<String>> {
    let kind = TemplateKind::parse(&kind)
        .ok_or_else(|| AppError::NotFound(format!("Unknown document kind `{kind}`")))?;
    let id = parse_id(&id, kind.as_str())?;
    debug!(kind = kind.as_str(), id = %id, "public document view");
    match kind {
        TemplateKind::Quote => {
            let quotation = view_quotation(&state, &id).await?;
            preview_html(&state, DocumentRef::Quotation(&quotation), query.include_pdf_script).await
        }
        TemplateKind::Invoice => {
            let invoice = view_invoice(&state, &id).await?;
            preview_html(&state, DocumentRef::Invoice(&invoice), query.include_pdf_script).await
        }
        TemplateKind::Receipt => {
            let receipt = view_receipt(&state, &id).await?;
            preview_html(&state, DocumentRef::Receipt(&receipt), query.include_pdf_script).await
        }
    }
}
