// routes/templates.rs
// /api/templates: multipart upload (file stored in the templates dir, or a remote URL), list, get.

use std::{path::Path as FsPath, sync::Arc};

use axum::extract::{Multipart, Path, Query, State};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::TemplateKind;
use crate::session::SessionUser;
use crate::state::{
    AppState, RequestMeta, TemplateInput, create_template, get_template, list_templates, parse_id,
};

use super::{ApiResponse, audit, created, ok};

const MAX_TEMPLATE_BYTES: usize = 2 * 1024 * 1024;

#[derive(Deserialize)]
pub struct TemplateQuery {
    pub kind: Option<String>,
}

pub async fn templates_index(
    _session: SessionUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<TemplateQuery>,
) -> ApiResponse {
    let kind = match query.kind.as_deref().filter(|k| !k.is_empty()) {
        Some(raw) => Some(
            TemplateKind::parse(raw)
                .ok_or_else(|| AppError::validation(format!("Unknown template kind `{raw}`")))?,
        ),
        None => None,
    };
    let templates = list_templates(&state, kind).await?;
    ok("Templates retrieved", templates)
}

pub async fn templates_show(
    _session: SessionUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse {
    let id = parse_id(&id, "template")?;
    let template = get_template(&state, &id).await?;
    ok("Template retrieved", template)
}

fn bad_multipart(err: impl std::fmt::Display) -> AppError {
    AppError::validation(format!("Failed to read multipart field: {err}"))
}

pub async fn templates_create(
    session: SessionUser,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResponse {
    let mut name = String::new();
    let mut description = String::new();
    let mut kind = None;
    let mut preview_image = None;
    let mut file = String::new();

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "file" if field.file_name().is_some() => {
                let original = field.file_name().unwrap_or("template.html").to_string();
                let data = field.bytes().await.map_err(bad_multipart)?;
                if data.len() > MAX_TEMPLATE_BYTES {
                    return Err(AppError::validation("Template file too large (max 2MB)"));
                }
                let extension = FsPath::new(&original)
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .unwrap_or("html");
                let stored = format!("{}.{extension}", Uuid::new_v4());
                tokio::fs::create_dir_all(&state.config.templates_dir)
                    .await
                    .map_err(|e| AppError::Internal(e.into()))?;
                tokio::fs::write(FsPath::new(&state.config.templates_dir).join(&stored), &data)
                    .await
                    .map_err(|e| AppError::Internal(e.into()))?;
                info!(file = %stored, bytes = data.len(), "template uploaded");
                file = stored;
            }
            other => {
                let text = field.text().await.map_err(bad_multipart)?;
                match other {
                    "file" => file = text,
                    "name" => name = text,
                    "description" => description = text,
                    "preview_image" => preview_image = Some(text).filter(|t| !t.trim().is_empty()),
                    "kind" => {
                        kind = Some(TemplateKind::parse(text.trim()).ok_or_else(|| {
                            AppError::validation(format!("Unknown template kind `{text}`"))
                        })?)
                    }
                    _ => {}
                }
            }
        }
    }

    let kind = kind.ok_or_else(|| AppError::MissingFields(vec!["kind".to_string()]))?;
    let template = create_template(
        &state,
        TemplateInput {
            name,
            description,
            file,
            preview_image,
            kind,
        },
    )
    .await?;
    audit(
        &state,
        &session,
        &meta,
        "template_created",
        format!("Uploaded {} template {}", template.kind.as_str(), template.name),
        Some(json!({ "template": template.id })),
    )
    .await;
    created("Template created", template)
}
