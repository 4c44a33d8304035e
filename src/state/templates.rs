use futures::stream::TryStreamExt;
use mongodb::bson::{DateTime, doc, oid::ObjectId};
use serde::Deserialize;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{Template, TemplateKind};

use super::AppState;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TemplateInput {
    #[validate(length(min = 2, max = 100))]
    pub name: String,
    #[validate(length(max = 500))]
    #[serde(default)]
    pub description: String,
    /// Remote URL or file name inside the templates directory.
    #[validate(length(min = 1))]
    pub file: String,
    #[serde(default)]
    pub preview_image: Option<String>,
    pub kind: TemplateKind,
}

pub async fn create_template(state: &AppState, input: TemplateInput) -> AppResult<Template> {
    input.validate()?;
    let mut template = Template {
        id: None,
        name: input.name.trim().to_string(),
        description: input.description,
        file: input.file,
        preview_image: input.preview_image,
        kind: input.kind,
        created_at: DateTime::now(),
    };
    let res = state.templates.insert_one(&template).await?;
    template.id = res.inserted_id.as_object_id();
    Ok(template)
}

pub async fn list_templates(state: &AppState, kind: Option<TemplateKind>) -> AppResult<Vec<Template>> {
    let filter = match kind {
        Some(kind) => doc! { "kind": kind.as_str() },
        None => doc! {},
    };
    let mut cursor = state.templates.find(filter).sort(doc! { "name": 1 }).await?;
    let mut items = Vec::new();
    while let Some(t) = cursor.try_next().await? {
        items.push(t);
    }
    Ok(items)
}

pub async fn get_template(state: &AppState, id: &ObjectId) -> AppResult<Template> {
    state
        .templates
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("Template"))
}

/// First template registered for `kind`, if any.
pub async fn default_template(state: &AppState, kind: TemplateKind) -> AppResult<Option<Template>> {
    Ok(state
        .templates
        .find_one(doc! { "kind": kind.as_str() })
        .sort(doc! { "created_at": 1 })
        .await?)
}
