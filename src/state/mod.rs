// state module: AppState, initialization, and re-exports of submodules.

use anyhow::Result;
use futures::stream::TryStreamExt;
use mongodb::{
    Client as MongoClient, Collection,
    bson::{Bson, DateTime, Document, doc, oid::ObjectId},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{str::FromStr, sync::Arc};
use tracing::info;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::mailer::{LogMailer, Mailer};
use crate::models::{
    ActivityLog, Client, Invoice, Notification, Quotation, Receipt, Session, Template, User,
};

mod activity;
mod cleanup;
mod clients;
mod invoices;
mod notifications;
mod quotations;
mod receipts;
mod seed;
mod templates;
mod users;

pub use activity::*;
pub use cleanup::*;
pub use clients::*;
pub use invoices::*;
pub use notifications::*;
pub use quotations::*;
pub use receipts::*;
pub use templates::*;
pub use users::*;

pub const SESSION_TTL_SECONDS: u64 = 60 * 60 * 24; // 1 day
pub const DEFAULT_PAGE_SIZE: i64 = 10;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub mailer: Arc<dyn Mailer>,
    pub http: reqwest::Client,
    pub users: Collection<User>,
    pub sessions: Collection<Session>,
    pub clients: Collection<Client>,
    pub templates: Collection<Template>,
    pub quotations: Collection<Quotation>,
    pub invoices: Collection<Invoice>,
    pub receipts: Collection<Receipt>,
    pub notifications: Collection<Notification>,
    pub activity_logs: Collection<ActivityLog>,
}

pub async fn init_state(config: AppConfig) -> Result<AppState> {
    init_state_with_mailer(config, Arc::new(LogMailer)).await
}

pub async fn init_state_with_mailer(config: AppConfig, mailer: Arc<dyn Mailer>) -> Result<AppState> {
    let client = MongoClient::with_uri_str(&config.mongodb_uri).await?;
    let db = client.database(&config.mongodb_db);

    seed::ensure_collections(&db).await?;
    seed::ensure_indexes(&db).await?;

    // Only seed when the database is effectively empty (no users).
    if seed::is_database_empty(&db).await? {
        let default_users = seed::load_default_users(&config.users_file)?;
        let inserted = seed::seed_default_users(&db, &default_users).await?;
        info!(users = inserted, db = %config.mongodb_db, "seeded default users");
    }

    Ok(AppState {
        config: Arc::new(config),
        mailer,
        http: reqwest::Client::new(),
        users: db.collection::<User>("users"),
        sessions: db.collection::<Session>("sessions"),
        clients: db.collection::<Client>("clients"),
        templates: db.collection::<Template>("templates"),
        quotations: db.collection::<Quotation>("quotations"),
        invoices: db.collection::<Invoice>("invoices"),
        receipts: db.collection::<Receipt>("receipts"),
        notifications: db.collection::<Notification>("notifications"),
        activity_logs: db.collection::<ActivityLog>("activity_logs"),
    })
}

/// Parse a hex id coming from a path or payload.
pub fn parse_id(raw: &str, what: &str) -> AppResult<ObjectId> {
    ObjectId::from_str(raw.trim())
        .map_err(|_| AppError::validation(format!("Invalid {what} id")))
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates.
pub fn parse_date(raw: &str, field: &str) -> AppResult<DateTime> {
    let raw = raw.trim();
    if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Ok(DateTime::from_chrono(ts.with_timezone(&chrono::Utc)));
    }
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| DateTime::from_chrono(naive.and_utc()))
        .ok_or_else(|| AppError::validation(format!("`{field}` must be a date (YYYY-MM-DD)")))
}

/// Decode a loosely typed JSON payload into its typed form, reporting a 400 on mismatch.
pub fn parse_payload<T: DeserializeOwned>(payload: serde_json::Value) -> AppResult<T> {
    serde_json::from_value(payload).map_err(|e| AppError::validation(format!("Invalid payload: {e}")))
}

/// Fails with the list of dotted paths that are missing or blank.
pub fn require_fields(payload: &serde_json::Value, required: &[&str]) -> AppResult<()> {
    let missing = crate::billing::validate::missing_fields(payload, required);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::MissingFields(missing))
    }
}

pub(crate) fn to_bson<T: Serialize>(value: &T) -> AppResult<Bson> {
    mongodb::bson::to_bson(value).map_err(|e| AppError::Internal(e.into()))
}

/// Query string shared by every list endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub total: u64,
    pub page: u64,
    pub limit: i64,
    pub items: Vec<T>,
}

/// Owner filter that hides (or shows only) soft-deleted documents.
pub(crate) fn owner_filter(user: &ObjectId, deleted: bool) -> Document {
    if deleted {
        doc! { "creator": user, "is_deleted": true }
    } else {
        doc! { "creator": user, "is_deleted": { "$ne": true } }
    }
}

/// Adds a case-insensitive `$or` over `fields` when a search term is present.
pub(crate) fn apply_search(filter: &mut Document, fields: &[&str], term: Option<&str>) {
    let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) else {
        return;
    };
    let pattern = regex::escape(term);
    let clauses: Vec<Document> = fields
        .iter()
        .map(|field| {
            let mut clause = Document::new();
            clause.insert(*field, doc! { "$regex": pattern.as_str(), "$options": "i" });
            clause
        })
        .collect();
    filter.insert("$or", clauses);
}

/// Documents to skip for a 1-based `page`. Absurd page numbers saturate at the largest
/// skip MongoDB accepts instead of wrapping.
fn page_offset(page: u64, limit: i64) -> u64 {
    page.saturating_sub(1)
        .saturating_mul(limit.max(0) as u64)
        .min(i64::MAX as u64)
}

pub(crate) async fn paginate<T>(
    coll: &Collection<T>,
    filter: Document,
    sort: Document,
    query: &ListQuery,
) -> AppResult<Page<T>>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, 100);
    let total = coll.count_documents(filter.clone()).await?;
    let mut cursor = coll
        .find(filter)
        .sort(sort)
        .skip(page_offset(page, limit))
        .limit(limit)
        .await?;
    let mut items = Vec::new();
    while let Some(item) = cursor.try_next().await? {
        items.push(item);
    }
    Ok(Page {
        total,
        page,
        limit,
        items,
    })
}

/// Flag a document as deleted. Never removes it; the cleanup sweep does that.
pub(crate) async fn soft_delete<T>(
    coll: &Collection<T>,
    user: &ObjectId,
    id: &ObjectId,
    what: &str,
) -> AppResult<()>
where
    T: Send + Sync,
{
    let res = coll
        .update_one(
            doc! { "_id": id, "creator": user, "is_deleted": { "$ne": true } },
            doc! {
                "$set": { "is_deleted": true, "deleted_at": DateTime::now() },
                "$inc": { "version": 1_i64 },
            },
        )
        .await?;
    if res.matched_count == 0 {
        return Err(AppError::not_found(what));
    }
    Ok(())
}

pub(crate) async fn restore<T>(
    coll: &Collection<T>,
    user: &ObjectId,
    id: &ObjectId,
    what: &str,
) -> AppResult<()>
where
    T: Send + Sync,
{
    let res = coll
        .update_one(
            doc! { "_id": id, "creator": user, "is_deleted": true },
            doc! {
                "$set": { "is_deleted": false, "deleted_at": null },
                "$inc": { "version": 1_i64 },
            },
        )
        .await?;
    if res.matched_count == 0 {
        return Err(AppError::NotFound(format!("{what} not found in trash")));
    }
    Ok(())
}

pub(crate) async fn trash<T>(
    coll: &Collection<T>,
    user: &ObjectId,
    query: &ListQuery,
) -> AppResult<Page<T>>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    paginate(coll, owner_filter(user, true), doc! { "deleted_at": -1 }, query).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_offsets() {
        assert_eq!(page_offset(1, 10), 0);
        assert_eq!(page_offset(3, 25), 50);
        assert_eq!(page_offset(u64::MAX, 100), i64::MAX as u64);
    }
}
