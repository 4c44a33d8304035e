use anyhow::{Context, Result};
use data_encoding::BASE32_NOPAD;
use mongodb::{
    bson::{DateTime, Document, doc, oid::ObjectId},
    options::ReturnDocument,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{Session, User};

use super::{AppState, SESSION_TTL_SECONDS, clients::PHONE_RE};

/// Per-user document counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Quote,
    Invoice,
    Receipt,
}

impl Counter {
    fn field(&self) -> &'static str {
        match self {
            Counter::Quote => "last_quote_number",
            Counter::Invoice => "last_invoice_number",
            Counter::Receipt => "last_receipt_number",
        }
    }
}

pub async fn find_user(state: &AppState, email: &str) -> Result<Option<User>> {
    state
        .users
        .find_one(doc! { "email": email })
        .await
        .map_err(Into::into)
}

pub(crate) async fn require_user(state: &AppState, id: &ObjectId) -> AppResult<User> {
    state
        .users
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("User"))
}

pub async fn create_user(state: &AppState, email: &str, secret: &str, name: &str) -> Result<ObjectId> {
    let res = state
        .users
        .insert_one(User {
            id: None,
            email: email.to_string(),
            secret: secret.to_string(),
            name: name.to_string(),
            company_name: String::new(),
            position: String::new(),
            phone: String::new(),
            address: String::new(),
            logo: None,
            quote_terms: String::new(),
            invoice_terms: String::new(),
            last_quote_number: 0,
            last_invoice_number: 0,
            last_receipt_number: 0,
        })
        .await?;
    res.inserted_id
        .as_object_id()
        .context("user insert missing _id")
}

/// Atomically bump one counter and return its new value.
pub async fn next_counter(state: &AppState, user: &ObjectId, counter: Counter) -> AppResult<i64> {
    let mut inc = Document::new();
    inc.insert(counter.field(), 1_i64);
    let updated = state
        .users
        .find_one_and_update(doc! { "_id": user }, doc! { "$inc": inc })
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    Ok(match counter {
        Counter::Quote => updated.last_quote_number,
        Counter::Invoice => updated.last_invoice_number,
        Counter::Receipt => updated.last_receipt_number,
    })
}

/// Account fields shown to and editable by the owner. The TOTP secret never leaves the server.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub email: String,
    pub name: String,
    pub company_name: String,
    pub position: String,
    pub phone: String,
    pub address: String,
    pub logo: Option<String>,
    pub quote_terms: String,
    pub invoice_terms: String,
}

impl From<&User> for Profile {
    fn from(user: &User) -> Self {
        Profile {
            email: user.email.clone(),
            name: user.name.clone(),
            company_name: user.company_name.clone(),
            position: user.position.clone(),
            phone: user.phone.clone(),
            address: user.address.clone(),
            logo: user.logo.clone(),
            quote_terms: user.quote_terms.clone(),
            invoice_terms: user.invoice_terms.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ProfilePatch {
    #[validate(length(min = 2, max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 100))]
    pub company_name: Option<String>,
    #[validate(length(max = 100))]
    pub position: Option<String>,
    #[validate(length(max = 30), regex(path = *PHONE_RE))]
    pub phone: Option<String>,
    #[validate(length(max = 200))]
    pub address: Option<String>,
    #[validate(url)]
    pub logo: Option<String>,
    #[validate(length(max = 5000))]
    pub quote_terms: Option<String>,
    #[validate(length(max = 5000))]
    pub invoice_terms: Option<String>,
}

pub async fn get_profile(state: &AppState, user: &ObjectId) -> AppResult<Profile> {
    Ok(Profile::from(&require_user(state, user).await?))
}

/// Apply the supplied fields; later documents snapshot the new values, earlier ones keep theirs.
pub async fn update_profile(state: &AppState, user: &ObjectId, patch: ProfilePatch) -> AppResult<Profile> {
    patch.validate()?;
    let mut set = Document::new();
    let fields = [
        ("name", patch.name),
        ("company_name", patch.company_name),
        ("position", patch.position),
        ("phone", patch.phone),
        ("address", patch.address),
        ("quote_terms", patch.quote_terms),
        ("invoice_terms", patch.invoice_terms),
        ("logo", patch.logo),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            set.insert(key, value.trim());
        }
    }
    if set.is_empty() {
        return Err(AppError::validation("No profile fields to update"));
    }
    let updated = state
        .users
        .find_one_and_update(doc! { "_id": user }, doc! { "$set": set })
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    Ok(Profile::from(&updated))
}

fn new_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    BASE32_NOPAD.encode(&bytes)
}

/// Opens a fresh session for `email`, replacing any it already had.
pub async fn create_session(state: &AppState, email: &str) -> Result<String> {
    state
        .sessions
        .delete_many(doc! { "user_email": email })
        .await
        .context("failed to clear previous sessions")?;

    let session = Session {
        id: None,
        token: new_session_token(),
        user_email: email.to_string(),
        expires_at: DateTime::from_system_time(
            SystemTime::now() + Duration::from_secs(SESSION_TTL_SECONDS),
        ),
    };
    state.sessions.insert_one(&session).await?;
    Ok(session.token)
}

/// Owner of a live session. Expired entries are ignored even before the TTL index reaps them.
pub async fn find_user_by_session(state: &AppState, token: &str) -> Result<Option<User>> {
    let live = state
        .sessions
        .find_one(doc! { "token": token, "expires_at": { "$gt": DateTime::now() } })
        .await?;
    match live {
        Some(session) => find_user(state, &session.user_email).await,
        None => Ok(None),
    }
}

pub async fn delete_session(state: &AppState, token: &str) -> Result<()> {
    state.sessions.delete_one(doc! { "token": token }).await?;
    Ok(())
}
