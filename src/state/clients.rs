use mongodb::bson::{DateTime, doc, oid::ObjectId};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::Client;

use super::{AppState, ListQuery, Page, apply_search, owner_filter, paginate};

pub(super) static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9+\-()\s]*$").expect("static phone pattern"));

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ClientInput {
    #[validate(length(min = 2, max = 100))]
    pub name: String,
    #[validate(length(min = 5, max = 200))]
    pub address: String,
    #[validate(length(min = 2, max = 100))]
    pub contact_name: String,
    #[validate(length(min = 1, max = 30), regex(path = *PHONE_RE))]
    pub contact_phone: String,
    #[validate(email)]
    pub contact_email: String,
}

pub async fn create_client(state: &AppState, user: &ObjectId, input: ClientInput) -> AppResult<Client> {
    input.validate()?;
    let mut client = Client {
        id: None,
        name: input.name.trim().to_string(),
        address: input.address.trim().to_string(),
        contact_name: input.contact_name.trim().to_string(),
        contact_phone: input.contact_phone.trim().to_string(),
        contact_email: input.contact_email.trim().to_lowercase(),
        creator: *user,
        is_deleted: false,
        deleted_at: None,
        created_at: DateTime::now(),
        updated_at: None,
    };
    let res = state.clients.insert_one(&client).await?;
    client.id = res.inserted_id.as_object_id();
    Ok(client)
}

pub async fn list_clients(state: &AppState, user: &ObjectId, query: &ListQuery) -> AppResult<Page<Client>> {
    let mut filter = owner_filter(user, false);
    apply_search(
        &mut filter,
        &["name", "contact_name", "contact_email"],
        query.search.as_deref(),
    );
    paginate(&state.clients, filter, doc! { "created_at": -1 }, query).await
}

pub async fn list_deleted_clients(
    state: &AppState,
    user: &ObjectId,
    query: &ListQuery,
) -> AppResult<Page<Client>> {
    super::trash(&state.clients, user, query).await
}

/// Live (not deleted) client owned by `user`.
pub async fn get_client(state: &AppState, user: &ObjectId, id: &ObjectId) -> AppResult<Client> {
    state
        .clients
        .find_one(doc! { "_id": id, "creator": user, "is_deleted": { "$ne": true } })
        .await?
        .ok_or_else(|| AppError::not_found("Client"))
}

pub async fn update_client(
    state: &AppState,
    user: &ObjectId,
    id: &ObjectId,
    input: ClientInput,
) -> AppResult<Client> {
    input.validate()?;
    let res = state
        .clients
        .update_one(
            doc! { "_id": id, "creator": user, "is_deleted": { "$ne": true } },
            doc! { "$set": {
                "name": input.name.trim(),
                "address": input.address.trim(),
                "contact_name": input.contact_name.trim(),
                "contact_phone": input.contact_phone.trim(),
                "contact_email": input.contact_email.trim().to_lowercase(),
                "updated_at": DateTime::now(),
            } },
        )
        .await?;
    if res.matched_count == 0 {
        return Err(AppError::not_found("Client"));
    }
    get_client(state, user, id).await
}

pub async fn delete_client(state: &AppState, user: &ObjectId, id: &ObjectId) -> AppResult<()> {
    super::soft_delete(&state.clients, user, id, "Client").await
}

pub async fn restore_client(state: &AppState, user: &ObjectId, id: &ObjectId) -> AppResult<Client> {
    super::restore(&state.clients, user, id, "Client").await?;
    get_client(state, user, id).await
}
