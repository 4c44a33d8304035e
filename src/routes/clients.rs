// routes/clients.rs
// /api/clients: CRUD with soft delete, restore and trash listing.

use std::sync::Arc;

use axum::extract::{Json, Path, Query, State};
use serde_json::{Value, json};

use crate::models::NotificationType;
use crate::session::SessionUser;
use crate::state::{
    AppState, ClientInput, ListQuery, RequestMeta, create_client, delete_client, get_client,
    list_clients, list_deleted_clients, notify, parse_id, parse_payload, restore_client,
    update_client,
};

use super::{ApiResponse, audit, created, ok};

pub async fn clients_index(
    session: SessionUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResponse {
    let page = list_clients(&state, session.user_id(), &query).await?;
    ok("Clients retrieved", page)
}

pub async fn clients_trash(
    session: SessionUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResponse {
    let page = list_deleted_clients(&state, session.user_id(), &query).await?;
    ok("Deleted clients retrieved", page)
}

pub async fn clients_create(
    session: SessionUser,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> ApiResponse {
    let input: ClientInput = parse_payload(body)?;
    let client = create_client(&state, session.user_id(), input).await?;
    notify(
        &state,
        session.user_id(),
        "New Client Added",
        &format!("{} was added to your clients", client.name),
        NotificationType::Success,
    );
    audit(
        &state,
        &session,
        &meta,
        "client_created",
        format!("Created client {}", client.name),
        Some(json!({ "client": client.id })),
    )
    .await;
    created("Client created", client)
}

pub async fn clients_show(
    session: SessionUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse {
    let id = parse_id(&id, "client")?;
    let client = get_client(&state, session.user_id(), &id).await?;
    ok("Client retrieved", client)
}

pub async fn clients_update(
    session: SessionUser,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResponse {
    let id = parse_id(&id, "client")?;
    let input: ClientInput = parse_payload(body)?;
    let client = update_client(&state, session.user_id(), &id, input).await?;
    audit(
        &state,
        &session,
        &meta,
        "client_updated",
        format!("Updated client {}", client.name),
        Some(json!({ "client": client.id })),
    )
    .await;
    ok("Client updated", client)
}

pub async fn clients_delete(
    session: SessionUser,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse {
    let id = parse_id(&id, "client")?;
    let client = get_client(&state, session.user_id(), &id).await?;
    delete_client(&state, session.user_id(), &id).await?;
    notify(
        &state,
        session.user_id(),
        "Client Deleted",
        &format!("{} was moved to the trash", client.name),
        NotificationType::Warning,
    );
    audit(
        &state,
        &session,
        &meta,
        "client_deleted",
        format!("Deleted client {}", client.name),
        Some(json!({ "client": id })),
    )
    .await;
    ok("Client moved to trash", json!({ "id": id }))
}

pub async fn clients_restore(
    session: SessionUser,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse {
    let id = parse_id(&id, "client")?;
    let client = restore_client(&state, session.user_id(), &id).await?;
    notify(
        &state,
        session.user_id(),
        "Client Restored",
        &format!("{} was restored", client.name),
        NotificationType::Info,
    );
    audit(
        &state,
        &session,
        &meta,
        "client_restored",
        format!("Restored client {}", client.name),
        Some(json!({ "client": id })),
    )
    .await;
    ok("Client restored", client)
}
