// app.rs
// Router wiring: public auth/view endpoints plus the session-protected /api surface.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, patch, post, put},
};

use crate::routes::{
    self, clients::*, invoices::*, notifications::*, profile::*, quotations::*, receipts::*,
    security::*, templates::*, view::view_document,
};
use crate::session;
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/setup", get(routes::setup))
        .route("/qrcode", get(routes::qrcode))
        .route("/logout", post(routes::logout))
        .route("/api/profile", get(profile_show).patch(profile_update))
        // clients
        .route("/api/clients", get(clients_index).post(clients_create))
        .route("/api/clients/trash", get(clients_trash))
        .route(
            "/api/clients/{id}",
            get(clients_show).put(clients_update).delete(clients_delete),
        )
        .route("/api/clients/{id}/restore", put(clients_restore))
        // templates
        .route("/api/templates", get(templates_index).post(templates_create))
        .route("/api/templates/{id}", get(templates_show))
        // quotations
        .route("/api/quotations", get(quotations_index).post(quotations_create))
        .route("/api/quotations/trash", get(quotations_trash))
        .route(
            "/api/quotations/{id}",
            get(quotations_show)
                .put(quotations_update)
                .delete(quotations_delete),
        )
        .route("/api/quotations/{id}/status", patch(quotations_status))
        .route("/api/quotations/{id}/restore", put(quotations_restore))
        .route("/api/quotations/{id}/send", post(quotations_send))
        .route("/api/quotations/{id}/preview", get(quotations_preview))
        // invoices
        .route("/api/invoices", get(invoices_index).post(invoices_create))
        .route("/api/invoices/trash", get(invoices_trash))
        .route("/api/invoices/overdue", get(invoices_overdue))
        .route("/api/invoices/check-overdue", post(invoices_check_overdue))
        .route(
            "/api/invoices/from-quotation/{quotation_id}",
            post(invoices_from_quotation),
        )
        .route(
            "/api/invoices/{id}",
            get(invoices_show).put(invoices_update).delete(invoices_delete),
        )
        .route("/api/invoices/{id}/restore", put(invoices_restore))
        .route("/api/invoices/{id}/status", patch(invoices_status))
        .route(
            "/api/invoices/{id}/payment-history",
            get(invoices_payment_history),
        )
        .route("/api/invoices/{id}/send", post(invoices_send))
        .route("/api/invoices/{id}/preview", get(invoices_preview))
        // receipts
        .route("/api/receipts", get(receipts_index).post(receipts_create))
        .route("/api/receipts/trash", get(receipts_trash))
        .route(
            "/api/receipts/invoice/{invoice_id}",
            get(receipts_for_invoice_index),
        )
        .route(
            "/api/receipts/{id}",
            get(receipts_show).delete(receipts_delete),
        )
        .route("/api/receipts/{id}/restore", put(receipts_restore))
        .route("/api/receipts/{id}/send", post(receipts_send))
        .route("/api/receipts/{id}/preview", get(receipts_preview))
        // notifications and audit
        .route("/api/notifications", get(notifications_index))
        .route("/api/notifications/{id}/read", patch(notifications_read))
        .route("/api/security/activity", get(activity_index))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            session::require_session,
        ));

    Router::new()
        .route("/login", post(routes::login))
        .route("/view/{kind}/{id}", get(view_document))
        .merge(protected)
        .with_state(state)
}
