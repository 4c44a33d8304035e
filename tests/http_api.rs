#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt; // for oneshot

use prezio::{
    app::build_router,
    models::TemplateKind,
    session::SESSION_COOKIE_NAME,
    state::{AppState, create_session, list_activity},
};

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

fn json_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

fn authed(method: &str, uri: &str, cookie: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, cookie)
        .header("x-forwarded-for", "203.0.113.7, 10.0.0.1");
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn login_cookie(state: &AppState, email: &str) -> String {
    let token = create_session(state, email).await.unwrap();
    format!("{SESSION_COOKIE_NAME}={token}")
}

#[tokio::test]
async fn api_requires_a_session() {
    let Some(ctx) = common::setup_state().await else {
        return;
    };
    let app = build_router(Arc::new(ctx.state.clone()));

    let (status, body) = send(
        &app,
        Request::builder().uri("/api/clients").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json_body(&body)["message"].is_string());

    let (status, _) = send(
        &app,
        authed("GET", "/api/invoices", "session=not-a-token", None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    common::teardown(ctx).await;
}

#[tokio::test]
async fn client_crud_over_http() {
    let Some(ctx) = common::setup_state().await else {
        return;
    };
    let state = ctx.state.clone();
    let fx = common::fixture(&state, TemplateKind::Invoice).await;
    let cookie = login_cookie(&state, &fx.email).await;
    let app = build_router(Arc::new(state.clone()));

    let (status, body) = send(
        &app,
        authed(
            "POST",
            "/api/clients",
            &cookie,
            Some(json!({
                "name": "Globex",
                "address": "Kenyatta Avenue 4",
                "contact_name": "Hank Scorpio",
                "contact_phone": "0711 222 333",
                "contact_email": "HANK@globex.test",
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let created = json_body(&body);
    assert_eq!(created["data"]["contact_email"], "hank@globex.test");
    let id = created["data"]["_id"]["$oid"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        authed("POST", "/api/clients", &cookie, Some(json!({ "name": "X" }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json_body(&body)["message"].is_string());

    let (status, body) = send(&app, authed("GET", "/api/clients?limit=1", &cookie, None)).await;
    assert_eq!(status, StatusCode::OK);
    let page = json_body(&body);
    assert_eq!(page["data"]["total"], 2);
    assert_eq!(page["data"]["items"].as_array().unwrap().len(), 1);

    let (status, _) = send(&app, authed("DELETE", &format!("/api/clients/{id}"), &cookie, None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, authed("GET", &format!("/api/clients/{id}"), &cookie, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(
        &app,
        authed("PUT", &format!("/api/clients/{id}/restore"), &cookie, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, authed("GET", "/api/clients/not-an-id", &cookie, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let activity = list_activity(&state, &fx.user).await.unwrap();
    assert!(activity.iter().any(|a| a.action == "client_created" && a.ip == "203.0.113.7"));

    common::teardown(ctx).await;
}

#[tokio::test]
async fn public_view_marks_sent_invoice_viewed() {
    let Some(ctx) = common::setup_state().await else {
        return;
    };
    let state = ctx.state.clone();
    let fx = common::fixture(&state, TemplateKind::Invoice).await;
    let cookie = login_cookie(&state, &fx.email).await;
    let app = build_router(Arc::new(state.clone()));

    let (status, body) = send(
        &app,
        authed(
            "POST",
            "/api/invoices",
            &cookie,
            Some(json!({
                "client": fx.client_id(),
                "template": fx.template_id(),
                "name": "Audit",
                "currency": "KSH",
                "due_date": "2031-02-01",
                "line_items": [{ "description": "Audit", "quantity": 1, "unit_price": 500 }],
                "payment": { "details": { "method": "bank", "bank_name": "NCBA", "account_number": "77" } },
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = json_body(&body)["data"]["_id"]["$oid"].as_str().unwrap().to_string();

    let (status, body) = send(&app, authed("POST", &format!("/api/invoices/{id}/send"), &cookie, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["data"]["status"], "sent");

    let (status, body) = send(
        &app,
        Request::builder()
            .uri(format!("/view/invoice/{id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("00001"));
    assert!(html.contains("Acme Ltd"));

    let (_, body) = send(&app, authed("GET", &format!("/api/invoices/{id}"), &cookie, None)).await;
    assert_eq!(json_body(&body)["data"]["status"], "viewed");

    // stale version over HTTP
    let (status, body) = send(
        &app,
        authed(
            "PATCH",
            &format!("/api/invoices/{id}/status"),
            &cookie,
            Some(json!({ "version": 0, "amount": 100 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json_body(&body)["current_version"], 2);

    common::teardown(ctx).await;
}

#[tokio::test]
async fn login_does_not_reveal_which_accounts_exist() {
    let Some(ctx) = common::setup_state().await else {
        return;
    };
    let state = ctx.state.clone();
    let fx = common::fixture(&state, TemplateKind::Invoice).await;
    let app = build_router(Arc::new(state.clone()));

    let attempt = |email: &str| {
        Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "email": email, "code": "not-a-code" }).to_string()))
            .unwrap()
    };

    let (unknown_status, unknown_body) = send(&app, attempt("nobody@prezio.test")).await;
    let (wrong_status, wrong_body) = send(&app, attempt(&fx.email)).await;
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(&unknown_body), json_body(&wrong_body));

    common::teardown(ctx).await;
}

#[tokio::test]
async fn profile_is_read_and_edited_over_http() {
    let Some(ctx) = common::setup_state().await else {
        return;
    };
    let state = ctx.state.clone();
    let fx = common::fixture(&state, TemplateKind::Invoice).await;
    let cookie = login_cookie(&state, &fx.email).await;
    let app = build_router(Arc::new(state.clone()));

    let (status, body) = send(&app, authed("GET", "/api/profile", &cookie, None)).await;
    assert_eq!(status, StatusCode::OK);
    let profile = json_body(&body);
    assert_eq!(profile["data"]["email"], fx.email.as_str());
    assert!(profile["data"].get("secret").is_none());

    let (status, body) = send(
        &app,
        authed(
            "PATCH",
            "/api/profile",
            &cookie,
            Some(json!({ "company_name": "Prezio Studio", "phone": "0712 345 678" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let updated = json_body(&body);
    assert_eq!(updated["data"]["company_name"], "Prezio Studio");
    assert_eq!(updated["data"]["phone"], "0712 345 678");

    let (status, _) = send(
        &app,
        authed("PATCH", "/api/profile", &cookie, Some(json!({ "secret": "AAAA" }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let activity = list_activity(&state, &fx.user).await.unwrap();
    assert!(activity.iter().any(|a| a.action == "profile_updated"));

    common::teardown(ctx).await;
}
