// session.rs
// Session middleware to protect routes, plus extractors for the session user and request metadata.

use std::sync::Arc;

use axum::{
    Json,
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, StatusCode, header::COOKIE, header::USER_AGENT, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use mongodb::bson::oid::ObjectId;
use tracing::error;

use crate::models::User;
use crate::state::{AppState, RequestMeta, find_user_by_session};

pub const SESSION_COOKIE_NAME: &str = "session";

#[derive(Clone)]
pub struct SessionData {
    pub user: User,
    pub user_id: ObjectId,
    pub token: String,
}

/// First cookie token that maps to a live session and an existing user.
async fn resolve_session(state: &AppState, headers: &HeaderMap) -> anyhow::Result<Option<SessionData>> {
    for token in extract_cookies(headers, SESSION_COOKIE_NAME) {
        if let Some(user) = find_user_by_session(state, &token).await? {
            if let Some(user_id) = user.id {
                return Ok(Some(SessionData { user, user_id, token }));
            }
        }
    }
    Ok(None)
}

/// Middleware for the protected router: 401 without a live session cookie.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let resolved = resolve_session(&state, request.headers()).await;
    match resolved {
        Ok(Some(session)) => {
            request.extensions_mut().insert(session);
            Ok(next.run(request).await)
        }
        Ok(None) => Err(unauthorized_response()),
        Err(err) => {
            error!(error = %err, "session lookup failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "message": "session lookup failed" })),
            )
                .into_response())
        }
    }
}

pub struct SessionUser(pub SessionData);

impl SessionUser {
    pub fn user(&self) -> &User {
        &self.0.user
    }

    pub fn token(&self) -> &str {
        &self.0.token
    }

    pub fn user_id(&self) -> &ObjectId {
        &self.0.user_id
    }
}

#[allow(refining_impl_trait)]
impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> BoxFuture<'static, Result<Self, Self::Rejection>> {
        let data = parts
            .extensions
            .get::<SessionData>()
            .cloned()
            .ok_or_else(unauthorized_response);

        Box::pin(async move { data.map(SessionUser) })
    }
}

#[allow(refining_impl_trait)]
impl<S> FromRequestParts<S> for RequestMeta
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> BoxFuture<'static, Result<Self, Self::Rejection>> {
        let meta = request_meta(&parts.headers);
        Box::pin(async move { Ok(meta) })
    }
}

/// First hop of `x-forwarded-for` (or `x-real-ip`) and the user agent.
pub fn request_meta(headers: &HeaderMap) -> RequestMeta {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let ip = header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .or_else(|| header("x-real-ip"))
        .unwrap_or("unknown")
        .to_string();
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    RequestMeta { ip, user_agent }
}

fn unauthorized_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "message": "unauthorized" })),
    )
        .into_response()
}

/// Values of every `name=` pair across all Cookie headers, in order.
fn extract_cookies(headers: &HeaderMap, name: &str) -> Vec<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .filter(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn picks_the_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; session=abc123"));
        assert_eq!(extract_cookies(&headers, SESSION_COOKIE_NAME), vec!["abc123"]);
    }

    #[test]
    fn forwarded_ip_uses_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 172.16.0.2"));
        headers.insert(USER_AGENT, HeaderValue::from_static("curl/8.0"));
        let meta = request_meta(&headers);
        assert_eq!(meta.ip, "10.0.0.1");
        assert_eq!(meta.user_agent, "curl/8.0");
    }

    #[test]
    fn missing_headers_are_unknown() {
        let meta = request_meta(&HeaderMap::new());
        assert_eq!(meta.ip, "unknown");
        assert_eq!(meta.user_agent, "unknown");
    }
}
