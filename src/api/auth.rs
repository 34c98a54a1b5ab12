//! Console login and shared-token authentication middleware
//!
//! Authorization is a single shared-secret bearer token: every authorized
//! caller has equal rights to command every device. The token travels in
//! the `Authorization` header, or as a `token` query parameter for device
//! polling clients that cannot set headers.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
    routing::post,
};
use serde::{Deserialize, Serialize};

use super::ApiState;

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub username: String,
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Build the login router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new().route("/login", post(login)).with_state(state)
}

/// Static credential check returning the process-wide opaque token
async fn login(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<LoginBody>,
) -> (StatusCode, Json<LoginResponse>) {
    let auth = &state.auth;

    if auth.password.is_empty()
        || body.username != auth.username
        || body.password != auth.password
    {
        tracing::warn!(username = %body.username, "login rejected");
        return (
            StatusCode::UNAUTHORIZED,
            Json(LoginResponse {
                success: false,
                token: None,
                error: Some("invalid credentials".to_string()),
            }),
        );
    }

    tracing::info!(username = %body.username, "console login");
    (
        StatusCode::OK,
        Json(LoginResponse {
            success: true,
            token: Some(auth.token.clone()),
            error: None,
        }),
    )
}

/// Extract the bearer token from the Authorization header
fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Extract a `token` query parameter
fn query_token(req: &Request) -> Option<&str> {
    req.uri().query().and_then(|query| {
        query.split('&').find_map(|pair| {
            pair.strip_prefix("token=")
                .filter(|value| !value.is_empty())
        })
    })
}

/// Middleware requiring the shared-secret token
///
/// No request state is mutated on rejection.
pub async fn require_token(
    State(state): State<Arc<ApiState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let provided = bearer_token(&req).or_else(|| query_token(&req));

    match provided {
        Some(token) if token == state.auth.token => Ok(next.run(req).await),
        Some(_) => {
            tracing::warn!("invalid token provided");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            tracing::debug!("no token provided");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn extracts_bearer_token() {
        let mut req = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(bearer_token(&req), None);

        req.headers_mut().insert(
            "authorization",
            HeaderValue::from_static("Bearer secret-123"),
        );
        assert_eq!(bearer_token(&req), Some("secret-123"));
    }

    #[test]
    fn extracts_query_token() {
        let req = Request::builder()
            .uri("/api/devices/dev1/command/poll?token=secret-123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(query_token(&req), Some("secret-123"));

        let req = Request::builder()
            .uri("/api/devices/dev1/command/poll?token=")
            .body(Body::empty())
            .unwrap();
        assert_eq!(query_token(&req), None);
    }
}
