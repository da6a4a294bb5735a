//! Login and challenge endpoints.
//!
//! All authentication failures collapse to one uniform message so a caller
//! cannot learn whether the username exists, which check failed, or whether a
//! challenge session was already spent. Transient provider outages are the
//! only failures reported differently (retryable, 502).

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use super::state::AuthState;
use crate::directory::{ChallengeKind, DirectoryError};
use crate::flow::{AuthFlowError, AuthOutcome};
use crate::guard::require_authentication;

const AUTH_FAILED: &str = "authentication failed";
const AUTH_UNAVAILABLE: &str = "authentication service unavailable, retry later";

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChallengeRequest {
    pub username: String,
    pub challenge: ChallengeKind,
    pub session: String,
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoginResponse {
    Ok {
        token: String,
    },
    Challenge {
        challenge: ChallengeKind,
        session: String,
    },
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub subject: String,
    pub groups: Vec<String>,
    pub expires_at: i64,
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated or challenge required", body = LoginResponse),
        (status = 400, description = "Missing payload", body = String),
        (status = 401, description = "Authentication failed", body = String),
        (status = 502, description = "Directory unavailable", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    let password = SecretString::from(request.password);
    let username = request.username;

    match state.authenticator().authenticate(&username, &password).await {
        Ok(AuthOutcome::Authenticated { token }) => {
            info!(username = %username, outcome = "authenticated", "login");
            (StatusCode::OK, Json(LoginResponse::Ok { token })).into_response()
        }
        Ok(AuthOutcome::ChallengeRequired { kind, session }) => {
            info!(username = %username, outcome = "challenge", challenge = kind.as_str(), "login");
            (
                StatusCode::OK,
                Json(LoginResponse::Challenge {
                    challenge: kind,
                    session,
                }),
            )
                .into_response()
        }
        Err(err) => auth_failure(&username, "login", &err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/challenge",
    request_body = ChallengeRequest,
    responses(
        (status = 200, description = "Challenge completed", body = LoginResponse),
        (status = 400, description = "Missing payload", body = String),
        (status = 401, description = "Authentication failed", body = String),
        (status = 502, description = "Directory unavailable", body = String)
    ),
    tag = "auth"
)]
pub async fn challenge(
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<ChallengeRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    let code = SecretString::from(request.code);
    let username = request.username;

    match state
        .authenticator()
        .respond_to_challenge(&username, request.challenge, &request.session, &code)
        .await
    {
        Ok(AuthOutcome::Authenticated { token }) => {
            info!(
                username = %username,
                outcome = "authenticated",
                challenge = request.challenge.as_str(),
                "challenge"
            );
            (StatusCode::OK, Json(LoginResponse::Ok { token })).into_response()
        }
        // respond_to_challenge never yields a second challenge.
        Ok(AuthOutcome::ChallengeRequired { .. }) => {
            error!(username = %username, "unexpected nested challenge");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(err) => auth_failure(&username, "challenge", &err),
    }
}

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Decoded claims for the presented token", body = SessionResponse),
        (status = 401, description = "Missing or invalid token", body = String)
    ),
    tag = "auth"
)]
pub async fn session(headers: HeaderMap, state: Extension<Arc<AuthState>>) -> Response {
    let now = chrono::Utc::now().timestamp();
    match require_authentication(&headers, state.tokens(), now) {
        Ok(principal) => {
            let response = SessionResponse {
                subject: principal.claims.sub,
                groups: principal.claims.groups,
                expires_at: principal.claims.exp,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

/// Uniform mapping for both login steps: rejections share one message, only
/// transient outages are surfaced as retryable. Passwords and codes are never
/// part of any log line.
fn auth_failure(username: &str, operation: &'static str, err: &AuthFlowError) -> Response {
    match err {
        AuthFlowError::Directory(directory_err) if directory_err.is_transient() => {
            error!(username = %username, error = %directory_err, "{operation} unavailable");
            (StatusCode::BAD_GATEWAY, AUTH_UNAVAILABLE.to_string()).into_response()
        }
        AuthFlowError::Directory(DirectoryError::ChallengeVerificationFailed) => {
            warn!(username = %username, outcome = "challenge_failed", "{operation}");
            (StatusCode::UNAUTHORIZED, AUTH_FAILED.to_string()).into_response()
        }
        AuthFlowError::Directory(_) => {
            warn!(username = %username, outcome = "rejected", "{operation}");
            (StatusCode::UNAUTHORIZED, AUTH_FAILED.to_string()).into_response()
        }
        AuthFlowError::Token(token_err) => {
            error!(username = %username, error = %token_err, "{operation} token signing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to issue token".to_string(),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::testutil;
    use axum::http::{header::AUTHORIZATION, HeaderValue};

    #[tokio::test]
    async fn login_without_payload_is_bad_request() {
        let (state, _directory) = testutil::state().await;
        let response = login(Extension(state), None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn login_with_wrong_password_is_uniform_401() {
        let (state, directory) = testutil::state().await;
        directory
            .seed_user("alice", "alice@example.com", "hunter2", &["User"])
            .await;

        let response = login(
            Extension(state.clone()),
            Some(Json(LoginRequest {
                username: "alice".to_string(),
                password: "wrong".to_string(),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // Unknown user: identical status, identical body shape.
        let response = login(
            Extension(state),
            Some(Json(LoginRequest {
                username: "nobody".to_string(),
                password: "wrong".to_string(),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_success_returns_token() {
        let (state, directory) = testutil::state().await;
        directory
            .seed_user("admin", "admin@example.com", "admin123", &["Admin"])
            .await;

        let response = login(
            Extension(state),
            Some(Json(LoginRequest {
                username: "admin".to_string(),
                password: "admin123".to_string(),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn session_reports_decoded_claims() {
        let (state, directory) = testutil::state().await;
        directory
            .seed_user("admin", "admin@example.com", "admin123", &["Admin"])
            .await;

        let now = chrono::Utc::now().timestamp();
        let token = state
            .tokens()
            .issue("admin", vec!["Admin".to_string()], now)
            .expect("token issues");

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).expect("header value"),
        );
        let response = session(headers, Extension(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn session_without_token_is_unauthorized() {
        let (state, _directory) = testutil::state().await;
        let response = session(HeaderMap::new(), Extension(state)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn challenge_with_spent_session_is_uniform_401() {
        let (state, directory) = testutil::state().await;
        directory
            .seed_user("alice", "alice@example.com", "hunter2", &["User"])
            .await;

        let response = challenge(
            Extension(state),
            Some(Json(ChallengeRequest {
                username: "alice".to_string(),
                challenge: ChallengeKind::Totp,
                session: "no-such-session".to_string(),
                code: "123456".to_string(),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
