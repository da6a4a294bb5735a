//! MFA enrollment endpoints. All of them act on the authenticated caller;
//! the one-time code is never logged.

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
use crate::directory::DirectoryError;
use crate::flow::mfa::EnrollmentStart;
use crate::guard::{require_authentication, AuthenticatedPrincipal, GuardError};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MfaCodeRequest {
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MfaEnrollStartResponse {
    /// Enrollment already completed; nothing was restarted.
    Enabled,
    /// Fresh provisioning material. Shown exactly once.
    PendingVerification {
        secret: String,
        provisioning_uri: String,
    },
}

fn authenticated(
    headers: &HeaderMap,
    state: &AuthState,
) -> Result<AuthenticatedPrincipal, GuardError> {
    let now = chrono::Utc::now().timestamp();
    require_authentication(headers, state.tokens(), now)
}

#[utoipa::path(
    post,
    path = "/v1/auth/mfa/enroll/start",
    responses(
        (status = 200, description = "Enrollment state", body = MfaEnrollStartResponse),
        (status = 401, description = "Missing or invalid token", body = String),
        (status = 502, description = "Directory unavailable", body = String)
    ),
    tag = "mfa"
)]
pub async fn enroll_start(headers: HeaderMap, state: Extension<Arc<AuthState>>) -> Response {
    let principal = match authenticated(&headers, &state) {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    match state.mfa().begin_enrollment(principal.subject()).await {
        Ok(EnrollmentStart::AlreadyEnabled) => {
            info!(username = %principal.subject(), outcome = "already_enabled", "mfa enroll");
            (StatusCode::OK, Json(MfaEnrollStartResponse::Enabled)).into_response()
        }
        Ok(EnrollmentStart::Started {
            secret_base32,
            provisioning_uri,
        }) => {
            info!(username = %principal.subject(), outcome = "pending", "mfa enroll");
            (
                StatusCode::OK,
                Json(MfaEnrollStartResponse::PendingVerification {
                    secret: secret_base32,
                    provisioning_uri,
                }),
            )
                .into_response()
        }
        Err(err) => mfa_failure(principal.subject(), "mfa enroll", &err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/mfa/enroll/finish",
    request_body = MfaCodeRequest,
    responses(
        (status = 204, description = "Enrollment confirmed"),
        (status = 400, description = "Code mismatch", body = String),
        (status = 401, description = "Missing or invalid token", body = String),
        (status = 502, description = "Directory unavailable", body = String)
    ),
    tag = "mfa"
)]
pub async fn enroll_finish(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<MfaCodeRequest>>,
) -> Response {
    let principal = match authenticated(&headers, &state) {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    let code = SecretString::from(request.code);
    match state
        .mfa()
        .confirm_enrollment(principal.subject(), &code)
        .await
    {
        Ok(()) => {
            info!(username = %principal.subject(), outcome = "enabled", "mfa enroll");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => mfa_failure(principal.subject(), "mfa enroll", &err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/mfa/disable",
    request_body = MfaCodeRequest,
    responses(
        (status = 204, description = "MFA disabled"),
        (status = 400, description = "Code mismatch", body = String),
        (status = 401, description = "Missing or invalid token", body = String),
        (status = 502, description = "Directory unavailable", body = String)
    ),
    tag = "mfa"
)]
pub async fn disable(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<MfaCodeRequest>>,
) -> Response {
    let principal = match authenticated(&headers, &state) {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    let code = SecretString::from(request.code);
    match state.mfa().disable(principal.subject(), &code).await {
        Ok(()) => {
            info!(username = %principal.subject(), outcome = "disabled", "mfa");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => mfa_failure(principal.subject(), "mfa disable", &err),
    }
}

fn mfa_failure(username: &str, operation: &'static str, err: &DirectoryError) -> Response {
    match err {
        DirectoryError::CodeMismatch => {
            warn!(username = %username, outcome = "code_mismatch", "{operation}");
            (StatusCode::BAD_REQUEST, "Invalid code".to_string()).into_response()
        }
        DirectoryError::NotFound => {
            warn!(username = %username, outcome = "not_found", "{operation}");
            (StatusCode::NOT_FOUND, "User not found".to_string()).into_response()
        }
        err if err.is_transient() => {
            error!(username = %username, error = %err, "{operation} unavailable");
            (
                StatusCode::BAD_GATEWAY,
                "Directory unavailable, retry later".to_string(),
            )
                .into_response()
        }
        err => {
            error!(username = %username, error = %err, "{operation} failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
