//! Administrative user creation against the credential directory.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use super::{require_admin, state::AuthState, valid_email, valid_username};
use crate::directory::{bounded, DirectoryError, UserRecord};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub temporary_password: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

#[utoipa::path(
    post,
    path = "/v1/admin/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created, pending first login", body = UserRecord),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Missing or invalid token", body = String),
        (status = 403, description = "Caller is not an Admin"),
        (status = 409, description = "Username already exists", body = String),
        (status = 502, description = "Directory unavailable", body = String)
    ),
    tag = "users"
)]
pub async fn create(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<CreateUserRequest>>,
) -> Response {
    let admin = match require_admin(&headers, &state).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    if !valid_username(&request.username) {
        return (StatusCode::BAD_REQUEST, "Invalid username".to_string()).into_response();
    }
    if !valid_email(&request.email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }
    if request.temporary_password.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing password".to_string()).into_response();
    }

    let temp_password = SecretString::from(request.temporary_password);
    let result = bounded(
        state.config().call_timeout(),
        state.directory().create_user(
            &request.username,
            &request.email,
            temp_password,
            request.attributes,
        ),
    )
    .await;

    match result {
        Ok(record) => {
            info!(
                admin = %admin.subject(),
                username = %record.username,
                "user created"
            );
            (StatusCode::CREATED, Json(record)).into_response()
        }
        Err(DirectoryError::DuplicateUsername) => {
            warn!(username = %request.username, outcome = "duplicate", "create user");
            (
                StatusCode::CONFLICT,
                "Username already exists".to_string(),
            )
                .into_response()
        }
        Err(err) if err.is_transient() => {
            error!(username = %request.username, error = %err, "create user unavailable");
            (
                StatusCode::BAD_GATEWAY,
                "Directory unavailable, retry later".to_string(),
            )
                .into_response()
        }
        Err(err) => {
            error!(username = %request.username, error = %err, "create user failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/admin/users/{username}",
    params(("username" = String, Path, description = "Principal to fetch")),
    responses(
        (status = 200, description = "Directory record", body = UserRecord),
        (status = 401, description = "Missing or invalid token", body = String),
        (status = 403, description = "Caller is not an Admin"),
        (status = 404, description = "User not found", body = String),
        (status = 502, description = "Directory unavailable", body = String)
    ),
    tag = "users"
)]
pub async fn get(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    Path(username): Path<String>,
) -> Response {
    if let Err(response) = require_admin(&headers, &state).await {
        return response;
    }

    let result = bounded(
        state.config().call_timeout(),
        state.directory().get_user(&username),
    )
    .await;

    match result {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(DirectoryError::NotFound) => {
            (StatusCode::NOT_FOUND, "User not found".to_string()).into_response()
        }
        Err(err) if err.is_transient() => {
            error!(username = %username, error = %err, "get user unavailable");
            (
                StatusCode::BAD_GATEWAY,
                "Directory unavailable, retry later".to_string(),
            )
                .into_response()
        }
        Err(err) => {
            error!(username = %username, error = %err, "get user failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
