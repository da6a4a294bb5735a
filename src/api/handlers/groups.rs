//! Administrative group membership endpoints, gated on the `Admin` group.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use super::{require_admin, state::AuthState};
use crate::directory::DirectoryError;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct GroupListResponse {
    pub username: String,
    pub groups: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/v1/admin/users/{username}/groups",
    params(("username" = String, Path, description = "Principal to inspect")),
    responses(
        (status = 200, description = "Current group memberships", body = GroupListResponse),
        (status = 401, description = "Missing or invalid token", body = String),
        (status = 403, description = "Caller is not an Admin"),
        (status = 404, description = "User not found", body = String),
        (status = 502, description = "Membership store unavailable", body = String)
    ),
    tag = "groups"
)]
pub async fn list(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    Path(username): Path<String>,
) -> Response {
    if let Err(response) = require_admin(&headers, &state).await {
        return response;
    }

    match state.groups().groups_for(&username).await {
        Ok(groups) => (
            StatusCode::OK,
            Json(GroupListResponse { username, groups }),
        )
            .into_response(),
        Err(err) => membership_failure(&username, "list groups", &err),
    }
}

#[utoipa::path(
    put,
    path = "/v1/admin/users/{username}/groups/{group}",
    params(
        ("username" = String, Path, description = "Principal to change"),
        ("group" = String, Path, description = "Group from the configured vocabulary")
    ),
    responses(
        (status = 204, description = "Membership present (idempotent)"),
        (status = 400, description = "Group not in the vocabulary", body = String),
        (status = 401, description = "Missing or invalid token", body = String),
        (status = 403, description = "Caller is not an Admin"),
        (status = 404, description = "User not found", body = String),
        (status = 502, description = "Membership store unavailable", body = String)
    ),
    tag = "groups"
)]
pub async fn add(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    Path((username, group)): Path<(String, String)>,
) -> Response {
    let admin = match require_admin(&headers, &state).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    if !state.catalog().contains(&group) {
        return (StatusCode::BAD_REQUEST, "Unknown group".to_string()).into_response();
    }

    match state.groups().add_to_group(&username, &group).await {
        Ok(()) => {
            info!(
                admin = %admin.subject(),
                username = %username,
                group = %group,
                "group added"
            );
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => membership_failure(&username, "add group", &err),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/admin/users/{username}/groups/{group}",
    params(
        ("username" = String, Path, description = "Principal to change"),
        ("group" = String, Path, description = "Group from the configured vocabulary")
    ),
    responses(
        (status = 204, description = "Membership absent (idempotent)"),
        (status = 400, description = "Group not in the vocabulary", body = String),
        (status = 401, description = "Missing or invalid token", body = String),
        (status = 403, description = "Caller is not an Admin"),
        (status = 404, description = "User not found", body = String),
        (status = 502, description = "Membership store unavailable", body = String)
    ),
    tag = "groups"
)]
pub async fn remove(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    Path((username, group)): Path<(String, String)>,
) -> Response {
    let admin = match require_admin(&headers, &state).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    if !state.catalog().contains(&group) {
        return (StatusCode::BAD_REQUEST, "Unknown group".to_string()).into_response();
    }

    match state.groups().remove_from_group(&username, &group).await {
        Ok(()) => {
            info!(
                admin = %admin.subject(),
                username = %username,
                group = %group,
                "group removed"
            );
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => membership_failure(&username, "remove group", &err),
    }
}

fn membership_failure(username: &str, operation: &'static str, err: &DirectoryError) -> Response {
    match err {
        DirectoryError::NotFound => {
            warn!(username = %username, outcome = "not_found", "{operation}");
            (StatusCode::NOT_FOUND, "User not found".to_string()).into_response()
        }
        err if err.is_transient() => {
            error!(username = %username, error = %err, "{operation} unavailable");
            (
                StatusCode::BAD_GATEWAY,
                "Membership store unavailable, retry later".to_string(),
            )
                .into_response()
        }
        err => {
            error!(username = %username, error = %err, "{operation} failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::testutil;

    #[tokio::test]
    async fn group_changes_require_admin() {
        let (state, directory) = testutil::state().await;
        directory
            .seed_user("alice", "alice@example.com", "hunter2", &["User"])
            .await;
        let headers = testutil::bearer_for(&state, "alice", &["User"]);

        let response = add(
            headers,
            Extension(state),
            Path(("alice".to_string(), "Admin".to_string())),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admin_can_manage_groups() {
        let (state, directory) = testutil::state().await;
        directory
            .seed_user("root", "root@example.com", "hunter2", &["Admin"])
            .await;
        directory
            .seed_user("alice", "alice@example.com", "hunter2", &[])
            .await;
        let headers = testutil::bearer_for(&state, "root", &["Admin"]);

        let response = add(
            headers.clone(),
            Extension(state.clone()),
            Path(("alice".to_string(), "User".to_string())),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = list(
            headers.clone(),
            Extension(state.clone()),
            Path("alice".to_string()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = remove(
            headers,
            Extension(state),
            Path(("alice".to_string(), "User".to_string())),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn group_outside_vocabulary_is_rejected() {
        let (state, directory) = testutil::state().await;
        directory
            .seed_user("root", "root@example.com", "hunter2", &["Admin"])
            .await;
        let headers = testutil::bearer_for(&state, "root", &["Admin"]);

        let response = add(
            headers,
            Extension(state),
            Path(("root".to_string(), "Root".to_string())),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
