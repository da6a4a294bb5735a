//! OpenAPI document assembly for the HTTP surface.

use utoipa::OpenApi;

use super::handlers::{auth, groups, health, mfa, users};
use crate::directory::{ChallengeKind, MfaStatus, UserRecord, UserStatus};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "gardi",
        description = "Stateless multi-factor authentication and group authorization core"
    ),
    paths(
        health::health,
        auth::login,
        auth::challenge,
        auth::session,
        mfa::enroll_start,
        mfa::enroll_finish,
        mfa::disable,
        users::create,
        users::get,
        groups::list,
        groups::add,
        groups::remove,
    ),
    components(schemas(
        auth::LoginRequest,
        auth::ChallengeRequest,
        auth::LoginResponse,
        auth::SessionResponse,
        mfa::MfaCodeRequest,
        mfa::MfaEnrollStartResponse,
        users::CreateUserRequest,
        groups::GroupListResponse,
        ChallengeKind,
        MfaStatus,
        UserRecord,
        UserStatus,
    )),
    tags(
        (name = "auth", description = "Login and challenge flow"),
        (name = "mfa", description = "MFA enrollment"),
        (name = "users", description = "Administrative user management"),
        (name = "groups", description = "Administrative group membership"),
        (name = "health", description = "Service probes")
    )
)]
struct ApiDoc;

/// The assembled OpenAPI document.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = openapi();
        let paths = &doc.paths.paths;
        for path in [
            "/health",
            "/v1/auth/login",
            "/v1/auth/challenge",
            "/v1/auth/session",
            "/v1/auth/mfa/enroll/start",
            "/v1/auth/mfa/enroll/finish",
            "/v1/auth/mfa/disable",
            "/v1/admin/users",
            "/v1/admin/users/{username}",
            "/v1/admin/users/{username}/groups",
            "/v1/admin/users/{username}/groups/{group}",
        ] {
            assert!(paths.contains_key(path), "missing path {path}");
        }
    }
}
