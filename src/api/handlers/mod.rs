pub mod auth;
pub mod groups;
pub mod health;
pub mod mfa;
pub mod state;
pub mod users;

pub use self::health::health;
pub use self::state::{AuthConfig, AuthState};

// common functions for the handlers
use axum::{http::HeaderMap, response::IntoResponse, response::Response};
use regex::Regex;

use crate::guard::{require_authentication, require_group, AuthenticatedPrincipal};

pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").map_or(false, |re| re.is_match(email))
}

pub fn valid_username(username: &str) -> bool {
    let length = username.len();
    if !(1..=64).contains(&length) {
        return false;
    }
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.@-]*$").map_or(false, |re| re.is_match(username))
}

/// Authentication plus an `Admin` membership check, for the administrative
/// endpoints. Returns the ready-to-send denial on failure.
pub(crate) async fn require_admin(
    headers: &HeaderMap,
    state: &AuthState,
) -> Result<AuthenticatedPrincipal, Response> {
    let now = chrono::Utc::now().timestamp();
    let principal = require_authentication(headers, state.tokens(), now)
        .map_err(IntoResponse::into_response)?;
    require_group(&principal, &["Admin"], state.groups(), state.catalog())
        .await
        .map_err(IntoResponse::into_response)?;
    Ok(principal)
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::http::{header::AUTHORIZATION, HeaderMap, HeaderValue};
    use secrecy::SecretString;

    use super::{AuthConfig, AuthState};
    use crate::directory::memory::InMemoryDirectory;
    use crate::groups::{DirectoryGroupStore, GroupCatalog};
    use crate::token::{TokenIssuer, DEFAULT_TOKEN_TTL_SECONDS};

    /// Handler state over a fresh in-memory directory (directory-backed
    /// group store, default vocabulary).
    pub(crate) async fn state() -> (Arc<AuthState>, Arc<InMemoryDirectory>) {
        let directory = Arc::new(InMemoryDirectory::new());
        let groups = Arc::new(DirectoryGroupStore::new(
            directory.clone(),
            Duration::from_secs(1),
        ));
        let tokens = Arc::new(TokenIssuer::new(
            SecretString::from("handler-test-secret".to_string()),
            DEFAULT_TOKEN_TTL_SECONDS,
        ));
        let catalog = GroupCatalog::new(["Admin", "User", "Moderator"]).expect("vocabulary");
        let state = Arc::new(AuthState::new(
            AuthConfig::new().with_call_timeout_seconds(1),
            directory.clone(),
            groups,
            tokens,
            catalog,
        ));
        (state, directory)
    }

    pub(crate) fn bearer_for(state: &AuthState, username: &str, groups: &[&str]) -> HeaderMap {
        let now = chrono::Utc::now().timestamp();
        let token = state
            .tokens()
            .issue(
                username,
                groups.iter().map(ToString::to_string).collect(),
                now,
            )
            .expect("token issues");
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).expect("header value"),
        );
        headers
    }

}
