//! Request guards: token verification and group-based authorization.
//!
//! `require_authentication` is a precondition gate, not a capability check;
//! `require_group` runs after it and consults the configured membership store
//! for the caller's current groups. Denials disclose the required set and the
//! caller's own groups, never another principal's.

use axum::{
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::directory::DirectoryError;
use crate::groups::{GroupCatalog, GroupStore};
use crate::token::{self, SessionClaims, TokenIssuer};

/// Verified caller identity attached to a request after
/// [`require_authentication`] succeeds.
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal {
    pub claims: SessionClaims,
}

impl AuthenticatedPrincipal {
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.claims.sub
    }
}

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid token")]
    InvalidToken(#[source] token::Error),
    #[error("token subject missing")]
    MissingSubject,
    #[error("insufficient privileges")]
    InsufficientPrivileges {
        required: Vec<String>,
        actual: Vec<String>,
    },
    /// A handler asked for a group outside the configured vocabulary; this is
    /// a deployment bug, not a caller error.
    #[error("group not in configured vocabulary: {0}")]
    UnknownGroup(String),
    #[error("group membership lookup unavailable")]
    Unavailable(#[source] DirectoryError),
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        match self {
            Self::MissingToken | Self::InvalidToken(_) | Self::MissingSubject => {
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()).into_response()
            }
            Self::InsufficientPrivileges { required, actual } => (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "error": "insufficient privileges",
                    "required": required,
                    "groups": actual,
                })),
            )
                .into_response(),
            Self::UnknownGroup(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            Self::Unavailable(_) => (
                StatusCode::BAD_GATEWAY,
                "Authorization service unavailable".to_string(),
            )
                .into_response(),
        }
    }
}

/// Extract the bearer token from an `Authorization` header.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Resolve the bearer token into a verified principal.
///
/// # Errors
///
/// `MissingToken` when no bearer token is present, `MissingSubject` when the
/// claims lack a subject, `InvalidToken` for every other verification
/// failure.
pub fn require_authentication(
    headers: &HeaderMap,
    tokens: &TokenIssuer,
    now_unix_seconds: i64,
) -> Result<AuthenticatedPrincipal, GuardError> {
    let Some(token) = bearer_token(headers) else {
        return Err(GuardError::MissingToken);
    };

    match tokens.verify(&token, now_unix_seconds) {
        Ok(claims) => Ok(AuthenticatedPrincipal { claims }),
        Err(token::Error::MissingSubject) => Err(GuardError::MissingSubject),
        Err(err) => Err(GuardError::InvalidToken(err)),
    }
}

/// Allow the request if the caller currently holds any of `required`
/// (logical OR, first match wins). Must run after [`require_authentication`].
///
/// # Errors
///
/// `UnknownGroup` if a required group is outside the catalog,
/// `InsufficientPrivileges` (with the caller's actual groups) on denial,
/// `Unavailable` when the membership store cannot answer.
pub async fn require_group(
    principal: &AuthenticatedPrincipal,
    required: &[&str],
    store: &dyn GroupStore,
    catalog: &GroupCatalog,
) -> Result<(), GuardError> {
    for group in required {
        if !catalog.contains(group) {
            return Err(GuardError::UnknownGroup((*group).to_string()));
        }
    }

    let actual = store
        .groups_for(principal.subject())
        .await
        .map_err(map_store_error)?;

    if required.iter().any(|group| actual.iter().any(|held| held == group)) {
        return Ok(());
    }

    Err(GuardError::InsufficientPrivileges {
        required: required.iter().map(ToString::to_string).collect(),
        actual,
    })
}

fn map_store_error(err: DirectoryError) -> GuardError {
    match err {
        // An unknown principal holds no groups; that is a denial, not an
        // outage, and it must not leak directory contents.
        DirectoryError::NotFound => GuardError::InsufficientPrivileges {
            required: Vec::new(),
            actual: Vec::new(),
        },
        other => GuardError::Unavailable(other),
    }
}
