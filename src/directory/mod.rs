//! Credential directory adapter: the contract this core requires from the
//! external identity provider (user records, password verification, login
//! challenges, MFA secret custody, group membership).
//!
//! The directory is the authority for single-use enforcement of challenge
//! sessions and for retry limits on one-time codes. Every implementation must
//! keep business-rule rejections (`InvalidCredentials`, `CodeMismatch`, ...)
//! distinguishable from transient provider failures (`Unavailable`); the two
//! are never conflated by callers.

pub mod memory;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

/// Secondary verification step required before a login is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ChallengeKind {
    PasswordResetRequired,
    SmsOtp,
    Totp,
}

impl ChallengeKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PasswordResetRequired => "password-reset-required",
            Self::SmsOtp => "sms-otp",
            Self::Totp => "totp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Unconfirmed,
    Active,
    Disabled,
}

/// Per-principal MFA enrollment state, custodied by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MfaStatus {
    Disabled,
    PendingVerification,
    Enabled,
}

/// Identity record as the directory reports it. Known fields are typed; the
/// open key/value bag the provider allows lives in `attributes`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserRecord {
    pub username: String,
    pub email: String,
    pub status: UserStatus,
    pub mfa: MfaStatus,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// Outcome of a primary (password) verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordVerification {
    Verified,
    /// The provider requires a second step; `session` is its opaque,
    /// unguessable, single-use session token.
    ChallengeRequired {
        kind: ChallengeKind,
        session: String,
    },
}

/// Provisioning material returned when a software token association begins.
/// The secret itself stays with the provider; clients only ever see the
/// base32 form and the otpauth URI, once.
#[derive(Debug, Clone)]
pub struct SoftwareTokenEnrollment {
    pub secret_base32: String,
    pub provisioning_uri: String,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Uniform rejection: deliberately does not distinguish an unknown user
    /// from a wrong password.
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("challenge verification failed")]
    ChallengeVerificationFailed,
    #[error("duplicate username")]
    DuplicateUsername,
    #[error("user not found")]
    NotFound,
    #[error("code mismatch")]
    CodeMismatch,
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

impl DirectoryError {
    /// Transient failures are retryable by the caller; everything else is
    /// terminal for the attempt.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Contract with the external identity provider.
///
/// All methods are expected to return promptly; callers bound every
/// invocation with [`bounded`] so a stalled provider surfaces as
/// [`DirectoryError::Unavailable`] instead of hanging a request.
#[async_trait]
pub trait CredentialDirectory: Send + Sync {
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        temp_password: SecretString,
        attributes: HashMap<String, String>,
    ) -> Result<UserRecord, DirectoryError>;

    async fn verify_password(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<PasswordVerification, DirectoryError>;

    /// Consume a challenge session. The session is spent whether or not the
    /// code matches; replays fail with `ChallengeVerificationFailed`.
    async fn respond_to_challenge(
        &self,
        username: &str,
        session: &str,
        code: &SecretString,
    ) -> Result<(), DirectoryError>;

    async fn get_user(&self, username: &str) -> Result<UserRecord, DirectoryError>;

    async fn update_user_attributes(
        &self,
        username: &str,
        attributes: HashMap<String, String>,
    ) -> Result<(), DirectoryError>;

    async fn groups_for_user(&self, username: &str) -> Result<Vec<String>, DirectoryError>;

    /// Idempotent: adding a held group is a no-op success.
    async fn add_user_to_group(&self, username: &str, group: &str)
        -> Result<(), DirectoryError>;

    /// Idempotent: removing a group not held is a no-op success.
    async fn remove_user_from_group(
        &self,
        username: &str,
        group: &str,
    ) -> Result<(), DirectoryError>;

    async fn begin_software_token_association(
        &self,
        username: &str,
    ) -> Result<SoftwareTokenEnrollment, DirectoryError>;

    async fn verify_software_token(
        &self,
        username: &str,
        code: &str,
    ) -> Result<(), DirectoryError>;

    async fn disable_software_token(
        &self,
        username: &str,
        code: &str,
    ) -> Result<(), DirectoryError>;

    async fn mfa_status(&self, username: &str) -> Result<MfaStatus, DirectoryError>;
}

/// Bound a directory call so a stalled provider cannot hang the request.
///
/// # Errors
///
/// Returns `Unavailable` when the limit elapses, otherwise the call's own
/// result.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, DirectoryError>
where
    F: Future<Output = Result<T, DirectoryError>> + Send,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(DirectoryError::Unavailable(
            "directory call timed out".to_string(),
        )),
    }
}
