//! Login challenge flow.
//!
//! Drives a login attempt through zero or more verification steps:
//!
//! ```text
//! INIT -> AWAITING_PRIMARY -> AUTHENTICATED
//!                          -> AWAITING_CHALLENGE -> AUTHENTICATED
//!                                                -> FAILED
//!                          -> FAILED
//! ```
//!
//! The flow itself is stateless across requests; the only multi-step state is
//! the provider-issued challenge session, which the directory custodies and
//! enforces as single-use. At every token-issuing point the authoritative
//! group set is re-fetched from the configured membership store and embedded
//! as a snapshot, so a principal whose membership changed mid-flow never
//! receives stale or absent privileges.

pub mod mfa;

use regex::Regex;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::directory::{
    bounded, ChallengeKind, CredentialDirectory, DirectoryError, PasswordVerification,
};
use crate::groups::GroupStore;
use crate::token::{self, TokenIssuer};

pub const DEFAULT_CALL_TIMEOUT_SECONDS: u64 = 5;

const OTP_CODE_SHAPE: &str = r"^[0-9]{6}$";

/// Terminal outcome of a login step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Fully verified; the session token carries the group snapshot.
    Authenticated { token: String },
    /// A second step is required before a token can be issued.
    ChallengeRequired {
        kind: ChallengeKind,
        session: String,
    },
}

#[derive(Debug, Error)]
pub enum AuthFlowError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error("failed to sign session token")]
    Token(#[from] token::Error),
}

impl AuthFlowError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Directory(err) if err.is_transient())
    }
}

/// Orchestrates primary and secondary verification against the directory and
/// mints session tokens on success. Holds no per-attempt state of its own.
pub struct Authenticator {
    directory: Arc<dyn CredentialDirectory>,
    groups: Arc<dyn GroupStore>,
    tokens: Arc<TokenIssuer>,
    call_timeout: Duration,
}

impl Authenticator {
    #[must_use]
    pub fn new(
        directory: Arc<dyn CredentialDirectory>,
        groups: Arc<dyn GroupStore>,
        tokens: Arc<TokenIssuer>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            groups,
            tokens,
            call_timeout,
        }
    }

    /// Primary verification. Empty inputs are rejected up front with the same
    /// uniform error as a wrong password.
    ///
    /// # Errors
    ///
    /// `InvalidCredentials` on rejection, `Unavailable` when the directory
    /// cannot be reached (retryable), `Token` if signing fails.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<AuthOutcome, AuthFlowError> {
        use secrecy::ExposeSecret;

        if username.is_empty() || password.expose_secret().is_empty() {
            return Err(DirectoryError::InvalidCredentials.into());
        }

        let verification = bounded(
            self.call_timeout,
            self.directory.verify_password(username, password),
        )
        .await?;

        match verification {
            PasswordVerification::Verified => {
                let token = self.issue_for(username).await?;
                Ok(AuthOutcome::Authenticated { token })
            }
            PasswordVerification::ChallengeRequired { kind, session } => {
                Ok(AuthOutcome::ChallengeRequired { kind, session })
            }
        }
    }

    /// Secondary verification against a previously issued challenge session.
    /// The response code must match the challenge kind's shape before the
    /// provider is consulted, so a malformed code does not spend the session.
    ///
    /// # Errors
    ///
    /// `ChallengeVerificationFailed` on rejection (the session is spent),
    /// `Unavailable` when the directory cannot be reached, `Token` if signing
    /// fails.
    pub async fn respond_to_challenge(
        &self,
        username: &str,
        kind: ChallengeKind,
        session: &str,
        code: &SecretString,
    ) -> Result<AuthOutcome, AuthFlowError> {
        if username.is_empty() || session.is_empty() {
            return Err(DirectoryError::ChallengeVerificationFailed.into());
        }
        if !code_matches_kind(kind, code) {
            return Err(DirectoryError::ChallengeVerificationFailed.into());
        }

        bounded(
            self.call_timeout,
            self.directory.respond_to_challenge(username, session, code),
        )
        .await?;

        let token = self.issue_for(username).await?;
        Ok(AuthOutcome::Authenticated { token })
    }

    /// Every token-issuing point goes through here: fetch the authoritative
    /// group set, then sign.
    async fn issue_for(&self, username: &str) -> Result<String, AuthFlowError> {
        let groups = bounded(self.call_timeout, self.groups.groups_for(username)).await?;
        let now = chrono::Utc::now().timestamp();
        Ok(self.tokens.issue(username, groups, now)?)
    }
}

fn code_matches_kind(kind: ChallengeKind, code: &SecretString) -> bool {
    use secrecy::ExposeSecret;

    let code = code.expose_secret();
    match kind {
        // The "code" for a forced reset is the new password.
        ChallengeKind::PasswordResetRequired => !code.is_empty(),
        ChallengeKind::SmsOtp | ChallengeKind::Totp => Regex::new(OTP_CODE_SHAPE)
            .is_ok_and(|shape| shape.is_match(code)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::memory::InMemoryDirectory;
    use crate::directory::{MfaStatus, SoftwareTokenEnrollment, UserRecord};
    use crate::groups::DirectoryGroupStore;
    use crate::token::DEFAULT_TOKEN_TTL_SECONDS;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use totp_rs::{Algorithm, Secret, TOTP};

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    fn issuer() -> Arc<TokenIssuer> {
        Arc::new(TokenIssuer::new(
            SecretString::from("flow-test-secret".to_string()),
            DEFAULT_TOKEN_TTL_SECONDS,
        ))
    }

    fn authenticator(directory: Arc<InMemoryDirectory>) -> Authenticator {
        let groups = Arc::new(DirectoryGroupStore::new(
            directory.clone(),
            Duration::from_secs(1),
        ));
        Authenticator::new(directory, groups, issuer(), Duration::from_secs(1))
    }

    fn current_code(secret_base32: &str) -> anyhow::Result<String> {
        let secret_bytes = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .map_err(|err| anyhow::anyhow!("{err:?}"))?;
        let totp = TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            secret_bytes,
            Some("gardi".to_string()),
            "test@example.com".to_string(),
        )
        .map_err(|err| anyhow::anyhow!("{err}"))?;
        Ok(totp.generate_current()?)
    }

    #[tokio::test]
    async fn empty_inputs_fail_uniformly() {
        let directory = Arc::new(InMemoryDirectory::new());
        let auth = authenticator(directory);

        let result = auth.authenticate("", &secret("password")).await;
        assert!(matches!(
            result,
            Err(AuthFlowError::Directory(DirectoryError::InvalidCredentials))
        ));
        let result = auth.authenticate("alice", &secret("")).await;
        assert!(matches!(
            result,
            Err(AuthFlowError::Directory(DirectoryError::InvalidCredentials))
        ));
    }

    #[tokio::test]
    async fn success_embeds_current_group_snapshot() -> anyhow::Result<()> {
        let directory = Arc::new(InMemoryDirectory::new());
        directory
            .seed_user("admin", "admin@example.com", "admin123", &["Admin"])
            .await;
        let auth = authenticator(directory);

        let outcome = auth.authenticate("admin", &secret("admin123")).await?;
        let AuthOutcome::Authenticated { token } = outcome else {
            anyhow::bail!("expected immediate success");
        };

        let claims = issuer().verify(&token, chrono::Utc::now().timestamp())?;
        assert_eq!(claims.sub, "admin");
        assert_eq!(claims.groups, vec!["Admin"]);
        Ok(())
    }

    #[tokio::test]
    async fn mfa_enabled_user_gets_challenge_not_token() -> anyhow::Result<()> {
        let directory = Arc::new(InMemoryDirectory::new());
        directory
            .seed_user("carol", "carol@example.com", "hunter2", &["User"])
            .await;
        let enrollment = directory.begin_software_token_association("carol").await?;
        let code = current_code(&enrollment.secret_base32)?;
        directory.verify_software_token("carol", &code).await?;

        let auth = authenticator(directory);
        let outcome = auth.authenticate("carol", &secret("hunter2")).await?;
        assert!(matches!(
            outcome,
            AuthOutcome::ChallengeRequired {
                kind: ChallengeKind::Totp,
                ..
            }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn challenge_completion_refetches_groups() -> anyhow::Result<()> {
        let directory = Arc::new(InMemoryDirectory::new());
        directory
            .seed_user("carol", "carol@example.com", "hunter2", &["User"])
            .await;
        let enrollment = directory.begin_software_token_association("carol").await?;
        let code = current_code(&enrollment.secret_base32)?;
        directory.verify_software_token("carol", &code).await?;

        let auth = authenticator(directory.clone());
        let outcome = auth.authenticate("carol", &secret("hunter2")).await?;
        let AuthOutcome::ChallengeRequired { kind, session } = outcome else {
            anyhow::bail!("expected a challenge");
        };

        // Membership changes while the challenge is outstanding; the token
        // must reflect the post-change, authoritative set.
        directory.add_user_to_group("carol", "Moderator").await?;

        let code = current_code(&enrollment.secret_base32)?;
        let outcome = auth
            .respond_to_challenge("carol", kind, &session, &secret(&code))
            .await?;
        let AuthOutcome::Authenticated { token } = outcome else {
            anyhow::bail!("expected success");
        };
        let claims = issuer().verify(&token, chrono::Utc::now().timestamp())?;
        assert_eq!(claims.groups, vec!["Moderator", "User"]);
        Ok(())
    }

    #[tokio::test]
    async fn wrong_six_digit_code_fails_verification() -> anyhow::Result<()> {
        let directory = Arc::new(InMemoryDirectory::new());
        directory
            .seed_user("carol", "carol@example.com", "hunter2", &[])
            .await;
        let enrollment = directory.begin_software_token_association("carol").await?;
        let code = current_code(&enrollment.secret_base32)?;
        directory.verify_software_token("carol", &code).await?;

        let auth = authenticator(directory);
        let outcome = auth.authenticate("carol", &secret("hunter2")).await?;
        let AuthOutcome::ChallengeRequired { kind, session } = outcome else {
            anyhow::bail!("expected a challenge");
        };

        let result = auth
            .respond_to_challenge("carol", kind, &session, &secret("000000"))
            .await;
        assert!(matches!(
            result,
            Err(AuthFlowError::Directory(
                DirectoryError::ChallengeVerificationFailed
            ))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn malformed_code_is_rejected_without_spending_the_session() -> anyhow::Result<()> {
        let directory = Arc::new(InMemoryDirectory::new());
        directory
            .seed_user("carol", "carol@example.com", "hunter2", &["User"])
            .await;
        let enrollment = directory.begin_software_token_association("carol").await?;
        let code = current_code(&enrollment.secret_base32)?;
        directory.verify_software_token("carol", &code).await?;

        let auth = authenticator(directory);
        let outcome = auth.authenticate("carol", &secret("hunter2")).await?;
        let AuthOutcome::ChallengeRequired { kind, session } = outcome else {
            anyhow::bail!("expected a challenge");
        };

        // Shape check fails locally; the provider never sees the session.
        let result = auth
            .respond_to_challenge("carol", kind, &session, &secret("12345"))
            .await;
        assert!(matches!(
            result,
            Err(AuthFlowError::Directory(
                DirectoryError::ChallengeVerificationFailed
            ))
        ));

        // The session is still alive for a well-formed retry.
        let code = current_code(&enrollment.secret_base32)?;
        let outcome = auth
            .respond_to_challenge("carol", kind, &session, &secret(&code))
            .await?;
        assert!(matches!(outcome, AuthOutcome::Authenticated { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn password_reset_challenge_issues_token_after_reset() -> anyhow::Result<()> {
        let directory = Arc::new(InMemoryDirectory::new());
        directory
            .create_user("bob", "bob@example.com", secret("temp-pass"), HashMap::new())
            .await?;
        directory.add_user_to_group("bob", "User").await?;

        let auth = authenticator(directory);
        let outcome = auth.authenticate("bob", &secret("temp-pass")).await?;
        let AuthOutcome::ChallengeRequired { kind, session } = outcome else {
            anyhow::bail!("expected a challenge");
        };
        assert_eq!(kind, ChallengeKind::PasswordResetRequired);

        let outcome = auth
            .respond_to_challenge("bob", kind, &session, &secret("a-new-password"))
            .await?;
        let AuthOutcome::Authenticated { token } = outcome else {
            anyhow::bail!("expected success");
        };
        let claims = issuer().verify(&token, chrono::Utc::now().timestamp())?;
        assert_eq!(claims.sub, "bob");
        assert_eq!(claims.groups, vec!["User"]);
        Ok(())
    }

    /// Directory stub whose every call reports the provider as unreachable.
    struct UnavailableDirectory;

    #[async_trait]
    impl CredentialDirectory for UnavailableDirectory {
        async fn create_user(
            &self,
            _username: &str,
            _email: &str,
            _temp_password: SecretString,
            _attributes: HashMap<String, String>,
        ) -> Result<UserRecord, DirectoryError> {
            Err(unavailable())
        }

        async fn verify_password(
            &self,
            _username: &str,
            _password: &SecretString,
        ) -> Result<PasswordVerification, DirectoryError> {
            Err(unavailable())
        }

        async fn respond_to_challenge(
            &self,
            _username: &str,
            _session: &str,
            _code: &SecretString,
        ) -> Result<(), DirectoryError> {
            Err(unavailable())
        }

        async fn get_user(&self, _username: &str) -> Result<UserRecord, DirectoryError> {
            Err(unavailable())
        }

        async fn update_user_attributes(
            &self,
            _username: &str,
            _attributes: HashMap<String, String>,
        ) -> Result<(), DirectoryError> {
            Err(unavailable())
        }

        async fn groups_for_user(&self, _username: &str) -> Result<Vec<String>, DirectoryError> {
            Err(unavailable())
        }

        async fn add_user_to_group(
            &self,
            _username: &str,
            _group: &str,
        ) -> Result<(), DirectoryError> {
            Err(unavailable())
        }

        async fn remove_user_from_group(
            &self,
            _username: &str,
            _group: &str,
        ) -> Result<(), DirectoryError> {
            Err(unavailable())
        }

        async fn begin_software_token_association(
            &self,
            _username: &str,
        ) -> Result<SoftwareTokenEnrollment, DirectoryError> {
            Err(unavailable())
        }

        async fn verify_software_token(
            &self,
            _username: &str,
            _code: &str,
        ) -> Result<(), DirectoryError> {
            Err(unavailable())
        }

        async fn disable_software_token(
            &self,
            _username: &str,
            _code: &str,
        ) -> Result<(), DirectoryError> {
            Err(unavailable())
        }

        async fn mfa_status(&self, _username: &str) -> Result<MfaStatus, DirectoryError> {
            Err(unavailable())
        }
    }

    fn unavailable() -> DirectoryError {
        DirectoryError::Unavailable("provider offline".to_string())
    }

    #[tokio::test]
    async fn provider_outage_surfaces_as_retryable() {
        let directory = Arc::new(UnavailableDirectory);
        let groups = Arc::new(DirectoryGroupStore::new(
            directory.clone(),
            Duration::from_secs(1),
        ));
        let auth = Authenticator::new(directory, groups, issuer(), Duration::from_secs(1));

        let result = auth.authenticate("alice", &secret("hunter2")).await;
        match result {
            Err(err) => assert!(err.is_transient()),
            Ok(_) => panic!("outage must not become a login success"),
        }
    }
}
