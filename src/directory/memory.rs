//! In-process credential directory.
//!
//! Serves two roles: the fallback provider for deployments without an
//! external directory, and the provider used by the test suite. Challenge
//! sessions are held in a TTL-pruned table with take-once semantics, so a
//! session token is spent on its first matching response and a replay fails.

use async_trait::async_trait;
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, Rng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use totp_rs::{Algorithm, Secret, TOTP};

use super::{
    ChallengeKind, CredentialDirectory, DirectoryError, MfaStatus, PasswordVerification,
    SoftwareTokenEnrollment, UserRecord, UserStatus,
};

const DEFAULT_CHALLENGE_TTL_SECONDS: u64 = 5 * 60;
const DEFAULT_ISSUER: &str = "gardi";

/// Attribute consulted to pick the second factor for an MFA-enabled user.
/// Any value other than `"sms"` selects the authenticator app.
pub const PREFERRED_FACTOR_ATTRIBUTE: &str = "preferred_mfa";

struct UserEntry {
    record: UserRecord,
    password_digest: Vec<u8>,
    totp_secret: Option<Vec<u8>>,
    pending_totp_secret: Option<Vec<u8>>,
    groups: BTreeSet<String>,
}

struct PendingChallenge {
    username: String,
    kind: ChallengeKind,
    created_at: Instant,
    sms_code: Option<String>,
}

struct Inner {
    users: HashMap<String, UserEntry>,
    sessions: HashMap<String, PendingChallenge>,
}

pub struct InMemoryDirectory {
    inner: Mutex<Inner>,
    challenge_ttl: Duration,
    issuer: String,
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                users: HashMap::new(),
                sessions: HashMap::new(),
            }),
            challenge_ttl: Duration::from_secs(DEFAULT_CHALLENGE_TTL_SECONDS),
            issuer: DEFAULT_ISSUER.to_string(),
        }
    }

    #[must_use]
    pub fn with_challenge_ttl(mut self, ttl: Duration) -> Self {
        self.challenge_ttl = ttl;
        self
    }

    /// Issuer label embedded in provisioning URIs.
    #[must_use]
    pub fn with_issuer(mut self, issuer: String) -> Self {
        self.issuer = issuer;
        self
    }

    /// Seed an already-confirmed user with a password and group memberships.
    pub async fn seed_user(&self, username: &str, email: &str, password: &str, groups: &[&str]) {
        let mut inner = self.inner.lock().await;
        inner.users.insert(
            username.to_string(),
            UserEntry {
                record: UserRecord {
                    username: username.to_string(),
                    email: email.to_string(),
                    status: UserStatus::Active,
                    mfa: MfaStatus::Disabled,
                    attributes: HashMap::new(),
                },
                password_digest: password_digest(password),
                totp_secret: None,
                pending_totp_secret: None,
                groups: groups.iter().map(ToString::to_string).collect(),
            },
        );
    }

    /// Test hook: the one-time code an SMS challenge session is waiting for.
    pub async fn sms_code_for_session(&self, session: &str) -> Option<String> {
        let inner = self.inner.lock().await;
        inner
            .sessions
            .get(session)
            .and_then(|pending| pending.sms_code.clone())
    }

    fn totp_for(&self, secret: Vec<u8>, account: &str) -> Result<TOTP, DirectoryError> {
        TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            secret,
            Some(self.issuer.clone()),
            account.to_string(),
        )
        .map_err(|err| DirectoryError::Unavailable(format!("totp init failed: {err}")))
    }

    fn mint_session(
        &self,
        inner: &mut Inner,
        username: &str,
        kind: ChallengeKind,
        sms_code: Option<String>,
    ) -> String {
        // Opportunistic pruning keeps the table bounded without a sweeper task.
        inner
            .sessions
            .retain(|_, pending| pending.created_at.elapsed() < self.challenge_ttl);

        let session = generate_session_token();
        inner.sessions.insert(
            session.clone(),
            PendingChallenge {
                username: username.to_string(),
                kind,
                created_at: Instant::now(),
                sms_code,
            },
        );
        session
    }
}

#[async_trait]
impl CredentialDirectory for InMemoryDirectory {
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        temp_password: SecretString,
        attributes: HashMap<String, String>,
    ) -> Result<UserRecord, DirectoryError> {
        let mut inner = self.inner.lock().await;
        if inner.users.contains_key(username) {
            return Err(DirectoryError::DuplicateUsername);
        }

        let record = UserRecord {
            username: username.to_string(),
            email: email.to_string(),
            status: UserStatus::Unconfirmed,
            mfa: MfaStatus::Disabled,
            attributes,
        };
        inner.users.insert(
            username.to_string(),
            UserEntry {
                record: record.clone(),
                password_digest: password_digest(temp_password.expose_secret()),
                totp_secret: None,
                pending_totp_secret: None,
                groups: BTreeSet::new(),
            },
        );
        Ok(record)
    }

    async fn verify_password(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<PasswordVerification, DirectoryError> {
        let mut inner = self.inner.lock().await;

        // Unknown user, wrong password, and disabled account all collapse to
        // the same rejection so callers cannot probe for usernames.
        let Some(entry) = inner.users.get(username) else {
            return Err(DirectoryError::InvalidCredentials);
        };
        if entry.password_digest != password_digest(password.expose_secret()) {
            return Err(DirectoryError::InvalidCredentials);
        }

        match entry.record.status {
            UserStatus::Disabled => Err(DirectoryError::InvalidCredentials),
            UserStatus::Unconfirmed => {
                let session = self.mint_session(
                    &mut inner,
                    username,
                    ChallengeKind::PasswordResetRequired,
                    None,
                );
                Ok(PasswordVerification::ChallengeRequired {
                    kind: ChallengeKind::PasswordResetRequired,
                    session,
                })
            }
            UserStatus::Active => {
                if entry.record.mfa != MfaStatus::Enabled {
                    return Ok(PasswordVerification::Verified);
                }
                let prefers_sms = entry
                    .record
                    .attributes
                    .get(PREFERRED_FACTOR_ATTRIBUTE)
                    .is_some_and(|value| value == "sms");
                let (kind, sms_code) = if prefers_sms {
                    (ChallengeKind::SmsOtp, Some(generate_sms_code()))
                } else {
                    (ChallengeKind::Totp, None)
                };
                let session = self.mint_session(&mut inner, username, kind, sms_code);
                Ok(PasswordVerification::ChallengeRequired { kind, session })
            }
        }
    }

    async fn respond_to_challenge(
        &self,
        username: &str,
        session: &str,
        code: &SecretString,
    ) -> Result<(), DirectoryError> {
        let mut inner = self.inner.lock().await;
        inner
            .sessions
            .retain(|_, pending| pending.created_at.elapsed() < self.challenge_ttl);

        // Take-once: the session is spent regardless of the outcome below.
        let Some(pending) = inner.sessions.remove(session) else {
            return Err(DirectoryError::ChallengeVerificationFailed);
        };
        if pending.username != username {
            return Err(DirectoryError::ChallengeVerificationFailed);
        }

        match pending.kind {
            ChallengeKind::PasswordResetRequired => {
                let new_password = code.expose_secret();
                if new_password.is_empty() {
                    return Err(DirectoryError::ChallengeVerificationFailed);
                }
                let Some(entry) = inner.users.get_mut(username) else {
                    return Err(DirectoryError::ChallengeVerificationFailed);
                };
                entry.password_digest = password_digest(new_password);
                entry.record.status = UserStatus::Active;
                Ok(())
            }
            ChallengeKind::SmsOtp => {
                let expected = pending
                    .sms_code
                    .ok_or(DirectoryError::ChallengeVerificationFailed)?;
                if expected == code.expose_secret() {
                    Ok(())
                } else {
                    Err(DirectoryError::ChallengeVerificationFailed)
                }
            }
            ChallengeKind::Totp => {
                let Some(entry) = inner.users.get(username) else {
                    return Err(DirectoryError::ChallengeVerificationFailed);
                };
                let Some(secret) = entry.totp_secret.clone() else {
                    return Err(DirectoryError::ChallengeVerificationFailed);
                };
                let totp = self.totp_for(secret, &entry.record.email)?;
                if totp.check_current(code.expose_secret()).unwrap_or(false) {
                    Ok(())
                } else {
                    Err(DirectoryError::ChallengeVerificationFailed)
                }
            }
        }
    }

    async fn get_user(&self, username: &str) -> Result<UserRecord, DirectoryError> {
        let inner = self.inner.lock().await;
        inner
            .users
            .get(username)
            .map(|entry| entry.record.clone())
            .ok_or(DirectoryError::NotFound)
    }

    async fn update_user_attributes(
        &self,
        username: &str,
        attributes: HashMap<String, String>,
    ) -> Result<(), DirectoryError> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .users
            .get_mut(username)
            .ok_or(DirectoryError::NotFound)?;
        entry.record.attributes.extend(attributes);
        Ok(())
    }

    async fn groups_for_user(&self, username: &str) -> Result<Vec<String>, DirectoryError> {
        let inner = self.inner.lock().await;
        inner
            .users
            .get(username)
            .map(|entry| entry.groups.iter().cloned().collect())
            .ok_or(DirectoryError::NotFound)
    }

    async fn add_user_to_group(
        &self,
        username: &str,
        group: &str,
    ) -> Result<(), DirectoryError> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .users
            .get_mut(username)
            .ok_or(DirectoryError::NotFound)?;
        entry.groups.insert(group.to_string());
        Ok(())
    }

    async fn remove_user_from_group(
        &self,
        username: &str,
        group: &str,
    ) -> Result<(), DirectoryError> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .users
            .get_mut(username)
            .ok_or(DirectoryError::NotFound)?;
        entry.groups.remove(group);
        Ok(())
    }

    async fn begin_software_token_association(
        &self,
        username: &str,
    ) -> Result<SoftwareTokenEnrollment, DirectoryError> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .users
            .get_mut(username)
            .ok_or(DirectoryError::NotFound)?;

        let secret_bytes = Secret::generate_secret()
            .to_bytes()
            .map_err(|err| DirectoryError::Unavailable(format!("secret generation: {err:?}")))?;
        let email = entry.record.email.clone();
        entry.pending_totp_secret = Some(secret_bytes.clone());
        if entry.record.mfa != MfaStatus::Enabled {
            entry.record.mfa = MfaStatus::PendingVerification;
        }
        drop(inner);

        let totp = self.totp_for(secret_bytes, &email)?;
        Ok(SoftwareTokenEnrollment {
            secret_base32: totp.get_secret_base32(),
            provisioning_uri: totp.get_url(),
        })
    }

    async fn verify_software_token(
        &self,
        username: &str,
        code: &str,
    ) -> Result<(), DirectoryError> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .users
            .get_mut(username)
            .ok_or(DirectoryError::NotFound)?;

        let Some(secret) = entry.pending_totp_secret.clone() else {
            return Err(DirectoryError::CodeMismatch);
        };
        let email = entry.record.email.clone();
        let totp = self.totp_for(secret.clone(), &email)?;
        if totp.check_current(code).unwrap_or(false) {
            entry.totp_secret = Some(secret);
            entry.pending_totp_secret = None;
            entry.record.mfa = MfaStatus::Enabled;
            Ok(())
        } else {
            // The pending secret survives a mismatch so the caller can retry
            // with a fresh code from the same enrollment.
            Err(DirectoryError::CodeMismatch)
        }
    }

    async fn disable_software_token(
        &self,
        username: &str,
        code: &str,
    ) -> Result<(), DirectoryError> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .users
            .get_mut(username)
            .ok_or(DirectoryError::NotFound)?;

        let Some(secret) = entry.totp_secret.clone() else {
            return Err(DirectoryError::CodeMismatch);
        };
        let email = entry.record.email.clone();
        let totp = self.totp_for(secret, &email)?;
        if totp.check_current(code).unwrap_or(false) {
            entry.totp_secret = None;
            entry.pending_totp_secret = None;
            entry.record.mfa = MfaStatus::Disabled;
            Ok(())
        } else {
            Err(DirectoryError::CodeMismatch)
        }
    }

    async fn mfa_status(&self, username: &str) -> Result<MfaStatus, DirectoryError> {
        let inner = self.inner.lock().await;
        inner
            .users
            .get(username)
            .map(|entry| entry.record.mfa)
            .ok_or(DirectoryError::NotFound)
    }
}

fn password_digest(password: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}

fn generate_sms_code() -> String {
    let code: u32 = OsRng.gen_range(0..1_000_000);
    format!("{code:06}")
}
