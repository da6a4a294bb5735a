//! MFA enrollment: `DISABLED -> PENDING_VERIFICATION -> ENABLED -> DISABLED`.
//!
//! The provider custodies the enrollment secret; this service only drives the
//! transitions and enforces that an enabled enrollment is never silently
//! restarted.

use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

use crate::directory::{bounded, CredentialDirectory, DirectoryError, MfaStatus};

/// Result of asking to begin enrollment.
#[derive(Debug, Clone)]
pub enum EnrollmentStart {
    /// MFA is already enabled; the existing enrollment stands.
    AlreadyEnabled,
    /// A fresh provisioning secret was allocated. This is the only time the
    /// secret material is ever surfaced.
    Started {
        secret_base32: String,
        provisioning_uri: String,
    },
}

pub struct MfaService {
    directory: Arc<dyn CredentialDirectory>,
    call_timeout: Duration,
}

impl MfaService {
    #[must_use]
    pub fn new(directory: Arc<dyn CredentialDirectory>, call_timeout: Duration) -> Self {
        Self {
            directory,
            call_timeout,
        }
    }

    /// # Errors
    ///
    /// `NotFound` for an unknown principal, `Unavailable` on provider outage.
    pub async fn begin_enrollment(
        &self,
        username: &str,
    ) -> Result<EnrollmentStart, DirectoryError> {
        let status = bounded(self.call_timeout, self.directory.mfa_status(username)).await?;
        if status == MfaStatus::Enabled {
            return Ok(EnrollmentStart::AlreadyEnabled);
        }

        let enrollment = bounded(
            self.call_timeout,
            self.directory.begin_software_token_association(username),
        )
        .await?;
        Ok(EnrollmentStart::Started {
            secret_base32: enrollment.secret_base32,
            provisioning_uri: enrollment.provisioning_uri,
        })
    }

    /// Confirm a pending enrollment with a code from the authenticator app.
    /// On mismatch the enrollment stays pending and the caller may retry with
    /// a new code against the same secret, per provider policy.
    ///
    /// # Errors
    ///
    /// `CodeMismatch` on a wrong or out-of-shape code.
    pub async fn confirm_enrollment(
        &self,
        username: &str,
        code: &SecretString,
    ) -> Result<(), DirectoryError> {
        let code = well_formed_code(code)?;
        bounded(
            self.call_timeout,
            self.directory.verify_software_token(username, code),
        )
        .await
    }

    /// Disabling requires a currently valid code so a hijacked session cannot
    /// silently downgrade the account.
    ///
    /// # Errors
    ///
    /// `CodeMismatch` on a wrong or out-of-shape code.
    pub async fn disable(
        &self,
        username: &str,
        code: &SecretString,
    ) -> Result<(), DirectoryError> {
        let code = well_formed_code(code)?;
        bounded(
            self.call_timeout,
            self.directory.disable_software_token(username, code),
        )
        .await
    }
}

fn well_formed_code(code: &SecretString) -> Result<&str, DirectoryError> {
    use secrecy::ExposeSecret;

    let code = code.expose_secret();
    if code.len() == 6 && code.bytes().all(|byte| byte.is_ascii_digit()) {
        Ok(code)
    } else {
        Err(DirectoryError::CodeMismatch)
    }
}
