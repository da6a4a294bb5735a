//! Auth configuration and shared handler state.

use std::sync::Arc;
use std::time::Duration;

use crate::directory::CredentialDirectory;
use crate::flow::{mfa::MfaService, Authenticator, DEFAULT_CALL_TIMEOUT_SECONDS};
use crate::groups::{GroupBackend, GroupCatalog, GroupStore};
use crate::token::{TokenIssuer, DEFAULT_TOKEN_TTL_SECONDS};

const DEFAULT_CHALLENGE_TTL_SECONDS: u64 = 5 * 60;

/// Startup configuration for the authentication core. Everything here is
/// read-only after the server starts.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    token_ttl_seconds: i64,
    call_timeout_seconds: u64,
    challenge_ttl_seconds: u64,
    group_backend: GroupBackend,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            call_timeout_seconds: DEFAULT_CALL_TIMEOUT_SECONDS,
            challenge_ttl_seconds: DEFAULT_CHALLENGE_TTL_SECONDS,
            group_backend: GroupBackend::Directory,
        }
    }

    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_call_timeout_seconds(mut self, seconds: u64) -> Self {
        self.call_timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_challenge_ttl_seconds(mut self, seconds: u64) -> Self {
        self.challenge_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_group_backend(mut self, backend: GroupBackend) -> Self {
        self.group_backend = backend;
        self
    }

    #[must_use]
    pub fn token_ttl_seconds(&self) -> i64 {
        self.token_ttl_seconds
    }

    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_seconds)
    }

    #[must_use]
    pub fn challenge_ttl(&self) -> Duration {
        Duration::from_secs(self.challenge_ttl_seconds)
    }

    #[must_use]
    pub fn group_backend(&self) -> GroupBackend {
        self.group_backend
    }
}

/// Everything the handlers need, wired once at startup and shared read-only.
pub struct AuthState {
    config: AuthConfig,
    authenticator: Authenticator,
    mfa: MfaService,
    tokens: Arc<TokenIssuer>,
    groups: Arc<dyn GroupStore>,
    catalog: GroupCatalog,
    directory: Arc<dyn CredentialDirectory>,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        directory: Arc<dyn CredentialDirectory>,
        groups: Arc<dyn GroupStore>,
        tokens: Arc<TokenIssuer>,
        catalog: GroupCatalog,
    ) -> Self {
        let authenticator = Authenticator::new(
            directory.clone(),
            groups.clone(),
            tokens.clone(),
            config.call_timeout(),
        );
        let mfa = MfaService::new(directory.clone(), config.call_timeout());
        Self {
            config,
            authenticator,
            mfa,
            tokens,
            groups,
            catalog,
            directory,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    #[must_use]
    pub fn mfa(&self) -> &MfaService {
        &self.mfa
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    #[must_use]
    pub fn groups(&self) -> &dyn GroupStore {
        self.groups.as_ref()
    }

    #[must_use]
    pub fn catalog(&self) -> &GroupCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn directory(&self) -> &dyn CredentialDirectory {
        self.directory.as_ref()
    }
}
