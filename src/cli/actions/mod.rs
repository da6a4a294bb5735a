pub mod server;

use secrecy::SecretString;

use crate::groups::GroupBackend;

/// Administrator account seeded into the in-process directory at startup.
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: SecretString,
}

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        token_secret: SecretString,
        token_ttl_seconds: i64,
        groups: Vec<String>,
        group_backend: GroupBackend,
        directory_timeout_seconds: u64,
        challenge_ttl_seconds: u64,
        bootstrap_admin: Option<BootstrapAdmin>,
    },
}
