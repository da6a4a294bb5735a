use crate::api::{self, AuthConfig, AuthState};
use crate::cli::actions::Action;
use crate::directory::memory::InMemoryDirectory;
use crate::groups::{DirectoryGroupStore, GroupBackend, GroupCatalog, GroupStore, InMemoryGroupStore};
use crate::token::TokenIssuer;
use anyhow::{ensure, Result};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::info;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            token_secret,
            token_ttl_seconds,
            groups,
            group_backend,
            directory_timeout_seconds,
            challenge_ttl_seconds,
            bootstrap_admin,
        } => {
            let catalog = GroupCatalog::new(groups)?;
            ensure!(
                catalog.contains("Admin"),
                "group vocabulary must include Admin"
            );

            let config = AuthConfig::new()
                .with_token_ttl_seconds(token_ttl_seconds)
                .with_call_timeout_seconds(directory_timeout_seconds)
                .with_challenge_ttl_seconds(challenge_ttl_seconds)
                .with_group_backend(group_backend);

            let directory = Arc::new(
                InMemoryDirectory::new()
                    .with_challenge_ttl(config.challenge_ttl())
                    .with_issuer(env!("CARGO_PKG_NAME").to_string()),
            );

            let store: Arc<dyn GroupStore> = match config.group_backend() {
                GroupBackend::Directory => Arc::new(DirectoryGroupStore::new(
                    directory.clone(),
                    config.call_timeout(),
                )),
                GroupBackend::Memory => Arc::new(InMemoryGroupStore::new()),
            };

            if let Some(admin) = bootstrap_admin {
                directory
                    .seed_user(
                        &admin.username,
                        &format!("{}@localhost", admin.username),
                        admin.password.expose_secret(),
                        &["Admin"],
                    )
                    .await;
                // The configured membership source must agree, whichever
                // backend was picked.
                store.add_to_group(&admin.username, "Admin").await?;
                info!(username = %admin.username, "bootstrap admin seeded");
            }

            let tokens = Arc::new(TokenIssuer::new(token_secret, token_ttl_seconds));
            let state = Arc::new(AuthState::new(config, directory, store, tokens, catalog));

            api::new(port, state).await?;
        }
    }

    Ok(())
}
