use crate::cli::actions::{Action, BootstrapAdmin};
use crate::groups::GroupBackend;
use anyhow::{anyhow, Result};
use secrecy::SecretString;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let token_secret = matches
        .get_one::<String>("token-secret")
        .map(|secret| SecretString::from(secret.clone()))
        .ok_or_else(|| anyhow!("missing required argument: --token-secret"))?;

    let groups = matches
        .get_one::<String>("groups")
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let group_backend = matches
        .get_one::<String>("group-backend")
        .map_or(Ok(GroupBackend::Directory), |value| {
            value.parse::<GroupBackend>().map_err(|err| anyhow!(err))
        })?;

    let bootstrap_admin = match (
        matches.get_one::<String>("bootstrap-admin"),
        matches.get_one::<String>("bootstrap-admin-password"),
    ) {
        (Some(username), Some(password)) => Some(BootstrapAdmin {
            username: username.clone(),
            password: SecretString::from(password.clone()),
        }),
        _ => None,
    };

    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        token_secret,
        token_ttl_seconds: matches
            .get_one::<i64>("token-ttl")
            .copied()
            .unwrap_or(crate::token::DEFAULT_TOKEN_TTL_SECONDS),
        groups,
        group_backend,
        directory_timeout_seconds: matches
            .get_one::<u64>("directory-timeout")
            .copied()
            .unwrap_or(5),
        challenge_ttl_seconds: matches
            .get_one::<u64>("challenge-ttl")
            .copied()
            .unwrap_or(300),
        bootstrap_admin,
    })
}
