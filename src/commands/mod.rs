mod az;
mod fetch;
mod oauth;
mod search;
mod swap;

use std::sync::Arc;

use tm_auth::{DirectorySink, RunState, TokenCache, TokenmanConfig};
use tracing::debug;

use crate::cli::{Cli, Command};
use crate::settings::{self, Settings};

/// Dispatch a parsed command line
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let Cli { global, command } = cli;

    if matches!(&command, Command::Swap(args) if args.list) {
        return swap::list();
    }

    let settings = Settings::load(global.config.as_deref()).await?;
    let resolved = settings::resolve(&global, &settings)?;
    debug!("Resolved settings: {:?}", resolved);

    let output = DirectorySink::new(&resolved.output_dir).await?;
    let config = TokenmanConfig::default().with_proxy(resolved.proxy);
    let mut state = RunState::new(
        TokenCache::new(global.access_token, global.refresh_token),
        config,
        Arc::new(output),
    );

    match command {
        Command::Swap(args) => swap::run(&mut state, args).await,
        Command::Az(args) => az::run(&mut state, args).await,
        Command::Oauth(args) => oauth::run(&mut state, args).await,
        Command::Fetch(args) => fetch::run(&mut state, args, resolved.page_limit).await,
        Command::Search(args) => search::run(&mut state, args).await,
    }
}

/// Fail early when neither token was supplied
fn require_any_token(state: &RunState, command: &str) -> anyhow::Result<()> {
    if state.cache.refresh_token().is_none() && state.cache.access_token().is_none() {
        anyhow::bail!("-r/--refresh-token or -a/--access-token required for '{command}' command");
    }
    Ok(())
}
