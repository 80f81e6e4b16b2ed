use serde_json::{Map, Value};
use tm_auth::{
    FociRegistry, RunState, TokenBroker, TokenResponse, TokenmanError, default_scopes,
};
use tracing::info;

use crate::cli::SwapArgs;

/// Print the FOCI registry as `{name: client_id}`
pub fn list() -> anyhow::Result<()> {
    let clients: Map<String, Value> = FociRegistry::global()
        .entries()
        .map(|(name, id)| (name.to_string(), Value::String(id.to_string())))
        .collect();
    println!("{}", serde_json::to_string_pretty(&clients)?);
    Ok(())
}

pub async fn run(state: &mut RunState, args: SwapArgs) -> anyhow::Result<()> {
    let client = args
        .client
        .ok_or_else(|| anyhow::anyhow!("-c/--client-id required for 'swap' command"))?;
    let client_id = FociRegistry::global().resolve(&client)?;
    let refresh_token = state
        .cache
        .refresh_token()
        .ok_or(TokenmanError::MissingRefreshToken)?
        .to_string();
    let scopes = if args.scope.is_empty() {
        default_scopes()
    } else {
        args.scope
    };

    info!("Acquiring new token for: '{}'", client);
    let broker = TokenBroker::new(state.config())?;
    let token = exchange_and_save(
        &broker,
        state,
        &refresh_token,
        &client_id,
        args.resource.as_deref(),
        &scopes,
    )
    .await?;

    info!("\tAccess Token:");
    println!("{}", token.access_token);
    Ok(())
}

/// Exchange `refresh_token` for `client_id`, cache the result and write it
/// out as `{upn}.{client_id}`, falling back to `token` without a UPN
pub async fn exchange_and_save(
    broker: &TokenBroker,
    state: &mut RunState,
    refresh_token: &str,
    client_id: &str,
    resource: Option<&str>,
    scopes: &[String],
) -> anyhow::Result<TokenResponse> {
    let token = broker
        .exchange(refresh_token, client_id, resource, scopes)
        .await?;
    state.cache.apply(&token);

    let upn = state.cache.username().unwrap_or("token").to_string();
    state
        .write_output(&format!("{upn}.{client_id}"), &serde_json::to_value(&token)?)
        .await;
    Ok(token)
}
