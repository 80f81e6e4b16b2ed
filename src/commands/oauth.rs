use tm_auth::config::endpoints::DEVICE_LOGIN;
use tm_auth::{
    DeviceCodeFlow, DeviceCodeState, FociRegistry, RunState, TokenResponse, default_scopes,
    union_scopes,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cli::OauthArgs;

pub async fn run(state: &mut RunState, args: OauthArgs) -> anyhow::Result<()> {
    let client_id = FociRegistry::global().resolve(&args.client)?;
    let scopes = if args.scope.is_empty() {
        default_scopes()
    } else {
        args.scope
    };
    let scope = union_scopes(&scopes).join(" ");

    let flow = DeviceCodeFlow::new(state.config())?;
    device_login(&flow, state, &client_id, &scope, |url| webbrowser::open(url)).await?;
    Ok(())
}

/// Run a device code login, cache the token and write it out as `devicecode.token`.
///
/// `launch` opens the verification page; a launch failure only logs.
pub async fn device_login(
    flow: &DeviceCodeFlow,
    state: &mut RunState,
    client_id: &str,
    scope: &str,
    launch: impl FnOnce(&str) -> std::io::Result<()>,
) -> anyhow::Result<TokenResponse> {
    let (states, mut observed) = watch::channel(DeviceCodeState::Requesting);
    tokio::spawn(async move {
        while observed.changed().await.is_ok() {
            debug!("Device code state: {:?}", *observed.borrow_and_update());
        }
    });

    info!("Requesting new device code");
    let (session, handle) = flow.begin(client_id, scope, states).await?;
    debug!("Device code expires at {}", session.expires_at);
    info!("Authentication poll running in background");

    info!("Launching browser for authentication");
    info!("Enter the following device code: {}", session.user_code);
    info!("Close the browser or tab once authentication has completed to continue");
    if let Err(e) = launch(DEVICE_LOGIN) {
        warn!("Could not open browser: {}", e);
        warn!(
            "Browse to '{}' to perform device code authentication",
            DEVICE_LOGIN
        );
    }

    let token = handle.join().await?;
    state.cache.apply(&token);
    state
        .write_output("devicecode.token", &serde_json::to_value(&token)?)
        .await;
    Ok(token)
}
