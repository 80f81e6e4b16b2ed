use tm_auth::{RunState, TokenBroker};
use tm_graph::{AzureCliWriter, AzureManagementClient, generate_cli_login};
use tracing::{info, warn};

use crate::cli::AzArgs;

pub async fn run(state: &mut RunState, args: AzArgs) -> anyhow::Result<()> {
    let broker = TokenBroker::new(state.config())?;
    let arm = AzureManagementClient::new(state.config())?;
    let writer = AzureCliWriter::default_location()?;

    let login = generate_cli_login(&broker, &arm, &writer, state, &args.client).await?;

    if let Some(backup) = &login.backup {
        info!("\tPrevious Azure CLI directory: {}", backup.display());
    }
    match &login.profile {
        Some(_) => info!("Successfully generated Azure CLI authentication files"),
        None => warn!("MSAL token cache written without an Azure profile, az cli may not use it"),
    }
    Ok(())
}
