use tm_auth::{RunState, TokenBroker};
use tm_graph::{GraphClient, fetch_all, parse_fetch_modules};
use tracing::{debug, warn};

use crate::cli::FetchArgs;

pub async fn run(state: &mut RunState, args: FetchArgs, page_limit: usize) -> anyhow::Result<()> {
    super::require_any_token(state, "fetch")?;
    let modules = parse_fetch_modules(&args.modules)?;
    debug!("Fetch Modules: {:?}", modules);

    let broker = TokenBroker::new(state.config())?;
    let graph = GraphClient::new(state.config())?;

    let failed = fetch_all(&broker, &graph, state, &modules, page_limit).await;
    if failed > 0 {
        warn!("{} of {} fetch modules failed", failed, modules.len());
    }
    Ok(())
}
