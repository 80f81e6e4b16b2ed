use tm_auth::{RunState, TokenBroker};
use tm_graph::{GraphClient, parse_search_modules, search_all};
use tracing::{debug, warn};

use crate::cli::SearchArgs;

pub async fn run(state: &mut RunState, args: SearchArgs) -> anyhow::Result<()> {
    super::require_any_token(state, "search")?;
    let modules = parse_search_modules(&args.modules)?;
    if args.keywords.iter().all(|k| k.trim().is_empty()) {
        anyhow::bail!("-k/--keyword required for 'search' command");
    }
    debug!("Search Modules: {:?}", modules);

    let broker = TokenBroker::new(state.config())?;
    let graph = GraphClient::new(state.config())?;

    let failed = search_all(&broker, &graph, state, &modules, &args.keywords).await;
    if failed > 0 {
        warn!("{} of {} search modules failed", failed, modules.len());
    }
    Ok(())
}
