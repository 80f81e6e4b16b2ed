use std::fmt;
use std::str::FromStr;

use tm_auth::foci::MICROSOFT_OFFICE;
use tm_auth::{RunState, TokenBroker};
use tracing::{error, info, instrument};

use crate::errors::{GraphError, Result};
use crate::graph::{GraphClient, search_hit_count};

/// Keywords searched for when none are given
pub const DEFAULT_KEYWORDS: &[&str] = &["password", "username"];

/// Microsoft Search verticals the `search` command queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchModule {
    Messages,
    OneDrive,
    SharePoint,
}

impl SearchModule {
    pub const ALL: [SearchModule; 3] = [Self::Messages, Self::OneDrive, Self::SharePoint];

    pub fn name(self) -> &'static str {
        match self {
            Self::Messages => "messages",
            Self::OneDrive => "onedrive",
            Self::SharePoint => "sharepoint",
        }
    }

    pub fn entity_types(self) -> &'static [&'static str] {
        match self {
            Self::Messages => &["message"],
            Self::OneDrive => &["driveItem"],
            Self::SharePoint => &["listItem", "site"],
        }
    }

    /// Search this vertical for any of `keywords` and write the hits out.
    ///
    /// Returns the hit count. Nothing is written when there are no hits.
    #[instrument(skip(self, broker, graph, state), fields(module = self.name()))]
    pub async fn run(
        self,
        broker: &TokenBroker,
        graph: &GraphClient,
        state: &mut RunState,
        keywords: &[String],
    ) -> Result<usize> {
        broker.ensure(state, MICROSOFT_OFFICE).await?;
        let access_token = state
            .cache
            .access_token()
            .ok_or(GraphError::MissingAccessToken)?;

        info!("Searching '{}' for: {:?}", self.name(), keywords);
        let results = graph
            .search(access_token, self.entity_types(), &kql_any(keywords))
            .await?;

        let count = search_hit_count(&results);
        info!("\tSearch Results: {}", count);

        if count > 0 {
            state
                .write_output(&format!("search.{}", self.name()), &results)
                .await;
        }
        Ok(count)
    }
}

impl fmt::Display for SearchModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SearchModule {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| GraphError::UnknownModule(s.to_string()))
    }
}

/// KQL disjunction of the keywords
pub fn kql_any(keywords: &[String]) -> String {
    keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect::<Vec<_>>()
        .join(" OR ")
}

pub fn default_keywords() -> Vec<String> {
    DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect()
}

/// Parse a module selection; `all` anywhere in the list selects every module
pub fn parse_search_modules(names: &[String]) -> Result<Vec<SearchModule>> {
    if names.iter().any(|n| n.trim().eq_ignore_ascii_case("all")) {
        return Ok(SearchModule::ALL.to_vec());
    }

    let mut modules = Vec::new();
    for name in names {
        let module = name.parse()?;
        if !modules.contains(&module) {
            modules.push(module);
        }
    }
    Ok(modules)
}

/// Run each selected module in order, logging failures and moving on
pub async fn search_all(
    broker: &TokenBroker,
    graph: &GraphClient,
    state: &mut RunState,
    modules: &[SearchModule],
    keywords: &[String],
) -> usize {
    let mut failed = 0;
    for module in SearchModule::ALL.iter().filter(|m| modules.contains(m)) {
        if let Err(e) = module.run(broker, graph, state, keywords).await {
            error!("Failed to search '{}': {}", module, e);
            failed += 1;
        }
    }
    failed
}
