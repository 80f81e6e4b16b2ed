use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use tm_auth::foci::MICROSOFT_OFFICE;
use tm_auth::{RunState, TokenBroker};
use tracing::{error, info, instrument};

use crate::errors::{GraphError, Result};
use crate::graph::GraphClient;

/// Graph collections the `fetch` command can dump
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchModule {
    Users,
    Groups,
    Organizations,
    Emails,
    Applications,
    ServicePrincipals,
    Drives,
}

impl FetchModule {
    /// Every module, in the order `all` runs them
    pub const ALL: [FetchModule; 7] = [
        Self::Users,
        Self::Groups,
        Self::Organizations,
        Self::Emails,
        Self::Applications,
        Self::ServicePrincipals,
        Self::Drives,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Groups => "groups",
            Self::Organizations => "organizations",
            Self::Emails => "emails",
            Self::Applications => "applications",
            Self::ServicePrincipals => "serviceprincipals",
            Self::Drives => "drives",
        }
    }

    /// Graph path relative to the versioned base URL
    pub fn path(self) -> &'static str {
        match self {
            Self::Users => "users?$top=999",
            Self::Groups => "groups?$top=999",
            Self::Organizations => "organization",
            Self::Emails => "me/messages",
            Self::Applications => "applications?$top=999",
            Self::ServicePrincipals => "servicePrincipals?$top=999",
            Self::Drives => "me/drives",
        }
    }

    /// Make sure an Office token is cached, fetch the collection and write it out.
    ///
    /// Returns the number of values fetched. Nothing is written for an empty result.
    #[instrument(skip(self, broker, graph, state), fields(module = self.name()))]
    pub async fn run(
        self,
        broker: &TokenBroker,
        graph: &GraphClient,
        state: &mut RunState,
        page_limit: usize,
    ) -> Result<usize> {
        broker.ensure(state, MICROSOFT_OFFICE).await?;
        let access_token = state
            .cache
            .access_token()
            .ok_or(GraphError::MissingAccessToken)?;

        info!("Fetching '{}'", self.name());
        let results = graph.fetch(access_token, self.path(), page_limit).await?;

        let count = results
            .get("value")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        info!("\t{}: {}", self.name(), count);

        if count > 0 {
            state
                .write_output(&format!("fetch.{}", self.name()), &results)
                .await;
        }
        Ok(count)
    }
}

impl fmt::Display for FetchModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FetchModule {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| GraphError::UnknownModule(s.to_string()))
    }
}

/// Parse a module selection; `all` anywhere in the list selects every module
pub fn parse_fetch_modules(names: &[String]) -> Result<Vec<FetchModule>> {
    if names.iter().any(|n| n.trim().eq_ignore_ascii_case("all")) {
        return Ok(FetchModule::ALL.to_vec());
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
pub async fn fetch_all(
    broker: &TokenBroker,
    graph: &GraphClient,
    state: &mut RunState,
    modules: &[FetchModule],
    page_limit: usize,
) -> usize {
    let mut failed = 0;
    for module in FetchModule::ALL.iter().filter(|m| modules.contains(m)) {
        if let Err(e) = module.run(broker, graph, state, page_limit).await {
            error!("Failed to fetch '{}': {}", module, e);
            failed += 1;
        }
    }
    failed
}
