//! Microsoft Graph and Azure Resource Manager access for tokenman
//!
//! Every module here runs against a [`tm_auth::RunState`]: it first makes sure the
//! cached access token is usable (exchanging the refresh token through the FOCI
//! family when it is not), then calls the API and writes non-empty results
//! through the run's output sink.

pub mod azure;
pub mod errors;
pub mod fetch;
pub mod graph;
pub mod search;

pub use azure::{
    AzureCliWriter, AzureManagementClient, AzureProfile, CliLogin, Subscription,
    build_azure_profile, generate_cli_login,
};
pub use errors::{AzureCliError, GraphError, Result};
pub use fetch::{FetchModule, fetch_all, parse_fetch_modules};
pub use graph::{DEFAULT_PAGE_LIMIT, GraphClient, search_hit_count};
pub use search::{SearchModule, default_keywords, kql_any, parse_search_modules, search_all};
