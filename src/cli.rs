use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tm_auth::foci::{AZURE_CLI, MICROSOFT_OFFICE};
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "tokenman", version, about = "Family of Client IDs (FOCI) token tooling")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Flags shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// AAD refresh token
    #[arg(
        short = 'r',
        long,
        env = "TOKENMAN_REFRESH_TOKEN",
        hide_env_values = true,
        global = true,
        conflicts_with = "access_token"
    )]
    pub refresh_token: Option<String>,

    /// AAD access token
    #[arg(
        short = 'a',
        long,
        env = "TOKENMAN_ACCESS_TOKEN",
        hide_env_values = true,
        global = true
    )]
    pub access_token: Option<String>,

    /// HTTP proxy url (e.g. http://127.0.0.1:8080)
    #[arg(long, global = true)]
    pub proxy: Option<Url>,

    /// Keep TLS certificate verification on when a proxy is set
    #[arg(long, global = true)]
    pub proxy_verify_tls: bool,

    /// Output directory [default: data]
    #[arg(short = 'o', long, global = true)]
    pub output: Option<PathBuf>,

    /// Settings file [default: platform config dir/tokenman.toml]
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Exchange a refresh token for a token issued to another FOCI client
    Swap(SwapArgs),
    /// Generate Azure CLI authentication files
    Az(AzArgs),
    /// Authenticate with the device code flow
    Oauth(OauthArgs),
    /// Retrieve data via Graph API
    Fetch(FetchArgs),
    /// Search content via Graph API
    Search(SearchArgs),
}

#[derive(Args, Debug)]
pub struct SwapArgs {
    /// List FOCI application names and client ids
    #[arg(long)]
    pub list: bool,

    /// Application client id or name to exchange the token for
    #[arg(short = 'c', long = "client-id", required_unless_present = "list")]
    pub client: Option<String>,

    /// Token resource (audience)
    #[arg(long)]
    pub resource: Option<String>,

    /// Token scope (comma delimited) [default: .default]
    #[arg(long, value_delimiter = ',')]
    pub scope: Vec<String>,
}

#[derive(Args, Debug)]
pub struct AzArgs {
    /// Application client id or name to exchange the token for
    #[arg(short = 'c', long = "client-id", default_value = AZURE_CLI)]
    pub client: String,
}

#[derive(Args, Debug)]
pub struct OauthArgs {
    /// Application client id or name to authenticate as
    #[arg(short = 'c', long = "client-id", default_value = MICROSOFT_OFFICE)]
    pub client: String,

    /// Token scope (comma delimited) [default: .default]
    #[arg(long, value_delimiter = ',')]
    pub scope: Vec<String>,
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Fetch module(s) to run (all | applications,drives,emails,groups,organizations,serviceprincipals,users)
    #[arg(short = 'm', long = "module", value_delimiter = ',', default_value = "all")]
    pub modules: Vec<String>,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search module(s) to run (all | messages,onedrive,sharepoint)
    #[arg(short = 'm', long = "module", value_delimiter = ',', default_value = "all")]
    pub modules: Vec<String>,

    /// Keyword(s) to search for (comma delimited)
    #[arg(
        short = 'k',
        long = "keyword",
        value_delimiter = ',',
        default_value = "password,username"
    )]
    pub keywords: Vec<String>,
}
