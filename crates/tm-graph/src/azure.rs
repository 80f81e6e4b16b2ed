//! Azure CLI sign-in files: `msal_token_cache.json` and `azureProfile.json`.
//!
//! # Directory Structure
//! ```text
//! ~/.azure/
//! ├── msal_token_cache.json
//! └── azureProfile.json
//! ~/.azure_backup.20240309070501/   (previous directory, if any)
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use directories::BaseDirs;
use reqwest::{Client, header::ACCEPT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tm_auth::config::MANAGEMENT_RESOURCE;
use tm_auth::{FociRegistry, MsalCacheDocument, RunState, TokenBroker, TokenmanConfig, TokenmanError};
use tracing::{debug, error, info, instrument, warn};

use crate::errors::{AzureCliError, GraphError, Result};
use crate::graph::parse_graph_body;

const SUBSCRIPTIONS_API_VERSION: &str = "2019-11-01";
const ENVIRONMENT_NAME: &str = "AzureCloud";
pub const TOKEN_CACHE_FILE: &str = "msal_token_cache.json";
pub const PROFILE_FILE: &str = "azureProfile.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub subscription_id: String,
    pub display_name: String,
    pub state: String,
    pub tenant_id: String,
    #[serde(default)]
    pub managed_by_tenants: Vec<ManagedByTenant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedByTenant {
    pub tenant_id: String,
}

#[derive(Debug, Deserialize)]
struct SubscriptionList {
    #[serde(default)]
    value: Vec<Subscription>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureProfile {
    pub subscriptions: Vec<ProfileSubscription>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSubscription {
    pub id: String,
    pub name: String,
    pub state: String,
    pub user: ProfileUser,
    pub is_default: bool,
    pub tenant_id: String,
    pub environment_name: String,
    pub home_tenant_id: String,
    pub managed_by_tenants: Vec<ManagedByTenant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUser {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Azure Resource Manager client, limited to what a CLI profile needs
#[derive(Debug, Clone)]
pub struct AzureManagementClient {
    http: Client,
    base: String,
}

impl AzureManagementClient {
    pub fn new(config: &TokenmanConfig) -> Result<Self> {
        Ok(Self {
            http: config.http_client()?,
            base: config.endpoints.management.trim_end_matches('/').to_string(),
        })
    }

    /// Subscriptions visible to the token's user
    #[instrument(skip(self, access_token))]
    pub async fn subscriptions(&self, access_token: &str) -> Result<Vec<Subscription>> {
        debug!("Requesting accessible subscriptions");
        let response = self
            .http
            .get(format!("{}/subscriptions", self.base))
            .query(&[("api-version", SUBSCRIPTIONS_API_VERSION)])
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let text = response.text().await?;
        let body = parse_graph_body(&text)?;
        let list: SubscriptionList = serde_json::from_value(body)
            .map_err(|e| GraphError::InvalidResponse(format!("Malformed subscription list: {e}")))?;

        debug!("{} subscriptions found", list.value.len());
        Ok(list.value)
    }
}

/// Azure CLI profile listing `subscriptions` for `upn`; the first one is the default
pub fn build_azure_profile(upn: &str, subscriptions: &[Subscription]) -> AzureProfile {
    if subscriptions.is_empty() {
        warn!("User does not have access to any subscriptions");
        warn!("az cli will not recognize authentication as a result");
    }

    let subscriptions = subscriptions
        .iter()
        .enumerate()
        .map(|(i, sub)| ProfileSubscription {
            id: sub.subscription_id.clone(),
            name: sub.display_name.clone(),
            state: sub.state.clone(),
            user: ProfileUser {
                name: upn.to_string(),
                kind: "user".to_string(),
            },
            is_default: i == 0,
            tenant_id: sub.tenant_id.clone(),
            environment_name: ENVIRONMENT_NAME.to_string(),
            home_tenant_id: sub.tenant_id.clone(),
            managed_by_tenants: sub.managed_by_tenants.clone(),
        })
        .collect();

    AzureProfile { subscriptions }
}

/// Places files into the Azure CLI configuration directory
#[derive(Debug, Clone)]
pub struct AzureCliWriter {
    root: PathBuf,
}

impl AzureCliWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `~/.azure`
    pub fn default_location() -> std::result::Result<Self, AzureCliError> {
        let base_dirs = BaseDirs::new().ok_or(AzureCliError::HomeDirNotFound)?;
        Ok(Self::new(base_dirs.home_dir().join(".azure")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Move an existing directory aside to `{root}_backup.{utc}`, then create an empty one
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn prepare(&self) -> std::result::Result<Option<PathBuf>, AzureCliError> {
        let mut backup = None;

        if tokio::fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            let target = self.backup_path();
            debug!("Azure CLI directory exists, backing up to {}", target.display());

            tokio::fs::rename(&self.root, &target)
                .await
                .context("Failed to rename Azure CLI directory")
                .map_err(|e| {
                    error!("Failed to back up {}: {}", self.root.display(), e);
                    AzureCliError::BackupFailed {
                        path: self.root.clone(),
                        backup: target.clone(),
                        source: e,
                    }
                })?;
            backup = Some(target);
        }

        tokio::fs::create_dir_all(&self.root)
            .await
            .context("Failed to create Azure CLI directory")
            .map_err(|e| AzureCliError::DirectoryCreationFailed {
                path: self.root.clone(),
                source: e,
            })?;

        Ok(backup)
    }

    pub async fn write_token_cache(
        &self,
        doc: &MsalCacheDocument,
    ) -> std::result::Result<PathBuf, AzureCliError> {
        self.write(TOKEN_CACHE_FILE, doc).await
    }

    pub async fn write_profile(
        &self,
        profile: &AzureProfile,
    ) -> std::result::Result<PathBuf, AzureCliError> {
        self.write(PROFILE_FILE, profile).await
    }

    async fn write<T: Serialize>(
        &self,
        file_name: &str,
        data: &T,
    ) -> std::result::Result<PathBuf, AzureCliError> {
        let path = self.root.join(file_name);

        let value = serde_json::to_value(data)
            .context("Failed to serialize Azure CLI file")
            .map_err(|e| AzureCliError::SerializationFailed {
                path: path.clone(),
                source: e,
            })?;

        tm_auth::write_json_atomic(&path, &value)
            .await
            .context("Failed to write Azure CLI file")
            .map_err(|e| {
                error!("Failed to write {}: {}", path.display(), e);
                AzureCliError::WriteFailed {
                    path: path.clone(),
                    source: e,
                }
            })?;

        Ok(path)
    }

    fn backup_path(&self) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        let name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".azure".to_string());
        self.root.with_file_name(format!("{name}_backup.{stamp}"))
    }
}

/// Files produced by [`generate_cli_login`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliLogin {
    pub token_cache: PathBuf,
    pub profile: Option<PathBuf>,
    pub backup: Option<PathBuf>,
}

/// Exchange the cached refresh token for an Azure management token and sign the
/// Azure CLI in with it.
///
/// The token cache file is written before subscriptions are listed. A failed
/// profile step is logged and leaves the cache file in place.
#[instrument(skip(broker, arm, writer, state))]
pub async fn generate_cli_login(
    broker: &TokenBroker,
    arm: &AzureManagementClient,
    writer: &AzureCliWriter,
    state: &mut RunState,
    client: &str,
) -> Result<CliLogin> {
    let refresh_token = state
        .cache
        .refresh_token()
        .ok_or(TokenmanError::MissingRefreshToken)?
        .to_string();
    let client_id = FociRegistry::global().resolve(client)?;

    info!("Generating MSAL Token Cache");
    let token = broker
        .exchange(
            &refresh_token,
            &client_id,
            Some(MANAGEMENT_RESOURCE),
            &tm_auth::default_scopes(),
        )
        .await?;
    state.cache.apply(&token);

    let doc = tm_auth::msal::build(&state.cache)?;
    let backup = writer.prepare().await?;
    let token_cache = writer.write_token_cache(&doc).await?;
    info!("\tWrote {}", token_cache.display());

    info!("Generating Azure Profile");
    let profile = match write_profile(arm, writer, state).await {
        Ok(path) => {
            info!("\tWrote {}", path.display());
            Some(path)
        }
        Err(e) => {
            error!("Failed to generate Azure profile: {}", e);
            None
        }
    };

    Ok(CliLogin {
        token_cache,
        profile,
        backup,
    })
}

async fn write_profile(
    arm: &AzureManagementClient,
    writer: &AzureCliWriter,
    state: &RunState,
) -> Result<PathBuf> {
    let upn = state
        .cache
        .id_claims()
        .and_then(|c| {
            c.get("preferred_username")
                .or_else(|| c.get("upn"))
                .and_then(Value::as_str)
        })
        .ok_or(TokenmanError::IncompleteClaims {
            missing_field: "preferred_username",
        })?;
    let access_token = state
        .cache
        .access_token()
        .ok_or(GraphError::MissingAccessToken)?;

    let subscriptions = arm.subscriptions(access_token).await?;
    let profile = build_azure_profile(upn, &subscriptions);
    Ok(writer.write_profile(&profile).await?)
}
