//! Persisted MSAL token cache, as read by the Azure CLI.
//!
//! Entry keys are composed from claims and must match MSAL's key grammar exactly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cache::TokenCache;
use crate::claims::{self, Claims};
use crate::config::ENVIRONMENT;
use crate::errors::{Result, TokenmanError};

/// Realm MSAL records for multi-tenant `organizations` sign-ins
pub const ORGANIZATIONS_REALM: &str = "organizations";

/// Family id for FOCI refresh tokens
pub const FAMILY_ID: &str = "1";

/// Seconds added to `nbf` for `cached_at`
const CACHED_AT_SKEW: i64 = 10;

/// Seconds taken off `exp` for `expires_on`
const EXPIRES_ON_SKEW: i64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsalCacheDocument {
    #[serde(rename = "AccessToken")]
    pub access_token: BTreeMap<String, AccessTokenEntry>,
    #[serde(rename = "AppMetadata")]
    pub app_metadata: BTreeMap<String, AppMetadataEntry>,
    #[serde(rename = "RefreshToken")]
    pub refresh_token: BTreeMap<String, RefreshTokenEntry>,
    #[serde(rename = "IdToken")]
    pub id_token: BTreeMap<String, IdTokenEntry>,
    #[serde(rename = "Account")]
    pub account: BTreeMap<String, AccountEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenEntry {
    pub credential_type: String,
    pub secret: String,
    pub home_account_id: String,
    pub environment: String,
    pub client_id: String,
    pub target: String,
    pub realm: String,
    pub token_type: String,
    pub cached_at: i64,
    pub expires_on: i64,
    pub extended_expires_on: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMetadataEntry {
    pub client_id: String,
    pub environment: String,
    pub family_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenEntry {
    pub credential_type: String,
    pub secret: String,
    pub home_account_id: String,
    pub environment: String,
    pub client_id: String,
    pub target: String,
    pub last_modification_time: i64,
    pub family_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenEntry {
    pub credential_type: String,
    pub secret: String,
    pub home_account_id: String,
    pub environment: String,
    pub realm: String,
    pub client_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub home_account_id: String,
    pub environment: String,
    pub realm: String,
    pub local_account_id: String,
    pub username: String,
    pub authority_type: String,
}

/// Claim values every cache entry is derived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheIdentity {
    pub uid: String,
    pub tid: String,
    pub client_id: String,
    pub scope: String,
    pub username: String,
}

impl CacheIdentity {
    pub fn home_account_id(&self) -> String {
        format!("{}.{}", self.uid, self.tid)
    }

    pub fn access_token_key(&self) -> String {
        format!(
            "{}-{}-accesstoken-{}-{}-{}",
            self.home_account_id(),
            ENVIRONMENT,
            self.client_id,
            self.tid,
            self.scope
        )
    }

    pub fn refresh_token_key(&self) -> String {
        format!(
            "{}-{}-refreshtoken-{}--{}",
            self.home_account_id(),
            ENVIRONMENT,
            self.client_id,
            self.scope
        )
    }

    pub fn id_token_key(&self) -> String {
        format!(
            "{}-{}-idtoken-{}-{}-",
            self.home_account_id(),
            ENVIRONMENT,
            self.client_id,
            ORGANIZATIONS_REALM
        )
    }

    pub fn account_key(&self) -> String {
        format!(
            "{}-{}-{}",
            self.home_account_id(),
            ENVIRONMENT,
            ORGANIZATIONS_REALM
        )
    }

    pub fn app_metadata_key(&self) -> String {
        format!("appmetadata-{}-{}", ENVIRONMENT, self.client_id)
    }
}

/// Build the persisted cache document from a populated token cache.
///
/// Pure: no I/O. Requires a completed exchange that returned an access token,
/// refresh token, id token and client info.
pub fn build(cache: &TokenCache) -> Result<MsalCacheDocument> {
    let access_token = cache.access_token().ok_or(missing("access_token"))?;
    let refresh_token = cache.refresh_token().ok_or(missing("refresh_token"))?;
    let id_token = cache.id_token().ok_or(missing("id_token"))?;

    let access = cache.access_claims().ok_or(missing("appid"))?;
    let id = cache.id_claims().ok_or(missing("preferred_username"))?;
    let client_info = cache.client_info_claims().ok_or(missing("uid"))?;

    let client_id = required_str(access, "appid")?;
    let scope = required_str(access, "scp")?;
    let exp = claims::claim_i64(access, "exp").ok_or(missing("exp"))?;
    let nbf = claims::claim_i64(access, "nbf").ok_or(missing("nbf"))?;
    let tid = claims::claim_str(id, "tid")
        .or_else(|| claims::claim_str(access, "tid"))
        .ok_or(missing("tid"))?;
    let uid = required_str(client_info, "uid")?;
    // AAD issues preferred_username, ADFS issues upn
    let username = claims::claim_str(id, "preferred_username")
        .or_else(|| claims::claim_str(id, "upn"))
        .ok_or(missing("preferred_username"))?;

    let identity = CacheIdentity {
        uid: uid.to_string(),
        tid: tid.to_string(),
        client_id: client_id.to_string(),
        scope: scope.to_string(),
        username: username.to_string(),
    };

    let cached_at = nbf + CACHED_AT_SKEW;
    let expires_on = exp - EXPIRES_ON_SKEW;

    Ok(document(
        &identity,
        access_token,
        refresh_token,
        id_token,
        cached_at,
        expires_on,
    ))
}

fn document(
    identity: &CacheIdentity,
    access_token: &str,
    refresh_token: &str,
    id_token: &str,
    cached_at: i64,
    expires_on: i64,
) -> MsalCacheDocument {
    let home_account_id = identity.home_account_id();

    let access = AccessTokenEntry {
        credential_type: "AccessToken".to_string(),
        secret: access_token.to_string(),
        home_account_id: home_account_id.clone(),
        environment: ENVIRONMENT.to_string(),
        client_id: identity.client_id.clone(),
        target: identity.scope.clone(),
        realm: identity.tid.clone(),
        token_type: "Bearer".to_string(),
        cached_at,
        expires_on,
        extended_expires_on: expires_on,
    };

    let app_metadata = AppMetadataEntry {
        client_id: identity.client_id.clone(),
        environment: ENVIRONMENT.to_string(),
        family_id: FAMILY_ID.to_string(),
    };

    let refresh = RefreshTokenEntry {
        credential_type: "RefreshToken".to_string(),
        secret: refresh_token.to_string(),
        home_account_id: home_account_id.clone(),
        environment: ENVIRONMENT.to_string(),
        client_id: identity.client_id.clone(),
        target: identity.scope.clone(),
        last_modification_time: cached_at,
        family_id: FAMILY_ID.to_string(),
    };

    let id = IdTokenEntry {
        credential_type: "IdToken".to_string(),
        secret: id_token.to_string(),
        home_account_id: home_account_id.clone(),
        environment: ENVIRONMENT.to_string(),
        realm: ORGANIZATIONS_REALM.to_string(),
        client_id: identity.client_id.clone(),
    };

    let account = AccountEntry {
        home_account_id,
        environment: ENVIRONMENT.to_string(),
        realm: ORGANIZATIONS_REALM.to_string(),
        local_account_id: identity.uid.clone(),
        username: identity.username.clone(),
        authority_type: "MSSTS".to_string(),
    };

    MsalCacheDocument {
        access_token: BTreeMap::from([(identity.access_token_key(), access)]),
        app_metadata: BTreeMap::from([(identity.app_metadata_key(), app_metadata)]),
        refresh_token: BTreeMap::from([(identity.refresh_token_key(), refresh)]),
        id_token: BTreeMap::from([(identity.id_token_key(), id)]),
        account: BTreeMap::from([(identity.account_key(), account)]),
    }
}

fn missing(field: &'static str) -> TokenmanError {
    TokenmanError::IncompleteClaims {
        missing_field: field,
    }
}

fn required_str<'a>(claims: &'a Claims, name: &'static str) -> Result<&'a str> {
    claims::claim_str(claims, name).ok_or(missing(name))
}
