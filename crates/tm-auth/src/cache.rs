use tracing::{debug, error};

use crate::claims::{self, Claims};
use crate::errors::Result;
use crate::models::TokenResponse;

/// A raw credential string paired with the claims decoded from it.
///
/// Both halves are replaced together, so claims never describe a stale token.
#[derive(Debug, Clone, PartialEq)]
struct Decoded {
    raw: String,
    claims: Option<Claims>,
}

impl Decoded {
    fn new(raw: String, label: &str, decode: fn(&str) -> Result<Claims>) -> Self {
        let claims = match decode(&raw) {
            Ok(claims) => Some(claims),
            Err(e) => {
                error!("Failed to parse {}: {}", label, e);
                None
            }
        };
        Self { raw, claims }
    }
}

/// The run's mutable credential holder
#[derive(Clone, Default, PartialEq)]
pub struct TokenCache {
    access: Option<Decoded>,
    id: Option<Decoded>,
    client_info: Option<Decoded>,
    refresh_token: Option<String>,
}

impl TokenCache {
    pub fn new(access_token: Option<String>, refresh_token: Option<String>) -> Self {
        let mut cache = Self::default();
        cache.set_access_token(access_token);
        cache.set_refresh_token(refresh_token);
        cache
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access.as_ref().map(|d| d.raw.as_str())
    }

    pub fn access_claims(&self) -> Option<&Claims> {
        self.access.as_ref().and_then(|d| d.claims.as_ref())
    }

    /// Replace the access token and its claims; empty or `None` clears both
    pub fn set_access_token(&mut self, value: Option<String>) {
        self.access = non_empty(value).map(|raw| Decoded::new(raw, "access token", claims::decode_jwt));
    }

    pub fn id_token(&self) -> Option<&str> {
        self.id.as_ref().map(|d| d.raw.as_str())
    }

    pub fn id_claims(&self) -> Option<&Claims> {
        self.id.as_ref().and_then(|d| d.claims.as_ref())
    }

    /// Replace the id token and its claims; empty or `None` clears both
    pub fn set_id_token(&mut self, value: Option<String>) {
        self.id = non_empty(value).map(|raw| Decoded::new(raw, "id token", claims::decode_jwt));
    }

    pub fn client_info(&self) -> Option<&str> {
        self.client_info.as_ref().map(|d| d.raw.as_str())
    }

    pub fn client_info_claims(&self) -> Option<&Claims> {
        self.client_info.as_ref().and_then(|d| d.claims.as_ref())
    }

    /// Replace the client info blob and its claims; empty or `None` clears both
    pub fn set_client_info(&mut self, value: Option<String>) {
        self.client_info = non_empty(value)
            .map(|raw| Decoded::new(raw, "client info", claims::decode_client_info));
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// Refresh tokens are opaque and never decoded
    pub fn set_refresh_token(&mut self, value: Option<String>) {
        self.refresh_token = non_empty(value);
    }

    /// Take everything a token response carries in one update.
    ///
    /// Fields the response omits are left as they were, except the access token,
    /// which every successful response carries.
    pub fn apply(&mut self, response: &TokenResponse) {
        self.set_access_token(Some(response.access_token.clone()));

        if let Some(refresh_token) = &response.refresh_token {
            self.set_refresh_token(Some(refresh_token.clone()));
        }
        if let Some(id_token) = &response.id_token {
            self.set_id_token(Some(id_token.clone()));
        }
        if let Some(client_info) = &response.client_info {
            self.set_client_info(Some(client_info.clone()));
        }

        debug!(
            "Token cache updated (id token: {}, client info: {})",
            self.id.is_some(),
            self.client_info.is_some()
        );
    }

    /// User principal name from the access token, if the token carries one
    pub fn username(&self) -> Option<&str> {
        let claims = self.access_claims()?;
        claims::claim_str(claims, "unique_name").or_else(|| claims::claim_str(claims, "upn"))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("access_token", &self.access.as_ref().map(|_| "[REDACTED]"))
            .field("id_token", &self.id.as_ref().map(|_| "[REDACTED]"))
            .field("client_info", &self.client_info.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
