use std::time::Duration;

use reqwest::{Client, Proxy};
use tracing::warn;
use url::Url;

use crate::errors::Result;

/// Microsoft identity platform endpoints
pub mod endpoints {
    pub const AUTHORITY: &str = "https://login.microsoftonline.com";
    pub const TOKEN_PATH: &str = "/common/oauth2/token";
    pub const DEVICE_CODE_PATH: &str = "/organizations/oauth2/v2.0/devicecode";
    pub const DEVICE_TOKEN_PATH: &str = "/organizations/oauth2/v2.0/token";
    pub const GRAPH: &str = "https://graph.microsoft.com/v1.0";
    pub const MANAGEMENT: &str = "https://management.azure.com";
    pub const DEVICE_LOGIN: &str = "https://microsoft.com/devicelogin";
}

/// Host name written into persisted MSAL cache entries
pub const ENVIRONMENT: &str = "login.microsoftonline.com";

/// Scopes unioned into every token and device code request
pub const BASELINE_SCOPES: &[&str] = &["profile", "openid", "offline_access"];

/// Default scope when the caller does not name one
pub const DEFAULT_SCOPE: &str = ".default";

/// Resource checked by default when deciding whether a cached token is usable
pub const GRAPH_RESOURCE: &str = "https://graph.microsoft.com";

/// Legacy v1 resource used for Azure CLI tokens
pub const MANAGEMENT_RESOURCE: &str = "https://management.core.windows.net";

/// Resolved endpoint URLs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub token: String,
    pub device_code: String,
    pub device_token: String,
    pub graph: String,
    pub management: String,
}

impl Endpoints {
    /// Rebase every endpoint on `base`, e.g. a mock server during tests
    pub fn with_authority(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            token: format!("{base}{}", endpoints::TOKEN_PATH),
            device_code: format!("{base}{}", endpoints::DEVICE_CODE_PATH),
            device_token: format!("{base}{}", endpoints::DEVICE_TOKEN_PATH),
            graph: format!("{base}/v1.0"),
            management: base.to_string(),
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            token: format!("{}{}", endpoints::AUTHORITY, endpoints::TOKEN_PATH),
            device_code: format!("{}{}", endpoints::AUTHORITY, endpoints::DEVICE_CODE_PATH),
            device_token: format!("{}{}", endpoints::AUTHORITY, endpoints::DEVICE_TOKEN_PATH),
            graph: endpoints::GRAPH.to_string(),
            management: endpoints::MANAGEMENT.to_string(),
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            request: Duration::from_secs(30),
        }
    }
}

/// Outbound proxy for every request of the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub http: Url,
    pub https: Url,
    /// Keep certificate verification on through the proxy.
    ///
    /// Off by default: a configured proxy usually means an intercepting debug proxy.
    pub verify_tls: bool,
}

impl ProxyConfig {
    /// Route both schemes through the same proxy URL
    pub fn new(url: Url) -> Self {
        Self {
            http: url.clone(),
            https: url,
            verify_tls: false,
        }
    }

    pub fn with_tls_verification(mut self, verify_tls: bool) -> Self {
        self.verify_tls = verify_tls;
        self
    }
}

/// Configuration shared by the token broker, device code flow and Graph clients
#[derive(Debug, Clone)]
pub struct TokenmanConfig {
    pub endpoints: Endpoints,
    pub http_timeouts: HttpTimeouts,
    pub user_agent: Option<String>,
    pub proxy: Option<ProxyConfig>,
}

impl TokenmanConfig {
    pub fn with_proxy(mut self, proxy: Option<ProxyConfig>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Build the HTTP client for this configuration.
    ///
    /// With a proxy configured and `verify_tls` unset, certificate verification is off.
    /// Whether clients built from this config skip certificate verification.
    ///
    /// Only a proxy with `verify_tls` off turns verification off.
    pub fn accepts_invalid_certs(&self) -> bool {
        self.proxy.as_ref().is_some_and(|p| !p.verify_tls)
    }

    pub fn http_client(&self) -> Result<Client> {
        let mut builder = Client::builder()
            .connect_timeout(self.http_timeouts.connect)
            .timeout(self.http_timeouts.request)
            .user_agent(self.user_agent.as_deref().unwrap_or("tokenman"));

        if let Some(proxy) = &self.proxy {
            builder = builder
                .proxy(Proxy::http(proxy.http.as_str())?)
                .proxy(Proxy::https(proxy.https.as_str())?);

            if self.accepts_invalid_certs() {
                warn!(
                    "TLS certificate verification disabled for proxy {}",
                    proxy.https
                );
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        Ok(builder.build()?)
    }
}

impl Default for TokenmanConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            http_timeouts: HttpTimeouts::default(),
            user_agent: Some("tokenman".to_string()),
            proxy: None,
        }
    }
}
