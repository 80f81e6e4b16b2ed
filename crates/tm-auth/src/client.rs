use reqwest::{Client, StatusCode, header::CONTENT_TYPE};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::claims::{self, Claims};
use crate::config::{BASELINE_SCOPES, Endpoints, GRAPH_RESOURCE, TokenmanConfig};
use crate::errors::{Result, TokenmanError};
use crate::foci::FociRegistry;
use crate::models::{ProviderErrorResponse, TokenResponse};
use crate::state::RunState;

/// Refresh token exchange against the identity provider's token endpoint
#[derive(Debug, Clone)]
pub struct TokenBroker {
    http: Client,
    endpoints: Endpoints,
}

impl TokenBroker {
    /// Create a broker using the proxy and timeouts of `config`
    pub fn new(config: &TokenmanConfig) -> Result<Self> {
        Ok(Self {
            http: config.http_client()?,
            endpoints: config.endpoints.clone(),
        })
    }

    /// Exchange a refresh token for a token issued to `client_id`.
    ///
    /// `resource` is the legacy v1 audience and is only sent when non-empty.
    /// Never retries.
    #[instrument(skip(self, refresh_token, scopes))]
    pub async fn exchange(
        &self,
        refresh_token: &str,
        client_id: &str,
        resource: Option<&str>,
        scopes: &[String],
    ) -> Result<TokenResponse> {
        let scope = union_scopes(scopes).join(" ");

        let mut params = vec![
            ("client_id", client_id),
            ("grant_type", "refresh_token"),
            ("client_info", "1"),
            ("refresh_token", refresh_token),
            ("scope", scope.as_str()),
        ];
        if let Some(resource) = resource.filter(|r| !r.is_empty()) {
            params.push(("resource", resource));
        }

        debug!("Exchanging refresh token (scope: {})", scope);
        let response = self
            .http
            .post(&self.endpoints.token)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form_body(&params))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        parse_token_response(status, &body)
    }

    /// Resolve a FOCI application name (or literal id) before exchanging
    #[instrument(skip(self, refresh_token, scopes))]
    pub async fn exchange_by_family(
        &self,
        refresh_token: &str,
        client_name_or_id: &str,
        resource: Option<&str>,
        scopes: &[String],
    ) -> Result<TokenResponse> {
        let client_id = FociRegistry::global().resolve(client_name_or_id)?;
        self.exchange(refresh_token, &client_id, resource, scopes)
            .await
    }

    /// Make sure the cached access token is usable for `target` against Graph,
    /// exchanging the cached refresh token when it is not
    #[instrument(skip(self, state))]
    pub async fn ensure(&self, state: &mut RunState, target: &str) -> Result<()> {
        if is_token_valid_for(state.cache.access_claims(), target, GRAPH_RESOURCE) {
            debug!("Cached access token is valid for '{}'", target);
            return Ok(());
        }

        let refresh_token = state
            .cache
            .refresh_token()
            .ok_or(TokenmanError::MissingRefreshToken)?
            .to_string();

        info!("Acquiring new token for: '{}'", target);
        let token = self
            .exchange_by_family(&refresh_token, target, None, &default_scopes())
            .await?;
        state.cache.apply(&token);

        Ok(())
    }
}

/// The scope list a caller falls back to: `.default`
pub fn default_scopes() -> Vec<String> {
    vec![crate::config::DEFAULT_SCOPE.to_string()]
}

/// Caller scopes unioned with the baseline, duplicates removed, caller order first
pub fn union_scopes(scopes: &[String]) -> Vec<String> {
    let mut union: Vec<String> = Vec::with_capacity(scopes.len() + BASELINE_SCOPES.len());
    let candidates = scopes
        .iter()
        .map(|s| s.trim())
        .chain(BASELINE_SCOPES.iter().copied());

    for scope in candidates {
        if !scope.is_empty() && !union.iter().any(|s| s == scope) {
            union.push(scope.to_string());
        }
    }
    union
}

/// Whether a token with `claims` can be used as-is for `target` or `resource`.
///
/// `target` may be a client id or a FOCI application name. Missing claims never match.
pub fn is_token_valid_for(claims: Option<&Claims>, target: &str, resource: &str) -> bool {
    let Some(claims) = claims else {
        return false;
    };

    if let Some(appid) = claims::claim_str(claims, "appid").or_else(|| claims::claim_str(claims, "azp")) {
        if appid == target {
            return true;
        }
        if FociRegistry::global().id_for_name(target) == Some(appid) {
            return true;
        }
    }

    if claims::claim_str(claims, "aud") == Some(resource) {
        return true;
    }

    match claims.get("scp") {
        Some(Value::String(scp)) => scp.split_whitespace().any(|s| s == resource),
        Some(Value::Array(scp)) => scp.iter().any(|s| s.as_str() == Some(resource)),
        _ => false,
    }
}

/// `application/x-www-form-urlencoded` body with spaces sent as `%20`
pub(crate) fn form_body(params: &[(&str, &str)]) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", form_encode(key), form_encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

fn form_encode(value: &str) -> String {
    // byte_serialize emits '+' only for spaces; literal '+' becomes %2B
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn parse_token_response(status: StatusCode, body: &str) -> Result<TokenResponse> {
    let json: Value = serde_json::from_str(body).map_err(|_| {
        TokenmanError::InvalidResponse(format!(
            "HTTP {}: {}",
            status,
            body.chars().take(200).collect::<String>()
        ))
    })?;

    if json.get("error").is_some() {
        let error: ProviderErrorResponse = serde_json::from_value(json)?;
        return Err(TokenmanError::Provider {
            description: error.description(),
            code: error.error,
        });
    }

    Ok(serde_json::from_value(json)?)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;
    use crate::cache::TokenCache;
    use crate::claims::test_support::jwt;
    use crate::store::MemorySink;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    const OFFICE: &str = "d3590ed6-52b3-4102-aeff-aad2292ab01c";

    fn broker(server: &MockServer) -> TokenBroker {
        let config =
            TokenmanConfig::default().with_endpoints(Endpoints::with_authority(&server.uri()));
        TokenBroker::new(&config).unwrap()
    }

    fn claims(value: Value) -> Claims {
        value.as_object().unwrap().clone()
    }

    fn form_pairs(request: &Request) -> Vec<(String, String)> {
        url::form_urlencoded::parse(&request.body)
            .into_owned()
            .collect()
    }

    fn sent_scopes(request: &Request) -> HashSet<String> {
        form_pairs(request)
            .into_iter()
            .find(|(k, _)| k == "scope")
            .map(|(_, v)| v.split(' ').map(str::to_string).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_union_scopes_dedups() {
        let once = union_scopes(&["mail.read".to_string()]);
        let twice = union_scopes(&["mail.read".to_string(), "mail.read".to_string()]);
        assert_eq!(once, twice);
        assert_eq!(once, vec!["mail.read", "profile", "openid", "offline_access"]);
    }

    #[test]
    fn test_union_scopes_with_baseline_overlap() {
        let union = union_scopes(&["openid".to_string(), ".default".to_string()]);
        assert_eq!(union, vec!["openid", ".default", "profile", "offline_access"]);
    }

    #[test]
    fn test_form_body_encodes_spaces_as_percent_20() {
        let body = form_body(&[("scope", ".default profile"), ("token", "a+b/c")]);
        assert_eq!(body, "scope=.default%20profile&token=a%2Bb%2Fc");
    }

    #[test]
    fn test_valid_for_same_appid_any_resource() {
        let claims = claims(json!({ "appid": "X", "aud": "https://vault.azure.net" }));
        assert!(is_token_valid_for(Some(&claims), "X", "https://graph.microsoft.com"));
        assert!(is_token_valid_for(Some(&claims), "X", "https://example.com"));
        assert!(!is_token_valid_for(Some(&claims), "Y", "https://graph.microsoft.com"));
    }

    #[test]
    fn test_valid_for_family_name() {
        let claims = claims(json!({ "appid": OFFICE, "aud": "https://vault.azure.net" }));
        assert!(is_token_valid_for(Some(&claims), "Microsoft Office", GRAPH_RESOURCE));
        assert!(!is_token_valid_for(Some(&claims), "Microsoft Teams", GRAPH_RESOURCE));
    }

    #[test]
    fn test_valid_for_audience_or_scope() {
        let by_aud = claims(json!({ "appid": "other", "aud": GRAPH_RESOURCE }));
        assert!(is_token_valid_for(Some(&by_aud), "Microsoft Office", GRAPH_RESOURCE));

        let by_scp = claims(json!({ "appid": "other", "scp": format!("Mail.Read {GRAPH_RESOURCE}") }));
        assert!(is_token_valid_for(Some(&by_scp), "Microsoft Office", GRAPH_RESOURCE));
    }

    #[test]
    fn test_missing_claims_never_match() {
        assert!(!is_token_valid_for(None, "X", GRAPH_RESOURCE));
        let empty = Claims::new();
        assert!(!is_token_valid_for(Some(&empty), "X", GRAPH_RESOURCE));
        let wrong_types = claims(json!({ "appid": 7, "aud": [1], "scp": 3 }));
        assert!(!is_token_valid_for(Some(&wrong_types), "X", GRAPH_RESOURCE));
    }

    #[tokio::test]
    async fn test_exchange_sends_scope_union_without_resource() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/common/oauth2/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at",
                "refresh_token": "rt2",
                "token_type": "Bearer",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = broker(&server)
            .exchange("R", OFFICE, None, &[".default".to_string()])
            .await
            .unwrap();
        assert_eq!(token.access_token, "at");
        assert_eq!(token.refresh_token.as_deref(), Some("rt2"));

        let requests = server.received_requests().await.unwrap();
        let raw = String::from_utf8(requests[0].body.clone()).unwrap();
        assert!(raw.contains("scope=.default%20profile%20openid%20offline_access"));
        assert!(!raw.contains("resource="));

        let pairs = form_pairs(&requests[0]);
        assert!(pairs.contains(&("client_id".to_string(), OFFICE.to_string())));
        assert!(pairs.contains(&("client_info".to_string(), "1".to_string())));
        assert!(pairs.contains(&("refresh_token".to_string(), "R".to_string())));
    }

    #[tokio::test]
    async fn test_exchange_duplicate_scopes_send_same_set() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/common/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "at" })))
            .expect(2)
            .mount(&server)
            .await;

        let broker = broker(&server);
        broker
            .exchange("R", OFFICE, None, &["mail.read".to_string(), "mail.read".to_string()])
            .await
            .unwrap();
        broker
            .exchange("R", OFFICE, None, &["mail.read".to_string()])
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(sent_scopes(&requests[0]), sent_scopes(&requests[1]));
        assert_eq!(sent_scopes(&requests[0]).len(), 4);
    }

    #[tokio::test]
    async fn test_exchange_includes_resource_when_set() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/common/oauth2/token"))
            .and(body_string_contains("resource="))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "at" })))
            .expect(1)
            .mount(&server)
            .await;

        broker(&server)
            .exchange("R", OFFICE, Some("https://management.core.windows.net"), &default_scopes())
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let pairs = form_pairs(&requests[0]);
        assert!(pairs.contains(&(
            "resource".to_string(),
            "https://management.core.windows.net".to_string()
        )));
    }

    #[tokio::test]
    async fn test_exchange_empty_resource_omitted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "at" })))
            .mount(&server)
            .await;

        broker(&server)
            .exchange("R", OFFICE, Some(""), &default_scopes())
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert!(!form_pairs(&requests[0]).iter().any(|(k, _)| k == "resource"));
    }

    #[tokio::test]
    async fn test_exchange_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "AADSTS70000: refresh token expired",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = broker(&server)
            .exchange("R", OFFICE, None, &default_scopes())
            .await;
        match result {
            Err(TokenmanError::Provider { code, description }) => {
                assert_eq!(code, "invalid_grant");
                assert!(description.starts_with("AADSTS70000"));
            }
            other => panic!("Expected provider error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exchange_non_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let result = broker(&server)
            .exchange("R", OFFICE, None, &default_scopes())
            .await;
        assert!(matches!(result, Err(TokenmanError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_exchange_transport_error() {
        let config = TokenmanConfig::default()
            .with_endpoints(Endpoints::with_authority("http://127.0.0.1:1"));
        let broker = TokenBroker::new(&config).unwrap();

        let result = broker.exchange("R", OFFICE, None, &default_scopes()).await;
        assert!(matches!(result, Err(TokenmanError::Transport(_))));
    }

    #[tokio::test]
    async fn test_exchange_by_family_resolves_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains(format!("client_id={OFFICE}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "at" })))
            .expect(1)
            .mount(&server)
            .await;

        broker(&server)
            .exchange_by_family("R", "Microsoft Office", None, &default_scopes())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_exchange_by_family_unknown_client() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let result = broker(&server)
            .exchange_by_family("R", "Clippy", None, &default_scopes())
            .await;
        assert!(matches!(result, Err(TokenmanError::UnknownClient(_))));
    }

    fn run_state(access_token: Option<String>, refresh_token: Option<&str>) -> RunState {
        RunState::new(
            TokenCache::new(access_token, refresh_token.map(str::to_string)),
            TokenmanConfig::default(),
            Arc::new(MemorySink::new()),
        )
    }

    #[tokio::test]
    async fn test_ensure_skips_exchange_for_valid_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let token = jwt(json!({ "appid": OFFICE }));
        let mut state = run_state(Some(token.clone()), Some("R"));
        broker(&server)
            .ensure(&mut state, "Microsoft Office")
            .await
            .unwrap();
        assert_eq!(state.cache.access_token(), Some(token.as_str()));
    }

    #[tokio::test]
    async fn test_ensure_exchanges_and_updates_cache() {
        let server = MockServer::start().await;
        let new_token = jwt(json!({ "appid": OFFICE, "aud": GRAPH_RESOURCE }));
        Mock::given(method("POST"))
            .and(path("/common/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": new_token,
                "refresh_token": "R2",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let stale = jwt(json!({ "appid": "1fec8e78-bce4-4aaf-ab1b-5451cc387264", "aud": "https://api.spaces.skype.com" }));
        let mut state = run_state(Some(stale), Some("R"));
        broker(&server)
            .ensure(&mut state, "Microsoft Office")
            .await
            .unwrap();

        assert_eq!(state.cache.access_token(), Some(new_token.as_str()));
        assert_eq!(state.cache.refresh_token(), Some("R2"));
    }

    #[tokio::test]
    async fn test_ensure_without_refresh_token() {
        let server = MockServer::start().await;
        let mut state = run_state(None, None);

        let result = broker(&server).ensure(&mut state, "Microsoft Office").await;
        assert!(matches!(result, Err(TokenmanError::MissingRefreshToken)));
    }
}
