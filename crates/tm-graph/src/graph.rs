use reqwest::{Client, header::ACCEPT};
use serde_json::{Map, Value, json};
use tm_auth::TokenmanConfig;
use tracing::{debug, instrument, warn};

use crate::errors::{GraphError, Result};

/// Default number of pages followed per fetch
pub const DEFAULT_PAGE_LIMIT: usize = 100;

/// Minimal Microsoft Graph client: paged collection reads and the search API
#[derive(Debug, Clone)]
pub struct GraphClient {
    http: Client,
    base: String,
}

impl GraphClient {
    pub fn new(config: &TokenmanConfig) -> Result<Self> {
        Ok(Self {
            http: config.http_client()?,
            base: config.endpoints.graph.trim_end_matches('/').to_string(),
        })
    }

    /// GET `path` and every `@odata.nextLink` after it, up to `page_limit` pages.
    ///
    /// Returns `{"@odata.context", "value"}` with the values of all pages. An error
    /// on the first page fails the fetch; an error on a later page ends pagination
    /// and keeps what was collected.
    #[instrument(skip(self, access_token))]
    pub async fn fetch(&self, access_token: &str, path: &str, page_limit: usize) -> Result<Value> {
        let mut url = Some(format!("{}/{}", self.base, path.trim_start_matches('/')));
        let mut context = Value::Null;
        let mut values = Vec::new();
        let mut pages = 0;

        while let Some(next) = url.take() {
            if pages >= page_limit {
                debug!("Page limit of {} reached", page_limit);
                break;
            }

            let mut page = match self.get_page(access_token, &next).await {
                Ok(page) => page,
                Err(e) if pages == 0 => return Err(e),
                Err(e) => {
                    warn!("Stopping pagination after {} pages: {}", pages, e);
                    break;
                }
            };
            pages += 1;

            if context.is_null() {
                context = page.get("@odata.context").cloned().unwrap_or(Value::Null);
            }
            if let Some(Value::Array(page_values)) = page.get_mut("value") {
                values.append(page_values);
            }
            url = page
                .get("@odata.nextLink")
                .and_then(Value::as_str)
                .map(str::to_string);
        }

        debug!("Fetched {} values over {} pages", values.len(), pages);
        Ok(json!({ "@odata.context": context, "value": values }))
    }

    /// Run one Microsoft Search query over `entity_types`
    #[instrument(skip(self, access_token))]
    pub async fn search(
        &self,
        access_token: &str,
        entity_types: &[&str],
        query: &str,
    ) -> Result<Value> {
        let body = json!({
            "requests": [{
                "entityTypes": entity_types,
                "query": { "queryString": query },
            }]
        });

        let response = self
            .http
            .post(format!("{}/search/query", self.base))
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;

        let text = response.text().await?;
        parse_graph_body(&text)
    }

    async fn get_page(&self, access_token: &str, url: &str) -> Result<Value> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let text = response.text().await?;
        parse_graph_body(&text)
    }
}

/// Parse a Graph or ARM JSON body, turning an `error` object into [`GraphError::Graph`]
pub(crate) fn parse_graph_body(text: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(text).map_err(|e| {
        GraphError::InvalidResponse(format!("Failed to parse response body: {e}"))
    })?;

    if let Some(error) = value.get("error") {
        return Err(GraphError::Graph {
            message: error_message(error),
        });
    }
    Ok(value)
}

fn error_message(error: &Value) -> String {
    match error {
        Value::Object(map) => message_of(map).unwrap_or_else(|| error.to_string()),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn message_of(map: &Map<String, Value>) -> Option<String> {
    map.get("message")
        .and_then(Value::as_str)
        .or_else(|| map.get("code").and_then(Value::as_str))
        .map(str::to_string)
}

/// Number of hits across every hits container of a search response
pub fn search_hit_count(response: &Value) -> usize {
    response
        .get("value")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|v| v.get("hitsContainers").and_then(Value::as_array))
        .flatten()
        .filter_map(|c| c.get("hits").and_then(Value::as_array))
        .map(Vec::len)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm_auth::Endpoints;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> GraphClient {
        let config =
            TokenmanConfig::default().with_endpoints(Endpoints::with_authority(&server.uri()));
        GraphClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_follows_next_link() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1.0/users"))
            .and(header("authorization", "Bearer at"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "@odata.context": "ctx",
                "@odata.nextLink": format!("{}/v1.0/users/page2", server.uri()),
                "value": [{ "id": "1" }, { "id": "2" }],
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1.0/users/page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "@odata.context": "other",
                "value": [{ "id": "3" }],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = client(&server)
            .await
            .fetch("at", "users", DEFAULT_PAGE_LIMIT)
            .await
            .unwrap();

        assert_eq!(result["@odata.context"], "ctx");
        assert_eq!(result["value"].as_array().unwrap().len(), 3);
        assert!(result.get("@odata.nextLink").is_none());
    }

    #[tokio::test]
    async fn test_fetch_respects_page_limit() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1.0/groups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "@odata.nextLink": format!("{}/v1.0/groups", server.uri()),
                "value": [{ "id": "g" }],
            })))
            .expect(2)
            .mount(&server)
            .await;

        let result = client(&server).await.fetch("at", "groups", 2).await.unwrap();
        assert_eq!(result["value"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_error_on_first_page() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1.0/organization"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": { "code": "Authorization_RequestDenied", "message": "Insufficient privileges" }
            })))
            .mount(&server)
            .await;

        let result = client(&server).await.fetch("at", "organization", 10).await;
        match result {
            Err(GraphError::Graph { message }) => assert_eq!(message, "Insufficient privileges"),
            other => panic!("Expected Graph error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_error_on_later_page_keeps_results() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1.0/applications"))
            .and(query_param("$top", "999"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "@odata.context": "ctx",
                "@odata.nextLink": format!("{}/v1.0/applications/next", server.uri()),
                "value": [{ "id": "a" }],
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1.0/applications/next"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "message": "Too many requests" }
            })))
            .mount(&server)
            .await;

        let result = client(&server)
            .await
            .fetch("at", "applications?$top=999", 10)
            .await
            .unwrap();
        assert_eq!(result["value"], json!([{ "id": "a" }]));
    }

    #[tokio::test]
    async fn test_search_request_shape() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1.0/search/query"))
            .and(body_json(json!({
                "requests": [{
                    "entityTypes": ["message"],
                    "query": { "queryString": "password OR username" },
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{ "hitsContainers": [{ "hits": [{ "hitId": "1" }, { "hitId": "2" }] }] }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = client(&server)
            .await
            .search("at", &["message"], "password OR username")
            .await
            .unwrap();
        assert_eq!(search_hit_count(&result), 2);
    }

    #[tokio::test]
    async fn test_search_error_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1.0/search/query"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "code": "BadRequest" }
            })))
            .mount(&server)
            .await;

        let result = client(&server).await.search("at", &["site"], "x").await;
        assert!(matches!(result, Err(GraphError::Graph { message }) if message == "BadRequest"));
    }

    #[test]
    fn test_search_hit_count_sums_containers() {
        let response = json!({
            "value": [
                { "hitsContainers": [{ "hits": [1, 2] }, { "hits": [3] }] },
                { "hitsContainers": [{ "total": 0 }] },
                {}
            ]
        });
        assert_eq!(search_hit_count(&response), 3);
        assert_eq!(search_hit_count(&json!({})), 0);
    }

    #[test]
    fn test_non_json_body() {
        assert!(matches!(
            parse_graph_body("<html>"),
            Err(GraphError::InvalidResponse(_))
        ));
    }
}
