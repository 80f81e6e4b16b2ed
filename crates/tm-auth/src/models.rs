use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Token endpoint response (refresh_token and device_code grants).
///
/// Fields the provider sends beyond the ones named here are kept in `extra`, so
/// serializing writes the response back out unmodified.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_info: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Device authorization response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub expires_in: u64,
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_interval() -> u64 {
    5
}

/// OAuth error body returned by the token and device code endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl ProviderErrorResponse {
    pub fn description(&self) -> String {
        self.error_description
            .clone()
            .unwrap_or_else(|| self.error.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_response_preserves_unknown_fields() {
        let body = json!({
            "token_type": "Bearer",
            "scope": "https://graph.microsoft.com/.default",
            "expires_in": "3599",
            "resource": "https://graph.microsoft.com",
            "access_token": "at",
            "refresh_token": "rt",
            "foci": "1",
        });

        let response: TokenResponse = serde_json::from_value(body.clone()).unwrap();
        assert_eq!(response.refresh_token.as_deref(), Some("rt"));
        assert!(response.id_token.is_none());
        assert_eq!(serde_json::to_value(&response).unwrap(), body);
    }

    #[test]
    fn test_device_code_default_interval() {
        let response: DeviceCodeResponse = serde_json::from_value(json!({
            "device_code": "dc",
            "user_code": "ABCD1234",
            "verification_uri": "https://microsoft.com/devicelogin",
            "expires_in": 900,
        }))
        .unwrap();
        assert_eq!(response.interval, 5);
    }

    #[test]
    fn test_provider_error_description_fallback() {
        let error: ProviderErrorResponse =
            serde_json::from_value(json!({ "error": "invalid_grant" })).unwrap();
        assert_eq!(error.description(), "invalid_grant");
    }
}
