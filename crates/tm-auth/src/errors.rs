use thiserror::Error;

/// Token acquisition and credential cache error types
#[derive(Error, Debug)]
pub enum TokenmanError {
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Identity provider returned '{code}': {description}")]
    Provider { code: String, description: String },

    #[error("Failed to decode token: {0}")]
    Decode(String),

    #[error("Unknown client '{0}' - not a FOCI application name or client id")]
    UnknownClient(String),

    /// `status` is `None` when no response was received
    #[error(
        "Device code request failed ({}): {body_snippet}",
        status.map_or_else(|| "no response".to_string(), |s| format!("HTTP {s}"))
    )]
    DeviceCode {
        status: Option<reqwest::StatusCode>,
        body_snippet: String,
    },

    #[error("Device code authentication denied ({code}): {description}")]
    Denied { code: String, description: String },

    #[error("Device code poll failed ({code}): {description}")]
    Poll { code: String, description: String },

    #[error("Device code expired before authentication completed")]
    Expired,

    #[error("Device code poll worker stopped without a result")]
    PollWorker,

    #[error("Token is missing required claim '{missing_field}'")]
    IncompleteClaims { missing_field: &'static str },

    #[error("Missing refresh token - cannot perform token exchange")]
    MissingRefreshToken,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON serialization/deserialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TokenmanError>;
