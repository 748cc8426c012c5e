// Fixture Error Types
// Errors surfaced to the test runner by fixture commands and the API client

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FixtureError {
    // Session and token errors
    #[error("Failed to get the root user tokens: rights token denied for {username}")]
    Authorization { username: String },

    #[error("Could not get edit token")]
    Token { response: Value },

    // Fixture operation errors
    #[error("{0}")]
    OperationFailed(String),

    // MediaWiki API errors
    #[error("MediaWiki API error {code}: {info}")]
    Api { code: String, info: String },

    #[error("Unexpected API response: {0}")]
    UnexpectedResponse(String),

    // Network/HTTP errors
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("API request timed out")]
    Timeout,

    #[error("JSON error: {0}")]
    Json(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Command dispatch errors
    #[error("Unknown fixture command: {0}")]
    UnknownCommand(String),

    #[error("Invalid parameters for {command}: {reason}")]
    InvalidParams { command: String, reason: String },
}

impl FixtureError {
    /// Build an API error from the `error` object of an Action API response
    pub fn from_api_error(error: &Value) -> Self {
        FixtureError::Api {
            code: error["code"].as_str().unwrap_or("unknown").to_string(),
            info: error["info"].as_str().unwrap_or_default().to_string(),
        }
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for FixtureError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FixtureError::Timeout
        } else {
            FixtureError::Http(err.to_string())
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for FixtureError {
    fn from(err: serde_json::Error) -> Self {
        FixtureError::Json(err.to_string())
    }
}
