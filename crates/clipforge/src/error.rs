use std::sync::Arc;

use reqwest::StatusCode;

/// Errors surfaced by the backend client.
///
/// Cheap to clone so a single failure can be handed to a status callback and
/// logged at the same time.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("request cancelled")]
    Cancelled,

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[source]
        source: Arc<reqwest::Error>,
    },

    #[error("request failed with HTTP {status} during {operation} for {url}{}", server_message(.message))]
    HttpStatus {
        status: StatusCode,
        url: String,
        operation: &'static str,
        /// `error` field of the response body, when the backend sent one.
        message: Option<String>,
    },

    #[error("malformed {operation} response: {reason}")]
    Payload {
        operation: &'static str,
        reason: String,
    },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },
}

fn server_message(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(": {m}"))
        .unwrap_or_default()
}

impl From<reqwest::Error> for ClientError {
    fn from(source: reqwest::Error) -> Self {
        Self::Network {
            source: Arc::new(source),
        }
    }
}

impl ClientError {
    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn http_status(
        status: StatusCode,
        url: impl Into<String>,
        operation: &'static str,
        message: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            operation,
            message,
        }
    }

    pub fn payload(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Payload {
            operation,
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// The transport failed before a response arrived.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// The backend answered, but not with something usable.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::HttpStatus { .. } | Self::Payload { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Message suitable for showing to a user: the backend's own error text
    /// when there is one, the full description otherwise.
    pub fn user_message(&self) -> String {
        match self {
            Self::HttpStatus {
                message: Some(message),
                ..
            } => message.clone(),
            other => other.to_string(),
        }
    }
}
