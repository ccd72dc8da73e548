use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Configuration errors
    ConfigMissingApiKey,
    ConfigInvalidHost,
    ConfigInvalidValue,

    // Validation errors
    ValidationMissingField,
    ValidationInvalidValue,
    ValidationEmptyBatch,

    // Network errors
    NetworkError,
    NetworkTimeout,
    NetworkRuntimeUnavailable,

    // HTTP errors
    HttpBadRequest,
    HttpUnauthorized,
    HttpForbidden,
    HttpNotFound,
    HttpConflict,
    HttpRateLimited,
    HttpClientError,
    HttpServerError,
    HttpInvalidResponse,

    // Event errors
    EventSerializationFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingApiKey => "CONFIG_MISSING_API_KEY",
            ErrorCode::ConfigInvalidHost => "CONFIG_INVALID_HOST",
            ErrorCode::ConfigInvalidValue => "CONFIG_INVALID_VALUE",
            ErrorCode::ValidationMissingField => "VALIDATION_MISSING_FIELD",
            ErrorCode::ValidationInvalidValue => "VALIDATION_INVALID_VALUE",
            ErrorCode::ValidationEmptyBatch => "VALIDATION_EMPTY_BATCH",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::NetworkTimeout => "NETWORK_TIMEOUT",
            ErrorCode::NetworkRuntimeUnavailable => "NETWORK_RUNTIME_UNAVAILABLE",
            ErrorCode::HttpBadRequest => "HTTP_BAD_REQUEST",
            ErrorCode::HttpUnauthorized => "HTTP_UNAUTHORIZED",
            ErrorCode::HttpForbidden => "HTTP_FORBIDDEN",
            ErrorCode::HttpNotFound => "HTTP_NOT_FOUND",
            ErrorCode::HttpConflict => "HTTP_CONFLICT",
            ErrorCode::HttpRateLimited => "HTTP_RATE_LIMITED",
            ErrorCode::HttpClientError => "HTTP_CLIENT_ERROR",
            ErrorCode::HttpServerError => "HTTP_SERVER_ERROR",
            ErrorCode::HttpInvalidResponse => "HTTP_INVALID_RESPONSE",
            ErrorCode::EventSerializationFailed => "EVENT_SERIALIZATION_FAILED",
        }
    }

    /// Whether a failure with this code may succeed if the request is sent again.
    ///
    /// Only transport-level outcomes qualify: no response at all, a 5xx status
    /// or a 429. Everything else is surfaced to the caller on the first attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::NetworkError
                | ErrorCode::NetworkTimeout
                | ErrorCode::HttpServerError
                | ErrorCode::HttpRateLimited
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry of `validation_errors` in an API error body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiValidationError {
    pub code: String,
    pub detail: String,
    #[serde(default)]
    pub attr: Option<String>,
}

/// Error body returned by the billing API on non-2xx responses.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub validation_errors: Option<Vec<ApiValidationError>>,
}

impl ApiErrorBody {
    /// Parses an error body, returning `None` if it does not follow the API convention.
    pub fn parse(body: &str) -> Option<Self> {
        let parsed: Self = serde_json::from_str(body).ok()?;
        if parsed.error_type.is_none() && parsed.title.is_none() && parsed.detail.is_none() {
            return None;
        }
        Some(parsed)
    }

    /// Short human readable summary used in error messages.
    pub fn summary(&self) -> Option<String> {
        match (&self.title, &self.detail) {
            (Some(title), Some(detail)) => Some(format!("{}: {}", title, detail)),
            (Some(title), None) => Some(title.clone()),
            (None, Some(detail)) => Some(detail.clone()),
            (None, None) => None,
        }
    }
}

#[derive(Error, Debug)]
#[error("[{code}] {message}")]
pub struct LotusError {
    pub code: ErrorCode,
    pub message: String,
    /// HTTP status of the response that produced this error, if one was received.
    pub status: Option<u16>,
    /// Decoded API error body, when the response carried one.
    pub details: Option<ApiErrorBody>,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl LotusError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            details: None,
            source: None,
        }
    }

    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            details: None,
            source: Some(Box::new(source)),
        }
    }

    /// Builds the error for a non-2xx response.
    pub fn from_status(status: u16, body: &str) -> Self {
        let code = match status {
            400 => ErrorCode::HttpBadRequest,
            401 => ErrorCode::HttpUnauthorized,
            403 => ErrorCode::HttpForbidden,
            404 => ErrorCode::HttpNotFound,
            409 => ErrorCode::HttpConflict,
            429 => ErrorCode::HttpRateLimited,
            500..=599 => ErrorCode::HttpServerError,
            _ => ErrorCode::HttpClientError,
        };

        let details = ApiErrorBody::parse(body);
        let message = match details.as_ref().and_then(ApiErrorBody::summary) {
            Some(summary) => format!("Request failed with status {}: {}", status, summary),
            None if body.is_empty() => format!("Request failed with status {}", status),
            None => format!("Request failed with status {}: {}", status, body),
        };

        Self {
            code,
            message,
            status: Some(status),
            details,
            source: None,
        }
    }

    pub fn config_error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message)
    }

    pub fn missing_api_key() -> Self {
        Self::new(ErrorCode::ConfigMissingApiKey, "Api Key is required")
    }

    /// Validation failure naming the missing field.
    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::ValidationMissingField,
            format!("{} is a required key", field),
        )
    }

    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationInvalidValue, message)
    }

    pub fn network_error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    pub fn is_config_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::ConfigMissingApiKey
                | ErrorCode::ConfigInvalidHost
                | ErrorCode::ConfigInvalidValue
        )
    }

    pub fn is_validation_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::ValidationMissingField
                | ErrorCode::ValidationInvalidValue
                | ErrorCode::ValidationEmptyBatch
        )
    }

    /// True when no response was received at all.
    pub fn is_network_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::NetworkError | ErrorCode::NetworkTimeout
        )
    }

    pub fn is_http_error(&self) -> bool {
        self.status.is_some()
    }
}

pub type Result<T> = std::result::Result<T, LotusError>;
