//! Error envelope returned on every failed request.
//!
//! Follows the OpenAI error shape so existing client SDKs can parse it:
//! `{"error": {"message": ..., "type": ..., "param": ..., "code": ...}}`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// A human-readable explanation specific to this occurrence.
    pub message: String,

    /// Broad error class, e.g. `invalid_request_error`.
    #[serde(rename = "type")]
    pub error_type: String,

    /// The request parameter the error relates to, if any.
    pub param: Option<String>,

    /// Machine-readable error code.
    pub code: Option<String>,
}

impl ErrorResponse {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                message: message.into(),
                error_type: error_type.into(),
                param: None,
                code: None,
            },
        }
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.error.param = Some(param.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.error.code = Some(code.into());
        self
    }

    // Common error constructors
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("invalid_request_error", message).with_code("bad_request")
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("authentication_error", message).with_code("invalid_api_key")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("invalid_request_error", message).with_code("not_found")
    }

    pub fn method_not_allowed() -> Self {
        Self::new("invalid_request_error", "Method not allowed for this route")
            .with_code("method_not_allowed")
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::new(
            "rate_limit_error",
            format!("Rate limit exceeded. Try again in {retry_after_secs} seconds."),
        )
        .with_code("rate_limit_exceeded")
    }

    pub fn bad_gateway() -> Self {
        Self::new("api_error", "The upstream model backend could not be reached")
            .with_code("bad_gateway")
    }

    pub fn internal_error() -> Self {
        Self::new("api_error", "Internal server error").with_code("internal_error")
    }
}
