use reqwest::StatusCode;
use thiserror::Error;

use super::body::ResponseBody;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Non-2xx response. `message` is the server's `detail` when it sent
    /// one, otherwise the status reason phrase.
    #[error("{message}")]
    Http {
        status: StatusCode,
        body: ResponseBody,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No access token in response")]
    MissingAccessToken,

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    #[error("Failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for response bodies in logs and error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(status: StatusCode, body: ResponseBody) -> Self {
        let message = body
            .detail()
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .or_else(|| status.canonical_reason().map(str::to_string))
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        ApiError::Http {
            status,
            body,
            message,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::Network(e) => e.status(),
            _ => None,
        }
    }

    pub fn body(&self) -> Option<&ResponseBody> {
        match self {
            ApiError::Http { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Only an explicit 401 response counts; transport failures never do.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Http { status, .. } if *status == StatusCode::UNAUTHORIZED)
    }

    /// The request never produced an HTTP response.
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::Transport(_))
    }

    /// Format a `{"field": ["msg", ...]}` validation body as
    /// `field: msg, msg` lines. `None` when the body has no such entries.
    pub fn field_errors(&self) -> Option<String> {
        let object = self.body()?.as_json()?.as_object()?;
        let lines: Vec<String> = object
            .iter()
            .filter(|(field, _)| field.as_str() != "detail")
            .filter_map(|(field, value)| {
                let messages: Vec<&str> = match value {
                    serde_json::Value::Array(items) => {
                        items.iter().filter_map(|m| m.as_str()).collect()
                    }
                    serde_json::Value::String(s) => vec![s.as_str()],
                    _ => Vec::new(),
                };
                if messages.is_empty() {
                    None
                } else {
                    Some(format!("{}: {}", field, messages.join(", ")))
                }
            })
            .collect();

        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }

    /// Message suitable for showing to a user: the server's `detail`,
    /// then field errors, then `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        if let Some(detail) = self.body().and_then(|b| b.detail()).filter(|d| !d.is_empty()) {
            return detail.to_string();
        }
        if let Some(fields) = self.field_errors() {
            return fields;
        }
        fallback.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_prefers_detail() {
        let err = ApiError::from_status(
            StatusCode::UNAUTHORIZED,
            ResponseBody::Json(json!({"detail": "Token is invalid or expired"})),
        );
        assert_eq!(err.to_string(), "Token is invalid or expired");
        assert!(err.is_unauthorized());
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_message_falls_back_to_reason_phrase() {
        let err = ApiError::from_status(
            StatusCode::INTERNAL_SERVER_ERROR,
            ResponseBody::Text("<html>oops</html>".to_string()),
        );
        assert_eq!(err.to_string(), "Internal Server Error");
        assert!(!err.is_unauthorized());

        let unknown = StatusCode::from_u16(599).expect("valid status code");
        let err = ApiError::from_status(unknown, ResponseBody::Empty);
        assert_eq!(err.to_string(), "HTTP 599");
    }

    #[test]
    fn test_field_errors_formatting() {
        let err = ApiError::from_status(
            StatusCode::BAD_REQUEST,
            ResponseBody::Json(json!({
                "email": ["Enter a valid email address."],
                "password": ["This password is too short.", "This password is too common."]
            })),
        );
        assert_eq!(
            err.field_errors().as_deref(),
            Some("email: Enter a valid email address.\npassword: This password is too short., This password is too common.")
        );
        assert_eq!(err.user_message("Signup failed"), err.field_errors().unwrap());
    }

    #[test]
    fn test_user_message_fallback() {
        let err = ApiError::Transport("connection refused".to_string());
        assert!(err.is_transport());
        assert_eq!(err.user_message("Login failed"), "Login failed");

        let err = ApiError::from_status(StatusCode::BAD_GATEWAY, ResponseBody::Empty);
        assert_eq!(err.field_errors(), None);
        assert_eq!(err.user_message("Login failed"), "Login failed");
    }

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        let short = "short body";
        assert_eq!(ApiError::truncate_body(short), short);

        let long = "é".repeat(400); // 800 bytes
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.ends_with("(truncated, 800 total bytes)"));
    }
}
