use serde::{Deserialize, Serialize};

/// Credentials posted to `/auth/login/`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Body for the token-refresh and logout endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

/// Body returned by the login and token-refresh endpoints.
///
/// Both fields are optional on the wire; callers decide which ones are
/// required. Empty strings count as absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default)]
    pub refresh: Option<String>,
}

impl TokenResponse {
    pub fn access(&self) -> Option<&str> {
        self.access.as_deref().filter(|t| !t.is_empty())
    }

    pub fn refresh(&self) -> Option<&str> {
        self.refresh.as_deref().filter(|t| !t.is_empty())
    }
}

/// Body returned by the token-refresh endpoint. `refresh` is only present
/// when the server rotates refresh tokens.
pub type RefreshResponse = TokenResponse;

/// Access and refresh token held together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// `{ "detail": "..." }` acknowledgement body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetailResponse {
    #[serde(default)]
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_treats_empty_as_missing() {
        let resp: TokenResponse = serde_json::from_str(r#"{"access": "", "refresh": "R1"}"#)
            .expect("Failed to parse token response");
        assert_eq!(resp.access(), None);
        assert_eq!(resp.refresh(), Some("R1"));
    }

    #[test]
    fn test_token_response_without_refresh() {
        let resp: TokenResponse =
            serde_json::from_str(r#"{"access": "A2"}"#).expect("Failed to parse token response");
        assert_eq!(resp.access(), Some("A2"));
        assert_eq!(resp.refresh(), None);
    }
}
