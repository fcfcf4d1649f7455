//! API client for the EcoTrack REST backend.
//!
//! `ApiClient::request` is the single path every call goes through: it
//! attaches the stored bearer token, sets the JSON content type, reads the
//! body as text and classifies non-2xx responses into `ApiError::Http`.
//! It never retries; refresh-on-401 belongs to `SessionManager`.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::debug;

use super::body::ResponseBody;
use super::transport::{HttpRequest, ReqwestTransport, Transport};
use super::ApiError;
use crate::auth::TokenStore;
use crate::models::{
    DetailResponse, LoginRequest, MyCollection, PasswordChange, ProfileUpdate, RefreshRequest,
    RefreshResponse, SignupRequest, TokenResponse, UserRecord,
};

// ============================================================================
// Endpoints
// ============================================================================

const LOGIN_PATH: &str = "auth/login/";
const TOKEN_REFRESH_PATH: &str = "auth/token-refresh/";
const LOGOUT_PATH: &str = "auth/logout/";
const ME_PATH: &str = "users/me/";
const PASSWORD_PATH: &str = "users/me/password/";
const USERS_PATH: &str = "users/";

/// Per-request options for `ApiClient::request`.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<String>,
    /// Do not attach the stored access token (login, refresh, signup).
    pub skip_auth: bool,
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post() -> Self {
        Self::new(Method::POST)
    }

    pub fn patch() -> Self {
        Self::new(Method::PATCH)
    }

    /// Serialize `body` as the JSON request body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_string(body)?);
        Ok(self)
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(mut self, name: HeaderName, value: &str) -> Result<Self, ApiError> {
        let value =
            HeaderValue::from_str(value).map_err(|e| ApiError::InvalidHeader(e.to_string()))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }
}

/// API client for EcoTrack.
/// Clone is cheap - the transport and token store are shared.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    tokens: TokenStore,
}

impl ApiClient {
    /// Create a client that talks HTTP through reqwest.
    pub fn new(base_url: &str, tokens: TokenStore, timeout: Duration) -> Result<Self, ApiError> {
        let transport = ReqwestTransport::new(timeout)?;
        Ok(Self::with_transport(base_url, tokens, Arc::new(transport)))
    }

    pub fn with_transport(base_url: &str, tokens: TokenStore, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Resolve `path` against the base URL. Absolute URLs pass through.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send a request and return the parsed body of a 2xx response.
    pub async fn request(&self, path: &str, options: RequestOptions) -> Result<ResponseBody, ApiError> {
        let url = self.url(path);
        let mut headers = options.headers;

        if !options.skip_auth && !headers.contains_key(header::AUTHORIZATION) {
            if let Some(token) = self.tokens.access() {
                let value = HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| ApiError::InvalidHeader(e.to_string()))?;
                headers.insert(header::AUTHORIZATION, value);
            }
        }

        if options.body.is_some() && !headers.contains_key(header::CONTENT_TYPE) {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
        }

        debug!(method = %options.method, url = %url, "Sending request");
        let response = self
            .transport
            .send(HttpRequest {
                method: options.method.clone(),
                url: url.clone(),
                headers,
                body: options.body,
            })
            .await?;

        let status = response.status;
        if !status.is_success() {
            debug!(
                method = %options.method,
                url = %url,
                status = status.as_u16(),
                body = %ApiError::truncate_body(&response.body),
                "Request failed"
            );
            return Err(ApiError::from_status(status, ResponseBody::parse(response.body)));
        }

        Ok(ResponseBody::parse(response.body))
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let body = self.request(path, options).await?;
        Self::decode(body, path)
    }

    fn decode<T: DeserializeOwned>(body: ResponseBody, path: &str) -> Result<T, ApiError> {
        let value = match body {
            ResponseBody::Json(value) => value,
            ResponseBody::Empty => Value::Null,
            ResponseBody::Text(text) => {
                return Err(ApiError::InvalidResponse(format!(
                    "expected JSON from {}, got: {}",
                    path,
                    ApiError::truncate_body(&text)
                )))
            }
        };
        serde_json::from_value(value)
            .map_err(|e| ApiError::InvalidResponse(format!("unexpected JSON from {}: {}", path, e)))
    }

    /// Token endpoints must hand back an access token; anything else,
    /// including a non-JSON body, is `MissingAccessToken`.
    fn token_response(body: ResponseBody) -> Result<TokenResponse, ApiError> {
        let tokens: TokenResponse = body
            .as_json()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default();
        if tokens.access().is_none() {
            return Err(ApiError::MissingAccessToken);
        }
        Ok(tokens)
    }

    // ===== Auth =====

    /// Exchange credentials for a token pair. Does not store anything.
    pub async fn obtain_tokens(&self, credentials: &LoginRequest) -> Result<TokenResponse, ApiError> {
        let options = RequestOptions::post().json(credentials)?.skip_auth();
        let body = self.request(LOGIN_PATH, options).await?;
        Self::token_response(body)
    }

    /// Exchange a refresh token for a new access token (and possibly a
    /// rotated refresh token). Does not store anything.
    pub async fn refresh_access(&self, refresh: &str) -> Result<RefreshResponse, ApiError> {
        let options = RequestOptions::post()
            .json(&RefreshRequest { refresh })?
            .skip_auth();
        let body = self.request(TOKEN_REFRESH_PATH, options).await?;
        Self::token_response(body)
    }

    /// Ask the server to invalidate a refresh token.
    pub async fn revoke(&self, refresh: &str) -> Result<(), ApiError> {
        let options = RequestOptions::post().json(&RefreshRequest { refresh })?;
        self.request(LOGOUT_PATH, options).await?;
        Ok(())
    }

    // ===== Users =====

    pub async fn fetch_me(&self) -> Result<UserRecord, ApiError> {
        self.request_json(ME_PATH, RequestOptions::get()).await
    }

    pub async fn update_me(&self, update: &ProfileUpdate) -> Result<UserRecord, ApiError> {
        self.request_json(ME_PATH, RequestOptions::patch().json(update)?)
            .await
    }

    pub async fn change_password(&self, change: &PasswordChange) -> Result<DetailResponse, ApiError> {
        self.request_json(PASSWORD_PATH, RequestOptions::post().json(change)?)
            .await
    }

    pub async fn signup(&self, request: &SignupRequest) -> Result<UserRecord, ApiError> {
        let options = RequestOptions::post().json(request)?.skip_auth();
        self.request_json(USERS_PATH, options).await
    }

    /// Patch an arbitrary user by id (admin screens).
    pub async fn update_user(&self, id: i64, fields: &Value) -> Result<UserRecord, ApiError> {
        let path = format!("{}{}/", USERS_PATH, id);
        self.request_json(&path, RequestOptions::patch().json(fields)?)
            .await
    }

    pub async fn fetch_my_collection(&self, which: MyCollection) -> Result<Vec<Value>, ApiError> {
        self.request_json(which.path(), RequestOptions::get()).await
    }
}
