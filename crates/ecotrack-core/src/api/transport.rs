//! The network seam under `ApiClient`.
//!
//! `ApiClient` builds a fully-formed `HttpRequest` (URL, headers, body) and
//! hands it to a `Transport`, which only has to deliver it and return the
//! status and raw body text.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};

use super::ApiError;

/// Connect timeout in seconds, independent of the overall request timeout.
const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: String,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

/// `Transport` backed by a pooled `reqwest::Client`.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted transport for unit tests.

    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use super::*;

    pub(crate) const BASE_URL: &str = "http://api.test";

    type Route = (Method, String);

    /// Answers requests from per-route queues and records every request.
    /// A route with an empty queue answers with a transport error.
    #[derive(Default)]
    pub(crate) struct MockTransport {
        routes: Mutex<HashMap<Route, VecDeque<Result<HttpResponse, String>>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl MockTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Queue a response for `method` + `path` (relative to `BASE_URL`).
        pub(crate) fn respond(&self, method: Method, path: &str, status: u16, body: &str) -> &Self {
            let response = HttpResponse {
                status: StatusCode::from_u16(status).expect("valid status code"),
                body: body.to_string(),
            };
            self.push(method, path, Ok(response));
            self
        }

        /// Queue a transport-level failure for `method` + `path`.
        pub(crate) fn fail(&self, method: Method, path: &str, message: &str) -> &Self {
            self.push(method, path, Err(message.to_string()));
            self
        }

        fn push(&self, method: Method, path: &str, outcome: Result<HttpResponse, String>) {
            self.routes
                .lock()
                .unwrap()
                .entry((method, path.trim_start_matches('/').to_string()))
                .or_default()
                .push_back(outcome);
        }

        pub(crate) fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub(crate) fn count(&self, method: Method, path: &str) -> usize {
            let url = format!("{}/{}", BASE_URL, path.trim_start_matches('/'));
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.method == method && r.url == url)
                .count()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            self.requests.lock().unwrap().push(request.clone());

            let path = request
                .url
                .strip_prefix(BASE_URL)
                .unwrap_or(&request.url)
                .trim_start_matches('/')
                .to_string();
            let outcome = self
                .routes
                .lock()
                .unwrap()
                .get_mut(&(request.method.clone(), path.clone()))
                .and_then(|queue| queue.pop_front());

            match outcome {
                Some(Ok(response)) => Ok(response),
                Some(Err(message)) => Err(ApiError::Transport(message)),
                None => Err(ApiError::Transport(format!(
                    "no scripted response for {} {}",
                    request.method, path
                ))),
            }
        }
    }
}
