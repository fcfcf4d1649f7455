//! REST API client module for the EcoTrack backend.
//!
//! This module provides the `ApiClient` for talking to the EcoTrack API
//! (auth and user endpoints) over a pluggable `Transport`.
//!
//! The API uses JWT bearer token authentication; tokens come from the
//! `TokenStore` and are obtained through `/auth/login/`.

pub mod body;
pub mod client;
pub mod error;
pub mod transport;

pub use body::ResponseBody;
pub use client::{ApiClient, RequestOptions};
pub use error::ApiError;
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
