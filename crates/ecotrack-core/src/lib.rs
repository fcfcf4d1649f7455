//! Core library for the EcoTrack client.
//!
//! - `auth`: token persistence and the session manager
//! - `api`: HTTP client for the EcoTrack REST backend
//! - `models`: request/response types exchanged with the backend
//! - `config`: on-disk application configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, ResponseBody};
pub use auth::{Session, SessionManager, SessionState, TokenKind, TokenStore};
pub use config::Config;
