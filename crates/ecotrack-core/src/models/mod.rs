//! Data models exchanged with the EcoTrack backend.
//!
//! - `UserRecord`: the current user's profile as returned by `/users/me/`
//! - Auth payloads: `LoginRequest`, `TokenResponse`, `RefreshResponse`, `TokenPair`
//! - Account payloads: `ProfileUpdate`, `PasswordChange`, `SignupRequest`

pub mod auth;
pub mod user;

pub use auth::{DetailResponse, LoginRequest, RefreshRequest, RefreshResponse, TokenPair, TokenResponse};
pub use user::{MyCollection, PasswordChange, ProfileUpdate, SignupRequest, UserRecord};
