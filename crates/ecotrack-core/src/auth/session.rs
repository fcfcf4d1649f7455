//! Session management on top of `ApiClient` and `TokenStore`.
//!
//! A session moves between three states:
//! - `Anonymous`: no access token
//! - `Pending`: access token held, identity not yet confirmed
//! - `Authenticated`: access token and user record both held
//!
//! Refresh is purely reactive. When an authorized call comes back 401 and a
//! refresh token is stored, the manager refreshes once and retries the call
//! once. A second 401, a failed refresh, or a 401 with no refresh token
//! clears the stored tokens and drops the session to `Anonymous`.
//!
//! Logout racing an in-flight refresh is not coordinated: whichever write
//! lands last wins.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::TokenStore;
use crate::api::{ApiClient, ApiError};
use crate::models::{
    DetailResponse, LoginRequest, MyCollection, PasswordChange, ProfileUpdate, UserRecord,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Pending,
    Authenticated,
}

/// Snapshot of the in-memory session. Never persisted; rebuilt from the
/// token store at startup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub user: Option<UserRecord>,
    pub access_token: Option<String>,
    /// When the user record was last confirmed by the server.
    pub authenticated_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    fn pending(access_token: String) -> Self {
        Self {
            user: None,
            access_token: Some(access_token),
            authenticated_at: None,
        }
    }

    /// True only when both a user record and an access token are held.
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.access_token.is_some()
    }

    pub fn state(&self) -> SessionState {
        match (&self.access_token, &self.user) {
            (None, _) => SessionState::Anonymous,
            (Some(_), None) => SessionState::Pending,
            (Some(_), Some(_)) => SessionState::Authenticated,
        }
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user.as_ref().map(|u| u.id)
    }
}

pub struct SessionManager {
    api: ApiClient,
    tokens: TokenStore,
    state: watch::Sender<Session>,
}

impl SessionManager {
    /// Create an anonymous session manager. Call `restore` to pick up
    /// tokens persisted by an earlier run.
    pub fn new(api: ApiClient) -> Self {
        let tokens = api.tokens().clone();
        let (state, _) = watch::channel(Session::anonymous());
        Self { api, tokens, state }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Current session snapshot.
    pub fn session(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// Receive every session change.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// Rebuild the session from the token store: a stored access token moves
    /// the session to `Pending`, then the current user is fetched.
    pub async fn restore(&self) -> Result<Session, ApiError> {
        match self.tokens.access() {
            Some(token) => {
                debug!("Found stored access token");
                self.publish(Session::pending(token));
                self.reload_me().await
            }
            None => {
                self.publish(Session::anonymous());
                Ok(self.session())
            }
        }
    }

    /// Exchange credentials for tokens, store them, then confirm the user.
    /// Rejected credentials or a response without an access token fail
    /// without touching the stored tokens.
    pub async fn login(&self, credentials: &LoginRequest) -> Result<Session, ApiError> {
        let issued = match self.api.obtain_tokens(credentials).await {
            Ok(issued) => issued,
            Err(e) => {
                warn!(status = ?e.status(), error = %e, "Login failed");
                return Err(e);
            }
        };
        let access = issued.access().ok_or(ApiError::MissingAccessToken)?;

        self.tokens.clear();
        self.tokens.write(access, issued.refresh());
        info!("Login accepted, confirming user");

        self.publish(Session::pending(access.to_string()));
        self.reload_me().await
    }

    /// Fetch the current user for the session's access token.
    ///
    /// Any failure that survives the refresh policy, including transport
    /// errors, clears the tokens and leaves the session `Anonymous`; the
    /// error is still returned to the caller.
    pub async fn reload_me(&self) -> Result<Session, ApiError> {
        let has_token = self.state.borrow().access_token.is_some();
        if !has_token {
            self.publish(Session::anonymous());
            return Ok(self.session());
        }

        let api = self.api.clone();
        let result = self
            .with_refresh(|| {
                let api = api.clone();
                async move { api.fetch_me().await }
            })
            .await;

        match result {
            Ok(user) => {
                info!(user_id = user.id, "Session authenticated");
                self.state.send_modify(|session| {
                    session.user = Some(user);
                    session.authenticated_at = Some(Utc::now());
                });
                Ok(self.session())
            }
            Err(e) => {
                warn!(error = %e, "Could not confirm current user, clearing session");
                self.reset();
                Err(e)
            }
        }
    }

    /// Use the stored refresh token to get a new access token.
    ///
    /// The new token is stored and, if the session already holds a token,
    /// swapped into it. An `Anonymous` session is left as is.
    pub async fn refresh(&self) -> Result<String, ApiError> {
        let refresh = self.tokens.refresh().ok_or(ApiError::NoRefreshToken)?;
        self.refresh_with(&refresh).await
    }

    /// Notify the server (best effort), then always clear local state.
    pub async fn logout(&self) {
        if let Some(refresh) = self.tokens.refresh() {
            if let Err(e) = self.api.revoke(&refresh).await {
                warn!(error = %e, "Server-side logout failed, clearing local session anyway");
            }
        }
        self.reset();
        info!("Logged out");
    }

    /// Patch the current user's profile and adopt the returned record.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserRecord, ApiError> {
        let api = self.api.clone();
        let user = self
            .with_refresh(|| {
                let api = api.clone();
                async move { api.update_me(update).await }
            })
            .await?;

        let updated = user.clone();
        self.state.send_modify(|session| {
            if session.access_token.is_some() {
                session.user = Some(updated);
                session.authenticated_at = Some(Utc::now());
            }
        });
        Ok(user)
    }

    pub async fn change_password(&self, change: &PasswordChange) -> Result<DetailResponse, ApiError> {
        let api = self.api.clone();
        self.with_refresh(|| {
            let api = api.clone();
            async move { api.change_password(change).await }
        })
        .await
    }

    pub async fn my_collection(&self, which: MyCollection) -> Result<Vec<Value>, ApiError> {
        let api = self.api.clone();
        self.with_refresh(|| {
            let api = api.clone();
            async move { api.fetch_my_collection(which).await }
        })
        .await
    }

    /// Run an authorized call, refreshing and retrying at most once on 401.
    async fn with_refresh<T, F, Fut>(&self, call: F) -> Result<T, ApiError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let err = match call().await {
            Err(err) if err.is_unauthorized() => err,
            other => return other,
        };

        let Some(refresh) = self.tokens.refresh() else {
            debug!("Access token rejected and no refresh token stored");
            self.reset();
            return Err(err);
        };

        debug!("Access token rejected, refreshing");
        if let Err(e) = self.refresh_with(&refresh).await {
            warn!(error = %e, "Token refresh failed");
            self.reset();
            return Err(e);
        }

        match call().await {
            Err(err) if err.is_unauthorized() => {
                warn!("Request rejected again after refresh");
                self.reset();
                Err(err)
            }
            other => other,
        }
    }

    async fn refresh_with(&self, refresh: &str) -> Result<String, ApiError> {
        let issued = self.api.refresh_access(refresh).await?;
        let access = issued
            .access()
            .ok_or(ApiError::MissingAccessToken)?
            .to_string();

        // Servers that rotate refresh tokens send the new one along
        let next_refresh = issued.refresh().unwrap_or(refresh);
        self.tokens.write(&access, Some(next_refresh));

        // An anonymous session stays anonymous; `restore` picks the token up
        let token = access.clone();
        self.state.send_if_modified(|session| {
            if session.access_token.is_none() {
                return false;
            }
            session.access_token = Some(token);
            true
        });
        debug!("Access token refreshed");
        Ok(access)
    }

    fn reset(&self) {
        self.tokens.clear();
        self.publish(Session::anonymous());
    }

    fn publish(&self, session: Session) {
        self.state.send_replace(session);
    }
}
