//! Persisted access/refresh tokens.
//!
//! Tokens live under canonical keys. Older clients wrote them under a
//! handful of other names, so reads fall back to those legacy keys and copy
//! the first hit to the canonical key. Writes mirror each token into one
//! legacy key so older readers keep working.
//!
//! Storage failures never surface from here: they are logged and read as
//! "no token".

use std::sync::Arc;

use tracing::{debug, warn};

use super::store::KeyValueStore;
use crate::models::TokenPair;

const ACCESS_KEY: &str = "accessToken";
const REFRESH_KEY: &str = "refreshToken";

/// Checked in order when the canonical access key is empty.
const LEGACY_ACCESS_KEYS: &[&str] = &["access", "access_token", "jwt", "token"];

/// Checked in order when the canonical refresh key is empty.
const LEGACY_REFRESH_KEYS: &[&str] = &["refresh", "refresh_token"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn canonical_key(&self) -> &'static str {
        match self {
            TokenKind::Access => ACCESS_KEY,
            TokenKind::Refresh => REFRESH_KEY,
        }
    }

    pub fn legacy_keys(&self) -> &'static [&'static str] {
        match self {
            TokenKind::Access => LEGACY_ACCESS_KEYS,
            TokenKind::Refresh => LEGACY_REFRESH_KEYS,
        }
    }

    /// The legacy key that `TokenStore::write` keeps in sync.
    pub fn mirror_key(&self) -> &'static str {
        self.legacy_keys()[0]
    }
}

/// Token persistence over any `KeyValueStore`.
/// Clone is cheap and clones share the same backend.
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Read a token, migrating it from a legacy key if needed.
    pub fn read(&self, kind: TokenKind) -> Option<String> {
        let canonical = kind.canonical_key();
        if let Some(value) = self.get(canonical) {
            return Some(value);
        }

        for legacy in kind.legacy_keys() {
            if let Some(value) = self.get(legacy) {
                debug!(from = *legacy, to = canonical, "Migrating legacy token key");
                self.set(canonical, &value);
                return Some(value);
            }
        }
        None
    }

    pub fn access(&self) -> Option<String> {
        self.read(TokenKind::Access)
    }

    pub fn refresh(&self) -> Option<String> {
        self.read(TokenKind::Refresh)
    }

    /// Both tokens, when both are stored.
    pub fn pair(&self) -> Option<TokenPair> {
        Some(TokenPair {
            access: self.access()?,
            refresh: self.refresh()?,
        })
    }

    /// Store the access token and, when given, the refresh token.
    /// A missing refresh token leaves the stored one untouched.
    pub fn write(&self, access: &str, refresh: Option<&str>) {
        self.set(TokenKind::Access.canonical_key(), access);
        self.set(TokenKind::Access.mirror_key(), access);

        if let Some(refresh) = refresh.filter(|r| !r.is_empty()) {
            self.set(TokenKind::Refresh.canonical_key(), refresh);
            self.set(TokenKind::Refresh.mirror_key(), refresh);
        }
    }

    /// Remove canonical and every legacy key.
    pub fn clear(&self) {
        for kind in [TokenKind::Access, TokenKind::Refresh] {
            self.remove(kind.canonical_key());
            for legacy in kind.legacy_keys() {
                self.remove(legacy);
            }
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        match self.backend.get(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!(key = key, error = %e, "Token storage read failed");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) {
        if let Err(e) = self.backend.set(key, value) {
            warn!(key = key, error = %e, "Token storage write failed");
        }
    }

    fn remove(&self, key: &str) {
        if let Err(e) = self.backend.remove(key) {
            warn!(key = key, error = %e, "Token storage remove failed");
        }
    }
}
