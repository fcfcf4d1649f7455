//! Authentication module for tokens and sessions.
//!
//! This module provides:
//! - `TokenStore`: persisted access/refresh tokens with legacy-key migration
//! - `KeyValueStore` backends: memory, JSON file, OS keychain
//! - `SessionManager`: current-user session with refresh-once-on-401

pub mod session;
pub mod store;
pub mod tokens;

pub use session::{Session, SessionManager, SessionState};
pub use store::{FileStore, KeyValueStore, KeyringStore, MemoryStore, StorageError};
pub use tokens::{TokenKind, TokenStore};
