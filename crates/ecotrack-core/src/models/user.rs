//! User profile models.
//!
//! The session layer only depends on `UserRecord::id`; the remaining
//! profile fields are typed for convenience and anything the backend adds
//! later is kept in `extra` so the record survives a round trip.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub phone_number: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub profile_complete: Option<bool>,
    /// City id; the expanded city lives in `extra["city_detail"]`.
    pub city: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserRecord {
    /// Best human-readable label: full name, then username, then email.
    pub fn display_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or("").trim();
        let last = self.last_name.as_deref().unwrap_or("").trim();
        let full = format!("{} {}", first, last);
        let full = full.trim();
        if !full.is_empty() {
            return full.to_string();
        }
        self.username
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.email.as_deref().filter(|s| !s.is_empty()))
            .map(str::to_string)
            .unwrap_or_else(|| format!("user #{}", self.id))
    }
}

/// Partial update for `PATCH /users/me/`. Unset fields are not sent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<i64>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.avatar.is_none()
            && self.bio.is_none()
            && self.phone_number.is_none()
            && self.date_of_birth.is_none()
            && self.gender.is_none()
            && self.city.is_none()
    }
}

/// Body for `POST /users/me/password/`.
#[derive(Debug, Clone, Serialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
    pub re_new_password: String,
}

/// Registration payload for `POST /users/`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<i64>,
}

/// Per-user lists served under `/users/me/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MyCollection {
    Actions,
    Challenges,
    Leaderboard,
}

impl MyCollection {
    pub fn path(&self) -> &'static str {
        match self {
            MyCollection::Actions => "users/me/actions/",
            MyCollection::Challenges => "users/me/challenges/",
            MyCollection::Leaderboard => "users/me/leaderboard/",
        }
    }
}
