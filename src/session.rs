//! Signed-in user state shared with the media views
//!
//! A [`SessionContext`] holds the current user and mirrors it into a
//! [`SessionStore`] under a single key so it survives a reload but not the
//! end of the browser session.

use crate::error::{MediaError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Key the session is persisted under
pub const SESSION_KEY: &str = "userInfo";

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRole", into = "u8")]
pub enum Role {
    Admin,
    User,
    Guest,
}

/// Role as the backend sends it: a number or a numeric string
#[derive(Deserialize)]
#[serde(untagged)]
enum RawRole {
    Number(i64),
    Text(String),
}

impl TryFrom<RawRole> for Role {
    type Error = String;

    fn try_from(raw: RawRole) -> std::result::Result<Self, Self::Error> {
        let code = match raw {
            RawRole::Number(n) => n,
            RawRole::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| format!("invalid role: {:?}", s))?,
        };
        Role::from_code(code).ok_or_else(|| format!("unknown role: {}", code))
    }
}

impl From<Role> for u8 {
    fn from(role: Role) -> u8 {
        role.code()
    }
}

impl Role {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Role::Admin),
            2 => Some(Role::User),
            3 => Some(Role::Guest),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Role::Admin => 1,
            Role::User => 2,
            Role::Guest => 3,
        }
    }
}

/// Profile returned by the backend on login
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(rename = "userID")]
    pub user_id: i64,

    #[serde(rename = "userName", default)]
    pub user_name: String,

    pub role: Role,

    #[serde(default)]
    pub token: String,

    /// Any other profile fields, kept as received
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Key-value storage scoped to one browser session
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

/// In-process [`SessionStore`]
#[derive(Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
    }
}

/// Access rule attached to a front-end route
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteAccess {
    pub requires_auth: bool,
    pub requires_role: Option<Vec<Role>>,
}

impl RouteAccess {
    /// Open to everyone
    pub fn public() -> Self {
        Self::default()
    }

    /// Any signed-in user
    pub fn authenticated() -> Self {
        RouteAccess {
            requires_auth: true,
            requires_role: None,
        }
    }

    /// Signed-in users holding one of `roles`
    pub fn roles(roles: &[Role]) -> Self {
        RouteAccess {
            requires_auth: true,
            requires_role: Some(roles.to_vec()),
        }
    }
}

/// Outcome of a route check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Proceed,
    RedirectLogin,
    RedirectHome,
}

impl Navigation {
    /// Target path for redirects
    pub fn target(&self) -> Option<&'static str> {
        match self {
            Navigation::Proceed => None,
            Navigation::RedirectLogin => Some("/login"),
            Navigation::RedirectHome => Some("/"),
        }
    }
}

/// The signed-in user, if any, and its persisted copy
pub struct SessionContext {
    store: Arc<dyn SessionStore>,
    user: Option<UserInfo>,
}

impl SessionContext {
    /// Start logged out
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        SessionContext { store, user: None }
    }

    /// Record `user` as signed in and persist it
    pub fn login(&mut self, mut user: UserInfo) -> Result<()> {
        if user.user_name.is_empty() {
            user.user_name = format!("用户{}", user.user_id);
        }
        let encoded = serde_json::to_string(&user)
            .map_err(|e| MediaError::Internal(format!("Failed to encode session: {}", e)))?;
        self.store.set(SESSION_KEY, encoded);
        debug!("Session started for user {}", user.user_id);
        self.user = Some(user);
        Ok(())
    }

    pub fn logout(&mut self) {
        self.user = None;
        self.store.remove(SESSION_KEY);
    }

    /// Reload the persisted session
    ///
    /// Data that no longer parses is removed and the session stays logged
    /// out. Returns whether a user was restored.
    pub fn restore(&mut self) -> bool {
        let Some(raw) = self.store.get(SESSION_KEY) else {
            return false;
        };
        match serde_json::from_str::<UserInfo>(&raw) {
            Ok(user) => {
                self.user = Some(user);
                true
            }
            Err(e) => {
                warn!("Discarding unreadable session data: {}", e);
                self.store.remove(SESSION_KEY);
                self.user = None;
                false
            }
        }
    }

    pub fn user(&self) -> Option<&UserInfo> {
        self.user.as_ref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }

    fn role(&self) -> Option<Role> {
        self.user.as_ref().map(|u| u.role)
    }

    pub fn is_admin(&self) -> bool {
        self.role() == Some(Role::Admin)
    }

    pub fn is_regular_user(&self) -> bool {
        self.role() == Some(Role::User)
    }

    pub fn is_guest(&self) -> bool {
        self.role() == Some(Role::Guest)
    }

    pub fn can_upload(&self) -> bool {
        matches!(self.role(), Some(Role::Admin | Role::User))
    }

    pub fn can_view_public_media(&self) -> bool {
        matches!(self.role(), Some(Role::Admin | Role::User))
    }

    /// Session token, empty when logged out
    pub fn token(&self) -> &str {
        self.user.as_ref().map(|u| u.token.as_str()).unwrap_or("")
    }

    /// `Authorization` header value for API calls
    pub fn bearer_token(&self) -> Option<String> {
        let token = self.token();
        (!token.is_empty()).then(|| format!("Bearer {}", token))
    }

    /// Decide whether navigation to a route may proceed
    pub fn check(&self, access: &RouteAccess) -> Navigation {
        if !access.requires_auth {
            return Navigation::Proceed;
        }
        let Some(user) = &self.user else {
            return Navigation::RedirectLogin;
        };
        match &access.requires_role {
            Some(roles) if !roles.contains(&user.role) => Navigation::RedirectHome,
            _ => Navigation::Proceed,
        }
    }
}
