//! Authorization gate for admin operations.
//!
//! Two capability classes exist: state inspection (read-only introspection)
//! and admin (mutating operations). A caller holding either of the following
//! gets both:
//! - a peer uid of root or of the daemon's own effective user
//! - a bearer token matching a super API key
//!
//! Decisions are computed per request and never cached.

use axum::http::{header, HeaderMap};

use crate::config::ApiKeyConfig;
use crate::net::ClientInfo;

/// What a handler needs the caller to be allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    StateInspection,
    Admin,
}

/// A configured API key.
#[derive(Debug, Clone)]
pub struct ApiKey {
    secret: String,
    is_super: bool,
}

impl ApiKey {
    pub fn new(secret: impl Into<String>, is_super: bool) -> Self {
        Self {
            secret: secret.into(),
            is_super,
        }
    }

    pub fn is_super(&self) -> bool {
        self.is_super
    }
}

impl From<&ApiKeyConfig> for ApiKey {
    fn from(config: &ApiKeyConfig) -> Self {
        Self::new(config.key.clone(), config.is_super)
    }
}

pub struct Authorizer {
    daemon_uid: u32,
    api_keys: Vec<ApiKey>,
}

impl Authorizer {
    pub fn new(daemon_uid: u32, api_keys: Vec<ApiKey>) -> Self {
        Self { daemon_uid, api_keys }
    }

    /// Authorizer for the running process's effective uid.
    pub fn for_current_process(api_keys: Vec<ApiKey>) -> Self {
        Self::new(effective_uid(), api_keys)
    }

    pub fn authorize(&self, capability: Capability, client: &ClientInfo, headers: &HeaderMap) -> bool {
        match capability {
            Capability::StateInspection => self.authorize_state_inspection(client, headers),
            Capability::Admin => self.authorize_admin(client, headers),
        }
    }

    pub fn authorize_state_inspection(&self, client: &ClientInfo, headers: &HeaderMap) -> bool {
        self.authorize_client(client, headers)
    }

    pub fn authorize_admin(&self, client: &ClientInfo, headers: &HeaderMap) -> bool {
        self.authorize_client(client, headers)
    }

    pub fn authorize_by_uid(&self, uid: u32) -> bool {
        uid == 0 || uid == self.daemon_uid
    }

    pub fn authorize_by_api_key(&self, key: &ApiKey) -> bool {
        key.is_super()
    }

    fn authorize_client(&self, client: &ClientInfo, headers: &HeaderMap) -> bool {
        if client.uid.is_some_and(|uid| self.authorize_by_uid(uid)) {
            return true;
        }
        bearer_token(headers)
            .and_then(|token| self.lookup(token))
            .is_some_and(|key| self.authorize_by_api_key(key))
    }

    fn lookup(&self, token: &str) -> Option<&ApiKey> {
        self.api_keys.iter().find(|key| key.secret == token)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn effective_uid() -> u32 {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() }
}
