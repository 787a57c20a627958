//! Server-side session records and storage.
//!
//! A session id (carried by the browser in a cookie) maps to one
//! [`SessionRecord`]. The record holds the transient PKCE/CSRF values of an
//! in-flight login, the authenticated session once login succeeds, and any
//! application data the HTTP layer keeps next to them.

use crate::error::OidcResult;
use crate::pkce::random_urlsafe;
use crate::types::{TokenSet, UserProfile};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

const SESSION_ID_BYTES: usize = 32;

/// `from` plus `seconds`, saturating at the latest representable instant.
pub(crate) fn expiry_after(from: DateTime<Utc>, seconds: u64) -> DateTime<Utc> {
    i64::try_from(seconds)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|ttl| from.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Opaque session identifier.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> OidcResult<Self> {
        random_urlsafe(SESSION_ID_BYTES).map(Self)
    }

    /// Wrap a value received from a cookie. Returns `None` for values that
    /// could not have been produced by [`SessionId::generate`].
    pub fn parse(value: &str) -> Option<Self> {
        let well_formed = value.len() == 43
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        well_formed.then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // first 8 chars are enough to correlate log lines
        write!(f, "SessionId({}…)", &self.0[..self.0.len().min(8)])
    }
}

/// PKCE and CSRF values of a login that is waiting for its callback.
#[derive(Clone, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub state: String,
    pub code_verifier: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingAuthorization {
    pub fn new(state: String, code_verifier: String, ttl_seconds: u64) -> Self {
        let created_at = Utc::now();
        let expires_at = expiry_after(created_at, ttl_seconds);

        Self {
            state,
            code_verifier,
            created_at,
            expires_at,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

impl std::fmt::Debug for PendingAuthorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAuthorization")
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Result of a completed login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedSession {
    pub tokens: TokenSet,
    pub profile: UserProfile,
    pub authenticated_at: DateTime<Utc>,
}

impl AuthenticatedSession {
    pub fn new(tokens: TokenSet, profile: UserProfile) -> Self {
        Self {
            tokens,
            profile,
            authenticated_at: Utc::now(),
        }
    }

    pub fn id_token(&self) -> Option<&str> {
        self.tokens.id_token.as_deref()
    }
}

/// Everything stored under one session id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub authorization: Option<PendingAuthorization>,
    pub authenticated: Option<AuthenticatedSession>,
    /// Application data kept alongside authentication state.
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(ttl_seconds: u64) -> Self {
        let created_at = Utc::now();
        Self {
            authorization: None,
            authenticated: None,
            data: HashMap::new(),
            created_at,
            expires_at: expiry_after(created_at, ttl_seconds),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Drop both authentication records, keeping application data.
    pub fn clear_authentication(&mut self) {
        self.authorization = None;
        self.authenticated = None;
    }
}

/// Storage for session records, scoped by session id.
///
/// Implementations must not expose one session's record through another id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Read a record. Expired records are reported as absent.
    async fn load(&self, id: &SessionId) -> OidcResult<Option<SessionRecord>>;

    /// Replace the whole record.
    async fn store(&self, id: &SessionId, record: SessionRecord) -> OidcResult<()>;

    /// Remove the record entirely.
    async fn destroy(&self, id: &SessionId) -> OidcResult<()>;

    /// Remove expired records, returning how many were dropped.
    async fn cleanup_expired(&self) -> OidcResult<usize>;
}

/// In-memory [`SessionStore`]; the map is sharded so sessions do not contend.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<DashMap<SessionId, SessionRecord>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, id: &SessionId) -> OidcResult<Option<SessionRecord>> {
        let record = self.sessions.get(id).map(|entry| entry.value().clone());
        match record {
            Some(record) if record.is_expired() => {
                self.sessions.remove(id);
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn store(&self, id: &SessionId, record: SessionRecord) -> OidcResult<()> {
        self.sessions.insert(id.clone(), record);
        Ok(())
    }

    async fn destroy(&self, id: &SessionId) -> OidcResult<()> {
        self.sessions.remove(id);
        Ok(())
    }

    async fn cleanup_expired(&self) -> OidcResult<usize> {
        let before = self.sessions.len();
        self.sessions.retain(|_, record| !record.is_expired());
        Ok(before.saturating_sub(self.sessions.len()))
    }
}
