//! Login state machine: Anonymous → PendingAuthorization → Authenticated.

use crate::client::OidcClient;
use crate::config::OidcConfig;
use crate::error::{OidcError, OidcResult};
use crate::pkce::{PkcePair, generate_state, state_matches};
use crate::session::{
    AuthenticatedSession, PendingAuthorization, SessionId, SessionRecord, SessionStore,
    expiry_after,
};
use crate::types::CallbackParams;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Where a session currently is in the login lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    PendingAuthorization,
    Authenticated,
}

/// A successful callback. The record has moved to `session_id`, which
/// replaces the id the browser presented during login.
#[derive(Debug, Clone)]
pub struct CompletedLogin {
    pub session_id: SessionId,
    pub session: AuthenticatedSession,
}

/// Drives the authorization code flow for sessions held in a [`SessionStore`].
#[derive(Clone)]
pub struct AuthFlow {
    client: OidcClient,
    store: Arc<dyn SessionStore>,
    pending_ttl_seconds: u64,
    session_ttl_seconds: u64,
}

impl AuthFlow {
    pub fn new(config: &OidcConfig, store: Arc<dyn SessionStore>) -> OidcResult<Self> {
        config.validate()?;
        let client = OidcClient::from_config(config)?;

        Ok(Self {
            client,
            store,
            pending_ttl_seconds: config.pending_ttl_seconds,
            session_ttl_seconds: config.session_ttl_seconds,
        })
    }

    pub fn client(&self) -> &OidcClient {
        &self.client
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Id to start a login under: the presented one if the store holds a live
    /// record for it, otherwise a freshly generated id.
    pub async fn login_session_id(&self, presented: Option<SessionId>) -> OidcResult<SessionId> {
        if let Some(id) = presented {
            if self.store.load(&id).await?.is_some() {
                return Ok(id);
            }
            debug!("Presented session id is unknown, issuing a new one");
        }
        SessionId::generate()
    }

    /// Begin a login and return the URL to redirect the browser to.
    ///
    /// Any earlier pending authorization or authenticated session of this
    /// session id is discarded; application data is kept.
    #[instrument(skip_all, fields(session = ?session_id))]
    pub async fn start_login(&self, session_id: &SessionId) -> OidcResult<Url> {
        let mut record = self
            .store
            .load(session_id)
            .await?
            .unwrap_or_else(|| SessionRecord::new(self.pending_ttl_seconds));
        record.clear_authentication();

        let pkce = PkcePair::generate()?;
        let state = generate_state()?;
        let url = self
            .client
            .authorization_url(&pkce.code_challenge, &state, &self.client.provider().scopes);

        let pending = PendingAuthorization::new(state, pkce.code_verifier, self.pending_ttl_seconds);
        // the record must outlive its pending authorization
        record.expires_at = record.expires_at.max(pending.expires_at);
        record.authorization = Some(pending);
        self.store.store(session_id, record).await?;

        info!("Started authorization");
        Ok(url)
    }

    /// Complete a login from the provider's redirect.
    ///
    /// The pending authorization is consumed before any request leaves the
    /// process, so a callback can succeed at most once. Every failure leaves
    /// the session anonymous. On success the record is moved to a new session
    /// id and the presented one stops working.
    #[instrument(skip_all, fields(session = ?session_id))]
    pub async fn handle_callback(
        &self,
        session_id: &SessionId,
        params: CallbackParams,
    ) -> OidcResult<CompletedLogin> {
        let pending = self.take_pending(session_id).await?;

        let pending = match (pending, params.state.as_deref()) {
            (Some(pending), Some(state))
                if !state.is_empty() && !pending.is_expired() && state_matches(&pending.state, state) =>
            {
                pending
            }
            (Some(pending), _) if pending.is_expired() => {
                warn!("Callback arrived after the pending authorization expired");
                return Err(OidcError::InvalidState);
            }
            (None, _) => {
                warn!("Callback without a pending authorization");
                return Err(OidcError::InvalidState);
            }
            _ => {
                warn!("Callback state does not match the pending authorization");
                return Err(OidcError::InvalidState);
            }
        };

        if let Some(error) = params.error {
            warn!(%error, "Provider denied the authorization request");
            return Err(OidcError::AuthorizationDenied {
                error,
                description: params.error_description,
            });
        }

        let code = params
            .code
            .filter(|code| !code.is_empty())
            .ok_or(OidcError::MissingAuthorizationCode)?;

        let tokens = self
            .client
            .exchange_code(&code, &pending.code_verifier)
            .await
            .map_err(OidcError::authentication_failed)?;

        // tokens are dropped with this frame if the profile cannot be read
        let profile = self
            .client
            .fetch_user_profile(&tokens.access_token)
            .await
            .map_err(OidcError::authentication_failed)?;

        let Some(mut record) = self.store.load(session_id).await? else {
            warn!("Session ended while the callback was in flight");
            return Err(OidcError::InvalidState);
        };

        let session = AuthenticatedSession::new(tokens, profile);
        let rotated_id = SessionId::generate()?;
        record.authenticated = Some(session.clone());
        record.expires_at = expiry_after(Utc::now(), self.session_ttl_seconds);
        self.store.store(&rotated_id, record).await?;
        self.store.destroy(session_id).await?;

        info!(subject = %session.profile.sub, "User authenticated");
        Ok(CompletedLogin {
            session_id: rotated_id,
            session,
        })
    }

    /// Destroy the session and return the provider's end-session URL.
    #[instrument(skip_all, fields(session = ?session_id))]
    pub async fn logout(&self, session_id: &SessionId, post_logout_redirect: &str) -> OidcResult<Url> {
        let id_token = self
            .store
            .load(session_id)
            .await?
            .and_then(|record| record.authenticated)
            .and_then(|session| session.tokens.id_token);

        self.store.destroy(session_id).await?;

        if id_token.is_none() {
            info!("Logging out without an ID token hint");
        } else {
            info!("Logged out");
        }
        Ok(self
            .client
            .logout_url(id_token.as_deref(), post_logout_redirect))
    }

    pub async fn current_state(&self, session_id: &SessionId) -> OidcResult<AuthState> {
        let state = match self.store.load(session_id).await? {
            Some(record) if record.authenticated.is_some() => AuthState::Authenticated,
            Some(SessionRecord {
                authorization: Some(pending),
                ..
            }) if !pending.is_expired() => AuthState::PendingAuthorization,
            _ => AuthState::Anonymous,
        };
        Ok(state)
    }

    pub async fn authenticated_session(
        &self,
        session_id: &SessionId,
    ) -> OidcResult<Option<AuthenticatedSession>> {
        Ok(self
            .store
            .load(session_id)
            .await?
            .and_then(|record| record.authenticated))
    }

    pub async fn cleanup_expired(&self) -> OidcResult<usize> {
        self.store.cleanup_expired().await
    }

    /// Remove the pending authorization (and any authenticated session) from
    /// the record and write it back, returning what was pending.
    async fn take_pending(&self, session_id: &SessionId) -> OidcResult<Option<PendingAuthorization>> {
        let Some(mut record) = self.store.load(session_id).await? else {
            return Ok(None);
        };

        let pending = record.authorization.take();
        record.authenticated = None;
        self.store.store(session_id, record).await?;
        Ok(pending)
    }
}
