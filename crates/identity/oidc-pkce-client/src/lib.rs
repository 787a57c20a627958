//! OpenID Connect relying party with Authorization Code + PKCE.
//!
//! [`AuthFlow`] drives a browser session through
//! Anonymous → PendingAuthorization → Authenticated against a Keycloak-style
//! realm. Session state lives behind the [`SessionStore`] trait so the HTTP
//! layer and storage backend stay independent of the protocol code.

mod client;
mod config;
mod error;
mod flow;
mod pkce;
mod session;
mod types;


pub use client::OidcClient;
pub use config::{
    ClientAuthMethod, ClientAuthentication, DEFAULT_SCOPES, MAX_TTL_SECONDS, OidcConfig,
    ProviderConfig, ProviderEndpoints,
};
pub use error::{OidcError, OidcResult};
pub use flow::{AuthFlow, AuthState, CompletedLogin};
pub use pkce::{CODE_CHALLENGE_METHOD, PkcePair, generate_state};
pub use session::{
    AuthenticatedSession, InMemorySessionStore, PendingAuthorization, SessionId, SessionRecord,
    SessionStore,
};
pub use types::{CallbackParams, TokenResponse, TokenSet, UserProfile};
