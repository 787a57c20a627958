//! OIDC relying-party error types.

use thiserror::Error;

pub type OidcResult<T> = Result<T, OidcError>;

#[derive(Debug, Error)]
pub enum OidcError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Secure random source unavailable: {0}")]
    EntropyUnavailable(String),

    #[error("Invalid state parameter")]
    InvalidState,

    #[error("Missing authorization code")]
    MissingAuthorizationCode,

    #[error("Authorization denied by provider: {error}")]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },

    #[error("Token exchange failed: {error}")]
    TokenExchangeFailed {
        error: String,
        description: Option<String>,
    },

    #[error("User info request failed: {0}")]
    UserInfoFailed(String),

    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(String),

    #[error("Invalid user info response: {0}")]
    InvalidUserInfoResponse(String),

    #[error("Request to {endpoint} endpoint timed out")]
    NetworkTimeout { endpoint: &'static str },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Session store error: {0}")]
    Session(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(#[source] Box<OidcError>),
}

impl OidcError {
    /// HTTP status class a callback endpoint should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            OidcError::InvalidState | OidcError::MissingAuthorizationCode => 400,
            OidcError::AuthorizationDenied { .. }
            | OidcError::TokenExchangeFailed { .. }
            | OidcError::UserInfoFailed(_) => 401,
            OidcError::AuthenticationFailed(cause) => cause.status_code(),
            _ => 500,
        }
    }

    pub(crate) fn authentication_failed(cause: OidcError) -> Self {
        match cause {
            already @ OidcError::AuthenticationFailed(_) => already,
            other => OidcError::AuthenticationFailed(Box::new(other)),
        }
    }
}
