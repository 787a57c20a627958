//! HTTP error responses.
//!
//! Browsers only ever see a short generic message; the cause goes to the log.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use oidc_pkce_client::OidcError;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Failed to start login: {0}")]
    LoginStart(#[source] OidcError),

    #[error(transparent)]
    Oidc(#[from] OidcError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::LoginStart(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Oidc(err) => {
                StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    fn public_message(&self) -> &'static str {
        match self {
            AppError::LoginStart(_) => "Error initiating login. Please try again.",
            AppError::Oidc(OidcError::InvalidState) => "Invalid state - possible CSRF attempt.",
            AppError::Oidc(OidcError::MissingAuthorizationCode) => "Missing authorization code.",
            AppError::Oidc(OidcError::Config(_)) => "Configuration error. Contact the administrator.",
            AppError::Oidc(err) if err.status_code() == 401 => {
                "Authentication failed. Please login again."
            }
            AppError::Oidc(_) => "Unexpected error. Please contact administrator.",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let mut response = (status, self.public_message()).into_response();
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
    }
}
