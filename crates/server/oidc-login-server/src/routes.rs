//! HTTP routes.

use crate::config::Config;
use crate::error::AppError;
use crate::pages;
use crate::session_cookie::CookieSettings;
use anyhow::Context;
use axum::{
    Router,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::cookie::CookieJar;
use oidc_pkce_client::{AuthFlow, AuthState, CallbackParams, OidcError, SessionStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub flow: Arc<AuthFlow>,
    pub cookies: CookieSettings,
    pub post_logout_redirect_uri: String,
}

impl AppState {
    pub fn new(config: &Config, store: Arc<dyn SessionStore>) -> anyhow::Result<Self> {
        let flow = AuthFlow::new(&config.oidc_config(), store)
            .context("Invalid identity provider configuration")?;

        Ok(Self {
            flow: Arc::new(flow),
            cookies: CookieSettings::from_config(config),
            post_logout_redirect_uri: config.post_logout_redirect_uri()?,
        })
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/login", get(login_handler))
        .route("/home", get(home_handler))
        .route("/logout", get(logout_handler))
        .route("/health", get(|| async { "OK" }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Sweep expired sessions every `every` until the runtime shuts down.
pub fn spawn_session_cleanup(flow: Arc<AuthFlow>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // the first tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            match flow.cleanup_expired().await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "Removed expired sessions"),
                Err(e) => warn!(error = %e, "Session cleanup failed"),
            }
        }
    })
}

fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(location) => (StatusCode::FOUND, [(header::LOCATION, location)]).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn no_store(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

async fn index_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    if let Some(session_id) = state.cookies.session_id(&jar) {
        if state.flow.current_state(&session_id).await? == AuthState::Authenticated {
            return Ok(found("/home"));
        }
    }

    Ok(Html(pages::entry_page()).into_response())
}

/// Starts a login, or completes one when the provider redirects back here.
async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<Response, AppError> {
    if !params.is_callback() {
        let session_id = state
            .flow
            .login_session_id(state.cookies.session_id(&jar))
            .await
            .map_err(AppError::LoginStart)?;

        let authorization_url = state
            .flow
            .start_login(&session_id)
            .await
            .map_err(AppError::LoginStart)?;

        let jar = jar.add(state.cookies.session_cookie(&session_id));
        return Ok((jar, no_store(found(authorization_url.as_str()))).into_response());
    }

    let Some(session_id) = state.cookies.session_id(&jar) else {
        warn!("Callback without a session cookie");
        return Err(OidcError::InvalidState.into());
    };

    let completed = state.flow.handle_callback(&session_id, params).await?;

    let jar = jar.add(state.cookies.session_cookie(&completed.session_id));
    Ok((jar, no_store(found("/home"))).into_response())
}

async fn home_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let session = match state.cookies.session_id(&jar) {
        Some(session_id) => state.flow.authenticated_session(&session_id).await?,
        None => None,
    };

    match session {
        Some(session) => Ok(no_store(Html(pages::home_page(&session)).into_response())),
        None => Ok(found("/")),
    }
}

async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let logout_url = match state.cookies.session_id(&jar) {
        Some(session_id) => {
            state
                .flow
                .logout(&session_id, &state.post_logout_redirect_uri)
                .await?
        }
        None => state
            .flow
            .client()
            .logout_url(None, &state.post_logout_redirect_uri),
    };

    info!("Redirecting to provider logout");
    let jar = jar.add(state.cookies.removal_cookie());
    Ok((jar, no_store(found(logout_url.as_str()))).into_response())
}
