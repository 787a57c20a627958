//! Browser login front end for a Keycloak realm.
//!
//! Routes: `/` entry page, `/login` (start and callback), `/home` profile,
//! `/logout`, `/health`.

pub mod config;
pub mod error;
pub mod logging;
pub mod pages;
pub mod routes;
pub mod session_cookie;

pub use config::Config;
pub use routes::{AppState, app, spawn_session_cleanup};
