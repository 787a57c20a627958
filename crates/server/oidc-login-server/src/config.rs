//! Configuration for the login server
//!
//! Sources, lowest precedence first:
//! - Configuration file (`OIDC_CONFIG_FILE`, default `config.toml`)
//! - Environment variables with the `OIDC` prefix, e.g. `OIDC__KEYCLOAK__REALM`
//! - The direct variables of earlier deployments (`KEYCLOAK_CLIENT_ID`, `PORT`, ...)
//!
//! A `.env` file is loaded into the environment by `main` before any of this runs.

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File};
use oidc_pkce_client::{ClientAuthMethod, DEFAULT_SCOPES, OidcConfig, ProviderConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use tracing::{debug, info};
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Main configuration struct for the login server
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub keycloak: KeycloakConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1)
    pub host: IpAddr,

    /// Port to bind to (default: 8000)
    pub port: u16,

    /// Deployment environment; `production` forces `Secure` cookies
    pub app_env: String,
}

/// Realm and client registration at the identity provider
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct KeycloakConfig {
    pub client_id: String,

    /// Empty or absent means a public client
    pub client_secret: Option<String>,

    pub client_auth_method: ClientAuthMethod,

    pub redirect_uri: String,

    /// Base URL of the Keycloak server, without `/realms/...`
    pub auth_server_url: String,

    pub realm: String,

    pub scopes: Vec<String>,

    /// Timeout for token and userinfo requests
    pub http_timeout_seconds: u64,
}

/// Server-side session and cookie settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,

    /// Session lifetime, also used as the cookie Max-Age (default: 86400 = 24 hours)
    pub ttl_seconds: u64,

    /// How long a login may wait for the provider's callback
    pub pending_ttl_seconds: u64,

    /// Interval of the expired-session sweep
    pub cleanup_interval_seconds: u64,

    /// Where the provider sends the browser after logout.
    /// Defaults to the root of the redirect URI's origin.
    pub post_logout_redirect_uri: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or full filter directive
    pub level: String,

    /// Log format (pretty, json, compact)
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 8000,
            app_env: "development".to_string(),
        }
    }
}

impl Default for KeycloakConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            client_auth_method: ClientAuthMethod::default(),
            redirect_uri: String::new(),
            auth_server_url: String::new(),
            realm: String::new(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            http_timeout_seconds: 30,
        }
    }
}

impl std::fmt::Debug for KeycloakConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeycloakConfig")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("client_auth_method", &self.client_auth_method)
            .field("redirect_uri", &self.redirect_uri)
            .field("auth_server_url", &self.auth_server_url)
            .field("realm", &self.realm)
            .field("scopes", &self.scopes)
            .field("http_timeout_seconds", &self.http_timeout_seconds)
            .finish()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "oidc_session".to_string(),
            ttl_seconds: 86_400,
            pending_ttl_seconds: 600,
            cleanup_interval_seconds: 300,
            post_logout_redirect_uri: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment and optional config file
    pub fn load() -> Result<Self> {
        let config_path =
            std::env::var("OIDC_CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let env: HashMap<String, String> = std::env::vars().collect();

        Self::load_with(Path::new(&config_path), &env)
    }

    /// Load configuration from `config_path` (if it exists) and an explicit
    /// set of environment variables.
    pub fn load_with(config_path: &Path, env: &HashMap<String, String>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if config_path.exists() {
            info!("Loading configuration from {}", config_path.display());
            builder = builder.add_source(File::from(config_path));
        } else {
            debug!(
                "No config file found at {}, using defaults",
                config_path.display()
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("OIDC")
                .separator("__")
                .try_parsing(true)
                .source(Some(env.clone())),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let mut settings: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        settings.apply_overrides(|key| env.get(key).cloned())?;
        settings.validate()?;

        Ok(settings)
    }

    /// Apply the direct variables used by earlier deployments
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(client_id) = var("KEYCLOAK_CLIENT_ID") {
            self.keycloak.client_id = client_id;
        }

        if let Some(secret) = var("KEYCLOAK_CLIENT_SECRET") {
            self.keycloak.client_secret = Some(secret);
        }

        if let Some(redirect_uri) = var("KEYCLOAK_REDIRECT_URI") {
            self.keycloak.redirect_uri = redirect_uri;
        }

        if let Some(auth_server_url) = var("KEYCLOAK_AUTH_SERVER_URL") {
            self.keycloak.auth_server_url = auth_server_url;
        }

        if let Some(realm) = var("KEYCLOAK_REALM") {
            self.keycloak.realm = realm;
        }

        if let Some(app_env) = var("APP_ENV") {
            self.server.app_env = app_env;
        }

        if let Some(host) = var("HOST") {
            info!("Using HOST environment variable");
            self.server.host = host.parse().context("Invalid HOST value")?;
        }

        if let Some(port) = var("PORT") {
            info!("Using PORT environment variable");
            self.server.port = port.parse().context("Invalid PORT value")?;
        }

        if let Some(log_level) = var("RUST_LOG") {
            self.logging.level = log_level;
        }

        // an empty secret is the conventional way to declare a public client
        if self
            .keycloak
            .client_secret
            .as_deref()
            .is_some_and(|s| s.trim().is_empty())
        {
            self.keycloak.client_secret = None;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        self.oidc_config()
            .validate()
            .context("Invalid identity provider configuration")?;

        if self.session.cookie_name.is_empty()
            || !self
                .session
                .cookie_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            anyhow::bail!("Session cookie name must be non-empty and use only [A-Za-z0-9_-]");
        }

        if self.session.cleanup_interval_seconds == 0 {
            anyhow::bail!("Session cleanup interval must be positive");
        }

        if let Some(uri) = &self.session.post_logout_redirect_uri {
            Url::parse(uri).context("Invalid post_logout_redirect_uri")?;
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let level_lower = self.logging.level.to_lowercase();
        if !self.logging.level.contains('=')
            && !self.logging.level.contains(',')
            && !valid_levels.contains(&level_lower.as_str())
        {
            anyhow::bail!(
                "Invalid log level '{}'. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            );
        }

        let valid_formats = ["pretty", "json", "compact"];
        let format_lower = self.logging.format.to_lowercase();
        if !valid_formats.contains(&format_lower.as_str()) {
            anyhow::bail!(
                "Invalid log format '{}'. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            );
        }

        Ok(())
    }

    pub fn provider_config(&self) -> ProviderConfig {
        let keycloak = &self.keycloak;
        let mut provider = ProviderConfig::new(
            keycloak.client_id.clone(),
            keycloak.redirect_uri.clone(),
            keycloak.auth_server_url.clone(),
            keycloak.realm.clone(),
        )
        .with_client_auth_method(keycloak.client_auth_method)
        .with_scopes(keycloak.scopes.clone());

        if let Some(secret) = &keycloak.client_secret {
            provider = provider.with_client_secret(secret.clone());
        }
        provider
    }

    pub fn oidc_config(&self) -> OidcConfig {
        OidcConfig::new(self.provider_config())
            .with_pending_ttl(self.session.pending_ttl_seconds)
            .with_session_ttl(self.session.ttl_seconds)
            .with_http_timeout(self.keycloak.http_timeout_seconds)
    }

    pub fn is_production(&self) -> bool {
        self.server.app_env.eq_ignore_ascii_case("production")
    }

    /// Cookies are `Secure` in production and whenever the app is served over https.
    pub fn secure_cookies(&self) -> bool {
        self.is_production() || self.keycloak.redirect_uri.starts_with("https://")
    }

    pub fn post_logout_redirect_uri(&self) -> Result<String> {
        if let Some(uri) = &self.session.post_logout_redirect_uri {
            return Ok(uri.clone());
        }

        let redirect =
            Url::parse(&self.keycloak.redirect_uri).context("Invalid keycloak.redirect_uri")?;
        Ok(format!("{}/", redirect.origin().ascii_serialization()))
    }

    /// Get the socket address for the server
    pub fn socket_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::from((self.server.host, self.server.port))
    }

    /// Get the log filter string for tracing
    pub fn log_filter(&self) -> String {
        if self.logging.level.contains('=') || self.logging.level.contains(',') {
            self.logging.level.clone()
        } else {
            format!(
                "oidc_login_server={level},oidc_pkce_client={level},tower_http={level},{level}",
                level = self.logging.level
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_env() -> HashMap<String, String> {
        [
            ("KEYCLOAK_CLIENT_ID", "app1"),
            ("KEYCLOAK_REDIRECT_URI", "http://localhost:8000/login"),
            ("KEYCLOAK_AUTH_SERVER_URL", "http://localhost:8080"),
            ("KEYCLOAK_REALM", "demo"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn no_file() -> &'static Path {
        Path::new("/nonexistent/oidc-login-server/config.toml")
    }

    #[test]
    fn test_legacy_variables() {
        let config = Config::load_with(no_file(), &valid_env()).unwrap();

        assert_eq!(config.keycloak.client_id, "app1");
        assert_eq!(config.keycloak.realm, "demo");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.session.cookie_name, "oidc_session");
        assert_eq!(config.session.ttl_seconds, 86_400);
        assert!(config.keycloak.client_secret.is_none());
        assert!(config.provider_config().client_authentication().is_public());
        assert!(!config.secure_cookies());
        assert_eq!(
            config.post_logout_redirect_uri().unwrap(),
            "http://localhost:8000/"
        );
    }

    #[test]
    fn test_missing_required_field_is_named() {
        let mut env = valid_env();
        env.remove("KEYCLOAK_REALM");

        let err = Config::load_with(no_file(), &env).unwrap_err();
        assert!(format!("{err:#}").contains("realm"));
    }

    #[test]
    fn test_empty_secret_means_public_client() {
        let mut env = valid_env();
        env.insert("KEYCLOAK_CLIENT_SECRET".to_string(), "   ".to_string());

        let config = Config::load_with(no_file(), &env).unwrap();
        assert!(config.keycloak.client_secret.is_none());
    }

    #[test]
    fn test_secret_never_in_errors_or_debug() {
        let mut env = valid_env();
        env.insert("KEYCLOAK_CLIENT_SECRET".to_string(), "hunter2-secret".to_string());
        env.insert("KEYCLOAK_REALM".to_string(), String::new());

        let err = Config::load_with(no_file(), &env).unwrap_err();
        assert!(!format!("{err:#}").contains("hunter2-secret"));

        env.insert("KEYCLOAK_REALM".to_string(), "demo".to_string());
        let config = Config::load_with(no_file(), &env).unwrap();
        assert!(!format!("{config:?}").contains("hunter2-secret"));
        assert!(
            !config
                .provider_config()
                .client_authentication()
                .is_public()
        );
    }

    #[test]
    fn test_file_then_prefixed_env() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9000
app_env = "production"

[keycloak]
client_id = "from-file"
client_secret = "file-secret"
client_auth_method = "client_secret_post"
redirect_uri = "https://app.example/login"
auth_server_url = "https://idp.example"
realm = "file-realm"

[session]
cookie_name = "app_sid"
post_logout_redirect_uri = "https://app.example/goodbye"

[logging]
format = "json"
"#
        )
        .unwrap();

        let env: HashMap<String, String> = [("OIDC__KEYCLOAK__REALM", "env-realm")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let config = Config::load_with(file.path(), &env).unwrap();
        assert_eq!(config.keycloak.client_id, "from-file");
        assert_eq!(config.keycloak.realm, "env-realm");
        assert_eq!(config.keycloak.client_auth_method, ClientAuthMethod::Post);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.session.cookie_name, "app_sid");
        assert_eq!(config.logging.format, "json");
        assert!(config.is_production());
        assert!(config.secure_cookies());
        assert_eq!(
            config.post_logout_redirect_uri().unwrap(),
            "https://app.example/goodbye"
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut env = valid_env();
        env.insert("PORT".to_string(), "not-a-port".to_string());
        assert!(Config::load_with(no_file(), &env).is_err());

        let mut config = Config::load_with(no_file(), &valid_env()).unwrap();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());

        config.logging.format = "compact".to_string();
        config.session.cookie_name = "bad name;".to_string();
        assert!(config.validate().is_err());

        config.session.cookie_name = "oidc_session".to_string();
        config.session.ttl_seconds = 0;
        assert!(config.validate().is_err());

        config.session.ttl_seconds = u64::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_filter() {
        let mut config = Config::default();
        assert!(config.log_filter().contains("oidc_pkce_client=info"));

        config.logging.level = "warn,tower_http=debug".to_string();
        assert_eq!(config.log_filter(), "warn,tower_http=debug");
    }
}
