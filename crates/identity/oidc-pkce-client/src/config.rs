//! Relying-party configuration types.

use crate::error::{OidcError, OidcResult};
use serde::Deserialize;
use url::Url;

/// Scopes requested when none are configured.
pub const DEFAULT_SCOPES: [&str; 3] = ["openid", "profile", "email"];

/// How a confidential client presents its secret at the token endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    /// `client_secret_basic`: HTTP Basic `Authorization` header.
    #[default]
    #[serde(alias = "client_secret_basic")]
    Basic,
    /// `client_secret_post`: `client_id` and `client_secret` in the form body.
    #[serde(alias = "client_secret_post")]
    Post,
}

/// Client mode resolved once from configuration.
///
/// A configured, non-empty secret selects [`ClientAuthentication::Confidential`];
/// anything else is a public (PKCE-only) client.
#[derive(Clone, PartialEq, Eq)]
pub enum ClientAuthentication {
    Public,
    Confidential {
        client_secret: String,
        method: ClientAuthMethod,
    },
}

impl ClientAuthentication {
    pub fn is_public(&self) -> bool {
        matches!(self, ClientAuthentication::Public)
    }
}

impl std::fmt::Debug for ClientAuthentication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientAuthentication::Public => f.write_str("Public"),
            ClientAuthentication::Confidential { method, .. } => f
                .debug_struct("Confidential")
                .field("client_secret", &"<redacted>")
                .field("method", method)
                .finish(),
        }
    }
}

/// Identity provider configuration for a single realm.
#[derive(Clone, Deserialize)]
pub struct ProviderConfig {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub client_auth_method: ClientAuthMethod,
    pub redirect_uri: String,
    pub auth_server_base_url: String,
    pub realm: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("client_auth_method", &self.client_auth_method)
            .field("redirect_uri", &self.redirect_uri)
            .field("auth_server_base_url", &self.auth_server_base_url)
            .field("realm", &self.realm)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl ProviderConfig {
    pub fn new(
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
        auth_server_base_url: impl Into<String>,
        realm: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            client_auth_method: ClientAuthMethod::default(),
            redirect_uri: redirect_uri.into(),
            auth_server_base_url: auth_server_base_url.into(),
            realm: realm.into(),
            scopes: default_scopes(),
        }
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn with_client_auth_method(mut self, method: ClientAuthMethod) -> Self {
        self.client_auth_method = method;
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Check required fields. Error messages name fields, never values.
    pub fn validate(&self) -> OidcResult<()> {
        let required = [
            ("client_id", &self.client_id),
            ("redirect_uri", &self.redirect_uri),
            ("auth_server_base_url", &self.auth_server_base_url),
            ("realm", &self.realm),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(OidcError::Config(format!(
                    "Missing required configuration: {name}"
                )));
            }
        }

        Url::parse(&self.redirect_uri)
            .map_err(|e| OidcError::Config(format!("redirect_uri is not a valid URL: {e}")))?;
        self.endpoints()?;

        if self.scopes.iter().any(|s| s.trim().is_empty() || s.contains(' ')) {
            return Err(OidcError::Config(
                "scopes must be non-empty and must not contain spaces".to_string(),
            ));
        }

        Ok(())
    }

    pub fn client_authentication(&self) -> ClientAuthentication {
        match self.client_secret.as_deref().map(str::trim) {
            Some(secret) if !secret.is_empty() => ClientAuthentication::Confidential {
                client_secret: secret.to_string(),
                method: self.client_auth_method,
            },
            _ => ClientAuthentication::Public,
        }
    }

    pub fn endpoints(&self) -> OidcResult<ProviderEndpoints> {
        ProviderEndpoints::keycloak(&self.auth_server_base_url, &self.realm)
    }
}

/// Endpoint URLs derived from the provider's realm base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub authorization: Url,
    pub token: Url,
    pub userinfo: Url,
    pub end_session: Url,
}

impl ProviderEndpoints {
    /// `{base}/realms/{realm}/protocol/openid-connect/{auth|token|userinfo|logout}`
    pub fn keycloak(auth_server_base_url: &str, realm: &str) -> OidcResult<Self> {
        let realm_base = format!(
            "{}/realms/{}/protocol/openid-connect",
            auth_server_base_url.trim_end_matches('/'),
            realm
        );
        let endpoint = |suffix: &str| {
            Url::parse(&format!("{realm_base}/{suffix}")).map_err(|e| {
                OidcError::Config(format!("auth_server_base_url is not a valid URL: {e}"))
            })
        };

        Ok(Self {
            authorization: endpoint("auth")?,
            token: endpoint("token")?,
            userinfo: endpoint("userinfo")?,
            end_session: endpoint("logout")?,
        })
    }
}

/// Upper bound for the pending and session TTLs (ten years).
pub const MAX_TTL_SECONDS: u64 = 10 * 365 * 86_400;

/// Relying-party runtime settings.
#[derive(Debug, Clone)]
pub struct OidcConfig {
    pub provider: ProviderConfig,
    /// How long a pending authorization may wait for its callback.
    pub pending_ttl_seconds: u64,
    /// Lifetime of a session record.
    pub session_ttl_seconds: u64,
    pub http_timeout_seconds: u64,
}

impl OidcConfig {
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            provider,
            pending_ttl_seconds: 600, // 10 minutes
            session_ttl_seconds: 86_400,
            http_timeout_seconds: 30,
        }
    }

    pub fn with_pending_ttl(mut self, seconds: u64) -> Self {
        self.pending_ttl_seconds = seconds;
        self
    }

    pub fn with_session_ttl(mut self, seconds: u64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    pub fn with_http_timeout(mut self, seconds: u64) -> Self {
        self.http_timeout_seconds = seconds;
        self
    }

    pub fn validate(&self) -> OidcResult<()> {
        self.provider.validate()?;
        for (name, seconds) in [
            ("pending_ttl_seconds", self.pending_ttl_seconds),
            ("session_ttl_seconds", self.session_ttl_seconds),
        ] {
            if seconds == 0 {
                return Err(OidcError::Config(format!("{name} must be positive")));
            }
            if seconds > MAX_TTL_SECONDS {
                return Err(OidcError::Config(format!(
                    "{name} must not exceed {MAX_TTL_SECONDS}"
                )));
            }
        }
        if self.http_timeout_seconds == 0 {
            return Err(OidcError::Config("http_timeout_seconds must be positive".to_string()));
        }
        Ok(())
    }
}
