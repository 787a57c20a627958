//! OpenID Connect provider client.
//!
//! Builds the authorize and end-session URLs and talks to the token and
//! userinfo endpoints. The client holds no per-login state; everything it
//! needs for a call is passed in.

use crate::config::{
    ClientAuthMethod, ClientAuthentication, DEFAULT_SCOPES, OidcConfig, ProviderConfig,
    ProviderEndpoints,
};
use crate::error::{OidcError, OidcResult};
use crate::pkce::CODE_CHALLENGE_METHOD;
use crate::types::{ProviderErrorResponse, TokenResponse, TokenSet, UserProfile};
use chrono::Utc;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;
use url::form_urlencoded;

const TOKEN_ENDPOINT: &str = "token";
const USERINFO_ENDPOINT: &str = "userinfo";

/// HTTP client bound to one provider realm.
#[derive(Clone)]
pub struct OidcClient {
    http_client: Client,
    provider: ProviderConfig,
    endpoints: ProviderEndpoints,
    client_auth: ClientAuthentication,
}

impl OidcClient {
    pub fn new(provider: ProviderConfig, http_timeout_seconds: u64) -> OidcResult<Self> {
        provider.validate()?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(http_timeout_seconds))
            .build()?;

        let endpoints = provider.endpoints()?;
        let client_auth = provider.client_authentication();

        info!(
            client_id = %provider.client_id,
            realm = %provider.realm,
            public_client = client_auth.is_public(),
            "Configured OIDC client"
        );

        Ok(Self {
            http_client,
            provider,
            endpoints,
            client_auth,
        })
    }

    pub fn from_config(config: &OidcConfig) -> OidcResult<Self> {
        Self::new(config.provider.clone(), config.http_timeout_seconds)
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    pub fn endpoints(&self) -> &ProviderEndpoints {
        &self.endpoints
    }

    pub fn client_authentication(&self) -> &ClientAuthentication {
        &self.client_auth
    }

    /// Compose the authorize URL. An empty `scopes` slice requests the default set.
    pub fn authorization_url(&self, code_challenge: &str, state: &str, scopes: &[String]) -> Url {
        let scope = if scopes.is_empty() {
            DEFAULT_SCOPES.join(" ")
        } else {
            scopes.join(" ")
        };

        let mut url = self.endpoints.authorization.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair("client_id", &self.provider.client_id)
            .append_pair("redirect_uri", &self.provider.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &scope)
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", CODE_CHALLENGE_METHOD);

        debug!(realm = %self.provider.realm, "Generated authorization URL");
        url
    }

    /// Redeem an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str, code_verifier: &str) -> OidcResult<TokenSet> {
        let mut params: Vec<(&str, &str)> = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.provider.redirect_uri.as_str()),
            ("code_verifier", code_verifier),
        ];

        let mut request = self.http_client.post(self.endpoints.token.clone());
        match &self.client_auth {
            ClientAuthentication::Public => {
                params.push(("client_id", self.provider.client_id.as_str()));
            }
            ClientAuthentication::Confidential {
                client_secret,
                method: ClientAuthMethod::Basic,
            } => {
                request = request.basic_auth(
                    form_encode(&self.provider.client_id),
                    Some(form_encode(client_secret)),
                );
            }
            ClientAuthentication::Confidential {
                client_secret,
                method: ClientAuthMethod::Post,
            } => {
                params.push(("client_id", self.provider.client_id.as_str()));
                params.push(("client_secret", client_secret.as_str()));
            }
        }

        let issued_at = Utc::now();
        let response = request
            .form(&params)
            .send()
            .await
            .map_err(|e| transport_error(TOKEN_ENDPOINT, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(TOKEN_ENDPOINT, e))?;

        if let Some(provider_error) = parse_provider_error(&body) {
            error!(
                %status,
                error = %provider_error.error,
                description = provider_error.error_description.as_deref().unwrap_or(""),
                "Token exchange rejected by provider"
            );
            return Err(OidcError::TokenExchangeFailed {
                error: provider_error.error,
                description: provider_error.error_description,
            });
        }

        if !status.is_success() {
            error!(%status, body = %truncate(&body), "Token exchange failed");
            return Err(OidcError::TokenExchangeFailed {
                error: format!("http_{}", status.as_u16()),
                description: None,
            });
        }

        let token_response: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| OidcError::InvalidTokenResponse(e.to_string()))?;

        info!("Successfully exchanged code for tokens");
        TokenSet::from_response(token_response, issued_at)
    }

    /// Fetch the userinfo document for an access token.
    pub async fn fetch_user_profile(&self, access_token: &str) -> OidcResult<UserProfile> {
        let response = self
            .http_client
            .get(self.endpoints.userinfo.clone())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| transport_error(USERINFO_ENDPOINT, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(USERINFO_ENDPOINT, e))?;

        if let Some(provider_error) = parse_provider_error(&body) {
            error!(%status, error = %provider_error.error, "User info request rejected");
            let message = match provider_error.error_description {
                Some(description) => format!("{}: {}", provider_error.error, description),
                None => provider_error.error,
            };
            return Err(OidcError::UserInfoFailed(message));
        }

        if !status.is_success() {
            error!(%status, body = %truncate(&body), "User info request failed");
            return Err(OidcError::UserInfoFailed(format!("HTTP {status}")));
        }

        let profile: UserProfile = serde_json::from_str(&body)
            .map_err(|e| OidcError::InvalidUserInfoResponse(e.to_string()))?;

        debug!(subject = %profile.sub, "Retrieved user profile");
        Ok(profile)
    }

    /// Compose the end-session URL. Without an ID token the provider may ask
    /// the user to confirm the logout.
    pub fn logout_url(&self, id_token: Option<&str>, post_logout_redirect: &str) -> Url {
        let mut url = self.endpoints.end_session.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .clear()
                .append_pair("client_id", &self.provider.client_id)
                .append_pair("post_logout_redirect_uri", post_logout_redirect);
            if let Some(id_token) = id_token {
                query.append_pair("id_token_hint", id_token);
            }
        }
        url
    }
}

fn transport_error(endpoint: &'static str, err: reqwest::Error) -> OidcError {
    if err.is_timeout() {
        warn!(endpoint, "Provider request timed out");
        OidcError::NetworkTimeout { endpoint }
    } else {
        OidcError::Http(err)
    }
}

fn parse_provider_error(body: &str) -> Option<ProviderErrorResponse> {
    serde_json::from_str::<ProviderErrorResponse>(body)
        .ok()
        .filter(|e| !e.error.is_empty())
}

/// RFC 6749 §2.3.1: credentials are form-urlencoded before Basic encoding.
fn form_encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
