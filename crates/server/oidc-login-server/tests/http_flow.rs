//! End-to-end tests of the login routes against a mock Keycloak realm.

use axum::http::StatusCode;
use axum_test::{TestResponse, TestServer};
use oidc_login_server::{AppState, Config, app};
use axum_extra::extract::cookie::Cookie;
use oidc_pkce_client::{InMemorySessionStore, SessionId, SessionStore};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN_PATH: &str = "/realms/demo/protocol/openid-connect/token";
const USERINFO_PATH: &str = "/realms/demo/protocol/openid-connect/userinfo";
const COOKIE: &str = "oidc_session";

fn test_config(mock_server: &MockServer, redirect_uri: &str) -> Config {
    let mut config = Config::default();
    config.keycloak.client_id = "app1".to_string();
    config.keycloak.redirect_uri = redirect_uri.to_string();
    config.keycloak.auth_server_url = mock_server.uri();
    config.keycloak.realm = "demo".to_string();
    config
}

fn test_server(config: &Config) -> (TestServer, Arc<InMemorySessionStore>) {
    let store = Arc::new(InMemorySessionStore::new());
    let state = AppState::new(config, store.clone()).unwrap();
    (TestServer::new(app(state)).unwrap(), store)
}

fn location(response: &TestResponse) -> String {
    response
        .header("location")
        .to_str()
        .unwrap()
        .to_string()
}

fn set_cookie(response: &TestResponse) -> String {
    response
        .header("set-cookie")
        .to_str()
        .unwrap()
        .to_string()
}

fn query(url: &str) -> HashMap<String, String> {
    Url::parse(url)
        .unwrap()
        .query_pairs()
        .into_owned()
        .collect()
}

async fn mount_provider(mock_server: &MockServer, name: &str) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "mock_access_token",
            "token_type": "Bearer",
            "expires_in": 300,
            "id_token": "mock.id.token"
        })))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(USERINFO_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "sub": "f1b6c1a4",
            "name": name,
            "email": "alice@example.com",
            "preferred_username": "alice"
        })))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_health() {
    let mock_server = MockServer::start().await;
    let (server, _store) = test_server(&test_config(&mock_server, "http://localhost:8000/login"));

    let response = server.get("/health").await;
    response.assert_status_ok();
    response.assert_text("OK");
}

#[tokio::test]
async fn test_anonymous_pages() {
    let mock_server = MockServer::start().await;
    let (server, _store) = test_server(&test_config(&mock_server, "http://localhost:8000/login"));

    let response = server.get("/").await;
    response.assert_status_ok();
    assert!(response.text().contains(r#"href="/login""#));

    let response = server.get("/home").await;
    response.assert_status(StatusCode::FOUND);
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn test_login_redirects_to_provider_with_session_cookie() {
    let mock_server = MockServer::start().await;
    let (server, store) = test_server(&test_config(&mock_server, "http://localhost:8000/login"));

    let response = server.get("/login").await;
    response.assert_status(StatusCode::FOUND);

    let authorize = location(&response);
    assert!(authorize.starts_with(&format!(
        "{}/realms/demo/protocol/openid-connect/auth?",
        mock_server.uri()
    )));
    let params = query(&authorize);
    assert_eq!(params["client_id"], "app1");
    assert_eq!(params["redirect_uri"], "http://localhost:8000/login");
    assert_eq!(params["code_challenge_method"], "S256");
    assert_eq!(params["state"].len(), 43);

    let cookie = set_cookie(&response);
    assert!(cookie.starts_with("oidc_session="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(cookie.contains("Path=/"));
    assert!(cookie.contains("Max-Age=86400"));
    assert!(!cookie.contains("Secure"));

    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_secure_cookie_for_https_redirect() {
    let mock_server = MockServer::start().await;
    let (server, _store) = test_server(&test_config(&mock_server, "https://app.example/login"));

    let response = server.get("/login").await;
    assert!(set_cookie(&response).contains("Secure"));
}

#[tokio::test]
async fn test_full_login_and_logout() {
    let mock_server = MockServer::start().await;
    mount_provider(&mock_server, "Alice Example").await;
    let (server, store) = test_server(&test_config(&mock_server, "http://localhost:8000/login"));

    let start = server.get("/login").await;
    let cookie = start.cookie(COOKIE);
    let state = query(&location(&start))["state"].clone();

    let callback = server
        .get("/login")
        .add_query_param("code", "mock_auth_code")
        .add_query_param("state", &state)
        .add_cookie(cookie.clone())
        .await;
    callback.assert_status(StatusCode::FOUND);
    assert_eq!(location(&callback), "/home");
    assert_eq!(callback.header("cache-control"), "no-store");

    // the login-time id is retired in favour of a new one
    let login_cookie = cookie;
    let cookie = callback.cookie(COOKIE);
    assert_ne!(cookie.value(), login_cookie.value());
    let stale = server.get("/home").add_cookie(login_cookie).await;
    stale.assert_status(StatusCode::FOUND);
    assert_eq!(location(&stale), "/");

    let home = server.get("/home").add_cookie(cookie.clone()).await;
    home.assert_status_ok();
    assert_eq!(home.header("cache-control"), "no-store");
    let body = home.text();
    assert!(body.contains("Welcome, Alice Example!"));
    assert!(body.contains("alice@example.com"));
    assert!(body.contains("f1b6c1a4"));

    let index = server.get("/").add_cookie(cookie.clone()).await;
    index.assert_status(StatusCode::FOUND);
    assert_eq!(location(&index), "/home");

    let logout = server.get("/logout").add_cookie(cookie.clone()).await;
    logout.assert_status(StatusCode::FOUND);
    let end_session = location(&logout);
    assert!(end_session.starts_with(&format!(
        "{}/realms/demo/protocol/openid-connect/logout?",
        mock_server.uri()
    )));
    let params = query(&end_session);
    assert_eq!(params["id_token_hint"], "mock.id.token");
    assert_eq!(params["client_id"], "app1");
    assert_eq!(params["post_logout_redirect_uri"], "http://localhost:8000/");
    assert!(set_cookie(&logout).contains("Max-Age=0"));
    assert!(store.is_empty());

    let home = server.get("/home").add_cookie(cookie).await;
    home.assert_status(StatusCode::FOUND);
    assert_eq!(location(&home), "/");
}

#[tokio::test]
async fn test_planted_session_cookie_is_not_adopted() {
    let mock_server = MockServer::start().await;
    mount_provider(&mock_server, "Alice Example").await;
    let (server, store) = test_server(&test_config(&mock_server, "http://localhost:8000/login"));

    let planted_value = "A".repeat(43);
    let planted = SessionId::parse(&planted_value).unwrap();

    let start = server
        .get("/login")
        .add_cookie(Cookie::new(COOKIE, planted_value.clone()))
        .await;
    start.assert_status(StatusCode::FOUND);
    let cookie = start.cookie(COOKIE);
    assert_ne!(cookie.value(), planted_value);
    assert!(store.load(&planted).await.unwrap().is_none());

    let state = query(&location(&start))["state"].clone();
    let callback = server
        .get("/login")
        .add_query_param("code", "mock_auth_code")
        .add_query_param("state", &state)
        .add_cookie(cookie)
        .await;
    callback.assert_status(StatusCode::FOUND);
    assert_ne!(callback.cookie(COOKIE).value(), planted_value);

    let home = server
        .get("/home")
        .add_cookie(Cookie::new(COOKIE, planted_value))
        .await;
    home.assert_status(StatusCode::FOUND);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_callback_with_wrong_state_is_bad_request() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;
    let (server, _store) = test_server(&test_config(&mock_server, "http://localhost:8000/login"));

    let start = server.get("/login").await;
    let cookie = start.cookie(COOKIE);

    let response = server
        .get("/login")
        .add_query_param("code", "mock_auth_code")
        .add_query_param("state", "forged")
        .add_cookie(cookie)
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(response.text().contains("Invalid state"));

    // no cookie at all
    let response = server
        .get("/login")
        .add_query_param("code", "mock_auth_code")
        .add_query_param("state", "forged")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rejected_code_is_unauthorized() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Code not valid"
        })))
        .mount(&mock_server)
        .await;
    let (server, _store) = test_server(&test_config(&mock_server, "http://localhost:8000/login"));

    let start = server.get("/login").await;
    let cookie = start.cookie(COOKIE);
    let state = query(&location(&start))["state"].clone();

    let response = server
        .get("/login")
        .add_query_param("code", "stale")
        .add_query_param("state", &state)
        .add_cookie(cookie.clone())
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let body = response.text();
    assert!(body.contains("Authentication failed"));
    assert!(!body.contains("Code not valid"));

    let home = server.get("/home").add_cookie(cookie).await;
    home.assert_status(StatusCode::FOUND);
}

#[tokio::test]
async fn test_provider_denial_is_unauthorized() {
    let mock_server = MockServer::start().await;
    let (server, _store) = test_server(&test_config(&mock_server, "http://localhost:8000/login"));

    let start = server.get("/login").await;
    let cookie = start.cookie(COOKIE);
    let state = query(&location(&start))["state"].clone();

    let response = server
        .get("/login")
        .add_query_param("error", "access_denied")
        .add_query_param("state", &state)
        .add_cookie(cookie)
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_profile_values_are_escaped() {
    let mock_server = MockServer::start().await;
    mount_provider(&mock_server, "<script>alert(1)</script>").await;
    let (server, _store) = test_server(&test_config(&mock_server, "http://localhost:8000/login"));

    let start = server.get("/login").await;
    let cookie = start.cookie(COOKIE);
    let state = query(&location(&start))["state"].clone();

    let callback = server
        .get("/login")
        .add_query_param("code", "mock_auth_code")
        .add_query_param("state", &state)
        .add_cookie(cookie)
        .await;
    callback.assert_status(StatusCode::FOUND);

    let body = server
        .get("/home")
        .add_cookie(callback.cookie(COOKIE))
        .await
        .text();
    assert!(body.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
    assert!(!body.contains("<script>alert(1)</script>"));
}

#[tokio::test]
async fn test_logout_without_session_still_redirects() {
    let mock_server = MockServer::start().await;
    let (server, store) = test_server(&test_config(&mock_server, "http://localhost:8000/login"));

    let response = server.get("/logout").await;
    response.assert_status(StatusCode::FOUND);
    assert!(!query(&location(&response)).contains_key("id_token_hint"));
    assert!(store.is_empty());
}
