/*
 * Copyright (c) 2025 Craig Hamilton and Contributors.
 * Licensed under either of
 *  - Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> OR
 *  - MIT license <http://opensource.org/licenses/MIT>
 *  at your option.
 */
use firefly_services::{Client, Creds, JobHandle, PollPolicy, ServiceConfig, TokenProvider};
use serde_json::{Value, json};
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub(crate) const CLIENT_ID: &str = "test-client-id";
pub(crate) const ACCESS_TOKEN: &str = "test-access-token";
pub(crate) const TOKEN_PATH: &str = "/ims/token/v3";

#[allow(dead_code)]
pub(crate) fn creds() -> Creds {
    Creds::from_tokens(CLIENT_ID, "test-client-secret")
}

#[allow(dead_code)]
pub(crate) fn config(server: &MockServer, poll: PollPolicy) -> ServiceConfig {
    ServiceConfig {
        token_url: format!("{}{}", server.uri(), TOKEN_PATH),
        api_origin: server.uri(),
        scopes: vec!["openid".into(), "AdobeID".into(), "firefly_api".into()],
        api_key_header: "x-api-key".into(),
        refresh_margin: Duration::from_secs(60),
        poll,
    }
}

// Short delays so polling tests finish quickly
#[allow(dead_code)]
pub(crate) fn fast_poll() -> PollPolicy {
    PollPolicy::fixed(Duration::from_millis(20), Duration::from_secs(5))
}

#[allow(dead_code)]
pub(crate) fn client(server: &MockServer) -> Client {
    Client::new(creds(), config(server, fast_poll())).unwrap()
}

#[allow(dead_code)]
pub(crate) fn token_provider(server: &MockServer) -> TokenProvider {
    TokenProvider::from_config(creds(), &config(server, fast_poll())).unwrap()
}

#[allow(dead_code)]
pub(crate) fn token_response(expires_in: u64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": ACCESS_TOKEN,
        "token_type": "bearer",
        "expires_in": expires_in
    }))
}

/// Mounts a token endpoint that must be called exactly `times` times
#[allow(dead_code)]
pub(crate) async fn mount_token(server: &MockServer, times: u64) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_response(86399))
        .expect(times)
        .mount(server)
        .await;
}

#[allow(dead_code)]
pub(crate) fn handle(server: &MockServer, status_path: &str) -> JobHandle {
    let url = Url::parse(&format!("{}{}", server.uri(), status_path)).unwrap();
    JobHandle::new(url, Value::Null)
}

#[allow(dead_code)]
pub(crate) async fn requests_to(server: &MockServer, http_method: &str, url_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|req| req.method.as_str() == http_method && req.url.path() == url_path)
        .count()
}
