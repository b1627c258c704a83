/*
 * Copyright (c) 2025 Craig Hamilton and Contributors.
 * Licensed under either of
 *  - Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> OR
 *  - MIT license <http://opensource.org/licenses/MIT>
 *  at your option.
 */
use crate::auth::{Credential, TokenProvider};
use crate::errors::FireflyError;
use reqwest::header::{ACCEPT, HeaderName};
use reqwest::{Method, RequestBuilder};
use std::sync::Arc;
use url::Url;

/// Directly communicates with the API.
///
/// Every request built here carries the bearer token and the API key header.
#[derive(Clone)]
pub struct ApiClient {
    tokens: Arc<TokenProvider>,
    api_key_header: HeaderName,
    https_client: reqwest::Client,
}

impl ApiClient {
    pub fn new(tokens: Arc<TokenProvider>, api_key_header: &str) -> Result<Self, FireflyError> {
        let api_key_header = HeaderName::from_bytes(api_key_header.as_bytes()).map_err(|_| {
            FireflyError::Config(format!("invalid API key header name: {api_key_header}"))
        })?;
        Ok(Self {
            tokens,
            api_key_header,
            https_client: reqwest::Client::new(),
        })
    }

    /// Starts an authorized request.
    ///
    /// The credential used is returned alongside so a rejected token can be invalidated.
    pub async fn request(
        &self,
        method: Method,
        url: Url,
    ) -> Result<(RequestBuilder, Credential), FireflyError> {
        let credential = self.tokens.get_token().await?;
        let builder = self
            .https_client
            .request(method, url)
            .bearer_auth(&credential.access_token)
            .header(self.api_key_header.clone(), self.tokens.client_id())
            .header(ACCEPT, "application/json");
        Ok((builder, credential))
    }

    pub fn tokens(&self) -> &Arc<TokenProvider> {
        &self.tokens
    }

    /// Unauthenticated client for presigned storage URLs
    pub fn https_client(&self) -> &reqwest::Client {
        &self.https_client
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("tokens", &self.tokens)
            .field("api_key_header", &self.api_key_header)
            .finish()
    }
}
