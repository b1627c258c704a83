/*
 * Copyright (c) 2025 Craig Hamilton and Contributors.
 * Licensed under either of
 *  - Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> OR
 *  - MIT license <http://opensource.org/licenses/MIT>
 *  at your option.
 */
use crate::config::ServiceConfig;
use crate::errors::FireflyError;
use crate::parsers::from_empty_str_to_none;
use chrono::{DateTime, TimeDelta, Utc};
use log::debug;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use url::Url;

// Lifetime assumed when the token endpoint does not report `expires_in`
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 60 * 60;

/// Client id/secret pair from the Adobe Developer Console.
///
/// The client id doubles as the API key sent with every request.
#[derive(Default, Clone)]
pub struct Creds {
    client_id: String,
    client_secret: String,
}

impl Creds {
    pub fn from_tokens(client_id: &str, client_secret: &str) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Reads `CLIENT_ID` and `CLIENT_SECRET` from the environment
    pub fn from_env() -> Result<Self, FireflyError> {
        let read = |name: &str| {
            std::env::var(name).map_err(|_| FireflyError::Config(format!("{name} is not set")))
        };
        Ok(Self::from_tokens(&read("CLIENT_ID")?, &read("CLIENT_SECRET")?))
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl std::fmt::Debug for Creds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Creds")
            .field("client_id", &self.client_id)
            .field("client_secret", &"xxx")
            .finish()
    }
}

/// Bearer credential handed out by a [`TokenProvider`].
///
/// Replaced wholesale on refresh, never modified.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// True while the credential stays valid for at least `margin` from now
    pub fn is_fresh(&self, margin: Duration) -> bool {
        TimeDelta::from_std(margin)
            .ok()
            .and_then(|margin| Utc::now().checked_add_signed(margin))
            .is_some_and(|horizon| horizon < self.expires_at)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"xxx")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Acquires and caches client-credentials tokens.
///
/// Any number of tasks may call [`TokenProvider::get_token`] at once. While the cached
/// credential is fresh they only take a read lock; once it expires exactly one of them
/// performs the refresh and the others are served the result.
pub struct TokenProvider {
    creds: Creds,
    token_url: Url,
    scopes: Vec<String>,
    refresh_margin: Duration,
    https_client: reqwest::Client,
    cached: RwLock<Option<Credential>>,
    refresh: Mutex<()>,
}

impl TokenProvider {
    pub fn new(creds: Creds, token_url: Url, scopes: Vec<String>) -> Self {
        Self {
            creds,
            token_url,
            scopes,
            refresh_margin: Duration::from_secs(60),
            https_client: reqwest::Client::new(),
            cached: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    /// Creates a provider using the token endpoint, scopes and margin of `config`
    pub fn from_config(creds: Creds, config: &ServiceConfig) -> Result<Self, FireflyError> {
        let token_url = Url::parse(&config.token_url)?;
        Ok(Self::new(creds, token_url, config.scopes.clone())
            .with_refresh_margin(config.refresh_margin))
    }

    /// How long before `expires_at` a credential stops being served
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    pub fn with_http_client(mut self, https_client: reqwest::Client) -> Self {
        self.https_client = https_client;
        self
    }

    pub fn client_id(&self) -> &str {
        self.creds.client_id()
    }

    /// Returns the cached credential, refreshing it first if it has expired
    pub async fn get_token(&self) -> Result<Credential, FireflyError> {
        if let Some(credential) = self.cached_fresh().await {
            return Ok(credential);
        }

        let _refreshing = self.refresh.lock().await;
        // Whoever held the lock before us may already have refreshed
        if let Some(credential) = self.cached_fresh().await {
            return Ok(credential);
        }

        let credential = self.request_token().await?;
        *self.cached.write().await = Some(credential.clone());
        Ok(credential)
    }

    /// Drops the cached credential if it is still `stale`.
    ///
    /// Comparing against the rejected credential keeps a burst of rejections from
    /// discarding a token that was refreshed in the meantime.
    pub async fn invalidate(&self, stale: &Credential) {
        let mut cached = self.cached.write().await;
        if cached.as_ref() == Some(stale) {
            debug!("Discarding rejected access token");
            *cached = None;
        }
    }

    async fn cached_fresh(&self) -> Option<Credential> {
        self.cached
            .read()
            .await
            .as_ref()
            .filter(|credential| credential.is_fresh(self.refresh_margin))
            .cloned()
    }

    async fn request_token(&self) -> Result<Credential, FireflyError> {
        let scope = self.scopes.join(",");
        let mut form = vec![
            ("grant_type", "client_credentials"),
            ("client_id", self.creds.client_id.as_str()),
            ("client_secret", self.creds.client_secret.as_str()),
        ];
        if !scope.is_empty() {
            form.push(("scope", scope.as_str()));
        }

        debug!("Requesting access token from {}", self.token_url);
        let resp = self
            .https_client
            .post(self.token_url.clone())
            .form(&form)
            .send()
            .await
            .map_err(FireflyError::AuthRequest)?;
        let status = resp.status();
        let body = resp.text().await.map_err(FireflyError::AuthRequest)?;
        if !status.is_success() {
            return Err(FireflyError::AuthRejected {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|err| FireflyError::Auth(format!("malformed token response: {err}")))?;
        let access_token = token.access_token.ok_or_else(|| {
            FireflyError::Auth("token endpoint returned an empty access token".into())
        })?;
        let lifetime = token.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        debug!("Access token acquired, valid for {lifetime}s");

        Ok(Credential {
            access_token,
            expires_at: expires_at(lifetime),
        })
    }
}

impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenProvider")
            .field("creds", &self.creds)
            .field("token_url", &self.token_url.as_str())
            .field("scopes", &self.scopes)
            .finish()
    }
}

fn expires_at(lifetime_secs: u64) -> DateTime<Utc> {
    i64::try_from(lifetime_secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// Expected response from the token endpoint
#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default, deserialize_with = "from_empty_str_to_none")]
    access_token: Option<String>,

    #[serde(default)]
    expires_in: Option<u64>,
}
