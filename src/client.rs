/*
 * Copyright (c) 2025 Craig Hamilton and Contributors.
 * Licensed under either of
 *  - Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> OR
 *  - MIT license <http://opensource.org/licenses/MIT>
 *  at your option.
 */
use crate::api::ApiClient;
use crate::auth::{Creds, TokenProvider};
use crate::config::{PollPolicy, ServiceConfig};
use crate::errors::FireflyError;
use crate::fetcher::{Destination, ResultFetcher};
use crate::poller::JobPoller;
use crate::properties::Service;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use log::{debug, info};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, LOCATION};
use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Request body for a job submission
#[derive(Debug, Clone)]
pub enum Payload {
    Json(Value),
    Bytes { data: Bytes, content_type: String },
    /// Streamed from disk; the length is taken from the file metadata before sending
    File { path: PathBuf, content_type: String },
}

impl Payload {
    pub fn json<T: Serialize>(value: &T) -> Result<Self, FireflyError> {
        Ok(Payload::Json(serde_json::to_value(value)?))
    }

    pub fn file(path: impl Into<PathBuf>, content_type: &str) -> Self {
        Payload::File {
            path: path.into(),
            content_type: content_type.into(),
        }
    }
}

/// Identifies one in-flight asynchronous job.
///
/// Handles are single use: the poller takes ownership, so a finished job cannot be polled
/// again by mistake.
#[derive(Debug, Clone)]
pub struct JobHandle {
    status_url: Url,
    submitted_at: DateTime<Utc>,
    submission: Value,
}

impl JobHandle {
    /// Resumes a job whose status URL is already known
    pub fn new(status_url: Url, submission: Value) -> Self {
        Self {
            status_url,
            submitted_at: Utc::now(),
            submission,
        }
    }

    pub fn status_url(&self) -> &Url {
        &self.status_url
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    /// Body returned by the submission request
    pub fn submission(&self) -> &Value {
        &self.submission
    }
}

/// Submits jobs to one service.
///
/// Cloning is cheap; clones share the token cache, so one client can feed many concurrent
/// submit, poll, fetch pipelines.
#[derive(Debug, Clone)]
pub struct Client {
    api: Arc<ApiClient>,
    origin: Url,
    poll: PollPolicy,
}

impl Client {
    pub fn new(creds: Creds, config: ServiceConfig) -> Result<Self, FireflyError> {
        let tokens = Arc::new(TokenProvider::from_config(creds, &config)?);
        Self::with_token_provider(tokens, &config)
    }

    /// Creates a client for one of the preset services
    pub fn for_service(creds: Creds, service: Service) -> Result<Self, FireflyError> {
        Self::new(creds, ServiceConfig::for_service(service))
    }

    /// Creates a client that shares an existing token cache
    pub fn with_token_provider(
        tokens: Arc<TokenProvider>,
        config: &ServiceConfig,
    ) -> Result<Self, FireflyError> {
        Ok(Self {
            api: Arc::new(ApiClient::new(tokens, &config.api_key_header)?),
            origin: Url::parse(&config.api_origin)?,
            poll: config.poll.clone(),
        })
    }

    /// Resolves `endpoint` against the API origin; absolute URLs are kept as is
    pub fn endpoint(&self, endpoint: &str) -> Result<Url, FireflyError> {
        Ok(self.origin.join(endpoint)?)
    }

    /// Default policy used by [`Client::run`]
    pub fn poll_policy(&self) -> &PollPolicy {
        &self.poll
    }

    pub fn tokens(&self) -> &Arc<TokenProvider> {
        self.api.tokens()
    }

    pub fn poller(&self) -> JobPoller {
        JobPoller::new(self.api.clone())
    }

    pub fn fetcher(&self) -> ResultFetcher {
        ResultFetcher::new(self.api.https_client().clone())
    }

    /// Creates an asynchronous job and returns a handle to poll it with.
    ///
    /// The status URL is read from the `Location` header, `_links.self.href` or `statusUrl`.
    ///
    /// Dropping the returned future aborts the request, so callers holding a
    /// [`CancellationToken`] can race it with `tokio::select!` the way [`Client::run`] does.
    pub async fn submit(&self, endpoint: &str, payload: Payload) -> Result<JobHandle, FireflyError> {
        let url = self.endpoint(endpoint)?;
        let (headers, body) = self.send(url.clone(), payload).await?;
        let submission = parse_body(&body);
        match status_url_from(&url, &headers, &submission) {
            Some(status_url) => {
                info!("Job submitted to {url}, status at {status_url}");
                Ok(JobHandle::new(status_url, submission))
            }
            None => Err(FireflyError::ResponseMissing(format!(
                "no status URL in response from {url}: {body}"
            ))),
        }
    }

    /// Calls an endpoint that answers with its result inline.
    ///
    /// Cancelled by dropping the future, like [`Client::submit`].
    pub async fn call(&self, endpoint: &str, payload: Payload) -> Result<Value, FireflyError> {
        let url = self.endpoint(endpoint)?;
        let (_, body) = self.send(url, payload).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Uploads a file to a presigned storage URL.
    ///
    /// No credentials are attached; the file is streamed with its length set up front.
    /// Cancelled by dropping the future.
    pub async fn put_file(
        &self,
        url: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<(), FireflyError> {
        let url = Url::parse(url)?;
        let (body, len) = file_body(path).await?;
        debug!("Uploading {} ({len} bytes)", path.display());
        let resp = self
            .api
            .https_client()
            .put(url)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, len)
            .body(body)
            .send()
            .await
            .map_err(FireflyError::SubmissionRequest)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FireflyError::Submission {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    /// Submits a job, waits for it with the client's poll policy and downloads its outputs
    pub async fn run(
        &self,
        endpoint: &str,
        payload: Payload,
        destination: &Destination,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>, FireflyError> {
        let handle = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FireflyError::Cancelled),
            handle = self.submit(endpoint, payload) => handle?,
        };
        let result = self
            .poller()
            .wait_until_terminal(handle, &self.poll, cancel)
            .await?;
        self.fetcher().fetch(&result.payload, destination, cancel).await
    }

    // Sends an authorized POST, the body is returned even on success
    async fn send(&self, url: Url, payload: Payload) -> Result<(HeaderMap, String), FireflyError> {
        let (req, _) = self.api.request(Method::POST, url.clone()).await?;
        let req = with_payload(req, payload).await?;
        debug!("POST {url}");
        let resp = req.send().await.map_err(FireflyError::SubmissionRequest)?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.text().await.map_err(FireflyError::SubmissionRequest)?;
        if !status.is_success() {
            return Err(FireflyError::Submission {
                status: status.as_u16(),
                body,
            });
        }
        Ok((headers, body))
    }
}

async fn with_payload(req: RequestBuilder, payload: Payload) -> Result<RequestBuilder, FireflyError> {
    Ok(match payload {
        Payload::Json(value) => req.json(&value),
        Payload::Bytes { data, content_type } => req.header(CONTENT_TYPE, content_type).body(data),
        Payload::File { path, content_type } => {
            let (body, len) = file_body(&path).await?;
            req.header(CONTENT_TYPE, content_type)
                .header(CONTENT_LENGTH, len)
                .body(body)
        }
    })
}

async fn file_body(path: &Path) -> Result<(reqwest::Body, u64), FireflyError> {
    let file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    Ok((reqwest::Body::wrap_stream(ReaderStream::new(file)), len))
}

// Empty bodies become null and non-JSON bodies are kept as a string
fn parse_body(body: &str) -> Value {
    if body.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

fn status_url_from(request_url: &Url, headers: &HeaderMap, body: &Value) -> Option<Url> {
    let location = headers.get(LOCATION).and_then(|v| v.to_str().ok());
    let self_link = body.pointer("/_links/self/href").and_then(Value::as_str);
    let status_url = body.get("statusUrl").and_then(Value::as_str);
    location
        .or(self_link)
        .or(status_url)
        .and_then(|s| request_url.join(s).ok())
}
