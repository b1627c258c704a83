/*
 * Copyright (c) 2025 Craig Hamilton and Contributors.
 * Licensed under either of
 *  - Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> OR
 *  - MIT license <http://opensource.org/licenses/MIT>
 *  at your option.
 */
use crate::api::ApiClient;
use crate::client::JobHandle;
use crate::config::PollPolicy;
use crate::errors::FireflyError;
use crate::parsers::status_word;
use crate::properties::{StatusRule, StatusWord};
use async_stream::try_stream;
use futures::{Stream, StreamExt, pin_mut};
use log::{debug, info, warn};
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use strum_macros::IntoStaticStr;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// State of a job as reported by one status response
#[derive(Debug, Clone, PartialEq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    /// Provider result, e.g. an asset descriptor holding a download URL
    Succeeded(Value),
    /// Provider error payload
    Failed(Value),
}

impl JobStatus {
    /// Normalizes a status response body using `rule`
    pub fn from_body(body: Value, rule: StatusRule) -> Self {
        let word = match rule {
            StatusRule::TopLevel => top_level(&body),
            StatusRule::NestedOutputs => nested_outputs(&body),
            StatusRule::Presence => presence(&body),
            StatusRule::Auto => top_level(&body)
                .or_else(|| nested_outputs(&body))
                .or_else(|| presence(&body)),
        };
        match word {
            Some(StatusWord::Succeeded) => JobStatus::Succeeded(result_payload(body)),
            Some(StatusWord::Failed) => JobStatus::Failed(error_payload(body)),
            Some(StatusWord::Running) => JobStatus::Running,
            Some(StatusWord::Pending) | None => JobStatus::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded(_) | JobStatus::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        self.into()
    }
}

/// Outcome of a job that succeeded
#[derive(Debug, Clone)]
pub struct JobResult {
    pub status_url: Url,
    pub payload: Value,
    /// Status responses received, transient failures excluded
    pub polls: u32,
    pub elapsed: Duration,
}

// One status request either observes the job or hits a failure worth retrying
enum Check {
    Observed(JobStatus),
    Transient(String),
}

/// Polls job status URLs until the job is terminal
#[derive(Debug, Clone)]
pub struct JobPoller {
    api: Arc<ApiClient>,
}

impl JobPoller {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    /// Waits for the job behind `handle` to succeed.
    ///
    /// A failed job is reported as [`FireflyError::Job`] without further polls. Failures of
    /// the status request itself (network errors, 5xx, 429, unreadable bodies) are retried
    /// until `policy.max_wait` runs out, which ends in [`FireflyError::JobTimeout`].
    pub async fn wait_until_terminal(
        &self,
        handle: JobHandle,
        policy: &PollPolicy,
        cancel: &CancellationToken,
    ) -> Result<JobResult, FireflyError> {
        let status_url = handle.status_url().clone();
        let started = Instant::now();
        let statuses = self.watch(handle, policy, cancel);
        pin_mut!(statuses);

        let mut polls = 0;
        while let Some(status) = statuses.next().await {
            polls += 1;
            match status? {
                JobStatus::Succeeded(payload) => {
                    info!("Job at {status_url} succeeded after {polls} poll(s)");
                    return Ok(JobResult {
                        status_url,
                        payload,
                        polls,
                        elapsed: started.elapsed(),
                    });
                }
                JobStatus::Failed(error) => {
                    info!("Job at {status_url} failed: {error}");
                    return Err(FireflyError::Job(error));
                }
                JobStatus::Pending | JobStatus::Running => {}
            }
        }
        Err(FireflyError::ResponseMissing(format!(
            "status stream for {status_url} ended without a terminal state"
        )))
    }

    /// Streams every status observed for the job behind `handle`.
    ///
    /// The stream ends after the first terminal status, or with an error on timeout,
    /// cancellation or a rejected status request.
    pub fn watch<'a>(
        &'a self,
        handle: JobHandle,
        policy: &'a PollPolicy,
        cancel: &'a CancellationToken,
    ) -> impl Stream<Item = Result<JobStatus, FireflyError>> + 'a {
        try_stream! {
            let started = Instant::now();
            let deadline = started + policy.max_wait;
            let mut attempt: u32 = 0;
            let mut last_status: Option<String> = None;

            loop {
                let check = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(FireflyError::Cancelled),
                    checked = tokio::time::timeout_at(
                        deadline,
                        self.check(handle.status_url(), policy.status_rule),
                    ) => checked.unwrap_or_else(|_| Err(FireflyError::JobTimeout {
                        waited: started.elapsed(),
                        last_status: last_status.clone(),
                    })),
                }?;

                match check {
                    Check::Observed(status) => {
                        debug!("Job at {} is {}", handle.status_url(), status.label());
                        let terminal = status.is_terminal();
                        last_status = Some(status.label().to_string());
                        yield status;
                        if terminal {
                            break;
                        }
                    }
                    Check::Transient(reason) => {
                        warn!("Status check for {} failed, will retry: {reason}", handle.status_url());
                        last_status = Some(reason);
                    }
                }

                let now = Instant::now();
                if now >= deadline {
                    Err::<(), _>(FireflyError::JobTimeout {
                        waited: now - started,
                        last_status: last_status.clone(),
                    })?;
                }
                let delay = policy
                    .jittered(policy.delay_for(attempt))
                    .min(deadline - now);
                attempt = attempt.saturating_add(1);

                let cancelled = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => true,
                    _ = tokio::time::sleep(delay) => false,
                };
                if cancelled {
                    Err::<(), _>(FireflyError::Cancelled)?;
                }
            }
        }
    }

    async fn check(&self, status_url: &Url, rule: StatusRule) -> Result<Check, FireflyError> {
        let (req, credential) = match self.api.request(Method::GET, status_url.clone()).await {
            Ok(signed) => signed,
            Err(err) if err.is_transient_auth() => {
                return Ok(Check::Transient(format!("token refresh failed: {err}")));
            }
            Err(err) => return Err(err),
        };
        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(err) => return Ok(Check::Transient(format!("request failed: {err}"))),
        };

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            self.api.tokens().invalidate(&credential).await;
            return Ok(Check::Transient("access token rejected".into()));
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(Check::Transient(format!("status {}", status.as_u16())));
        }

        let body = match resp.text().await {
            Ok(body) => body,
            Err(err) => return Ok(Check::Transient(format!("reading body failed: {err}"))),
        };
        if !status.is_success() {
            return Err(FireflyError::StatusCheck {
                status: status.as_u16(),
                body,
            });
        }

        Ok(match serde_json::from_str::<Value>(&body) {
            Ok(body) => Check::Observed(JobStatus::from_body(body, rule)),
            Err(err) => Check::Transient(format!("malformed status body: {err}")),
        })
    }
}

fn word_at(value: &Value) -> Option<StatusWord> {
    value.get("status").and_then(Value::as_str).map(status_word)
}

fn top_level(body: &Value) -> Option<StatusWord> {
    word_at(body)
}

// Failed if any output failed, succeeded once every output has
fn nested_outputs(body: &Value) -> Option<StatusWord> {
    let outputs = body.get("outputs")?.as_array()?;
    let words: Vec<StatusWord> = outputs.iter().filter_map(word_at).collect();
    if words.is_empty() {
        return None;
    }
    let word = if words.contains(&StatusWord::Failed) {
        StatusWord::Failed
    } else if words.len() == outputs.len() && words.iter().all(|w| *w == StatusWord::Succeeded) {
        StatusWord::Succeeded
    } else if words
        .iter()
        .any(|w| matches!(w, StatusWord::Running | StatusWord::Succeeded))
    {
        StatusWord::Running
    } else {
        StatusWord::Pending
    };
    Some(word)
}

fn presence(body: &Value) -> Option<StatusWord> {
    let has = |key: &str| body.get(key).is_some_and(|v| !v.is_null());
    if has("asset") || (has("content") && has("resource")) {
        Some(StatusWord::Succeeded)
    } else if has("error") || top_level(body) == Some(StatusWord::Failed) {
        Some(StatusWord::Failed)
    } else {
        None
    }
}

fn take_field(body: &mut Value, key: &str) -> Option<Value> {
    body.as_object_mut()?.remove(key)
}

fn result_payload(mut body: Value) -> Value {
    if let Some(asset) = take_field(&mut body, "asset") {
        return asset;
    }
    if body.get("content").is_some() && body.get("resource").is_some() {
        let content = take_field(&mut body, "content");
        let resource = take_field(&mut body, "resource");
        return json!({ "content": content, "resource": resource });
    }
    take_field(&mut body, "result").unwrap_or(body)
}

fn error_payload(mut body: Value) -> Value {
    if let Some(error) = take_field(&mut body, "error").or_else(|| take_field(&mut body, "errors")) {
        return error;
    }
    let failed_output = body
        .get("outputs")
        .and_then(Value::as_array)
        .and_then(|outputs| {
            outputs
                .iter()
                .find(|output| word_at(output) == Some(StatusWord::Failed))
        })
        .and_then(|output| output.get("errors"))
        .cloned();
    failed_output.unwrap_or(body)
}
