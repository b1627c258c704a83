/*
 * Copyright (c) 2025 Craig Hamilton and Contributors.
 * Licensed under either of
 *  - Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> OR
 *  - MIT license <http://opensource.org/licenses/MIT>
 *  at your option.
 */
use crate::properties::Phase;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Error conditions that can be returned
///
/// Provider diagnostics (response bodies, job error payloads) are carried verbatim.
#[derive(Error, Debug)]
pub enum FireflyError {
    #[error("Authorization error. {0}")]
    Auth(String),

    #[error("Token request network error")]
    AuthRequest(#[source] reqwest::Error),

    #[error("Token endpoint returned {status}: {body}")]
    AuthRejected { status: u16, body: String },

    #[error("Job submission rejected with status {status}: {body}")]
    Submission { status: u16, body: String },

    #[error("Job submission network error")]
    SubmissionRequest(#[source] reqwest::Error),

    #[error("Expected response missing: {0}")]
    ResponseMissing(String),

    #[error("Job status check rejected with status {status}: {body}")]
    StatusCheck { status: u16, body: String },

    #[error("Job failed: {0}")]
    Job(serde_json::Value),

    #[error("Job not finished after {waited:?}, last status: {last_status:?}")]
    JobTimeout {
        waited: Duration,
        last_status: Option<String>,
    },

    #[error("Result download from {url} failed with status {status}: {body}")]
    Fetch {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Result download from {url} interrupted")]
    FetchTransfer {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Writing result to {} failed", .path.display())]
    FetchWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Job result does not reference any downloadable output")]
    NoOutputs,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("API Response is malformed: {0}")]
    ApiResponseMalformed(#[from] serde_json::Error),

    #[error("URL Parse error")]
    UrlParsing(#[from] url::ParseError),

    #[error("I/O error")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FireflyError {
    /// Which step of the submit, poll, fetch pipeline failed
    pub fn phase(&self) -> Phase {
        use FireflyError as E;
        match self {
            E::Auth(_) | E::AuthRequest(_) | E::AuthRejected { .. } => Phase::Auth,
            E::Submission { .. } | E::SubmissionRequest(_) | E::ResponseMissing(_) => {
                Phase::Submission
            }
            E::StatusCheck { .. } | E::Job(_) | E::JobTimeout { .. } => Phase::Polling,
            E::Fetch { .. } | E::FetchTransfer { .. } | E::FetchWrite { .. } | E::NoOutputs => {
                Phase::Fetch
            }
            E::Cancelled => Phase::Cancelled,
            E::ApiResponseMalformed(_) | E::UrlParsing(_) | E::Io(_) | E::Config(_) => {
                Phase::Other
            }
        }
    }

    /// True when the token endpoint could not be reached or was temporarily unavailable
    pub fn is_transient_auth(&self) -> bool {
        match self {
            FireflyError::AuthRequest(_) => true,
            FireflyError::AuthRejected { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
