/*
 * Copyright (c) 2025 Craig Hamilton and Contributors.
 * Licensed under either of
 *  - Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> OR
 *  - MIT license <http://opensource.org/licenses/MIT>
 *  at your option.
 */
use crate::errors::FireflyError;
use crate::parsers::duration_ms;
use crate::properties::{Service, StatusRule};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::time::Duration;

// Adobe IMS client-credentials endpoint shared by Firefly and Photoshop
const IMS_TOKEN_URL: &str = "https://ims-na1.adobelogin.com/ims/token/v3";

/// Endpoints and defaults for one service.
///
/// Use one of the presets or load it from JSON with [`ServiceConfig::from_reader`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// OAuth2 client-credentials endpoint
    pub token_url: String,

    /// Relative endpoints are resolved against this origin
    pub api_origin: String,

    /// Joined with `,` into the `scope` form field, omitted when empty
    #[serde(default)]
    pub scopes: Vec<String>,

    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,

    #[serde(default = "default_refresh_margin", with = "duration_ms")]
    pub refresh_margin: Duration,

    #[serde(default)]
    pub poll: PollPolicy,
}

impl ServiceConfig {
    pub fn firefly() -> Self {
        Self {
            token_url: IMS_TOKEN_URL.into(),
            api_origin: "https://firefly-api.adobe.io".into(),
            scopes: scopes(&[
                "openid",
                "AdobeID",
                "session",
                "additional_info",
                "read_organizations",
                "firefly_api",
                "ff_apis",
            ]),
            api_key_header: default_api_key_header(),
            refresh_margin: default_refresh_margin(),
            poll: PollPolicy::fixed(Duration::from_secs(1), default_max_wait()),
        }
    }

    pub fn photoshop() -> Self {
        Self {
            token_url: IMS_TOKEN_URL.into(),
            api_origin: "https://image.adobe.io".into(),
            scopes: scopes(&["openid", "AdobeID", "read_organizations"]),
            api_key_header: default_api_key_header(),
            refresh_margin: default_refresh_margin(),
            poll: PollPolicy::fixed(Duration::from_secs(3), default_max_wait()),
        }
    }

    pub fn pdf_services() -> Self {
        Self {
            token_url: "https://pdf-services-ue1.adobe.io/token".into(),
            api_origin: "https://pdf-services-ue1.adobe.io".into(),
            scopes: Vec::new(),
            api_key_header: default_api_key_header(),
            refresh_margin: default_refresh_margin(),
            poll: PollPolicy::fixed(Duration::from_secs(2), default_max_wait())
                .with_status_rule(StatusRule::Presence),
        }
    }

    pub fn for_service(service: Service) -> Self {
        match service {
            Service::Firefly => Self::firefly(),
            Service::Photoshop => Self::photoshop(),
            Service::PdfServices => Self::pdf_services(),
        }
    }

    /// Reads a JSON encoded config
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, FireflyError> {
        serde_json::from_reader(reader)
            .map_err(|err| FireflyError::Config(format!("invalid service config: {err}")))
    }
}

/// Delay growth between status polls
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    Fixed {
        #[serde(with = "duration_ms")]
        delay: Duration,
    },
    Exponential {
        #[serde(with = "duration_ms")]
        initial: Duration,
        #[serde(with = "duration_ms")]
        max: Duration,
        multiplier: f64,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Exponential {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(10),
            multiplier: 1.5,
        }
    }
}

/// How a job is polled until it reaches a terminal state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollPolicy {
    #[serde(default)]
    pub backoff: Backoff,

    /// Stretch each delay by a random 0-100%
    #[serde(default)]
    pub jitter: bool,

    /// Upper bound on the whole wait, transient failures included
    #[serde(default = "default_max_wait", with = "duration_ms")]
    pub max_wait: Duration,

    #[serde(default)]
    pub status_rule: StatusRule,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            backoff: Backoff::default(),
            jitter: false,
            max_wait: default_max_wait(),
            status_rule: StatusRule::default(),
        }
    }
}

impl PollPolicy {
    pub fn fixed(delay: Duration, max_wait: Duration) -> Self {
        Self {
            backoff: Backoff::Fixed { delay },
            max_wait,
            ..Self::default()
        }
    }

    pub fn exponential(initial: Duration, max: Duration, multiplier: f64, max_wait: Duration) -> Self {
        Self {
            backoff: Backoff::Exponential {
                initial,
                max,
                multiplier,
            },
            max_wait,
            ..Self::default()
        }
    }

    pub fn with_status_rule(mut self, status_rule: StatusRule) -> Self {
        self.status_rule = status_rule;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay to sleep after the `attempt`-th poll (zero based), before jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed { delay } => delay,
            Backoff::Exponential {
                initial,
                max,
                multiplier,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let secs = (initial.as_secs_f64() * multiplier.powi(exponent))
                    .min(max.as_secs_f64())
                    .max(0.0);
                Duration::try_from_secs_f64(secs).unwrap_or(max)
            }
        }
    }

    pub(crate) fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter {
            return delay;
        }
        let factor = 1.0 + rand::random::<f64>();
        Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(delay)
    }
}

fn scopes(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn default_api_key_header() -> String {
    "x-api-key".into()
}

fn default_refresh_margin() -> Duration {
    Duration::from_secs(60)
}

fn default_max_wait() -> Duration {
    Duration::from_secs(5 * 60)
}
