/*
 * Copyright (c) 2025 Craig Hamilton and Contributors.
 * Licensed under either of
 *  - Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> OR
 *  - MIT license <http://opensource.org/licenses/MIT>
 *  at your option.
 */
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString, IntoStaticStr};

/// Services with a preset [`crate::ServiceConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Service {
    Firefly,
    Photoshop,
    PdfServices,
}

/// Where a status response keeps the job's state.
///
/// Providers disagree: some return `status` at the top level, Photoshop document operations
/// report per output under `outputs[n].status`, and PDF Services signals completion by
/// including an `asset` (or a `content`/`resource` pair for extraction jobs).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StatusRule {
    TopLevel,
    NestedOutputs,
    Presence,
    /// Top level, then nested outputs, then presence
    #[default]
    Auto,
}

/// Pipeline phase an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr, Display)]
pub enum Phase {
    Auth,
    Submission,
    Polling,
    Fetch,
    Cancelled,
    Other,
}

// Status words reported by the services. Anything unrecognised is treated as pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(ascii_case_insensitive)]
pub(crate) enum StatusWord {
    #[strum(serialize = "pending", serialize = "not_started", serialize = "queued")]
    Pending,
    #[strum(
        serialize = "running",
        serialize = "in_progress",
        serialize = "in progress",
        serialize = "processing"
    )]
    Running,
    #[strum(
        serialize = "succeeded",
        serialize = "done",
        serialize = "completed",
        serialize = "success"
    )]
    Succeeded,
    #[strum(
        serialize = "failed",
        serialize = "failure",
        serialize = "error",
        serialize = "cancelled",
        serialize = "canceled"
    )]
    Failed,
}
