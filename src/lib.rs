/*
 * Copyright (c) 2025 Craig Hamilton and Contributors.
 * Licensed under either of
 *  - Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> OR
 *  - MIT license <http://opensource.org/licenses/MIT>
 *  at your option.
 */

//! # Firefly Services
//!
//! This library was created for working with the asynchronous job APIs of Adobe Firefly,
//! Photoshop and PDF Services.
//!
//! Every one of those APIs follows the same shape: get an OAuth2 client-credentials token,
//! submit a job, poll its status URL until it is done, then download the outputs. This crate
//! provides one piece for each step.
//!
//! ## Features
//!
//! - Token acquisition and caching ([`TokenProvider`])
//!     - Refreshes shortly before expiry
//!     - Concurrent callers share a single refresh
//! - Job submission ([`Client`])
//!     - JSON, in-memory or streamed file bodies
//!     - Synchronous endpoints through [`Client::call`]
//!     - Presigned uploads through [`Client::put_file`]
//! - Job polling ([`JobPoller`])
//!     - Fixed or exponential delays bounded by a maximum wait
//!     - Normalizes the different status layouts of each service ([`StatusRule`])
//!     - Transient status-check failures are retried, failed jobs are not
//! - Result downloads ([`ResultFetcher`])
//!     - Partial downloads never end up at the destination path
//! - Cancellation of every step through a [`tokio_util::sync::CancellationToken`]
//!
//! ## Installation
//!
//! ```toml
//! [dependencies]
//! firefly-services = "0.1.0"
//! ```
//!
//! ## Usage
//!
//! **You will need a client id/secret from the Adobe Developer Console**
//!
//! ```rust,no_run
//! use firefly_services::{Client, Creds, Destination, Payload, Service};
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn remove_background(input_url: &str, output_url: &str) -> anyhow::Result<()> {
//!     let client = Client::for_service(Creds::from_env()?, Service::Photoshop)?;
//!
//!     let job = json!({
//!         "input": { "href": input_url, "storage": "dropbox" },
//!         "output": { "href": output_url, "storage": "dropbox", "overwrite": true }
//!     });
//!     let handle = client.submit("/sensei/cutout", Payload::Json(job)).await?;
//!
//!     let cancel = CancellationToken::new();
//!     let result = client
//!         .poller()
//!         .wait_until_terminal(handle, client.poll_policy(), &cancel)
//!         .await?;
//!     println!("Finished after {} poll(s): {}", result.polls, result.payload);
//!     Ok(())
//! }
//!
//! // Jobs whose result holds download links can run end to end
//! async fn generate_pdf(client: &Client, job: serde_json::Value) -> anyhow::Result<()> {
//!     let cancel = CancellationToken::new();
//!     let files = client
//!         .run(
//!             "/operation/documentgeneration",
//!             Payload::Json(job),
//!             &Destination::File("output/contract.pdf".into()),
//!             &cancel,
//!         )
//!         .await?;
//!     println!("Saved {files:?}");
//!     Ok(())
//! }
//! ```
//!
pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod errors;
pub mod fetcher;
mod parsers;
pub mod poller;
pub mod properties;

pub use api::*;
pub use auth::*;
pub use client::*;
pub use config::*;
pub use errors::*;
pub use fetcher::*;
pub use poller::*;
pub use properties::*;
