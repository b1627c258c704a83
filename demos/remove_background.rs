/*
 * Copyright (c) 2025 Craig Hamilton and Contributors.
 * Licensed under either of
 *  - Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> OR
 *  - MIT license <http://opensource.org/licenses/MIT>
 *  at your option.
 */

extern crate firefly_services;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use firefly_services::{Client, Creds, JobStatus, Payload, Service};
use futures::{StreamExt, pin_mut};
use serde_json::json;
use tokio_util::sync::CancellationToken;

// Runs a Photoshop remove background job between two presigned storage URLs and reports
// each status change.
// Usage: cargo run --example remove_background -- <input url> <output url>
#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let input = args.next().context("missing input url")?;
    let output = args.next().context("missing output url")?;

    let client = Client::for_service(Creds::from_env()?, Service::Photoshop)?;

    let job = json!({
        "input": { "href": input, "storage": "dropbox" },
        "output": { "href": output, "storage": "dropbox", "overwrite": true }
    });
    let handle = client.submit("/sensei/cutout", Payload::Json(job)).await?;
    println!("Created job, checking status at {}", handle.status_url());

    // Ctrl-C stops polling
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let poller = client.poller();
    let statuses = poller.watch(handle, client.poll_policy(), &cancel);
    pin_mut!(statuses);
    while let Some(status) = statuses.next().await {
        match status? {
            JobStatus::Succeeded(result) => println!("Done: {result}"),
            JobStatus::Failed(error) => println!("Failed: {error}"),
            other => println!("Still working ({})", other.label()),
        }
    }
    Ok(())
}
