/*
 * Copyright (c) 2025 Craig Hamilton and Contributors.
 * Licensed under either of
 *  - Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> OR
 *  - MIT license <http://opensource.org/licenses/MIT>
 *  at your option.
 */

extern crate firefly_services;

use anyhow::Result;
use dotenvy::dotenv;
use firefly_services::{Client, Creds, Destination, Payload, Service};
use serde_json::json;
use tokio_util::sync::CancellationToken;

// Generates images for a prompt and saves them into ./output
// Usage: cargo run --example text_to_image -- "cats on unicorns under a rainbow"
#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init();

    let prompt = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "a cat riding a unicorn headed into the sunset".to_string());

    // CLIENT_ID and CLIENT_SECRET come from the Adobe Developer Console
    let client = Client::for_service(Creds::from_env()?, Service::Firefly)?;

    let body = json!({
        "numVariations": 2,
        "prompt": prompt,
        "contentClass": "photo",
        "size": { "width": 2048, "height": 2048 }
    });

    // Generation answers inline, so there is no job to poll
    let result = client.call("/v3/images/generate", Payload::Json(body)).await?;

    std::fs::create_dir_all("output")?;
    let cancel = CancellationToken::new();
    let files = client
        .fetcher()
        .fetch(&result, &Destination::Directory("output".into()), &cancel)
        .await?;

    for file in files {
        println!("Saved {}", file.display());
    }
    Ok(())
}
