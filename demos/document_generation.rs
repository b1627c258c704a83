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
use firefly_services::{Client, Creds, Destination, Payload, Service};
use serde_json::json;
use std::path::Path;
use tokio_util::sync::CancellationToken;

const DOCX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

// Merges JSON data into a Word template and saves the rendered PDF.
// Usage: cargo run --example document_generation -- template.docx output/contract.pdf
#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let template = args.next().unwrap_or_else(|| "template.docx".to_string());
    let output = args
        .next()
        .unwrap_or_else(|| "output/contract.pdf".to_string());

    let client = Client::for_service(Creds::from_env()?, Service::PdfServices)?;

    // Ask for an upload location, then stream the template to it
    let asset = client
        .call("/assets", Payload::Json(json!({ "mediaType": DOCX_MEDIA_TYPE })))
        .await?;
    let upload_uri = asset["uploadUri"].as_str().context("no uploadUri in response")?;
    let asset_id = asset["assetID"].as_str().context("no assetID in response")?;
    client
        .put_file(upload_uri, Path::new(&template), DOCX_MEDIA_TYPE)
        .await?;
    println!("Uploaded {template}");

    let job = json!({
        "assetID": asset_id,
        "outputFormat": "pdf",
        "jsonDataForMerge": {
            "customerName": "Jane Doe",
            "customerVisits": 100
        }
    });

    if let Some(parent) = Path::new(&output).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let cancel = CancellationToken::new();
    let files = client
        .run(
            "/operation/documentgeneration",
            Payload::Json(job),
            &Destination::File(output.into()),
            &cancel,
        )
        .await?;
    for file in files {
        println!("Saved {}", file.display());
    }
    Ok(())
}
