/*
 * Copyright (c) 2025 Craig Hamilton and Contributors.
 * Licensed under either of
 *  - Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> OR
 *  - MIT license <http://opensource.org/licenses/MIT>
 *  at your option.
 */
use crate::errors::FireflyError;
use futures::StreamExt;
use log::{debug, info};
use serde_json::Value;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use url::Url;

// Keys whose string values are download locations
const URL_KEYS: [&str; 4] = ["downloadUri", "presignedUrl", "url", "href"];

/// Where downloaded outputs are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// First output goes here, further ones become `stem-1.ext`, `stem-2.ext`, ...
    File(PathBuf),
    /// Outputs are named after the last segment of their URL
    Directory(PathBuf),
}

impl Destination {
    fn path_for(&self, url: &Url, index: usize) -> PathBuf {
        match self {
            Destination::File(path) if index == 0 => path.clone(),
            Destination::File(path) => with_index(path, index),
            Destination::Directory(dir) => {
                let name = url
                    .path_segments()
                    .and_then(|mut segments| segments.next_back())
                    .filter(|segment| !segment.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("output-{index}"));
                dir.join(name)
            }
        }
    }
}

/// Downloads the outputs referenced by a finished job
#[derive(Debug, Clone, Default)]
pub struct ResultFetcher {
    https_client: reqwest::Client,
}

impl ResultFetcher {
    pub fn new(https_client: reqwest::Client) -> Self {
        Self { https_client }
    }

    /// Downloads every output referenced by `result` into `destination`.
    ///
    /// Each output is written to a `.part` file first and only renamed into place once it is
    /// complete, so a failed or cancelled transfer never leaves a file that looks finished.
    pub async fn fetch(
        &self,
        result: &Value,
        destination: &Destination,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>, FireflyError> {
        let urls = download_urls(result);
        if urls.is_empty() {
            return Err(FireflyError::NoOutputs);
        }

        let mut written: Vec<PathBuf> = Vec::with_capacity(urls.len());
        for (index, url) in urls.iter().enumerate() {
            let mut path = destination.path_for(url, index);
            if written.contains(&path) {
                path = with_index(&path, index);
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FireflyError::Cancelled),
                downloaded = self.download(url, &path) => downloaded?,
            }
            written.push(path);
        }
        Ok(written)
    }

    async fn download(&self, url: &Url, path: &Path) -> Result<(), FireflyError> {
        debug!("Downloading {url} to {}", path.display());
        let transfer_err = |source| FireflyError::FetchTransfer {
            url: url.to_string(),
            source,
        };

        let resp = self
            .https_client
            .get(url.clone())
            .send()
            .await
            .map_err(transfer_err)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FireflyError::Fetch {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let mut part = PartialFile::create(path).await?;
        let streamed = async {
            let mut chunks = resp.bytes_stream();
            while let Some(chunk) = chunks.next().await {
                part.write(&chunk.map_err(transfer_err)?).await?;
            }
            Ok::<_, FireflyError>(())
        }
        .await;
        if let Err(err) = streamed {
            part.discard().await;
            return Err(err);
        }
        part.commit().await?;
        info!("Wrote {}", path.display());
        Ok(())
    }
}

/// Collects the http(s) download URLs referenced anywhere in a result payload.
///
/// Order follows a depth-first walk and duplicates are dropped. `_links` blocks are skipped
/// since they point back at the job API rather than at outputs.
pub fn download_urls(result: &Value) -> Vec<Url> {
    let mut urls = Vec::new();
    if let Some(s) = result.as_str() {
        push_url(s, &mut urls);
    }
    collect_urls(result, &mut urls);
    urls
}

fn collect_urls(value: &Value, urls: &mut Vec<Url>) {
    match value {
        Value::Object(map) => {
            for (key, value) in map {
                match value.as_str() {
                    Some(s) if URL_KEYS.contains(&key.as_str()) => push_url(s, urls),
                    _ if key == "_links" => {}
                    _ => collect_urls(value, urls),
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_urls(item, urls)),
        _ => {}
    }
}

fn push_url(s: &str, urls: &mut Vec<Url>) {
    if let Ok(url) = Url::parse(s) {
        if matches!(url.scheme(), "http" | "https") && !urls.contains(&url) {
            urls.push(url);
        }
    }
}

fn with_index(path: &Path, index: usize) -> PathBuf {
    let stem = path.file_stem().map(OsString::from).unwrap_or_default();
    let mut name = stem;
    name.push(format!("-{index}"));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

// Output being written; removed on drop unless committed or discarded
struct PartialFile {
    part_path: PathBuf,
    final_path: PathBuf,
    file: Option<tokio::fs::File>,
    settled: bool,
}

impl PartialFile {
    async fn create(final_path: &Path) -> Result<Self, FireflyError> {
        let mut name = final_path.file_name().map(OsString::from).unwrap_or_default();
        name.push(".part");
        let part_path = final_path.with_file_name(name);
        let file = tokio::fs::File::create(&part_path)
            .await
            .map_err(|source| write_err(final_path, source))?;
        Ok(Self {
            part_path,
            final_path: final_path.to_path_buf(),
            file: Some(file),
            settled: false,
        })
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<(), FireflyError> {
        if let Some(file) = self.file.as_mut() {
            file.write_all(chunk)
                .await
                .map_err(|source| write_err(&self.final_path, source))?;
        }
        Ok(())
    }

    async fn commit(mut self) -> Result<(), FireflyError> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .await
                .map_err(|source| write_err(&self.final_path, source))?;
            file.sync_all()
                .await
                .map_err(|source| write_err(&self.final_path, source))?;
        }
        tokio::fs::rename(&self.part_path, &self.final_path)
            .await
            .map_err(|source| write_err(&self.final_path, source))?;
        self.settled = true;
        Ok(())
    }

    async fn discard(mut self) {
        drop(self.file.take());
        if let Err(err) = tokio::fs::remove_file(&self.part_path).await {
            debug!("Could not remove {}: {err}", self.part_path.display());
        }
        self.settled = true;
    }
}

// Blocking unlink, only reached when the download future is dropped mid-transfer
impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.settled {
            drop(self.file.take());
            let _ = std::fs::remove_file(&self.part_path);
        }
    }
}

fn write_err(path: &Path, source: std::io::Error) -> FireflyError {
    FireflyError::FetchWrite {
        path: path.to_path_buf(),
        source,
    }
}
