//! Byte sources for images addressed by URL.
//!
//! The engine never talks to the network directly; hosts inject an
//! [`ImageFetcher`]. [`LocalFetcher`] covers filesystem paths, `file://`
//! URLs and base64 `data:` URIs, which is all the CLI needs.

use std::borrow::Cow;
use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail, ensure};
use base64::Engine;
use futures::future::BoxFuture;

pub trait ImageFetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>>>;
}

/// Reads paths, `file://` URLs and `data:` URIs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFetcher;

impl ImageFetcher for LocalFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            if url.starts_with("data:") {
                return decode_data_uri(url);
            }
            let path = url.strip_prefix("file://").unwrap_or(url);
            ensure!(!path.is_empty(), "empty image path");
            tokio::fs::read(path)
                .await
                .with_context(|| format!("failed to read {path}"))
        })
    }
}

/// In-memory fetcher keyed by URL, with optional per-URL latency.
#[derive(Debug, Default, Clone)]
pub struct MemoryFetcher {
    entries: HashMap<String, (Vec<u8>, Duration)>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: impl Into<String>, bytes: Vec<u8>) -> &mut Self {
        self.entries.insert(url.into(), (bytes, Duration::ZERO));
        self
    }

    pub fn insert_delayed(
        &mut self,
        url: impl Into<String>,
        bytes: Vec<u8>,
        delay: Duration,
    ) -> &mut Self {
        self.entries.insert(url.into(), (bytes, delay));
        self
    }
}

impl ImageFetcher for MemoryFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            let (bytes, delay) = self
                .entries
                .get(url)
                .ok_or_else(|| anyhow!("no entry for {}", short_url(url)))?;
            if !delay.is_zero() {
                tokio::time::sleep(*delay).await;
            }
            Ok(bytes.clone())
        })
    }
}

pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| anyhow!("not a data URI"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| anyhow!("data URI is missing the ',' separator"))?;
    if !header.split(';').any(|part| part.eq_ignore_ascii_case("base64")) {
        bail!("only base64 data URIs are supported");
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .context("invalid base64 payload in data URI")
}

pub fn encode_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{mime};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// URL suitable for logs and error messages; data URIs are elided.
pub fn short_url(url: &str) -> Cow<'_, str> {
    if url.starts_with("data:") {
        let header = url.split(',').next().unwrap_or("data:");
        Cow::Owned(format!("{header},…"))
    } else {
        Cow::Borrowed(url)
    }
}
