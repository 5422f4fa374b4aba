//! Cancellable HTTP downloads.
//!
//! A 404 maps to [`Error::NotFound`]; any other non-success status or
//! transport failure maps to [`Error::Network`]. Nothing is retried.

use std::path::Path;

use apkroot_schema::{PackageName, Version};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::StatusCode;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::context::Context;
use crate::error::{Error, Result};

async fn send(ctx: &Context, url: &str) -> Result<reqwest::Response> {
    ctx.ensure_active()?;
    debug!(url, "GET");

    let response = tokio::select! {
        res = ctx.client.get(url).send() => res.map_err(|e| Error::network(url, e))?,
        () = ctx.cancel.cancelled() => return Err(Error::Cancelled),
    };

    match response.status() {
        s if s.is_success() => Ok(response),
        StatusCode::NOT_FOUND => Err(Error::NotFound {
            what: url.to_string(),
        }),
        s => Err(Error::network(url, format!("HTTP {s}"))),
    }
}

/// Fetch a whole response body into memory.
///
/// # Errors
///
/// See the module documentation.
pub async fn fetch_bytes(ctx: &Context, url: &str) -> Result<Bytes> {
    let response = send(ctx, url).await?;
    let mut stream = response.bytes_stream();
    let mut body = BytesMut::new();

    loop {
        let chunk = tokio::select! {
            chunk = stream.next() => chunk,
            () = ctx.cancel.cancelled() => return Err(Error::Cancelled),
        };
        match chunk {
            Some(chunk) => body.extend_from_slice(&chunk.map_err(|e| Error::network(url, e))?),
            None => break,
        }
    }

    Ok(body.freeze())
}

/// Stream a response body to `dest`, reporting progress for `package`.
///
/// Returns the number of bytes written. A partially written file is
/// removed on failure.
///
/// # Errors
///
/// See the module documentation.
pub async fn download_to_file(
    ctx: &Context,
    url: &str,
    dest: &Path,
    package: (&PackageName, &Version),
) -> Result<u64> {
    let result = stream_to_file(ctx, url, dest, package).await;
    if result.is_err() {
        tokio::fs::remove_file(dest).await.ok();
    }
    result
}

async fn stream_to_file(
    ctx: &Context,
    url: &str,
    dest: &Path,
    (name, version): (&PackageName, &Version),
) -> Result<u64> {
    let response = send(ctx, url).await?;
    let total_size = response.content_length();
    ctx.reporter.fetching(name, version, 0, total_size);

    let mut file = File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    loop {
        let chunk = tokio::select! {
            chunk = stream.next() => chunk,
            () = ctx.cancel.cancelled() => return Err(Error::Cancelled),
        };
        let Some(chunk) = chunk else { break };
        let chunk = chunk.map_err(|e| Error::network(url, e))?;
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
        ctx.reporter.fetching(name, version, downloaded, total_size);
    }

    file.flush().await?;
    Ok(downloaded)
}
