//! Repository Index Fetcher.
//!
//! Downloads `{repo}/{arch}/APKINDEX.tar.gz`, verifies its signature against
//! the keyring and parses the contained `APKINDEX` text.

pub mod signature;

use std::io::Read;
use std::sync::Arc;

use apkroot_schema::{APKINDEX_FILE, Arch, PackageIndex, index_url};
use flate2::read::MultiGzDecoder;
use futures::future::try_join_all;
use tracing::info;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::io::download::fetch_bytes;
use crate::io::gzip;
use crate::keys::Keyring;

/// Fetch and verify the indexes of every repository, preserving order.
///
/// Fetches run concurrently. The returned indexes form one package
/// universe in which earlier repositories win ties.
///
/// # Errors
///
/// The first failure of [`fetch_index`].
pub async fn fetch_indexes(
    ctx: &Context,
    repositories: &[String],
    keys: &Keyring,
    arch: Arch,
) -> Result<Vec<PackageIndex>> {
    let keys = Arc::new(keys.clone());
    let fetches = repositories
        .iter()
        .map(|repo| fetch_index(ctx, repo, Arc::clone(&keys), arch));
    try_join_all(fetches).await
}

/// Fetch, verify and parse the index of one repository.
///
/// # Errors
///
/// [`Error::Network`]/[`Error::NotFound`] if the index cannot be fetched,
/// [`Error::Signature`] if it is unsigned or the signature does not verify,
/// [`Error::Malformed`] if the archive or text is invalid.
pub async fn fetch_index(
    ctx: &Context,
    repository: &str,
    keys: Arc<Keyring>,
    arch: Arch,
) -> Result<PackageIndex> {
    let url = index_url(repository, arch.as_str());
    let body = fetch_bytes(ctx, &url).await?;

    let repository = repository.to_string();
    let index = tokio::task::spawn_blocking(move || {
        parse_signed_index(&body, &keys, &repository, arch.as_str(), &url)
    })
    .await??;

    info!(
        repository = %index.repository,
        packages = index.len(),
        "loaded index"
    );
    Ok(index)
}

/// Verify and parse raw `APKINDEX.tar.gz` bytes.
///
/// # Errors
///
/// See [`fetch_index`].
pub fn parse_signed_index(
    data: &[u8],
    keys: &Keyring,
    repository: &str,
    arch: &str,
    url: &str,
) -> Result<PackageIndex> {
    let malformed = |reason: String| Error::Malformed {
        url: url.to_string(),
        reason,
    };

    let (first, signed_from) = gzip::split_first(data).map_err(|e| malformed(e.to_string()))?;
    let signature = signature::read_signature(&first)
        .map_err(|e| malformed(e.to_string()))?
        .ok_or_else(|| Error::Signature {
            url: url.to_string(),
            reason: "index is not signed".to_string(),
        })?;

    let signed = &data[signed_from..];
    signature::verify(&signature, signed, keys).map_err(|reason| Error::Signature {
        url: url.to_string(),
        reason,
    })?;

    let (text, description) = read_index_text(signed).map_err(|e| malformed(e.to_string()))?;
    let text = text.ok_or_else(|| malformed(format!("archive has no {APKINDEX_FILE}")))?;

    let mut index =
        PackageIndex::parse(&text, repository, arch).map_err(|e| malformed(e.to_string()))?;
    index.description = description;
    Ok(index)
}

fn read_index_text(signed: &[u8]) -> std::io::Result<(Option<String>, Option<String>)> {
    let mut archive = tar::Archive::new(MultiGzDecoder::new(signed));
    archive.set_ignore_zeros(true);

    let mut text = None;
    let mut description = None;
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().into_owned();
        match path.as_str() {
            APKINDEX_FILE => {
                let mut buf = String::new();
                entry.read_to_string(&mut buf)?;
                text = Some(buf);
            }
            "DESCRIPTION" => {
                let mut buf = String::new();
                entry.read_to_string(&mut buf)?;
                description = Some(buf.trim().to_string());
            }
            _ => {}
        }
    }
    Ok((text, description))
}
