//! Key Provider: trusted signing keys for a distribution.

use std::collections::BTreeMap;

use apkroot_schema::{Arch, KeySource, Releases};
use chrono::NaiveDate;
use futures::future::try_join_all;
use tracing::{debug, info};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::io::download::fetch_bytes;
use crate::paths::filename_from_url;

/// Trusted keys by file name (`alpine-devel@lists.alpinelinux.org-4a6a0840.rsa.pub`).
pub type Keyring = BTreeMap<String, Vec<u8>>;

/// Fetch the keys described by `source` that are valid for `arch` today.
///
/// # Errors
///
/// [`Error::NotFound`] if the release branch is unknown, no key is valid
/// for `arch`, or a key URL answers 404. [`Error::Network`] for any other
/// fetch failure.
pub async fn get_keys(ctx: &Context, source: &KeySource, arch: Arch) -> Result<Keyring> {
    let today = chrono::Utc::now().date_naive();
    let urls = key_urls(ctx, source, arch, today).await?;
    fetch_keys(ctx, &urls).await
}

async fn key_urls(
    ctx: &Context,
    source: &KeySource,
    arch: Arch,
    today: NaiveDate,
) -> Result<Vec<String>> {
    match source {
        KeySource::Fixed { url } => Ok(vec![url.clone()]),
        KeySource::Releases { url, version } => {
            let body = fetch_bytes(ctx, url).await?;
            let releases: Releases =
                serde_json::from_slice(&body).map_err(|e| Error::Malformed {
                    url: url.clone(),
                    reason: e.to_string(),
                })?;

            let branch = releases.branch(version).ok_or_else(|| Error::NotFound {
                what: format!("release branch {version} in {url}"),
            })?;

            let urls: Vec<String> = branch
                .keys_for(arch.as_str(), today)
                .into_iter()
                .map(str::to_string)
                .collect();
            if urls.is_empty() {
                return Err(Error::NotFound {
                    what: format!("signing keys for {arch} in release branch {version}"),
                });
            }
            Ok(urls)
        }
    }
}

/// Fetch every key URL concurrently, one request each.
///
/// # Errors
///
/// The first failing fetch.
pub async fn fetch_keys(ctx: &Context, urls: &[String]) -> Result<Keyring> {
    let fetches = urls.iter().map(|url| async move {
        let bytes = fetch_bytes(ctx, url).await?;
        Ok::<_, Error>((filename_from_url(url).to_string(), bytes.to_vec()))
    });

    let keyring: Keyring = try_join_all(fetches).await?.into_iter().collect();
    for (name, key) in &keyring {
        debug!(key = %name, sha1 = %hex::encode(openssl::sha::sha1(key)), "trusted key");
    }
    info!(count = keyring.len(), "fetched signing keys");
    Ok(keyring)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn releases_json(base: &str) -> String {
        format!(
            r#"{{
                "release_branches": [{{
                    "rel_branch": "v3.18",
                    "keys": {{
                        "x86_64": [
                            {{ "url": "{base}/keys/a.rsa.pub" }},
                            {{ "url": "{base}/keys/b.rsa.pub" }},
                            {{ "url": "{base}/keys/old.rsa.pub", "deprecated_since": "2001-01-01" }}
                        ]
                    }}
                }}]
            }}"#
        )
    }

    #[tokio::test]
    async fn test_keys_from_releases_manifest() {
        let mut server = Server::new_async().await;
        let base = server.url();
        let _r = server
            .mock("GET", "/releases.json")
            .with_body(releases_json(&base))
            .create_async()
            .await;
        let _a = server
            .mock("GET", "/keys/a.rsa.pub")
            .with_body("A")
            .create_async()
            .await;
        let _b = server
            .mock("GET", "/keys/b.rsa.pub")
            .with_body("B")
            .create_async()
            .await;
        let old = server
            .mock("GET", "/keys/old.rsa.pub")
            .expect(0)
            .create_async()
            .await;

        let ctx = Context::with_defaults().unwrap();
        let source = KeySource::Releases {
            url: format!("{base}/releases.json"),
            version: "v3.18".into(),
        };
        let keys = get_keys(&ctx, &source, Arch::X86_64).await.unwrap();

        assert_eq!(keys.len(), 2);
        assert_eq!(keys["a.rsa.pub"], b"A");
        assert_eq!(keys["b.rsa.pub"], b"B");
        old.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_branch_is_not_found() {
        let mut server = Server::new_async().await;
        let base = server.url();
        let _r = server
            .mock("GET", "/releases.json")
            .with_body(releases_json(&base))
            .create_async()
            .await;

        let ctx = Context::with_defaults().unwrap();
        let source = KeySource::Releases {
            url: format!("{base}/releases.json"),
            version: "v9.99".into(),
        };
        let err = get_keys(&ctx, &source, Arch::X86_64).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));

        let source = KeySource::Releases {
            url: format!("{base}/releases.json"),
            version: "v3.18".into(),
        };
        let err = get_keys(&ctx, &source, Arch::Riscv64).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_fixed_key_404_is_not_found() {
        let mut server = Server::new_async().await;
        let _k = server
            .mock("GET", "/os/wolfi-signing.rsa.pub")
            .with_status(404)
            .create_async()
            .await;

        let ctx = Context::with_defaults().unwrap();
        let source = KeySource::Fixed {
            url: format!("{}/os/wolfi-signing.rsa.pub", server.url()),
        };
        let err = get_keys(&ctx, &source, Arch::Aarch64).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
