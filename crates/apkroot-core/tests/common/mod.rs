//! A signed mock repository served by mockito, plus a recording script runner.

#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use apkroot_core::scripts::{Script, ScriptRunner};
use apkroot_core::{BuildOptions, Context, Error, Result, ScriptKind};
use apkroot_schema::{Arch, KeySource};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::write::GzEncoder;
use mockito::{Mock, Server, ServerGuard};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::sign::Signer;
use tokio_util::sync::CancellationToken;

pub const KEY_NAME: &str = "test-signing.rsa.pub";
pub const BRANCH: &str = "v3.18";

/// A package to publish in the mock repository.
#[derive(Debug, Clone, Default)]
pub struct TestPackage {
    pub name: String,
    pub version: String,
    pub depends: Vec<String>,
    pub provides: Vec<String>,
    pub files: Vec<(String, Vec<u8>)>,
    pub scripts: Vec<ScriptKind>,
}

impl TestPackage {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: "1.0-r0".to_string(),
            ..Self::default()
        }
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn depends(mut self, deps: &[&str]) -> Self {
        self.depends = deps.iter().map(ToString::to_string).collect();
        self
    }

    pub fn provides(mut self, provides: &[&str]) -> Self {
        self.provides = provides.iter().map(ToString::to_string).collect();
        self
    }

    pub fn file(mut self, path: &str, content: &str) -> Self {
        self.files.push((path.to_string(), content.as_bytes().to_vec()));
        self
    }

    pub fn script(mut self, kind: ScriptKind) -> Self {
        self.scripts.push(kind);
        self
    }

    fn control(&self) -> Vec<u8> {
        let pkginfo = format!("pkgname = {}\npkgver = {}\n", self.name, self.version);
        let mut entries = vec![(".PKGINFO".to_string(), pkginfo.into_bytes())];
        for kind in &self.scripts {
            entries.push((format!(".{kind}"), b"#!/bin/sh\nexit 0\n".to_vec()));
        }
        gzip(&tar(&entries))
    }

    fn data(&self) -> Vec<u8> {
        let mut entries = self.files.clone();
        entries.push((format!("usr/share/apkroot-test/{}", self.name), self.version.clone().into_bytes()));
        gzip(&tar(&entries))
    }

    /// Archive bytes and the `C:` checksum of the control member.
    pub fn archive(&self) -> (Vec<u8>, String) {
        let control = self.control();
        let checksum = format!("Q1{}", STANDARD.encode(openssl::sha::sha1(&control)));
        ([control, self.data()].concat(), checksum)
    }

    fn record(&self, checksum: &str) -> String {
        let mut record = format!(
            "C:{checksum}\nP:{}\nV:{}\nA:x86_64\nS:1024\nI:4096\nT:test package\nL:MIT\no:{}\n",
            self.name, self.version, self.name
        );
        if !self.depends.is_empty() {
            record.push_str(&format!("D:{}\n", self.depends.join(" ")));
        }
        if !self.provides.is_empty() {
            record.push_str(&format!("p:{}\n", self.provides.join(" ")));
        }
        record.push('\n');
        record
    }
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn tar(entries: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, name, data.as_slice()).unwrap();
    }
    builder.into_inner().unwrap()
}

/// A repository host with one trusted key.
pub struct MockRepo {
    pub server: ServerGuard,
    key: PKey<Private>,
    mocks: Vec<Mock>,
}

impl MockRepo {
    pub async fn start() -> Self {
        let server = Server::new_async().await;
        let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
        Self {
            server,
            key,
            mocks: Vec::new(),
        }
    }

    pub fn url(&self) -> String {
        self.server.url()
    }

    pub fn repository(&self, component: &str) -> String {
        format!("{}/alpine/{BRANCH}/{component}", self.url())
    }

    /// Serve `releases.json` and the public key.
    pub async fn serve_keys(&mut self) {
        let manifest = format!(
            r#"{{"release_branches": [{{"rel_branch": "{BRANCH}", "keys": {{"x86_64": [{{"url": "{}/keys/{KEY_NAME}"}}]}}}}]}}"#,
            self.url()
        );
        let releases = self
            .server
            .mock("GET", "/releases.json")
            .with_body(manifest)
            .create_async()
            .await;
        let key = self
            .server
            .mock("GET", format!("/keys/{KEY_NAME}").as_str())
            .with_body(self.key.public_key_to_pem().unwrap())
            .create_async()
            .await;
        self.mocks.extend([releases, key]);
    }

    /// Publish `packages` as a signed index plus their archives.
    pub async fn publish(&mut self, component: &str, packages: &[TestPackage]) {
        let prefix = format!("/alpine/{BRANCH}/{component}/x86_64");
        let mut index = String::new();

        for pkg in packages {
            let (archive, checksum) = pkg.archive();
            index.push_str(&pkg.record(&checksum));
            let mock = self
                .server
                .mock(
                    "GET",
                    format!("{prefix}/{}-{}.apk", pkg.name, pkg.version).as_str(),
                )
                .with_body(archive)
                .create_async()
                .await;
            self.mocks.push(mock);
        }

        let body = gzip(&tar(&[
            ("DESCRIPTION".to_string(), b"test repository".to_vec()),
            ("APKINDEX".to_string(), index.into_bytes()),
        ]));
        let mut signer = Signer::new(MessageDigest::sha1(), &self.key).unwrap();
        signer.update(&body).unwrap();
        let signature = gzip(&tar(&[(
            format!(".SIGN.RSA.{KEY_NAME}"),
            signer.sign_to_vec().unwrap(),
        )]));

        let mock = self
            .server
            .mock("GET", format!("{prefix}/APKINDEX.tar.gz").as_str())
            .with_body([signature, body].concat())
            .create_async()
            .await;
        self.mocks.push(mock);
    }

    /// Options pointing at this host, with base packages disabled.
    pub fn options(&self) -> BuildOptions {
        BuildOptions {
            arch: Some(Arch::X86_64),
            repository: Some(self.repository("main")),
            keys: Some(KeySource::Releases {
                url: format!("{}/releases.json", self.url()),
                version: BRANCH.to_string(),
            }),
            skip_base_packages: true,
            concurrency: 2,
            ..BuildOptions::default()
        }
    }
}

/// Records every script invocation instead of running it.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<(String, ScriptKind)>>,
    fail: Option<(String, ScriptKind)>,
}

impl RecordingRunner {
    /// A runner whose `kind` script of `package` exits with status 1.
    pub fn failing(package: &str, kind: ScriptKind) -> Self {
        Self {
            fail: Some((package.to_string(), kind)),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(String, ScriptKind)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ran(&self, kind: ScriptKind) -> bool {
        self.calls().iter().any(|(_, k)| *k == kind)
    }
}

#[async_trait]
impl ScriptRunner for RecordingRunner {
    async fn run(&self, _root: &Path, script: &Script, _cancel: &CancellationToken) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((script.package.to_string(), script.kind));
        if self
            .fail
            .as_ref()
            .is_some_and(|(p, k)| script.package == *p && script.kind == *k)
        {
            return Err(Error::ScriptExecution {
                package: script.package_id(),
                kind: script.kind,
                code: Some(1),
            });
        }
        Ok(())
    }
}

pub fn context(runner: Arc<RecordingRunner>) -> Context {
    Context::with_defaults().unwrap().with_runner(runner)
}

pub fn strings(names: &[&str]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
}
