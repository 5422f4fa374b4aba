//! End-to-end pipeline tests against a mock repository.

mod common;

use std::fs;
use std::sync::Arc;

use apkroot_core::{
    ConflictPolicy, ConflictReason, Error, ScanFormat, ScriptKind, TriggerPolicy, build, debug,
    scan,
};
use common::{MockRepo, RecordingRunner, TestPackage, context, strings};

fn alpine_main() -> Vec<TestPackage> {
    vec![
        TestPackage::new("alpine-baselayout")
            .version("3.4.3-r1")
            .file("etc/os-release", "ID=alpine\n")
            .script(ScriptKind::PreInstall)
            .script(ScriptKind::PostInstall),
        TestPackage::new("busybox")
            .version("1.36.1-r2")
            .provides(&["/bin/sh", "cmd:sh"])
            .file("bin/busybox", "#!/bin/true\n")
            .script(ScriptKind::PostInstall)
            .script(ScriptKind::Trigger),
        TestPackage::new("ca-certificates")
            .version("20230506-r0")
            .file("etc/ssl/certs/ca-certificates.crt", "-----BEGIN CERTIFICATE-----\n")
            .script(ScriptKind::Trigger),
        TestPackage::new("curl")
            .version("8.1.2-r0")
            .depends(&["ca-certificates"])
            .file("usr/bin/curl", "#!/bin/true\n"),
    ]
}

fn names(outcome: &[apkroot_core::materialize::PackageReport]) -> Vec<String> {
    outcome
        .iter()
        .map(|p| p.descriptor.name.to_string())
        .collect()
}

#[tokio::test]
async fn test_curl_with_base_packages() {
    let mut repo = MockRepo::start().await;
    repo.serve_keys().await;
    repo.publish("main", &alpine_main()).await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("rootfs");
    let runner = Arc::new(RecordingRunner::default());
    let options = apkroot_core::BuildOptions {
        skip_base_packages: false,
        ..repo.options()
    };

    let outcome = build(&context(runner.clone()), &strings(&["curl"]), &output, &options)
        .await
        .unwrap();

    assert_eq!(
        names(&outcome.packages),
        vec!["alpine-baselayout", "busybox", "ca-certificates", "curl"]
    );
    assert!(outcome.conflicts.is_empty());
    assert_eq!(outcome.root, output);

    assert!(output.join("usr/bin/curl").is_file());
    assert!(output.join("etc/ssl/certs/ca-certificates.crt").is_file());
    assert!(!output.join(".PKGINFO").exists());
    assert!(!output.join(".post-install").exists());

    assert_eq!(
        fs::read_to_string(output.join("etc/apk/world")).unwrap(),
        "alpine-baselayout\nbusybox\ncurl\n"
    );
    let installed = fs::read_to_string(output.join("lib/apk/db/installed")).unwrap();
    assert!(installed.contains("P:curl\nV:8.1.2-r0\n"));
    assert!(installed.contains("F:usr/bin\nR:curl\n"));
    assert!(
        output
            .join("etc/apk/keys")
            .join(common::KEY_NAME)
            .is_file()
    );

    // Triggers are extracted but not run by default.
    assert!(!runner.ran(ScriptKind::Trigger));
    assert_eq!(
        runner.calls(),
        vec![
            ("alpine-baselayout".to_string(), ScriptKind::PreInstall),
            ("alpine-baselayout".to_string(), ScriptKind::PostInstall),
            ("busybox".to_string(), ScriptKind::PostInstall),
        ]
    );
}

#[tokio::test]
async fn test_triggers_run_when_enabled() {
    let mut repo = MockRepo::start().await;
    repo.serve_keys().await;
    repo.publish("main", &alpine_main()).await;

    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(RecordingRunner::default());
    let options = apkroot_core::BuildOptions {
        trigger_policy: TriggerPolicy::Run,
        ..repo.options()
    };

    build(
        &context(runner.clone()),
        &strings(&["busybox", "ca-certificates"]),
        &dir.path().join("rootfs"),
        &options,
    )
    .await
    .unwrap();

    assert_eq!(
        runner.calls(),
        vec![
            ("busybox".to_string(), ScriptKind::PostInstall),
            ("busybox".to_string(), ScriptKind::Trigger),
            ("ca-certificates".to_string(), ScriptKind::Trigger),
        ]
    );
}

#[tokio::test]
async fn test_missing_key_fails_without_root() {
    let mut repo = MockRepo::start().await;
    let _releases = repo
        .server
        .mock("GET", "/releases.json")
        .with_body(format!(
            r#"{{"release_branches": [{{"rel_branch": "v3.18", "keys": {{"x86_64": [{{"url": "{}/keys/gone.rsa.pub"}}]}}}}]}}"#,
            repo.url()
        ))
        .create_async()
        .await;
    let _key = repo
        .server
        .mock("GET", "/keys/gone.rsa.pub")
        .with_status(404)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("rootfs");
    let err = build(
        &context(Arc::new(RecordingRunner::default())),
        &strings(&["curl"]),
        &output,
        &repo.options(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::NotFound { .. }), "got {err}");
    assert!(!output.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_failed_build_leaves_nothing_beside_output() {
    let mut packages = vec![TestPackage::new("pkg-00").script(ScriptKind::PreInstall)];
    for i in 1..10 {
        let mut pkg = TestPackage::new(&format!("pkg-{i:02}"));
        for f in 0..300 {
            pkg = pkg.file(&format!("usr/share/pkg-{i:02}/file-{f}"), "data\n");
        }
        packages.push(pkg);
    }
    let requested: Vec<String> = packages.iter().map(|p| p.name.clone()).collect();

    let mut repo = MockRepo::start().await;
    repo.serve_keys().await;
    repo.publish("main", &packages).await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("rootfs");
    let runner = Arc::new(RecordingRunner::failing("pkg-00", ScriptKind::PreInstall));
    let options = apkroot_core::BuildOptions {
        concurrency: 8,
        ..repo.options()
    };
    let err = build(&context(runner.clone()), &requested, &output, &options)
        .await
        .unwrap_err();

    assert!(
        matches!(err.root_cause(), Error::ScriptExecution { .. }),
        "got {err}"
    );
    assert_eq!(runner.calls().len(), 1);
    assert!(!output.exists());
    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert!(leftovers.is_empty(), "left behind: {leftovers:?}");
}

#[tokio::test]
async fn test_shared_capability_is_reported_and_build_completes() {
    let mut repo = MockRepo::start().await;
    repo.serve_keys().await;
    repo.publish(
        "main",
        &[
            TestPackage::new("nginx")
                .provides(&["webserver"])
                .file("etc/motd", "nginx\n"),
            TestPackage::new("lighttpd")
                .provides(&["webserver"])
                .file("etc/motd", "lighttpd\n"),
        ],
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("rootfs");
    let outcome = build(
        &context(Arc::new(RecordingRunner::default())),
        &strings(&["nginx", "lighttpd"]),
        &output,
        &repo.options(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.conflicts.len(), 1);
    let conflict = &outcome.conflicts[0];
    assert!(conflict.involves("nginx") && conflict.involves("lighttpd"));
    assert!(matches!(
        &conflict.reason,
        ConflictReason::SharedCapability { capability } if *capability == "webserver"
    ));

    // Both are installed; the later one wins the shared path.
    assert_eq!(names(&outcome.packages), vec!["nginx", "lighttpd"]);
    assert_eq!(
        fs::read_to_string(output.join("etc/motd")).unwrap(),
        "lighttpd\n"
    );
}

#[tokio::test]
async fn test_abort_policy_fails_before_fetching_packages() {
    let mut repo = MockRepo::start().await;
    repo.serve_keys().await;
    repo.publish(
        "main",
        &[
            TestPackage::new("nginx").provides(&["webserver"]),
            TestPackage::new("lighttpd").provides(&["webserver"]),
        ],
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("rootfs");
    let options = apkroot_core::BuildOptions {
        conflict_policy: ConflictPolicy::Abort,
        ..repo.options()
    };
    let err = build(
        &context(Arc::new(RecordingRunner::default())),
        &strings(&["nginx", "lighttpd"]),
        &output,
        &options,
    )
    .await
    .unwrap_err();

    match err {
        Error::Conflicts(conflicts) => assert_eq!(conflicts.len(), 1),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!output.exists());
}

#[tokio::test]
async fn test_unresolved_dependency() {
    let mut repo = MockRepo::start().await;
    repo.serve_keys().await;
    repo.publish(
        "main",
        &[TestPackage::new("curl").depends(&["libcurl"])],
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let err = build(
        &context(Arc::new(RecordingRunner::default())),
        &strings(&["curl"]),
        &dir.path().join("rootfs"),
        &repo.options(),
    )
    .await
    .unwrap_err();

    assert!(
        matches!(&err, Error::UnresolvedDependency { name, required_by } if name == "libcurl" && required_by == "curl")
    );
}

#[tokio::test]
async fn test_extra_repository_loses_ties() {
    let mut repo = MockRepo::start().await;
    repo.serve_keys().await;
    repo.publish(
        "main",
        &[TestPackage::new("zlib").version("1.2.13-r1")],
    )
    .await;
    repo.publish(
        "community",
        &[
            TestPackage::new("zlib").version("1.3-r0"),
            TestPackage::new("htop").depends(&["zlib"]),
        ],
    )
    .await;

    let options = apkroot_core::BuildOptions {
        extra_repositories: vec![repo.repository("community")],
        ..repo.options()
    };
    let report = scan(
        &context(Arc::new(RecordingRunner::default())),
        &strings(&["htop"]),
        &options,
    )
    .await
    .unwrap();

    assert_eq!(report.packages.len(), 2);
    assert_eq!(report.packages[0].name, "zlib");
    assert_eq!(report.packages[0].version, "1.2.13-r1");
    assert!(report.packages[1].url.contains("/community/"));
}

#[tokio::test]
async fn test_scan_does_not_fetch_packages() {
    let mut repo = MockRepo::start().await;
    repo.serve_keys().await;
    repo.publish("main", &alpine_main()).await;

    let report = scan(
        &context(Arc::new(RecordingRunner::default())),
        &strings(&["curl"]),
        &repo.options(),
    )
    .await
    .unwrap();

    let names: Vec<&str> = report.packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["ca-certificates", "curl"]);

    let json: serde_json::Value =
        serde_json::from_str(&report.render(ScanFormat::Json).unwrap()).unwrap();
    assert_eq!(json["packages"][1]["origin"], "curl");

    let table = report.render(ScanFormat::Legacy).unwrap();
    assert!(table.contains("8.1.2-r0"));
}

#[tokio::test]
async fn test_build_is_idempotent() {
    let mut repo = MockRepo::start().await;
    repo.serve_keys().await;
    repo.publish("main", &alpine_main()).await;

    let dir = tempfile::tempdir().unwrap();
    let ctx = context(Arc::new(RecordingRunner::default()));
    let request = strings(&["curl", "busybox"]);

    let first = build(&ctx, &request, &dir.path().join("a"), &repo.options())
        .await
        .unwrap();
    let second = build(&ctx, &request, &dir.path().join("b"), &repo.options())
        .await
        .unwrap();

    assert_eq!(names(&first.packages), names(&second.packages));
    let files = |root: &std::path::Path| {
        let mut files: Vec<_> = walkdir::WalkDir::new(root)
            .into_iter()
            .map(|e| e.unwrap().path().strip_prefix(root).unwrap().to_path_buf())
            .collect();
        files.sort();
        files
    };
    assert_eq!(files(&first.root), files(&second.root));
}

#[tokio::test]
async fn test_debug_keeps_package_copies() {
    let mut repo = MockRepo::start().await;
    repo.serve_keys().await;
    repo.publish("main", &alpine_main()).await;

    let dir = tempfile::tempdir().unwrap();
    let options = apkroot_core::BuildOptions {
        debug_dir: Some(dir.path().join("debug")),
        ..repo.options()
    };
    let report = debug(
        &context(Arc::new(RecordingRunner::default())),
        &strings(&["busybox"]),
        &dir.path().join("rootfs"),
        &options,
    )
    .await
    .unwrap();

    assert_eq!(report.debug_dir, dir.path().join("debug"));
    let busybox = &report.packages[0];
    assert_eq!(
        busybox.scripts,
        vec![ScriptKind::PostInstall, ScriptKind::Trigger]
    );
    assert_eq!(busybox.scripts_run, vec![ScriptKind::PostInstall]);
    let copy = busybox.debug_copy.as_ref().unwrap();
    assert!(copy.join(".trigger").is_file());
    assert!(copy.join("bin/busybox").is_file());
}

#[tokio::test]
async fn test_non_empty_output_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("occupied"), "x").unwrap();

    let err = build(
        &context(Arc::new(RecordingRunner::default())),
        &strings(&["curl"]),
        dir.path(),
        &apkroot_core::BuildOptions::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn test_base_directory_is_seeded() {
    let mut repo = MockRepo::start().await;
    repo.serve_keys().await;
    repo.publish("main", &alpine_main()).await;

    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base");
    fs::create_dir_all(base.join("etc")).unwrap();
    fs::write(base.join("etc/hostname"), "builder\n").unwrap();

    let options = apkroot_core::BuildOptions {
        base: Some(base),
        write_apk_db: false,
        ..repo.options()
    };
    let outcome = build(
        &context(Arc::new(RecordingRunner::default())),
        &strings(&["curl"]),
        &dir.path().join("rootfs"),
        &options,
    )
    .await
    .unwrap();

    assert!(outcome.root.join("etc/hostname").is_file());
    assert!(outcome.root.join("usr/bin/curl").is_file());
    assert!(!outcome.root.join("lib/apk/db/installed").exists());
}
