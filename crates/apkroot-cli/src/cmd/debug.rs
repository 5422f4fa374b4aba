//! Debug command

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, bail};
use apkroot_core::materialize::PackageReport;
use apkroot_core::{BuildOptions, Context, DebugReport};
use comfy_table::Table;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use crossterm::style::Stylize;

use crate::ui::{Icons, format_size};

/// Build `packages` with per-package copies and print what each one did.
pub async fn debug(
    ctx: &Context,
    packages: &[String],
    output: &Path,
    debug_dir: Option<PathBuf>,
    shell: bool,
    options: BuildOptions,
) -> Result<()> {
    let options = BuildOptions {
        debug_dir: debug_dir.or(options.debug_dir.clone()),
        ..options
    };

    let report = apkroot_core::debug(ctx, packages, output, &options)
        .await
        .with_context(|| format!("Failed to build root filesystem at {}", output.display()))?;

    println!("{}", render(&report));

    if shell {
        open_shell(&report.root).await?;
    }
    Ok(())
}

fn scripts(kinds: &[apkroot_core::ScriptKind]) -> String {
    if kinds.is_empty() {
        return "-".to_string();
    }
    kinds
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn row(pkg: &PackageReport) -> Vec<String> {
    vec![
        pkg.descriptor.name.to_string(),
        pkg.descriptor.version.to_string(),
        format_size(pkg.archive_size),
        pkg.merged.files.len().to_string(),
        scripts(&pkg.scripts),
        scripts(&pkg.scripts_run),
        pkg.debug_copy
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
    ]
}

fn render(report: &DebugReport) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED).set_header(vec![
        "PACKAGE", "VERSION", "SIZE", "FILES", "SCRIPTS", "RAN", "COPY",
    ]);
    for pkg in &report.packages {
        table.add_row(row(pkg));
    }

    let icons = Icons::default();
    let mut out = table.to_string();
    for conflict in &report.conflicts {
        out.push_str(&format!("\n{} {conflict}", icons.warning.yellow()));
    }
    out.push_str(&format!(
        "\n{} root: {}\n{} debug copies: {}",
        icons.info,
        report.root.display(),
        icons.info,
        report.debug_dir.display()
    ));
    out
}

async fn open_shell(root: &Path) -> Result<()> {
    let shell_bin = env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
    eprintln!(
        "{} Opening {shell_bin} in {}. Exit to return.",
        Icons::default().info,
        root.display()
    );

    let status = tokio::process::Command::new(&shell_bin)
        .current_dir(root)
        .status()
        .await
        .with_context(|| format!("Failed to start {shell_bin}"))?;
    if !status.success() {
        bail!("{shell_bin} exited with {status}");
    }
    Ok(())
}
