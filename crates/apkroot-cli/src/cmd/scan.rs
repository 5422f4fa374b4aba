//! Scan command

use anyhow::{Context as _, Result};
use apkroot_core::{BuildOptions, Context, ScanFormat};

/// Print what a build of `packages` would install.
pub async fn scan(
    ctx: &Context,
    packages: &[String],
    legacy: bool,
    options: &BuildOptions,
) -> Result<()> {
    let report = apkroot_core::scan(ctx, packages, options)
        .await
        .context("Failed to resolve packages")?;

    let format = if legacy {
        ScanFormat::Legacy
    } else {
        ScanFormat::Json
    };
    print!("{}", report.render(format)?);
    if format == ScanFormat::Json {
        println!();
    }
    Ok(())
}
