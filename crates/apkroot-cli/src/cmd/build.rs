//! Build command

use std::path::Path;

use anyhow::{Context as _, Result};
use apkroot_core::{BuildOptions, Context};
use crossterm::style::Stylize;

use crate::ui::Icons;

/// Build `packages` into `output`.
pub async fn build(
    ctx: &Context,
    packages: &[String],
    output: &Path,
    debug: bool,
    options: BuildOptions,
) -> Result<()> {
    let options = BuildOptions {
        keep_debug_copies: debug || options.keep_debug_copies,
        ..options
    };

    let outcome = apkroot_core::build(ctx, packages, output, &options)
        .await
        .with_context(|| format!("Failed to build root filesystem at {}", output.display()))?;

    let icons = Icons::default();
    for conflict in &outcome.conflicts {
        eprintln!("{} {conflict}", icons.warning.yellow());
    }
    println!("{}", outcome.root.display());
    Ok(())
}
