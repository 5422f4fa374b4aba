//! Subcommand implementations.

pub mod build;
pub mod completions;
pub mod debug;
pub mod scan;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use apkroot_core::Context;
use tokio_util::sync::CancellationToken;

use crate::ui::ConsoleReporter;

/// A build context reporting to the console and cancelled by `cancel`.
pub fn context(quiet: bool, cancel: CancellationToken) -> Result<Context> {
    let ctx = Context::with_defaults().context("Failed to initialise HTTP client")?;
    Ok(ctx
        .with_reporter(Arc::new(ConsoleReporter::new(quiet)))
        .with_cancel(cancel))
}
