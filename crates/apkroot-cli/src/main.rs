//! apkroot - materialize Alpine and Wolfi packages into a root filesystem

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use apkroot_cli::{Cli, Commands, cmd, config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let default_level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cleaning up");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Commands::Build {
            packages,
            output,
            debug,
            build,
        } => {
            let options = config::load(cli.config.as_deref(), &build)?;
            let ctx = cmd::context(cli.quiet, cancel)?;
            cmd::build::build(&ctx, &packages, &output, debug, options).await
        }
        Commands::Scan {
            packages,
            legacy,
            build,
        } => {
            let options = config::load(cli.config.as_deref(), &build)?;
            let ctx = cmd::context(cli.quiet, cancel)?;
            cmd::scan::scan(&ctx, &packages, legacy, &options).await
        }
        Commands::Debug {
            packages,
            output,
            debug_dir,
            shell,
            build,
        } => {
            let options = config::load(cli.config.as_deref(), &build)?;
            let ctx = cmd::context(cli.quiet, cancel)?;
            cmd::debug::debug(&ctx, &packages, &output, debug_dir, shell, options).await
        }
        Commands::Completions { shell } => {
            cmd::completions::completions(shell);
            Ok(())
        }
    }
}
