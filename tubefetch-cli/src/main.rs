mod cli;
mod commands;
mod error;

use std::process;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::cli::{Args, Commands};
use crate::commands::DownloadOptions;
use crate::error::Result;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    match args.command {
        Commands::Download {
            catalog,
            filename,
            directory,
            itag,
            quality,
            mimetype,
            ffmpeg,
            proxy,
            no_progress,
            parallel,
        } => {
            let token = CancellationToken::new();
            spawn_ctrl_c_handler(token.clone());

            let options = DownloadOptions {
                catalog,
                filename,
                directory,
                itag,
                quality,
                mimetype,
                ffmpeg,
                proxy,
                no_progress,
                parallel,
            };
            let path = commands::download(options, token).await?;
            println!("Download completed: {}", path.display());
        }
        Commands::Formats { catalog } => {
            commands::list_formats(&catalog).await?;
        }
    }
    Ok(())
}

/// Cancel `token` on the first Ctrl-C.
fn spawn_ctrl_c_handler(token: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    info!("Cancellation requested. Shutting down gracefully...");
                    token.cancel();
                }
                Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
            },
        }
    });
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(verbose)
                .with_writer(std::io::stderr),
        )
        .init();
}
