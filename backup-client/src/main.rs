//! Backup client - main entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use backup_client::{sync, ClientError};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// State directory holding the cached configuration (defaults to the
    /// first entry of $STATE_DIRECTORY, as set by the service unit)
    #[arg(long, value_name = "DIR")]
    state_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let level = args.log_level.as_deref().unwrap_or("info");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .init();

    if let Ok(host) = hostname::get() {
        tracing::info!(
            "starting backup-client v{} on {}",
            env!("CARGO_PKG_VERSION"),
            host.to_string_lossy()
        );
    }

    let state_dir = match state_directory(&args) {
        Ok(dir) => dir,
        Err(err) => return die(err),
    };

    match sync::run(&state_dir).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => die(err),
    }
}

fn state_directory(args: &Args) -> Result<PathBuf, ClientError> {
    if let Some(dir) = &args.state_dir {
        return Ok(dir.clone());
    }
    // systemd passes a colon-separated list; the first entry is ours.
    match std::env::var("STATE_DIRECTORY") {
        Ok(value) if !value.is_empty() => {
            Ok(PathBuf::from(value.split(':').next().unwrap_or(&value)))
        }
        _ => Err(ClientError::StateDir),
    }
}

fn die(err: ClientError) -> ExitCode {
    tracing::error!("{err}");
    tracing::info!("exiting");
    ExitCode::FAILURE
}
