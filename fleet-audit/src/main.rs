//! Fleet audit - main entry point.

mod audit;
mod date;
mod error;
mod inspect;
mod notify;
mod report;
mod settings;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;

const EXIT_INVALID_DATE: u8 = 1;
const EXIT_INTERRUPTED: u8 = 3;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Date for which to check for missing backups
    date: Option<String>,

    /// Send an email with the results
    #[arg(long)]
    email: bool,

    /// Path to the settings file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Maximum number of concurrent repository inspections (overrides settings)
    #[arg(long)]
    concurrency: Option<usize>,

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

    let _ = dotenvy::dotenv();

    let settings = match settings::Settings::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(err) => {
            tracing::error!("failed to load settings: {err:#}");
            tracing::info!("exiting");
            return ExitCode::FAILURE;
        }
    };

    let today = chrono::Local::now().date_naive();
    let date = match &args.date {
        Some(text) => match date::parse_date_arg(text, today) {
            Some(date) => date,
            None => {
                tracing::error!("invalid date format '{text}'");
                return ExitCode::from(EXIT_INVALID_DATE);
            }
        },
        None => {
            let date = date::resolve_default(settings.default_date, today);
            tracing::warn!("no date given, checking {date}");
            date
        }
    };

    let cancel = CancellationToken::new();
    spawn_interrupt_listener(cancel.clone());

    let limit = args.concurrency.unwrap_or(settings.concurrency);
    tracing::info!(
        "auditing {} repositories for {date} ({limit} concurrent)",
        settings.repos.len()
    );
    let report = audit::audit(&settings, date, limit, cancel).await;

    let rendered = report::render(&report);
    println!("{rendered}");

    if args.email {
        let delivery = match notify::EmailSettings::from_env() {
            Ok(email) => notify::send_report(&email, &report::subject(date), &rendered).await,
            Err(err) => Err(err),
        };
        if let Err(err) = delivery {
            tracing::error!("failed to send email: {err}");
        }
    }

    if report.interrupted() {
        return ExitCode::from(EXIT_INTERRUPTED);
    }
    ExitCode::SUCCESS
}

/// Map SIGINT/SIGTERM to the cancellation token. In-flight inspections are
/// killed, queued ones are skipped, and whatever already finished is still
/// reported.
fn spawn_interrupt_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            let _ = tokio::signal::ctrl_c().await;
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(_) => std::future::pending().await,
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => tracing::warn!("interrupt received, reporting completed inspections only"),
            _ = terminate => tracing::warn!("termination requested, reporting completed inspections only"),
        }
        cancel.cancel();
    });
}
