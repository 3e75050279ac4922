use clap::Parser;
use serde::Serialize;
use std::fmt::Debug;
use std::future::Future;
use std::process::ExitCode;
use steam_history::args::{Args, Command};
use steam_history::commands::{self, Out};
use steam_history::{Cancel, Config, Mode, Progress, Result};
use tracing::{debug, error, trace, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());

    match main_inner(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let home = args.common().home().path();

    // This allows for testing the program without hitting Steam. When STEAM_HISTORY_IN_TEST_MODE
    // is set and non-zero in length, then the mode will be Mode::Test, otherwise it will be
    // Mode::Steam.
    let mode = Mode::from_env();

    // Route to appropriate command handler
    let _: () = match args.command() {
        Command::Init => commands::init(home).await?.print(),

        Command::Download => {
            let config = Config::load(home).await?;
            drive(|cancel, progress| async move {
                commands::download(&config, mode, cancel, progress).await
            })
            .await?
            .print()
        }

        Command::Process => {
            let config = Config::load(home).await?;
            drive(|cancel, progress| async move {
                commands::process(&config, cancel, progress).await
            })
            .await?
            .print()
        }

        Command::Run => {
            let config = Config::load(home).await?;
            drive(|cancel, progress| async move {
                commands::run(&config, mode, cancel, progress).await
            })
            .await?
            .print()
        }
    };
    Ok(())
}

/// Runs a long command on its own task while this task writes its progress messages to the log.
/// Ctrl-C raises the cancellation flag; the command stops at its next checkpoint.
async fn drive<T, F, Fut>(command: F) -> Result<Out<T>>
where
    T: Serialize + Clone + Debug + Send + 'static,
    F: FnOnce(Cancel, Progress) -> Fut,
    Fut: Future<Output = Result<Out<T>>> + Send + 'static,
{
    let cancel = Cancel::new();
    let (progress, mut messages) = Progress::channel();

    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Stop requested, finishing the current step...");
            on_interrupt.cancel();
        }
    });

    let task = tokio::spawn(command(cancel, progress));
    while let Some(message) = messages.recv().await {
        message.log();
    }
    interrupt.abort();
    task.await?
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => {
            // RUST_LOG exists; use it.
            EnvFilter::from_default_env()
        }
        None => {
            // RUST_LOG does not exist; use default log level for this crate only.
            EnvFilter::new(format!(
                "{}={},{}={}",
                env!("CARGO_CRATE_NAME"),
                level,
                env!("CARGO_BIN_NAME"),
                level
            ))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
