use crate::commands::Out;
use crate::process::{self as stage, ProcessOutcome};
use crate::store::Store;
use crate::{Cancel, Config, Progress, Result};

/// Parses every stored page, reconstructs the years and writes the table to the configured
/// output file.
///
/// # Errors
/// - Returns an error if the raw data directory is missing or the table cannot be written.
pub async fn process(
    config: &Config,
    cancel: Cancel,
    progress: Progress,
) -> Result<Out<ProcessOutcome>> {
    let store = Store::new(config.data_dir(), progress.clone());
    let outcome = stage::process(
        &store,
        config.output_path(),
        stage::current_year(),
        &cancel,
        &progress,
    )
    .await?;
    let message = match &outcome {
        ProcessOutcome::Written { path, rows, .. } => {
            format!("Exported {rows} transaction(s) to '{}'", path.display())
        }
        ProcessOutcome::NoRows => "No transactions to export".to_string(),
        ProcessOutcome::Cancelled => "Processing stopped by user".to_string(),
    };
    Ok(Out::new(message, outcome))
}
