use crate::api::Mode;
use crate::commands::{download, process, Out};
use crate::process::ProcessOutcome;
use crate::sync::SyncOutcome;
use crate::{Cancel, Config, Progress, Result};
use serde::Serialize;

/// What `run` did in each of its two stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub download: SyncOutcome,
    /// `None` when the download was stopped and processing was skipped.
    pub process: Option<ProcessOutcome>,
}

/// Downloads new history and then exports the table. A failed download returns its error without
/// processing, and a stopped download skips processing.
pub async fn run(
    config: &Config,
    mode: Mode,
    cancel: Cancel,
    progress: Progress,
) -> Result<Out<RunReport>> {
    let downloaded = download(config, mode, cancel.clone(), progress.clone()).await?;
    let download = downloaded
        .structure()
        .copied()
        .unwrap_or(SyncOutcome::Cancelled);

    if download == SyncOutcome::Cancelled || cancel.is_cancelled() {
        let report = RunReport {
            download,
            process: None,
        };
        return Ok(Out::new("Stopped before processing", report));
    }

    let processed = process(config, cancel, progress).await?;
    let message = format!("{}. {}", downloaded.message(), processed.message());
    let report = RunReport {
        download,
        process: processed.structure().cloned(),
    };
    Ok(Out::new(message, report))
}
