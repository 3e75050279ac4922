use crate::api::{self, Mode};
use crate::commands::Out;
use crate::fetch::Fetcher;
use crate::store::Store;
use crate::sync::{Planner, SyncOutcome};
use crate::{Cancel, Config, Progress, Result};
use tracing::debug;

/// Downloads the market history into the raw data directory. The first run pages through the
/// whole history and can be resumed. Once that has completed, later runs only refresh the pages
/// needed to pick up new transactions.
///
/// # Errors
/// - Returns an error when a page cannot be fetched after retrying, when the session cookies have
///   expired, or when a file cannot be written. A stop requested through `cancel` is not an error.
pub async fn download(
    config: &Config,
    mode: Mode,
    cancel: Cancel,
    progress: Progress,
) -> Result<Out<SyncOutcome>> {
    debug!("Downloading with the {mode} market");
    let market = api::market(config, mode)?;
    let fetcher = Fetcher::new(
        market,
        config.fetch_settings(),
        cancel.clone(),
        progress.clone(),
    );
    let store = Store::new(config.data_dir(), progress.clone());
    let mut planner = Planner::new(fetcher, store, cancel, progress, config.page_size());
    let outcome = planner.run().await?;
    Ok(Out::new(outcome.to_string(), outcome))
}
