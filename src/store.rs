//! The record store: one JSON document per fetched page plus a small sync state file, all in the
//! raw data directory.
//!
//! Page files are named `transactions_<offset>.json` with the offset zero-padded to six digits, so
//! lexical and numeric order agree for new files. Listing still sorts by the number in the name
//! because older files may not be padded.

use crate::{utils, Progress, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, trace};

/// The name of the sync state file inside the raw data directory.
pub const STATE_JSON: &str = "state.json";

const PAGE_PREFIX: &str = "transactions_";
const JSON_EXTENSION: &str = "json";

/// One response from the history endpoint, stored as-is. Fields the program does not use are kept
/// in `extra` so the file on disk stays a faithful copy of what the server sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageDocument {
    #[serde(default)]
    pub success: bool,

    /// The number of transactions the account had when the page was fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,

    /// Markup holding zero or more transaction rows.
    #[serde(default)]
    pub results_html: String,

    /// Only its length is used, for progress messages.
    #[serde(default)]
    pub results: serde_json::Value,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PageDocument {
    /// The remote total, with a missing value read as zero.
    pub fn total(&self) -> u64 {
        self.total_count.unwrap_or(0)
    }

    /// The number of entries in `results`.
    pub fn results_len(&self) -> usize {
        match &self.results {
            serde_json::Value::Array(a) => a.len(),
            serde_json::Value::Object(o) => o.len(),
            _ => 0,
        }
    }
}

/// Resumable progress of the initial download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// The offset of the next page to fetch.
    #[serde(default)]
    pub next_offset: u64,

    /// Set once the initial download has paged through the whole history.
    #[serde(default)]
    pub initial_download_complete: bool,
}

/// A page file found in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFile {
    pub offset: u64,
    pub path: PathBuf,
}

/// Reads and writes page documents and the sync state in a single directory. It is assumed that
/// only one process writes to the directory at a time.
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
    progress: Progress,
}

impl Store {
    pub fn new(dir: impl Into<PathBuf>, progress: Progress) -> Self {
        Self {
            dir: dir.into(),
            progress,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The file name used for the page starting at `offset`.
    pub fn page_file_name(offset: u64) -> String {
        format!("{PAGE_PREFIX}{offset:06}.{JSON_EXTENSION}")
    }

    pub fn page_path(&self, offset: u64) -> PathBuf {
        self.dir.join(Self::page_file_name(offset))
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_JSON)
    }

    /// Writes the page starting at `offset`, replacing any previous copy. Readers never see a
    /// partially written file.
    pub async fn write_page(&self, offset: u64, document: &PageDocument) -> Result<PathBuf> {
        let path = self.page_path(offset);
        let json = serde_json::to_string_pretty(document)
            .context("Failed to serialize the page document")?;
        utils::write_atomic(&path, json).await?;
        trace!("Wrote {}", path.display());
        Ok(path)
    }

    /// Reads one page document.
    pub async fn read_page(&self, page: &PageFile) -> Result<PageDocument> {
        utils::deserialize(&page.path).await
    }

    /// Lists the page files ordered by the numeric offset in their names. Files without a number
    /// in their name, hidden files and the state file are ignored.
    pub async fn list_pages(&self) -> Result<Vec<PageFile>> {
        let mut pages: Vec<PageFile> = Vec::new();
        let mut dir = utils::read_dir(&self.dir).await?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .context("Failed to read directory entry")?
        {
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            match page_offset(&name) {
                Some(offset) => pages.push(PageFile {
                    offset,
                    path: entry.path(),
                }),
                None => trace!("Skipping {name}, it is not a page file"),
            }
        }
        pages.sort_by(|a, b| a.offset.cmp(&b.offset).then_with(|| a.path.cmp(&b.path)));
        Ok(pages)
    }

    /// The `total_count` recorded in the most recently modified page. When there are no pages or
    /// the count cannot be read, a warning is reported and zero is returned.
    pub async fn local_total_count(&self) -> u64 {
        let latest = match self.latest_page().await {
            Ok(Some(path)) => path,
            Ok(None) => {
                self.progress
                    .warn("Warning: No local data files were found, assuming 0 transactions.");
                return 0;
            }
            Err(e) => {
                self.progress
                    .warn(format!("Warning: Could not list local data files: {e:#}"));
                return 0;
            }
        };

        let name = latest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        match utils::deserialize::<PageDocument>(&latest).await {
            Ok(PageDocument {
                total_count: Some(count),
                ..
            }) => count,
            Ok(_) => {
                self.progress.warn(format!(
                    "Warning: Could not read total_count from {name}, it is missing."
                ));
                0
            }
            Err(e) => {
                self.progress.warn(format!(
                    "Warning: Could not read total_count from {name}: {e:#}"
                ));
                0
            }
        }
    }

    async fn latest_page(&self) -> Result<Option<PathBuf>> {
        let mut latest: Option<(SystemTime, PathBuf)> = None;
        for page in self.list_pages().await? {
            let modified = tokio::fs::metadata(&page.path)
                .await
                .and_then(|m| m.modified())
                .with_context(|| format!("Unable to stat {}", page.path.display()))?;
            let newer = match &latest {
                Some((t, _)) => modified >= *t,
                None => true,
            };
            if newer {
                latest = Some((modified, page.path));
            }
        }
        Ok(latest.map(|(_, path)| path))
    }

    /// Reads the sync state. A missing file means there has been no sync yet; a corrupt file is
    /// reported and treated the same way.
    pub async fn read_state(&self) -> SyncState {
        let path = self.state_path();
        if !path.is_file() {
            debug!("No sync state at {}", path.display());
            return SyncState::default();
        }
        match utils::deserialize(&path).await {
            Ok(state) => state,
            Err(e) => {
                self.progress.warn(format!(
                    "Warning: The sync state is unreadable and will be reset: {e:#}"
                ));
                SyncState::default()
            }
        }
    }

    /// Persists the sync state.
    pub async fn write_state(&self, state: SyncState) -> Result<()> {
        let json =
            serde_json::to_string_pretty(&state).context("Failed to serialize the sync state")?;
        utils::write_atomic(self.state_path(), json)
            .await
            .context("Unable to save the sync state")
    }
}

/// Extracts the offset from a page file name: the first run of digits in a visible `.json` file
/// other than the state file.
fn page_offset(file_name: &str) -> Option<u64> {
    if file_name.starts_with('.') || file_name == STATE_JSON {
        return None;
    }
    let stem = file_name.strip_suffix(&format!(".{JSON_EXTENSION}"))?;
    let digits: String = stem
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
