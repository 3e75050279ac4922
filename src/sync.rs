//! The sync engine. It decides between the initial full download and an incremental sync, drives
//! the fetcher page by page and persists progress after every page so an interrupted run can be
//! resumed.
//!
//! Full download: starts from the `next_offset` recorded in the sync state. A one-row probe learns
//! the remote total, then pages are fetched in order until the offset passes it. The state is
//! saved after every page and is only marked complete when the loop runs out of pages.
//!
//! Sync: compares the remote total with the total recorded in the newest local page and refreshes
//! as many pages as the difference needs, always starting at offset 0. The endpoint lists newest
//! first, so every new transaction pushes the older ones to later offsets.

use crate::fetch::Fetcher;
use crate::store::{PageDocument, Store, SyncState};
use crate::{Cancel, FetchError, Progress, Result};
use serde::Serialize;
use std::fmt::{Display, Formatter};
use tracing::debug;

/// How a run of the sync engine ended, short of a hard failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The initial download reached the end of the history.
    Downloaded { pages: u64, total_count: u64 },
    /// The account has no market history.
    NoTransactions,
    /// Pages were refreshed to pick up new transactions.
    Synced { pages: u64, new_items: u64 },
    /// The local copy already matches the remote total.
    UpToDate,
    /// The run was stopped on request. Everything written before the stop is intact.
    Cancelled,
}

impl Display for SyncOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncOutcome::Downloaded { pages, total_count } => write!(
                f,
                "Downloaded {pages} page(s) covering {total_count} transactions"
            ),
            SyncOutcome::NoTransactions => f.write_str("No transactions found"),
            SyncOutcome::Synced { pages, new_items } => write!(
                f,
                "Refreshed {pages} page(s) for {new_items} new transaction(s)"
            ),
            SyncOutcome::UpToDate => f.write_str("Already up to date"),
            SyncOutcome::Cancelled => f.write_str("Download stopped by user"),
        }
    }
}

/// Runs one download or sync against a single store. Pages are fetched strictly one after the
/// other.
pub(crate) struct Planner {
    fetcher: Fetcher,
    store: Store,
    cancel: Cancel,
    progress: Progress,
    page_size: u64,
}

impl Planner {
    pub(crate) fn new(
        fetcher: Fetcher,
        store: Store,
        cancel: Cancel,
        progress: Progress,
        page_size: u64,
    ) -> Self {
        Self {
            fetcher,
            store,
            cancel,
            progress,
            page_size: page_size.max(1),
        }
    }

    /// Reads the sync state and runs a full download or a sync accordingly.
    ///
    /// # Errors
    /// Returns an error wrapping a `FetchError` when a page cannot be fetched, or an I/O error when
    /// a page or the state cannot be written. Cancellation is not an error.
    pub(crate) async fn run(&mut self) -> Result<SyncOutcome> {
        let state = self.store.read_state().await;
        debug!("Sync state: {state:?}");
        if state.initial_download_complete {
            self.sync().await
        } else {
            self.full_download(state).await
        }
    }

    async fn full_download(&mut self, state: SyncState) -> Result<SyncOutcome> {
        if state.next_offset == 0 {
            self.progress
                .heading("--- Performing First-Time Full Download ---");
        } else {
            self.progress.heading(format!(
                "--- Resuming Full Download from offset {} ---",
                state.next_offset
            ));
        }
        if self.cancel.is_cancelled() {
            return Ok(self.stopped());
        }

        let total_count = match self.fetcher.fetch(0, 1).await {
            Ok(probe) => probe.total(),
            Err(e) => return self.interrupted(e, "Download"),
        };
        if total_count == 0 {
            self.progress.info("No transactions found.");
            return Ok(SyncOutcome::NoTransactions);
        }
        self.progress.info(format!(
            "Found a total of {total_count} transactions to download."
        ));

        let mut offset = state.next_offset;
        let mut pages = 0;
        while offset < total_count {
            if self.cancel.is_cancelled() {
                return Ok(self.stopped());
            }
            let document = match self.fetcher.fetch(offset, self.page_size).await {
                Ok(document) => document,
                Err(e) => return self.interrupted(e, "Download"),
            };
            // The page in flight is dropped if a stop was requested while it was being fetched.
            if self.cancel.is_cancelled() {
                return Ok(self.stopped());
            }

            let written = self.store.write_page(offset, &document).await;
            self.halted(written, "Download")?;
            self.progress.info(format!(
                "Saved {} ({} / {total_count})",
                Store::page_file_name(offset),
                offset + document.results_len() as u64
            ));
            offset += self.page_size;
            let saved = self
                .store
                .write_state(SyncState {
                    next_offset: offset,
                    initial_download_complete: false,
                })
                .await;
            self.halted(saved, "Download")?;
            pages += 1;
        }

        let saved = self
            .store
            .write_state(SyncState {
                next_offset: offset,
                initial_download_complete: true,
            })
            .await;
        self.halted(saved, "Download")?;
        self.progress.success("--- Full Download Complete ---");
        Ok(SyncOutcome::Downloaded { pages, total_count })
    }

    async fn sync(&mut self) -> Result<SyncOutcome> {
        self.progress.heading("--- Performing Efficient Sync ---");
        let local_total_count = self.store.local_total_count().await;
        if self.cancel.is_cancelled() {
            return Ok(self.stopped());
        }

        let live_total_count = match self.fetcher.fetch(0, 1).await {
            Ok(probe) => probe.total(),
            Err(e) => return self.interrupted(e, "Sync"),
        };
        self.progress
            .info(format!("Local transaction count: {local_total_count}"));
        self.progress
            .info(format!("Live transaction count:  {live_total_count}"));

        let new_items = live_total_count.saturating_sub(local_total_count);
        if new_items == 0 {
            self.progress.success("Already up to date.");
            return Ok(SyncOutcome::UpToDate);
        }
        self.progress
            .info(format!("Found {new_items} new transaction(s) to sync."));

        let pages = new_items.div_ceil(self.page_size);
        self.progress.info(format!(
            "This will require refreshing {pages} page(s) of data."
        ));

        for page in 0..pages {
            if self.cancel.is_cancelled() {
                return Ok(self.stopped());
            }
            let start = page * self.page_size;
            let document: PageDocument = match self.fetcher.fetch(start, self.page_size).await {
                Ok(document) => document,
                Err(e) => return self.interrupted(e, "Sync"),
            };
            if self.cancel.is_cancelled() {
                return Ok(self.stopped());
            }
            let written = self.store.write_page(start, &document).await;
            self.halted(written, "Sync")?;
            self.progress.info(format!(
                "Synced and saved {}",
                Store::page_file_name(start)
            ));
        }

        self.progress.success("--- Sync Complete ---");
        Ok(SyncOutcome::Synced { pages, new_items })
    }

    fn stopped(&self) -> SyncOutcome {
        self.progress
            .warn("Stop requested. Progress up to the last saved page is kept.");
        SyncOutcome::Cancelled
    }

    /// Turns a fetch failure into the result of the run: cancellation is a normal stop, anything
    /// else is reported and returned as an error.
    fn interrupted(&self, e: FetchError, phase: &str) -> Result<SyncOutcome> {
        if e.is_cancelled() {
            return Ok(self.stopped());
        }
        self.progress.error(format!("{phase} halted due to an error: {e}"));
        Err(e.into())
    }

    /// Reports a failed write to the progress sink before handing the error back.
    fn halted<T>(&self, result: Result<T>, phase: &str) -> Result<T> {
        result.map_err(|e| {
            self.progress
                .error(format!("{phase} halted due to an error: {e:#}"));
            e
        })
    }
}
