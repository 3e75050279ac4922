//! Turns the stored pages into the exported table: every page is parsed in offset order, the
//! years are inferred across the whole history and the rows are written as CSV.

use crate::model::{infer_years, parse_results_html, FinalizedTransaction, RawTransaction};
use crate::store::Store;
use crate::{utils, Cancel, Progress, Result};
use anyhow::{ensure, Context};
use chrono::Datelike;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// The result of processing the stored pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// The table was written to `path`.
    Written {
        path: PathBuf,
        rows: usize,
        pages: usize,
    },
    /// No rows could be parsed so nothing was written.
    NoRows,
    Cancelled,
}

/// Reads every page in `store`, infers years relative to `current_year` and writes the table to
/// `output_path`.
///
/// # Errors
/// - Returns an error if the data directory does not exist or if the table cannot be written.
///   Individual pages that cannot be read are reported and skipped.
pub(crate) async fn process(
    store: &Store,
    output_path: &Path,
    current_year: i32,
    cancel: &Cancel,
    progress: &Progress,
) -> Result<ProcessOutcome> {
    progress.heading("--- Processing Stored Pages ---");
    ensure!(
        store.dir().is_dir(),
        "The data directory '{}' does not exist, download the history first",
        store.dir().display()
    );

    let pages = store.list_pages().await?;
    progress.info(format!("Found {} page file(s) to process.", pages.len()));

    let mut raw: Vec<RawTransaction> = Vec::new();
    let mut parsed_pages = 0;
    for page in &pages {
        if cancel.is_cancelled() {
            progress.warn("Processing stopped by user.");
            return Ok(ProcessOutcome::Cancelled);
        }
        match store.read_page(page).await {
            Ok(document) => {
                let rows = parse_results_html(&document.results_html);
                progress.debug(format!(
                    "Parsed {} row(s) from {}",
                    rows.len(),
                    page.path.display()
                ));
                raw.extend(rows);
                parsed_pages += 1;
            }
            Err(e) => progress.warn(format!(
                "Skipping '{}', it could not be read: {e:#}",
                page.path.display()
            )),
        }
    }

    if raw.is_empty() {
        progress.warn("No transactions were parsed, nothing to write.");
        return Ok(ProcessOutcome::NoRows);
    }

    let rows = infer_years(raw, current_year);
    write_csv(output_path, &rows).await?;
    progress.success(format!(
        "Wrote {} transaction(s) to {}",
        rows.len(),
        output_path.display()
    ));
    Ok(ProcessOutcome::Written {
        path: output_path.to_path_buf(),
        rows: rows.len(),
        pages: parsed_pages,
    })
}

/// The year used for the newest transaction.
pub(crate) fn current_year() -> i32 {
    chrono::Local::now().year()
}

async fn write_csv(path: &Path, rows: &[FinalizedTransaction]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row).context("Unable to serialize a transaction")?;
    }
    let data = writer
        .into_inner()
        .context("Unable to finish writing the table")?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            utils::make_dir(parent).await?;
        }
    }
    utils::write_atomic(path, data).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PageDocument;
    use tempfile::TempDir;

    fn row_html(marker: &str, name: &str, price: &str, acted: &str, listed: &str) -> String {
        format!(
            r#"<div class="market_listing_row">
  <div class="market_listing_gainorloss">{marker}</div>
  <span class="market_listing_price">{price}</span>
  <div class="market_listing_listed_date">{acted}</div>
  <div class="market_listing_listed_date">{listed}</div>
  <span class="market_listing_item_name">{name}</span>
</div>"#
        )
    }

    fn document(total_count: u64, html: String) -> PageDocument {
        PageDocument {
            success: true,
            total_count: Some(total_count),
            results_html: html,
            results: serde_json::Value::Array(Vec::new()),
            extra: serde_json::Map::new(),
        }
    }

    struct Env {
        _dir: TempDir,
        store: Store,
        output: PathBuf,
    }

    fn env() -> Env {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().join("raw"), Progress::null());
        std::fs::create_dir_all(store.dir()).unwrap();
        let output = dir.path().join("out").join("history.csv");
        Env {
            _dir: dir,
            store,
            output,
        }
    }

    async fn run(env: &Env) -> ProcessOutcome {
        process(
            &env.store,
            &env.output,
            2025,
            &Cancel::new(),
            &Progress::null(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_pages_are_processed_in_offset_order() {
        let env = env();
        // Written out of order, and offset 1000 would sort before 200 as text.
        let older = row_html("-", "Old Case", "$0.50", "Fri Dec 20", "Wed Dec 18");
        let newer = row_html("+", "New Key", "$2.49", "Mon Jan 6", "Sat Dec 28");
        let oldest = row_html("-", "Oldest Case", "$0.10", "Sun Nov 3", "Sun Nov 3");
        env.store
            .write_page(1000, &document(3, oldest))
            .await
            .unwrap();
        env.store.write_page(0, &document(3, newer)).await.unwrap();
        env.store.write_page(200, &document(3, older)).await.unwrap();

        let outcome = run(&env).await;

        assert_eq!(
            ProcessOutcome::Written {
                path: env.output.clone(),
                rows: 3,
                pages: 3
            },
            outcome
        );
        let csv = std::fs::read_to_string(&env.output).unwrap();
        let expected = "\
Sold/Purchased Date,Listed Date,Item Name,Type,Price
\"Mon Jan 6, 2025\",\"Sat Dec 28, 2024\",New Key,Purchase,2.49
\"Fri Dec 20, 2024\",\"Wed Dec 18, 2024\",Old Case,Sale,0.50
\"Sun Nov 3, 2024\",\"Sun Nov 3, 2024\",Oldest Case,Sale,0.10
";
        assert_eq!(expected, csv);
    }

    #[tokio::test]
    async fn test_unreadable_page_is_skipped() {
        let env = env();
        let html = row_html("+", "Key", "$2.49", "Mon Jan 6", "Mon Jan 6");
        env.store.write_page(0, &document(1, html)).await.unwrap();
        std::fs::write(env.store.page_path(100), "{ not json").unwrap();

        let outcome = run(&env).await;

        assert_eq!(
            ProcessOutcome::Written {
                path: env.output.clone(),
                rows: 1,
                pages: 1
            },
            outcome
        );
    }

    #[tokio::test]
    async fn test_no_rows_writes_nothing() {
        let env = env();
        env.store
            .write_page(0, &document(0, String::new()))
            .await
            .unwrap();

        assert_eq!(ProcessOutcome::NoRows, run(&env).await);
        assert!(!env.output.exists());
    }

    #[tokio::test]
    async fn test_missing_data_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().join("missing"), Progress::null());
        let result = process(
            &store,
            &dir.path().join("out.csv"),
            2025,
            &Cancel::new(),
            &Progress::null(),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_cancel_stops_before_writing() {
        let env = env();
        let html = row_html("+", "Key", "$2.49", "Mon Jan 6", "Mon Jan 6");
        env.store.write_page(0, &document(1, html)).await.unwrap();
        let cancel = Cancel::new();
        cancel.cancel();

        let outcome = process(&env.store, &env.output, 2025, &cancel, &Progress::null())
            .await
            .unwrap();

        assert_eq!(ProcessOutcome::Cancelled, outcome);
        assert!(!env.output.exists());
    }
}
