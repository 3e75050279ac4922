mod api;
pub mod args;
mod cancel;
pub mod commands;
mod config;
mod error;
mod fetch;
mod model;
mod process;
mod progress;
mod store;
mod sync;
mod utils;

pub use api::{Mode, TEST_MODE_ENV};
pub use cancel::Cancel;
pub use config::Config;
pub use error::{Error, FetchError, Result};
pub use fetch::FetchSettings;
pub use model::{
    infer_years, month_of, parse_results_html, FinalizedTransaction, RawTransaction,
    TransactionType, NOT_AVAILABLE,
};
pub use process::ProcessOutcome;
pub use progress::{Message, Progress, Severity};
pub use store::{PageDocument, PageFile, Store, SyncState, STATE_JSON};
pub use sync::SyncOutcome;
