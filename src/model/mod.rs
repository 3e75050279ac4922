//! Types that represent the core data model: rows parsed out of the market history markup and the
//! finished rows that go into the exported table.
mod html;
mod transaction;
mod years;

pub use html::parse_results_html;
pub use transaction::{FinalizedTransaction, RawTransaction, TransactionType, NOT_AVAILABLE};
pub use years::{infer_years, month_of};
