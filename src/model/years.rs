//! Reconstructs the year for short-form dates such as `Thu Feb 20`.
//!
//! Steam never prints the year in market history. The rows are strictly newest-first, so walking
//! them in order the month can only stay the same or go down until the walk crosses into the
//! previous year, at which point it jumps up. That jump is the only signal available, which is why
//! the input must be in exactly the order the pages were fetched.

use crate::model::transaction::{FinalizedTransaction, RawTransaction};

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Greater than any real month.
const NO_MONTH_YET: u32 = 13;

/// Returns the month number (1-12) of a `<Weekday> <Mon> <Day>` date, or `None` when the second
/// token is missing or is not a known three-letter month.
pub fn month_of(date_text: &str) -> Option<u32> {
    let token = date_text.split_whitespace().nth(1)?;
    MONTHS
        .iter()
        .position(|m| *m == token)
        .map(|ix| ix as u32 + 1)
}

/// Appends inferred years to the dates of `rows`, which must be newest-first. `current_year` is
/// the year of the newest row, normally the present calendar year.
///
/// Rows whose acted-on date cannot be read keep both dates exactly as they were and do not
/// affect the inference for the rows around them.
pub fn infer_years(rows: Vec<RawTransaction>, current_year: i32) -> Vec<FinalizedTransaction> {
    let years = acted_on_years(&rows, current_year);
    rows.into_iter()
        .zip(years)
        .map(|(row, year)| finalize(row, year))
        .collect()
}

fn acted_on_years(rows: &[RawTransaction], current_year: i32) -> Vec<Option<i32>> {
    let mut year = current_year;
    let mut last_month = NO_MONTH_YET;
    rows.iter()
        .map(|row| {
            let month = month_of(&row.acted_on_date)?;
            if month > last_month {
                year -= 1;
            }
            last_month = month;
            Some(year)
        })
        .collect()
}

fn finalize(row: RawTransaction, acted_on_year: Option<i32>) -> FinalizedTransaction {
    let (sold_or_purchased_date, listed_date) = match acted_on_year {
        None => (row.acted_on_date, row.listed_on_date),
        Some(year) => {
            let listed_date = match (month_of(&row.acted_on_date), month_of(&row.listed_on_date)) {
                (Some(acted), Some(listed)) => {
                    // Listed in a later month than it sold means it was listed the year before.
                    let listed_year = if listed > acted { year - 1 } else { year };
                    format!("{}, {listed_year}", row.listed_on_date)
                }
                _ => row.listed_on_date,
            };
            (format!("{}, {year}", row.acted_on_date), listed_date)
        }
    };
    FinalizedTransaction {
        sold_or_purchased_date,
        listed_date,
        item_name: row.item_name,
        kind: row.kind,
        price: row.price,
    }
}
