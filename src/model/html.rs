//! Extracts transaction rows from the `results_html` fragment of a history page.
//!
//! The markup is never trusted to be complete: a row that lacks a field gets a fallback value
//! instead of failing the page.

use crate::model::transaction::{RawTransaction, TransactionType, NOT_AVAILABLE};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::trace;

static ROW: LazyLock<Selector> = LazyLock::new(|| selector("div.market_listing_row"));
static GAIN_OR_LOSS: LazyLock<Selector> =
    LazyLock::new(|| selector("div.market_listing_gainorloss"));
static ITEM_NAME: LazyLock<Selector> = LazyLock::new(|| selector("span.market_listing_item_name"));
static PRICE: LazyLock<Selector> = LazyLock::new(|| selector("span.market_listing_price"));
static LISTED_DATE: LazyLock<Selector> =
    LazyLock::new(|| selector("div.market_listing_listed_date"));

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static CSS selector must parse")
}

/// Parses every `market_listing_row` in `html`, in document order. Blank input yields no rows.
pub fn parse_results_html(html: &str) -> Vec<RawTransaction> {
    if html.trim().is_empty() {
        return Vec::new();
    }
    let fragment = Html::parse_fragment(html);
    fragment.select(&ROW).map(parse_row).collect()
}

fn parse_row(row: ElementRef<'_>) -> RawTransaction {
    let marker = first_text(row, &GAIN_OR_LOSS).unwrap_or_default();
    let item_name = first_text(row, &ITEM_NAME);
    let price = first_text(row, &PRICE);
    let mut dates = row.select(&LISTED_DATE).map(text);
    let acted_on_date = dates.next();
    let listed_on_date = dates.next();

    if item_name.is_none() || price.is_none() || acted_on_date.is_none() {
        trace!(
            "Row is missing fields (name: {}, price: {}, date: {})",
            item_name.is_some(),
            price.is_some(),
            acted_on_date.is_some()
        );
    }

    RawTransaction {
        acted_on_date: acted_on_date.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        listed_on_date: listed_on_date.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        item_name: item_name.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        kind: TransactionType::from_marker(&marker),
        price: price.as_deref().map(parse_price).unwrap_or(Decimal::ZERO),
    }
}

fn first_text(row: ElementRef<'_>, selector: &Selector) -> Option<String> {
    row.select(selector).next().map(text)
}

fn text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Drops everything that is not a digit or a decimal point, then parses what is left. Anything
/// unparseable is zero.
///
/// `Decimal` holds at most 28 to 29 significant digits (magnitude below about 7.9e28). Text the
/// exact parser rejects is retried as a float and converted; a value beyond the `Decimal` range
/// still comes out as zero.
pub(crate) fn parse_price(s: &str) -> Decimal {
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    Decimal::from_str(&cleaned)
        .ok()
        .or_else(|| cleaned.parse::<f64>().ok().and_then(Decimal::from_f64))
        .unwrap_or(Decimal::ZERO)
}
