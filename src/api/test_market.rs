//! Implements the `Market` trait using in-memory data for testing purposes.
//!
//! Note: this is compiled even in the "production" version of this app so that we can run the whole
//! app, top-to-bottom, without talking to Steam.

use crate::api::{Market, MarketResponse};
use crate::Result;
use anyhow::anyhow;
use chrono::{Days, NaiveDate};
use std::sync::{Arc, Mutex};
use tracing::trace;

#[cfg(test)]
use crate::Cancel;
#[cfg(test)]
use std::collections::VecDeque;

/// Number of rows the default market is seeded with.
const SEED_ROWS: usize = 250;

/// One transaction as the test market renders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TestRow {
    pub(crate) purchase: bool,
    pub(crate) item_name: String,
    pub(crate) price: String,
    pub(crate) acted_on: String,
    pub(crate) listed_on: String,
}

impl TestRow {
    #[cfg(test)]
    pub(crate) fn new(
        purchase: bool,
        item_name: &str,
        price: &str,
        acted_on: &str,
        listed_on: &str,
    ) -> Self {
        Self {
            purchase,
            item_name: item_name.to_string(),
            price: price.to_string(),
            acted_on: acted_on.to_string(),
            listed_on: listed_on.to_string(),
        }
    }

    fn to_html(&self) -> String {
        let marker = if self.purchase { "+" } else { "-" };
        format!(
            r#"<div class="market_listing_row market_recent_listing_row">
  <div class="market_listing_left_cell market_listing_gainorloss">{marker}</div>
  <div class="market_listing_right_cell market_listing_their_price"><span class="market_table_value"><span class="market_listing_price">{price}</span></span></div>
  <div class="market_listing_right_cell market_listing_listed_date can_combine">{acted_on}</div>
  <div class="market_listing_right_cell market_listing_listed_date can_combine">{listed_on}</div>
  <div class="market_listing_item_name_block"><span class="market_listing_item_name">{name}</span></div>
</div>
"#,
            price = escape(&self.price),
            acted_on = escape(&self.acted_on),
            listed_on = escape(&self.listed_on),
            name = escape(&self.item_name),
        )
    }
}

/// A canned outcome that is served before any generated page.
#[cfg(test)]
#[derive(Debug, Clone)]
pub(crate) enum Scripted {
    Response { status: u16, body: String },
    TransportError(String),
}

#[derive(Debug, Default)]
struct State {
    /// Newest first, like the real endpoint.
    rows: Vec<TestRow>,
    #[cfg(test)]
    script: VecDeque<Scripted>,
    /// After this many calls, every call answers with the given status.
    #[cfg(test)]
    fail_after: Option<(usize, u16)>,
    /// Raise the flag during the call with this (1-based) number.
    #[cfg(test)]
    cancel_on_call: Option<(usize, Cancel)>,
    #[cfg(test)]
    calls: VecDeque<(u64, u64)>,
}

/// An implementation of the `Market` trait that does not use the network. Clones share the same
/// state so a test can keep a handle while the engine owns a boxed copy.
#[derive(Debug, Clone)]
pub(crate) struct TestMarket {
    state: Arc<Mutex<State>>,
}

impl TestMarket {
    /// Create a new `TestMarket` serving `rows`, newest first.
    pub(crate) fn new(rows: Vec<TestRow>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                rows,
                ..State::default()
            })),
        }
    }
}

#[cfg(test)]
impl TestMarket {
    /// Queue a canned response to be served before generated pages.
    pub(crate) fn push_script(&self, scripted: Scripted) {
        self.state.lock().unwrap().script.push_back(scripted);
    }

    pub(crate) fn fail_after(&self, calls: usize, status: u16) {
        self.state.lock().unwrap().fail_after = Some((calls, status));
    }

    pub(crate) fn cancel_on_call(&self, call: usize, cancel: Cancel) {
        self.state.lock().unwrap().cancel_on_call = Some((call, cancel));
    }

    /// Simulates new activity: the rows appear at the front, shifting everything else back.
    pub(crate) fn prepend_rows(&self, rows: Vec<TestRow>) {
        let mut state = self.state.lock().unwrap();
        let mut new_rows = rows;
        new_rows.append(&mut state.rows);
        state.rows = new_rows;
    }

    /// Every `(start, count)` requested so far.
    pub(crate) fn calls(&self) -> Vec<(u64, u64)> {
        self.state.lock().unwrap().calls.iter().copied().collect()
    }

    pub(crate) fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }
}

impl Default for TestMarket {
    /// Seeds the market with generated history.
    fn default() -> Self {
        Self::new(seed_rows(SEED_ROWS))
    }
}

#[async_trait::async_trait]
impl Market for TestMarket {
    async fn get(&mut self, start: u64, count: u64) -> Result<MarketResponse> {
        // Only the scripting hooks, which exist in test builds, change the state.
        #[cfg_attr(not(test), allow(unused_mut))]
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("The test market state is poisoned"))?;
        trace!("Test market request start={start} count={count}");

        #[cfg(test)]
        {
            state.calls.push_back((start, count));
            let call = state.calls.len();
            if let Some((n, cancel)) = &state.cancel_on_call {
                if *n == call {
                    cancel.cancel();
                }
            }
            if let Some(scripted) = state.script.pop_front() {
                return match scripted {
                    Scripted::Response { status, body } => Ok(MarketResponse { status, body }),
                    Scripted::TransportError(message) => Err(anyhow!(message)),
                };
            }
            if let Some((n, status)) = state.fail_after {
                if call > n {
                    return Ok(MarketResponse {
                        status,
                        body: String::new(),
                    });
                }
            }
        }

        Ok(MarketResponse {
            status: 200,
            body: render_page(&state.rows, start, count),
        })
    }
}

/// Renders the JSON body the history endpoint returns for `rows[start..start + count]`.
fn render_page(rows: &[TestRow], start: u64, count: u64) -> String {
    let total = rows.len();
    let from = usize::try_from(start).unwrap_or(usize::MAX).min(total);
    let to = from
        .saturating_add(usize::try_from(count).unwrap_or(usize::MAX))
        .min(total);
    let page = &rows[from..to];
    let results_html: String = page.iter().map(TestRow::to_html).collect();
    let results: Vec<serde_json::Value> = (from..to)
        .map(|i| serde_json::json!({ "id": format!("history_row_{i}") }))
        .collect();
    serde_json::json!({
        "success": true,
        "pagesize": count,
        "total_count": total,
        "start": start,
        "results_html": results_html,
        "results": results,
    })
    .to_string()
}

/// Generates `n` rows, newest first, three days apart, so the history crosses year boundaries.
fn seed_rows(n: usize) -> Vec<TestRow> {
    const ITEMS: &[&str] = &[
        "AK-47 | Redline (Field-Tested)",
        "Mann Co. Supply Crate Key",
        "Operation Breakout Weapon Case",
        "Sticker | Team Liquid (Holo)",
        "Gamma Case",
        "Tour of Duty Ticket",
    ];
    let newest = NaiveDate::from_ymd_opt(2025, 2, 20).unwrap_or_default();
    (0..n)
        .map(|i| {
            let acted = newest
                .checked_sub_days(Days::new(3 * i as u64))
                .unwrap_or(newest);
            let listed = acted
                .checked_sub_days(Days::new((i % 5) as u64 * 4))
                .unwrap_or(acted);
            TestRow {
                purchase: i % 3 == 0,
                item_name: ITEMS[i % ITEMS.len()].to_string(),
                price: format!("${}.{:02} USD", 1 + i % 40, (i * 37) % 100),
                acted_on: acted.format("%a %b %-d").to_string(),
                listed_on: listed.format("%a %b %-d").to_string(),
            }
        })
        .collect()
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
