//! Fetches one page of market history with a bounded retry budget.
//!
//! Each attempt is classified:
//! - 200 with `success` and no login prompt in the markup: done.
//! - 200 with a login prompt, without `success`, or with an unreadable body: retry. The session
//!   state on Steam's side flaps, so a login prompt is not trusted on its own.
//! - 401 or 403: the cookies are stale, fail at once.
//! - 429, 5xx or a transport error: retry.
//! - anything else: fail at once.
//!
//! Retries wait `initial_backoff * 2^attempt`. The cancellation flag is honored before every
//! attempt and throughout every wait.

use crate::api::{Market, MarketResponse};
use crate::store::PageDocument;
use crate::{Cancel, FetchError, Progress};
use std::time::Duration;
use tracing::{debug, trace};

/// Markup Steam substitutes for the history table when the session is not logged in.
const LOGIN_MARKER: &str = "Login";

/// Retry and pacing settings for the page fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSettings {
    /// Total number of attempts per page.
    pub max_retries: u32,
    /// The wait after the first failed attempt. Each later wait doubles.
    pub initial_backoff: Duration,
    /// A pause before every attempt to avoid hammering the server.
    pub request_delay: Duration,
}

/// What to do with one response.
#[derive(Debug)]
enum Outcome {
    Page(PageDocument),
    Retry(String),
    Fail(FetchError),
}

/// Performs page requests against a `Market`, one at a time.
pub(crate) struct Fetcher {
    market: Box<dyn Market + Send>,
    settings: FetchSettings,
    cancel: Cancel,
    progress: Progress,
}

impl Fetcher {
    pub(crate) fn new(
        market: Box<dyn Market + Send>,
        settings: FetchSettings,
        cancel: Cancel,
        progress: Progress,
    ) -> Self {
        Self {
            market,
            settings,
            cancel,
            progress,
        }
    }

    /// Fetches `count` rows starting at `offset`.
    ///
    /// # Errors
    /// - `FetchError::AuthExpired` on 401/403, without retrying.
    /// - `FetchError::UnexpectedStatus` on any status that is neither success nor retryable.
    /// - `FetchError::RetriesExhausted` once every attempt has failed.
    /// - `FetchError::Cancelled` as soon as the cancellation flag is seen.
    pub(crate) async fn fetch(
        &mut self,
        offset: u64,
        count: u64,
    ) -> std::result::Result<PageDocument, FetchError> {
        for attempt in 0..self.settings.max_retries {
            if self.cancel.is_cancelled() || !self.cancel.sleep(self.settings.request_delay).await
            {
                return Err(FetchError::Cancelled);
            }

            debug!(
                "Fetching start={offset} count={count} (attempt {} of {})",
                attempt + 1,
                self.settings.max_retries
            );
            let reason = match self.market.get(offset, count).await {
                Ok(response) => match classify(response) {
                    Outcome::Page(document) => return Ok(document),
                    Outcome::Fail(e) => return Err(e),
                    Outcome::Retry(reason) => reason,
                },
                Err(e) => format!("An error occurred: {e:#}"),
            };

            let wait = backoff(self.settings.initial_backoff, attempt);
            self.progress.warn(format!(
                "Warning: {reason}. Retrying in {}...",
                format_wait(wait)
            ));
            if !self.cancel.sleep(wait).await {
                return Err(FetchError::Cancelled);
            }
        }
        Err(FetchError::RetriesExhausted {
            attempts: self.settings.max_retries,
        })
    }
}

fn classify(response: MarketResponse) -> Outcome {
    let status = response.status;
    trace!("Response status {status}, {} bytes", response.body.len());
    match status {
        200 => match serde_json::from_str::<PageDocument>(&response.body) {
            Ok(document) if document.results_html.contains(LOGIN_MARKER) => Outcome::Retry(
                "Authentication issue: Steam is asking to log in".to_string(),
            ),
            Ok(document) if document.success => Outcome::Page(document),
            Ok(_) => Outcome::Retry("Received status 200 without success".to_string()),
            Err(e) => Outcome::Retry(format!("Received an unreadable response body ({e})")),
        },
        401 | 403 => Outcome::Fail(FetchError::AuthExpired { status }),
        429 | 500..=599 => Outcome::Retry(format!("Received status {status}")),
        _ => Outcome::Fail(FetchError::UnexpectedStatus { status }),
    }
}

/// `initial * 2^attempt`, saturating.
fn backoff(initial: Duration, attempt: u32) -> Duration {
    initial.saturating_mul(2u32.saturating_pow(attempt))
}

fn format_wait(d: Duration) -> String {
    if d.subsec_nanos() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Scripted, TestMarket, TestRow};
    use tokio::time::Instant;

    /// Paused-clock timers fire on millisecond boundaries, so allow a little slack.
    fn assert_elapsed(start: Instant, expected: Duration) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(100),
            "expected about {expected:?}, got {elapsed:?}"
        );
    }

    fn settings(max_retries: u32, backoff_secs: u64) -> FetchSettings {
        FetchSettings {
            max_retries,
            initial_backoff: Duration::from_secs(backoff_secs),
            request_delay: Duration::ZERO,
        }
    }

    fn market() -> TestMarket {
        TestMarket::new(vec![TestRow::new(
            true,
            "Gamma Case",
            "$1.00",
            "Thu Feb 20",
            "Thu Feb 20",
        )])
    }

    fn fetcher(market: &TestMarket, settings: FetchSettings, cancel: &Cancel) -> Fetcher {
        Fetcher::new(
            Box::new(market.clone()),
            settings,
            cancel.clone(),
            Progress::null(),
        )
    }

    fn respond(market: &TestMarket, status: u16, body: &str) {
        market.push_script(Scripted::Response {
            status,
            body: body.to_string(),
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let market = market();
        let mut fetcher = fetcher(&market, settings(3, 1), &Cancel::new());
        let document = fetcher.fetch(0, 100).await.unwrap();
        assert_eq!(Some(1), document.total_count);
        assert!(document.results_html.contains("Gamma Case"));
        assert_eq!(vec![(0, 100)], market.calls());
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_exhaust_retries_with_doubling_waits() {
        let market = market();
        market.fail_after(0, 500);
        let (progress, mut rx) = Progress::channel();
        let mut fetcher = Fetcher::new(
            Box::new(market.clone()),
            settings(3, 1),
            Cancel::new(),
            progress,
        );

        let start = Instant::now();
        let err = fetcher.fetch(0, 100).await.unwrap_err();

        assert_eq!(FetchError::RetriesExhausted { attempts: 3 }, err);
        assert_eq!(3, market.calls().len());
        assert_elapsed(start, Duration::from_secs(1 + 2 + 4));

        let mut waits = Vec::new();
        while let Ok(m) = rx.try_recv() {
            waits.push(m.text);
        }
        assert_eq!(3, waits.len());
        assert!(waits[0].ends_with("Retrying in 1s..."));
        assert!(waits[1].ends_with("Retrying in 2s..."));
        assert!(waits[2].ends_with("Retrying in 4s..."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_then_success() {
        let market = market();
        respond(&market, 429, "");
        respond(&market, 502, "<html>bad gateway</html>");
        let mut fetcher = fetcher(&market, settings(5, 2), &Cancel::new());
        let start = Instant::now();
        assert!(fetcher.fetch(0, 100).await.is_ok());
        assert_eq!(3, market.calls().len());
        assert_elapsed(start, Duration::from_secs(2 + 4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failures_are_not_retried() {
        for status in [401, 403] {
            let market = market();
            respond(&market, status, "");
            let mut fetcher = fetcher(&market, settings(5, 1), &Cancel::new());
            let err = fetcher.fetch(0, 1).await.unwrap_err();
            assert_eq!(FetchError::AuthExpired { status }, err);
            assert_eq!(1, market.calls().len());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_status_is_not_retried() {
        let market = market();
        respond(&market, 404, "");
        let mut fetcher = fetcher(&market, settings(5, 1), &Cancel::new());
        let err = fetcher.fetch(0, 1).await.unwrap_err();
        assert_eq!(FetchError::UnexpectedStatus { status: 404 }, err);
        assert_eq!(1, market.calls().len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_prompt_is_retried() {
        let market = market();
        respond(
            &market,
            200,
            r#"{"success": true, "total_count": 0, "results_html": "<a>Login</a>"}"#,
        );
        let mut fetcher = fetcher(&market, settings(3, 1), &Cancel::new());
        let document = fetcher.fetch(0, 1).await.unwrap();
        assert!(!document.results_html.contains("Login"));
        assert_eq!(2, market.calls().len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsuccessful_or_unreadable_200_is_retried() {
        let market = market();
        respond(&market, 200, r#"{"success": false}"#);
        respond(&market, 200, "<html>not json</html>");
        let mut fetcher = fetcher(&market, settings(3, 1), &Cancel::new());
        assert!(fetcher.fetch(0, 1).await.is_ok());
        assert_eq!(3, market.calls().len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_is_retried() {
        let market = market();
        market.push_script(Scripted::TransportError("connection reset".into()));
        let mut fetcher = fetcher(&market, settings(2, 1), &Cancel::new());
        assert!(fetcher.fetch(0, 1).await.is_ok());
        assert_eq!(2, market.calls().len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_first_attempt() {
        let market = market();
        let cancel = Cancel::new();
        cancel.cancel();
        let mut fetcher = fetcher(&market, settings(3, 1), &cancel);
        assert_eq!(FetchError::Cancelled, fetcher.fetch(0, 1).await.unwrap_err());
        assert!(market.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff() {
        let market = market();
        market.fail_after(0, 503);
        let cancel = Cancel::new();
        market.cancel_on_call(1, cancel.clone());
        let mut fetcher = fetcher(&market, settings(5, 60), &cancel);

        let start = Instant::now();
        assert_eq!(FetchError::Cancelled, fetcher.fetch(0, 1).await.unwrap_err());
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(1, market.calls().len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_delay_precedes_each_attempt() {
        let market = market();
        respond(&market, 500, "");
        let mut fetcher = fetcher(
            &market,
            FetchSettings {
                max_retries: 2,
                initial_backoff: Duration::from_secs(1),
                request_delay: Duration::from_secs(2),
            },
            &Cancel::new(),
        );
        let start = Instant::now();
        assert!(fetcher.fetch(0, 1).await.is_ok());
        assert_elapsed(start, Duration::from_secs(2 + 1 + 2));
    }

    #[tokio::test]
    async fn test_zero_retries() {
        let market = market();
        let mut fetcher = fetcher(&market, settings(0, 1), &Cancel::new());
        assert_eq!(
            FetchError::RetriesExhausted { attempts: 0 },
            fetcher.fetch(0, 1).await.unwrap_err()
        );
        assert!(market.calls().is_empty());
    }

    #[test]
    fn test_backoff() {
        let base = Duration::from_secs(5);
        assert_eq!(Duration::from_secs(5), backoff(base, 0));
        assert_eq!(Duration::from_secs(10), backoff(base, 1));
        assert_eq!(Duration::from_secs(40), backoff(base, 3));
        assert_eq!(Duration::ZERO, backoff(Duration::ZERO, 4));
        assert_eq!(Duration::MAX, backoff(Duration::MAX, 2));
        assert_eq!(base * u32::MAX, backoff(base, 200));
    }

    #[test]
    fn test_format_wait() {
        assert_eq!("4s", format_wait(Duration::from_secs(4)));
        assert_eq!("0.5s", format_wait(Duration::from_millis(500)));
    }
}
