//! Access to the remote market history endpoint.
//!
//! The `Market` trait is the seam between the sync engine and the network. `SteamMarket` talks to
//! steamcommunity.com; `TestMarket` serves generated history from memory so the whole program can
//! run, top-to-bottom, without a Steam account.

mod steam;
mod test_market;

use crate::{Config, Result};
use std::fmt::{Display, Formatter};

pub(crate) use steam::SteamMarket;
pub(crate) use test_market::TestMarket;
#[cfg(test)]
pub(crate) use test_market::{Scripted, TestRow};

/// When this environment variable is set and non-empty, `Mode::from_env` returns `Mode::Test`.
pub const TEST_MODE_ENV: &str = "STEAM_HISTORY_IN_TEST_MODE";

/// The raw outcome of one request: the HTTP status and the body as text. Classification of the
/// outcome is left to the fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MarketResponse {
    pub(crate) status: u16,
    pub(crate) body: String,
}

/// One page request against the market history endpoint.
#[async_trait::async_trait]
pub(crate) trait Market {
    /// Requests `count` history rows starting at `start`. An `Err` means the request never
    /// produced an HTTP response (timeout, connection reset, DNS and so on).
    async fn get(&mut self, start: u64, count: u64) -> Result<MarketResponse>;
}

/// Selects which `Market` implementation to use.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub enum Mode {
    #[default]
    Steam,
    Test,
}

impl Mode {
    /// Returns `Mode::Test` when `STEAM_HISTORY_IN_TEST_MODE` is set and non-empty.
    pub fn from_env() -> Self {
        match std::env::var(TEST_MODE_ENV) {
            Ok(v) if !v.is_empty() => Mode::Test,
            _ => Mode::Steam,
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Steam => f.write_str("steam"),
            Mode::Test => f.write_str("test"),
        }
    }
}

/// Creates the `Market` for `mode`.
pub(crate) fn market(config: &Config, mode: Mode) -> Result<Box<dyn Market + Send>> {
    Ok(match mode {
        Mode::Steam => Box::new(SteamMarket::new(config)?),
        Mode::Test => Box::new(TestMarket::default()),
    })
}
