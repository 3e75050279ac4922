//! Configuration file handling for steam-history.
//!
//! The configuration file is stored at `$STEAM_HISTORY_HOME/config.json` and contains the Steam
//! session cookies, where raw pages are kept, the retry settings and the name of the exported
//! table.

use crate::fetch::FetchSettings;
use crate::{utils, Result};
use anyhow::{bail, ensure, Context};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const APP_NAME: &str = "steam-history";
const CONFIG_VERSION: u8 = 1;
const CONFIG_JSON: &str = "config.json";
const SESSION_ID: &str = "sessionid";
const LOGIN_SECURE: &str = "steamLoginSecure";
const RAW_DATA_DIRECTORY: &str = "data/raw_transactions";
const OUTPUT_FILE_NAME: &str = "steam_market_history.csv";
const MAX_RETRIES: u32 = 5;
const INITIAL_BACKOFF_SECONDS: u64 = 5;
const PAGE_SIZE: u64 = 100;
const REQUEST_DELAY_MS: u64 = 2000;
const REQUEST_TIMEOUT_SECS: u64 = 30;
const BASE_URL: &str = "https://steamcommunity.com/market/myhistory/render/";

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to `$STEAM_HISTORY_HOME` and from there it loads `config.json`. Relative paths found
/// in the file are resolved against the home directory.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
    data_dir: PathBuf,
    output_path: PathBuf,
    base_url: Url,
}

impl Config {
    /// Creates the home directory and writes a template `config.json` with empty cookies and
    /// default settings. The cookies must be filled in before `load` will accept the file.
    ///
    /// # Errors
    /// - Returns an error if a config file already exists or if any file operation fails.
    pub async fn create(home: impl Into<PathBuf>) -> Result<PathBuf> {
        let maybe_relative = home.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;

        let config_path = root.join(CONFIG_JSON);
        if config_path.exists() {
            bail!(
                "A config file already exists at '{}'",
                config_path.display()
            )
        }

        let config_file = ConfigFile::default();
        config_file.save(&config_path).await?;
        utils::make_dir(&root.join(config_file.raw_data_directory())).await?;
        Ok(config_path)
    }

    /// This will
    /// - validate that the home directory and the config file exist
    /// - load and validate the config file
    /// - create the raw data directory if it is missing
    /// - return the loaded configuration object
    pub async fn load(home: impl Into<PathBuf>) -> Result<Self> {
        let maybe_relative = home.into();
        let root = utils::canonicalize(&maybe_relative)
            .await
            .context("The home directory is missing")?;

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!(
                "The config file is missing '{}'. Run 'steam-history init' first",
                config_path.display()
            )
        }
        let config_file = ConfigFile::load(&config_path).await?;
        config_file.validate()?;

        let base_url = Url::parse(config_file.base_url())
            .with_context(|| format!("Invalid base_url '{}'", config_file.base_url()))?;

        let data_dir = resolve(&root, config_file.raw_data_directory());
        utils::make_dir(&data_dir).await?;
        let output_path = resolve(&root, config_file.output_file_name());

        Ok(Self {
            root,
            config_path,
            config_file,
            data_dir,
            output_path,
            base_url,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// The directory holding one JSON document per fetched page plus the sync state.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Where the exported table is written.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The session cookies attached to every request.
    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.config_file.cookies
    }

    pub fn page_size(&self) -> u64 {
        self.config_file.page_size.unwrap_or(PAGE_SIZE)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.config_file
                .request_timeout_secs
                .unwrap_or(REQUEST_TIMEOUT_SECS),
        )
    }

    /// The retry and pacing settings for the page fetcher.
    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            max_retries: self.config_file.max_retries.unwrap_or(MAX_RETRIES),
            initial_backoff: Duration::from_secs(
                self.config_file
                    .initial_backoff_seconds
                    .unwrap_or(INITIAL_BACKOFF_SECONDS),
            ),
            request_delay: Duration::from_millis(
                self.config_file.request_delay_ms.unwrap_or(REQUEST_DELAY_MS),
            ),
        }
    }
}

fn resolve(root: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        return p.to_path_buf();
    }
    root.join(p)
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "steam-history",
///   "config_version": 1,
///   "cookies": {
///     "sessionid": "0f1e2d3c4b5a69788796a5b4",
///     "steamLoginSecure": "76561190000000000%7C%7CeyAidHlwIjogIkpXVCIs"
///   },
///   "raw_data_directory": "data/raw_transactions",
///   "max_retries": 5,
///   "initial_backoff_seconds": 5,
///   "output_file_name": "steam_market_history.csv"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct ConfigFile {
    /// Application name, should always be "steam-history"
    app_name: String,

    /// Configuration file version
    config_version: u8,

    /// Cookies copied from a logged-in browser session. `sessionid` is required.
    #[serde(default)]
    cookies: BTreeMap<String, String>,

    /// Directory for raw page documents, relative to the home directory or absolute
    #[serde(skip_serializing_if = "Option::is_none")]
    raw_data_directory: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    max_retries: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    initial_backoff_seconds: Option<u64>,

    /// The exported table, relative to the home directory or absolute
    #[serde(skip_serializing_if = "Option::is_none")]
    output_file_name: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    page_size: Option<u64>,

    /// Pause before every request attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    request_delay_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    request_timeout_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    base_url: Option<String>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        let mut cookies = BTreeMap::new();
        cookies.insert(SESSION_ID.to_string(), String::new());
        cookies.insert(LOGIN_SECURE.to_string(), String::new());
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            cookies,
            raw_data_directory: Some(PathBuf::from(RAW_DATA_DIRECTORY)),
            max_retries: Some(MAX_RETRIES),
            initial_backoff_seconds: Some(INITIAL_BACKOFF_SECONDS),
            output_file_name: Some(PathBuf::from(OUTPUT_FILE_NAME)),
            page_size: None,
            request_delay_ms: None,
            request_timeout_secs: None,
            base_url: None,
        }
    }
}

impl ConfigFile {
    /// Loads a ConfigFile asynchronously from the specified path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;

        let config: ConfigFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))?;

        ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );

        Ok(config)
    }

    /// Saves the ConfigFile to the specified path.
    async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let p = path.as_ref();
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(p, data)
            .await
            .context("Unable to write config file")
    }

    /// Checks the values that cannot be defaulted.
    fn validate(&self) -> Result<()> {
        let session_id = self.cookies.get(SESSION_ID).map(|s| s.trim());
        ensure!(
            matches!(session_id, Some(s) if !s.is_empty()),
            "Please update the 'cookies' object in config.json with your actual Steam cookies \
            ('{SESSION_ID}' is required)"
        );
        ensure!(
            self.page_size.unwrap_or(PAGE_SIZE) > 0,
            "page_size must be greater than zero"
        );
        Ok(())
    }

    fn raw_data_directory(&self) -> &Path {
        self.raw_data_directory
            .as_deref()
            .unwrap_or(Path::new(RAW_DATA_DIRECTORY))
    }

    fn output_file_name(&self) -> &Path {
        self.output_file_name
            .as_deref()
            .unwrap_or(Path::new(OUTPUT_FILE_NAME))
    }

    fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(BASE_URL)
    }
}
