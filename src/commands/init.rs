use crate::commands::Out;
use crate::{Config, Result};
use anyhow::Context;
use std::path::{Path, PathBuf};

/// Creates the home directory, the raw data directory and a template `config.json`.
///
/// # Arguments
/// - `home` - The directory that will be the root of the data directory, e.g.
///   `$HOME/steam-history`
///
/// # Errors
/// - Returns an error if a config file already exists or if any file operation fails.
pub async fn init(home: &Path) -> Result<Out<PathBuf>> {
    let config_path = Config::create(home)
        .await
        .context("Unable to create the data directory and configs")?;
    Ok(Out::new(
        format!(
            "Created '{}'. Fill in your Steam cookies before downloading",
            config_path.display()
        ),
        config_path,
    ))
}
