use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

pub const LOG_FILE_ENV: &str = "REEL_TUI_LOG";
pub const LOG_LEVEL_ENV: &str = "REEL_TUI_LOG_LEVEL";

/// Installs a file-backed subscriber when `REEL_TUI_LOG` names a path. The
/// terminal belongs to the UI, so nothing is logged otherwise.
pub fn init() -> Result<Option<PathBuf>> {
    let Some(path) = std::env::var_os(LOG_FILE_ENV).map(PathBuf::from) else {
        return Ok(None);
    };
    if path.as_os_str().is_empty() {
        return Ok(None);
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("logging: open {}", path.display()))?;
    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .compact()
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|err| anyhow::anyhow!("logging: install subscriber: {err}"))?;

    Ok(Some(path))
}
