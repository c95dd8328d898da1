use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::catalog::Catalog;
use crate::config::{self, IdentityProviderKind};
use crate::gotrue::{self, RemoteIdentity};
use crate::identity::{IdentityProvider, LocalIdentity};
use crate::logging;
use crate::session;
use crate::state::AppState;
use crate::storage::{self, KeyValueStore, MemoryStore};
use crate::theme::Palette;
use crate::ui;

#[derive(Debug, Default, Clone)]
pub struct RunOptions {
    /// Overrides the default config file location.
    pub config_file: Option<PathBuf>,
    /// Keep everything in memory for this run.
    pub ephemeral: bool,
}

pub fn run(options: RunOptions) -> Result<()> {
    let log_path = logging::init().context("init logging")?;

    let cfg = config::load(config::LoadOptions {
        config_file: options.config_file.clone(),
        env_prefix: None,
    })
    .context("load config")?;
    let config_path = options.config_file.clone().or_else(config::default_path);
    let display_path = friendly_path(config_path.as_ref());
    info!(
        config = %display_path,
        theme = %cfg.ui.theme,
        ephemeral = options.ephemeral,
        "starting"
    );

    let store: Arc<dyn KeyValueStore> = if options.ephemeral {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(
            storage::Store::open(storage::Options {
                path: cfg.storage.path.clone(),
            })
            .context("open storage")?,
        )
    };

    let provider = build_identity(&cfg.identity, store.clone())?;
    let sessions = session::Manager::new(provider);
    let state = AppState::hydrate(Arc::new(Catalog::builtin()), store);

    let mut status = match cfg.identity.provider {
        IdentityProviderKind::Local => format!("Config: {display_path} · local accounts"),
        IdentityProviderKind::Remote => {
            format!("Config: {display_path} · accounts at {}", cfg.identity.url)
        }
    };
    if options.ephemeral {
        status.push_str(" · ephemeral session");
    }
    if let Some(path) = log_path {
        status.push_str(&format!(" · logging to {}", friendly_path(Some(&path))));
    }

    let mut model = ui::Model::new(ui::Options {
        state,
        sessions,
        thresholds: cfg.gestures.thresholds(),
        wheel_idle: cfg.gestures.wheel_idle,
        player_command: cfg.player.video_command.clone(),
        palette: Palette::from_theme(&cfg.ui.theme),
        status_message: status,
    });
    model.run()
}

fn build_identity(
    cfg: &config::IdentityConfig,
    store: Arc<dyn KeyValueStore>,
) -> Result<Arc<dyn IdentityProvider>> {
    match cfg.provider {
        IdentityProviderKind::Local => Ok(Arc::new(LocalIdentity::new(
            store,
            cfg.require_confirmation,
        ))),
        IdentityProviderKind::Remote => {
            let remote = RemoteIdentity::new(
                store,
                gotrue::Config {
                    url: cfg.url.clone(),
                    anon_key: cfg.anon_key.clone(),
                    timeout: cfg.timeout,
                },
            )
            .context("configure identity service")?;
            Ok(Arc::new(remote))
        }
    }
}

fn friendly_path(path: Option<&PathBuf>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/reel-tui/config.yaml".to_string()
    }
}
