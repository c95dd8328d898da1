use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::nav::Thresholds;
use crate::theme;

const DEFAULT_ENV_PREFIX: &str = "REEL_TUI";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub gestures: GestureConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ui: UIConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IdentityProviderKind {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentityConfig {
    #[serde(default)]
    pub provider: IdentityProviderKind,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub anon_key: String,
    #[serde(default)]
    pub require_confirmation: bool,
    #[serde(default = "default_identity_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            provider: IdentityProviderKind::default(),
            url: String::new(),
            anon_key: String::new(),
            require_confirmation: false,
            timeout: default_identity_timeout(),
        }
    }
}

fn default_identity_timeout() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GestureConfig {
    #[serde(default = "default_wheel_threshold")]
    pub wheel_threshold: i32,
    #[serde(default = "default_swipe_vertical")]
    pub swipe_vertical: i32,
    #[serde(default = "default_swipe_horizontal")]
    pub swipe_horizontal: i32,
    #[serde(default = "default_wheel_idle", with = "humantime_serde")]
    pub wheel_idle: Duration,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            wheel_threshold: default_wheel_threshold(),
            swipe_vertical: default_swipe_vertical(),
            swipe_horizontal: default_swipe_horizontal(),
            wheel_idle: default_wheel_idle(),
        }
    }
}

impl GestureConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            wheel: self.wheel_threshold,
            swipe_vertical: self.swipe_vertical,
            swipe_horizontal: self.swipe_horizontal,
        }
    }
}

fn default_wheel_threshold() -> i32 {
    Thresholds::default().wheel
}

fn default_swipe_vertical() -> i32 {
    Thresholds::default().swipe_vertical
}

fn default_swipe_horizontal() -> i32 {
    Thresholds::default().swipe_horizontal
}

fn default_wheel_idle() -> Duration {
    Duration::from_millis(400)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfig {
    #[serde(default = "default_video_command")]
    pub video_command: Vec<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            video_command: default_video_command(),
        }
    }
}

fn default_video_command() -> Vec<String> {
    vec!["mpv".into(), "%URL%".into()]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UIConfig {
    #[serde(default = "default_theme")]
    pub theme: String,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            theme: default_theme(),
        }
    }
}

fn default_theme() -> String {
    theme::DEFAULT_THEME.into()
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    cfg = apply_env(cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    base.identity.provider = other.identity.provider;
    if !other.identity.url.is_empty() {
        base.identity.url = other.identity.url;
    }
    if !other.identity.anon_key.is_empty() {
        base.identity.anon_key = other.identity.anon_key;
    }
    base.identity.require_confirmation = other.identity.require_confirmation;
    if !other.identity.timeout.is_zero() {
        base.identity.timeout = other.identity.timeout;
    }

    if other.gestures.wheel_threshold >= 0 {
        base.gestures.wheel_threshold = other.gestures.wheel_threshold;
    }
    if other.gestures.swipe_vertical >= 0 {
        base.gestures.swipe_vertical = other.gestures.swipe_vertical;
    }
    if other.gestures.swipe_horizontal >= 0 {
        base.gestures.swipe_horizontal = other.gestures.swipe_horizontal;
    }
    if !other.gestures.wheel_idle.is_zero() {
        base.gestures.wheel_idle = other.gestures.wheel_idle;
    }

    base.player.video_command = other.player.video_command;

    if other.storage.path.is_some() {
        base.storage.path = other.storage.path;
    }

    if !other.ui.theme.is_empty() {
        base.ui.theme = other.ui.theme;
    }

    base
}

/// Environment overrides are applied on top of whatever the file produced;
/// unset variables leave the current value alone.
fn apply_env(mut cfg: Config, prefix: &str) -> Config {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(&mut cfg, &key, value);
    }

    cfg
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "identity.provider" => match value.trim().to_ascii_lowercase().as_str() {
            "local" => cfg.identity.provider = IdentityProviderKind::Local,
            "remote" => cfg.identity.provider = IdentityProviderKind::Remote,
            _ => {}
        },
        "identity.url" => cfg.identity.url = value,
        "identity.anon_key" => cfg.identity.anon_key = value,
        "identity.require_confirmation" => {
            cfg.identity.require_confirmation = env_bool(&value);
        }
        "identity.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.identity.timeout = duration;
            }
        }
        "gestures.wheel_threshold" => {
            if let Ok(parsed) = value.parse::<i32>() {
                cfg.gestures.wheel_threshold = parsed;
            }
        }
        "gestures.swipe_vertical" => {
            if let Ok(parsed) = value.parse::<i32>() {
                cfg.gestures.swipe_vertical = parsed;
            }
        }
        "gestures.swipe_horizontal" => {
            if let Ok(parsed) = value.parse::<i32>() {
                cfg.gestures.swipe_horizontal = parsed;
            }
        }
        "gestures.wheel_idle" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.gestures.wheel_idle = duration;
            }
        }
        "player.video_command" => {
            cfg.player.video_command = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        "storage.path" => cfg.storage.path = Some(PathBuf::from(value)),
        "ui.theme" => cfg.ui.theme = value,
        _ => {}
    }
}

fn env_bool(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "TRUE" | "True" | "yes")
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("reel-tui").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    #[test]
    fn load_defaults_without_files() {
        let dir = tempdir().unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(dir.path().join("missing.yaml")),
            env_prefix: Some("REEL_TUI_TEST_DEFAULTS".into()),
        })
        .unwrap();
        assert_eq!(cfg.ui.theme, "default");
        assert_eq!(cfg.identity.provider, IdentityProviderKind::Local);
        assert_eq!(cfg.gestures.thresholds(), Thresholds::default());
        assert_eq!(cfg.player.video_command, default_video_command());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            r#"
identity:
  provider: remote
  url: https://auth.example.com
  anon_key: public-key
gestures:
  swipe_horizontal: 10
  wheel_idle: 1s
player:
  video_command: []
"#,
        )
        .unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("REEL_TUI_TEST_FILE".into()),
        })
        .unwrap();
        assert_eq!(cfg.identity.provider, IdentityProviderKind::Remote);
        assert_eq!(cfg.identity.url, "https://auth.example.com");
        assert_eq!(cfg.identity.timeout, Duration::from_secs(20));
        assert_eq!(cfg.gestures.swipe_horizontal, 10);
        assert_eq!(cfg.gestures.swipe_vertical, 3);
        assert_eq!(cfg.gestures.wheel_idle, Duration::from_secs(1));
        assert!(cfg.player.video_command.is_empty());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "identity: [not, a, map]").unwrap();
        let result = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("REEL_TUI_TEST_BAD".into()),
        });
        assert!(result.is_err());
    }

    #[test]
    fn env_overrides() {
        env::set_var("REEL_TUI_TEST_ENV_UI__THEME", "dracula");
        env::set_var("REEL_TUI_TEST_ENV_GESTURES__WHEEL_THRESHOLD", "5");
        env::set_var("REEL_TUI_TEST_ENV_IDENTITY__REQUIRE_CONFIRMATION", "true");
        let dir = tempdir().unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(dir.path().join("missing.yaml")),
            env_prefix: Some("REEL_TUI_TEST_ENV".into()),
        })
        .unwrap();
        assert_eq!(cfg.ui.theme, "dracula");
        assert_eq!(cfg.gestures.wheel_threshold, 5);
        assert!(cfg.identity.require_confirmation);
        env::remove_var("REEL_TUI_TEST_ENV_UI__THEME");
        env::remove_var("REEL_TUI_TEST_ENV_GESTURES__WHEEL_THRESHOLD");
        env::remove_var("REEL_TUI_TEST_ENV_IDENTITY__REQUIRE_CONFIRMATION");
    }
}
