use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use crate::feed::{FeedOptions, DEFAULT_SEEK_STEP};
use crate::model::FeedType;
use crate::navigation::{NavigationConfig, DEFAULT_COOLDOWN, DEFAULT_WHEEL_THRESHOLD};
use crate::pager::DEFAULT_PREFETCH_DISTANCE;

const DEFAULT_ENV_PREFIX: &str = "SHORTFEED";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub navigation: NavigationSection,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

impl Config {
    pub fn feed_options(&self) -> FeedOptions {
        FeedOptions {
            navigation: NavigationConfig {
                wheel_threshold: self.navigation.wheel_threshold,
                cooldown: self.navigation.cooldown,
            },
            prefetch_distance: self.feed.prefetch_distance,
            autoplay: self.playback.autoplay,
            muted: self.playback.muted,
            seek_step: self.playback.seek_step,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: String::new(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    format!("shortfeed/{}", crate::VERSION)
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default)]
    pub default_type: FeedType,
    #[serde(default = "default_prefetch_distance")]
    pub prefetch_distance: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            default_type: FeedType::default(),
            prefetch_distance: default_prefetch_distance(),
        }
    }
}

fn default_prefetch_distance() -> usize {
    DEFAULT_PREFETCH_DISTANCE
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NavigationSection {
    #[serde(default = "default_wheel_threshold")]
    pub wheel_threshold: f64,
    #[serde(default = "default_cooldown", with = "humantime_serde")]
    pub cooldown: Duration,
}

impl Default for NavigationSection {
    fn default() -> Self {
        Self {
            wheel_threshold: default_wheel_threshold(),
            cooldown: default_cooldown(),
        }
    }
}

fn default_wheel_threshold() -> f64 {
    DEFAULT_WHEEL_THRESHOLD
}

fn default_cooldown() -> Duration {
    DEFAULT_COOLDOWN
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackConfig {
    #[serde(default = "default_autoplay")]
    pub autoplay: bool,
    #[serde(default)]
    pub muted: bool,
    #[serde(default = "default_mpv_path")]
    pub mpv_path: String,
    #[serde(default = "default_seek_step", with = "humantime_serde")]
    pub seek_step: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            autoplay: default_autoplay(),
            muted: false,
            mpv_path: default_mpv_path(),
            seek_step: default_seek_step(),
        }
    }
}

fn default_autoplay() -> bool {
    true
}

fn default_mpv_path() -> String {
    "mpv".into()
}

fn default_seek_step() -> Duration {
    DEFAULT_SEEK_STEP
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
    cfg = merge_config(cfg, load_env(prefix)?);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

/// Overlays every field of `other` that differs from the built-in default.
fn merge_config(mut base: Config, other: Config) -> Config {
    let defaults = Config::default();

    if !other.api.base_url.is_empty() && other.api.base_url != defaults.api.base_url {
        base.api.base_url = other.api.base_url;
    }
    if !other.api.token.is_empty() {
        base.api.token = other.api.token;
    }
    if !other.api.user_agent.is_empty() && other.api.user_agent != defaults.api.user_agent {
        base.api.user_agent = other.api.user_agent;
    }
    if other.api.timeout != defaults.api.timeout && !other.api.timeout.is_zero() {
        base.api.timeout = other.api.timeout;
    }

    if other.feed.default_type != defaults.feed.default_type {
        base.feed.default_type = other.feed.default_type;
    }
    if other.feed.prefetch_distance != defaults.feed.prefetch_distance {
        base.feed.prefetch_distance = other.feed.prefetch_distance;
    }

    if other.navigation.wheel_threshold != defaults.navigation.wheel_threshold {
        base.navigation.wheel_threshold = other.navigation.wheel_threshold;
    }
    if other.navigation.cooldown != defaults.navigation.cooldown {
        base.navigation.cooldown = other.navigation.cooldown;
    }

    if other.playback.autoplay != defaults.playback.autoplay {
        base.playback.autoplay = other.playback.autoplay;
    }
    if other.playback.muted != defaults.playback.muted {
        base.playback.muted = other.playback.muted;
    }
    if !other.playback.mpv_path.is_empty() && other.playback.mpv_path != defaults.playback.mpv_path
    {
        base.playback.mpv_path = other.playback.mpv_path;
    }
    if other.playback.seek_step != defaults.playback.seek_step {
        base.playback.seek_step = other.playback.seek_step;
    }

    base
}

fn load_env(prefix: &str) -> Result<Config> {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    if map.is_empty() {
        return Ok(Config::default());
    }

    let mut cfg = Config::default();

    for (key, value) in map {
        apply_env_value(&mut cfg, &key, value);
    }

    Ok(cfg)
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "api.base_url" => cfg.api.base_url = value,
        "api.token" => cfg.api.token = value,
        "api.user_agent" => cfg.api.user_agent = value,
        "api.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.api.timeout = duration;
            }
        }
        "feed.default_type" => {
            if let Ok(kind) = value.parse::<FeedType>() {
                cfg.feed.default_type = kind;
            }
        }
        "feed.prefetch_distance" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.feed.prefetch_distance = parsed;
            }
        }
        "navigation.wheel_threshold" => {
            if let Ok(parsed) = value.parse::<f64>() {
                cfg.navigation.wheel_threshold = parsed;
            }
        }
        "navigation.cooldown" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.navigation.cooldown = duration;
            }
        }
        "playback.autoplay" => cfg.playback.autoplay = parse_bool(&value),
        "playback.muted" => cfg.playback.muted = parse_bool(&value),
        "playback.mpv_path" => cfg.playback.mpv_path = value,
        "playback.seek_step" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.playback.seek_step = duration;
            }
        }
        _ => {}
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("shortfeed").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    fn isolated(path: PathBuf, prefix: &str) -> LoadOptions {
        LoadOptions {
            config_file: Some(path),
            env_prefix: Some(prefix.to_string()),
        }
    }

    #[test]
    fn load_defaults_without_files() {
        let dir = tempdir().unwrap();
        let cfg = load(isolated(dir.path().join("missing.yaml"), "SHORTFEED_T1")).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.api.timeout, Duration::from_secs(10));
        assert_eq!(cfg.navigation.cooldown, Duration::from_millis(100));
        assert!(cfg.playback.autoplay);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "api:\n  token: abc\n  timeout: 3s\nfeed:\n  default_type: following\nplayback:\n  autoplay: false\n  seek_step: 10s\n",
        )
        .unwrap();
        let cfg = load(isolated(path, "SHORTFEED_T2")).unwrap();
        assert_eq!(cfg.api.token, "abc");
        assert_eq!(cfg.api.timeout, Duration::from_secs(3));
        assert_eq!(cfg.feed.default_type, FeedType::Following);
        assert!(!cfg.playback.autoplay);
        assert_eq!(cfg.feed_options().seek_step, Duration::from_secs(10));
        assert_eq!(cfg.api.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn invalid_yaml_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "api: [not, a, map").unwrap();
        let err = load(isolated(path, "SHORTFEED_T3")).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn env_overrides() {
        let dir = tempdir().unwrap();
        env::set_var("SHORTFEED_T4_NAVIGATION__COOLDOWN", "250ms");
        env::set_var("SHORTFEED_T4_PLAYBACK__MUTED", "true");
        let cfg = load(isolated(dir.path().join("none.yaml"), "SHORTFEED_T4")).unwrap();
        assert_eq!(cfg.navigation.cooldown, Duration::from_millis(250));
        assert!(cfg.playback.muted);
        env::remove_var("SHORTFEED_T4_NAVIGATION__COOLDOWN");
        env::remove_var("SHORTFEED_T4_PLAYBACK__MUTED");
    }
}
