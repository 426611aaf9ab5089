//! Typed settings with layered precedence (defaults → files → environment).

use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{BlogError, Result};

const LOCAL_CONFIG_BASENAME: &str = "blog_em";
const APP_DIR_NAME: &str = "blog_em";
const DEFAULT_BASE_URL: &str = "https://jsonplaceholder.typicode.com";
const DEFAULT_POSTS_STALE_MS: u64 = 2_000;
const DEFAULT_COMMENTS_STALE_MS: u64 = 1_000;
const DEFAULT_GC_SECS: u64 = 300;
const DEFAULT_RETRY: u32 = 3;
const DEFAULT_RETRY_BASE_MS: u64 = 1_000;
const DEFAULT_RETRY_MAX_MS: u64 = 30_000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LOG_LEVEL: &str = "info";

/// What happens to the selected post when the page index changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    #[default]
    Keep,
    ClearOnPageChange,
}

/// Retry schedule for failed queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub const NONE: RetryPolicy = RetryPolicy {
        retries: 0,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
    };

    /// Delay before retry number `attempt` (0-based), doubling each time.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRY,
            base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_MS),
            max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub base_url: String,
    pub posts_stale_time: Duration,
    pub comments_stale_time: Duration,
    pub gc_time: Duration,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub selection_policy: SelectionPolicy,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            posts_stale_time: Duration::from_millis(DEFAULT_POSTS_STALE_MS),
            comments_stale_time: Duration::from_millis(DEFAULT_COMMENTS_STALE_MS),
            gc_time: Duration::from_secs(DEFAULT_GC_SECS),
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            selection_policy: SelectionPolicy::Keep,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RawSettings {
    base_url: String,
    posts_stale_ms: u64,
    comments_stale_ms: u64,
    gc_secs: u64,
    retry: u32,
    retry_base_ms: u64,
    retry_max_ms: u64,
    request_timeout_secs: u64,
    selection_policy: SelectionPolicy,
    log_level: String,
}

impl Default for RawSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            posts_stale_ms: DEFAULT_POSTS_STALE_MS,
            comments_stale_ms: DEFAULT_COMMENTS_STALE_MS,
            gc_secs: DEFAULT_GC_SECS,
            retry: DEFAULT_RETRY,
            retry_base_ms: DEFAULT_RETRY_BASE_MS,
            retry_max_ms: DEFAULT_RETRY_MAX_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            selection_policy: SelectionPolicy::Keep,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Settings {
    /// Load settings from `blog_em.toml`, the per-user config file and
    /// `BLOG_EM__*` environment variables, in that order of precedence.
    pub fn load() -> Result<Self> {
        let mut builder =
            Config::builder().add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

        if let Some(path) = user_config_path() {
            builder = builder.add_source(File::from(path.as_path()).required(false));
        }

        builder = builder.add_source(Environment::with_prefix("BLOG_EM").separator("__"));

        let raw: RawSettings = builder.build()?.try_deserialize()?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSettings) -> Result<Self> {
        let base_url = raw.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(BlogError::Config("base_url must not be empty".to_string()));
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(BlogError::Config(format!(
                "base_url must be an http(s) URL, got {base_url}"
            )));
        }
        if raw.retry_base_ms > raw.retry_max_ms {
            return Err(BlogError::Config(
                "retry_base_ms must not exceed retry_max_ms".to_string(),
            ));
        }

        Ok(Self {
            base_url,
            posts_stale_time: Duration::from_millis(raw.posts_stale_ms),
            comments_stale_time: Duration::from_millis(raw.comments_stale_ms),
            gc_time: Duration::from_secs(raw.gc_secs),
            retry: RetryPolicy {
                retries: raw.retry,
                base_delay: Duration::from_millis(raw.retry_base_ms),
                max_delay: Duration::from_millis(raw.retry_max_ms),
            },
            request_timeout: Duration::from_secs(raw.request_timeout_secs),
            selection_policy: raw.selection_policy,
            log_level: raw.log_level,
        })
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|dir| dir.join(APP_DIR_NAME).join("config.toml"))
}
