use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use thiserror::Error;
use url::Url;

use crate::collector::HarvestOptions;
use crate::view::ChromiumViewConfig;

static DEFAULT_BASE_URL: LazyLock<Url> = LazyLock::new(|| Url::parse("https://x.com").unwrap());

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Harvester configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Target
    pub start_url: Option<Url>,
    pub base_url: Url,

    // Collection policy
    pub scroll_delay: Duration,
    pub stable_cycles: u32,
    pub stale_post_limit: u32,
    pub since: Option<DateTime<Utc>>,
    pub prompt_counts: bool,

    // Output
    pub output_dir: PathBuf,
    pub dump_dir: Option<PathBuf>,
    /// Also fold the export into the account's `<target>_data.json` archive.
    pub merge_archive: bool,

    // Offline replay instead of a browser
    pub replay_dir: Option<PathBuf>,

    // Browser
    pub chrome_path: Option<String>,
    pub chrome_profile: Option<PathBuf>,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub page_timeout: Duration,
    pub settle: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let start_url = optional_env("HARVEST_START_URL")
            .map(|value| parse_url("HARVEST_START_URL", &value))
            .transpose()?;
        let base_url = optional_env("HARVEST_BASE_URL")
            .map(|value| parse_url("HARVEST_BASE_URL", &value))
            .transpose()?
            .unwrap_or_else(|| DEFAULT_BASE_URL.clone());
        let since = optional_env("HARVEST_SINCE")
            .map(|value| parse_since(&value, Utc::now()))
            .transpose()?;

        Ok(Self {
            start_url,
            base_url,

            scroll_delay: Duration::from_millis(parse_env_u64("HARVEST_SCROLL_DELAY_MS", 3000)?),
            stable_cycles: parse_env_u32("HARVEST_STABLE_CYCLES", 3)?,
            stale_post_limit: parse_env_u32("HARVEST_STALE_POST_LIMIT", 5)?,
            since,
            prompt_counts: parse_env_bool("HARVEST_PROMPT_COUNTS", true)?,

            output_dir: PathBuf::from(env_or_default("HARVEST_OUTPUT_DIR", ".")),
            dump_dir: optional_env("HARVEST_DUMP_DIR").map(PathBuf::from),
            merge_archive: parse_env_bool("HARVEST_MERGE_ARCHIVE", false)?,

            replay_dir: optional_env("HARVEST_REPLAY_DIR").map(PathBuf::from),

            chrome_path: optional_env("CHROME_PATH"),
            chrome_profile: optional_env("HARVEST_CHROME_PROFILE").map(PathBuf::from),
            headless: parse_env_bool("HARVEST_HEADLESS", true)?,
            viewport_width: parse_env_u32("HARVEST_VIEWPORT_WIDTH", 1280)?,
            viewport_height: parse_env_u32("HARVEST_VIEWPORT_HEIGHT", 800)?,
            page_timeout: Duration::from_secs(parse_env_u64("HARVEST_PAGE_TIMEOUT_SECS", 30)?),
            settle: Duration::from_millis(parse_env_u64("HARVEST_SETTLE_MS", 2000)?),
        })
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is out of range or a browser run has no
    /// start page.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stable_cycles == 0 {
            return Err(ConfigError::InvalidValue {
                name: "HARVEST_STABLE_CYCLES".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.stale_post_limit == 0 {
            return Err(ConfigError::InvalidValue {
                name: "HARVEST_STALE_POST_LIMIT".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.replay_dir.is_none() && self.start_url.is_none() {
            return Err(ConfigError::MissingEnvVar("HARVEST_START_URL".to_string()));
        }
        if self.viewport_width == 0 || self.viewport_height == 0 {
            return Err(ConfigError::InvalidValue {
                name: "HARVEST_VIEWPORT_WIDTH/HEIGHT".to_string(),
                message: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    /// Collection policy for a run.
    #[must_use]
    pub fn harvest_options(&self) -> HarvestOptions {
        HarvestOptions {
            base_url: self.base_url.clone(),
            cutoff: self.since,
            stale_post_limit: self.stale_post_limit,
            stable_cycles: self.stable_cycles,
            scroll_delay: self.scroll_delay,
            prompt_counts: self.prompt_counts,
        }
    }

    /// Browser settings for a live run.
    ///
    /// # Errors
    ///
    /// Returns an error if no start page is configured.
    pub fn chromium_view_config(&self) -> Result<ChromiumViewConfig, ConfigError> {
        let start_url = self
            .start_url
            .clone()
            .ok_or_else(|| ConfigError::MissingEnvVar("HARVEST_START_URL".to_string()))?;
        Ok(ChromiumViewConfig {
            viewport_width: self.viewport_width,
            viewport_height: self.viewport_height,
            page_timeout: self.page_timeout,
            settle: self.settle,
            chrome_path: self.chrome_path.clone(),
            user_data_dir: self.chrome_profile.clone(),
            headless: self.headless,
            dump_dir: self.dump_dir.clone(),
            ..ChromiumViewConfig::new(start_url)
        })
    }

    /// Configuration for tests: no delays, no prompts, no browser.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            start_url: Url::parse("https://x.com/someone").ok(),
            base_url: DEFAULT_BASE_URL.clone(),
            scroll_delay: Duration::ZERO,
            stable_cycles: 3,
            stale_post_limit: 5,
            since: None,
            prompt_counts: false,
            output_dir: PathBuf::from("."),
            dump_dir: None,
            merge_archive: false,
            replay_dir: None,
            chrome_path: None,
            chrome_profile: None,
            headless: true,
            viewport_width: 1280,
            viewport_height: 800,
            page_timeout: Duration::from_secs(30),
            settle: Duration::ZERO,
        }
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}

fn parse_url(name: &str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::InvalidValue {
        name: name.to_string(),
        message: format!("'{value}' is not a URL: {e}"),
    })
}

/// Parse a cutoff: an RFC 3339 instant, a `YYYY-MM-DD` date (midnight UTC),
/// or `<N>d` for N days before `now`.
fn parse_since(value: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, ConfigError> {
    let value = value.trim();
    let invalid = |message: String| ConfigError::InvalidValue {
        name: "HARVEST_SINCE".to_string(),
        message,
    };

    if let Some(days) = value.strip_suffix(['d', 'D']) {
        let days: i64 = days
            .parse()
            .map_err(|_| invalid(format!("'{value}' is not a day count")))?;
        return TimeDelta::try_days(days)
            .and_then(|delta| now.checked_sub_signed(delta))
            .ok_or_else(|| invalid(format!("'{value}' is out of range")));
    }
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
        .ok_or_else(|| {
            invalid(format!(
                "'{value}' must be an RFC 3339 instant, YYYY-MM-DD, or <N>d"
            ))
        })
}
