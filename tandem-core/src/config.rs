//! Bridge configuration.
//!
//! # Sources
//!
//! 1. `<home>/.tandem/config.yaml` (optional)
//! 2. Environment variables, which override the file:
//!    `ACCOUNT_ID`, `LOOKBACK_HOURS`, `EXCLUDED_QUEUES`, `CALL_TIMEOUT_SECS`,
//!    `POLL_INTERVAL_SECS`, `SYSTEM_A_USER`/`SYSTEM_A_SECRET`,
//!    `SYSTEM_B_USER`/`SYSTEM_B_SECRET`.
//!
//! # API pattern
//!
//! - `load_at(home)`: explicit home; reads the process environment.
//! - `load_with(home, lookup)`: explicit home and environment; used in tests.
//! - `load()`: derives home from `dirs::home_dir()`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{TicketNumber, TicketStatus};

pub const DEFAULT_LOOKBACK_HOURS: u32 = 48;
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
/// Ten years; keeps `since` well inside chrono's representable range.
pub const MAX_LOOKBACK_HOURS: u32 = 24 * 366 * 10;

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// One credential set per adapter. The secret never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Key filter
// ---------------------------------------------------------------------------

/// Normalization and filtering of A-side keys read back from B (`ext_A`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct KeyFilter {
    /// Keys must start with this prefix when set.
    pub required_prefix: Option<String>,
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    /// Placeholder keys that never refer to a real ticket.
    pub ignored_keys: Vec<String>,
    /// Boilerplate removed from the front of a key before matching.
    pub strip_prefixes: Vec<String>,
}

impl KeyFilter {
    /// Normalize `raw`; `None` when the key is rejected.
    pub fn normalize(&self, raw: &str) -> Option<TicketNumber> {
        let mut key: String = raw.chars().filter(|c| *c != '\u{200b}').collect();
        for prefix in &self.strip_prefixes {
            if let Some(rest) = key.strip_prefix(prefix.as_str()) {
                key = rest.to_owned();
            }
        }
        let key = key.trim();
        if key.is_empty() || self.ignored_keys.iter().any(|k| k == key) {
            return None;
        }
        if let Some(prefix) = &self.required_prefix {
            if !key.starts_with(prefix.as_str()) {
                return None;
            }
        }
        let len = key.chars().count();
        if self.min_len.is_some_and(|min| len < min) || self.max_len.is_some_and(|max| len > max)
        {
            return None;
        }
        Some(TicketNumber::from(key))
    }
}

// ---------------------------------------------------------------------------
// SyncConfig
// ---------------------------------------------------------------------------

fn default_lookback_hours() -> u32 {
    DEFAULT_LOOKBACK_HOURS
}

fn default_call_timeout_secs() -> u64 {
    DEFAULT_CALL_TIMEOUT_SECS
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_reengagement() -> Vec<TicketStatus> {
    vec![TicketStatus::CustomerNoteAdded, TicketStatus::InProgress]
}

fn default_excluded_attachments() -> Vec<String> {
    vec!["Oorspronkelijke aanvraag.pdf".to_owned()]
}

fn default_initial_action_prefix() -> String {
    "Initial action".to_owned()
}

fn default_title_limit() -> usize {
    254
}

fn default_body_limit() -> usize {
    7_900
}

fn default_title() -> String {
    "No brief description".to_owned()
}

fn default_body() -> String {
    "Default description".to_owned()
}

/// Everything one reconciliation cycle needs to know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// A-side account whose tickets are reconciled.
    #[serde(default)]
    pub account_id: String,
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u32,
    #[serde(default)]
    pub excluded_queues: Vec<i64>,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_a: Option<Credentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_b: Option<Credentials>,
    #[serde(default)]
    pub key_filter: KeyFilter,
    #[serde(default = "default_reengagement")]
    pub reengagement_statuses: Vec<TicketStatus>,
    #[serde(default = "default_excluded_attachments")]
    pub excluded_attachment_names: Vec<String>,
    #[serde(default = "default_initial_action_prefix")]
    pub initial_action_prefix: String,
    #[serde(default = "default_title_limit")]
    pub title_limit: usize,
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,
    #[serde(default = "default_title")]
    pub default_title: String,
    #[serde(default = "default_body")]
    pub default_body: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            account_id: String::new(),
            lookback_hours: default_lookback_hours(),
            excluded_queues: Vec::new(),
            call_timeout_secs: default_call_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            credentials_a: None,
            credentials_b: None,
            key_filter: KeyFilter::default(),
            reengagement_statuses: default_reengagement(),
            excluded_attachment_names: default_excluded_attachments(),
            initial_action_prefix: default_initial_action_prefix(),
            title_limit: default_title_limit(),
            body_limit: default_body_limit(),
            default_title: default_title(),
            default_body: default_body(),
        }
    }
}

impl SyncConfig {
    /// Defaults for a single account; convenient for embedding and tests.
    pub fn for_account(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            ..Self::default()
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Lower bound for `list_open` relative to `now`. Saturates at the
    /// earliest representable instant.
    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(chrono::Duration::hours(i64::from(self.lookback_hours)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn is_reengagement(&self, status: TicketStatus) -> bool {
        self.reengagement_statuses.contains(&status)
    }

    /// Apply environment overrides. `lookup` returns the value of a variable.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(account) = lookup("ACCOUNT_ID") {
            self.account_id = account.trim().to_owned();
        }
        if let Some(hours) = lookup("LOOKBACK_HOURS") {
            self.lookback_hours = parse_number("LOOKBACK_HOURS", &hours)?;
        }
        if let Some(queues) = lookup("EXCLUDED_QUEUES") {
            self.excluded_queues = queues
                .split(',')
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(|q| parse_number("EXCLUDED_QUEUES", q))
                .collect::<Result<_, _>>()?;
        }
        if let Some(secs) = lookup("CALL_TIMEOUT_SECS") {
            self.call_timeout_secs = parse_number("CALL_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = lookup("POLL_INTERVAL_SECS") {
            self.poll_interval_secs = parse_number("POLL_INTERVAL_SECS", &secs)?;
        }
        if let (Some(username), Some(secret)) = (lookup("SYSTEM_A_USER"), lookup("SYSTEM_A_SECRET"))
        {
            self.credentials_a = Some(Credentials { username, secret });
        }
        if let (Some(username), Some(secret)) = (lookup("SYSTEM_B_USER"), lookup("SYSTEM_B_SECRET"))
        {
            self.credentials_b = Some(Credentials { username, secret });
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.account_id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "ACCOUNT_ID",
                reason: "must be set".to_owned(),
            });
        }
        if self.lookback_hours > MAX_LOOKBACK_HOURS {
            return Err(ConfigError::Invalid {
                key: "LOOKBACK_HOURS",
                reason: format!(
                    "{} exceeds the maximum of {MAX_LOOKBACK_HOURS}",
                    self.lookback_hours
                ),
            });
        }
        if self.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "CALL_TIMEOUT_SECS",
                reason: "must be greater than zero".to_owned(),
            });
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "POLL_INTERVAL_SECS",
                reason: "must be greater than zero".to_owned(),
            });
        }
        if self.title_limit == 0 || self.body_limit == 0 {
            return Err(ConfigError::Invalid {
                key: "title_limit/body_limit",
                reason: "must be greater than zero".to_owned(),
            });
        }
        if let (Some(min), Some(max)) = (self.key_filter.min_len, self.key_filter.max_len) {
            if min > max {
                return Err(ConfigError::Invalid {
                    key: "key_filter",
                    reason: format!("min_len {min} exceeds max_len {max}"),
                });
            }
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
        key,
        reason: format!("'{raw}': {e}"),
    })
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// `<home>/.tandem/config.yaml`; pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(".tandem").join("config.yaml")
}

/// Load config from `home` with environment lookups supplied by `lookup`.
pub fn load_with<F>(home: &Path, lookup: F) -> Result<SyncConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let path = config_path_at(home);
    let mut config = if path.exists() {
        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        if contents.trim().is_empty() {
            SyncConfig::default()
        } else {
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })?
        }
    } else {
        SyncConfig::default()
    };
    config.apply_env(lookup)?;
    config.validate()?;
    Ok(config)
}

/// Load config from `home`, applying the process environment.
pub fn load_at(home: &Path) -> Result<SyncConfig, ConfigError> {
    load_with(home, |key| std::env::var(key).ok())
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<SyncConfig, ConfigError> {
    load_at(&home()?)
}

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
