//! Reconciler Configuration Settings
//!
//! Configuration types for the reconciler, loaded from environment
//! variables. Optional values that fail to parse fall back to their
//! defaults; missing required values and invalid zones or dates are errors.

use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;
use chrono_tz::Tz;

use crate::application::services::{ControllerSettings, DEFAULT_FALLBACK_INTERVAL, Selection};
use crate::domain::order::WorkspaceId;
use crate::domain::window::{DateWindow, ListWindow, PeriodSelection};
use crate::infrastructure::push::{PushSettings, ReconnectConfig};
use crate::infrastructure::rest::RestSettings;

/// Default workspace time zone.
pub const DEFAULT_TIME_ZONE: Tz = chrono_tz::America::Sao_Paulo;

/// Server port settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health and read endpoints port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete reconciler configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilerConfig {
    /// Workspace to follow.
    pub workspace_id: WorkspaceId,
    /// Push source settings.
    pub push: PushSettings,
    /// REST query boundary settings.
    pub rest: RestSettings,
    /// Workspace time zone.
    pub time_zone: Tz,
    /// Reporting period.
    pub period: PeriodSelection,
    /// Recent-activity list window.
    pub list_window: ListWindow,
    /// Page size and capacity of the recent-orders list.
    pub list_limit: usize,
    /// Whether the orders query includes cancelled orders.
    pub include_cancelled: bool,
    /// Fallback polling interval.
    pub fallback_interval: Duration,
    /// Processed key cap (0 = unbounded).
    pub processed_keys_cap: usize,
    /// Server ports.
    pub server: ServerSettings,
}

impl ReconcilerConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or empty, or if
    /// the time zone or a date cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let workspace_id = WorkspaceId::new(env.required("RECONCILER_WORKSPACE_ID")?);
        let push_url = env.required("RECONCILER_PUSH_URL")?;
        let api_base_url = env.required("RECONCILER_API_BASE_URL")?;

        let time_zone = match env.get("RECONCILER_TIME_ZONE") {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| ConfigError::InvalidTimeZone(name))?,
            None => DEFAULT_TIME_ZONE,
        };

        let period = match (
            env.date("RECONCILER_PERIOD_FROM")?,
            env.date("RECONCILER_PERIOD_TO")?,
        ) {
            (Some(from), Some(to)) => PeriodSelection::Custom(DateWindow::new(from, to)),
            (Some(_), None) => {
                return Err(ConfigError::MissingEnvVar("RECONCILER_PERIOD_TO".into()));
            }
            (None, Some(_)) => {
                return Err(ConfigError::MissingEnvVar("RECONCILER_PERIOD_FROM".into()));
            }
            (None, None) => PeriodSelection::LastDays(env.parse_or("RECONCILER_PERIOD_DAYS", 30)),
        };

        let list_window = env
            .date("RECONCILER_LIST_DATE")?
            .map_or(ListWindow::Today, ListWindow::Day);

        let reconnect_defaults = ReconnectConfig::default();
        let reconnect = ReconnectConfig {
            initial_delay: Duration::from_millis(env.parse_or(
                "RECONCILER_RECONNECT_DELAY_INITIAL_MS",
                u64::try_from(reconnect_defaults.initial_delay.as_millis()).unwrap_or(1_000),
            )),
            max_delay: Duration::from_secs(env.parse_or(
                "RECONCILER_RECONNECT_DELAY_MAX_SECS",
                reconnect_defaults.max_delay.as_secs(),
            )),
            multiplier: env.parse_or(
                "RECONCILER_RECONNECT_DELAY_MULTIPLIER",
                reconnect_defaults.multiplier,
            ),
            jitter_factor: reconnect_defaults.jitter_factor,
            max_attempts: env.parse_or(
                "RECONCILER_MAX_RECONNECT_ATTEMPTS",
                reconnect_defaults.max_attempts,
            ),
        };

        Ok(Self {
            workspace_id,
            push: PushSettings {
                url: push_url,
                reconnect,
            },
            rest: RestSettings {
                base_url: api_base_url,
                timeout: Duration::from_secs(env.parse_or("RECONCILER_HTTP_TIMEOUT_SECS", 15)),
            },
            time_zone,
            period,
            list_window,
            list_limit: env.parse_or("RECONCILER_LIST_LIMIT", 50_usize).max(1),
            include_cancelled: env.parse_or("RECONCILER_INCLUDE_CANCELLED", false),
            fallback_interval: Duration::from_secs(
                env.parse_or(
                    "RECONCILER_FALLBACK_INTERVAL_SECS",
                    DEFAULT_FALLBACK_INTERVAL.as_secs(),
                )
                .max(1),
            ),
            processed_keys_cap: env.parse_or("RECONCILER_PROCESSED_KEYS_CAP", 0),
            server: ServerSettings {
                health_port: env
                    .parse_or("RECONCILER_HEALTH_PORT", ServerSettings::default().health_port),
            },
        })
    }

    /// Initial selection derived from the configured windows.
    #[must_use]
    pub fn selection(&self) -> Selection {
        Selection {
            workspace_id: self.workspace_id.clone(),
            list_window: self.list_window,
            period: self.period,
        }
    }

    /// Controller settings derived from this configuration.
    #[must_use]
    pub const fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            list_limit: self.list_limit,
            fallback_interval: self.fallback_interval,
            processed_keys_cap: self.processed_keys_cap,
            time_zone: self.time_zone,
            include_cancelled: self.include_cancelled,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Time zone name is not a known IANA zone.
    #[error("unknown time zone: {0}")]
    InvalidTimeZone(String),
    /// Date is not `YYYY-MM-DD`.
    #[error("environment variable {key} is not a YYYY-MM-DD date: {value}")]
    InvalidDate {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        match (self.0)(key) {
            None => Err(ConfigError::MissingEnvVar(key.to_string())),
            Some(value) if value.trim().is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
            Some(value) => Ok(value.trim().to_string()),
        }
    }

    fn parse_or<T: FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|value| value.parse().ok())
            .unwrap_or(default)
    }

    fn date(&self, key: &str) -> Result<Option<NaiveDate>, ConfigError> {
        self.get(key)
            .map(|value| {
                NaiveDate::parse_from_str(&value, "%Y-%m-%d").map_err(|_| ConfigError::InvalidDate {
                    key: key.to_string(),
                    value,
                })
            })
            .transpose()
    }
}
