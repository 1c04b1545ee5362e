// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read once from the environment at startup; nothing is
//! hot-reloaded.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8765` |
//! | `ADMIN_SECRET` | Shared admin secret for the gate and admin routes | unset |
//! | `PROTECTION_DISABLED` | Accept every mutation without checks | `false` |
//! | `PROTECTED_NAMESPACES` | Comma-separated ordered soul prefixes | built-in list |
//! | `GATE_BATCH_POLICY` | `first` or `each` | `first` |
//! | `GC_ENABLED` | Run the retention sweeper | `true` |
//! | `GC_INTERVAL_MS` | Sweep interval | `3600000` |
//! | `GC_INITIAL_DELAY_MS` | Delay before the first sweep | `30000` |
//! | `GC_MAX_AGE_MS` | Only reclaim nodes older than this | unset (purge mode) |
//! | `LEDGER_WRITE_MODE` | `last-writer-wins` or `serialized` | `last-writer-wins` |
//! | `STORE_READ_TIMEOUT_MS` | Bounded wait for ledger/index reads | `5000` |
//! | `RECONCILE_ENABLED` | Run the periodic reconciliation pass | `true` |
//! | `RECONCILE_INTERVAL_MS` | Reconciliation interval | `21600000` |
//! | `DEFAULT_QUOTA_MB` | Quota used when a check names none | unset |
//! | `API_KEYS_ENABLED` | Accept API keys on admin routes | `true` |
//! | `GRAPH_DB_PATH` | redb file for a persistent graph | unset (in-memory) |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::gate::namespace::DEFAULT_PROTECTED_NAMESPACES;
use crate::gate::BatchPolicy;
use crate::ledger::LedgerWriteMode;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const ADMIN_SECRET_ENV: &str = "ADMIN_SECRET";
pub const PROTECTION_DISABLED_ENV: &str = "PROTECTION_DISABLED";
pub const PROTECTED_NAMESPACES_ENV: &str = "PROTECTED_NAMESPACES";
pub const GATE_BATCH_POLICY_ENV: &str = "GATE_BATCH_POLICY";
pub const GC_ENABLED_ENV: &str = "GC_ENABLED";
pub const GC_INTERVAL_MS_ENV: &str = "GC_INTERVAL_MS";
pub const GC_INITIAL_DELAY_MS_ENV: &str = "GC_INITIAL_DELAY_MS";
pub const GC_MAX_AGE_MS_ENV: &str = "GC_MAX_AGE_MS";
pub const LEDGER_WRITE_MODE_ENV: &str = "LEDGER_WRITE_MODE";
pub const STORE_READ_TIMEOUT_MS_ENV: &str = "STORE_READ_TIMEOUT_MS";
pub const RECONCILE_ENABLED_ENV: &str = "RECONCILE_ENABLED";
pub const RECONCILE_INTERVAL_MS_ENV: &str = "RECONCILE_INTERVAL_MS";
pub const DEFAULT_QUOTA_MB_ENV: &str = "DEFAULT_QUOTA_MB";
pub const API_KEYS_ENABLED_ENV: &str = "API_KEYS_ENABLED";
pub const GRAPH_DB_PATH_ENV: &str = "GRAPH_DB_PATH";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8765;
const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(60 * 60);
const DEFAULT_GC_INITIAL_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{var}: expected a boolean, got '{value}'")]
    InvalidBool { var: &'static str, value: String },

    #[error("{var}: expected a positive integer, got '{value}'")]
    InvalidPositive { var: &'static str, value: String },

    #[error("{var}: expected a non-negative number, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var}: {message}")]
    Invalid { var: &'static str, message: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// What a sweep is allowed to reclaim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Every unprotected node is removed on every sweep.
    PurgeUnprotected,
    /// Only unprotected nodes whose `createdAt` is older than the age.
    MaxAge(Duration),
}

/// Retention sweeper configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcPolicy {
    pub enabled: bool,
    pub interval: Duration,
    pub initial_delay: Duration,
    pub retention: Retention,
}

impl Default for GcPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: DEFAULT_GC_INTERVAL,
            initial_delay: DEFAULT_GC_INITIAL_DELAY,
            retention: Retention::PurgeUnprotected,
        }
    }
}

/// Reconciliation job configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilePolicy {
    pub enabled: bool,
    pub interval: Duration,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: DEFAULT_RECONCILE_INTERVAL,
        }
    }
}

/// Logging output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Process-wide configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind_addr: SocketAddr,
    pub admin_secret: Option<String>,
    pub protection_disabled: bool,
    pub protected_namespaces: Vec<String>,
    pub batch_policy: BatchPolicy,
    pub gc: GcPolicy,
    pub ledger_write_mode: LedgerWriteMode,
    pub read_timeout: Duration,
    pub reconcile: ReconcilePolicy,
    pub default_quota_mb: Option<f64>,
    pub api_keys_enabled: bool,
    pub graph_db_path: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            admin_secret: None,
            protection_disabled: false,
            protected_namespaces: DEFAULT_PROTECTED_NAMESPACES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            batch_policy: BatchPolicy::default(),
            gc: GcPolicy::default(),
            ledger_write_mode: LedgerWriteMode::default(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            reconcile: ReconcilePolicy::default(),
            default_quota_mb: None,
            api_keys_enabled: true,
            graph_db_path: None,
            log_format: LogFormat::default(),
        }
    }
}

impl RelayConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary lookup (used by tests).
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let host = get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match get(PORT_ENV) {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidPositive {
                var: PORT_ENV,
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };
        let bind_addr: SocketAddr =
            format!("{host}:{port}")
                .parse()
                .map_err(|e| ConfigError::Invalid {
                    var: HOST_ENV,
                    message: format!("cannot parse bind address '{host}:{port}': {e}"),
                })?;

        let protected_namespaces = match get(PROTECTED_NAMESPACES_ENV) {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect(),
            None => defaults.protected_namespaces,
        };

        let batch_policy = match get(GATE_BATCH_POLICY_ENV) {
            Some(raw) => raw.parse().map_err(|message| ConfigError::Invalid {
                var: GATE_BATCH_POLICY_ENV,
                message,
            })?,
            None => BatchPolicy::default(),
        };

        let ledger_write_mode = match get(LEDGER_WRITE_MODE_ENV) {
            Some(raw) => raw.parse().map_err(|message| ConfigError::Invalid {
                var: LEDGER_WRITE_MODE_ENV,
                message,
            })?,
            None => LedgerWriteMode::default(),
        };

        let retention = match get(GC_MAX_AGE_MS_ENV) {
            Some(raw) => Retention::MaxAge(parse_millis(GC_MAX_AGE_MS_ENV, raw)?),
            None => Retention::PurgeUnprotected,
        };

        let gc = GcPolicy {
            enabled: parse_bool(GC_ENABLED_ENV, get(GC_ENABLED_ENV), defaults.gc.enabled)?,
            interval: optional_millis(GC_INTERVAL_MS_ENV, get(GC_INTERVAL_MS_ENV))?
                .unwrap_or(defaults.gc.interval),
            initial_delay: optional_millis(GC_INITIAL_DELAY_MS_ENV, get(GC_INITIAL_DELAY_MS_ENV))?
                .unwrap_or(defaults.gc.initial_delay),
            retention,
        };

        let reconcile = ReconcilePolicy {
            enabled: parse_bool(
                RECONCILE_ENABLED_ENV,
                get(RECONCILE_ENABLED_ENV),
                defaults.reconcile.enabled,
            )?,
            interval: optional_millis(RECONCILE_INTERVAL_MS_ENV, get(RECONCILE_INTERVAL_MS_ENV))?
                .unwrap_or(defaults.reconcile.interval),
        };

        let default_quota_mb = match get(DEFAULT_QUOTA_MB_ENV) {
            Some(raw) => match raw.parse::<f64>() {
                Ok(v) if v.is_finite() && v >= 0.0 => Some(v),
                _ => {
                    return Err(ConfigError::InvalidNumber {
                        var: DEFAULT_QUOTA_MB_ENV,
                        value: raw,
                    })
                }
            },
            None => None,
        };

        let log_format = match get(LOG_FORMAT_ENV).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            bind_addr,
            admin_secret: get(ADMIN_SECRET_ENV),
            protection_disabled: parse_bool(
                PROTECTION_DISABLED_ENV,
                get(PROTECTION_DISABLED_ENV),
                false,
            )?,
            protected_namespaces,
            batch_policy,
            gc,
            ledger_write_mode,
            read_timeout: optional_millis(STORE_READ_TIMEOUT_MS_ENV, get(STORE_READ_TIMEOUT_MS_ENV))?
                .unwrap_or(defaults.read_timeout),
            reconcile,
            default_quota_mb,
            api_keys_enabled: parse_bool(
                API_KEYS_ENABLED_ENV,
                get(API_KEYS_ENABLED_ENV),
                defaults.api_keys_enabled,
            )?,
            graph_db_path: get(GRAPH_DB_PATH_ENV).map(PathBuf::from),
            log_format,
        })
    }
}

fn parse_bool(var: &'static str, raw: Option<String>, default: bool) -> ConfigResult<bool> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool { var, value: raw }),
    }
}

fn parse_millis(var: &'static str, raw: String) -> ConfigResult<Duration> {
    match raw.parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
        _ => Err(ConfigError::InvalidPositive { var, value: raw }),
    }
}

fn optional_millis(var: &'static str, raw: Option<String>) -> ConfigResult<Option<Duration>> {
    raw.map(|raw| parse_millis(var, raw)).transpose()
}
