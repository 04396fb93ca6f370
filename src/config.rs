// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the [`RelayConfig`] loaded from
//! them once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DID_ALIAS` | Host of the relay's own `did:web` identity | Required |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `RELAY_BATCH_THRESHOLD` | Queue length that flushes immediately | `5` |
//! | `RELAY_FLUSH_WINDOW_MS` | Quiet period before a partial batch flushes | `300` |
//! | `RELAY_HEARTBEAT_SECS` | WebSocket `server_time` keep-alive period | `55` |
//! | `RELAY_EVENT_BUS_CAPACITY` | Agent event bus buffer size | `1024` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::str::FromStr;
use std::time::Duration;

use crate::relay::{RelaySettings, DEFAULT_BATCH_THRESHOLD, DEFAULT_FLUSH_WINDOW};

/// Environment variable holding the relay's `did:web` host.
///
/// The relay signs deliveries as `did:web:<DID_ALIAS>`, so this must match
/// the host serving its DID document.
pub const DID_ALIAS_ENV: &str = "DID_ALIAS";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const BATCH_THRESHOLD_ENV: &str = "RELAY_BATCH_THRESHOLD";
pub const FLUSH_WINDOW_MS_ENV: &str = "RELAY_FLUSH_WINDOW_MS";
pub const HEARTBEAT_SECS_ENV: &str = "RELAY_HEARTBEAT_SECS";
pub const EVENT_BUS_CAPACITY_ENV: &str = "RELAY_EVENT_BUS_CAPACITY";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

/// Some clients only consider the socket open after receiving data, and
/// proxies close idle sockets after a minute.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(55);

pub const DEFAULT_EVENT_BUS_CAPACITY: usize = 1024;

pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format {other:?}")),
        }
    }
}

/// Process configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub relay_did: String,
    pub host: String,
    pub port: u16,
    pub batch_threshold: usize,
    pub flush_window: Duration,
    pub heartbeat_interval: Duration,
    pub event_bus_capacity: usize,
    pub log_format: LogFormat,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let alias = lookup(DID_ALIAS_ENV)
            .map(|alias| alias.trim().to_string())
            .filter(|alias| !alias.is_empty())
            .ok_or(ConfigError::Missing(DID_ALIAS_ENV))?;

        let batch_threshold: usize = parse_or(&lookup, BATCH_THRESHOLD_ENV, DEFAULT_BATCH_THRESHOLD)?;
        if batch_threshold == 0 {
            return Err(ConfigError::Invalid {
                var: BATCH_THRESHOLD_ENV,
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        let flush_window_ms: u64 = parse_or(
            &lookup,
            FLUSH_WINDOW_MS_ENV,
            DEFAULT_FLUSH_WINDOW.as_millis() as u64,
        )?;
        let heartbeat_secs: u64 = parse_or(
            &lookup,
            HEARTBEAT_SECS_ENV,
            DEFAULT_HEARTBEAT_INTERVAL.as_secs(),
        )?;
        if heartbeat_secs == 0 {
            return Err(ConfigError::Invalid {
                var: HEARTBEAT_SECS_ENV,
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            relay_did: format!("did:web:{alias}"),
            host: lookup(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or(&lookup, PORT_ENV, DEFAULT_PORT)?,
            batch_threshold,
            flush_window: Duration::from_millis(flush_window_ms),
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
            event_bus_capacity: parse_or(&lookup, EVENT_BUS_CAPACITY_ENV, DEFAULT_EVENT_BUS_CAPACITY)?
                .max(1),
            log_format: parse_or(&lookup, LOG_FORMAT_ENV, LogFormat::default())?,
        })
    }

    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings::new(self.relay_did.clone())
            .with_batch_threshold(self.batch_threshold)
            .with_flush_window(self.flush_window)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => {
            let parsed = value.trim().parse::<T>();
            parsed.map_err(|e| ConfigError::Invalid {
                var,
                value,
                reason: e.to_string(),
            })
        }
    }
}
