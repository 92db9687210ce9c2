// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! A `.env` file in the working directory is read first if present.

use crate::services::RecorderSettings;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the central store API
    pub remote_base_url: String,
    /// SQLite file backing the local durable store
    pub db_path: String,
    /// GeoJSON region file loaded at startup
    pub regions_path: String,
    /// Frontend origin allowed by CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    /// Period of the background refresh and drain
    pub sync_interval: Duration,
    /// Period of the connectivity probe
    pub ping_interval: Duration,
    /// Consecutive failed probes before going offline
    pub ping_failures_to_offline: u32,
    /// Per-request timeout for remote calls
    pub request_timeout: Duration,
    pub snap_m: f64,
    pub event_history: usize,
    /// Read JSON samples from standard input
    pub samples_from_stdin: bool,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            remote_base_url: "http://localhost:8000".to_string(),
            db_path: "dogtracks.db".to_string(),
            regions_path: "data/regions.geojson".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            port: 8080,
            sync_interval: Duration::from_secs(10),
            ping_interval: Duration::from_secs(10),
            ping_failures_to_offline: 2,
            request_timeout: Duration::from_secs(10),
            snap_m: 10.0,
            event_history: 20,
            samples_from_stdin: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present
        let defaults = Self::default();

        let config = Self {
            remote_base_url: env::var("REMOTE_BASE_URL").unwrap_or(defaults.remote_base_url),
            db_path: env::var("DB_PATH").unwrap_or(defaults.db_path),
            regions_path: env::var("REGIONS_PATH").unwrap_or(defaults.regions_path),
            frontend_url: env::var("FRONTEND_URL").unwrap_or(defaults.frontend_url),
            port: parse_var("PORT", defaults.port)?,
            sync_interval: Duration::from_secs(parse_var("SYNC_INTERVAL_SECS", 10)?),
            ping_interval: Duration::from_secs(parse_var("PING_INTERVAL_SECS", 10)?),
            ping_failures_to_offline: parse_var(
                "PING_FAILURES_TO_OFFLINE",
                defaults.ping_failures_to_offline,
            )?,
            request_timeout: Duration::from_secs(parse_var("REQUEST_TIMEOUT_SECS", 10)?),
            snap_m: parse_var("SNAP_METERS", defaults.snap_m)?,
            event_history: parse_var("EVENT_HISTORY", defaults.event_history)?,
            samples_from_stdin: parse_var("SAMPLES_FROM_STDIN", defaults.samples_from_stdin)?,
        };

        if config.sync_interval.is_zero() || config.ping_interval.is_zero() {
            return Err(ConfigError::Invalid {
                name: "SYNC_INTERVAL_SECS/PING_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }
        Ok(config)
    }

    pub fn recorder_settings(&self) -> RecorderSettings {
        RecorderSettings {
            snap_m: self.snap_m,
            event_history: self.event_history,
        }
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}
