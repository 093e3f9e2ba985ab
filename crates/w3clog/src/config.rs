// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    DEFAULT_LOG_LEVEL, DEFAULT_LOG_ROOT, DEFAULT_SCAN_INTERVAL, DEFAULT_STATE_PATH,
    DEFAULT_TRANSFER_LIMIT_KB, DEFAULT_TRANSFER_TIMEOUT,
};
use crate::error::ConfigError;
use crate::state::AgentDocument;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Location of the state document, from `W3CLOG_STATE_PATH`.
#[must_use]
pub fn state_path_from_env() -> PathBuf {
    env::var("W3CLOG_STATE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_STATE_PATH))
}

/// Log level, from `W3CLOG_LOG_LEVEL`.
#[must_use]
pub fn log_level_from_env() -> String {
    env::var("W3CLOG_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
}

/// Runtime settings, built once at startup from the state document and the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Host name stamped on every record and artifact name
    pub host: String,
    /// Root of the per-site log directories
    pub log_root: PathBuf,
    /// Pause between two passes over `log_root`
    pub scan_interval: Duration,
    /// Base URL artifacts are uploaded under
    pub upload_url: String,
    pub upload_user: Option<String>,
    pub upload_password: Option<String>,
    /// Per-attempt transfer allowance, on top of the time upload pacing needs
    pub transfer_timeout: Duration,
    /// Upload pacing in KiB/s, 0 disables pacing
    pub transfer_limit_kb: u64,
    pub transfer_compression: bool,
    pub https_proxy: Option<String>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: String::new(),
            log_root: PathBuf::from(DEFAULT_LOG_ROOT),
            scan_interval: DEFAULT_SCAN_INTERVAL,
            upload_url: String::new(),
            upload_user: None,
            upload_password: None,
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
            transfer_limit_kb: DEFAULT_TRANSFER_LIMIT_KB,
            transfer_compression: true,
            https_proxy: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Config {
    /// Settings from the document alone.
    #[must_use]
    pub fn from_document(document: &AgentDocument) -> Self {
        let defaults = Self::default();
        Self {
            host: document.host.clone(),
            log_root: document
                .log_root
                .as_ref()
                .map_or(defaults.log_root, PathBuf::from),
            upload_url: document.upload_url.clone().unwrap_or_default(),
            upload_user: non_empty(&document.sshuser),
            upload_password: non_empty(&document.sshpass),
            transfer_limit_kb: document
                .transfer_limit_kb
                .unwrap_or(defaults.transfer_limit_kb),
            transfer_compression: document
                .transfer_compression
                .unwrap_or(defaults.transfer_compression),
            ..defaults
        }
    }

    /// Settings from the document, overridden by `W3CLOG_*` environment variables.
    pub fn from_env(document: &AgentDocument) -> Result<Self, ConfigError> {
        let mut config = Self::from_document(document);

        if let Ok(log_root) = env::var("W3CLOG_LOG_ROOT") {
            config.log_root = PathBuf::from(log_root);
        }
        if let Ok(upload_url) = env::var("W3CLOG_UPLOAD_URL") {
            config.upload_url = upload_url;
        }
        if let Some(secs) = parse_env::<u64>("W3CLOG_SCAN_INTERVAL_SECS")? {
            config.scan_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env::<u64>("W3CLOG_TRANSFER_TIMEOUT_SECS")? {
            config.transfer_timeout = Duration::from_secs(secs);
        }
        if let Some(limit) = parse_env::<u64>("W3CLOG_TRANSFER_LIMIT_KB")? {
            config.transfer_limit_kb = limit;
        }
        if let Ok(val) = env::var("W3CLOG_TRANSFER_COMPRESSION") {
            config.transfer_compression = val.to_lowercase() != "false";
        }
        config.https_proxy = env::var("W3CLOG_HTTPS_PROXY")
            .or_else(|_| env::var("HTTPS_PROXY"))
            .ok();
        config.log_level = log_level_from_env();

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host cannot be empty".to_string()));
        }
        if self.log_root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("log root cannot be empty".to_string()));
        }
        if self.scan_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "scan interval must be greater than 0".to_string(),
            ));
        }
        if self.transfer_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "transfer timeout must be greater than 0".to_string(),
            ));
        }
        if self.upload_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "upload_url (or W3CLOG_UPLOAD_URL) must be set".to_string(),
            ));
        }
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }
        Ok(())
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(format!("{name} has an invalid value '{val}'"))),
        Err(_) => Ok(None),
    }
}
