// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Durable record of which `site|day` files have been shipped.
//!
//! The whole document (settings plus markers) lives in one JSON file that is
//! read once at startup and rewritten in full after every change. Writes go to
//! a sibling temporary file first and are renamed over the document.

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::descriptor::{parse_day_code, split_state_key};
use crate::error::StateError;
use crate::retention::{RetentionDecision, RetentionPolicy};

/// Value stored for every processed key.
pub const PROCESSED_MARKER: i64 = 1;

/// The persisted document. Unknown settings are not preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDocument {
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub sshaddr: String,
    #[serde(default)]
    pub sshuser: String,
    #[serde(default)]
    pub sshpass: String,
    #[serde(default)]
    pub sshfile: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_limit_kb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_compression: Option<bool>,
    #[serde(default)]
    pub files: BTreeMap<String, i64>,
}

#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    document: AgentDocument,
    loaded_at: NaiveDateTime,
    pruned: bool,
}

impl StateStore {
    /// Reads the document at `path`.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StateError> {
        Self::load_at(path, Local::now().naive_local())
    }

    /// Reads the document at `path`, using `now` as the load time for pruning.
    pub fn load_at(path: impl Into<PathBuf>, now: NaiveDateTime) -> Result<Self, StateError> {
        let path = path.into();
        let bytes = fs::read(&path).map_err(|source| StateError::Read {
            path: path.clone(),
            source,
        })?;
        let document =
            serde_json::from_slice(&bytes).map_err(|source| StateError::Malformed {
                path: path.clone(),
                source,
            })?;
        Ok(Self::new(path, document, now))
    }

    #[must_use]
    pub fn new(path: impl Into<PathBuf>, document: AgentDocument, now: NaiveDateTime) -> Self {
        Self {
            path: path.into(),
            document,
            loaded_at: now,
            pruned: false,
        }
    }

    #[must_use]
    pub fn document(&self) -> &AgentDocument {
        &self.document
    }

    /// Drops keys that are malformed or older than the retention window,
    /// measured from the load time. Only the first call has an effect.
    pub fn prune(&mut self, policy: &RetentionPolicy) -> usize {
        if self.pruned {
            return 0;
        }
        self.pruned = true;

        let now = self.loaded_at;
        let before = self.document.files.len();
        self.document.files.retain(|key, _| {
            let keep = split_state_key(key)
                .and_then(|(_, day)| parse_day_code(day))
                .is_some_and(|date| policy.decide(now, date) == RetentionDecision::Keep);
            if !keep {
                debug!("Pruning state key {key}");
            }
            keep
        });
        before - self.document.files.len()
    }

    #[must_use]
    pub fn is_processed(&self, key: &str) -> bool {
        self.document.files.contains_key(key)
    }

    pub fn mark_processed(&mut self, key: impl Into<String>) {
        self.document.files.insert(key.into(), PROCESSED_MARKER);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.document.files.keys().map(String::as_str)
    }

    /// Rewrites the entire document.
    pub fn persist(&self) -> Result<(), StateError> {
        let bytes = serde_json::to_vec_pretty(&self.document)?;
        let tmp_path = tmp_path(&self.path);
        fs::write(&tmp_path, bytes).map_err(|source| StateError::Write {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|source| StateError::Write {
            path: self.path.clone(),
            source,
        })?;
        debug!(
            "Persisted state document with {} keys to {}",
            self.document.files.len(),
            self.path.display()
        );
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
