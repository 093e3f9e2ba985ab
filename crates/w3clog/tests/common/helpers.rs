// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use w3clog::config::Config;
use w3clog::state::{AgentDocument, StateStore};

pub const HOST: &str = "web01";

pub const FIELDS: &str = "#Fields: date time s-ip cs-method cs-uri-stem cs-uri-query s-port cs-username c-ip cs(User-Agent) sc-status sc-substatus sc-win32-status sc-bytes cs-bytes time-taken";

/// A log root and state document inside a temporary directory.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let fixture = Self {
            dir: tempfile::tempdir().expect("tempdir"),
        };
        fs::create_dir_all(fixture.log_root()).expect("log root");
        fixture
    }

    pub fn log_root(&self) -> PathBuf {
        self.dir.path().join("LogFiles")
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.path().join("config.json")
    }

    pub fn log_path(&self, site: &str, day: &str) -> PathBuf {
        self.log_root().join(site).join(format!("u_ex{day}.log"))
    }

    /// Writes `body` as the log of `site` for `day` (YYMMDD).
    pub fn write_log(&self, site: &str, day: &str, body: &str) -> PathBuf {
        let path = self.log_path(site, day);
        fs::create_dir_all(path.parent().expect("parent")).expect("site dir");
        fs::write(&path, body).expect("write log");
        path
    }

    /// Writes a state document marking `keys` as processed.
    pub fn write_state(&self, keys: &[&str]) {
        let document = AgentDocument {
            ip: "10.1.1.1".to_string(),
            host: HOST.to_string(),
            sshuser: "ship".to_string(),
            files: keys.iter().map(|key| (key.to_string(), 1)).collect(),
            ..Default::default()
        };
        fs::write(
            self.state_path(),
            serde_json::to_vec_pretty(&document).expect("serialize"),
        )
        .expect("write state");
    }

    pub fn load_state(&self, now: NaiveDateTime) -> StateStore {
        StateStore::load_at(self.state_path(), now).expect("load state")
    }

    /// Keys currently on disk.
    pub fn persisted_keys(&self) -> Vec<String> {
        let bytes = fs::read(self.state_path()).expect("read state");
        let document: AgentDocument = serde_json::from_slice(&bytes).expect("parse state");
        document.files.into_keys().collect()
    }

    pub fn config(&self) -> Arc<Config> {
        Arc::new(Config {
            host: HOST.to_string(),
            log_root: self.log_root(),
            upload_url: "http://localhost".to_string(),
            transfer_timeout: Duration::from_secs(5),
            ..Config::default()
        })
    }
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_opt(h, min, 0))
        .expect("valid datetime")
}

/// A complete log body with one data line per `(time, url)` pair.
pub fn log_body(date: &str, lines: &[(&str, &str)]) -> String {
    let mut body = String::from("#Software: Microsoft Internet Information Services 10.0\r\n");
    body.push_str(FIELDS);
    body.push_str("\r\n");
    for (time, url) in lines {
        body.push_str(&format!(
            "{date} {time} 10.0.0.5 GET {url} - 443 - 203.0.113.7 Mozilla/5.0 200 0 0 5120 320 15\r\n"
        ));
    }
    body
}

pub fn exists(path: &Path) -> bool {
    path.try_exists().expect("stat")
}
