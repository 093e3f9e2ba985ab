// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Identity of a daily log file, derived from its path on every pass.

use chrono::NaiveDate;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::constants::{ARTIFACT_DIR, DAY_CODE_CENTURY, DAY_CODE_FORMAT};

const SEPARATORS: [char; 2] = ['/', '\\'];

fn file_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:^|[/\\])([^/\\]+)[/\\]u_ex(\d{6})\.log$").expect("invalid file pattern")
    })
}

/// A candidate log file: `<root>/.../<site>/u_ex<YYMMDD>.log`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileDescriptor {
    pub site: String,
    pub day: String,
    pub path: PathBuf,
}

impl LogFileDescriptor {
    /// Returns `None` for paths outside `root`, paths that do not follow the
    /// naming pattern, and log files lying directly in `root` with no site
    /// directory.
    #[must_use]
    pub fn from_path(root: &Path, path: &Path) -> Option<Self> {
        let relative = relative_to(root.to_str()?, path.to_str()?)?;
        let captures = file_pattern().captures(relative)?;
        Some(Self {
            site: captures[1].to_string(),
            day: captures[2].to_string(),
            path: path.to_path_buf(),
        })
    }

    #[must_use]
    pub fn date(&self) -> Option<NaiveDate> {
        parse_day_code(&self.day)
    }

    /// Key under which the processed marker is stored.
    #[must_use]
    pub fn state_key(&self) -> String {
        state_key(&self.site, &self.day)
    }

    /// Logical destination handed to the transfer client.
    #[must_use]
    pub fn artifact_path(&self, host: &str) -> String {
        format!("{ARTIFACT_DIR}/{host}_{}_{}.log", self.site, self.day)
    }
}

/// Part of `path` below `root`, without the leading separator.
fn relative_to<'a>(root: &str, path: &'a str) -> Option<&'a str> {
    let rest = path.strip_prefix(root)?;
    if root.is_empty() || root.ends_with(SEPARATORS) {
        return Some(rest);
    }
    rest.strip_prefix(SEPARATORS)
}

#[must_use]
pub fn state_key(site: &str, day: &str) -> String {
    format!("{site}|{day}")
}

/// Splits a `site|day` key. Anything other than exactly two parts is rejected.
#[must_use]
pub fn split_state_key(key: &str) -> Option<(&str, &str)> {
    let mut parts = key.split('|');
    let site = parts.next()?;
    let day = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((site, day))
}

/// Decodes a `YYMMDD` day code as a date in the 2000s.
#[must_use]
pub fn parse_day_code(day: &str) -> Option<NaiveDate> {
    if day.len() != 6 || !day.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(&format!("{DAY_CODE_CENTURY}{day}"), DAY_CODE_FORMAT).ok()
}
