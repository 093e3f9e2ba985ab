// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Rolling retention window for source files and processed markers.

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::constants::RETENTION_DAYS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionDecision {
    Delete,
    Keep,
}

#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    window: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(Duration::days(RETENTION_DAYS))
    }
}

impl RetentionPolicy {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// `Delete` once more than the window has elapsed since midnight of `date`.
    /// Dates in the future are always kept.
    #[must_use]
    pub fn decide(&self, now: NaiveDateTime, date: NaiveDate) -> RetentionDecision {
        let start_of_day = date.and_time(chrono::NaiveTime::MIN);
        if now.signed_duration_since(start_of_day) > self.window {
            RetentionDecision::Delete
        } else {
            RetentionDecision::Keep
        }
    }
}

/// A file dated today is presumed to still be written to.
#[must_use]
pub fn is_current_day(now: NaiveDateTime, date: NaiveDate) -> bool {
    now.date() == date
}
