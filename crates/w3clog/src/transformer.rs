// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mapping from raw W3C columns to the shipped JSON record.

use chrono::{Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use tracing::debug;

use crate::constants::{INPUT_TIMESTAMP_FORMAT, OUTPUT_TIMESTAMP_FORMAT};
use crate::schema::RawRecord;

/// One access-log entry as delivered downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub host: String,
    #[serde(rename = "@timestamp")]
    pub timestamp: String,
    #[serde(rename = "clientip")]
    pub client_ip: String,
    /// `sc-bytes`
    pub size: i64,
    /// `cs-bytes`
    #[serde(rename = "csize")]
    pub request_size: i64,
    /// `time-taken`
    #[serde(rename = "responsetime")]
    pub response_time: i64,
    #[serde(rename = "httphost")]
    pub site: String,
    pub url: String,
    pub agent: String,
    pub method: String,
    pub status: i64,
    pub substatus: i64,
    #[serde(rename = "winstatus")]
    pub win32_status: i64,
}

pub struct RecordTransformer<Tz: TimeZone = Local> {
    host: String,
    site: String,
    tz: Tz,
}

impl RecordTransformer<Local> {
    #[must_use]
    pub fn new(host: impl Into<String>, site: impl Into<String>) -> Self {
        Self::with_timezone(host, site, Local)
    }
}

impl<Tz> RecordTransformer<Tz>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    /// Interprets log timestamps in `tz` instead of the host's local zone.
    #[must_use]
    pub fn with_timezone(host: impl Into<String>, site: impl Into<String>, tz: Tz) -> Self {
        Self {
            host: host.into(),
            site: site.into(),
            tz,
        }
    }

    /// Returns `None` when the `date`/`time` columns do not form a valid timestamp.
    #[must_use]
    pub fn transform(&self, raw: &RawRecord) -> Option<OutputRecord> {
        let timestamp = self.timestamp(field(raw, "date"), field(raw, "time"))?;

        Some(OutputRecord {
            host: self.host.clone(),
            timestamp,
            client_ip: field(raw, "c-ip").to_string(),
            size: number(raw, "sc-bytes"),
            request_size: number(raw, "cs-bytes"),
            response_time: number(raw, "time-taken"),
            site: self.site.clone(),
            url: field(raw, "cs-uri-stem").to_string(),
            agent: field(raw, "cs(User-Agent)").to_string(),
            method: field(raw, "cs-method").to_string(),
            status: number(raw, "sc-status"),
            substatus: number(raw, "sc-substatus"),
            win32_status: number(raw, "sc-win32-status"),
        })
    }

    /// Transforms `raw` and appends it to `buf` as one JSON line.
    /// Returns whether a line was written.
    pub fn append(&self, raw: &RawRecord, buf: &mut Vec<u8>) -> bool {
        let Some(record) = self.transform(raw) else {
            return false;
        };
        match serde_json::to_writer(&mut *buf, &record) {
            Ok(()) => {
                buf.push(b'\n');
                true
            }
            Err(e) => {
                debug!("Failed to encode record, dropping it: {e}");
                false
            }
        }
    }

    fn timestamp(&self, date: &str, time: &str) -> Option<String> {
        let text = format!("{date} {time}");
        let naive = match NaiveDateTime::parse_from_str(&text, INPUT_TIMESTAMP_FORMAT) {
            Ok(naive) => naive,
            Err(e) => {
                debug!("Dropping line with unparsable timestamp {text:?}: {e}");
                return None;
            }
        };
        let Some(local) = self.tz.from_local_datetime(&naive).earliest() else {
            debug!("Dropping line with nonexistent local time {text:?}");
            return None;
        };
        Some(local.format(OUTPUT_TIMESTAMP_FORMAT).to_string())
    }
}

fn field<'a>(raw: &'a RawRecord, name: &str) -> &'a str {
    raw.get(name).map_or("", String::as_str)
}

/// Malformed or missing numbers are recorded as zero.
fn number(raw: &RawRecord, name: &str) -> i64 {
    field(raw, name).parse().unwrap_or(0)
}
