// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Streaming reader for W3C extended log files.
//!
//! A file is a sequence of directive lines (`#...`) and space separated data
//! lines. The most recent `#Fields: ` directive decides how data tokens map to
//! column names:
//!
//! ```text
//! #Software: Microsoft Internet Information Services 10.0
//! #Fields: date time c-ip cs-method ...      <- schema, checked for required columns
//! 2024-05-01 00:00:01 10.0.0.1 GET ...        <- RawRecord while the schema is valid
//! #Fields: date time                          <- invalid, following data lines are discarded
//! ```

use std::collections::HashMap;
use std::io::{self, BufRead};

use tracing::{debug, warn};

use crate::constants::{DIRECTIVE_PREFIX, FIELDS_DIRECTIVE, REQUIRED_FIELDS};

/// Column name to raw token, for a single data line.
pub type RawRecord = HashMap<String, String>;

/// Column order declared by a `#Fields: ` directive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSchema {
    fields: Vec<String>,
    missing: Vec<&'static str>,
}

impl FieldSchema {
    /// Builds a schema from a full directive line, `None` if it is not a `#Fields: ` line.
    #[must_use]
    pub fn from_directive(line: &str) -> Option<Self> {
        line.strip_prefix(FIELDS_DIRECTIVE).map(Self::parse)
    }

    /// Builds a schema from the space separated names following the directive.
    #[must_use]
    pub fn parse(names: &str) -> Self {
        let fields: Vec<String> = names.split(' ').map(|name| name.trim().to_string()).collect();
        let missing = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|required| !fields.iter().any(|field| field == required))
            .collect();
        Self { fields, missing }
    }

    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Required columns the directive did not declare.
    #[must_use]
    pub fn missing(&self) -> &[&'static str] {
        &self.missing
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.missing.is_empty()
    }

    /// Pairs the tokens of a data line with the schema by position.
    /// Extra tokens are dropped; columns without a token are left out.
    #[must_use]
    pub fn record(&self, line: &str) -> RawRecord {
        self.fields
            .iter()
            .zip(line.split(' '))
            .map(|(name, value)| (name.clone(), value.to_string()))
            .collect()
    }
}

/// Counters collected while streaming a single file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub lines: u64,
    pub directives: u64,
    pub invalid_directives: u64,
    pub comments: u64,
    pub records: u64,
    /// Data lines seen while no valid schema was active.
    pub discarded: u64,
}

/// Iterator over the [`RawRecord`]s of a log file.
///
/// Read errors are yielded once and end the iteration.
pub struct LogFileParser<R> {
    reader: R,
    schema: Option<FieldSchema>,
    stats: ParseStats,
    buf: Vec<u8>,
    done: bool,
}

impl<R: BufRead> LogFileParser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            schema: None,
            stats: ParseStats::default(),
            buf: Vec::with_capacity(1024),
            done: false,
        }
    }

    #[must_use]
    pub fn stats(&self) -> ParseStats {
        self.stats
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }
        let mut line = String::from_utf8_lossy(&self.buf).into_owned();
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }

    fn handle_directive(&mut self, line: &str) {
        let Some(schema) = FieldSchema::from_directive(line) else {
            self.stats.comments += 1;
            return;
        };
        self.stats.directives += 1;
        if schema.is_valid() {
            debug!("Fields directive declares {} columns", schema.fields().len());
        } else {
            self.stats.invalid_directives += 1;
            warn!(
                "Fields directive lacks required columns {:?}, ignoring data lines until the next directive",
                schema.missing()
            );
        }
        self.schema = Some(schema);
    }
}

impl<R: BufRead> Iterator for LogFileParser<R> {
    type Item = io::Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let line = match self.read_line() {
                Ok(Some(line)) => line,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            self.stats.lines += 1;

            if line.starts_with(DIRECTIVE_PREFIX) {
                self.handle_directive(&line);
                continue;
            }
            if line.is_empty() {
                continue;
            }
            match self.schema.as_ref() {
                Some(schema) if schema.is_valid() => {
                    self.stats.records += 1;
                    return Some(Ok(schema.record(&line)));
                }
                _ => self.stats.discarded += 1,
            }
        }
        None
    }
}
