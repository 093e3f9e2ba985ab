// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Directive that (re)declares the active column order.
pub const FIELDS_DIRECTIVE: &str = "#Fields: ";

/// Prefix shared by every directive or comment line.
pub const DIRECTIVE_PREFIX: char = '#';

/// Columns a `#Fields: ` directive must declare for its data lines to be used.
pub const REQUIRED_FIELDS: [&str; 11] = [
    "date",
    "time",
    "cs-method",
    "cs-uri-stem",
    "c-ip",
    "cs(User-Agent)",
    "sc-status",
    "sc-substatus",
    "sc-win32-status",
    "sc-bytes",
    "cs-bytes",
];

/// Maximum age of a source file or state key, in days.
pub const RETENTION_DAYS: i64 = 30;

pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_TRANSFER_LIMIT_KB: u64 = 200;
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;
pub const DEFAULT_STATE_PATH: &str = "config.json";
pub const DEFAULT_LOG_ROOT: &str = "LogFiles";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Logical directory every artifact is delivered under.
pub const ARTIFACT_DIR: &str = "jsonlog";

/// Local-time layout of the concatenated `date` and `time` columns.
pub const INPUT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// ISO-8601 with a numeric UTC offset, e.g. `2024-05-01T00:00:01+02:00`.
pub const OUTPUT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// Day codes carry a two-digit year in the 2000s.
pub const DAY_CODE_CENTURY: &str = "20";
pub const DAY_CODE_FORMAT: &str = "%Y%m%d";
