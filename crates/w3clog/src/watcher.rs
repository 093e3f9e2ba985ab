// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The discovery and retention loop.
//!
//! Every pass walks the log root and decides, for each file, in this order:
//!
//! 1. not `<root>/.../<site>/u_ex<YYMMDD>.log` -> ignored
//! 2. day code is not a date             -> skipped this pass
//! 3. older than the retention window    -> deleted, never parsed
//! 4. dated today                        -> left alone, still being written
//! 5. `site|day` already processed       -> skipped
//! 6. otherwise parse, transform, transfer, mark, persist
//!
//! Files are handled one at a time. Passes never overlap: the next one starts
//! `scan_interval` after the previous one finished.

use bytes::Bytes;
use chrono::{Local, NaiveDateTime, TimeZone};
use std::fmt::Display;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::config::Config;
use crate::descriptor::LogFileDescriptor;
use crate::error::{TransferError, WatcherError};
use crate::retention::{is_current_day, RetentionDecision, RetentionPolicy};
use crate::schema::{LogFileParser, ParseStats};
use crate::state::StateStore;
use crate::transfer::TransferClient;
use crate::transformer::RecordTransformer;

/// What a pass did with a single path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Ignored,
    UnparsableDay,
    Deleted,
    DeleteFailed,
    CurrentDay,
    AlreadyProcessed,
    Processed { records: u64 },
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Paths matching the naming pattern
    pub candidates: u64,
    pub ignored: u64,
    pub unparsable: u64,
    pub deleted: u64,
    pub delete_failures: u64,
    pub current_day: u64,
    pub already_processed: u64,
    pub processed: u64,
    /// Files left unmarked after a read or transfer failure
    pub failed: u64,
    /// Records shipped across all processed files
    pub records: u64,
    pub walk_errors: u64,
}

impl PassStats {
    fn record(&mut self, outcome: FileOutcome) {
        if outcome != FileOutcome::Ignored {
            self.candidates += 1;
        }
        match outcome {
            FileOutcome::Ignored => self.ignored += 1,
            FileOutcome::UnparsableDay => self.unparsable += 1,
            FileOutcome::Deleted => self.deleted += 1,
            FileOutcome::DeleteFailed => self.delete_failures += 1,
            FileOutcome::CurrentDay => self.current_day += 1,
            FileOutcome::AlreadyProcessed => self.already_processed += 1,
            FileOutcome::Processed { records } => {
                self.processed += 1;
                self.records += records;
            }
            FileOutcome::Failed => self.failed += 1,
        }
    }
}

/// JSON lines produced from one log file.
#[derive(Debug, Default)]
pub struct ParsedFile {
    pub buffer: Vec<u8>,
    pub stats: ParseStats,
    /// Data lines dropped because their timestamp did not parse
    pub dropped: u64,
}

/// Streams `path` through the parser and transformer into an in-memory buffer.
pub fn parse_file<Tz>(path: &Path, transformer: &RecordTransformer<Tz>) -> io::Result<ParsedFile>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let file = File::open(path)?;
    let mut parser = LogFileParser::new(BufReader::new(file));
    let mut parsed = ParsedFile::default();
    for raw in parser.by_ref() {
        if !transformer.append(&raw?, &mut parsed.buffer) {
            parsed.dropped += 1;
        }
    }
    parsed.stats = parser.stats();
    Ok(parsed)
}

/// Lists every non-directory entry below `root`. Unreadable directories are
/// logged and skipped; the second value counts them.
pub fn discover(root: &Path) -> (Vec<PathBuf>, u64) {
    let mut files = Vec::new();
    let mut errors = 0;
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to read directory {}: {e}", dir.display());
                errors += 1;
                continue;
            }
        };
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Failed to read entry in {}: {e}", dir.display());
                    errors += 1;
                    continue;
                }
            };
            match entry.file_type() {
                Ok(file_type) if file_type.is_dir() => pending.push(entry.path()),
                Ok(_) => files.push(entry.path()),
                Err(e) => {
                    warn!("Failed to stat {}: {e}", entry.path().display());
                    errors += 1;
                }
            }
        }
    }
    (files, errors)
}

/// Single owner of the processing state. Nothing else mutates the store
/// while the watcher runs, so no locking is involved.
pub struct Watcher {
    config: Arc<Config>,
    state: StateStore,
    transfer: Arc<dyn TransferClient + Send + Sync>,
    retention: RetentionPolicy,
}

impl Watcher {
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        state: StateStore,
        transfer: Arc<dyn TransferClient + Send + Sync>,
    ) -> Self {
        Self {
            config,
            state,
            transfer,
            retention: RetentionPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    #[must_use]
    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Runs passes until `cancel` fires. Only a failure to persist state ends
    /// the loop early.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), WatcherError> {
        info!(
            "Watching {} every {}s",
            self.config.log_root.display(),
            self.config.scan_interval.as_secs()
        );
        loop {
            self.run_pass(&cancel).await?;

            tokio::select! {
                () = cancel.cancelled() => {
                    info!("Watcher cancelled, stopping");
                    return Ok(());
                }
                () = tokio::time::sleep(self.config.scan_interval) => {}
            }
        }
    }

    pub async fn run_pass(&mut self, cancel: &CancellationToken) -> Result<PassStats, WatcherError> {
        self.run_pass_at(Local::now().naive_local(), cancel).await
    }

    /// One traversal of the log root, with `now` as the reference time.
    pub async fn run_pass_at(
        &mut self,
        now: NaiveDateTime,
        cancel: &CancellationToken,
    ) -> Result<PassStats, WatcherError> {
        let span = info_span!("pass");
        async {
            let root = self.config.log_root.clone();
            let (paths, walk_errors) = tokio::task::spawn_blocking(move || discover(&root)).await?;

            let mut stats = PassStats {
                walk_errors,
                ..PassStats::default()
            };
            for path in paths {
                if cancel.is_cancelled() {
                    debug!("Pass interrupted by cancellation");
                    break;
                }
                let outcome = self.handle_path(&path, now, cancel).await?;
                stats.record(outcome);
            }

            info!(
                candidates = stats.candidates,
                processed = stats.processed,
                records = stats.records,
                deleted = stats.deleted,
                failed = stats.failed,
                walk_errors = stats.walk_errors,
                "Pass finished"
            );
            Ok(stats)
        }
        .instrument(span)
        .await
    }

    /// Applies the discovery rules to a single path.
    pub async fn handle_path(
        &mut self,
        path: &Path,
        now: NaiveDateTime,
        cancel: &CancellationToken,
    ) -> Result<FileOutcome, WatcherError> {
        let Some(descriptor) = LogFileDescriptor::from_path(&self.config.log_root, path) else {
            return Ok(FileOutcome::Ignored);
        };
        let Some(date) = descriptor.date() else {
            debug!(
                "Skipping {} with unparsable day code {}",
                path.display(),
                descriptor.day
            );
            return Ok(FileOutcome::UnparsableDay);
        };

        if self.retention.decide(now, date) == RetentionDecision::Delete {
            return Ok(match tokio::fs::remove_file(path).await {
                Ok(()) => {
                    info!("Deleted expired log file {}", path.display());
                    FileOutcome::Deleted
                }
                Err(e) => {
                    warn!("Failed to delete expired log file {}: {e}", path.display());
                    FileOutcome::DeleteFailed
                }
            });
        }
        if is_current_day(now, date) {
            return Ok(FileOutcome::CurrentDay);
        }
        if self.state.is_processed(&descriptor.state_key()) {
            return Ok(FileOutcome::AlreadyProcessed);
        }

        let span = info_span!("file", site = %descriptor.site, day = %descriptor.day);
        self.process(descriptor, cancel).instrument(span).await
    }

    async fn process(
        &mut self,
        descriptor: LogFileDescriptor,
        cancel: &CancellationToken,
    ) -> Result<FileOutcome, WatcherError> {
        let transformer = RecordTransformer::new(self.config.host.clone(), descriptor.site.clone());
        let path = descriptor.path.clone();
        let span = Span::current();
        let parsed = match tokio::task::spawn_blocking(move || {
            span.in_scope(|| parse_file(&path, &transformer))
        })
        .await?
        {
            Ok(parsed) => parsed,
            Err(e) => {
                error!("Failed to read {}: {e}", descriptor.path.display());
                return Ok(FileOutcome::Failed);
            }
        };

        debug!(
            lines = parsed.stats.lines,
            discarded = parsed.stats.discarded,
            dropped = parsed.dropped,
            "Parsed {}",
            descriptor.path.display()
        );

        let records = parsed.stats.records.saturating_sub(parsed.dropped);
        if parsed.buffer.is_empty() {
            debug!("No records to ship");
        } else {
            let remote_path = descriptor.artifact_path(&self.config.host);
            if let Err(e) = self
                .deliver(Bytes::from(parsed.buffer), &remote_path, cancel)
                .await
            {
                error!("Failed to transfer {remote_path}, will retry next pass: {e}");
                return Ok(FileOutcome::Failed);
            }
            info!("Shipped {records} records to {remote_path}");
        }

        self.state.mark_processed(descriptor.state_key());
        self.state.persist()?;
        Ok(FileOutcome::Processed { records })
    }

    async fn deliver(
        &self,
        payload: Bytes,
        remote_path: &str,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        let timeout = self
            .transfer
            .deadline(payload.len())
            .unwrap_or(self.config.transfer_timeout);
        tokio::select! {
            () = cancel.cancelled() => Err(TransferError::Cancelled),
            res = tokio::time::timeout(timeout, self.transfer.transfer(payload, remote_path)) => {
                res.unwrap_or_else(|_| Err(TransferError::Timeout(timeout)))
            }
        }
    }
}
