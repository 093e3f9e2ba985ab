// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of finished artifacts to their remote destination.
//!
//! ```text
//!   buffer ──> compress (zstd, optional) ──> PUT <upload_url>/<remote path>
//!                                                 │
//!                                     2xx ok ─────┤
//!                               4xx permanent ────┤
//!                  5xx / network, retry strategy ─┘
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::constants::DEFAULT_COMPRESSION_LEVEL;
use crate::error::TransferError;
use crate::http::build_client;

/// Header carrying the length of the payload before compression.
pub const RAW_LENGTH_HEADER: &str = "x-w3clog-length";

#[async_trait]
pub trait TransferClient {
    /// Delivers `payload` to `remote_path`. The payload length is `payload.len()`.
    async fn transfer(&self, payload: Bytes, remote_path: &str) -> Result<(), TransferError>;

    /// Longest a `transfer` of `payload_len` bytes may take, retries included.
    /// `None` leaves the bound to the caller.
    fn deadline(&self, _payload_len: usize) -> Option<Duration> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryStrategy {
    /// Up to `n` attempts with no pause between them.
    Immediate(u64),
    /// Up to `n` attempts, waiting `attempt * ms` milliseconds after each failure.
    LinearBackoff(u64, u64),
}

impl RetryStrategy {
    fn attempts(&self) -> u64 {
        match self {
            RetryStrategy::Immediate(n) | RetryStrategy::LinearBackoff(n, _) => (*n).max(1),
        }
    }

    fn delay(&self, attempt: u64) -> Option<Duration> {
        match self {
            RetryStrategy::Immediate(_) => None,
            RetryStrategy::LinearBackoff(_, ms) => Some(Duration::from_millis(attempt * ms)),
        }
    }

    /// Sum of the pauses between all attempts.
    fn total_delay(&self) -> Duration {
        (1..self.attempts())
            .filter_map(|attempt| self.delay(attempt))
            .sum()
    }
}

pub struct HttpTransferConfig {
    pub upload_url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub https_proxy: Option<String>,
    /// Per-attempt allowance on top of the time pacing needs
    pub timeout: Duration,
    pub retry_strategy: RetryStrategy,
    /// zstd level, `None` sends the payload uncompressed
    pub compression_level: Option<i32>,
    /// Pacing in KiB/s, 0 sends the body in one go
    pub limit_kb: u64,
}

impl HttpTransferConfig {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            upload_url: config.upload_url.clone(),
            user: config.upload_user.clone(),
            password: config.upload_password.clone(),
            https_proxy: config.https_proxy.clone(),
            timeout: config.transfer_timeout,
            retry_strategy: RetryStrategy::LinearBackoff(3, 1000),
            compression_level: config
                .transfer_compression
                .then_some(DEFAULT_COMPRESSION_LEVEL),
            limit_kb: config.transfer_limit_kb,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpTransferClient {
    client: reqwest::Client,
    upload_url: String,
    timeout: Duration,
    user: Option<String>,
    password: Option<String>,
    retry_strategy: RetryStrategy,
    compression_level: Option<i32>,
    limit_kb: u64,
}

impl HttpTransferClient {
    pub fn new(config: HttpTransferConfig) -> Result<Self, TransferError> {
        let client = build_client(config.https_proxy.as_deref(), config.timeout)
            .map_err(|e| TransferError::Client(e.to_string()))?;
        Ok(Self {
            client,
            upload_url: config.upload_url.trim_end_matches('/').to_string(),
            timeout: config.timeout,
            user: config.user,
            password: config.password,
            retry_strategy: config.retry_strategy,
            compression_level: config.compression_level,
            limit_kb: config.limit_kb,
        })
    }

    fn url(&self, remote_path: &str) -> String {
        format!("{}/{}", self.upload_url, remote_path.trim_start_matches('/'))
    }

    fn encode(&self, payload: Bytes) -> Result<Bytes, TransferError> {
        match self.compression_level {
            Some(level) => zstd::stream::encode_all(payload.as_ref(), level)
                .map(Bytes::from)
                .map_err(|e| TransferError::Payload(e.to_string())),
            None => Ok(payload),
        }
    }

    fn headers(&self, raw_len: usize, body_len: usize) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-ndjson"),
        );
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body_len));
        headers.insert(RAW_LENGTH_HEADER, HeaderValue::from(raw_len));
        if self.compression_level.is_some() {
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static("zstd"));
        }
        headers
    }

    fn chunk_size(&self) -> Option<usize> {
        if self.limit_kb == 0 {
            return None;
        }
        Some(usize::try_from(self.limit_kb.saturating_mul(1024)).unwrap_or(usize::MAX))
    }

    fn body(&self, body: Bytes) -> reqwest::Body {
        match self.chunk_size() {
            Some(chunk_size) => reqwest::Body::wrap_stream(paced(body, chunk_size)),
            None => reqwest::Body::from(body),
        }
    }

    /// Time the paced stream needs to release `body_len` bytes.
    fn pacing_time(&self, body_len: usize) -> Duration {
        match self.chunk_size() {
            Some(chunk_size) => {
                let chunks = body_len.div_ceil(chunk_size.max(1));
                Duration::from_secs(u64::try_from(chunks.saturating_sub(1)).unwrap_or(u64::MAX))
            }
            None => Duration::ZERO,
        }
    }

    fn attempt_timeout(&self, body_len: usize) -> Duration {
        self.timeout.saturating_add(self.pacing_time(body_len))
    }

    async fn send_once(
        &self,
        url: &str,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> Result<(), TransferError> {
        let mut request = self
            .client
            .put(url)
            .timeout(self.attempt_timeout(body.len()))
            .headers(headers.clone())
            .body(self.body(body.clone()));
        if let Some(user) = &self.user {
            request = request.basic_auth(user, self.password.as_ref());
        }

        let resp = request.send().await.map_err(|e| TransferError::Destination {
            status: e.status(),
            message: e.to_string(),
        })?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        Err(TransferError::Destination {
            status: Some(status),
            message: resp.text().await.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl TransferClient for HttpTransferClient {
    async fn transfer(&self, payload: Bytes, remote_path: &str) -> Result<(), TransferError> {
        let raw_len = payload.len();
        let body = self.encode(payload)?;
        let headers = self.headers(raw_len, body.len());
        let url = self.url(remote_path);
        let max_attempts = self.retry_strategy.attempts();

        let mut attempts = 0;
        loop {
            attempts += 1;
            let time = Instant::now();
            match self.send_once(&url, &headers, &body).await {
                Ok(()) => {
                    debug!(
                        "Transferred {raw_len} bytes ({} on the wire) to {url} in {} ms",
                        body.len(),
                        time.elapsed().as_millis()
                    );
                    return Ok(());
                }
                Err(e) if e.is_permanent() => {
                    error!("Transfer to {url} was rejected: {e}");
                    return Err(e);
                }
                Err(e) if attempts >= max_attempts => {
                    error!("Failed to transfer to {url} after {attempts} attempts: {e}");
                    return Err(e);
                }
                Err(e) => {
                    warn!("Transfer attempt {attempts} to {url} failed: {e}");
                    if let Some(delay) = self.retry_strategy.delay(attempts) {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    /// Every attempt gets its pacing time plus `timeout`. The payload length
    /// stands in for the compressed length, which is almost always smaller.
    fn deadline(&self, payload_len: usize) -> Option<Duration> {
        let attempts = u32::try_from(self.retry_strategy.attempts()).unwrap_or(u32::MAX);
        Some(
            self.attempt_timeout(payload_len)
                .saturating_mul(attempts)
                .saturating_add(self.retry_strategy.total_delay()),
        )
    }
}

/// Splits `body` into `chunk_size` pieces released one per second.
fn paced(
    body: Bytes,
    chunk_size: usize,
) -> impl futures::Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let chunk_size = chunk_size.max(1);
    futures::stream::unfold((body, true), move |(mut rest, first)| async move {
        if rest.is_empty() {
            return None;
        }
        if !first {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        let chunk = rest.split_to(chunk_size.min(rest.len()));
        Some((Ok(chunk), (rest, false)))
    })
}
