// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock transfer client for driving the watcher without a network

use bytes::Bytes;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};
use w3clog::error::TransferError;
use w3clog::transfer::TransferClient;

/// A payload handed to the mock, with the remote path it was meant for.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub remote_path: String,
    pub payload: Bytes,
}

impl Delivery {
    pub fn lines(&self) -> Vec<serde_json::Value> {
        std::str::from_utf8(&self.payload)
            .expect("payload is utf-8")
            .lines()
            .map(|line| serde_json::from_str(line).expect("payload line is json"))
            .collect()
    }
}

/// Records every call. When `failing` is set, calls are recorded and then rejected.
#[derive(Default)]
pub struct MockTransferClient {
    deliveries: Mutex<Vec<Delivery>>,
    failing: AtomicBool,
}

#[allow(dead_code)]
impl MockTransferClient {
    pub fn failing() -> Self {
        let client = Self::default();
        client.set_failing(true);
        client
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().expect("lock").clone()
    }
}

#[async_trait::async_trait]
impl TransferClient for MockTransferClient {
    async fn transfer(&self, payload: Bytes, remote_path: &str) -> Result<(), TransferError> {
        self.deliveries.lock().expect("lock").push(Delivery {
            remote_path: remote_path.to_string(),
            payload,
        });
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransferError::Destination {
                status: None,
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}
