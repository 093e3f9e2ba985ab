// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Watches a tree of rotating W3C extended access logs, turns each completed
//! daily file into JSON lines and hands the result to a [`transfer::TransferClient`].
//!
//! ```text
//!   Watcher ──> RetentionPolicy ──> StateStore lookup
//!      │
//!      v
//!   LogFileParser ──> RecordTransformer ──> buffer ──> TransferClient
//!                                                         │
//!                                                         v
//!                                               StateStore mark + persist
//! ```

pub mod config;
pub mod constants;
pub mod descriptor;
pub mod error;
pub mod http;
pub mod logger;
pub mod retention;
pub mod schema;
pub mod state;
pub mod transfer;
pub mod transformer;
pub mod watcher;
