// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{process, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use w3clog::{
    config::{self, Config},
    logger,
    retention::RetentionPolicy,
    state::StateStore,
    transfer::{HttpTransferClient, HttpTransferConfig},
    watcher::Watcher,
};

#[tokio::main]
pub async fn main() {
    let log_level = config::log_level_from_env();
    let env_filter = format!("h2=off,hyper=off,rustls=off,reqwest=off,{log_level}");

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .event_format(logger::Formatter)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let state_path = config::state_path_from_env();
    let mut state = match StateStore::load(&state_path) {
        Ok(state) => state,
        Err(e) => {
            error!("Error loading state document on startup: {e}");
            process::exit(1);
        }
    };

    let config = match Config::from_env(state.document()) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Error creating config on startup: {e}");
            process::exit(1);
        }
    };

    let retention = RetentionPolicy::default();
    let pruned = state.prune(&retention);
    if let Err(e) = state.persist() {
        error!("Error writing pruned state document: {e}");
        process::exit(1);
    }
    info!(
        "Loaded {} with {pruned} stale entries pruned",
        state_path.display()
    );

    let client = match HttpTransferClient::new(HttpTransferConfig::from_config(&config)) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Error creating transfer client: {e}");
            process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                shutdown.cancel();
            }
            Err(e) => error!("Unable to listen for shutdown signal: {e}"),
        }
    });

    let mut watcher = Watcher::new(config, state, client).with_retention(retention);
    if let Err(e) = watcher.run(cancel).await {
        error!("Watcher stopped: {e}");
        process::exit(1);
    }
}
