// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use core::time::Duration;
use std::error::Error;

/// Builds the client used for artifact uploads, with rustls TLS and an optional HTTPS proxy.
pub fn build_client(
    proxy_url: Option<&str>,
    timeout: Duration,
) -> Result<reqwest::Client, Box<dyn Error + Send + Sync>> {
    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(timeout);
    if let Some(proxy) = proxy_url {
        builder = builder.proxy(reqwest::Proxy::https(proxy)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_client_without_proxy() {
        assert!(build_client(None, Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_build_client_with_proxy() {
        assert!(build_client(Some("http://proxy.internal:3128"), Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_build_client_rejects_invalid_proxy() {
        assert!(build_client(Some("not a url"), Duration::from_secs(5)).is_err());
    }
}
