// Copyright 2026 Appdeck Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared HTTP send path with bounded retry.
//!
//! Both the static-HTML fetch and the logo download go through
//! [`send_with_retry`]: 5xx responses are retried with exponential backoff,
//! 429 honors the `Retry-After` header. Transport errors are not retried;
//! the callers already degrade those into structured failures.

use std::time::Duration;
use tracing::debug;

const MAX_RETRIES: u32 = 2;
const RETRY_BASE_MS: u64 = 500;
/// Cap on server-requested 429 backoff.
const RETRY_AFTER_CAP_SECS: u64 = 10;

/// Send a request, retrying on 5xx and backing off on 429.
pub async fn send_with_retry(
    request: reqwest::RequestBuilder,
) -> reqwest::Result<reqwest::Response> {
    let mut retries = 0u32;
    loop {
        let attempt = match request.try_clone() {
            Some(r) => r,
            // Streaming bodies cannot be cloned; send those once, unretried.
            None => return request.send().await,
        };
        let resp = attempt.send().await?;
        let status = resp.status().as_u16();

        if status >= 500 && retries < MAX_RETRIES {
            retries += 1;
            let delay = Duration::from_millis(RETRY_BASE_MS * 2u64.pow(retries - 1));
            debug!(status, retry = retries, delay_ms = delay.as_millis() as u64, "retrying");
            tokio::time::sleep(delay).await;
            continue;
        }

        if status == 429 && retries < MAX_RETRIES {
            retries += 1;
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(2);
            let delay = Duration::from_secs(retry_after.min(RETRY_AFTER_CAP_SECS));
            debug!(retry = retries, delay_s = delay.as_secs(), "rate limited, backing off");
            tokio::time::sleep(delay).await;
            continue;
        }

        return Ok(resp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn server_errors_are_retried_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flappy"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flappy"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let resp = send_with_retry(client.get(format!("{}/flappy", server.uri())))
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
    }

    #[tokio::test]
    async fn rate_limit_honors_retry_after_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let started = std::time::Instant::now();
        let resp = send_with_retry(client.get(format!("{}/limited", server.uri())))
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let server = MockServer::start().await;
        // Never recovers; the third response must come back as-is.
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let resp = send_with_retry(client.get(format!("{}/down", server.uri())))
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 503);
    }

    #[tokio::test]
    async fn client_errors_pass_through_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let resp = send_with_retry(client.get(format!("{}/missing", server.uri())))
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 404);
    }
}
