// Copyright 2026 Appdeck Contributors
// SPDX-License-Identifier: Apache-2.0

//! End-to-end pipeline tests against a local mock server.
//!
//! These run with the `NoopRenderer`, so every listing goes through the
//! static-HTML fallback path over real HTTP.

use appdeck::batch::BatchOrchestrator;
use appdeck::config::PipelineConfig;
use appdeck::events::PipelineEvent;
use appdeck::metadata::{ListingOverride, MANUAL_INPUT_REQUIRED};
use appdeck::renderer::NoopRenderer;
use std::collections::HashMap;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn orchestrator(cache_dir: &std::path::Path) -> BatchOrchestrator {
    let cfg = PipelineConfig {
        cache_dir: cache_dir.to_path_buf(),
        ..Default::default()
    };
    BatchOrchestrator::new(cfg, Arc::new(NoopRenderer)).unwrap()
}

/// A plausible PNG body: valid signature plus padding past the size floor.
fn png_bytes() -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(&[0u8; 56]);
    bytes
}

fn listing_html(server_uri: &str) -> String {
    format!(
        r#"<html><head>
             <meta property="og:title" content="Widget X | Foo AppExchange">
             <meta property="og:image" content="{server_uri}/logo.png">
             <meta name="description" content="Automate everything. By Foo Corp. Trusted.">
           </head><body></body></html>"#
    )
}

#[tokio::test]
async fn static_pipeline_end_to_end() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/listingA"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(&server.uri())))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(png_bytes())
                .insert_header("content-type", "image/png"),
        )
        .mount(&server)
        .await;

    let orch = orchestrator(dir.path());
    let url = format!("{}/listingA", server.uri());
    let record = orch.fetch_metadata(&url).await;

    assert!(record.success);
    assert_eq!(record.name, "Widget X");
    assert_eq!(record.developer, "Foo Corp");
    assert_eq!(record.logo_bytes, png_bytes());
    assert_eq!(record.logo_mime, "image/png");
}

#[tokio::test]
async fn one_failing_url_does_not_poison_the_batch() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/good"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(&server.uri())))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(png_bytes())
                .insert_header("content-type", "image/png"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bad"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let orch = orchestrator(dir.path());
    let urls = vec![
        format!("{}/good", server.uri()),
        format!("{}/bad", server.uri()),
    ];
    let results = orch.run(&urls, &HashMap::new()).await;

    let good = &results[&urls[0]];
    assert!(good.success);
    assert_eq!(good.name, "Widget X");

    let bad = &results[&urls[1]];
    assert!(!bad.success);
    assert_eq!(bad.name, MANUAL_INPUT_REQUIRED);
    assert_eq!(bad.developer, MANUAL_INPUT_REQUIRED);
    assert!(bad.logo_bytes.is_empty());
}

#[tokio::test]
async fn second_run_is_served_from_cache() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    // The listing page must be fetched exactly once; logo bytes are not
    // cached, so the logo endpoint serves both runs.
    Mock::given(method("GET"))
        .and(path("/listingA"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(&server.uri())))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(png_bytes())
                .insert_header("content-type", "image/png"),
        )
        .expect(2)
        .mount(&server)
        .await;

    let orch = orchestrator(dir.path());
    let url = format!("{}/listingA", server.uri());

    let first = orch.fetch_metadata(&url).await;
    assert!(first.success);

    let mut events = orch.events().subscribe();
    let second = orch.fetch_metadata(&url).await;
    assert!(second.success);
    assert_eq!(second.name, first.name);
    assert_eq!(second.developer, first.developer);
    assert_eq!(second.logo_bytes, first.logo_bytes);

    let mut saw_cache_hit = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, PipelineEvent::CacheHit { .. }) {
            saw_cache_hit = true;
        }
    }
    assert!(saw_cache_hit);
}

#[tokio::test]
async fn override_fields_win_over_extracted_values() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/listingA"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(&server.uri())))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(png_bytes())
                .insert_header("content-type", "image/png"),
        )
        .mount(&server)
        .await;

    let orch = orchestrator(dir.path());
    let url = format!("{}/listingA", server.uri());
    let mut overrides = HashMap::new();
    overrides.insert(
        url.clone(),
        ListingOverride {
            name: Some("Corrected Name".into()),
            ..Default::default()
        },
    );

    let results = orch.run(std::slice::from_ref(&url), &overrides).await;
    let record = &results[&url];
    assert!(record.success);
    // The supplied name wins; the rest still comes from extraction.
    assert_eq!(record.name, "Corrected Name");
    assert_eq!(record.developer, "Foo Corp");
    assert_eq!(record.logo_mime, "image/png");
}

#[tokio::test]
async fn failure_is_not_cached_and_retried_next_run() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    // Both runs must hit the network: a failure never lands in the cache.
    // 404 is not retried, so each run is exactly one request.
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let orch = orchestrator(dir.path());
    let url = format!("{}/flaky", server.uri());

    let first = orch.fetch_metadata(&url).await;
    assert!(!first.success);
    let second = orch.fetch_metadata(&url).await;
    assert!(!second.success);
}
