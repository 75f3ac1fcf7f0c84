// Copyright 2026 Appdeck Contributors
// SPDX-License-Identifier: Apache-2.0

//! Batch orchestrator — fans a list of listing URLs through the cache, the
//! rendered-DOM cascade, and the static-HTML fallback, then resolves logos
//! through a bounded worker pool.
//!
//! One browser context is reused sequentially across the whole batch (a
//! context cannot run two navigations at once, and browser launch dominates
//! per-URL latency). Logo downloads are independent I/O and run under
//! `buffer_unordered`. Per-URL failures never abort the batch: the failed
//! entry degrades to sentinels while the rest proceed.

use crate::cache::{CachedListing, MetadataCache};
use crate::config::PipelineConfig;
use crate::events::{EventBus, PipelineEvent};
use crate::extract::{rendered, static_html, Extracted};
use crate::logo;
use crate::metadata::{self, ListingMetadata, ListingOverride};
use crate::renderer::Renderer;
use anyhow::{Context, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Orchestrates extraction for batches of listing URLs.
pub struct BatchOrchestrator {
    cfg: PipelineConfig,
    cache: MetadataCache,
    http: reqwest::Client,
    renderer: Arc<dyn Renderer>,
    events: EventBus,
}

impl BatchOrchestrator {
    /// Build an orchestrator around a renderer. Pass [`crate::renderer::NoopRenderer`]
    /// to run static-HTML-only.
    pub fn new(cfg: PipelineConfig, renderer: Arc<dyn Renderer>) -> Result<Self> {
        let cache = MetadataCache::new(cfg.cache_dir.clone(), cfg.cache_ttl)?;
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            cfg,
            cache,
            http,
            renderer,
            events: EventBus::default(),
        })
    }

    /// Subscribe to pipeline progress events.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Access the underlying cache (e.g. for `cache clear`).
    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    /// Fetch metadata for a single listing URL.
    ///
    /// Total: always returns a fully populated record, degrading to
    /// sentinels on failure.
    pub async fn fetch_metadata(&self, url: &str) -> ListingMetadata {
        let mut results = self.run(&[url.to_string()], &HashMap::new()).await;
        results
            .remove(url)
            .unwrap_or_else(|| ListingMetadata::placeholder(url))
    }

    /// Run a batch: every input URL maps to a fully populated record.
    ///
    /// Overrides win field-by-field over extracted values; a complete
    /// override skips extraction for its URL entirely.
    pub async fn run(
        &self,
        urls: &[String],
        overrides: &HashMap<String, ListingOverride>,
    ) -> HashMap<String, ListingMetadata> {
        let batch_start = Instant::now();

        // ── Partition: overrides / cache hits / needs extraction ────────
        let mut extracted: HashMap<String, Extracted> = HashMap::new();
        let mut succeeded: HashMap<String, bool> = HashMap::new();
        let mut needs_extraction: Vec<String> = Vec::new();
        let mut cache_hits: Vec<String> = Vec::new();

        for url in urls {
            let ovr = overrides.get(url);
            if ovr.is_some_and(ListingOverride::is_complete) {
                debug!(url, "complete override, skipping extraction");
                extracted.insert(url.clone(), Extracted::default());
                succeeded.insert(url.clone(), true);
                continue;
            }
            if let Some(hit) = self.cache.get(url) {
                cache_hits.push(url.clone());
                succeeded.insert(url.clone(), hit.success);
                extracted.insert(
                    url.clone(),
                    Extracted {
                        name: Some(hit.name),
                        developer: Some(hit.developer).filter(|d| !d.is_empty()),
                        logo_url: hit.logo_url,
                    },
                );
                continue;
            }
            needs_extraction.push(url.clone());
        }

        self.events.emit(PipelineEvent::BatchStarted {
            total: urls.len(),
            cached: cache_hits.len(),
        });
        for url in cache_hits {
            self.events.emit(PipelineEvent::CacheHit { url });
        }

        // ── Extraction: one browser context, reused sequentially ────────
        if !needs_extraction.is_empty() {
            let mut context = match self.renderer.new_context().await {
                Ok(ctx) => Some(ctx),
                Err(e) => {
                    warn!(error = %e, "browser unavailable, batch degrades to static HTML");
                    None
                }
            };

            for url in &needs_extraction {
                let url_start = Instant::now();
                let (fields, ok) = match context.as_deref_mut() {
                    Some(ctx) => self.extract_one(ctx, url).await,
                    None => self.extract_static(url, "browser unavailable").await,
                };
                self.events.emit(PipelineEvent::ListingExtracted {
                    url: url.clone(),
                    success: ok,
                    elapsed_ms: url_start.elapsed().as_millis() as u64,
                });
                if ok {
                    self.persist(url, &fields);
                }
                extracted.insert(url.clone(), fields);
                succeeded.insert(url.clone(), ok);
            }

            // Context release happens on every path out of the batch.
            if let Some(ctx) = context.take() {
                let _ = ctx.close().await;
            }
        }

        // ── Logo pass: bounded parallel downloads ───────────────────────
        let logo_tasks: Vec<(String, String)> = urls
            .iter()
            .filter(|url| {
                // An override logo makes the download unnecessary; failed
                // extractions have nothing trustworthy to download.
                !overrides.get(*url).is_some_and(ListingOverride::has_logo)
                    && succeeded.get(*url).copied().unwrap_or(false)
            })
            .filter_map(|url| {
                extracted
                    .get(url)
                    .and_then(|e| e.logo_url.clone())
                    .map(|logo_url| (url.clone(), logo_url))
            })
            .collect();

        let mut logos: HashMap<String, (Vec<u8>, String)> = stream::iter(logo_tasks)
            .map(|(url, logo_url)| {
                let client = self.http.clone();
                let cfg = self.cfg.clone();
                let events = self.events.clone();
                async move {
                    let (bytes, mime) = logo::fetch_logo(&client, &logo_url, &cfg).await;
                    events.emit(PipelineEvent::LogoFetched {
                        url: url.clone(),
                        bytes: bytes.len(),
                        mime: mime.clone(),
                    });
                    (url, (bytes, mime))
                }
            })
            .buffer_unordered(self.cfg.logo_concurrency)
            .collect()
            .await;

        // ── Merge: override > extracted > sentinel ──────────────────────
        let mut results = HashMap::new();
        let mut success_count = 0usize;
        for url in urls {
            let ovr = overrides.get(url);
            let fields = extracted.remove(url).unwrap_or_default();
            let ok = succeeded.get(url).copied().unwrap_or(false);

            let (logo_bytes, logo_mime) = match ovr.and_then(override_logo) {
                Some(pair) => pair,
                None => logos
                    .remove(url)
                    .unwrap_or_else(|| (Vec::new(), metadata::DEFAULT_LOGO_MIME.to_string())),
            };

            let record = metadata::merge(
                url,
                ovr,
                fields.name,
                fields.developer,
                logo_bytes,
                logo_mime,
                ok,
            );
            if record.success {
                success_count += 1;
            }
            results.insert(url.clone(), record);
        }

        let total_ms = batch_start.elapsed().as_millis() as u64;
        info!(
            total = urls.len(),
            succeeded = success_count,
            total_ms,
            "batch complete"
        );
        self.events.emit(PipelineEvent::BatchComplete {
            total: urls.len(),
            succeeded: success_count,
            total_ms,
        });
        results
    }

    /// Rendered cascade for one URL, with a per-URL static retry when the
    /// browser attempt blows up.
    async fn extract_one(
        &self,
        ctx: &mut dyn crate::renderer::RenderContext,
        url: &str,
    ) -> (Extracted, bool) {
        let outcome = rendered::extract(ctx, url, &self.cfg).await;
        if outcome.success {
            return (outcome.fields, true);
        }
        match outcome.error {
            // The attempt itself failed (navigation error, crash): the page
            // was never inspected, so static HTML gets a shot at it.
            Some(reason) => self.extract_static(url, &reason).await,
            // Clean miss: the page rendered but held no name anywhere. The
            // static path would see the same markup minus JS; don't retry.
            None => (outcome.fields, false),
        }
    }

    async fn extract_static(&self, url: &str, reason: &str) -> (Extracted, bool) {
        self.events.emit(PipelineEvent::FallbackEngaged {
            url: url.to_string(),
            reason: reason.to_string(),
        });
        match static_html::fetch_and_extract(&self.http, url, self.cfg.request_timeout_ms).await {
            Ok(fields) => {
                let ok = fields.success();
                (fields, ok)
            }
            Err(e) => {
                warn!(url, error = %e, "static extraction failed");
                (Extracted::default(), false)
            }
        }
    }

    fn persist(&self, url: &str, fields: &Extracted) {
        let entry = CachedListing {
            name: fields.name.clone().unwrap_or_default(),
            developer: fields.developer.clone().unwrap_or_default(),
            logo_url: fields.logo_url.clone(),
            success: true,
            fetched_at: Utc::now(),
        };
        if let Err(e) = self.cache.put(url, &entry) {
            // Cache trouble must not fail the batch.
            warn!(url, error = %e, "failed to persist cache entry");
        }
    }
}

/// Caller-declared MIME, accepted only when it looks like a real image
/// type. Anything else falls through to sniffing so the record's MIME
/// field stays non-empty.
fn declared_mime(ovr: &ListingOverride) -> Option<String> {
    ovr.logo_mime
        .as_deref()
        .map(str::trim)
        .filter(|m| m.starts_with("image/"))
        .map(str::to_string)
}

/// Resolve an override's logo source to bytes+MIME. Inline bytes win; a
/// file path is read here, degrading to no logo when unreadable.
fn override_logo(ovr: &ListingOverride) -> Option<(Vec<u8>, String)> {
    if let Some(bytes) = &ovr.logo_bytes {
        let mime = declared_mime(ovr).unwrap_or_else(|| logo::resolve_mime(None, bytes, ""));
        return Some((bytes.clone(), mime));
    }
    let path = ovr.logo_path.as_ref()?;
    match std::fs::read(path) {
        Ok(bytes) => {
            let mime = declared_mime(ovr)
                .unwrap_or_else(|| logo::resolve_mime(None, &bytes, &path.to_string_lossy()));
            Some((bytes, mime))
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "override logo unreadable");
            None
        }
    }
}
