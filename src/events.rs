// Copyright 2026 Appdeck Contributors
// SPDX-License-Identifier: Apache-2.0

//! Pipeline event bus — typed progress events from the orchestrator.
//!
//! The bus is a `tokio::sync::broadcast` channel carrying [`PipelineEvent`]
//! values. Any consumer — a web layer streaming progress, a CLI spinner, a
//! log file — can subscribe independently. When no subscribers exist,
//! events are silently dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Every event the pipeline emits. Serialized to JSON for downstream streaming.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// A batch of listing URLs started processing.
    BatchStarted { total: usize, cached: usize },
    /// A fresh cache entry satisfied this URL without any network work.
    CacheHit { url: String },
    /// One listing finished the extraction cascade.
    ListingExtracted {
        url: String,
        success: bool,
        elapsed_ms: u64,
    },
    /// The rendered-DOM path was unavailable or failed; static HTML engaged.
    FallbackEngaged { url: String, reason: String },
    /// A logo download completed.
    LogoFetched {
        url: String,
        bytes: usize,
        mime: String,
    },
    /// The whole batch is merged and ready.
    BatchComplete {
        total: usize,
        succeeded: usize,
        total_ms: u64,
    },
}

/// Broadcast bus for [`PipelineEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event. Fire-and-forget: a send error only means nobody is
    /// listening right now.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
