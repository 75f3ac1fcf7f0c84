//! Renderer abstraction for browser-based extraction.
//!
//! `Renderer` owns the browser process; `RenderContext` is one tab. The
//! batch orchestrator holds a single renderer for the life of a batch and
//! opens one context per listing, so browser launch cost is paid once.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
}

/// A single browser context (tab).
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL, bounded by `timeout_ms`.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<()>;
    /// Evaluate JavaScript in the page and return its JSON value.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Renderer used when no Chromium binary is available.
///
/// Context creation fails, which the orchestrator treats as
/// runtime-unavailable and routes to the static-HTML extractor.
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        Err(anyhow::anyhow!("browser not available, static-HTML mode"))
    }
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_renderer_refuses_contexts() {
        let r = NoopRenderer;
        assert!(r.new_context().await.is_err());
        assert!(r.shutdown().await.is_ok());
    }
}
