//! Chromium-based renderer using chromiumoxide.

use super::{RenderContext, Renderer};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;

/// Masks the `navigator.webdriver` flag the marketplace inspects.
const WEBDRIVER_MASK_JS: &str =
    "Object.defineProperty(navigator, 'webdriver', {get: () => undefined})";

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("APPDECK_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Chromium-based renderer.
///
/// Launch flags mirror what the marketplace tolerates: new headless mode,
/// automation-control detection disabled, images off (logos are downloaded
/// out-of-band), and a small fixed viewport.
pub struct ChromiumRenderer {
    browser: Browser,
}

impl ChromiumRenderer {
    /// Launch a headless Chromium instance with the given user-agent.
    pub async fn launch(user_agent: &str) -> Result<Self> {
        let chrome_path = find_chromium().context("Chromium not found on this host")?;

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--disable-images")
            .arg("--window-size=1280,720")
            .arg("--disable-blink-features=AutomationControlled")
            .arg(format!("--user-agent={user_agent}"))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // Drive the CDP event loop for the lifetime of the browser.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(Self { browser })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;
        Ok(Box::new(ChromiumContext { page }))
    }

    async fn shutdown(&self) -> Result<()> {
        // Browser process exits when the handle is dropped.
        Ok(())
    }
}

/// Renderer that launches Chromium only when the first context is requested.
///
/// A batch served entirely from cache or overrides never spawns a browser
/// process. Launch failure surfaces from `new_context`, which the
/// orchestrator treats as runtime-unavailable.
pub struct LazyChromiumRenderer {
    user_agent: String,
    inner: tokio::sync::OnceCell<ChromiumRenderer>,
}

impl LazyChromiumRenderer {
    pub fn new(user_agent: &str) -> Self {
        Self {
            user_agent: user_agent.to_string(),
            inner: tokio::sync::OnceCell::new(),
        }
    }

    /// Whether a browser process has been launched.
    pub fn launched(&self) -> bool {
        self.inner.initialized()
    }
}

#[async_trait]
impl Renderer for LazyChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let renderer = self
            .inner
            .get_or_try_init(|| ChromiumRenderer::launch(&self.user_agent))
            .await?;
        renderer.new_context().await
    }

    async fn shutdown(&self) -> Result<()> {
        match self.inner.get() {
            Some(renderer) => renderer.shutdown().await,
            None => Ok(()),
        }
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<()> {
        let result = tokio::time::timeout(
            std::time::Duration::from_millis(timeout_ms),
            self.page.goto(url),
        )
        .await;

        match result {
            Ok(Ok(_)) => {
                let _ = self.page.wait_for_navigation().await;
                let _ = self.page.evaluate(WEBDRIVER_MASK_JS).await;
                Ok(())
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS evaluation failed")?;
        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let _ = self.page.close().await;
        Ok(())
    }
}
