//! Browser-driven extraction cascade.
//!
//! Drives a [`RenderContext`] to the listing page and pulls name, developer,
//! and logo URL through an ordered fallback chain per field:
//!
//! 1. direct `querySelector` in the top-level document,
//! 2. the same selector searched depth-first through every reachable
//!    shadow root (the marketplace renders the title/developer/logo
//!    fragments inside nested custom-element shadow roots that plain
//!    document queries cannot see),
//! 3. a field-specific last resort (`<title>` for the name, `og:image`
//!    meta for the logo; the developer has none).
//!
//! The whole attempt is total: any thrown error is caught and reported as a
//! structured failure outcome, never propagated.

use super::{clean_developer, clean_name, normalize_logo_url, ExtractError, Extracted};
use crate::config::PipelineConfig;
use crate::metadata::PARSING_ERROR;
use crate::renderer::RenderContext;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Title h1 inside the listing header fragment.
const NAME_SELECTOR: &str = ".listing-title h1";
/// Publisher line under the title.
const DEVELOPER_SELECTOR: &str = ".listing-title p";
/// Logo image inside the listing header.
const LOGO_SELECTOR: &str = ".listing-logo img";
/// OpenGraph image meta tag, the logo's last resort.
const OG_IMAGE_SELECTOR: &str = r#"meta[property="og:image"]"#;

/// Interval between deep-query polls while waiting for dynamic content.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Result of one rendered extraction attempt.
///
/// `success` is carried separately from the fields because a failed attempt
/// still reports a diagnostic name (`"Parsing Error"`).
#[derive(Debug, Clone)]
pub struct RenderedOutcome {
    pub fields: Extracted,
    pub success: bool,
    /// Diagnostic message when the attempt blew up rather than merely
    /// finding nothing.
    pub error: Option<String>,
}

/// Run the full cascade against `url` in the given browser context.
///
/// Total function: navigation or evaluation errors become a failure outcome.
pub async fn extract(
    ctx: &mut dyn RenderContext,
    url: &str,
    cfg: &PipelineConfig,
) -> RenderedOutcome {
    match run_cascade(ctx, url, cfg).await {
        Ok(fields) => {
            let success = fields.success();
            RenderedOutcome {
                fields,
                success,
                error: None,
            }
        }
        Err(e) => {
            warn!(url, error = %e, "rendered extraction failed");
            RenderedOutcome {
                fields: Extracted {
                    name: Some(PARSING_ERROR.to_string()),
                    developer: None,
                    logo_url: None,
                },
                success: false,
                error: Some(e.to_string()),
            }
        }
    }
}

async fn run_cascade(
    ctx: &mut dyn RenderContext,
    url: &str,
    cfg: &PipelineConfig,
) -> Result<Extracted, ExtractError> {
    ctx.navigate(url, cfg.nav_timeout_ms)
        .await
        .map_err(|e| ExtractError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    // The deep-query poll below is the authoritative readiness gate; this
    // brief settle only covers the non-waiting direct query.
    if cfg.settle_ms > 0 {
        tokio::time::sleep(Duration::from_millis(cfg.settle_ms)).await;
    }

    // ── name ────────────────────────────────────────────────────────────
    let mut name = query_direct(ctx, NAME_SELECTOR, None).await?;
    if name.is_none() {
        name = query_deep_wait(ctx, NAME_SELECTOR, None, cfg.name_wait_ms).await?;
    }
    if name.is_none() {
        name = page_title(ctx).await?;
        if name.is_some() {
            debug!(url, "name recovered from <title>");
        }
    }

    // ── developer ───────────────────────────────────────────────────────
    let mut developer = query_direct(ctx, DEVELOPER_SELECTOR, None).await?;
    if developer.is_none() {
        developer = query_deep_wait(ctx, DEVELOPER_SELECTOR, None, cfg.field_wait_ms).await?;
    }

    // ── logo URL ────────────────────────────────────────────────────────
    let mut logo = query_direct(ctx, LOGO_SELECTOR, Some("src")).await?;
    if logo.is_none() {
        logo = query_deep_wait(ctx, LOGO_SELECTOR, Some("src"), cfg.field_wait_ms).await?;
    }
    if logo.is_none() {
        logo = query_direct(ctx, OG_IMAGE_SELECTOR, Some("content")).await?;
        if logo.is_some() {
            debug!(url, "logo recovered from og:image");
        }
    }

    Ok(Extracted {
        name: name.as_deref().and_then(clean_name),
        developer: developer.as_deref().and_then(clean_developer),
        logo_url: logo.as_deref().and_then(|l| normalize_logo_url(l, url)),
    })
}

/// Plain top-level `querySelector`. A missing element is `Ok(None)` — only a
/// CDP-level failure is an error.
async fn query_direct(
    ctx: &dyn RenderContext,
    selector: &str,
    attr: Option<&str>,
) -> Result<Option<String>, ExtractError> {
    let script = direct_query_js(selector, attr);
    let value = ctx.evaluate(&script).await?;
    Ok(non_empty_string(value))
}

/// Shadow-DOM-aware query, polled until `deadline_ms` elapses.
///
/// The walk runs inside the page because element handles cannot cross the
/// CDP boundary; only the resolved string comes back.
async fn query_deep_wait(
    ctx: &dyn RenderContext,
    selector: &str,
    attr: Option<&str>,
    deadline_ms: u64,
) -> Result<Option<String>, ExtractError> {
    let script = deep_query_js(selector, attr);
    let deadline = Instant::now() + Duration::from_millis(deadline_ms);
    loop {
        let value = ctx.evaluate(&script).await?;
        if let Some(s) = non_empty_string(value) {
            debug!(selector, "deep query matched inside shadow DOM");
            return Ok(Some(s));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn page_title(ctx: &dyn RenderContext) -> Result<Option<String>, ExtractError> {
    let value = ctx.evaluate("document.title").await?;
    Ok(non_empty_string(value))
}

fn non_empty_string(value: serde_json::Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn value_expr(attr: Option<&str>) -> String {
    match attr {
        Some(a) => format!("el.getAttribute({})", js_string(a)),
        None => "(el.textContent || '')".to_string(),
    }
}

fn direct_query_js(selector: &str, attr: Option<&str>) -> String {
    format!(
        "(() => {{
  const el = document.querySelector({sel});
  if (!el) return null;
  return {value};
}})()",
        sel = js_string(selector),
        value = value_expr(attr),
    )
}

/// Depth-first `querySelector` through every reachable shadow root.
///
/// Shadow roots nest, so the walk recurses into each one it pierces instead
/// of stopping at the top level.
fn deep_query_js(selector: &str, attr: Option<&str>) -> String {
    format!(
        "(() => {{
  function qsd(sel, root) {{
    root = root || document;
    if (root.querySelector) {{
      const direct = root.querySelector(sel);
      if (direct) return direct;
    }}
    const walker = document.createTreeWalker(root, NodeFilter.SHOW_ELEMENT);
    let node = walker.currentNode;
    while (node) {{
      if (node.shadowRoot) {{
        const found = qsd(sel, node.shadowRoot);
        if (found) return found;
      }}
      node = walker.nextNode();
    }}
    return null;
  }}
  const el = qsd({sel}, document);
  if (!el) return null;
  return {value};
}})()",
        sel = js_string(selector),
        value = value_expr(attr),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    /// Scripted page: answers `evaluate` calls by substring match against the
    /// submitted script, in declaration order. Unmatched scripts yield null,
    /// which the cascade treats as a selector miss.
    struct FakePage {
        responses: Vec<(&'static str, Value)>,
        fail_navigation: bool,
    }

    impl FakePage {
        fn new(responses: Vec<(&'static str, Value)>) -> Self {
            Self {
                responses,
                fail_navigation: false,
            }
        }
    }

    #[async_trait]
    impl RenderContext for FakePage {
        async fn navigate(&mut self, _url: &str, _timeout_ms: u64) -> Result<()> {
            if self.fail_navigation {
                anyhow::bail!("net::ERR_CONNECTION_REFUSED");
            }
            Ok(())
        }

        async fn evaluate(&self, script: &str) -> Result<Value> {
            for (needle, value) in &self.responses {
                if script.contains(needle) {
                    return Ok(value.clone());
                }
            }
            Ok(Value::Null)
        }

        async fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    fn quick_config() -> crate::config::PipelineConfig {
        crate::config::PipelineConfig {
            settle_ms: 0,
            name_wait_ms: 0,
            field_wait_ms: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn direct_query_wins_when_light_dom_has_the_title() {
        let mut page = FakePage::new(vec![
            (".listing-title h1", json!("Widget X | Salesforce AppExchange")),
            (".listing-title p", json!("By TaskRay")),
            (".listing-logo img", json!("//cdn.test/logo.png")),
        ]);
        let out = extract(&mut page, "https://example.test/l", &quick_config()).await;
        assert!(out.success);
        assert_eq!(out.fields.name.as_deref(), Some("Widget X"));
        assert_eq!(out.fields.developer.as_deref(), Some("TaskRay"));
        assert_eq!(
            out.fields.logo_url.as_deref(),
            Some("https://cdn.test/logo.png")
        );
    }

    #[tokio::test]
    async fn shadow_dom_walk_finds_what_plain_query_cannot() {
        // The direct script carries no tree walker; only the deep variant
        // does. Answering solely to the walker simulates content that lives
        // inside a nested shadow root.
        let mut page = FakePage::new(vec![("createTreeWalker", json!("Shadow App"))]);
        let out = extract(&mut page, "https://example.test/l", &quick_config()).await;
        assert!(out.success);
        assert_eq!(out.fields.name.as_deref(), Some("Shadow App"));
    }

    #[tokio::test]
    async fn title_tag_is_the_name_of_last_resort() {
        let mut page = FakePage::new(vec![(
            "document.title",
            json!("Fallback App | AppExchange"),
        )]);
        let out = extract(&mut page, "https://example.test/l", &quick_config()).await;
        assert!(out.success);
        assert_eq!(out.fields.name.as_deref(), Some("Fallback App"));
        assert_eq!(out.fields.developer, None);
    }

    #[tokio::test]
    async fn og_image_backs_up_the_logo_selector() {
        let mut page = FakePage::new(vec![
            (".listing-title h1", json!("Widget X")),
            ("og:image", json!("https://cdn.test/og-logo.png")),
        ]);
        let out = extract(&mut page, "https://example.test/l", &quick_config()).await;
        assert_eq!(
            out.fields.logo_url.as_deref(),
            Some("https://cdn.test/og-logo.png")
        );
    }

    #[tokio::test]
    async fn navigation_failure_becomes_a_structured_outcome() {
        let mut page = FakePage::new(vec![]);
        page.fail_navigation = true;
        let out = extract(&mut page, "https://example.test/l", &quick_config()).await;
        assert!(!out.success);
        assert_eq!(out.fields.name.as_deref(), Some(PARSING_ERROR));
        assert!(out.error.is_some());
    }

    #[tokio::test]
    async fn nothing_found_is_a_miss_not_an_error() {
        let mut page = FakePage::new(vec![]);
        let out = extract(&mut page, "https://example.test/l", &quick_config()).await;
        assert!(!out.success);
        assert_eq!(out.fields, Extracted::default());
        assert!(out.error.is_none());
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn deep_query_pierces_nested_shadow_roots_in_a_real_page() {
        use crate::renderer::chromium::ChromiumRenderer;
        use crate::renderer::Renderer;

        let renderer = ChromiumRenderer::launch("appdeck-test")
            .await
            .expect("failed to launch renderer");
        let mut ctx = renderer
            .new_context()
            .await
            .expect("failed to create context");

        // The h1 sits two shadow roots down, invisible to a plain query.
        let page = "data:text/html,<div></div><script>\
                    const o=document.querySelector('div').attachShadow({mode:'open'});\
                    o.innerHTML='<section></section>';\
                    const m=o.querySelector('section').attachShadow({mode:'open'});\
                    m.innerHTML='<h1>Nested%20Title</h1>';\
                    </script>";
        ctx.navigate(page, 10_000).await.expect("navigation failed");

        let direct = ctx
            .evaluate(&direct_query_js("h1", None))
            .await
            .expect("direct evaluation failed");
        assert!(direct.is_null());

        let deep = ctx
            .evaluate(&deep_query_js("h1", None))
            .await
            .expect("deep evaluation failed");
        assert_eq!(deep.as_str().map(str::trim), Some("Nested Title"));

        ctx.close().await.expect("close failed");
        renderer.shutdown().await.expect("shutdown failed");
    }

    #[test]
    fn deep_query_script_escapes_the_selector() {
        let js = deep_query_js(r#"meta[property="og:image"]"#, Some("content"));
        assert!(js.contains(r#""meta[property=\"og:image\"]""#));
        assert!(js.contains("createTreeWalker"));
    }
}
