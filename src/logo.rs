//! Logo download and MIME identification.
//!
//! `fetch_logo` is a total function: every failure path yields
//! `(empty bytes, "image/png")` so the caller's record invariants hold.
//! MIME resolution trusts, in order: an `image/*` content-type header, byte
//! signatures in the payload prefix, the URL's file extension, and finally
//! the PNG default.

use crate::config::PipelineConfig;
use crate::metadata::DEFAULT_LOGO_MIME;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Payloads shorter than this cannot be a real logo; treat as absent.
const MIN_PLAUSIBLE_BYTES: usize = 32;

/// How much of the payload the signature sniffer inspects.
const SNIFF_WINDOW: usize = 256;

/// Download a logo, returning its bytes and normalized MIME type.
///
/// Sends browser-like headers including a marketplace referer — the image
/// CDN rejects bare requests. Never fails: transport errors, bad statuses,
/// and implausible payloads all degrade to `(vec![], "image/png")`.
pub async fn fetch_logo(
    client: &reqwest::Client,
    logo_url: &str,
    cfg: &PipelineConfig,
) -> (Vec<u8>, String) {
    let request = client
        .get(logo_url)
        .header(
            "Accept",
            "image/avif,image/webp,image/apng,image/*,*/*;q=0.8",
        )
        .header("Referer", cfg.logo_referer.as_str())
        .timeout(Duration::from_millis(cfg.logo_timeout_ms));
    let resp = crate::http::send_with_retry(request).await;

    let resp = match resp {
        Ok(r) if r.status().is_success() => r,
        Ok(r) => {
            warn!(logo_url, status = r.status().as_u16(), "logo download rejected");
            return (Vec::new(), DEFAULT_LOGO_MIME.to_string());
        }
        Err(e) => {
            warn!(logo_url, error = %e, "logo download failed");
            return (Vec::new(), DEFAULT_LOGO_MIME.to_string());
        }
    };

    let header_mime = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(';').next().unwrap_or(s).trim().to_string());

    let bytes = match resp.bytes().await {
        Ok(b) => b.to_vec(),
        Err(e) => {
            warn!(logo_url, error = %e, "logo body read failed");
            return (Vec::new(), DEFAULT_LOGO_MIME.to_string());
        }
    };

    // Plausibility: tiny payloads and unidentifiable blobs are error pages
    // or tracking pixels, not logos.
    let header_is_image = header_mime.as_deref().is_some_and(|m| m.starts_with("image/"));
    if bytes.len() < MIN_PLAUSIBLE_BYTES || (!header_is_image && sniff_signature(&bytes).is_none())
    {
        warn!(logo_url, len = bytes.len(), "discarding implausible logo payload");
        return (Vec::new(), DEFAULT_LOGO_MIME.to_string());
    }

    let mime = resolve_mime(header_mime.as_deref(), &bytes, logo_url);
    debug!(logo_url, len = bytes.len(), mime, "logo downloaded");
    (bytes, mime)
}

/// Resolve the MIME type: header → signature → extension → default.
pub fn resolve_mime(header: Option<&str>, bytes: &[u8], url: &str) -> String {
    if let Some(h) = header {
        if h.starts_with("image/") {
            return h.to_string();
        }
    }
    if let Some(m) = sniff_signature(bytes) {
        return m.to_string();
    }
    if let Some(m) = mime_from_extension(url) {
        return m.to_string();
    }
    DEFAULT_LOGO_MIME.to_string()
}

/// Identify an image format from magic bytes in the payload prefix.
pub fn sniff_signature(bytes: &[u8]) -> Option<&'static str> {
    let window = &bytes[..bytes.len().min(SNIFF_WINDOW)];

    if window.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some("image/png");
    }
    if window.starts_with(b"\xFF\xD8\xFF") {
        return Some("image/jpeg");
    }
    if window.starts_with(b"GIF87a") || window.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if window.len() >= 12 && &window[..4] == b"RIFF" && &window[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    // SVG is text: look for an XML declaration or an <svg tag in the prefix.
    if let Ok(text) = std::str::from_utf8(window) {
        let lower = text.to_ascii_lowercase();
        if lower.starts_with("<?xml") || lower.contains("<svg") {
            return Some("image/svg+xml");
        }
    }
    None
}

/// Guess a MIME from the URL path's file extension, ignoring the query.
fn mime_from_extension(raw_url: &str) -> Option<&'static str> {
    let path = Url::parse(raw_url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| raw_url.split('?').next().unwrap_or(raw_url).to_string());
    let ext = path.rsplit('.').next()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}
