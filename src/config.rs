//! Pipeline configuration.
//!
//! All knobs the extractors and orchestrator consume, with defaults matching
//! observed behavior against the live marketplace. Construct with
//! `PipelineConfig::default()` and adjust as needed.

use std::path::PathBuf;
use std::time::Duration;

/// Tunables for the extraction pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory for cached extraction results.
    pub cache_dir: PathBuf,
    /// Cache entries older than this (by file mtime) are treated as misses.
    pub cache_ttl: Duration,
    /// Page navigation timeout.
    pub nav_timeout_ms: u64,
    /// Settle sleep after navigation, before the first (non-waiting) direct
    /// query. The deep-query poll deadline is the real readiness gate; this
    /// may be set to 0.
    pub settle_ms: u64,
    /// Poll deadline for the shadow-DOM deep query on the name field.
    pub name_wait_ms: u64,
    /// Poll deadline for the deep query on developer and logo fields.
    pub field_wait_ms: u64,
    /// Timeout for static-HTML page fetches.
    pub request_timeout_ms: u64,
    /// Timeout for each logo download.
    pub logo_timeout_ms: u64,
    /// Concurrent logo downloads per batch.
    pub logo_concurrency: usize,
    /// User-agent sent by both the browser and plain HTTP requests.
    pub user_agent: String,
    /// Referer sent with logo downloads; the image CDN rejects bare requests.
    pub logo_referer: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let cache_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".appdeck")
            .join("cache");
        Self {
            cache_dir,
            cache_ttl: Duration::from_secs(24 * 3600),
            nav_timeout_ms: 30_000,
            settle_ms: 200,
            name_wait_ms: 3_000,
            field_wait_ms: 2_000,
            request_timeout_ms: 20_000,
            logo_timeout_ms: 10_000,
            logo_concurrency: 5,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                         AppleWebKit/537.36 (KHTML, like Gecko) \
                         Chrome/131.0.0.0 Safari/537.36"
                .to_string(),
            logo_referer: "https://appexchange.salesforce.com/".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.cache_ttl, Duration::from_secs(86_400));
        assert_eq!(cfg.logo_concurrency, 5);
        assert!(cfg.cache_dir.ends_with(".appdeck/cache"));
    }
}
