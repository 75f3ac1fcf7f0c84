// Copyright 2026 Appdeck Contributors
// SPDX-License-Identifier: Apache-2.0

//! Extraction cascade shared types and field cleanup.
//!
//! Both extractor paths (rendered and static) produce an [`Extracted`]
//! triple of raw candidates; cleanup normalizes marketplace branding
//! suffixes and whitespace before the orchestrator merges results.

pub mod rendered;
pub mod static_html;

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;
use url::Url;

/// Raw cascade output for one listing, before sentinel fill.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted {
    pub name: Option<String>,
    pub developer: Option<String>,
    pub logo_url: Option<String>,
}

impl Extracted {
    /// Extraction counts as successful iff a name was found.
    pub fn success(&self) -> bool {
        self.name.as_deref().is_some_and(|n| !n.trim().is_empty())
    }
}

/// Failures internal to an extraction attempt. Always caught at the
/// component boundary and converted into a structured failure result.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("browser unavailable: {0}")]
    BrowserUnavailable(String),
    #[error("navigation failed for {url}: {reason}")]
    Navigation { url: String, reason: String },
    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

fn marketplace_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\s*\|\s*(Salesforce\s+)?AppExchange.*$")
            .expect("suffix regex is valid")
    })
}

fn salesforce_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\s*\|\s*.*Salesforce.*$").expect("salesforce suffix regex is valid")
    })
}

fn salesforce_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*Salesforce\s*-?\s*").expect("prefix regex is valid"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex is valid"))
}

/// Normalize an extracted application name.
///
/// Strips trailing `| AppExchange` / `| ... Salesforce ...` branding and a
/// leading `Salesforce -` prefix, then collapses whitespace runs. Returns
/// `None` when nothing remains.
pub fn clean_name(raw: &str) -> Option<String> {
    let s = marketplace_suffix_re().replace(raw, "");
    let s = salesforce_suffix_re().replace(&s, "");
    let s = salesforce_prefix_re().replace(&s, "");
    let s = whitespace_re().replace_all(s.trim(), " ").into_owned();
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Normalize an extracted developer/publisher name.
///
/// Historical page variants render either `TaskRay` or `By TaskRay`; the
/// pipeline stores the bare publisher name.
pub fn clean_developer(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let stripped = trimmed
        .strip_prefix("By ")
        .or_else(|| trimmed.strip_prefix("by "))
        .unwrap_or(trimmed);
    let s = whitespace_re().replace_all(stripped.trim(), " ").into_owned();
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Resolve a discovered logo URL to an absolute `https` URL.
///
/// Protocol-relative `//host/path` becomes `https://host/path`; site-relative
/// paths resolve against the listing URL. Anything else non-absolute is
/// discarded.
pub fn normalize_logo_url(raw: &str, listing_url: &str) -> Option<String> {
    let src = raw.trim();
    if src.is_empty() {
        return None;
    }
    if let Some(rest) = src.strip_prefix("//") {
        return Some(format!("https://{rest}"));
    }
    if src.starts_with("http://") || src.starts_with("https://") {
        return Some(src.to_string());
    }
    if src.starts_with('/') {
        if let Ok(base) = Url::parse(listing_url) {
            if let Ok(joined) = base.join(src) {
                return Some(joined.to_string());
            }
        }
    }
    None
}
