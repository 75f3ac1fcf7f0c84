//! Static-HTML extraction cascade — the no-browser fallback.
//!
//! Fetches raw HTML over plain HTTP and applies an ordered, declarative
//! strategy table per field. Each strategy is a pure
//! `fn(&Html) -> Option<String>` tried in sequence: CSS selectors covering
//! the site's historical markup variants, then structured data (JSON-LD and
//! inline-script JSON globals), then OpenGraph/Twitter/meta-description
//! heuristics. The selector lists accumulate because the marketplace has
//! shipped several incompatible markups over the years; old entries are
//! kept since cached pages and mirrors still serve them.

use super::{clean_developer, clean_name, normalize_logo_url, ExtractError, Extracted};
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

/// Title selectors, newest markup first.
const NAME_SELECTORS: &[&str] = &[
    ".listing-title h1",
    r#"h1[data-test-id="listing-title"]"#,
    r#"[data-testid="listing-title"]"#,
    "h1.listing-header__title",
    ".app-title",
    ".page-header h1",
];

/// Publisher selectors, newest markup first.
const DEVELOPER_SELECTORS: &[&str] = &[
    ".listing-title p",
    r#"[data-test-id="listing-publisher"]"#,
    r#"[data-testid="listing-publisher"]"#,
    ".listing-header__publisher",
    ".app-publisher",
    ".publisher-name",
];

/// Logo image selectors, newest markup first.
const LOGO_SELECTORS: &[&str] = &[
    ".listing-logo img",
    "img.ads-image",
    r#"[data-test-id="listing-logo"] img"#,
    r#"[data-testid="listing-logo"] img"#,
    ".summary img",
];

/// Attributes that may carry the image URL on lazy-loaded markup.
const IMAGE_ATTRS: &[&str] = &["src", "data-src", "data-original", "data-lazy"];

/// Bound on JSON-LD / inline-JSON recursion; the site has shipped
/// pathologically nested payloads.
const JSON_SEARCH_DEPTH: usize = 5;

type Strategy = fn(&Html) -> Option<String>;

const NAME_STRATEGIES: &[(&str, Strategy)] = &[
    ("css-selector", name_from_selectors as Strategy),
    ("json-ld", name_from_jsonld as Strategy),
    ("inline-json", name_from_inline_scripts as Strategy),
    ("og-title", name_from_opengraph as Strategy),
];

const DEVELOPER_STRATEGIES: &[(&str, Strategy)] = &[
    ("css-selector", developer_from_selectors as Strategy),
    ("json-ld", developer_from_jsonld as Strategy),
    ("inline-json", developer_from_inline_scripts as Strategy),
    ("twitter-data1", developer_from_twitter as Strategy),
    ("meta-description", developer_from_description as Strategy),
];

const LOGO_STRATEGIES: &[(&str, Strategy)] = &[
    ("css-selector", logo_from_selectors as Strategy),
    ("json-ld", logo_from_jsonld as Strategy),
    ("inline-json", logo_from_inline_scripts as Strategy),
    ("og-image", logo_from_opengraph as Strategy),
];

/// Fetch `url` over plain HTTP and run the extraction cascade on the body.
///
/// A non-2xx status or transport error is an [`ExtractError`]; the caller
/// converts it into the structured failure record.
pub async fn fetch_and_extract(
    client: &reqwest::Client,
    url: &str,
    timeout_ms: u64,
) -> Result<Extracted, ExtractError> {
    let request = client
        .get(url)
        .header(
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        )
        .header("Accept-Language", "en-US,en;q=0.5")
        .timeout(std::time::Duration::from_millis(timeout_ms));
    let resp = crate::http::send_with_retry(request)
        .await
        .map_err(|e| ExtractError::Transport(e.into()))?;

    let status = resp.status().as_u16();
    if !(200..300).contains(&status) {
        return Err(ExtractError::HttpStatus {
            url: url.to_string(),
            status,
        });
    }

    let body = resp
        .text()
        .await
        .map_err(|e| ExtractError::Transport(e.into()))?;
    Ok(extract_from_html(&body, url))
}

/// Run the per-field strategy tables over raw HTML. Pure and synchronous;
/// `scraper` documents are `!Send`, so no awaits happen while one is alive.
pub fn extract_from_html(html: &str, listing_url: &str) -> Extracted {
    let doc = Html::parse_document(html);

    let name = run_strategies(&doc, "name", NAME_STRATEGIES);
    let developer = run_strategies(&doc, "developer", DEVELOPER_STRATEGIES);
    let logo = run_strategies(&doc, "logo", LOGO_STRATEGIES);

    Extracted {
        name: name.as_deref().and_then(clean_name),
        developer: developer.as_deref().and_then(clean_developer),
        logo_url: logo.as_deref().and_then(|l| normalize_logo_url(l, listing_url)),
    }
}

fn run_strategies(doc: &Html, field: &str, strategies: &[(&str, Strategy)]) -> Option<String> {
    for (label, strategy) in strategies {
        if let Some(value) = strategy(doc) {
            debug!(field, strategy = label, "static extraction hit");
            return Some(value);
        }
    }
    None
}

fn sel(s: &str) -> Selector {
    Selector::parse(s).expect("selector is valid")
}

fn first_text(doc: &Html, selectors: &[&str]) -> Option<String> {
    for s in selectors {
        if let Some(el) = doc.select(&sel(s)).next() {
            let text: String = el.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

fn meta_content(doc: &Html, selector: &str) -> Option<String> {
    doc.select(&sel(selector))
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// ── CSS selector strategies ─────────────────────────────────────────────────

fn name_from_selectors(doc: &Html) -> Option<String> {
    first_text(doc, NAME_SELECTORS)
}

fn developer_from_selectors(doc: &Html) -> Option<String> {
    first_text(doc, DEVELOPER_SELECTORS)
}

fn logo_from_selectors(doc: &Html) -> Option<String> {
    for s in LOGO_SELECTORS {
        if let Some(el) = doc.select(&sel(s)).next() {
            for attr in IMAGE_ATTRS {
                if let Some(src) = el.value().attr(attr) {
                    if !src.trim().is_empty() {
                        return Some(src.trim().to_string());
                    }
                }
            }
        }
    }
    None
}

// ── Structured-data strategies ──────────────────────────────────────────────

/// One name/developer/image record recovered from a JSON payload.
#[derive(Debug, Default, Clone, PartialEq)]
struct JsonRecord {
    name: Option<String>,
    developer: Option<String>,
    image: Option<String>,
}

impl JsonRecord {
    fn is_useful(&self) -> bool {
        self.name.is_some()
    }
}

fn name_from_jsonld(doc: &Html) -> Option<String> {
    jsonld_record(doc)?.name
}

fn developer_from_jsonld(doc: &Html) -> Option<String> {
    jsonld_record(doc)?.developer
}

fn logo_from_jsonld(doc: &Html) -> Option<String> {
    jsonld_record(doc)?.image
}

fn name_from_inline_scripts(doc: &Html) -> Option<String> {
    inline_script_record(doc)?.name
}

fn developer_from_inline_scripts(doc: &Html) -> Option<String> {
    inline_script_record(doc)?.developer
}

fn logo_from_inline_scripts(doc: &Html) -> Option<String> {
    inline_script_record(doc)?.image
}

fn jsonld_record(doc: &Html) -> Option<JsonRecord> {
    for el in doc.select(&sel(r#"script[type="application/ld+json"]"#)) {
        let text = el.inner_html();
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<Value>(text) {
            if let Some(record) = search_json(&value, 0) {
                return Some(record);
            }
        }
    }
    None
}

/// Known global-variable assignment patterns inside inline `<script>` bodies.
fn inline_json_patterns() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r"(?s)window\.__INITIAL_STATE__\s*=\s*(\{.+?\});",
            r"(?s)window\.__APP_DATA__\s*=\s*(\{.+?\});",
            r"(?s)__NEXT_DATA__\s*=\s*(\{.+?\})",
            r"(?s)window\.pageData\s*=\s*(\{.+?\});",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("inline-json regex is valid"))
        .collect()
    })
}

fn inline_script_record(doc: &Html) -> Option<JsonRecord> {
    let script_sel = sel("script:not([type]), script[type=\"text/javascript\"]");
    for el in doc.select(&script_sel) {
        let body = el.inner_html();
        for re in inline_json_patterns() {
            // The lazy `.+?` can under-match nested braces; the parse check
            // below rejects truncated captures.
            if let Some(cap) = re.captures(&body) {
                if let Ok(value) = serde_json::from_str::<Value>(&cap[1]) {
                    if let Some(record) = search_json(&value, 0) {
                        return Some(record);
                    }
                }
            }
        }
    }
    None
}

/// Depth-first search for sibling `name`+`publisher` or `title`+`developer`
/// key pairs, bounded at [`JSON_SEARCH_DEPTH`].
fn search_json(value: &Value, depth: usize) -> Option<JsonRecord> {
    if depth > JSON_SEARCH_DEPTH {
        return None;
    }
    match value {
        Value::Object(map) => {
            let name_pub = pair_record(map, "name", "publisher", &["logoUrl", "logo", "image"]);
            if let Some(r) = name_pub {
                return Some(r);
            }
            let title_dev = pair_record(map, "title", "developer", &["imageUrl", "image"]);
            if let Some(r) = title_dev {
                return Some(r);
            }
            for v in map.values() {
                if let Some(r) = search_json(v, depth + 1) {
                    if r.is_useful() {
                        return Some(r);
                    }
                }
            }
            None
        }
        Value::Array(items) => items
            .iter()
            .find_map(|item| search_json(item, depth + 1).filter(JsonRecord::is_useful)),
        _ => None,
    }
}

fn pair_record(
    map: &serde_json::Map<String, Value>,
    name_key: &str,
    dev_key: &str,
    image_keys: &[&str],
) -> Option<JsonRecord> {
    let name = map.get(name_key).and_then(json_string)?;
    let developer = map.get(dev_key).and_then(json_name_or_string)?;
    let image = image_keys
        .iter()
        .find_map(|k| map.get(*k).and_then(json_image_url));
    Some(JsonRecord {
        name: Some(name),
        developer: Some(developer),
        image,
    })
}

fn json_string(v: &Value) -> Option<String> {
    v.as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Publisher values appear both as bare strings and as `{"name": ...}`
/// organization objects.
fn json_name_or_string(v: &Value) -> Option<String> {
    json_string(v).or_else(|| v.get("name").and_then(json_string))
}

/// Image values appear both as bare strings and as `{"url": ...}` objects.
fn json_image_url(v: &Value) -> Option<String> {
    json_string(v).or_else(|| v.get("url").and_then(json_string))
}

// ── Meta-tag strategies ─────────────────────────────────────────────────────

fn name_from_opengraph(doc: &Html) -> Option<String> {
    let content = meta_content(doc, r#"meta[property="og:title"]"#)?;
    let first = content.split('|').next().unwrap_or(&content).trim();
    if first.is_empty() {
        None
    } else {
        Some(first.to_string())
    }
}

fn developer_from_twitter(doc: &Html) -> Option<String> {
    meta_content(doc, r#"meta[name="twitter:data1"]"#)
}

fn by_phrase_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bBy\s+([^,.|]+)").expect("by-phrase regex is valid"))
}

/// Last resort for the developer: a "By <Name>" phrase inside the page
/// description.
fn developer_from_description(doc: &Html) -> Option<String> {
    let description = meta_content(doc, r#"meta[name="description"]"#)
        .or_else(|| meta_content(doc, r#"meta[property="og:description"]"#))?;
    by_phrase_re()
        .captures(&description)
        .map(|cap| cap[1].trim().to_string())
        .filter(|s| !s.is_empty())
}

fn logo_from_opengraph(doc: &Html) -> Option<String> {
    meta_content(doc, r#"meta[property="og:image"]"#)
}
