// Copyright 2026 Appdeck Contributors
// SPDX-License-Identifier: Apache-2.0

//! Listing metadata records and override merging.
//!
//! [`ListingMetadata`] is the unit of pipeline output. Its fields are never
//! empty: a field that could not be extracted carries the
//! [`MANUAL_INPUT_REQUIRED`] sentinel so the consuming layer can prompt for
//! manual input instead of silently dropping the entry.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Sentinel for a field no extraction strategy could fill.
pub const MANUAL_INPUT_REQUIRED: &str = "Manual input required";

/// Name reported when the extraction flow itself blew up (navigation error,
/// browser crash) rather than merely finding nothing.
pub const PARSING_ERROR: &str = "Parsing Error";

/// Default MIME when the logo is absent or unidentifiable.
pub const DEFAULT_LOGO_MIME: &str = "image/png";

/// Final metadata for one listing URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingMetadata {
    /// The listing URL — canonical identifier and cache key.
    pub source_url: String,
    /// Application name, or a sentinel. Never empty.
    pub name: String,
    /// Publisher/developer name, or a sentinel. Never empty.
    pub developer: String,
    /// Raw logo payload. Empty when no logo was found or the download failed.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub logo_bytes: Vec<u8>,
    /// Normalized MIME of `logo_bytes`; [`DEFAULT_LOGO_MIME`] when bytes are empty.
    pub logo_mime: String,
    /// True only if a name was positively extracted (not the sentinel).
    pub success: bool,
}

impl ListingMetadata {
    /// A record representing total extraction failure for `url`.
    pub fn placeholder(url: &str) -> Self {
        Self {
            source_url: url.to_string(),
            name: MANUAL_INPUT_REQUIRED.to_string(),
            developer: MANUAL_INPUT_REQUIRED.to_string(),
            logo_bytes: Vec::new(),
            logo_mime: DEFAULT_LOGO_MIME.to_string(),
            success: false,
        }
    }
}

/// Caller-supplied values for one URL, taking precedence field-by-field over
/// anything the extractors produce.
///
/// A logo may arrive inline (`logo_bytes`) or as a path to a locally supplied
/// image file; the orchestrator reads the file and treats it as bytes.
#[derive(Debug, Clone, Default)]
pub struct ListingOverride {
    pub name: Option<String>,
    pub developer: Option<String>,
    pub logo_bytes: Option<Vec<u8>>,
    pub logo_mime: Option<String>,
    pub logo_path: Option<PathBuf>,
}

impl ListingOverride {
    /// Whether every field is supplied, making extraction unnecessary.
    pub fn is_complete(&self) -> bool {
        self.name.is_some() && self.developer.is_some() && self.has_logo()
    }

    /// Whether a logo source (inline or file) is supplied.
    pub fn has_logo(&self) -> bool {
        self.logo_bytes.is_some() || self.logo_path.is_some()
    }
}

/// Merge override, extracted values, and sentinels into the final record.
///
/// Precedence per field: override > extracted > sentinel. An extracted name
/// only counts toward `success`; an override name alone also marks the record
/// successful since the caller vouched for it.
pub fn merge(
    url: &str,
    override_: Option<&ListingOverride>,
    extracted_name: Option<String>,
    extracted_developer: Option<String>,
    logo_bytes: Vec<u8>,
    logo_mime: String,
    extraction_ok: bool,
) -> ListingMetadata {
    let ovr_name = override_.and_then(|o| o.name.clone());
    let ovr_dev = override_.and_then(|o| o.developer.clone());

    let success = ovr_name.is_some() || extraction_ok;
    let name = ovr_name
        .or(extracted_name)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| MANUAL_INPUT_REQUIRED.to_string());
    let developer = ovr_dev
        .or(extracted_developer)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| MANUAL_INPUT_REQUIRED.to_string());

    let (logo_bytes, logo_mime) = if logo_bytes.is_empty() {
        (Vec::new(), DEFAULT_LOGO_MIME.to_string())
    } else {
        (logo_bytes, logo_mime)
    };

    ListingMetadata {
        source_url: url.to_string(),
        name,
        developer,
        logo_bytes,
        logo_mime,
        success,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_fully_populated() {
        let m = ListingMetadata::placeholder("https://example.test/a");
        assert_eq!(m.name, MANUAL_INPUT_REQUIRED);
        assert_eq!(m.developer, MANUAL_INPUT_REQUIRED);
        assert!(m.logo_bytes.is_empty());
        assert_eq!(m.logo_mime, DEFAULT_LOGO_MIME);
        assert!(!m.success);
    }

    #[test]
    fn override_wins_field_by_field() {
        let ovr = ListingOverride {
            name: Some("Widget X".into()),
            ..Default::default()
        };
        let m = merge(
            "https://example.test/a",
            Some(&ovr),
            Some("Scraped Name".into()),
            Some("Scraped Dev".into()),
            Vec::new(),
            DEFAULT_LOGO_MIME.into(),
            true,
        );
        assert_eq!(m.name, "Widget X");
        assert_eq!(m.developer, "Scraped Dev");
        assert!(m.success);
    }

    #[test]
    fn missing_fields_degrade_to_sentinel() {
        let m = merge(
            "https://example.test/a",
            None,
            None,
            None,
            Vec::new(),
            DEFAULT_LOGO_MIME.into(),
            false,
        );
        assert_eq!(m.name, MANUAL_INPUT_REQUIRED);
        assert_eq!(m.developer, MANUAL_INPUT_REQUIRED);
        assert!(!m.success);
    }

    #[test]
    fn empty_logo_forces_default_mime() {
        let m = merge(
            "https://example.test/a",
            None,
            Some("App".into()),
            None,
            Vec::new(),
            "image/webp".into(),
            true,
        );
        assert_eq!(m.logo_mime, DEFAULT_LOGO_MIME);
    }

    #[test]
    fn override_only_name_still_marks_success() {
        let ovr = ListingOverride {
            name: Some("Hand-entered".into()),
            ..Default::default()
        };
        let m = merge(
            "https://example.test/a",
            Some(&ovr),
            None,
            None,
            Vec::new(),
            DEFAULT_LOGO_MIME.into(),
            false,
        );
        assert!(m.success);
        assert_eq!(m.developer, MANUAL_INPUT_REQUIRED);
    }

    #[test]
    fn complete_override_detection() {
        let mut ovr = ListingOverride {
            name: Some("A".into()),
            developer: Some("B".into()),
            ..Default::default()
        };
        assert!(!ovr.is_complete());
        ovr.logo_path = Some(PathBuf::from("/tmp/logo.png"));
        assert!(ovr.is_complete());
    }
}
