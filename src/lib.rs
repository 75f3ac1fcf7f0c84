// Copyright 2026 Appdeck Contributors
// SPDX-License-Identifier: Apache-2.0

//! Appdeck — listing metadata extraction pipeline.
//!
//! Turns marketplace listing URLs into `(name, developer, logo)` records via
//! a cascading extractor: a headless-Chromium pass that can reach through
//! shadow-DOM boundaries, degrading to a static-HTML pass (CSS selectors,
//! JSON-LD, OpenGraph) when no browser is available. Results are cached on
//! disk and logos are fetched through a bounded worker pool.
//!
//! Every public entry point is total: extraction failure surfaces as a
//! sentinel-filled [`metadata::ListingMetadata`], never as an error.

pub mod batch;
pub mod cache;
pub mod config;
pub mod events;
pub mod extract;
pub mod http;
pub mod logo;
pub mod metadata;
pub mod renderer;
