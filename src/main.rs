// Copyright 2026 Appdeck Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result};
use appdeck::batch::BatchOrchestrator;
use appdeck::cache::MetadataCache;
use appdeck::config::PipelineConfig;
use appdeck::metadata::ListingMetadata;
use appdeck::renderer::chromium::{find_chromium, LazyChromiumRenderer};
use appdeck::renderer::{NoopRenderer, Renderer};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "appdeck",
    about = "Extract name, developer, and logo from marketplace listings",
    version,
    after_help = "Run 'appdeck <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch metadata for one or more listing URLs
    Fetch {
        /// Listing URLs to process
        #[arg(required = true)]
        urls: Vec<String>,
        /// Skip the browser and use the static-HTML extractor only
        #[arg(long)]
        no_browser: bool,
        /// Ignore cached entries and re-extract
        #[arg(long)]
        fresh: bool,
        /// Write fetched logos into this directory
        #[arg(long)]
        logo_dir: Option<PathBuf>,
        /// Navigation timeout in milliseconds
        #[arg(long, default_value = "30000")]
        timeout: u64,
        /// Parallel logo downloads
        #[arg(long, default_value = "5")]
        concurrency: usize,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Manage the metadata cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Remove every cached entry
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "appdeck=debug"
    } else {
        "appdeck=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_level.parse().context("bad log directive")?),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Fetch {
            urls,
            no_browser,
            fresh,
            logo_dir,
            timeout,
            concurrency,
        } => {
            run_fetch(
                &urls,
                no_browser,
                fresh,
                logo_dir.as_deref(),
                timeout,
                concurrency,
                cli.json,
            )
            .await
        }
        Commands::Doctor => run_doctor(),
        Commands::Cache { action } => match action {
            CacheAction::Clear => run_cache_clear(),
        },
    }
}

async fn run_fetch(
    urls: &[String],
    no_browser: bool,
    fresh: bool,
    logo_dir: Option<&Path>,
    timeout: u64,
    concurrency: usize,
    json: bool,
) -> Result<()> {
    let mut cfg = PipelineConfig::default();
    cfg.nav_timeout_ms = timeout;
    cfg.logo_concurrency = concurrency.max(1);
    if fresh {
        // Zero TTL makes every cached entry stale; writes still refresh it.
        cfg.cache_ttl = std::time::Duration::ZERO;
    }

    // The browser process starts only when the first URL actually needs a
    // rendered extraction; a fully-cached batch never launches one.
    let renderer: Arc<dyn Renderer> = if no_browser {
        info!("browser disabled, static-HTML extraction only");
        Arc::new(NoopRenderer)
    } else {
        Arc::new(LazyChromiumRenderer::new(&cfg.user_agent))
    };

    let orchestrator = BatchOrchestrator::new(cfg, renderer.clone())?;
    let results = orchestrator.run(urls, &HashMap::new()).await;
    renderer.shutdown().await.ok();

    if let Some(dir) = logo_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create logo directory {}", dir.display()))?;
    }

    let mut any_failed = false;
    let mut json_out = serde_json::Map::new();
    for url in urls {
        let Some(record) = results.get(url) else {
            continue;
        };
        let logo_path = match logo_dir {
            Some(dir) if !record.logo_bytes.is_empty() => {
                let path = dir.join(logo_file_name(url, &record.logo_mime));
                std::fs::write(&path, &record.logo_bytes)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                Some(path)
            }
            _ => None,
        };
        if !record.success {
            any_failed = true;
        }
        if json {
            json_out.insert(url.clone(), record_json(record, logo_path.as_deref()));
        } else {
            print_record(record, logo_path.as_deref());
        }
    }
    if json {
        println!("{}", serde_json::Value::Object(json_out));
    }

    if any_failed {
        std::process::exit(1);
    }
    Ok(())
}

fn record_json(record: &ListingMetadata, logo_path: Option<&Path>) -> serde_json::Value {
    serde_json::json!({
        "name": record.name,
        "developer": record.developer,
        "logo_mime": record.logo_mime,
        "logo_bytes": record.logo_bytes.len(),
        "logo_path": logo_path.map(|p| p.display().to_string()),
        "success": record.success,
    })
}

fn print_record(record: &ListingMetadata, logo_path: Option<&Path>) {
    let status = if record.success { "ok" } else { "FAILED" };
    println!("[{status}] {}", record.source_url);
    println!("  name:      {}", record.name);
    println!("  developer: {}", record.developer);
    match logo_path {
        Some(p) => println!(
            "  logo:      {} ({} bytes, {})",
            p.display(),
            record.logo_bytes.len(),
            record.logo_mime
        ),
        None if !record.logo_bytes.is_empty() => println!(
            "  logo:      {} bytes, {}",
            record.logo_bytes.len(),
            record.logo_mime
        ),
        None => println!("  logo:      (none)"),
    }
}

/// Derive a stable logo file name from the listing URL's last path segment.
fn logo_file_name(url: &str, mime: &str) -> String {
    let ext = match mime {
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        _ => "png",
    };
    let stem: String = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("logo")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(64)
        .collect();
    let stem = if stem.is_empty() { "logo".to_string() } else { stem };
    format!("{stem}.{ext}")
}

fn run_doctor() -> Result<()> {
    println!("Appdeck Doctor");
    println!("==============");
    println!();

    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    let chromium = find_chromium();
    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install Chrome/Chromium or set APPDECK_CHROMIUM_PATH.\n     Extraction will fall back to static HTML."
        ),
    }

    let cfg = PipelineConfig::default();
    match std::fs::create_dir_all(&cfg.cache_dir) {
        Ok(()) => println!("[OK] Cache directory writable: {}", cfg.cache_dir.display()),
        Err(e) => println!(
            "[!!] Cache directory not writable: {} ({e})",
            cfg.cache_dir.display()
        ),
    }

    println!();
    if chromium.is_some() {
        println!("Status: READY");
    } else {
        println!("Status: DEGRADED (static-HTML extraction only)");
    }
    Ok(())
}

fn run_cache_clear() -> Result<()> {
    let cfg = PipelineConfig::default();
    let cache = MetadataCache::new(cfg.cache_dir, cfg.cache_ttl)?;
    let removed = cache.clear()?;
    println!("Removed {removed} cached entries.");
    Ok(())
}
