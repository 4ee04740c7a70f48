// Copyright 2026 Sitepack Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use sitepack::fetch::FetchConfig;
use sitepack::pipeline::{ExtractRequest, Pipeline, PipelineConfig};
use sitepack::renderer::chromium::ChromiumRenderer;
use sitepack::renderer::DynamicRenderer;
use sitepack::server::{self, SharedState};

#[derive(Parser)]
#[command(
    name = "sitepack",
    about = "Sitepack — archive a web page and its assets into a self-contained zip",
    version
)]
struct Cli {
    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP extraction server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "5001")]
        port: u16,
        /// Launch a headless browser for dynamic rendering requests
        #[arg(long)]
        render: bool,
        /// Directory where finished archives are written
        #[arg(long)]
        out: Option<PathBuf>,
        /// Re-enable TLS certificate verification (disabled by default to
        /// maximize retrieval against misconfigured sites)
        #[arg(long)]
        verify_tls: bool,
    },
    /// Archive a single page from the command line
    Grab {
        /// Page URL (scheme optional, https assumed)
        url: String,
        /// Render the page in a headless browser first
        #[arg(long)]
        render: bool,
        /// Directory where the archive is written
        #[arg(long)]
        out: Option<PathBuf>,
        /// Re-enable TLS certificate verification
        #[arg(long)]
        verify_tls: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "sitepack=debug"
    } else if cli.quiet {
        "sitepack=error"
    } else {
        "sitepack=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let result = match cli.command {
        Commands::Serve {
            port,
            render,
            out,
            verify_tls,
        } => run_serve(port, render, out, verify_tls).await,
        Commands::Grab {
            url,
            render,
            out,
            verify_tls,
        } => run_grab(url, render, out, verify_tls, cli.quiet).await,
    };

    if let Err(e) = &result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    result
}

fn build_config(out: Option<PathBuf>, verify_tls: bool) -> PipelineConfig {
    let mut config = PipelineConfig {
        fetch: FetchConfig {
            accept_invalid_certs: !verify_tls,
            ..FetchConfig::default()
        },
        ..PipelineConfig::default()
    };
    if let Some(dir) = out.or_else(|| std::env::var("SITEPACK_OUT_DIR").ok().map(PathBuf::from)) {
        config.out_dir = dir;
    }
    config
}

/// Launch the browser renderer, or None when Chromium is unavailable.
async fn build_renderer(wanted: bool) -> Option<Arc<dyn DynamicRenderer>> {
    if !wanted {
        return None;
    }
    match ChromiumRenderer::new().await {
        Ok(renderer) => Some(Arc::new(renderer) as Arc<dyn DynamicRenderer>),
        Err(e) => {
            tracing::warn!("browser rendering unavailable, requests fall back to plain fetch: {e}");
            None
        }
    }
}

async fn run_serve(
    port: u16,
    render: bool,
    out: Option<PathBuf>,
    verify_tls: bool,
) -> Result<()> {
    let config = build_config(out, verify_tls);
    let renderer = build_renderer(render).await;
    let pipeline = Pipeline::new(config, renderer)?;
    let state = Arc::new(SharedState { pipeline });
    server::start(port, state).await
}

async fn run_grab(
    url: String,
    render: bool,
    out: Option<PathBuf>,
    verify_tls: bool,
    quiet: bool,
) -> Result<()> {
    let config = build_config(out.or_else(|| Some(PathBuf::from("."))), verify_tls);
    let renderer = build_renderer(render).await;
    let pipeline = Pipeline::new(config, renderer)?;

    let spinner = if quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new_spinner();
        bar.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
        bar.set_message(format!("Archiving {url}"));
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    };

    let outcome = pipeline.run(ExtractRequest { url, render }).await;
    spinner.finish_and_clear();

    let outcome = outcome?;
    println!("{}", outcome.archive.path.display());
    if !quiet {
        for (category, count) in &outcome.asset_counts {
            println!("  {category}: {count}");
        }
        println!("  total: {} bytes", outcome.archive.size_bytes);
    }
    Ok(())
}
