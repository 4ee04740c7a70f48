//! End-to-end extraction pipeline.
//!
//! Sequences one request: fetch the page (optionally through the
//! rendering collaborator), extract assets and metadata, merge externally
//! discovered URLs, deepen linked stylesheets, rewrite references, and
//! build the archive. The whole run is bounded by an overall timeout;
//! only root-page and archive failures surface to the caller.

use crate::archive::{self, ArchiveHandle};
use crate::classify::{self, AssetCategory};
use crate::error::{ExtractError, FetchError};
use crate::extract::{self, stylesheet};
use crate::fetch::{FetchClient, FetchConfig, FetchedBody};
use crate::renderer::DynamicRenderer;
use crate::rewrite;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Pages smaller than this are treated as unusable error shells.
const MIN_PAGE_BYTES: usize = 100;

/// One extraction request from a caller.
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub url: String,
    /// Use the browser rendering collaborator before falling back to a
    /// plain fetch.
    pub render: bool,
}

/// Result of a completed run.
#[derive(Debug)]
pub struct ExtractOutcome {
    pub archive: ArchiveHandle,
    /// Per-category URL counts discovered on the page.
    pub asset_counts: Vec<(AssetCategory, usize)>,
    /// Concatenated inline script bodies, for callers that analyze them.
    pub inline_scripts: String,
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub fetch: FetchConfig,
    pub out_dir: PathBuf,
    pub overall_timeout: Duration,
    pub render_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            out_dir: std::env::temp_dir().join("sitepack-archives"),
            overall_timeout: Duration::from_secs(180),
            render_timeout: Duration::from_secs(30),
        }
    }
}

/// The orchestrator. Owns the fetch client and the optional renderer;
/// each `run` call owns its inventory for the duration of that request.
pub struct Pipeline {
    fetcher: FetchClient,
    renderer: Option<Arc<dyn DynamicRenderer>>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        renderer: Option<Arc<dyn DynamicRenderer>>,
    ) -> Result<Self, FetchError> {
        let fetcher = FetchClient::new(config.fetch.clone())?;
        Ok(Self {
            fetcher,
            renderer,
            config,
        })
    }

    pub fn out_dir(&self) -> &PathBuf {
        &self.config.out_dir
    }

    /// Run one extraction to a finished archive, bounded by the overall
    /// timeout. On expiry every in-flight operation is dropped and a
    /// typed timeout failure is returned; nothing blocks indefinitely.
    pub async fn run(&self, request: ExtractRequest) -> Result<ExtractOutcome, ExtractError> {
        match tokio::time::timeout(self.config.overall_timeout, self.run_inner(request)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout { retries: 0 }.into()),
        }
    }

    async fn run_inner(&self, request: ExtractRequest) -> Result<ExtractOutcome, ExtractError> {
        let url = normalize_url(&request.url);
        tracing::info!("extraction started: {url}");

        let (html, base_url, discovered) = self.obtain_page(&url, request.render).await?;
        if html.len() < MIN_PAGE_BYTES {
            tracing::warn!("page body too small to be usable ({} bytes)", html.len());
            return Err(ExtractError::ParseFailure);
        }

        let mut page = extract::extract(&html, &base_url)?;

        // Fold in URLs the renderer observed that the static parse missed.
        if !discovered.is_empty() {
            let base = Url::parse(&base_url).map_err(|_| FetchError::InvalidUrl {
                url: base_url.clone(),
            })?;
            let mut merged = 0usize;
            for raw in &discovered {
                if raw.starts_with("data:") {
                    continue;
                }
                let Ok(joined) = base.join(raw) else { continue };
                if !matches!(joined.scheme(), "http" | "https") || joined.host_str().is_none() {
                    continue;
                }
                let resolved = joined.to_string();
                let category = classify::classify(&resolved);
                if page.inventory.push(category, resolved) {
                    merged += 1;
                }
            }
            tracing::info!("merged {merged} renderer-discovered URL(s)");
        }

        // Pull linked stylesheets for nested imports, fonts, and images.
        stylesheet::deepen(&mut page.inventory, &self.fetcher, &base_url).await;

        let asset_counts = page.inventory.category_counts();
        for (category, count) in &asset_counts {
            tracing::debug!("discovered {count} {category} URL(s)");
        }

        let rewritten = rewrite::absolutize(&html, &base_url);
        let archive = archive::build(
            &rewritten,
            &page.inventory,
            &base_url,
            &self.fetcher,
            &self.config.out_dir,
        )
        .await?;

        tracing::info!(
            "extraction finished: {} ({} bytes)",
            archive.filename,
            archive.size_bytes
        );
        Ok(ExtractOutcome {
            archive,
            asset_counts,
            inline_scripts: page.inline_scripts,
        })
    }

    /// Obtain page HTML, its effective base URL, and any renderer-observed
    /// resource URLs. Rendering is best-effort: failures and empty
    /// snapshots fall back to the plain fetch path.
    async fn obtain_page(
        &self,
        url: &str,
        render: bool,
    ) -> Result<(String, String, Vec<String>), ExtractError> {
        if render {
            if let Some(renderer) = &self.renderer {
                match renderer.render(url, self.config.render_timeout).await {
                    Ok(page) if !page.html.trim().is_empty() => {
                        return Ok((page.html, page.final_url, page.discovered_urls));
                    }
                    Ok(_) => {
                        tracing::warn!("renderer returned an empty snapshot, using plain fetch");
                    }
                    Err(e) => {
                        tracing::warn!("rendering failed, using plain fetch: {e}");
                    }
                }
            } else {
                tracing::warn!("rendering requested but no renderer is configured");
            }
        }

        let result = self.fetcher.get(url, None).await?;
        let html = match result.body {
            FetchedBody::Text(t) => t,
            FetchedBody::Binary(_) => {
                tracing::warn!("root URL returned binary content, cannot extract");
                return Err(ExtractError::ParseFailure);
            }
        };
        Ok((html, result.final_url, Vec::new()))
    }
}

/// Prepend a scheme when the caller omitted one.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("example.com"), "https://example.com");
        assert_eq!(normalize_url("  example.com/x "), "https://example.com/x");
        assert_eq!(normalize_url("http://example.com"), "http://example.com");
        assert_eq!(normalize_url("https://example.com"), "https://example.com");
    }

    #[tokio::test]
    async fn test_overall_timeout_is_typed() {
        let config = PipelineConfig {
            overall_timeout: Duration::from_millis(1),
            ..Default::default()
        };
        let pipeline = Pipeline::new(config, None).unwrap();
        // 10.255.255.1 is a blackhole address; the run must abort on the
        // overall timeout rather than hang.
        let err = pipeline
            .run(ExtractRequest {
                url: "http://10.255.255.1/".into(),
                render: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExtractError::Fetch(FetchError::Timeout { .. })
        ));
    }
}
