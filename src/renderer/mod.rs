//! Browser-based dynamic rendering collaborator.
//!
//! Defines the `DynamicRenderer` trait the pipeline consumes. Rendering is
//! strictly best-effort: any error or empty result sends the pipeline back
//! to the plain fetch path. The renderer never shares mutable state with
//! the fetch/extract path; it returns a snapshot and a URL list.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// A fully rendered page snapshot.
#[derive(Debug, Clone, Default)]
pub struct RenderedPage {
    /// Serialized DOM after script execution.
    pub html: String,
    /// Effective URL after any client-side redirects.
    pub final_url: String,
    /// Resource URLs observed while rendering (deduplicated, in
    /// first-seen order).
    pub discovered_urls: Vec<String>,
}

/// A browser engine that can render one page at a time.
#[async_trait]
pub trait DynamicRenderer: Send + Sync {
    /// Render a page within the given timeout.
    async fn render(&self, url: &str, timeout: Duration) -> Result<RenderedPage>;
}

/// Renderer used when no browser is available. Always errors, which the
/// pipeline treats as "fall back to plain fetch".
pub struct NoopRenderer;

#[async_trait]
impl DynamicRenderer for NoopRenderer {
    async fn render(&self, _url: &str, _timeout: Duration) -> Result<RenderedPage> {
        Err(anyhow::anyhow!("browser rendering not available"))
    }
}
