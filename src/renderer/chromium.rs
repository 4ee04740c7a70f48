//! Chromium-based renderer using chromiumoxide.

use super::{DynamicRenderer, RenderedPage};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Scroll passes used to trigger lazy loading.
const SCROLL_STEPS: u32 = 12;

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. SITEPACK_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("SITEPACK_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.sitepack/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".sitepack/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".sitepack/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".sitepack/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".sitepack/chromium/chrome-linux64/chrome"),
                home.join(".sitepack/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Chromium-based renderer.
pub struct ChromiumRenderer {
    browser: Browser,
}

impl ChromiumRenderer {
    /// Launch a headless Chromium instance with anti-automation-detection
    /// arguments, matching what scripted sites expect from a real browser.
    pub async fn new() -> Result<Self> {
        let chrome_path = find_chromium()
            .context("Chromium not found; set SITEPACK_CHROMIUM_PATH or install google-chrome")?;

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--window-size=1920,1080")
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // Drain CDP events for the life of the browser.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(Self { browser })
    }

    async fn eval_strings(page: &Page, script: &str) -> Vec<String> {
        match page.evaluate(script).await {
            Ok(result) => result.into_value::<Vec<String>>().unwrap_or_default(),
            Err(e) => {
                tracing::debug!("render harvest script failed: {e}");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl DynamicRenderer for ChromiumRenderer {
    async fn render(&self, url: &str, timeout: Duration) -> Result<RenderedPage> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to create page")?;

        let result = render_on(&page, url, timeout).await;
        let _ = page.close().await;
        result
    }
}

async fn render_on(page: &Page, url: &str, timeout: Duration) -> Result<RenderedPage> {
    match tokio::time::timeout(timeout, page.goto(url)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => bail!("navigation failed: {e}"),
        Err(_) => bail!("navigation timed out after {}ms", timeout.as_millis()),
    }
    let _ = page.wait_for_navigation().await;

    // Kill animations so the snapshot settles quickly.
    let _ = page
        .evaluate(
            r#"(() => {
                const style = document.createElement('style');
                style.innerHTML = '* { animation-duration: 0.001s !important; transition-duration: 0.001s !important; }';
                document.head.appendChild(style);
            })()"#,
        )
        .await;

    let mut discovered: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut push_all = |urls: Vec<String>, discovered: &mut Vec<String>| {
        for u in urls {
            if !u.is_empty() && seen.insert(u.clone()) {
                discovered.push(u);
            }
        }
    };

    // Scroll through the page in steps so lazy-loaded resources appear,
    // harvesting resource URLs after each step.
    for step in 0..=SCROLL_STEPS {
        let _ = page
            .evaluate(format!(
                "window.scrollTo(0, document.body.scrollHeight * {step} / {SCROLL_STEPS});"
            ))
            .await;
        tokio::time::sleep(Duration::from_millis(250)).await;

        let urls = ChromiumRenderer::eval_strings(
            page,
            r#"(() => {
                const out = [];
                document.querySelectorAll('link[rel="stylesheet"], link[as="style"]').forEach(el => { if (el.href) out.push(el.href); });
                document.querySelectorAll('script[src]').forEach(el => { if (el.src) out.push(el.src); });
                document.querySelectorAll('img[src]').forEach(el => { if (el.src && !el.src.startsWith('data:')) out.push(el.src); });
                return out;
            })()"#,
        )
        .await;
        push_all(urls, &mut discovered);
    }
    let _ = page.evaluate("window.scrollTo(0, 0);").await;

    // Framework bundles are often injected after hydration.
    let framework_urls = ChromiumRenderer::eval_strings(
        page,
        r#"(() => {
            const out = [];
            const selectors = [
                'script[src*="_next"]', 'script[src*="chunk"]', 'script[src*="webpack"]',
                'script[src*="runtime"]', 'script[src*="polyfills"]', 'script[src*="main"]',
            ];
            for (const sel of selectors) {
                document.querySelectorAll(sel).forEach(el => { if (el.src) out.push(el.src); });
            }
            return out;
        })()"#,
    )
    .await;
    push_all(framework_urls, &mut discovered);

    let html: String = page
        .evaluate("document.documentElement.outerHTML")
        .await
        .context("failed to capture rendered HTML")?
        .into_value()
        .map_err(|e| anyhow::anyhow!("failed to convert HTML result: {e:?}"))?;

    let final_url = page
        .url()
        .await
        .unwrap_or_default()
        .map(|u| u.to_string())
        .unwrap_or_else(|| url.to_string());

    tracing::info!(
        "rendered {url}: {} bytes, {} resource URL(s) observed",
        html.len(),
        discovered.len()
    );

    Ok(RenderedPage {
        html,
        final_url,
        discovered_urls: discovered,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_render_data_url() {
        let renderer = ChromiumRenderer::new().await.expect("failed to launch");
        let page = renderer
            .render(
                "data:text/html,<h1>Hello</h1><img src=\"https://ex.com/a.png\">",
                Duration::from_secs(10),
            )
            .await
            .expect("render failed");
        assert!(page.html.contains("<h1>Hello</h1>"));
    }
}
