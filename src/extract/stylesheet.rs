//! Stylesheet asset extraction.
//!
//! Pulls `@import` targets, `url(...)` references, and declared font
//! families out of CSS text. References resolve against the stylesheet's
//! own URL, not the page base, so nested imports land in the right place.

use crate::classify::{self, AssetCategory};
use crate::fetch::{FetchClient, FetchedBody};
use crate::inventory::AssetInventory;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use url::Url;

/// Generic family keywords that are never real font families.
pub const GENERIC_FAMILIES: &[&str] = &[
    "serif",
    "sans-serif",
    "monospace",
    "cursive",
    "fantasy",
    "system-ui",
];

/// URLs and font families found in one stylesheet.
#[derive(Debug, Default)]
pub struct StylesheetAssets {
    pub urls: HashMap<AssetCategory, Vec<String>>,
    pub font_families: Vec<String>,
}

struct CssPatterns {
    import_string: Regex,
    import_url: Regex,
    url_token: Regex,
    font_family: Regex,
    google_import: Regex,
}

impl CssPatterns {
    fn new() -> Self {
        Self {
            import_string: Regex::new(r#"@import\s+['"]([^'"]+)['"]"#).unwrap(),
            import_url: Regex::new(r#"@import\s+url\(\s*['"]?([^'")]+?)['"]?\s*\)"#).unwrap(),
            url_token: Regex::new(r#"url\(\s*['"]?([^'")]+?)['"]?\s*\)"#).unwrap(),
            font_family: Regex::new(r"font-family\s*:\s*([^;}]+)").unwrap(),
            google_import: Regex::new(
                r#"@import\s+url\(\s*['"]?(https?://fonts\.googleapis\.com/[^'")]+?)['"]?\s*\)"#,
            )
            .unwrap(),
        }
    }
}

/// Extract every reference from CSS text.
///
/// `source_url` is the URL the stylesheet was loaded from (or the page URL
/// for inline `<style>` blocks). `top_level` marks a linked stylesheet, for
/// which Google Fonts `@import` URLs are additionally recognized; the
/// inventory deduplicates the overlap later.
pub fn extract(css: &str, source_url: &str, top_level: bool) -> StylesheetAssets {
    let mut out = StylesheetAssets::default();
    let base = match Url::parse(source_url) {
        Ok(u) => u,
        Err(_) => return out,
    };
    let patterns = CssPatterns::new();
    let mut seen: HashSet<(AssetCategory, String)> = HashSet::new();

    let push = |out: &mut StylesheetAssets,
                    seen: &mut HashSet<(AssetCategory, String)>,
                    category: AssetCategory,
                    url: String| {
        if seen.insert((category, url.clone())) {
            out.urls.entry(category).or_default().push(url);
        }
    };

    // @import "..." and @import url(...) both feed the css category.
    for caps in patterns
        .import_string
        .captures_iter(css)
        .chain(patterns.import_url.captures_iter(css))
    {
        if let Some(resolved) = resolve(&base, &caps[1]) {
            push(&mut out, &mut seen, AssetCategory::Css, resolved);
        }
    }

    // Every url(...) token, classified by the URL itself.
    for caps in patterns.url_token.captures_iter(css) {
        let raw = caps[1].trim();
        if raw.is_empty() || raw.starts_with("data:") {
            continue;
        }
        if let Some(resolved) = resolve(&base, raw) {
            let category = classify::classify(&resolved);
            push(&mut out, &mut seen, category, resolved);
        }
    }

    // First comma-separated family name per declaration, quotes stripped,
    // generic keywords rejected.
    for caps in patterns.font_family.captures_iter(css) {
        let first = caps[1].split(',').next().unwrap_or("").trim();
        let name = first.trim_matches(|c| c == '\'' || c == '"' || c == '`').trim();
        if name.is_empty() {
            continue;
        }
        if GENERIC_FAMILIES.contains(&name.to_lowercase().as_str()) {
            continue;
        }
        if !out.font_families.iter().any(|f| f.eq_ignore_ascii_case(name)) {
            out.font_families.push(name.to_string());
        }
    }

    if top_level {
        for caps in patterns.google_import.captures_iter(css) {
            push(
                &mut out,
                &mut seen,
                AssetCategory::Css,
                caps[1].to_string(),
            );
        }
    }

    out
}

/// Fetch each linked stylesheet in the inventory and fold its references
/// back in. Failures are logged and skipped; the page archive proceeds
/// without that stylesheet's nested assets.
pub async fn deepen(inventory: &mut AssetInventory, fetcher: &FetchClient, referer: &str) {
    let stylesheet_urls: Vec<String> = inventory.urls(AssetCategory::Css).to_vec();
    for css_url in stylesheet_urls {
        if css_url.starts_with("data:") {
            continue;
        }
        let body = match fetcher.get(&css_url, Some(referer)).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("stylesheet fetch failed, skipping {css_url}: {e}");
                continue;
            }
        };
        let text = match body.body {
            FetchedBody::Text(t) => t,
            FetchedBody::Binary(_) => {
                tracing::debug!("stylesheet served as binary, skipping {css_url}");
                continue;
            }
        };
        let found = extract(&text, &body.final_url, true);
        for (category, urls) in found.urls {
            for u in urls {
                inventory.push(category, u);
            }
        }
        for family in found.font_families {
            inventory.add_font_family(&family);
        }
    }
}

fn resolve(base: &Url, raw: &str) -> Option<String> {
    let joined = base.join(raw.trim()).ok()?;
    match joined.scheme() {
        "http" | "https" => Some(joined.to_string()),
        _ => None,
    }
}
