//! Markup asset extraction.
//!
//! Parses a page and produces every referenced sub-resource URL, the page
//! metadata, and a structural inventory of notable UI fragments. Each
//! extraction phase is independent: a malformed item in one phase is
//! logged and skipped, never aborting the others. All discovered relative
//! URLs resolve against the page base; only absolute http/https results
//! are kept, and `data:` URIs are dropped from the download set.

pub mod components;
pub mod stylesheet;

use crate::classify::{self, AssetCategory};
use crate::error::{ExtractError, FetchError};
use crate::inventory::{AssetInventory, PageMetadata};
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use url::Url;

/// Separator between concatenated inline script bodies.
const INLINE_SCRIPT_SEPARATOR: &str = "\n\n/* --- inline scripts --- */\n\n";

/// Everything extracted from one page.
#[derive(Debug, Default)]
pub struct ExtractedPage {
    pub inventory: AssetInventory,
    /// Concatenated bodies of all src-less `<script>` elements.
    pub inline_scripts: String,
}

/// Extract assets, metadata, and components from page HTML.
pub fn extract(html: &str, base_url: &str) -> Result<ExtractedPage, ExtractError> {
    let document = parse_lenient(html).ok_or(ExtractError::ParseFailure)?;
    let base = Url::parse(base_url).map_err(|_| FetchError::InvalidUrl {
        url: base_url.to_string(),
    })?;

    let mut page = ExtractedPage::default();

    // Metadata first; the remaining phases are order-insensitive.
    page.inventory.metadata = extract_metadata(&document, &base);
    extract_stylesheet_links(&document, &base, &mut page.inventory);
    extract_inline_styles(&document, &base, &mut page.inventory);
    extract_scripts(&document, &base, &mut page.inventory);
    extract_images(&document, &base, &mut page.inventory);
    extract_favicons(&document, &base, &mut page.inventory);
    extract_media(&document, &base, &mut page.inventory);
    extract_iframes(&document, &base, &mut page.inventory);
    extract_next_data(&document, &base, &mut page.inventory);
    page.inventory.components = components::capture(&document);
    page.inline_scripts = collect_inline_scripts(&document);

    // Heavily script-driven pages often reference everything from JS.
    // When the DOM walk comes up nearly empty, harvest asset-looking
    // string literals from the raw markup as a fallback.
    if page.inventory.total_urls() < 5 {
        scan_script_literals(html, &base, &mut page.inventory);
    }

    Ok(page)
}

/// Parse permissively. Strict document parsing first; if that yields no
/// element content, retry as a fragment. `None` means both were unusable.
fn parse_lenient(html: &str) -> Option<Html> {
    if html.trim().is_empty() {
        return None;
    }
    let any = Selector::parse("*").unwrap();
    let document = Html::parse_document(html);
    if document.select(&any).next().is_some() {
        return Some(document);
    }
    let fragment = Html::parse_fragment(html);
    if fragment.select(&any).next().is_some() {
        return Some(fragment);
    }
    None
}

fn resolve(base: &Url, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("data:") {
        return None;
    }
    let joined = base.join(raw).ok()?;
    match joined.scheme() {
        "http" | "https" => Some(joined.to_string()),
        _ => None,
    }
}

// ── Metadata ────────────────────────────────────────────────────

fn extract_metadata(document: &Html, base: &Url) -> PageMetadata {
    let mut meta = PageMetadata::default();

    let title_sel = Selector::parse("title").unwrap();
    if let Some(el) = document.select(&title_sel).next() {
        meta.title = el.text().collect::<String>().trim().to_string();
    }

    let meta_sel = Selector::parse("meta").unwrap();
    for el in document.select(&meta_sel) {
        let content = el.value().attr("content").unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }
        if let Some(name) = el.value().attr("name") {
            if name == "description" {
                meta.description = content.to_string();
            } else if name == "keywords" {
                meta.keywords = content.to_string();
            } else if let Some(key) = name.strip_prefix("twitter:") {
                // Later duplicates overwrite earlier ones.
                meta.twitter_cards
                    .insert(key.to_string(), Value::String(content.to_string()));
            }
        }
        if let Some(property) = el.value().attr("property") {
            if let Some(key) = property.strip_prefix("og:") {
                meta.og_tags
                    .insert(key.to_string(), Value::String(content.to_string()));
            }
        }
    }

    let canonical_sel = Selector::parse(r#"link[rel="canonical"]"#).unwrap();
    if let Some(el) = document.select(&canonical_sel).next() {
        if let Some(resolved) = el.value().attr("href").and_then(|h| resolve(base, h)) {
            meta.canonical = resolved;
        }
    }

    let html_sel = Selector::parse("html").unwrap();
    if let Some(el) = document.select(&html_sel).next() {
        if let Some(lang) = el.value().attr("lang") {
            meta.language = lang.to_string();
        }
    }

    let favicon_sel = Selector::parse(r#"link[rel="icon"], link[rel="shortcut icon"]"#).unwrap();
    if let Some(el) = document.select(&favicon_sel).next() {
        if let Some(resolved) = el.value().attr("href").and_then(|h| resolve(base, h)) {
            meta.favicon = resolved;
        }
    }

    let jsonld_sel = Selector::parse(r#"script[type="application/ld+json"]"#).unwrap();
    for el in document.select(&jsonld_sel) {
        let text = el.inner_html();
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(text) {
            Ok(value) => meta.structured_data.push(value),
            Err(e) => tracing::debug!("skipping malformed JSON-LD block: {e}"),
        }
    }

    meta
}

// ── Stylesheets ─────────────────────────────────────────────────

fn extract_stylesheet_links(document: &Html, base: &Url, inventory: &mut AssetInventory) {
    let sel = Selector::parse(
        r#"link[rel="stylesheet"], link[rel="preload"][as="style"], link[data-n-g], link[data-n-p]"#,
    )
    .unwrap();
    for el in document.select(&sel) {
        if let Some(resolved) = el.value().attr("href").and_then(|h| resolve(base, h)) {
            inventory.push(AssetCategory::Css, resolved);
        }
    }
}

fn extract_inline_styles(document: &Html, base: &Url, inventory: &mut AssetInventory) {
    let sel = Selector::parse("style").unwrap();
    for el in document.select(&sel) {
        let css = el.text().collect::<String>();
        if css.trim().is_empty() {
            continue;
        }
        let found = stylesheet::extract(&css, base.as_str(), false);
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

// ── Scripts ─────────────────────────────────────────────────────

fn extract_scripts(document: &Html, base: &Url, inventory: &mut AssetInventory) {
    // Covers both classic and type="module" scripts.
    let sel = Selector::parse("script[src]").unwrap();
    for el in document.select(&sel) {
        if let Some(resolved) = el.value().attr("src").and_then(|s| resolve(base, s)) {
            inventory.push(AssetCategory::Js, resolved);
        }
    }
}

fn collect_inline_scripts(document: &Html) -> String {
    let sel = Selector::parse("script").unwrap();
    let mut bodies: Vec<String> = Vec::new();
    for el in document.select(&sel) {
        if el.value().attr("src").is_some() {
            continue;
        }
        if el.value().attr("type") == Some("application/ld+json") {
            continue;
        }
        let body = el.inner_html();
        let body = body.trim();
        if !body.is_empty() {
            bodies.push(body.to_string());
        }
    }
    bodies.join(INLINE_SCRIPT_SEPARATOR)
}

// ── Images ──────────────────────────────────────────────────────

fn extract_images(document: &Html, base: &Url, inventory: &mut AssetInventory) {
    let img_sel = Selector::parse("img").unwrap();
    for el in document.select(&img_sel) {
        if let Some(resolved) = el.value().attr("src").and_then(|s| resolve(base, s)) {
            inventory.push(AssetCategory::Image, resolved);
        }
        // First URL token of each comma-separated srcset candidate.
        if let Some(srcset) = el.value().attr("srcset") {
            for candidate in srcset.split(',') {
                let first = candidate.trim().split_whitespace().next().unwrap_or("");
                if let Some(resolved) = resolve(base, first) {
                    inventory.push(AssetCategory::Image, resolved);
                }
            }
        }
        // Lazy-loading convention.
        if let Some(resolved) = el.value().attr("data-src").and_then(|s| resolve(base, s)) {
            inventory.push(AssetCategory::Image, resolved);
        }
    }

    // Background images declared in inline style attributes.
    let styled_sel = Selector::parse("[style]").unwrap();
    let url_token = Regex::new(r#"url\(\s*['"]?([^'")]+?)['"]?\s*\)"#).unwrap();
    for el in document.select(&styled_sel) {
        let style = el.value().attr("style").unwrap_or("");
        if !style.contains("background") {
            continue;
        }
        for caps in url_token.captures_iter(style) {
            if let Some(resolved) = resolve(base, &caps[1]) {
                inventory.push(AssetCategory::Image, resolved);
            }
        }
    }
}

// ── Favicons ────────────────────────────────────────────────────

fn extract_favicons(document: &Html, base: &Url, inventory: &mut AssetInventory) {
    let sel = Selector::parse("link[rel]").unwrap();
    for el in document.select(&sel) {
        let rel = el.value().attr("rel").unwrap_or("").to_lowercase();
        if !rel.split_whitespace().any(|token| token == "icon") {
            continue;
        }
        if let Some(resolved) = el.value().attr("href").and_then(|h| resolve(base, h)) {
            inventory.push(AssetCategory::Favicon, resolved);
        }
    }
}

// ── Media ───────────────────────────────────────────────────────

fn extract_media(document: &Html, base: &Url, inventory: &mut AssetInventory) {
    let source_sel = Selector::parse("source").unwrap();
    for (tag, category) in [
        ("video", AssetCategory::Video),
        ("audio", AssetCategory::Audio),
    ] {
        let sel = Selector::parse(tag).unwrap();
        for el in document.select(&sel) {
            if let Some(resolved) = el.value().attr("src").and_then(|s| resolve(base, s)) {
                inventory.push(category, resolved);
            }
            for source in el.select(&source_sel) {
                if let Some(resolved) = source.value().attr("src").and_then(|s| resolve(base, s)) {
                    inventory.push(category, resolved);
                }
            }
        }
    }
}

// ── Iframes ─────────────────────────────────────────────────────

const VIDEO_PLATFORM_MARKERS: &[&str] = &["youtube", "vimeo"];

fn extract_iframes(document: &Html, base: &Url, inventory: &mut AssetInventory) {
    let sel = Selector::parse("iframe[src]").unwrap();
    for el in document.select(&sel) {
        let src = el.value().attr("src").unwrap_or("");
        if src.starts_with("data:") {
            continue;
        }
        let Some(resolved) = resolve(base, src) else {
            continue;
        };
        let host = Url::parse(&resolved)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        let category = if VIDEO_PLATFORM_MARKERS.iter().any(|m| host.contains(m)) {
            AssetCategory::Video
        } else {
            // Embedded documents are re-fetchable script-category resources.
            AssetCategory::Js
        };
        inventory.push(category, resolved);
    }
}

// ── Framework data islands ──────────────────────────────────────

/// Conventional Next.js chunk names synthesized for a known build id.
const NEXT_CHUNK_PATHS: &[&str] = &[
    "main",
    "webpack",
    "framework",
    "pages/_app",
    "pages/_error",
    "pages/index",
];

fn extract_next_data(document: &Html, base: &Url, inventory: &mut AssetInventory) {
    let sel = Selector::parse("script#__NEXT_DATA__").unwrap();
    let Some(el) = document.select(&sel).next() else {
        return;
    };
    let text = el.inner_html();
    let payload: Value = match serde_json::from_str(text.trim()) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!("unparseable __NEXT_DATA__ payload: {e}");
            return;
        }
    };

    if let Some(build_id) = payload.get("buildId").and_then(|b| b.as_str()) {
        for chunk in NEXT_CHUNK_PATHS {
            let path = format!("/_next/static/{build_id}/pages/{chunk}.js");
            if let Some(resolved) = resolve(base, &path) {
                inventory.push(AssetCategory::Js, resolved);
            }
        }
    }

    // Preserved verbatim for downstream consumers of metadata.json.
    inventory.metadata.next_data = Some(payload);
}

// ── Fallback literal scan ───────────────────────────────────────

fn scan_script_literals(html: &str, base: &Url, inventory: &mut AssetInventory) {
    let patterns = [
        r#"["'](https?://[^"']+\.(?:css|js|png|jpe?g|gif|svg|woff2?))["']"#,
        r#"["'](//[^"']+\.(?:css|js|png|jpe?g|gif|svg|woff2?))["']"#,
        r#"["'](/[^"']+\.(?:css|js|png|jpe?g|gif|svg|woff2?))["']"#,
        r#"loadCSS\(["']([^"']+)["']"#,
        r#"loadJS\(["']([^"']+)["']"#,
    ];
    let mut added = 0usize;
    for pattern in patterns {
        let re = Regex::new(pattern).unwrap();
        for caps in re.captures_iter(html) {
            let raw = &caps[1];
            if raw.contains('{') || raw.contains('}') {
                continue;
            }
            if let Some(resolved) = resolve(base, raw) {
                let category = classify::classify(&resolved);
                if inventory.push(category, resolved) {
                    added += 1;
                }
            }
        }
    }
    if added > 0 {
        tracing::debug!("literal scan recovered {added} asset URL(s) from sparse page");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://ex.com/";

    #[test]
    fn test_stylesheet_link_resolved() {
        let page = extract(r#"<link rel="stylesheet" href="/s.css">"#, BASE).unwrap();
        assert_eq!(
            page.inventory.urls(AssetCategory::Css),
            &["https://ex.com/s.css"]
        );
    }

    #[test]
    fn test_srcset_candidates() {
        let page = extract(
            r#"<img srcset="a.png 1x, b.png 2x">"#,
            "https://ex.com/p/",
        )
        .unwrap();
        assert_eq!(
            page.inventory.urls(AssetCategory::Image),
            &["https://ex.com/p/a.png", "https://ex.com/p/b.png"]
        );
    }

    #[test]
    fn test_all_retained_urls_are_absolute() {
        let page = extract(
            r#"<link rel="stylesheet" href="s.css">
               <script src="../app.js"></script>
               <img src="pics/logo.png" data-src="lazy.webp">"#,
            "https://ex.com/sub/dir/",
        )
        .unwrap();
        for category in AssetCategory::ALL {
            for u in page.inventory.urls(category) {
                let parsed = Url::parse(u).unwrap();
                assert!(matches!(parsed.scheme(), "http" | "https"));
                assert!(parsed.host_str().is_some());
            }
        }
    }

    #[test]
    fn test_data_uris_dropped_without_error() {
        let page = extract(
            r#"<img src="data:image/png;base64,AAAA"><script src="data:text/javascript,x"></script>"#,
            BASE,
        )
        .unwrap();
        assert_eq!(page.inventory.total_urls(), 0);
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let html = r#"
            <html><head>
            <link rel="stylesheet" href="/a.css">
            <link rel="stylesheet" href="/b.css">
            <script src="/app.js"></script>
            </head><body>
            <img src="/one.png"><img src="/two.png">
            </body></html>"#;
        let first = extract(html, BASE).unwrap();
        let second = extract(html, BASE).unwrap();
        for category in AssetCategory::ALL {
            assert_eq!(
                first.inventory.urls(category),
                second.inventory.urls(category)
            );
        }
    }

    #[test]
    fn test_metadata_og_twitter_and_language() {
        let page = extract(
            r#"<html lang="en"><head>
            <title> My Page </title>
            <meta name="description" content="desc">
            <meta name="keywords" content="a,b">
            <meta property="og:title" content="first">
            <meta property="og:title" content="second">
            <meta name="twitter:card" content="summary">
            <link rel="canonical" href="/canonical">
            <link rel="icon" href="/fav.ico">
            </head></html>"#,
            BASE,
        )
        .unwrap();
        let meta = &page.inventory.metadata;
        assert_eq!(meta.title, "My Page");
        assert_eq!(meta.description, "desc");
        // Later duplicate overwrites.
        assert_eq!(meta.og_tags["title"], "second");
        assert_eq!(meta.twitter_cards["card"], "summary");
        assert_eq!(meta.canonical, "https://ex.com/canonical");
        assert_eq!(meta.favicon, "https://ex.com/fav.ico");
        assert_eq!(meta.language, "en");
    }

    #[test]
    fn test_malformed_jsonld_skipped() {
        let page = extract(
            r#"<script type="application/ld+json">{not json}</script>
               <script type="application/ld+json">{"@type":"Product"}</script>"#,
            BASE,
        )
        .unwrap();
        assert_eq!(page.inventory.metadata.structured_data.len(), 1);
    }

    #[test]
    fn test_favicon_rel_tokenized() {
        let page = extract(
            r#"<link rel="SHORTCUT ICON" href="/f1.ico">
               <link rel="apple-touch-icon" href="/f2.png">"#,
            BASE,
        )
        .unwrap();
        assert_eq!(
            page.inventory.urls(AssetCategory::Favicon),
            &["https://ex.com/f1.ico"]
        );
    }

    #[test]
    fn test_media_sources() {
        let page = extract(
            r#"<video src="/v.mp4"><source src="/v.webm"></video>
               <audio><source src="/a.mp3"></audio>"#,
            BASE,
        )
        .unwrap();
        assert_eq!(
            page.inventory.urls(AssetCategory::Video),
            &["https://ex.com/v.mp4", "https://ex.com/v.webm"]
        );
        assert_eq!(
            page.inventory.urls(AssetCategory::Audio),
            &["https://ex.com/a.mp3"]
        );
    }

    #[test]
    fn test_iframe_video_platform_vs_script() {
        let page = extract(
            r#"<iframe src="https://www.youtube.com/embed/x"></iframe>
               <iframe src="https://widgets.example.net/chat"></iframe>"#,
            BASE,
        )
        .unwrap();
        assert_eq!(
            page.inventory.urls(AssetCategory::Video),
            &["https://www.youtube.com/embed/x"]
        );
        assert_eq!(
            page.inventory.urls(AssetCategory::Js),
            &["https://widgets.example.net/chat"]
        );
    }

    #[test]
    fn test_next_data_island() {
        let page = extract(
            r#"<script id="__NEXT_DATA__" type="application/json">
            {"buildId":"abc123","props":{}}
            </script>"#,
            "https://ex.com/deep/page",
        )
        .unwrap();
        let js = page.inventory.urls(AssetCategory::Js);
        assert!(js.contains(&"https://ex.com/_next/static/abc123/pages/main.js".to_string()));
        assert!(js
            .contains(&"https://ex.com/_next/static/abc123/pages/pages/_app.js".to_string()));
        assert_eq!(js.len(), NEXT_CHUNK_PATHS.len());
        assert!(page.inventory.metadata.next_data.is_some());
    }

    #[test]
    fn test_inline_style_feeds_stylesheet_extractor() {
        let page = extract(
            r#"<style>
            @import "extra.css";
            body { font-family: 'Roboto', sans-serif; }
            </style>"#,
            BASE,
        )
        .unwrap();
        assert_eq!(
            page.inventory.urls(AssetCategory::Css),
            &["https://ex.com/extra.css"]
        );
        assert_eq!(page.inventory.font_families(), &["Roboto"]);
    }

    #[test]
    fn test_background_style_attribute() {
        let page = extract(
            r#"<div style="background-image: url('/bg.jpg')">x</div>
               <div style="color: red">no background here</div>"#,
            BASE,
        )
        .unwrap();
        assert_eq!(
            page.inventory.urls(AssetCategory::Image),
            &["https://ex.com/bg.jpg"]
        );
    }

    #[test]
    fn test_inline_scripts_concatenated() {
        let page = extract(
            r#"<script>var a = 1;</script>
               <script src="/app.js"></script>
               <script>var b = 2;</script>"#,
            BASE,
        )
        .unwrap();
        assert!(page.inline_scripts.contains("var a = 1;"));
        assert!(page.inline_scripts.contains("var b = 2;"));
        assert!(!page.inline_scripts.contains("app.js"));
    }

    #[test]
    fn test_sparse_page_literal_scan() {
        let page = extract(
            r#"<script>
            loadCSS("/late/styles.css");
            var img = "https://cdn.ex.com/hero.jpg";
            </script>"#,
            BASE,
        )
        .unwrap();
        assert!(page
            .inventory
            .urls(AssetCategory::Css)
            .contains(&"https://ex.com/late/styles.css".to_string()));
        assert!(page
            .inventory
            .urls(AssetCategory::Image)
            .contains(&"https://cdn.ex.com/hero.jpg".to_string()));
    }

    #[test]
    fn test_empty_input_is_parse_failure() {
        assert!(matches!(
            extract("   ", BASE),
            Err(ExtractError::ParseFailure)
        ));
    }
}
