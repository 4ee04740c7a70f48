//! Reference rewriting before archiving.
//!
//! Rewrites `href`/`src` attributes on anchors, images, scripts, and link
//! elements to absolute form against the page base, so the archived
//! `index.html` keeps working when opened from disk. Anchors are only
//! rewritten when root-relative; resource attributes are rewritten
//! whenever they are not already absolute (`data:` URIs are left alone).

use regex::{Captures, Regex};
use url::Url;

pub fn absolutize(html: &str, base_url: &str) -> String {
    let base = match Url::parse(base_url) {
        Ok(u) => u,
        Err(_) => return html.to_string(),
    };

    let attr_re = Regex::new(
        r#"(?is)<(a|img|script|link)\b([^>]*?)\b(href|src)\s*=\s*(?:"([^"]*)"|'([^']*)')"#,
    )
    .unwrap();

    attr_re
        .replace_all(html, |caps: &Captures<'_>| {
            let tag = &caps[1];
            let (quote, value) = match caps.get(4) {
                Some(m) => ('"', m.as_str()),
                None => ('\'', caps.get(5).map(|m| m.as_str()).unwrap_or("")),
            };
            let rewrite = if tag.eq_ignore_ascii_case("a") {
                value.starts_with('/')
            } else {
                !(value.starts_with("http://")
                    || value.starts_with("https://")
                    || value.starts_with("data:"))
            };
            let new_value = if rewrite && !value.is_empty() {
                base.join(value)
                    .map(|u| u.to_string())
                    .unwrap_or_else(|_| value.to_string())
            } else {
                value.to_string()
            };
            format!(
                "<{}{}{}={}{}{}",
                &caps[1], &caps[2], &caps[3], quote, new_value, quote
            )
        })
        .into_owned()
}
