//! UI component fragment capture.
//!
//! Walks the document applying kind heuristics over tag name, ARIA role,
//! class substrings, and element id, in a fixed precedence order. Captured
//! counts are capped per kind to bound archive size, and near-duplicate
//! cards are collapsed with a cheap structural fingerprint.

use crate::inventory::ComponentKind;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};

/// How many card candidates are examined before the cap applies.
const CARD_EXAMINE_LIMIT: usize = 15;
/// Sections with this many descendant elements or fewer are noise.
const SECTION_MIN_DESCENDANTS: usize = 3;

/// Determine the component kind of an element, if any.
///
/// Precedence: navigation > header > footer > hero > card > form > cta >
/// sidebar > modal > section > mobile > store > cart. Generic containers
/// and everything else are not captured.
pub fn component_kind(el: &ElementRef<'_>) -> Option<ComponentKind> {
    let tag = el.value().name();
    let role = el.value().attr("role").unwrap_or("").to_lowercase();
    let id = el.value().attr("id").unwrap_or("").to_lowercase();
    let class_str = el
        .value()
        .classes()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let class_has = |needle: &str| class_str.contains(needle);

    if tag == "nav"
        || role == "navigation"
        || class_has("nav")
        || class_has("menu")
        || matches!(id.as_str(), "nav" | "navigation" | "menu")
    {
        return Some(ComponentKind::Navigation);
    }
    if tag == "header"
        || role == "banner"
        || class_has("header")
        || class_has("banner")
        || matches!(id.as_str(), "header" | "banner")
    {
        return Some(ComponentKind::Header);
    }
    if tag == "footer" || role == "contentinfo" || class_has("footer") || id == "footer" {
        return Some(ComponentKind::Footer);
    }
    if class_has("hero")
        || class_has("jumbotron")
        || class_has("showcase")
        || matches!(id.as_str(), "hero" | "banner" | "jumbotron" | "showcase")
    {
        return Some(ComponentKind::Hero);
    }
    if class_has("card") || class_has("tile") || matches!(id.as_str(), "card" | "tile") {
        return Some(ComponentKind::Card);
    }
    if tag == "form" || role == "form" || class_has("form") || id == "form" {
        return Some(ComponentKind::Form);
    }
    if class_has("cta")
        || class_has("call-to-action")
        || matches!(id.as_str(), "cta" | "call-to-action")
    {
        return Some(ComponentKind::Cta);
    }
    if class_has("sidebar") || class_has("side-bar") || matches!(id.as_str(), "sidebar" | "side-bar")
    {
        return Some(ComponentKind::Sidebar);
    }
    if role == "dialog"
        || class_has("modal")
        || class_has("dialog")
        || class_has("popup")
        || matches!(id.as_str(), "modal" | "dialog" | "popup")
    {
        return Some(ComponentKind::Modal);
    }
    if tag == "section" || role == "region" || class_has("section") {
        return Some(ComponentKind::Section);
    }
    if class_has("mobile") || class_has("smartphone") {
        return Some(ComponentKind::Mobile);
    }
    if class_has("product") || class_has("store") || class_has("shop") || class_has("pricing") {
        return Some(ComponentKind::Store);
    }
    if class_has("cart")
        || class_has("basket")
        || matches!(id.as_str(), "cart" | "basket" | "shopping-cart")
    {
        return Some(ComponentKind::Cart);
    }
    None
}

/// Capture serialized fragments for every recognized component on the page.
pub fn capture(document: &Html) -> HashMap<ComponentKind, Vec<String>> {
    let mut out: HashMap<ComponentKind, Vec<String>> = HashMap::new();
    let mut cards_examined = 0usize;
    let mut card_fingerprints: HashSet<usize> = HashSet::new();

    let all = Selector::parse("*").unwrap();
    for el in document.select(&all) {
        let Some(kind) = component_kind(&el) else {
            continue;
        };

        match kind {
            ComponentKind::Card => {
                if cards_examined >= CARD_EXAMINE_LIMIT {
                    continue;
                }
                cards_examined += 1;
                // Child-element count is a cheap structural fingerprint;
                // repeated cards in a grid collapse to one exemplar.
                let fingerprint = descendant_element_count(&el);
                if !card_fingerprints.insert(fingerprint) {
                    continue;
                }
            }
            ComponentKind::Section => {
                if descendant_element_count(&el) <= SECTION_MIN_DESCENDANTS {
                    continue;
                }
            }
            _ => {}
        }

        let fragments = out.entry(kind).or_default();
        if fragments.len() < kind.cap() {
            fragments.push(el.html());
        }
    }

    out.retain(|_, v| !v.is_empty());
    out
}

fn descendant_element_count(el: &ElementRef<'_>) -> usize {
    el.descendants()
        .filter(|n| n.value().is_element())
        .count()
        .saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(html: &str) -> HashMap<ComponentKind, Vec<String>> {
        capture(&Html::parse_document(html))
    }

    #[test]
    fn test_nav_by_tag_role_and_class() {
        let out = kinds(
            r#"<body>
            <nav><a href="/">Home</a></nav>
            <div role="navigation">r</div>
            <ul class="main-menu"><li>x</li></ul>
            </body>"#,
        );
        assert_eq!(out[&ComponentKind::Navigation].len(), 3);
    }

    #[test]
    fn test_navigation_cap() {
        let html = (0..8)
            .map(|i| format!("<nav>n{i}</nav>"))
            .collect::<String>();
        let out = kinds(&format!("<body>{html}</body>"));
        assert_eq!(out[&ComponentKind::Navigation].len(), 5);
    }

    #[test]
    fn test_precedence_header_beats_section() {
        let out = kinds(r#"<body><section class="header-area">x</section></body>"#);
        assert!(out.contains_key(&ComponentKind::Header));
        assert!(!out.contains_key(&ComponentKind::Section));
    }

    #[test]
    fn test_cards_collapse_by_structure() {
        // Six structurally identical cards plus one distinct card.
        let repeated = r#"<div class="card"><h3>t</h3><p>b</p></div>"#.repeat(6);
        let distinct = r#"<div class="card"><h3>t</h3><p>b</p><a>m</a><span>x</span></div>"#;
        let out = kinds(&format!("<body>{repeated}{distinct}</body>"));
        assert_eq!(out[&ComponentKind::Card].len(), 2);
    }

    #[test]
    fn test_small_sections_skipped() {
        let out = kinds(
            r#"<body>
            <section><p>tiny</p></section>
            <section><div><p>a</p><p>b</p><p>c</p></div></section>
            </body>"#,
        );
        let sections = out.get(&ComponentKind::Section);
        assert_eq!(sections.map(Vec::len), Some(1));
    }

    #[test]
    fn test_modal_by_role() {
        let out = kinds(r#"<body><div role="dialog"><p>hi</p></div></body>"#);
        assert!(out.contains_key(&ComponentKind::Modal));
    }

    #[test]
    fn test_plain_divs_not_captured() {
        let out = kinds(r#"<body><div class="wrapper"><p>x</p></div></body>"#);
        assert!(out.is_empty());
    }
}
