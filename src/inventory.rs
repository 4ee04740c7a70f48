//! Asset inventory and page metadata assembled during extraction.
//!
//! One inventory belongs to one extraction run. URL lists keep insertion
//! order and reject duplicates on push, so downstream consumers never see
//! the same URL twice in a category.

use crate::classify::AssetCategory;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// UI structure kinds recognized during component capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Navigation,
    Header,
    Footer,
    Hero,
    Card,
    Form,
    Cta,
    Sidebar,
    Modal,
    Section,
    Mobile,
    Store,
    Cart,
}

impl ComponentKind {
    /// All kinds in capture precedence order.
    pub const ALL: [ComponentKind; 13] = [
        ComponentKind::Navigation,
        ComponentKind::Header,
        ComponentKind::Footer,
        ComponentKind::Hero,
        ComponentKind::Card,
        ComponentKind::Form,
        ComponentKind::Cta,
        ComponentKind::Sidebar,
        ComponentKind::Modal,
        ComponentKind::Section,
        ComponentKind::Mobile,
        ComponentKind::Store,
        ComponentKind::Cart,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ComponentKind::Navigation => "navigation",
            ComponentKind::Header => "header",
            ComponentKind::Footer => "footer",
            ComponentKind::Hero => "hero",
            ComponentKind::Card => "card",
            ComponentKind::Form => "form",
            ComponentKind::Cta => "cta",
            ComponentKind::Sidebar => "sidebar",
            ComponentKind::Modal => "modal",
            ComponentKind::Section => "section",
            ComponentKind::Mobile => "mobile",
            ComponentKind::Store => "store",
            ComponentKind::Cart => "cart",
        }
    }

    /// How many fragments of this kind are captured per page.
    pub fn cap(self) -> usize {
        match self {
            ComponentKind::Navigation => 5,
            ComponentKind::Header => 2,
            ComponentKind::Footer => 2,
            ComponentKind::Hero => 3,
            ComponentKind::Card => 5,
            ComponentKind::Form => 3,
            ComponentKind::Cta => 3,
            ComponentKind::Sidebar => 2,
            ComponentKind::Modal => 3,
            ComponentKind::Section => 5,
            ComponentKind::Mobile => 3,
            ComponentKind::Store => 5,
            ComponentKind::Cart => 2,
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Page-level metadata, extracted once and serialized as `metadata.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub title: String,
    pub description: String,
    pub keywords: String,
    /// OpenGraph pairs with the `og:` prefix stripped. Later duplicates
    /// overwrite earlier ones.
    pub og_tags: serde_json::Map<String, Value>,
    /// Twitter card pairs with the `twitter:` prefix stripped.
    pub twitter_cards: serde_json::Map<String, Value>,
    pub canonical: String,
    pub language: String,
    pub favicon: String,
    /// Parsed JSON-LD blocks. Malformed blocks are skipped, not fatal.
    pub structured_data: Vec<Value>,
    /// Framework data island payload, when one was found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_data: Option<Value>,
}

/// Everything discovered on one page: categorized URLs, font families,
/// metadata, and captured UI fragments.
#[derive(Debug, Clone, Default)]
pub struct AssetInventory {
    urls: HashMap<AssetCategory, Vec<String>>,
    seen: HashSet<(AssetCategory, String)>,
    font_families: Vec<String>,
    families_seen: HashSet<String>,
    pub metadata: PageMetadata,
    pub components: HashMap<ComponentKind, Vec<String>>,
}

impl AssetInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a URL under a category. Returns false if it was already
    /// present (duplicates are dropped, insertion order is kept).
    pub fn push(&mut self, category: AssetCategory, url: String) -> bool {
        if url.is_empty() {
            return false;
        }
        if !self.seen.insert((category, url.clone())) {
            return false;
        }
        self.urls.entry(category).or_default().push(url);
        true
    }

    /// URLs recorded for a category, in insertion order.
    pub fn urls(&self, category: AssetCategory) -> &[String] {
        self.urls.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Record a font family name, deduplicated case-insensitively.
    pub fn add_font_family(&mut self, family: &str) -> bool {
        let family = family.trim();
        if family.is_empty() {
            return false;
        }
        if !self.families_seen.insert(family.to_lowercase()) {
            return false;
        }
        self.font_families.push(family.to_string());
        true
    }

    pub fn font_families(&self) -> &[String] {
        &self.font_families
    }

    /// Total number of recorded URLs across every category.
    pub fn total_urls(&self) -> usize {
        self.urls.values().map(Vec::len).sum()
    }

    /// Per-category URL counts in the fixed category order, skipping
    /// empty categories.
    pub fn category_counts(&self) -> Vec<(AssetCategory, usize)> {
        AssetCategory::ALL
            .iter()
            .filter_map(|&c| {
                let n = self.urls(c).len();
                (n > 0).then_some((c, n))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_dedup_preserves_order() {
        let mut inv = AssetInventory::new();
        assert!(inv.push(AssetCategory::Css, "https://ex.com/a.css".into()));
        assert!(inv.push(AssetCategory::Css, "https://ex.com/b.css".into()));
        assert!(!inv.push(AssetCategory::Css, "https://ex.com/a.css".into()));
        assert_eq!(
            inv.urls(AssetCategory::Css),
            &["https://ex.com/a.css", "https://ex.com/b.css"]
        );
    }

    #[test]
    fn test_same_url_allowed_in_different_categories() {
        let mut inv = AssetInventory::new();
        assert!(inv.push(AssetCategory::Css, "https://ex.com/x".into()));
        assert!(inv.push(AssetCategory::Js, "https://ex.com/x".into()));
        assert_eq!(inv.total_urls(), 2);
    }

    #[test]
    fn test_font_family_case_insensitive_dedup() {
        let mut inv = AssetInventory::new();
        assert!(inv.add_font_family("Open Sans"));
        assert!(!inv.add_font_family("open sans"));
        assert!(!inv.add_font_family("  Open Sans  "));
        assert_eq!(inv.font_families(), &["Open Sans"]);
    }

    #[test]
    fn test_category_counts_skip_empty() {
        let mut inv = AssetInventory::new();
        inv.push(AssetCategory::Image, "https://ex.com/a.png".into());
        inv.push(AssetCategory::Image, "https://ex.com/b.png".into());
        assert_eq!(inv.category_counts(), vec![(AssetCategory::Image, 2)]);
    }

    #[test]
    fn test_metadata_round_trips_through_json() {
        let mut meta = PageMetadata {
            title: "T".into(),
            description: "D".into(),
            ..Default::default()
        };
        meta.og_tags
            .insert("title".into(), Value::String("OG T".into()));
        meta.structured_data
            .push(serde_json::json!({"@type": "Product"}));

        let json = serde_json::to_string_pretty(&meta).unwrap();
        let back: PageMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(meta, back);
        assert!(!json.contains("next_data"));
    }
}
