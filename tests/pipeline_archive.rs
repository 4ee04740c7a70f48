//! End-to-end pipeline test: serve a page and its assets from a mock
//! server, run a full extraction, and verify the archive layout and the
//! metadata round-trip.

use sitepack::fetch::{BackoffPolicy, FetchConfig};
use sitepack::inventory::PageMetadata;
use sitepack::pipeline::{ExtractRequest, Pipeline, PipelineConfig};
use std::io::Read;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<title>Test Page</title>
<meta name="description" content="A fixture page">
<meta property="og:title" content="Fixture">
<meta name="twitter:card" content="summary">
<link rel="canonical" href="/canonical">
<link rel="icon" href="/fav.ico">
<link rel="stylesheet" href="/s.css">
<style>
  body { font-family: 'Open Sans', sans-serif; }
</style>
<script type="application/ld+json">{"@type":"WebSite","name":"Fixture"}</script>
</head>
<body>
<nav class="main-nav"><a href="/about">About</a></nav>
<img srcset="/a.png 1x, /b.png 2x" src="/a.png">
<img src="/missing.png">
<script src="/app.js"></script>
</body>
</html>"#;

async fn mount_fixtures(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PAGE.as_bytes().to_vec(), "text/html"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/s.css"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            ".hero { background: url(images/bg.png); font-family: \"Fira Sans\", serif; }"
                .as_bytes()
                .to_vec(),
            "text/css",
        ))
        .mount(server)
        .await;
    for (p, ct) in [
        ("/a.png", "image/png"),
        ("/b.png", "image/png"),
        ("/images/bg.png", "image/png"),
        ("/fav.ico", "image/x-icon"),
    ] {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(vec![0x89, 0x50, 0x4E, 0x47], ct),
            )
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/app.js"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("console.log(1);".as_bytes().to_vec(), "application/javascript"),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
}

fn test_pipeline(out_dir: std::path::PathBuf) -> Pipeline {
    let config = PipelineConfig {
        fetch: FetchConfig {
            pacing_delay: Duration::from_millis(1),
            backoff: BackoffPolicy {
                base: Duration::from_millis(1),
                cap: Duration::from_millis(10),
            },
            ..FetchConfig::default()
        },
        out_dir,
        overall_timeout: Duration::from_secs(60),
        render_timeout: Duration::from_secs(1),
    };
    Pipeline::new(config, None).unwrap()
}

fn read_entry(zip: &mut zip::ZipArchive<std::fs::File>, name: &str) -> String {
    let mut out = String::new();
    zip.by_name(name)
        .unwrap_or_else(|_| panic!("missing archive entry: {name}"))
        .read_to_string(&mut out)
        .unwrap();
    out
}

#[tokio::test]
async fn test_full_extraction_builds_complete_archive() {
    let server = MockServer::start().await;
    mount_fixtures(&server).await;
    let out_dir = tempfile::tempdir().unwrap();

    let pipeline = test_pipeline(out_dir.path().to_path_buf());
    let outcome = pipeline
        .run(ExtractRequest {
            url: format!("{}/", server.uri()),
            render: false,
        })
        .await
        .expect("pipeline failed");

    assert!(outcome.archive.size_bytes > 0);
    let file = std::fs::File::open(&outcome.archive.path).unwrap();
    let mut zip = zip::ZipArchive::new(file).unwrap();

    let names: Vec<String> = (0..zip.len())
        .map(|i| zip.by_index(i).unwrap().name().to_string())
        .collect();

    // Root page, rewritten.
    let index = read_entry(&mut zip, "index.html");
    assert!(index.contains(&format!("{}/about", server.uri())));

    // One directory per non-empty category, files named from the path.
    assert!(names.contains(&"css/s.css".to_string()));
    assert!(names.contains(&"js/app.js".to_string()));
    assert!(names.contains(&"img/a.png".to_string()));
    assert!(names.contains(&"img/b.png".to_string()));
    assert!(names.contains(&"img/bg.png".to_string()));
    assert!(names.contains(&"favicons/fav.ico".to_string()));

    // The 404 asset is skipped, not fatal, and not present.
    assert!(!names.iter().any(|n| n.contains("missing")));

    // Font families from both the inline style and the linked stylesheet.
    let fonts = read_entry(&mut zip, "css/fonts.css");
    assert!(fonts.contains("family=Open+Sans"));
    assert!(fonts.contains("family=Fira+Sans"));

    // Components captured and browsable.
    assert!(names.contains(&"components/index.html".to_string()));
    assert!(names.contains(&"components/navigation/component_1.html".to_string()));
    let nav = read_entry(&mut zip, "components/navigation/component_1.html");
    assert!(nav.contains("main-nav"));

    assert!(names.contains(&"README.md".to_string()));
}

#[tokio::test]
async fn test_metadata_round_trip() {
    let server = MockServer::start().await;
    mount_fixtures(&server).await;
    let out_dir = tempfile::tempdir().unwrap();

    let pipeline = test_pipeline(out_dir.path().to_path_buf());
    let outcome = pipeline
        .run(ExtractRequest {
            url: format!("{}/", server.uri()),
            render: false,
        })
        .await
        .unwrap();

    let file = std::fs::File::open(&outcome.archive.path).unwrap();
    let mut zip = zip::ZipArchive::new(file).unwrap();
    let raw = read_entry(&mut zip, "metadata.json");

    // Re-reading what was serialized yields an equal metadata object.
    let meta: PageMetadata = serde_json::from_str(&raw).unwrap();
    let reserialized = serde_json::to_string_pretty(&meta).unwrap();
    assert_eq!(raw, reserialized);

    assert_eq!(meta.title, "Test Page");
    assert_eq!(meta.description, "A fixture page");
    assert_eq!(meta.og_tags["title"], "Fixture");
    assert_eq!(meta.twitter_cards["card"], "summary");
    assert_eq!(meta.language, "en");
    assert!(meta.canonical.ends_with("/canonical"));
    assert!(meta.favicon.ends_with("/fav.ico"));
    assert_eq!(meta.structured_data.len(), 1);
}

#[tokio::test]
async fn test_root_page_failure_surfaces() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let out_dir = tempfile::tempdir().unwrap();

    let pipeline = test_pipeline(out_dir.path().to_path_buf());
    let err = pipeline
        .run(ExtractRequest {
            url: format!("{}/gone", server.uri()),
            render: false,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");
}
