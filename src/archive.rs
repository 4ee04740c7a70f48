//! Archive assembly.
//!
//! Materializes one extraction run into a deterministic zip layout:
//! `index.html`, a directory per non-empty asset category, `css/fonts.css`
//! synthesized from discovered font families, pretty-printed
//! `metadata.json`, a browsable `components/` tree, and a `README.md`.
//! A failed individual asset download is logged and skipped; it never
//! aborts the archive.

use crate::classify::AssetCategory;
use crate::error::ExtractError;
use crate::fetch::FetchClient;
use crate::inventory::{AssetInventory, ComponentKind};
use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use url::Url;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// A finished archive, owned by the caller until the reaper collects it.
#[derive(Debug, Clone)]
pub struct ArchiveHandle {
    pub path: PathBuf,
    pub filename: String,
    pub size_bytes: u64,
}

/// Build the archive for one page.
///
/// Downloads run concurrently through the fetcher's shared pacing and
/// concurrency budgets; zip entries are written sequentially by this
/// single writer.
pub async fn build(
    html: &str,
    inventory: &AssetInventory,
    page_url: &str,
    fetcher: &FetchClient,
    out_dir: &Path,
) -> Result<ArchiveHandle, ExtractError> {
    let domain = Url::parse(page_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "site".to_string());
    let safe_domain: String = domain
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    let filename = format!("{safe_domain}_{timestamp}.zip");

    std::fs::create_dir_all(out_dir).map_err(write_err)?;
    let path = out_dir.join(&filename);
    let file = File::create(&path).map_err(write_err)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    write_entry(&mut zip, options, "index.html", html.as_bytes())?;

    let mut used_paths: HashSet<String> = HashSet::new();
    used_paths.insert("index.html".to_string());

    for category in AssetCategory::ALL {
        let urls = inventory.urls(category);
        if urls.is_empty() {
            continue;
        }
        // Redirects can collapse distinct source URLs onto one resource;
        // dedup by the effective URL before writing.
        let mut seen_final: HashSet<String> = HashSet::new();
        let downloads = fetcher.get_many(urls, Some(page_url)).await;
        for (url, result) in downloads {
            let fetched = match result {
                Ok(f) => f,
                Err(e) => {
                    tracing::warn!("asset skipped ({category}): {url}: {e}");
                    continue;
                }
            };
            if !seen_final.insert(fetched.final_url.clone()) {
                continue;
            }
            let name = entry_filename(category, &fetched.final_url, &timestamp);
            let entry_path = unique_entry_path(&mut used_paths, category, &name);
            write_entry(&mut zip, options, &entry_path, &fetched.body.into_bytes())?;
            tracing::debug!("archived {entry_path} from {url}");
        }
    }

    if !inventory.font_families().is_empty() {
        write_entry(
            &mut zip,
            options,
            "css/fonts.css",
            fonts_css(inventory.font_families()).as_bytes(),
        )?;
    }

    let metadata_json =
        serde_json::to_string_pretty(&inventory.metadata).map_err(|e| write_err(e))?;
    write_entry(&mut zip, options, "metadata.json", metadata_json.as_bytes())?;

    if !inventory.components.is_empty() {
        write_entry(
            &mut zip,
            options,
            "components/index.html",
            components_index(&inventory.components).as_bytes(),
        )?;
        for kind in ComponentKind::ALL {
            let Some(fragments) = inventory.components.get(&kind) else {
                continue;
            };
            for (i, fragment) in fragments.iter().enumerate() {
                let entry = format!("components/{kind}/component_{}.html", i + 1);
                write_entry(&mut zip, options, &entry, fragment.as_bytes())?;
            }
        }
    }

    write_entry(
        &mut zip,
        options,
        "README.md",
        readme(&domain, page_url, inventory).as_bytes(),
    )?;

    let file = zip.finish().map_err(write_err)?;
    let size_bytes = file.metadata().map_err(write_err)?.len();
    tracing::info!("archive written: {} ({size_bytes} bytes)", path.display());

    Ok(ArchiveHandle {
        path,
        filename,
        size_bytes,
    })
}

fn write_err<E: std::fmt::Display>(e: E) -> ExtractError {
    ExtractError::ArchiveWrite {
        message: e.to_string(),
    }
}

fn write_entry(
    zip: &mut ZipWriter<File>,
    options: SimpleFileOptions,
    path: &str,
    bytes: &[u8],
) -> Result<(), ExtractError> {
    zip.start_file(path, options).map_err(write_err)?;
    zip.write_all(bytes).map_err(write_err)?;
    Ok(())
}

// ── Entry naming ────────────────────────────────────────────────

/// Derive an archive filename from the resolved URL.
///
/// Falls back to a generated `timestamp_random.<ext>` name when the path
/// has no final segment, appends the category extension when the name has
/// none, and folds a sanitized query string into the name so querystring
/// variants of one path stay distinct.
fn entry_filename(category: AssetCategory, url: &str, timestamp: &str) -> String {
    let parsed = Url::parse(url).ok();
    let segment = parsed
        .as_ref()
        .and_then(|u| u.path_segments())
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or("");
    let mut name = percent_decode(segment);

    if name.is_empty() {
        name = format!(
            "{timestamp}_{}.{}",
            short_token(),
            category.default_extension()
        );
    } else if !name.contains('.') {
        name = format!("{name}.{}", category.default_extension());
    }

    if let Some(query) = parsed.as_ref().and_then(|u| u.query()) {
        if !query.is_empty() {
            let clean: String = query
                .chars()
                .take(30)
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect();
            let (stem, ext) = split_extension(&name);
            name = format!("{stem}_{clean}{ext}");
        }
    }

    name
}

/// Reserve a unique entry path, appending a random suffix on collision.
fn unique_entry_path(
    used: &mut HashSet<String>,
    category: AssetCategory,
    name: &str,
) -> String {
    let candidate = format!("{}/{}", category.dir_name(), name);
    if used.insert(candidate.clone()) {
        return candidate;
    }
    let (stem, ext) = split_extension(name);
    let fallback = format!("{}/{stem}_{}{ext}", category.dir_name(), short_token());
    used.insert(fallback.clone());
    fallback
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    }
}

fn short_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn percent_decode(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = [bytes[i + 1], bytes[i + 2]];
            if let Ok(byte) =
                std::str::from_utf8(&hex).map_err(drop).and_then(|h| {
                    u8::from_str_radix(h, 16).map_err(drop)
                })
            {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

// ── Generated entries ───────────────────────────────────────────

fn fonts_css(families: &[String]) -> String {
    families
        .iter()
        .map(|family| {
            format!(
                "/* Font family: {family} */\n@import url('https://fonts.googleapis.com/css2?family={}&display=swap');\n",
                family.replace(' ', "+")
            )
        })
        .collect::<Vec<_>>()
        .join("")
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn components_index(
    components: &std::collections::HashMap<ComponentKind, Vec<String>>,
) -> String {
    let mut out = String::from(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Extracted UI Components</title>
<style>
  body { font-family: Arial, sans-serif; max-width: 1200px; margin: 0 auto; padding: 20px; }
  .component { margin-bottom: 40px; border: 1px solid #ddd; border-radius: 5px; overflow: hidden; }
  .component-header { background: #f5f5f5; padding: 10px 15px; border-bottom: 1px solid #ddd; }
  .component-content { padding: 15px; }
  .component-code { background: #f8f8f8; padding: 15px; border-top: 1px solid #ddd; white-space: pre-wrap; overflow-x: auto; }
  h1, h2 { color: #333; }
  pre { margin: 0; }
</style>
</head>
<body>
<h1>Extracted UI Components</h1>
<p>The following components were extracted from the website.</p>
"#,
    );

    for kind in ComponentKind::ALL {
        let Some(fragments) = components.get(&kind) else {
            continue;
        };
        if fragments.is_empty() {
            continue;
        }
        out.push_str(&format!("<h2>{} Components</h2>\n", title_case(kind.as_str())));
        for (i, fragment) in fragments.iter().enumerate() {
            out.push_str(&format!(
                r#"<div class="component">
<div class="component-header"><strong>{} {}</strong></div>
<div class="component-content">{}</div>
<div class="component-code"><pre>{}</pre></div>
</div>
"#,
                title_case(kind.as_str()),
                i + 1,
                fragment,
                escape_html(fragment)
            ));
        }
    }

    out.push_str("</body>\n</html>\n");
    out
}

fn readme(domain: &str, page_url: &str, inventory: &AssetInventory) -> String {
    let extracted_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    let mut counts = String::new();
    for (category, n) in inventory.category_counts() {
        counts.push_str(&format!("- `{}/`: {} file(s)\n", category.dir_name(), n));
    }
    if counts.is_empty() {
        counts.push_str("- (no downloadable assets were discovered)\n");
    }
    format!(
        r#"# Website Archive: {domain}

Extracted on: {extracted_at}
Source URL: {page_url}

## Contents

- `index.html`: main page with references rewritten to absolute form
{counts}- `components/`: extracted UI components (open `components/index.html`)
- `metadata.json`: page metadata (title, description, social tags, structured data)
- `css/fonts.css`: @import rules for every discovered font family

## How to use

1. Unzip this file
2. Open `index.html` in your browser
3. For best results, serve the files with a local server, for example:
   `python -m http.server`

## Notes

- Some assets may not load correctly due to cross-origin restrictions
- External resources and APIs may not work without the original backend
- JavaScript functionality can be limited outside the original site
"#
    )
}
