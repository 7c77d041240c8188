//! Remote image resolution.
//!
//! Finds inline image references (`![alt](url)`) in a note body, makes sure
//! each referenced picture is in the [`AssetStore`], and rewrites the
//! reference to the path the picture will have inside the package:
//!
//! ```text
//! ![cat](https://example.com/pets/cat.png)
//!   → ![cat](images/5d1e…c3.png)
//! ```
//!
//! References are located with the same markdown parser the converter uses,
//! so every form CommonMark accepts is seen: titles in any quote style,
//! destinations with balanced parentheses or angle brackets, and
//! reference-style images. Rewritten references are always inline.
//!
//! Each distinct URL is handled once per body. A URL whose key is already in
//! the store is a cache hit and costs no network access, so rerunning over the
//! same notes fetches nothing new.
//!
//! Fetched images larger than the configured bounds are scaled down before
//! being stored. A downscale failure keeps the original bytes.
//!
//! ## Unresolvable images
//!
//! When a picture cannot be fetched or stored, the reference is dropped and
//! only its alt text remains. The same applies to local references that do
//! not point into the store. Every image left in the body therefore exists in
//! the package.

use crate::cache::{AssetStore, ResolveStats, hash_url, is_valid_key};
use crate::convert::markdown_options;
use crate::fetch::Fetcher;
use crate::imaging::{DownscaleParams, Downscaled, downscale};
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use std::collections::HashMap;
use std::ops::Range;
use tracing::{debug, warn};

/// Folder holding images inside the package, relative to chapters.
pub const PACKAGE_IMAGES_DIR: &str = "images";

/// Extension used when the URL path has none.
const DEFAULT_EXTENSION: &str = ".jpg";

/// A note body with its image references rewritten.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub body: String,
    pub stats: ResolveStats,
}

/// One image reference as it appears in the source text.
#[derive(Debug, Clone, PartialEq)]
struct ImageRef {
    /// The whole reference, `![` through the closing `)` or `]`.
    span: Range<usize>,
    /// Source of the alt text, markup included.
    alt: Range<usize>,
    url: String,
    title: String,
}

/// Resolves image references against a store, fetching what is missing.
pub struct ImageResolver<'a> {
    fetcher: &'a dyn Fetcher,
    store: &'a dyn AssetStore,
    params: DownscaleParams,
}

impl<'a> ImageResolver<'a> {
    pub fn new(
        fetcher: &'a dyn Fetcher,
        store: &'a dyn AssetStore,
        params: DownscaleParams,
    ) -> Self {
        Self {
            fetcher,
            store,
            params,
        }
    }

    /// Rewrite every image reference in `body`.
    ///
    /// Text that is not an image reference passes through untouched.
    pub fn resolve(&self, body: &str) -> Resolved {
        let mut outcomes: HashMap<String, Option<String>> = HashMap::new();
        let mut stats = ResolveStats::default();
        let mut rewritten = String::with_capacity(body.len());
        let mut copied = 0;

        for image in find_images(body) {
            let local = outcomes
                .entry(image.url.clone())
                .or_insert_with(|| self.resolve_url(&image.url, &mut stats));

            rewritten.push_str(&body[copied..image.span.start]);
            let alt = &body[image.alt.clone()];
            match local {
                Some(path) => {
                    let title = title_suffix(&image.title);
                    rewritten.push_str(&format!("![{alt}]({path}{title})"));
                }
                None => rewritten.push_str(alt),
            }
            copied = image.span.end;
        }
        rewritten.push_str(&body[copied..]);

        Resolved {
            body: rewritten,
            stats,
        }
    }

    /// Package-relative path for `url`, or `None` if it cannot be resolved.
    fn resolve_url(&self, url: &str, stats: &mut ResolveStats) -> Option<String> {
        if !is_remote(url) {
            return self.resolve_local(url, stats);
        }

        let key = asset_key(url);
        if self.store.has(&key) {
            debug!("Cached {url} as {key}");
            stats.hit();
            return Some(package_path(&key));
        }

        let bytes = match self.fetcher.fetch(url) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Dropping image {url}: {e}");
                stats.fail();
                return None;
            }
        };
        let bytes = self.shrink(url, &key, bytes);

        if let Err(e) = self.store.put(&key, &bytes) {
            warn!("Dropping image {url}: cannot store {key}: {e}");
            stats.fail();
            return None;
        }
        debug!("Fetched {url} as {key} ({} bytes)", bytes.len());
        stats.fetch();
        Some(package_path(&key))
    }

    /// References already pointing at a stored key are kept; others dropped.
    fn resolve_local(&self, reference: &str, stats: &mut ResolveStats) -> Option<String> {
        let stored = reference
            .strip_prefix(PACKAGE_IMAGES_DIR)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|key| is_valid_key(key) && self.store.has(key));
        if let Some(key) = stored {
            stats.hit();
            return Some(package_path(key));
        }
        warn!("Dropping image {reference}: not a remote URL");
        stats.fail();
        None
    }

    fn shrink(&self, url: &str, key: &str, bytes: Vec<u8>) -> Vec<u8> {
        let extension = key.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
        match downscale(&bytes, extension, self.params) {
            Ok(Downscaled::Resized(smaller)) => {
                debug!("Downscaled {url}: {} → {} bytes", bytes.len(), smaller.len());
                smaller
            }
            Ok(Downscaled::Unchanged) => bytes,
            Err(e) => {
                warn!("Keeping original bytes for {url}: {e}");
                bytes
            }
        }
    }
}

/// Outermost image references in `body`, in source order.
///
/// An image nested in another image's alt text is part of that alt text; the
/// converter renders alt text as plain text, so it never becomes an image.
fn find_images(body: &str) -> Vec<ImageRef> {
    let mut found = Vec::new();
    let mut current: Option<ImageRef> = None;
    let mut alt: Option<Range<usize>> = None;
    let mut depth = 0usize;

    for (event, range) in Parser::new_ext(body, markdown_options()).into_offset_iter() {
        match event {
            Event::Start(Tag::Image {
                dest_url, title, ..
            }) if depth == 0 => {
                depth = 1;
                current = Some(ImageRef {
                    span: range.clone(),
                    alt: range.start..range.start,
                    url: dest_url.to_string(),
                    title: title.to_string(),
                });
                alt = None;
            }
            Event::End(TagEnd::Image) if depth == 1 => {
                depth = 0;
                if let Some(mut image) = current.take() {
                    if let Some(alt) = alt.take() {
                        image.alt = alt;
                    }
                    found.push(image);
                }
            }
            event if depth > 0 => {
                match event {
                    Event::Start(Tag::Image { .. }) => depth += 1,
                    Event::End(TagEnd::Image) => depth -= 1,
                    _ => {}
                }
                alt = Some(match alt {
                    Some(seen) => seen.start.min(range.start)..seen.end.max(range.end),
                    None => range,
                });
            }
            _ => {}
        }
    }

    found
}

/// ` "title"` with CommonMark escaping, or nothing for an empty title.
fn title_suffix(title: &str) -> String {
    if title.is_empty() {
        return String::new();
    }
    let escaped = title.replace('\\', "\\\\").replace('"', "\\\"");
    format!(" \"{escaped}\"")
}

fn is_remote(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Store key for a URL: its hash plus the extension from the URL path.
pub fn asset_key(url: &str) -> String {
    format!("{}{}", hash_url(url), infer_extension(url))
}

/// Extension (with dot, lowercased) of the last URL path segment.
///
/// Query strings and fragments are ignored. Falls back to `.jpg` when the
/// segment has no plausible extension.
pub fn infer_extension(url: &str) -> String {
    let path = match reqwest::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or("").to_string(),
    };
    let segment = path.rsplit('/').next().unwrap_or("");
    match segment.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!(".{}", ext.to_ascii_lowercase())
        }
        _ => DEFAULT_EXTENSION.to_string(),
    }
}

fn package_path(key: &str) -> String {
    format!("{PACKAGE_IMAGES_DIR}/{key}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DirStore;
    use crate::test_helpers::{StubFetcher, jpeg_bytes, png_bytes};
    use tempfile::TempDir;

    fn resolver<'a>(fetcher: &'a StubFetcher, store: &'a DirStore) -> ImageResolver<'a> {
        ImageResolver::new(fetcher, store, DownscaleParams::default())
    }

    // =========================================================================
    // Rewriting and caching
    // =========================================================================

    #[test]
    fn repeated_url_fetched_once_and_rewritten_identically() {
        let tmp = TempDir::new().unwrap();
        let store = DirStore::new(tmp.path());
        let fetcher = StubFetcher::new().with("http://x/a.png", png_bytes(10, 10));

        let body = "![cat](http://x/a.png)\n\ntext\n\n![cat](http://x/a.png)";
        let resolved = resolver(&fetcher, &store).resolve(body);

        assert_eq!(fetcher.calls(), vec!["http://x/a.png"]);
        let expected = format!("![cat](images/{})", asset_key("http://x/a.png"));
        assert_eq!(resolved.body.matches(&expected).count(), 2);
        assert_eq!(resolved.stats.fetched, 1);
        assert!(store.has(&asset_key("http://x/a.png")));
    }

    #[test]
    fn rerun_with_warm_store_fetches_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = DirStore::new(tmp.path());
        let body = "![a](http://x/a.png) ![b](http://x/b.jpg)";

        let first = StubFetcher::new()
            .with("http://x/a.png", png_bytes(5, 5))
            .with("http://x/b.jpg", jpeg_bytes(5, 5));
        let first_pass = resolver(&first, &store).resolve(body);
        assert_eq!(first.calls().len(), 2);

        let second = StubFetcher::new();
        let second_pass = resolver(&second, &store).resolve(body);
        assert!(second.calls().is_empty());
        assert_eq!(second_pass.body, first_pass.body);
        assert_eq!(second_pass.stats.hits, 2);
    }

    #[test]
    fn surrounding_text_passes_through() {
        let tmp = TempDir::new().unwrap();
        let store = DirStore::new(tmp.path());
        let fetcher = StubFetcher::new().with("http://x/a.png", png_bytes(5, 5));
        let body = "# Title\n\nA [link](http://x/page) then ![a](http://x/a.png) end.";
        let resolved = resolver(&fetcher, &store).resolve(body);
        assert_eq!(
            resolved.body,
            format!(
                "# Title\n\nA [link](http://x/page) then ![a](images/{}) end.",
                asset_key("http://x/a.png")
            )
        );
        assert_eq!(fetcher.calls(), vec!["http://x/a.png"]);
    }

    #[test]
    fn body_without_images_is_unchanged() {
        let tmp = TempDir::new().unwrap();
        let store = DirStore::new(tmp.path());
        let fetcher = StubFetcher::new();
        let body = "Plain *markdown* with [a link](https://example.com).";
        let resolved = resolver(&fetcher, &store).resolve(body);
        assert_eq!(resolved.body, body);
        assert_eq!(resolved.stats, ResolveStats::default());
    }

    #[test]
    fn keeps_title_attribute() {
        let tmp = TempDir::new().unwrap();
        let store = DirStore::new(tmp.path());
        let fetcher = StubFetcher::new().with("http://x/a.png", png_bytes(5, 5));
        let resolved = resolver(&fetcher, &store).resolve(r#"![a](http://x/a.png "A cat")"#);
        assert_eq!(
            resolved.body,
            format!(r#"![a](images/{} "A cat")"#, asset_key("http://x/a.png"))
        );
    }

    #[test]
    fn single_quoted_and_parenthesised_titles_are_found() {
        let tmp = TempDir::new().unwrap();
        let store = DirStore::new(tmp.path());
        let fetcher = StubFetcher::new().with("http://x/a.png", png_bytes(5, 5));
        let key = asset_key("http://x/a.png");

        let resolved = resolver(&fetcher, &store)
            .resolve("![a](http://x/a.png 'cat') ![b](http://x/a.png (dog))");

        assert_eq!(
            resolved.body,
            format!(r#"![a](images/{key} "cat") ![b](images/{key} "dog")"#)
        );
        assert!(!resolved.body.contains("http://"));
    }

    #[test]
    fn url_with_balanced_parentheses_is_kept_whole() {
        let tmp = TempDir::new().unwrap();
        let store = DirStore::new(tmp.path());
        let url = "https://x/File_(1).jpg";
        let fetcher = StubFetcher::new().with(url, jpeg_bytes(5, 5));

        let resolved = resolver(&fetcher, &store).resolve(&format!("![w]({url}) tail"));

        assert_eq!(fetcher.calls(), vec![url]);
        assert_eq!(resolved.body, format!("![w](images/{}) tail", asset_key(url)));
    }

    #[test]
    fn angle_bracket_destination_is_found() {
        let tmp = TempDir::new().unwrap();
        let store = DirStore::new(tmp.path());
        let fetcher = StubFetcher::new().with("http://x/a b.png", png_bytes(5, 5));

        let resolved = resolver(&fetcher, &store).resolve("![a](<http://x/a b.png>)");

        assert_eq!(fetcher.calls(), vec!["http://x/a b.png"]);
        assert_eq!(resolved.body, format!("![a](images/{})", asset_key("http://x/a b.png")));
    }

    #[test]
    fn reference_style_image_becomes_inline() {
        let tmp = TempDir::new().unwrap();
        let store = DirStore::new(tmp.path());
        let fetcher = StubFetcher::new().with("http://x/a.png", png_bytes(5, 5));

        let resolved =
            resolver(&fetcher, &store).resolve("See ![cat][pic].\n\n[pic]: http://x/a.png\n");

        assert!(resolved.body.starts_with(&format!(
            "See ![cat](images/{}).",
            asset_key("http://x/a.png")
        )));
        assert_eq!(resolved.stats.fetched, 1);
    }

    #[test]
    fn image_syntax_in_code_is_not_an_image() {
        let tmp = TempDir::new().unwrap();
        let store = DirStore::new(tmp.path());
        let fetcher = StubFetcher::new();
        let body = "Write `![a](http://x/a.png)` for pictures.";

        let resolved = resolver(&fetcher, &store).resolve(body);

        assert_eq!(resolved.body, body);
        assert!(fetcher.calls().is_empty());
    }

    #[test]
    fn alt_text_markup_is_preserved() {
        let tmp = TempDir::new().unwrap();
        let store = DirStore::new(tmp.path());
        let fetcher = StubFetcher::new().with("http://x/a.png", png_bytes(5, 5));

        let resolved = resolver(&fetcher, &store).resolve("![a *big* cat](http://x/a.png)");

        assert_eq!(
            resolved.body,
            format!("![a *big* cat](images/{})", asset_key("http://x/a.png"))
        );
    }

    #[test]
    fn title_quotes_are_escaped() {
        assert_eq!(title_suffix(""), "");
        assert_eq!(title_suffix(r#"say "hi""#), r#" "say \"hi\"""#);
    }

    // =========================================================================
    // Failure policy
    // =========================================================================

    #[test]
    fn failed_fetch_drops_reference_keeps_alt() {
        let tmp = TempDir::new().unwrap();
        let store = DirStore::new(tmp.path());
        let fetcher = StubFetcher::new();
        let resolved =
            resolver(&fetcher, &store).resolve("Before ![a lost cat](http://x/404.png) after");
        assert_eq!(resolved.body, "Before a lost cat after");
        assert_eq!(resolved.stats.failed, 1);
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn failed_url_is_not_retried_within_body() {
        let tmp = TempDir::new().unwrap();
        let store = DirStore::new(tmp.path());
        let fetcher = StubFetcher::new();
        resolver(&fetcher, &store).resolve("![](http://x/404.png) ![](http://x/404.png)");
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[test]
    fn local_reference_is_dropped() {
        let tmp = TempDir::new().unwrap();
        let store = DirStore::new(tmp.path());
        let fetcher = StubFetcher::new();
        let resolved = resolver(&fetcher, &store).resolve("![pic](attachments/pic.png)");
        assert_eq!(resolved.body, "pic");
        assert!(fetcher.calls().is_empty());
    }

    #[test]
    fn already_resolved_reference_is_kept() {
        let tmp = TempDir::new().unwrap();
        let store = DirStore::new(tmp.path());
        store.put("abc.png", &png_bytes(2, 2)).unwrap();
        let fetcher = StubFetcher::new();
        let resolved = resolver(&fetcher, &store).resolve("![x](images/abc.png)");
        assert_eq!(resolved.body, "![x](images/abc.png)");
        assert_eq!(resolved.stats.hits, 1);
    }

    #[test]
    fn local_reference_escaping_the_store_is_dropped() {
        let tmp = TempDir::new().unwrap();
        let inner = tmp.path().join("imaxes");
        std::fs::create_dir(&inner).unwrap();
        std::fs::write(tmp.path().join("x.png"), png_bytes(2, 2)).unwrap();
        std::fs::write(inner.join(".hidden"), b"x").unwrap();
        let store = DirStore::new(&inner);
        let fetcher = StubFetcher::new();

        let resolved =
            resolver(&fetcher, &store).resolve("![up](images/../x.png) ![dot](images/.hidden)");

        assert_eq!(resolved.body, "up dot");
        assert_eq!(resolved.stats.failed, 2);
    }

    // =========================================================================
    // Downscaling
    // =========================================================================

    #[test]
    fn oversized_image_is_stored_downscaled() {
        let tmp = TempDir::new().unwrap();
        let store = DirStore::new(tmp.path());
        let fetcher = StubFetcher::new().with("http://x/big.jpg", jpeg_bytes(1200, 1600));
        resolver(&fetcher, &store).resolve("![big](http://x/big.jpg)");

        let stored = store.get(&asset_key("http://x/big.jpg")).unwrap();
        let img = image::load_from_memory(&stored).unwrap();
        assert_eq!((img.width(), img.height()), (600, 800));
    }

    #[test]
    fn undecodable_image_is_stored_as_is() {
        let tmp = TempDir::new().unwrap();
        let store = DirStore::new(tmp.path());
        let fetcher = StubFetcher::new().with("http://x/odd.svg", b"<svg/>".to_vec());
        let resolved = resolver(&fetcher, &store).resolve("![odd](http://x/odd.svg)");

        let key = asset_key("http://x/odd.svg");
        assert_eq!(store.get(&key).unwrap(), b"<svg/>");
        assert_eq!(resolved.body, format!("![odd](images/{key})"));
    }

    // =========================================================================
    // Keys and extensions
    // =========================================================================

    #[test]
    fn extension_from_url_path() {
        assert_eq!(infer_extension("http://x/a.png"), ".png");
        assert_eq!(infer_extension("https://x/dir/photo.JPEG"), ".jpeg");
    }

    #[test]
    fn extension_ignores_query_and_fragment() {
        assert_eq!(infer_extension("https://x/a.webp?w=200&fmt=.gif"), ".webp");
        assert_eq!(infer_extension("https://x/a.gif#frag"), ".gif");
    }

    #[test]
    fn extension_defaults_to_jpg() {
        assert_eq!(infer_extension("https://x/image"), ".jpg");
        assert_eq!(infer_extension("https://x/"), ".jpg");
        assert_eq!(infer_extension("https://x.org"), ".jpg");
        assert_eq!(infer_extension("https://x/.hidden"), ".jpg");
        assert_eq!(infer_extension("https://x/a.toolongext"), ".jpg");
    }

    #[test]
    fn asset_key_combines_hash_and_extension() {
        let key = asset_key("http://x/a.png");
        assert_eq!(key, format!("{}.png", hash_url("http://x/a.png")));
    }
}
