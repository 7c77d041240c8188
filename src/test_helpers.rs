//! Shared test utilities for the riloe test suite.
//!
//! Note writers for temp folders, a recording fetcher that never touches the
//! network, and small synthetic images.
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = tempfile::TempDir::new().unwrap();
//! write_note(tmp.path(), "a.md", Some("2024-01-05"), Some("Alpha"), "Body");
//!
//! let fetcher = StubFetcher::new().with("http://x/a.png", png_bytes(10, 10));
//! ```

use crate::fetch::{FetchError, Fetcher};
use crate::frontmatter::Frontmatter;
use crate::select::parse_date;
use crate::types::Document;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

// =========================================================================
// Notes
// =========================================================================

/// Write a note with an optional `date` and `title` header.
pub fn write_note(
    dir: &Path,
    name: &str,
    date: Option<&str>,
    title: Option<&str>,
    body: &str,
) -> PathBuf {
    let mut text = String::from("---\n");
    if let Some(d) = date {
        text.push_str(&format!("date: {d}\n"));
    }
    if let Some(t) = title {
        text.push_str(&format!("title: \"{t}\"\n"));
    }
    text.push_str("tags: notes\n---\n");
    text.push_str(body);
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

/// In-memory document without a title key; its title is the file stem.
pub fn dated_doc(name: &str, date: &str) -> Document {
    let mut frontmatter = Frontmatter::new();
    frontmatter.insert("date".into(), date.into());
    Document {
        path: PathBuf::from(name),
        frontmatter,
        body: String::new(),
        date: parse_date(date).unwrap(),
    }
}

// =========================================================================
// Fetching
// =========================================================================

/// Fetcher serving canned bodies and recording every requested URL.
///
/// Unknown URLs fail with [`FetchError::Status`] 404.
#[derive(Default)]
pub struct StubFetcher {
    responses: HashMap<String, Vec<u8>>,
    calls: RefCell<Vec<String>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, body: Vec<u8>) -> Self {
        self.responses.insert(url.to_string(), body);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl Fetcher for StubFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.borrow_mut().push(url.to_string());
        self.responses.get(url).cloned().ok_or(FetchError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}

// =========================================================================
// Images
// =========================================================================

fn synthetic(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    }))
}

/// Encoded PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageFormat::Png)
}

/// Encoded JPEG of the given size.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageFormat::Jpeg)
}

fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    synthetic(width, height).write_to(&mut buf, format).unwrap();
    buf.into_inner()
}
