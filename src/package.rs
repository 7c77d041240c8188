//! EPUB assembly.
//!
//! Final stage of the pipeline. Packs converted chapters and every stored
//! image into one EPUB 3 file that also carries an EPUB 2 NCX, so older
//! readers get a table of contents too.
//!
//! ## Container Layout
//!
//! ```text
//! 2026-10-17.epub
//! ├── mimetype                 # first entry, uncompressed
//! ├── META-INF/container.xml
//! └── OEBPS/
//!     ├── content.opf          # metadata, manifest, spine
//!     ├── toc.ncx              # EPUB 2 navigation
//!     ├── nav.xhtml            # EPUB 3 navigation
//!     ├── chapter_1.xhtml
//!     ├── chapter_2.xhtml
//!     └── images/
//!         └── 5d1e…c3.png
//! ```
//!
//! The table of contents has a single section, named after the package,
//! listing every chapter in order.
//!
//! The package is written to a `.part` file and renamed once complete, so a
//! failed assembly never leaves a truncated `.epub` behind.

use crate::cache::AssetStore;
use crate::config::{PackageConfig, PackageIdentity};
use crate::resolve::PACKAGE_IMAGES_DIR;
use crate::types::{Chapter, Document};
use chrono::NaiveDate;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::BTreeSet;
use std::fmt::Display;
use std::fs;
use std::io::{self, Seek, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("XML error: {0}")]
    Xml(String),
    #[error("Cannot read image {key}: {source}")]
    Asset {
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("Chapter {chapter} references missing image {reference}")]
    MissingAsset { chapter: String, reference: String },
    #[error("Chapter {chapter} is not well-formed XML: {message}")]
    Malformed { chapter: String, message: String },
}

const MIMETYPE: &str = "application/epub+zip";
const CONTENT_DIR: &str = "OEBPS";
const OPF_NAME: &str = "content.opf";
const NCX_NAME: &str = "toc.ncx";
const NAV_NAME: &str = "nav.xhtml";
const IDENTIFIER_PREFIX: &str = "riloe";

/// Descriptive metadata for one package.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageMeta {
    pub identifier: String,
    pub title: String,
    pub author: String,
    pub language: String,
    /// Date of the run; names the output file.
    pub date: NaiveDate,
}

impl PackageMeta {
    /// Derive identifier and title according to `config.identity`.
    ///
    /// `documents` are the selected notes, oldest first. With no documents the
    /// run date is used whatever the identity setting.
    pub fn for_run(config: &PackageConfig, today: NaiveDate, documents: &[Document]) -> Self {
        let span = match (config.identity, documents.first(), documents.last()) {
            (PackageIdentity::InputRange, Some(first), Some(last)) => {
                let (first, last) = (first.date.date(), last.date.date());
                if first == last {
                    first.to_string()
                } else {
                    format!("{first}_{last}")
                }
            }
            _ => today.to_string(),
        };
        let label = span.replace('_', " – ");
        Self {
            identifier: format!("{IDENTIFIER_PREFIX}-{span}"),
            title: format!("{} {label}", config.title_prefix).trim().to_string(),
            author: config.author.clone(),
            language: config.language.clone(),
            date: today,
        }
    }

    /// Output file name, e.g. `2026-10-17.epub`.
    pub fn file_name(&self) -> String {
        format!("{}.epub", self.date.format("%Y-%m-%d"))
    }
}

/// Media type for a stored image, by extension. Unknown types are JPEG.
pub fn media_type(key: &str) -> &'static str {
    let ext = key
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "image/jpeg",
    }
}

/// Write the package into `output_dir` and return its path.
///
/// An existing package is never replaced: a second run on the same day
/// writes `<date>-2.epub`, then `<date>-3.epub`, and so on.
pub fn assemble(
    meta: &PackageMeta,
    chapters: &[Chapter],
    store: &dyn AssetStore,
    output_dir: &Path,
) -> Result<PathBuf, PackageError> {
    let target = unused_target(output_dir, meta);
    let partial = output_dir.join(format!("{}.part", file_name_of(&target)));

    let result = fs::File::create(&partial)
        .map_err(PackageError::from)
        .and_then(|file| write_epub(meta, chapters, store, file))
        .and_then(|file| file.sync_all().map_err(PackageError::from))
        .and_then(|()| fs::rename(&partial, &target).map_err(PackageError::from));

    match result {
        Ok(()) => {
            info!("Wrote {} ({} chapters)", target.display(), chapters.len());
            Ok(target)
        }
        Err(e) => {
            let _ = fs::remove_file(&partial);
            Err(e)
        }
    }
}

fn unused_target(output_dir: &Path, meta: &PackageMeta) -> PathBuf {
    let first = output_dir.join(meta.file_name());
    if !first.exists() {
        return first;
    }
    let stem = meta.date.format("%Y-%m-%d").to_string();
    let next = (2..)
        .map(|n| output_dir.join(format!("{stem}-{n}.epub")))
        .find(|path| !path.exists())
        .unwrap_or_else(|| first.clone());
    warn!("{} already exists, writing {}", first.display(), next.display());
    next
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Serialize the package to any seekable writer and hand the writer back.
pub fn write_epub<W: Write + Seek>(
    meta: &PackageMeta,
    chapters: &[Chapter],
    store: &dyn AssetStore,
    writer: W,
) -> Result<W, PackageError> {
    let keys = store.keys()?;
    check_image_references(chapters, &keys)?;

    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut zip = ZipWriter::new(writer);

    zip.start_file("mimetype", stored)?;
    zip.write_all(MIMETYPE.as_bytes())?;

    zip.start_file("META-INF/container.xml", deflated)?;
    zip.write_all(&container_xml()?)?;

    zip.start_file(format!("{CONTENT_DIR}/{OPF_NAME}"), deflated)?;
    zip.write_all(&content_opf(meta, chapters, &keys)?)?;

    zip.start_file(format!("{CONTENT_DIR}/{NCX_NAME}"), deflated)?;
    zip.write_all(&toc_ncx(meta, chapters)?)?;

    zip.start_file(format!("{CONTENT_DIR}/{NAV_NAME}"), deflated)?;
    zip.write_all(&nav_xhtml(meta, chapters)?)?;

    for chapter in chapters {
        zip.start_file(format!("{CONTENT_DIR}/{}", chapter.file_name()), deflated)?;
        zip.write_all(chapter.markup.as_bytes())?;
    }

    for key in &keys {
        let bytes = store.get(key).map_err(|source| PackageError::Asset {
            key: key.clone(),
            source,
        })?;
        zip.start_file(format!("{CONTENT_DIR}/{PACKAGE_IMAGES_DIR}/{key}"), stored)?;
        zip.write_all(&bytes)?;
    }
    debug!("Embedded {} images", keys.len());

    Ok(zip.finish()?)
}

/// Every chapter must parse as XML, and every `<img src>` in it must be
/// `images/<key>` for a stored key.
fn check_image_references(chapters: &[Chapter], keys: &[String]) -> Result<(), PackageError> {
    let available: BTreeSet<&str> = keys.iter().map(String::as_str).collect();
    for chapter in chapters {
        let sources = image_sources(&chapter.markup).map_err(|message| PackageError::Malformed {
            chapter: chapter.file_name(),
            message,
        })?;
        for src in sources {
            let embedded = src
                .strip_prefix(PACKAGE_IMAGES_DIR)
                .and_then(|rest| rest.strip_prefix('/'))
                .is_some_and(|key| available.contains(key));
            if !embedded {
                return Err(PackageError::MissingAsset {
                    chapter: chapter.file_name(),
                    reference: src,
                });
            }
        }
    }
    Ok(())
}

/// `src` of every `img` element in `markup`.
fn image_sources(markup: &str) -> Result<Vec<String>, String> {
    let mut reader = Reader::from_str(markup);
    let mut sources = Vec::new();
    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"img" => {
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| e.to_string())?;
                    if attr.key.as_ref() == b"src" {
                        let value = attr.unescape_value().map_err(|e| e.to_string())?;
                        sources.push(value.into_owned());
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(sources)
}

// ============================================================================
// XML documents
// ============================================================================

fn xml_error(e: impl Display) -> PackageError {
    PackageError::Xml(e.to_string())
}

/// Thin event writer over `quick_xml` with escaping handled by the crate.
struct XmlDoc {
    writer: Writer<Vec<u8>>,
}

impl XmlDoc {
    fn new() -> Result<Self, PackageError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_error)?;
        Ok(Self { writer })
    }

    fn raw(&mut self, text: &str) {
        self.writer.get_mut().extend_from_slice(text.as_bytes());
    }

    fn open(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), PackageError> {
        let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.writer.write_event(Event::Start(start)).map_err(xml_error)
    }

    fn close(&mut self, name: &str) -> Result<(), PackageError> {
        self.writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(xml_error)
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), PackageError> {
        let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.writer.write_event(Event::Empty(start)).map_err(xml_error)
    }

    fn text_element(
        &mut self,
        name: &str,
        attrs: &[(&str, &str)],
        text: &str,
    ) -> Result<(), PackageError> {
        let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.writer.write_event(Event::Start(start)).map_err(xml_error)?;
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_error)?;
        self.close(name)
    }

    fn finish(self) -> Vec<u8> {
        self.writer.into_inner()
    }
}

fn container_xml() -> Result<Vec<u8>, PackageError> {
    let opf_path = format!("{CONTENT_DIR}/{OPF_NAME}");
    let mut doc = XmlDoc::new()?;
    doc.open(
        "container",
        &[
            ("version", "1.0"),
            ("xmlns", "urn:oasis:names:tc:opendocument:xmlns:container"),
        ],
    )?;
    doc.open("rootfiles", &[])?;
    doc.empty(
        "rootfile",
        &[
            ("full-path", opf_path.as_str()),
            ("media-type", "application/oebps-package+xml"),
        ],
    )?;
    doc.close("rootfiles")?;
    doc.close("container")?;
    Ok(doc.finish())
}

fn content_opf(
    meta: &PackageMeta,
    chapters: &[Chapter],
    keys: &[String],
) -> Result<Vec<u8>, PackageError> {
    let date = meta.date.format("%Y-%m-%d").to_string();
    let modified = format!("{date}T00:00:00Z");

    let mut doc = XmlDoc::new()?;
    doc.open(
        "package",
        &[
            ("xmlns", "http://www.idpf.org/2007/opf"),
            ("version", "3.0"),
            ("unique-identifier", "book-id"),
            ("xml:lang", meta.language.as_str()),
        ],
    )?;

    doc.open(
        "metadata",
        &[
            ("xmlns:dc", "http://purl.org/dc/elements/1.1/"),
            ("xmlns:opf", "http://www.idpf.org/2007/opf"),
        ],
    )?;
    doc.text_element("dc:identifier", &[("id", "book-id")], &meta.identifier)?;
    doc.text_element("dc:title", &[], &meta.title)?;
    doc.text_element("dc:creator", &[("id", "creator")], &meta.author)?;
    doc.text_element("dc:language", &[], &meta.language)?;
    doc.text_element("dc:date", &[], &date)?;
    doc.text_element("meta", &[("property", "dcterms:modified")], &modified)?;
    doc.close("metadata")?;

    doc.open("manifest", &[])?;
    doc.empty(
        "item",
        &[
            ("id", "ncx"),
            ("href", NCX_NAME),
            ("media-type", "application/x-dtbncx+xml"),
        ],
    )?;
    doc.empty(
        "item",
        &[
            ("id", "nav"),
            ("href", NAV_NAME),
            ("media-type", "application/xhtml+xml"),
            ("properties", "nav"),
        ],
    )?;
    for chapter in chapters {
        let (id, href) = (chapter.id(), chapter.file_name());
        doc.empty(
            "item",
            &[
                ("id", id.as_str()),
                ("href", href.as_str()),
                ("media-type", "application/xhtml+xml"),
            ],
        )?;
    }
    for (i, key) in keys.iter().enumerate() {
        let id = format!("image_{}", i + 1);
        let href = format!("{PACKAGE_IMAGES_DIR}/{key}");
        doc.empty(
            "item",
            &[
                ("id", id.as_str()),
                ("href", href.as_str()),
                ("media-type", media_type(key)),
            ],
        )?;
    }
    doc.close("manifest")?;

    doc.open("spine", &[("toc", "ncx")])?;
    doc.empty("itemref", &[("idref", "nav")])?;
    for chapter in chapters {
        let id = chapter.id();
        doc.empty("itemref", &[("idref", id.as_str())])?;
    }
    doc.close("spine")?;

    doc.close("package")?;
    Ok(doc.finish())
}

fn toc_ncx(meta: &PackageMeta, chapters: &[Chapter]) -> Result<Vec<u8>, PackageError> {
    let mut doc = XmlDoc::new()?;
    doc.open(
        "ncx",
        &[
            ("xmlns", "http://www.daisy.org/z3986/2005/ncx/"),
            ("version", "2005-1"),
        ],
    )?;

    doc.open("head", &[])?;
    doc.empty("meta", &[("name", "dtb:uid"), ("content", meta.identifier.as_str())])?;
    doc.empty("meta", &[("name", "dtb:depth"), ("content", "2")])?;
    doc.empty("meta", &[("name", "dtb:totalPageCount"), ("content", "0")])?;
    doc.empty("meta", &[("name", "dtb:maxPageNumber"), ("content", "0")])?;
    doc.close("head")?;

    doc.open("docTitle", &[])?;
    doc.text_element("text", &[], &meta.title)?;
    doc.close("docTitle")?;

    doc.open("navMap", &[])?;
    if let Some(first) = chapters.first() {
        let first_href = first.file_name();
        // The section shares play order 1 with the chapter it opens on.
        doc.open("navPoint", &[("id", "section"), ("playOrder", "1")])?;
        nav_label(&mut doc, &meta.title, &first_href)?;
        for chapter in chapters {
            let id = format!("nav_{}", chapter.id());
            let order = chapter.ordinal.to_string();
            doc.open("navPoint", &[("id", id.as_str()), ("playOrder", order.as_str())])?;
            nav_label(&mut doc, &chapter.title, &chapter.file_name())?;
            doc.close("navPoint")?;
        }
        doc.close("navPoint")?;
    }
    doc.close("navMap")?;

    doc.close("ncx")?;
    Ok(doc.finish())
}

fn nav_label(doc: &mut XmlDoc, label: &str, href: &str) -> Result<(), PackageError> {
    doc.open("navLabel", &[])?;
    doc.text_element("text", &[], label)?;
    doc.close("navLabel")?;
    doc.empty("content", &[("src", href)])
}

fn nav_xhtml(meta: &PackageMeta, chapters: &[Chapter]) -> Result<Vec<u8>, PackageError> {
    let mut doc = XmlDoc::new()?;
    doc.raw("\n<!DOCTYPE html>");
    doc.open(
        "html",
        &[
            ("xmlns", "http://www.w3.org/1999/xhtml"),
            ("xmlns:epub", "http://www.idpf.org/2007/ops"),
            ("lang", meta.language.as_str()),
            ("xml:lang", meta.language.as_str()),
        ],
    )?;
    doc.open("head", &[])?;
    doc.text_element("title", &[], &meta.title)?;
    doc.close("head")?;

    doc.open("body", &[])?;
    doc.open("nav", &[("epub:type", "toc"), ("id", "toc")])?;
    doc.text_element("h1", &[], &meta.title)?;
    doc.open("ol", &[])?;
    doc.open("li", &[])?;
    doc.text_element("span", &[], &meta.title)?;
    doc.open("ol", &[])?;
    for chapter in chapters {
        let href = chapter.file_name();
        doc.open("li", &[])?;
        doc.text_element("a", &[("href", href.as_str())], &chapter.title)?;
        doc.close("li")?;
    }
    doc.close("ol")?;
    doc.close("li")?;
    doc.close("ol")?;
    doc.close("nav")?;
    doc.close("body")?;

    doc.close("html")?;
    Ok(doc.finish())
}
