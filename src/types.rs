//! Shared types passed between pipeline stages.
//!
//! A [`Document`] is produced by selection, carried through relocation, and
//! turned into a [`Chapter`] by conversion. Documents are never mutated in
//! place; relocation produces a new value pointing at the copied file.

use crate::frontmatter::Frontmatter;
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

/// One dated note selected for the package.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Where the note currently lives.
    pub path: PathBuf,
    pub frontmatter: Frontmatter,
    /// Markdown after the frontmatter header.
    pub body: String,
    pub date: NaiveDateTime,
}

impl Document {
    /// Title from the `title` key, falling back to the filename stem.
    pub fn title(&self) -> String {
        self.frontmatter
            .get("title")
            .filter(|t| !t.is_empty())
            .cloned()
            .unwrap_or_else(|| file_stem(&self.path))
    }

    /// The same note, now living at `path`.
    pub fn relocated(&self, path: PathBuf) -> Self {
        Self {
            path,
            ..self.clone()
        }
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// One converted document inside the package.
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub title: String,
    /// 1-based, matching selection order.
    pub ordinal: usize,
    /// Complete XHTML page.
    pub markup: String,
}

impl Chapter {
    /// File name inside the package, e.g. `chapter_3.xhtml`.
    pub fn file_name(&self) -> String {
        format!("chapter_{}.xhtml", self.ordinal)
    }

    /// Manifest id, e.g. `chapter_3`.
    pub fn id(&self) -> String {
        format!("chapter_{}", self.ordinal)
    }
}
