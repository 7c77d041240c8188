//! Document discovery and chronological selection.
//!
//! Stage 1 of the pipeline. Reads every markdown note directly inside the
//! input folder, keeps the ones whose frontmatter carries a parseable `date`,
//! and picks the oldest `count` of them.
//!
//! ```text
//! notes/
//! ├── 2024-01-05 standup.md     # date: 2024-01-05          → qualifies
//! ├── reading list.md           # no frontmatter            → skipped
//! ├── trip.md                   # date: 2024-02-11T08:00Z   → qualifies
//! └── drafts/                   # subfolders are not scanned
//! ```
//!
//! Problems with a single file (unreadable, no `date`, malformed `date`) are
//! logged and recorded in [`Selection::skipped`]; they never abort the scan.
//! An empty result is the only terminal condition.

use crate::frontmatter;
use crate::types::Document;
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum SelectError {
    #[error("Cannot read folder {0}: {1}")]
    Folder(PathBuf, #[source] walkdir::Error),
    #[error("No notes with a valid date found in {0}")]
    NoDocuments(PathBuf),
}

/// Date layouts accepted once any zone suffix has been removed.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Why a note was left out of the selection.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Unreadable(String),
    MissingDate,
    InvalidDate(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unreadable(e) => write!(f, "unreadable: {e}"),
            SkipReason::MissingDate => write!(f, "no date in frontmatter"),
            SkipReason::InvalidDate(raw) => write!(f, "invalid date {raw:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Skipped {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Result of scanning a folder and picking the notes to package.
#[derive(Debug)]
pub struct Selection {
    /// Selected notes, oldest first.
    pub documents: Vec<Document>,
    pub skipped: Vec<Skipped>,
    /// How many notes had a valid date before truncation.
    pub qualifying: usize,
}

/// Scan `folder` and select the `count` oldest dated notes.
pub fn select_documents(folder: &Path, count: usize) -> Result<Selection, SelectError> {
    let (documents, skipped) = scan_documents(folder)?;
    if documents.is_empty() {
        return Err(SelectError::NoDocuments(folder.to_path_buf()));
    }
    let qualifying = documents.len();
    Ok(Selection {
        documents: rank(documents, count),
        skipped,
        qualifying,
    })
}

/// Read every `.md` file directly inside `folder`, in file-name order.
///
/// Returns the notes with a valid date and the files that were passed over.
pub fn scan_documents(folder: &Path) -> Result<(Vec<Document>, Vec<Skipped>), SelectError> {
    let mut documents = Vec::new();
    let mut skipped = Vec::new();

    let walker = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(SelectError::Folder(folder.to_path_buf(), e));
            }
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {e}", folder.display());
                continue;
            }
        };
        let path = entry.path();
        if !is_markdown(path) {
            continue;
        }

        match load_document(path) {
            Ok(doc) => {
                debug!("Found {} dated {}", path.display(), doc.date);
                documents.push(doc);
            }
            Err(reason) => {
                warn!("Skipping {}: {reason}", path.display());
                skipped.push(Skipped {
                    path: path.to_path_buf(),
                    reason,
                });
            }
        }
    }

    Ok((documents, skipped))
}

/// Stable sort by date, oldest first, then keep the first `count`.
pub fn rank(mut documents: Vec<Document>, count: usize) -> Vec<Document> {
    documents.sort_by_key(|d| d.date);
    documents.truncate(count);
    documents
}

fn is_markdown(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("md"))
            .unwrap_or(false)
}

fn load_document(path: &Path) -> Result<Document, SkipReason> {
    let text = fs::read_to_string(path).map_err(|e| SkipReason::Unreadable(e.to_string()))?;
    let (frontmatter, body) = frontmatter::parse(&text);
    let raw_date = frontmatter.get("date").ok_or(SkipReason::MissingDate)?;
    let date = parse_date(raw_date).ok_or_else(|| SkipReason::InvalidDate(raw_date.clone()))?;
    let body = body.to_string();
    Ok(Document {
        path: path.to_path_buf(),
        frontmatter,
        body,
        date,
    })
}

/// Parse a frontmatter date.
///
/// A trailing `Z` or numeric offset (`+01:00`, `-0500`) is dropped, not
/// applied: notes are ordered by their local wall-clock time. The offset may
/// follow a bare date or be separated by a space. Date-only values sort as
/// midnight.
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let value = strip_zone(raw.trim());
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

fn strip_zone(value: &str) -> &str {
    let value = value.trim_end();
    if let Some(stripped) = value.strip_suffix(['Z', 'z']) {
        return stripped.trim_end();
    }
    let Some(pos) = value.rfind(['+', '-']) else {
        return value;
    };
    let (head, offset) = (&value[..pos], &value[pos + 1..]);
    // "2024-01-05" must keep its "-05": a bare `-hh` or `-hhmm` counts as an
    // offset only after a time.
    let stripped = if is_colon_offset(offset) {
        true
    } else if is_compact_offset(offset) {
        value[pos..].starts_with('+') || head.contains(':')
    } else {
        false
    };
    if stripped { head.trim_end() } else { value }
}

fn is_colon_offset(s: &str) -> bool {
    matches!(s.split_once(':'), Some((h, m)) if is_digits(h, 2) && is_digits(m, 2))
}

fn is_compact_offset(s: &str) -> bool {
    is_digits(s, 2) || is_digits(s, 4)
}

fn is_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}
