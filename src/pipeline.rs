//! End-to-end run: notes folder in, EPUB out.
//!
//! ```text
//! Validate → Select → Relocate → Resolve + Convert → Assemble → Finalize
//! ```
//!
//! Validation and selection touch nothing on disk, so a run that fails there
//! leaves the notes folder exactly as it was. From relocation on, the layout
//! under the notes folder is:
//!
//! ```text
//! notes/
//! ├── 2024-01-05 walk.md       # removed once the package is written
//! └── epub/
//!     ├── 2024-01-05 walk.md   # relocated copy
//!     ├── 2026-10-17.epub
//!     └── imaxes/              # image cache, reused across runs
//! ```
//!
//! Relocation copies first and deletes the originals only after assembly
//! succeeds. If assembly fails the copies are removed again, so a failed run
//! leaves every note where it was. A note whose name is already taken in the
//! output folder (a same-named note moved by an earlier run) is not copied:
//! it is reported and left in place, and the earlier note is untouched.

use crate::cache::{DirStore, ResolveStats};
use crate::config::{ConfigError, RiloeConfig};
use crate::convert::to_chapter;
use crate::fetch::Fetcher;
use crate::imaging::DownscaleParams;
use crate::package::{PackageError, PackageMeta, assemble};
use crate::resolve::ImageResolver;
use crate::select::{SelectError, Skipped, select_documents};
use crate::types::Document;
use chrono::NaiveDate;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Input path does not exist: {0}")]
    InputMissing(PathBuf),
    #[error("Input path is not a folder: {0}")]
    NotADirectory(PathBuf),
    #[error("No dated notes found in {0}")]
    NoDocuments(PathBuf),
    #[error("Cannot read folder {0}: {1}")]
    Folder(PathBuf, #[source] walkdir::Error),
    #[error("Cannot create output folder {0}: {1}")]
    OutputFolder(PathBuf, #[source] std::io::Error),
    #[error("None of the selected notes could be relocated")]
    NothingRelocated,
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Failed to write package: {0}")]
    Package(#[from] PackageError),
}

impl From<SelectError> for PipelineError {
    fn from(e: SelectError) -> Self {
        match e {
            SelectError::Folder(path, source) => PipelineError::Folder(path, source),
            SelectError::NoDocuments(path) => PipelineError::NoDocuments(path),
        }
    }
}

/// A note that could not be copied into the output folder.
#[derive(Debug, Clone, PartialEq)]
pub struct RelocationFailure {
    pub path: PathBuf,
    pub message: String,
}

/// What a successful run produced.
#[derive(Debug)]
pub struct RunReport {
    pub package: PathBuf,
    /// Chapter titles in reading order.
    pub chapters: Vec<String>,
    /// Notes passed over during selection.
    pub skipped: Vec<Skipped>,
    /// Dated notes found, before truncation to the requested count.
    pub qualifying: usize,
    pub relocation_failures: Vec<RelocationFailure>,
    /// Originals that were relocated but could not be removed.
    pub leftovers: Vec<PathBuf>,
    pub images: ResolveStats,
}

/// Convert the `count` oldest notes in `input` into one package.
///
/// `today` names the package and, by default, its identity.
pub fn run(
    input: &Path,
    count: usize,
    config: &RiloeConfig,
    fetcher: &dyn Fetcher,
    today: NaiveDate,
) -> Result<RunReport, PipelineError> {
    validate_input(input)?;
    if count == 0 {
        return Err(ConfigError::Validation("note count must be at least 1".into()).into());
    }
    config.validate()?;

    let selection = select_documents(input, count)?;
    info!(
        "Selected {} of {} dated notes in {}",
        selection.documents.len(),
        selection.qualifying,
        input.display()
    );

    let output_dir = input.join(&config.layout.output_dir);
    let images_dir = output_dir.join(&config.layout.images_dir);
    fs::create_dir_all(&images_dir)
        .map_err(|e| PipelineError::OutputFolder(images_dir.clone(), e))?;

    let (relocated, relocation_failures) = relocate(&selection.documents, &output_dir);
    if relocated.is_empty() {
        return Err(PipelineError::NothingRelocated);
    }

    let store = DirStore::new(&images_dir);
    let params = DownscaleParams::from_config(&config.images);
    let resolver = ImageResolver::new(fetcher, &store, params);
    let language = &config.package.language;

    let mut images = ResolveStats::default();
    let mut chapters = Vec::with_capacity(relocated.len());
    for (copy, _) in &relocated {
        let resolved = resolver.resolve(&copy.body);
        debug!("{}: {}", copy.path.display(), resolved.stats);
        images.absorb(resolved.stats);
        chapters.push(to_chapter(copy, &resolved.body, chapters.len() + 1, language));
    }
    info!("Images: {images}");

    let copies: Vec<Document> = relocated.iter().map(|(copy, _)| copy.clone()).collect();
    let meta = PackageMeta::for_run(&config.package, today, &copies);
    let package = match assemble(&meta, &chapters, &store, &output_dir) {
        Ok(package) => package,
        Err(e) => {
            discard_copies(relocated.iter().map(|(copy, _)| copy.path.as_path()));
            return Err(e.into());
        }
    };

    let leftovers = finalize(relocated.iter().map(|(_, original)| original.as_path()));

    Ok(RunReport {
        package,
        chapters: chapters.into_iter().map(|c| c.title).collect(),
        skipped: selection.skipped,
        qualifying: selection.qualifying,
        relocation_failures,
        leftovers,
        images,
    })
}

fn validate_input(input: &Path) -> Result<(), PipelineError> {
    if !input.exists() {
        return Err(PipelineError::InputMissing(input.to_path_buf()));
    }
    if !input.is_dir() {
        return Err(PipelineError::NotADirectory(input.to_path_buf()));
    }
    Ok(())
}

/// Copy each document into `output_dir`.
///
/// Returns the relocated copies paired with their original paths, in input
/// order, and the documents that could not be copied.
fn relocate(
    documents: &[Document],
    output_dir: &Path,
) -> (Vec<(Document, PathBuf)>, Vec<RelocationFailure>) {
    let mut relocated = Vec::with_capacity(documents.len());
    let mut failures = Vec::new();

    for doc in documents {
        let Some(name) = doc.path.file_name() else {
            continue;
        };
        let target = output_dir.join(name);
        match copy_new(&doc.path, &target) {
            Ok(()) => {
                debug!("Copied {} → {}", doc.path.display(), target.display());
                relocated.push((doc.relocated(target), doc.path.clone()));
            }
            Err(e) => {
                let message = if e.kind() == ErrorKind::AlreadyExists {
                    format!("{} already exists", target.display())
                } else {
                    e.to_string()
                };
                warn!("Cannot relocate {}: {message}", doc.path.display());
                failures.push(RelocationFailure {
                    path: doc.path.clone(),
                    message,
                });
            }
        }
    }

    (relocated, failures)
}

/// Copy `from` to `to`, failing if `to` already exists.
fn copy_new(from: &Path, to: &Path) -> io::Result<()> {
    let mut source = File::open(from)?;
    let mut target = OpenOptions::new().write(true).create_new(true).open(to)?;
    if let Err(e) = io::copy(&mut source, &mut target).and_then(|_| target.sync_all()) {
        drop(target);
        let _ = fs::remove_file(to);
        return Err(e);
    }
    Ok(())
}

/// Undo relocation after a failed assembly.
fn discard_copies<'a>(copies: impl Iterator<Item = &'a Path>) {
    for copy in copies {
        if let Err(e) = fs::remove_file(copy) {
            warn!("Cannot remove copy {}: {e}", copy.display());
        }
    }
}

/// Remove the originals of relocated notes. Returns those that remain.
fn finalize<'a>(originals: impl Iterator<Item = &'a Path>) -> Vec<PathBuf> {
    let mut leftovers = Vec::new();
    for original in originals {
        if let Err(e) = fs::remove_file(original) {
            warn!("Cannot remove {}: {e}", original.display());
            leftovers.push(original.to_path_buf());
        }
    }
    leftovers
}
