//! Content-addressed image cache.
//!
//! Remote images are fetched at most once per distinct URL. The cache key is
//! the SHA-256 of the URL plus the extension taken from the URL path, so the
//! same picture referenced from several notes, or on a later run, maps to the
//! same stored file.
//!
//! # Design
//!
//! The cache is an explicit capability, [`AssetStore`], rather than ad hoc
//! `exists()` checks in the fetch code. The production store is
//! [`DirStore`], which keeps one file per key in the images folder:
//!
//! ```text
//! notes/epub/imaxes/
//! ├── 3f1c…9a.png
//! └── b07e…12.jpg
//! ```
//!
//! A key counts as present only once its file is complete: [`DirStore::put`]
//! writes to a `.part` sibling and renames it into place. Keys are never
//! overwritten by the resolver; a present key is a hit.

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Suffix for in-flight writes; such files are not keys.
const PARTIAL_SUFFIX: &str = ".part";

/// Key/value storage for image assets.
pub trait AssetStore {
    /// Whether a complete asset is stored under `key`.
    fn has(&self, key: &str) -> bool;

    /// Store `bytes` under `key`.
    fn put(&self, key: &str, bytes: &[u8]) -> io::Result<()>;

    /// Read the asset stored under `key`.
    fn get(&self, key: &str) -> io::Result<Vec<u8>>;

    /// All stored keys, sorted.
    fn keys(&self) -> io::Result<Vec<String>>;
}

/// One file per key inside a directory.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Open a store rooted at `root`. The directory is not created.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl AssetStore for DirStore {
    fn has(&self, key: &str) -> bool {
        is_valid_key(key) && self.path_for(key).is_file()
    }

    fn put(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        let target = self.path_for(key);
        let partial = self.path_for(&format!("{key}{PARTIAL_SUFFIX}"));
        fs::write(&partial, bytes)?;
        fs::rename(&partial, &target)
    }

    fn get(&self, key: &str) -> io::Result<Vec<u8>> {
        fs::read(self.path_for(key))
    }

    fn keys(&self) -> io::Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if is_valid_key(&name) {
                keys.push(name);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Whether `key` names a plain, complete file directly in the store.
///
/// Rejects path separators, dotfiles (which covers `.` and `..`) and
/// in-flight `.part` files.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && !key.contains(['/', '\\'])
        && !key.ends_with(PARTIAL_SUFFIX)
}

/// SHA-256 of a URL, returned as a hex string.
pub fn hash_url(url: &str) -> String {
    format!("{:x}", Sha256::digest(url.as_bytes()))
}

/// Summary of image resolution for a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResolveStats {
    /// Already in the store, no network access.
    pub hits: u32,
    /// Downloaded during this run.
    pub fetched: u32,
    /// Could not be resolved; the reference was dropped.
    pub failed: u32,
}

impl ResolveStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn fetch(&mut self) {
        self.fetched += 1;
    }

    pub fn fail(&mut self) {
        self.failed += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.fetched + self.failed
    }

    /// Add another document's counts to this one.
    pub fn absorb(&mut self, other: ResolveStats) {
        self.hits += other.hits;
        self.fetched += other.fetched;
        self.failed += other.failed;
    }
}

impl fmt::Display for ResolveStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total() == 0 {
            return write!(f, "no images");
        }
        if self.failed > 0 {
            write!(
                f,
                "{} cached, {} fetched, {} failed ({} total)",
                self.hits,
                self.fetched,
                self.failed,
                self.total()
            )
        } else {
            write!(
                f,
                "{} cached, {} fetched ({} total)",
                self.hits,
                self.fetched,
                self.total()
            )
        }
    }
}
