//! # Riloe
//!
//! Bundles dated markdown notes into an EPUB. Point it at a folder of notes
//! with a `date` in their frontmatter; it takes the oldest ones, turns each
//! into a chapter, embeds the pictures they link to, and moves the notes into
//! an output folder next to the finished book.
//!
//! # Pipeline
//!
//! ```text
//! notes/*.md ─▶ select ─▶ relocate ─▶ resolve images ─▶ convert ─▶ package
//!                 │                       │                           │
//!           oldest N by date      epub/imaxes/ cache          epub/YYYY-MM-DD.epub
//! ```
//!
//! Every stage is a plain function over owned data. Network access sits
//! behind [`fetch::Fetcher`] and image storage behind [`cache::AssetStore`],
//! so the whole pipeline runs in tests without a network.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`frontmatter`] | Splits the `---` header block from a note body |
//! | [`select`] | Finds dated notes and picks the oldest N |
//! | [`types`] | `Document` and `Chapter` |
//! | [`cache`] | Content-addressed image store keyed by URL hash |
//! | [`fetch`] | Blocking HTTP downloads |
//! | [`imaging`] | Fitting images within bounds and re-encoding them |
//! | [`resolve`] | Rewrites image references to packaged copies |
//! | [`convert`] | Markdown to chapter XHTML using Maud |
//! | [`package`] | EPUB container, manifest and navigation |
//! | [`pipeline`] | Runs the stages and moves the notes |
//! | [`config`] | Optional `riloe.toml` loading and validation |
//! | [`output`] | CLI summary formatting |
//!
//! # Design Decisions
//!
//! ## Images Are Cached by URL
//!
//! Downloads are stored under the SHA-256 of their URL. A picture linked
//! from several notes is fetched once, and a second run over notes that link
//! the same pictures fetches nothing.
//!
//! ## Missing Images Degrade to Alt Text
//!
//! A picture that cannot be downloaded is replaced by its alt text rather
//! than failing the run or leaving a dangling reference in the book.
//!
//! ## Notes Move Only After the Book Exists
//!
//! Selected notes are copied into the output folder first. The originals are
//! deleted once the package has been written; if writing fails the copies are
//! removed, so a retry starts from the same notes folder. A copy never
//! replaces a note already in the output folder, and a package written on the
//! same day as an earlier one gets a numbered name instead of replacing it.

pub mod cache;
pub mod config;
pub mod convert;
pub mod fetch;
pub mod frontmatter;
pub mod imaging;
pub mod output;
pub mod package;
pub mod pipeline;
pub mod resolve;
pub mod select;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
