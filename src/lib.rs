//! # tagit
//!
//! Read and edit descriptive metadata in images, PDFs, Office documents and
//! videos through one interface: EXIF tags for JPEG/PNG, the document info
//! dictionary for PDF, core properties for DOCX/PPTX and container track
//! metadata for MP4/MOV (read only).
//!
//! ## Quick Start
//!
//! The simplest way to use the library is through the pipeline module, which
//! handles the full read → edit → verify → write flow for files on disk:
//!
//! ```rust,no_run
//! use tagit::config::Config;
//! use tagit::pipeline::{collect_files, process_file};
//! use std::path::PathBuf;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load(Some("config.json".as_ref()))?;
//!     let changes = vec![("Title".to_string(), "Annual report".to_string())];
//!
//!     for path in collect_files(&[PathBuf::from("./documents")]) {
//!         let result = process_file(&path, &changes, &config);
//!         match result.error {
//!             Some(err) => eprintln!("Error processing {}: {err}", path.display()),
//!             None => println!("Processed: {}", path.display()),
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Lower-Level Usage
//!
//! Callers that hold bytes rather than paths (an upload handler, for
//! instance) use an [`EditSession`](session::EditSession) or call an adapter
//! directly:
//!
//! ```rust,no_run
//! use tagit::edit::ChangeSet;
//! use tagit::format::{Format, select_adapter};
//!
//! fn main() -> anyhow::Result<()> {
//!     let bytes = std::fs::read("photo.jpg")?;
//!     let adapter = select_adapter("photo.jpg")?;
//!
//!     // 1. Extract; parse failures come back as an `Error` record
//!     let metadata = adapter.extract(&bytes);
//!     println!("{}", metadata.to_json_pretty()?);
//!
//!     // 2. Apply only names the format allows
//!     if adapter.capabilities().editable {
//!         let changes = ChangeSet::from_pairs(Format::Image, [("Artist", "Ada")])?;
//!         let artifact = adapter.apply(&bytes, &changes)?;
//!         std::fs::write("modified_photo.jpg", artifact.bytes())?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Formats
//!
//! | Format | Extensions | Read | Write |
//! |--------|------------|------|-------|
//! | Image | `.jpg`, `.jpeg`, `.png` | EXIF tags, GPS | EXIF IFD0 + Exif sub-IFD |
//! | PDF | `.pdf` | Info dictionary, version, page count | Info dictionary |
//! | DOCX | `.docx` | Core properties, paragraph/table/section counts | Core properties |
//! | PPTX | `.pptx` | Core properties, slide/notes/master counts | Core properties |
//! | Video | `.mp4`, `.mov`, `.avi` | Container track metadata | no |
//!
//! ## Modules
//!
//! - [`format`]: Format detection by extension, capabilities, adapter dispatch
//! - [`adapters`]: One adapter per format over its external library
//! - [`metadata`]: Normalized grouped key/value metadata and its JSON form
//! - [`edit`]: Change sets and modified artifacts
//! - [`session`]: Per-file extract/apply state machine
//! - [`error`]: Error taxonomy
//! - [`config`]: Configuration types and loading/saving
//! - [`pipeline`]: File collection and per-file processing

pub mod adapters;
pub mod config;
pub mod edit;
pub mod error;
pub mod format;
pub mod metadata;
pub mod pipeline;
pub mod session;
