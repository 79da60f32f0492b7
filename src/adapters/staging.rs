//! Scoped on-disk staging for libraries that want a path.
//!
//! A [`StagedFile`] owns a named temp file that is removed when it is dropped,
//! so every exit path of an adapter call (success, verification failure, `?`)
//! releases it.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

pub(crate) struct StagedFile {
    file: NamedTempFile,
}

impl StagedFile {
    /// An empty staging file ending in `suffix` (e.g. `".pdf"`).
    pub(crate) fn empty(suffix: &str) -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("tagit-")
            .suffix(suffix)
            .tempfile()
            .context("Failed to create staging file")?;
        Ok(Self { file })
    }

    /// A staging file holding a private copy of `bytes`.
    pub(crate) fn with_contents(bytes: &[u8], suffix: &str) -> Result<Self> {
        let mut staged = Self::empty(suffix)?;
        staged
            .file
            .write_all(bytes)
            .and_then(|_| staged.file.flush())
            .context("Failed to write staging file")?;
        log::debug!(
            "Staged {} bytes at {}",
            bytes.len(),
            staged.path().display()
        );
        Ok(staged)
    }

    pub(crate) fn path(&self) -> &Path {
        self.file.path()
    }

    pub(crate) fn read(&self) -> Result<Vec<u8>> {
        std::fs::read(self.path()).context("Failed to read staging file")
    }
}

/// `".ext"` from a filename, or an empty suffix.
pub(crate) fn suffix_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default()
}
