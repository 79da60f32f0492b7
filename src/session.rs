//! Per-file edit session: extract, edit, verify, replace.
//!
//! ```text
//!  Empty --load()--> Loaded --apply()--> Edited --apply()--> Edited
//! ```
//!
//! A failed `load` or `apply` leaves the session exactly as it was.
//!
//! ```rust,no_run
//! use tagit::edit::ChangeSet;
//! use tagit::session::EditSession;
//!
//! # fn main() -> anyhow::Result<()> {
//! let bytes = std::fs::read("report.pdf")?;
//! let mut session = EditSession::open("report.pdf", bytes)?;
//! session.load()?;
//!
//! let mut changes = ChangeSet::new(session.format());
//! changes.set("Title", "Quarterly report")?;
//! let output = session.modified_filename();
//! let artifact = session.apply(&changes)?;
//! std::fs::write(output, artifact.bytes())?;
//! # Ok(())
//! # }
//! ```

use crate::adapters::FormatAdapter;
use crate::edit::{ChangeSet, ModifiedArtifact};
use crate::error::{ApplyError, ExtractionFailure, SessionError, UnsupportedType};
use crate::format::{Capabilities, Format, select_adapter};
use crate::metadata::NormalizedMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing extracted yet.
    Empty,
    /// Metadata extracted from the original file.
    Loaded,
    /// At least one change set applied; an artifact is available.
    Edited,
}

/// One uploaded file and everything derived from it.
pub struct EditSession {
    filename: String,
    format: Format,
    adapter: Box<dyn FormatAdapter>,
    source: Vec<u8>,
    metadata: Option<NormalizedMetadata>,
    artifact: Option<ModifiedArtifact>,
}

impl EditSession {
    /// Start a session for `filename`. Fails without building an adapter when
    /// the extension is not supported.
    pub fn open(filename: impl Into<String>, source: Vec<u8>) -> Result<Self, UnsupportedType> {
        let filename = filename.into();
        let adapter = select_adapter(&filename)?;
        Ok(Self {
            format: adapter.format(),
            filename,
            adapter,
            source,
            metadata: None,
            artifact: None,
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn capabilities(&self) -> Capabilities {
        self.adapter.capabilities()
    }

    pub fn state(&self) -> SessionState {
        match (&self.metadata, &self.artifact) {
            (None, _) => SessionState::Empty,
            (Some(_), None) => SessionState::Loaded,
            (Some(_), Some(_)) => SessionState::Edited,
        }
    }

    /// Extract metadata from the original file. An `Error` record from the
    /// adapter becomes [`ExtractionFailure`] and the session stays as it was.
    pub fn load(&mut self) -> Result<&NormalizedMetadata, SessionError> {
        let metadata = extracted(self.adapter.extract(&self.source))?;
        log::debug!("{}: loaded {} entries", self.filename, metadata.len());
        self.artifact = None;
        Ok(&*self.metadata.insert(metadata))
    }

    /// Apply `changes` to the latest version of the file (the original, or the
    /// previous artifact), then re-extract from the result so the displayed
    /// metadata matches what would be downloaded.
    pub fn apply(&mut self, changes: &ChangeSet) -> Result<&ModifiedArtifact, SessionError> {
        if self.metadata.is_none() {
            return Err(ApplyError::NotLoaded.into());
        }
        let current = self
            .artifact
            .as_ref()
            .map_or(self.source.as_slice(), ModifiedArtifact::bytes);

        let artifact = self.adapter.apply(current, changes)?;
        let metadata = extracted(self.adapter.extract(artifact.bytes()))?;

        log::info!("{}: applied {} change(s)", self.filename, changes.len());
        self.metadata = Some(metadata);
        Ok(&*self.artifact.insert(artifact))
    }

    /// The current metadata, if loaded.
    pub fn metadata(&self) -> Option<&NormalizedMetadata> {
        self.metadata.as_ref()
    }

    /// The most recent artifact, if any change set has been applied.
    pub fn artifact(&self) -> Option<&ModifiedArtifact> {
        self.artifact.as_ref()
    }

    /// Pretty JSON (two-space indent) of the current metadata.
    pub fn export_json(&self) -> Option<serde_json::Result<String>> {
        self.metadata.as_ref().map(NormalizedMetadata::to_json_pretty)
    }

    /// `<name>_metadata.json`
    pub fn metadata_filename(&self) -> String {
        crate::pipeline::metadata_filename(&self.filename)
    }

    /// `modified_<name>`
    pub fn modified_filename(&self) -> String {
        crate::pipeline::modified_filename(&self.filename)
    }
}

impl std::fmt::Debug for EditSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditSession")
            .field("filename", &self.filename)
            .field("format", &self.format)
            .field("state", &self.state())
            .field("source_len", &self.source.len())
            .finish()
    }
}

fn extracted(metadata: NormalizedMetadata) -> Result<NormalizedMetadata, ExtractionFailure> {
    match metadata.error_message() {
        Some(message) => Err(ExtractionFailure {
            message: message.to_string(),
        }),
        None => Ok(metadata),
    }
}
