//! Inputs and outputs of an `apply` call.

use crate::error::ChangeSetError;
use crate::format::Format;
use crate::metadata::Fields;

/// Generic binary content type used for modified artifacts.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// User edits for a single `apply` call.
///
/// Only names in the format's editable set are accepted. Blank values are kept
/// but mean "leave unchanged"; adapters only see them through [`ChangeSet::non_blank`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    format: Format,
    values: Fields<String>,
}

impl ChangeSet {
    pub fn new(format: Format) -> Self {
        Self {
            format,
            values: Fields::new(),
        }
    }

    /// Build a change set from `(field, value)` pairs, rejecting the first non-editable field.
    pub fn from_pairs<K, V, I>(format: Format, pairs: I) -> Result<Self, ChangeSetError>
    where
        K: AsRef<str>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut changes = Self::new(format);
        for (k, v) in pairs {
            changes.set(k.as_ref(), v)?;
        }
        Ok(changes)
    }

    pub fn set(&mut self, field: &str, value: impl Into<String>) -> Result<(), ChangeSetError> {
        if !self.format.capabilities().is_editable(field) {
            return Err(ChangeSetError::NotEditable {
                format: self.format,
                field: field.to_string(),
            });
        }
        self.values.insert(field, value.into());
        Ok(())
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }

    /// Entries whose value is not blank, trimmed.
    pub fn non_blank(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .map(|(k, v)| (k, v.trim()))
            .filter(|(_, v)| !v.is_empty())
    }

    pub fn has_effective_changes(&self) -> bool {
        self.non_blank().next().is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Bytes produced by `apply`, tagged with a content type.
///
/// Any staging files used to produce it are already gone; dropping the
/// artifact releases the last copy.
#[derive(Clone, PartialEq, Eq)]
pub struct ModifiedArtifact {
    bytes: Vec<u8>,
    content_type: String,
}

impl ModifiedArtifact {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            content_type: OCTET_STREAM.to_string(),
        }
    }

    /// Refine the content type (e.g. with [`Format::content_type`]).
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for ModifiedArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModifiedArtifact")
            .field("len", &self.bytes.len())
            .field("content_type", &self.content_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_fields_outside_editable_set() {
        let mut changes = ChangeSet::new(Format::Pdf);
        assert!(changes.set("Title", "x").is_ok());
        let err = changes.set("PageCount", "3").unwrap_err();
        assert_eq!(
            err,
            ChangeSetError::NotEditable {
                format: Format::Pdf,
                field: "PageCount".into()
            }
        );
    }

    #[test]
    fn video_accepts_nothing() {
        let mut changes = ChangeSet::new(Format::Video);
        assert!(changes.set("Title", "x").is_err());
    }

    #[test]
    fn non_blank_skips_whitespace_values() {
        let changes = ChangeSet::from_pairs(
            Format::Docx,
            [("title", "  Report "), ("author", "   "), ("subject", "")],
        )
        .unwrap();
        let effective: Vec<_> = changes.non_blank().collect();
        assert_eq!(effective, [("title", "Report")]);
        assert_eq!(changes.len(), 3);
    }

    #[test]
    fn all_blank_has_no_effective_changes() {
        let changes = ChangeSet::from_pairs(Format::Image, [("Make", ""), ("Model", " ")]).unwrap();
        assert!(!changes.has_effective_changes());
    }

    #[test]
    fn artifact_defaults_to_octet_stream() {
        let artifact = ModifiedArtifact::new(vec![1, 2, 3]);
        assert_eq!(artifact.content_type(), OCTET_STREAM);
        let refined = artifact.with_content_type("application/pdf");
        assert_eq!(refined.content_type(), "application/pdf");
        assert_eq!(refined.len(), 3);
    }
}
