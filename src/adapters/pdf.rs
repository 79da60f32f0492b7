//! PDF document info dictionary via lopdf.

use anyhow::{Context, Result};
use chrono::Local;
use lopdf::{Dictionary, Document, Object, ObjectId};

use super::staging::StagedFile;
use super::{FormatAdapter, ensure_format};
use crate::edit::{ChangeSet, ModifiedArtifact};
use crate::error::ApplyError;
use crate::format::Format;
use crate::metadata::NormalizedMetadata;

/// Extract and edit the info dictionary of PDF documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfAdapter;

impl FormatAdapter for PdfAdapter {
    fn format(&self) -> Format {
        Format::Pdf
    }

    fn extract(&self, source: &[u8]) -> NormalizedMetadata {
        match Document::load_mem(source) {
            Ok(doc) => extract_document(&doc),
            Err(e) => NormalizedMetadata::error(format!("Failed to read PDF metadata: {e}")),
        }
    }

    fn apply(&self, source: &[u8], changes: &ChangeSet) -> Result<ModifiedArtifact, ApplyError> {
        ensure_format(Format::Pdf, changes)?;
        // Both staging files are dropped, and removed, on every return path.
        let input = StagedFile::with_contents(source, ".pdf")
            .map_err(|e| ApplyError::write(Format::Pdf, e))?;
        let mut doc = Document::load(input.path())
            .context("Failed to load PDF")
            .map_err(|e| ApplyError::write(Format::Pdf, e))?;

        let written = write_info(&mut doc, changes).map_err(|e| ApplyError::write(Format::Pdf, e))?;
        let bytes = save_and_verify(&mut doc, &written)?;
        log::info!("Updated {} PDF info field(s)", written.len());
        Ok(ModifiedArtifact::new(bytes))
    }
}

fn extract_document(doc: &Document) -> NormalizedMetadata {
    let mut meta = NormalizedMetadata::new();
    if let Some(info) = info_dictionary(doc) {
        for (key, value) in info.iter() {
            let key = String::from_utf8_lossy(key);
            let key = key.trim_start_matches('/');
            meta.insert_value(key, info_value_to_string(doc, value));
        }
    }
    meta.insert_value("PDFVersion", doc.version.to_string());
    meta.insert_value("PageCount", doc.get_pages().len());
    meta.insert_value("ExtractedAt", Local::now().format("%Y-%m-%d %H:%M:%S").to_string());
    meta
}

/// The trailer's `/Info` dictionary, direct or by reference.
fn info_dictionary(doc: &Document) -> Option<&Dictionary> {
    match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

/// Decode a PDF text string: UTF-16BE when it carries a BOM, else UTF-8, else Latin-1.
fn decode_text(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

/// Render an info value as display text. Arrays and dictionaries become `[a, b]`.
fn info_value_to_string(doc: &Document, object: &Object) -> String {
    match object {
        Object::Null => String::new(),
        Object::String(bytes, _) => decode_text(bytes),
        Object::Name(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        Object::Integer(i) => i.to_string(),
        Object::Real(f) => f.to_string(),
        Object::Boolean(b) => b.to_string(),
        Object::Array(items) => {
            let parts: Vec<String> = items.iter().map(|o| info_value_to_string(doc, o)).collect();
            format!("[{}]", parts.join(", "))
        }
        Object::Dictionary(dict) => {
            let keys: Vec<String> = dict
                .iter()
                .map(|(k, _)| String::from_utf8_lossy(k).into_owned())
                .collect();
            format!("[{}]", keys.join(", "))
        }
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Reference(_)) | Err(_) => format!("{} {} R", id.0, id.1),
            Ok(target) => info_value_to_string(doc, target),
        },
        other => format!("{other:?}"),
    }
}

/// Locate the info dictionary object, creating one when the trailer has none.
fn ensure_info_id(doc: &mut Document) -> Result<ObjectId> {
    let existing = doc.trailer.get(b"Info").ok().cloned();
    match existing {
        Some(Object::Reference(id)) => Ok(id),
        Some(Object::Dictionary(dict)) => {
            let id = doc.add_object(dict);
            doc.trailer.set("Info", Object::Reference(id));
            Ok(id)
        }
        _ => {
            log::debug!("PDF has no info dictionary, creating one");
            let id = doc.add_object(Dictionary::new());
            doc.trailer.set("Info", Object::Reference(id));
            Ok(id)
        }
    }
}

/// Set every non-blank change in the info dictionary. Returns what was written.
fn write_info(doc: &mut Document, changes: &ChangeSet) -> Result<Vec<(String, String)>> {
    let written: Vec<(String, String)> = changes
        .non_blank()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    if written.is_empty() {
        return Ok(written);
    }

    let info_id = ensure_info_id(doc)?;
    let info = doc
        .get_object_mut(info_id)
        .and_then(Object::as_dict_mut)
        .context("PDF info entry is not a dictionary")?;
    for (key, value) in &written {
        log::debug!("  /{key}: {value}");
        info.set(key.as_bytes().to_vec(), Object::string_literal(value.as_str()));
    }
    Ok(written)
}

/// Save to a staging file, re-read it, and confirm every written key is present
/// with the requested value. Nothing is returned unless all keys check out.
fn save_and_verify(doc: &mut Document, written: &[(String, String)]) -> Result<Vec<u8>, ApplyError> {
    let output = StagedFile::empty(".pdf").map_err(|e| ApplyError::write(Format::Pdf, e))?;
    doc.save(output.path())
        .context("Failed to save PDF")
        .map_err(|e| ApplyError::write(Format::Pdf, e))?;

    let reread = Document::load(output.path())
        .context("Failed to re-read saved PDF")
        .map_err(|e| ApplyError::write(Format::Pdf, e))?;
    let info = info_dictionary(&reread);
    for (key, expected) in written {
        let found = info
            .and_then(|d| d.get(key.as_bytes()).ok())
            .map(|o| info_value_to_string(&reread, o));
        if found.as_deref() != Some(expected.as_str()) {
            log::warn!("PDF verification failed for /{key}");
            return Err(ApplyError::VerificationMismatch {
                field: key.clone(),
                expected: expected.clone(),
                found,
            });
        }
    }

    output.read().map_err(|e| ApplyError::write(Format::Pdf, e))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::dictionary;

    /// A one-page PDF, optionally with an info dictionary.
    pub(crate) fn sample_pdf(title: Option<&str>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        if let Some(title) = title {
            let info_id = doc.add_object(dictionary! {
                "Title" => Object::string_literal(title),
                "Producer" => Object::string_literal("tests"),
                "Trapped" => Object::Name(b"False".to_vec()),
            });
            doc.trailer.set("Info", info_id);
        }
        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    fn text<'a>(meta: &'a NormalizedMetadata, key: &str) -> Option<&'a str> {
        meta.value(key)?.as_text()
    }

    #[test]
    fn extract_info_and_derived_fields() {
        let meta = PdfAdapter.extract(&sample_pdf(Some("Quarterly")));
        assert_eq!(text(&meta, "Title"), Some("Quarterly"));
        assert_eq!(text(&meta, "Producer"), Some("tests"));
        assert_eq!(text(&meta, "Trapped"), Some("False"));
        assert_eq!(text(&meta, "PDFVersion"), Some("1.5"));
        assert_eq!(meta.value("PageCount"), Some(&crate::metadata::MetaValue::Integer(1)));
        assert!(text(&meta, "ExtractedAt").is_some());
    }

    #[test]
    fn extract_without_info() {
        let meta = PdfAdapter.extract(&sample_pdf(None));
        assert!(meta.value("Title").is_none());
        assert!(meta.value("PDFVersion").is_some());
    }

    #[test]
    fn extract_garbage_is_error_record() {
        let meta = PdfAdapter.extract(b"%PDF-nope");
        assert!(meta.error_message().unwrap().starts_with("Failed to read PDF metadata"));
    }

    #[test]
    fn apply_then_extract() {
        let changes = ChangeSet::from_pairs(Format::Pdf, [("Title", "Y"), ("Author", "")]).unwrap();
        let artifact = PdfAdapter.apply(&sample_pdf(Some("X")), &changes).unwrap();
        let meta = PdfAdapter.extract(artifact.bytes());
        assert_eq!(text(&meta, "Title"), Some("Y"));
        assert!(meta.value("Author").is_none());
    }

    #[test]
    fn apply_creates_missing_info() {
        let changes = ChangeSet::from_pairs(Format::Pdf, [("Author", "Ada")]).unwrap();
        let artifact = PdfAdapter.apply(&sample_pdf(None), &changes).unwrap();
        let meta = PdfAdapter.extract(artifact.bytes());
        assert_eq!(text(&meta, "Author"), Some("Ada"));
    }

    #[test]
    fn blank_changes_leave_values() {
        let changes = ChangeSet::from_pairs(Format::Pdf, [("Title", "  ")]).unwrap();
        let artifact = PdfAdapter.apply(&sample_pdf(Some("Keep")), &changes).unwrap();
        let meta = PdfAdapter.extract(artifact.bytes());
        assert_eq!(text(&meta, "Title"), Some("Keep"));
    }

    #[test]
    fn dropped_key_fails_verification() {
        let mut doc = Document::load_mem(&sample_pdf(Some("X"))).unwrap();
        let changes = ChangeSet::from_pairs(Format::Pdf, [("Title", "Y"), ("Subject", "S")]).unwrap();
        let written = write_info(&mut doc, &changes).unwrap();

        // Simulate a writer that silently drops a key.
        let info_id = doc.trailer.get(b"Info").unwrap().as_reference().unwrap();
        doc.get_object_mut(info_id)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .remove(b"Subject");

        let err = save_and_verify(&mut doc, &written).unwrap_err();
        assert_eq!(err.mismatched_field(), Some("Subject"));
    }

    #[test]
    fn apply_on_garbage_fails() {
        let changes = ChangeSet::from_pairs(Format::Pdf, [("Title", "Y")]).unwrap();
        let err = PdfAdapter.apply(b"not a pdf", &changes).unwrap_err();
        assert!(matches!(err, ApplyError::Write { format: Format::Pdf, .. }));
    }

    #[test]
    fn text_decoding() {
        assert_eq!(decode_text(b"plain"), "plain");
        assert_eq!(decode_text(&[0xFE, 0xFF, 0x00, 0x41, 0x00, 0xE9]), "Aé");
        assert_eq!(decode_text(&[0x63, 0x61, 0x66, 0xE9]), "café");
    }
}
