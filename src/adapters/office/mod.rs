//! Office Open XML packages (DOCX, PPTX).
//!
//! Both formats keep their descriptive metadata in the same package part,
//! `docProps/core.xml`. Extraction reads that part plus a per-format
//! statistics group. Apply rewrites only the core part into a staged copy of
//! the package; every other entry is copied over raw, without recompression.

mod docx;
mod pptx;
mod props;

pub use docx::DocxAdapter;
pub use pptx::PptxAdapter;

#[cfg(test)]
pub(crate) use docx::tests::sample_docx;

use anyhow::{Context, Result, bail};
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::fs::File;
use std::io::{Cursor, Read, Write};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::ensure_format;
use super::staging::StagedFile;
use crate::edit::{ChangeSet, ModifiedArtifact};
use crate::error::ApplyError;
use crate::format::Format;
use crate::metadata::{Fields, MetaValue, NormalizedMetadata};
use props::{CoreProperties, PROPERTIES};

pub const CORE_GROUP: &str = "CoreProperties";

const CORE_PART: &str = "docProps/core.xml";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const PACKAGE_RELS_PART: &str = "_rels/.rels";
const CORE_CONTENT_TYPE: &str = "application/vnd.openxmlformats-package.core-properties+xml";
const CORE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties";

type Archive<'a> = ZipArchive<Cursor<&'a [u8]>>;

/// The parts of the pipeline that differ between DOCX and PPTX.
pub(crate) struct PackageKind {
    pub format: Format,
    pub suffix: &'static str,
    pub stats_group: &'static str,
    pub stats: fn(&mut Archive<'_>) -> Result<Fields<MetaValue>>,
}

fn open(source: &[u8]) -> Result<Archive<'_>> {
    ZipArchive::new(Cursor::new(source)).context("Not a zip package")
}

/// Read a part as text. `Ok(None)` when the package has no such part.
fn read_part(archive: &mut Archive<'_>, name: &str) -> Result<Option<String>> {
    match archive.by_name(name) {
        Ok(mut file) => {
            let mut text = String::new();
            file.read_to_string(&mut text)
                .with_context(|| format!("Failed to read {name}"))?;
            Ok(Some(text))
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to open {name}")),
    }
}

fn read_core(archive: &mut Archive<'_>) -> Result<Option<CoreProperties>> {
    read_part(archive, CORE_PART)?
        .map(|xml| CoreProperties::parse(&xml))
        .transpose()
}

/// Core properties plus statistics. A package without a core part reports
/// every property as empty.
fn extract(kind: &PackageKind, source: &[u8]) -> Result<NormalizedMetadata> {
    let mut archive = open(source)?;
    let props = read_core(&mut archive)?.unwrap_or_default();
    let stats = (kind.stats)(&mut archive)?;

    let mut meta = NormalizedMetadata::new();
    meta.insert_group(CORE_GROUP, core_group(&props));
    meta.insert_group(kind.stats_group, stats);
    Ok(meta)
}

fn core_group(props: &CoreProperties) -> Fields<MetaValue> {
    PROPERTIES
        .iter()
        .map(|(field, _)| {
            let value = match *field {
                "created" | "modified" => MetaValue::from(props.timestamp(field).unwrap_or_default()),
                "revision" => {
                    let raw = props.get(field).unwrap_or_default().trim();
                    match raw.parse::<i64>() {
                        Ok(n) => MetaValue::Integer(n),
                        Err(_) => MetaValue::from(raw),
                    }
                }
                _ => MetaValue::from(props.get(field).unwrap_or_default()),
            };
            (*field, value)
        })
        .collect()
}

/// Write the change set into a staged copy of the package, re-read it and
/// check every non-blank change.
fn apply(kind: &PackageKind, source: &[u8], changes: &ChangeSet) -> Result<ModifiedArtifact, ApplyError> {
    ensure_format(kind.format, changes)?;
    let staged = rewrite(kind, source, changes).map_err(|e| ApplyError::write(kind.format, e))?;
    let bytes = staged.read().map_err(|e| ApplyError::write(kind.format, e))?;
    drop(staged);

    verify(kind.format, &bytes, changes)?;
    Ok(ModifiedArtifact::new(bytes))
}

fn rewrite(kind: &PackageKind, source: &[u8], changes: &ChangeSet) -> Result<StagedFile> {
    let mut archive = open(source)?;
    let existing = read_core(&mut archive)?;
    let register = existing.is_none();
    if register {
        log::debug!("Package has no core properties part, adding one");
    }

    let mut props = existing.unwrap_or_default();
    for (field, value) in changes.non_blank() {
        log::debug!("  {field}: {value}");
        props.set(field, value);
    }
    props.touch_modified();

    let staged = StagedFile::empty(kind.suffix)?;
    let file = File::create(staged.path()).context("Failed to open staging file")?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for i in 0..archive.len() {
        let name = archive.by_index_raw(i)?.name().to_string();
        if name == CORE_PART {
            continue;
        }
        let patch: Option<fn(&str) -> Result<String>> = match name.as_str() {
            CONTENT_TYPES_PART if register => Some(register_content_type),
            PACKAGE_RELS_PART if register => Some(register_relationship),
            _ => None,
        };
        match patch {
            Some(patch) => {
                let mut text = String::new();
                archive
                    .by_index(i)?
                    .read_to_string(&mut text)
                    .with_context(|| format!("Failed to read {name}"))?;
                writer.start_file(name.as_str(), options)?;
                writer.write_all(patch(&text)?.as_bytes())?;
            }
            None => writer
                .raw_copy_file(archive.by_index_raw(i)?)
                .with_context(|| format!("Failed to copy {name}"))?,
        }
    }

    writer.start_file(CORE_PART, options)?;
    writer.write_all(props.to_xml()?.as_bytes())?;
    writer.finish().context("Failed to finish package")?;
    Ok(staged)
}

/// Re-open a written package and compare every non-blank change.
fn verify(format: Format, bytes: &[u8], changes: &ChangeSet) -> Result<(), ApplyError> {
    let props = open(bytes)
        .and_then(|mut archive| read_core(&mut archive))
        .context("Failed to re-read written package")
        .map_err(|e| ApplyError::write(format, e))?
        .unwrap_or_default();

    for (field, expected) in changes.non_blank() {
        let found = props.get(field);
        if found != Some(expected) {
            log::warn!("{format} verification failed for {field}");
            return Err(ApplyError::VerificationMismatch {
                field: field.to_string(),
                expected: expected.to_string(),
                found: found.map(str::to_string),
            });
        }
    }
    Ok(())
}

/// Values of `attr` on every element whose local name is `element`.
fn attribute_values(xml: &str, element: &[u8], attr: &[u8]) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut values = Vec::new();
    loop {
        match reader.read_event().context("Malformed package part")? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == element => {
                if let Some(value) = e.try_get_attribute(attr)? {
                    values.push(value.unescape_value()?.into_owned());
                }
            }
            Event::Eof => return Ok(values),
            _ => {}
        }
    }
}

/// Append `child` as the last child of the root element. A self-closing
/// root is expanded into a start/end pair around it.
fn append_to_root(xml: &str, child: BytesStart<'_>) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut depth = 0usize;
    let mut appended = false;
    loop {
        match reader.read_event().context("Malformed package part")? {
            Event::Start(e) => {
                depth += 1;
                writer.write_event(Event::Start(e))?;
            }
            Event::Empty(e) if depth == 0 && !appended => {
                let end = e.to_end().into_owned();
                writer.write_event(Event::Start(e))?;
                writer.write_event(Event::Empty(child.borrow()))?;
                writer.write_event(Event::End(end))?;
                appended = true;
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if depth == 0 && !appended {
                    writer.write_event(Event::Empty(child.borrow()))?;
                    appended = true;
                }
                writer.write_event(Event::End(e))?;
            }
            Event::Eof => break,
            other => writer.write_event(other)?,
        }
    }
    if !appended {
        bail!("Package part has no root element");
    }
    String::from_utf8(writer.into_inner().into_inner()).context("Package part is not UTF-8")
}

fn register_content_type(xml: &str) -> Result<String> {
    let part_name = format!("/{CORE_PART}");
    if attribute_values(xml, b"Override", b"PartName")?.contains(&part_name) {
        return Ok(xml.to_string());
    }
    let mut entry = BytesStart::new("Override");
    entry.push_attribute(("PartName", part_name.as_str()));
    entry.push_attribute(("ContentType", CORE_CONTENT_TYPE));
    append_to_root(xml, entry)
}

fn register_relationship(xml: &str) -> Result<String> {
    if attribute_values(xml, b"Relationship", b"Type")?
        .iter()
        .any(|t| t == CORE_REL_TYPE)
    {
        return Ok(xml.to_string());
    }
    // Next free rIdN.
    let next = attribute_values(xml, b"Relationship", b"Id")?
        .iter()
        .filter_map(|id| id.strip_prefix("rId")?.parse::<u32>().ok())
        .max()
        .unwrap_or(0)
        + 1;
    let id = format!("rId{next}");
    let mut entry = BytesStart::new("Relationship");
    entry.push_attribute(("Id", id.as_str()));
    entry.push_attribute(("Type", CORE_REL_TYPE));
    entry.push_attribute(("Target", CORE_PART));
    append_to_root(xml, entry)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/></Types>"#;

    pub(crate) const RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

    pub(crate) fn core_xml(title: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><dc:title>{title}</dc:title><dc:creator>Ada</dc:creator><cp:revision>2</cp:revision><dcterms:created xsi:type="dcterms:W3CDTF">2020-01-01T00:00:00Z</dcterms:created><dcterms:modified xsi:type="dcterms:W3CDTF">2020-01-01T00:00:00Z</dcterms:modified></cp:coreProperties>"#
        )
    }

    /// Zip the given `(name, contents)` parts into a package.
    pub(crate) fn package(parts: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, contents) in parts {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn part(bytes: &[u8], name: &str) -> Option<String> {
        read_part(&mut open(bytes).unwrap(), name).unwrap()
    }

    fn title_change(title: &str) -> ChangeSet {
        ChangeSet::from_pairs(Format::Docx, [("title", title)]).unwrap()
    }

    #[test]
    fn verify_reports_mismatched_field() {
        let bytes = package(&[(CORE_PART, core_xml("A").as_str())]);
        assert!(verify(Format::Docx, &bytes, &title_change("A")).is_ok());

        let err = verify(Format::Docx, &bytes, &title_change("B")).unwrap_err();
        assert_eq!(err.mismatched_field(), Some("title"));
        match err {
            ApplyError::VerificationMismatch { found, .. } => assert_eq!(found.as_deref(), Some("A")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_core_part_is_registered() {
        let source = package(&[
            (CONTENT_TYPES_PART, CONTENT_TYPES),
            (PACKAGE_RELS_PART, RELS),
            ("word/document.xml", "<w:document/>"),
        ]);
        let kind = PackageKind {
            format: Format::Docx,
            suffix: ".docx",
            stats_group: "Stats",
            stats: |_| Ok(Fields::new()),
        };
        let artifact = apply(&kind, &source, &title_change("Fresh")).unwrap();
        let bytes = artifact.bytes();

        assert!(part(bytes, CONTENT_TYPES_PART).unwrap().contains(CORE_CONTENT_TYPE));
        let rels = part(bytes, PACKAGE_RELS_PART).unwrap();
        assert!(rels.contains(r#"Id="rId2""#));
        assert!(rels.contains(CORE_REL_TYPE));
        assert_eq!(part(bytes, "word/document.xml").as_deref(), Some("<w:document/>"));

        let meta = extract(&kind, bytes).unwrap();
        let core = meta.group(CORE_GROUP).unwrap();
        assert_eq!(core.get("title").unwrap().as_text(), Some("Fresh"));
        assert_ne!(core.get("modified").unwrap().as_text(), Some(""));
    }

    #[test]
    fn registration_is_idempotent() {
        let once = register_relationship(RELS).unwrap();
        assert_eq!(register_relationship(&once).unwrap(), once);
        let once = register_content_type(CONTENT_TYPES).unwrap();
        assert_eq!(register_content_type(&once).unwrap(), once);
    }

    #[test]
    fn self_closing_roots_are_expanded() {
        let types = r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#;
        let rels = r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"/>"#;
        let source = package(&[
            (CONTENT_TYPES_PART, types),
            (PACKAGE_RELS_PART, rels),
            ("word/document.xml", "<w:document/>"),
        ]);
        let kind = PackageKind {
            format: Format::Docx,
            suffix: ".docx",
            stats_group: "Stats",
            stats: |_| Ok(Fields::new()),
        };
        let bytes = apply(&kind, &source, &title_change("Fresh")).unwrap().bytes().to_vec();

        let types = part(&bytes, CONTENT_TYPES_PART).unwrap();
        assert_eq!(
            attribute_values(&types, b"Override", b"ContentType").unwrap(),
            vec![CORE_CONTENT_TYPE.to_string()]
        );
        assert!(types.ends_with("</Types>"));

        let rels = part(&bytes, PACKAGE_RELS_PART).unwrap();
        assert_eq!(attribute_values(&rels, b"Relationship", b"Id").unwrap(), vec!["rId1".to_string()]);
        assert_eq!(
            attribute_values(&rels, b"Relationship", b"Target").unwrap(),
            vec![CORE_PART.to_string()]
        );
        assert!(rels.ends_with("</Relationships>"));
    }

    #[test]
    fn part_without_root_is_an_error() {
        assert!(register_content_type(r#"<?xml version="1.0"?>"#).is_err());
    }

    #[test]
    fn not_a_zip() {
        assert!(open(b"plain text").is_err());
    }
}
