use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::Event;

use super::{Archive, PackageKind, read_part};
use crate::adapters::FormatAdapter;
use crate::edit::{ChangeSet, ModifiedArtifact};
use crate::error::ApplyError;
use crate::format::Format;
use crate::metadata::{Fields, MetaValue, NormalizedMetadata};

const DOCUMENT_PART: &str = "word/document.xml";

pub const STATS_GROUP: &str = "DocumentStats";

const KIND: PackageKind = PackageKind {
    format: Format::Docx,
    suffix: ".docx",
    stats_group: STATS_GROUP,
    stats: document_stats,
};

/// Word documents: core properties plus paragraph/table/section counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocxAdapter;

impl FormatAdapter for DocxAdapter {
    fn format(&self) -> Format {
        Format::Docx
    }

    fn extract(&self, source: &[u8]) -> NormalizedMetadata {
        super::extract(&KIND, source)
            .unwrap_or_else(|e| NormalizedMetadata::error(format!("DOCX Metadata Error: {e:#}")))
    }

    fn apply(&self, source: &[u8], changes: &ChangeSet) -> Result<ModifiedArtifact, ApplyError> {
        let artifact = super::apply(&KIND, source, changes)?;
        log::info!("Updated DOCX core properties");
        Ok(artifact)
    }
}

#[derive(Debug, Default, PartialEq)]
struct BodyCounts {
    paragraphs: usize,
    tables: usize,
    sections: usize,
}

impl BodyCounts {
    /// Tally the element at the end of `path`, the local names from the root
    /// down. Paragraphs and tables count only as direct children of `w:body`.
    /// Sections are the body's final `w:sectPr` plus those carried in a
    /// body paragraph's properties; tracked-change copies do not count.
    fn visit(&mut self, path: &[Vec<u8>]) {
        let path: Vec<&[u8]> = path.iter().map(Vec::as_slice).collect();
        match path.as_slice() {
            [.., b"body", b"p"] => self.paragraphs += 1,
            [.., b"body", b"tbl"] => self.tables += 1,
            [.., b"body", b"sectPr"] | [.., b"body", b"p", b"pPr", b"sectPr"] => self.sections += 1,
            _ => {}
        }
    }
}

fn count_body(xml: &str) -> Result<BodyCounts> {
    let mut reader = Reader::from_str(xml);
    let mut counts = BodyCounts::default();
    let mut path: Vec<Vec<u8>> = Vec::new();

    loop {
        match reader.read_event().context("Malformed document XML")? {
            Event::Start(e) => {
                path.push(e.local_name().as_ref().to_vec());
                counts.visit(&path);
            }
            Event::Empty(e) => {
                path.push(e.local_name().as_ref().to_vec());
                counts.visit(&path);
                path.pop();
            }
            Event::End(_) => {
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(counts)
}

fn document_stats(archive: &mut Archive<'_>) -> Result<Fields<MetaValue>> {
    let xml = read_part(archive, DOCUMENT_PART)?
        .with_context(|| format!("Package has no {DOCUMENT_PART}"))?;
    let counts = count_body(&xml)?;

    let mut stats = Fields::new();
    stats.insert("paragraph_count", MetaValue::from(counts.paragraphs));
    stats.insert("tables_count", MetaValue::from(counts.tables));
    stats.insert("sections_count", MetaValue::from(counts.sections));
    Ok(stats)
}
