use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::Event;

use super::{Archive, PackageKind, read_part};
use crate::adapters::FormatAdapter;
use crate::edit::{ChangeSet, ModifiedArtifact};
use crate::error::ApplyError;
use crate::format::Format;
use crate::metadata::{Fields, MetaValue, NormalizedMetadata};

const PRESENTATION_PART: &str = "ppt/presentation.xml";
const NOTES_PREFIX: &str = "ppt/notesSlides/notesSlide";

pub const STATS_GROUP: &str = "PresentationStats";

const KIND: PackageKind = PackageKind {
    format: Format::Pptx,
    suffix: ".pptx",
    stats_group: STATS_GROUP,
    stats: presentation_stats,
};

/// PowerPoint decks: core properties plus slide/notes/master counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct PptxAdapter;

impl FormatAdapter for PptxAdapter {
    fn format(&self) -> Format {
        Format::Pptx
    }

    fn extract(&self, source: &[u8]) -> NormalizedMetadata {
        super::extract(&KIND, source)
            .unwrap_or_else(|e| NormalizedMetadata::error(format!("PPTX Metadata Error: {e:#}")))
    }

    fn apply(&self, source: &[u8], changes: &ChangeSet) -> Result<ModifiedArtifact, ApplyError> {
        let artifact = super::apply(&KIND, source, changes)?;
        log::info!("Updated PPTX core properties");
        Ok(artifact)
    }
}

/// `(slides, masters)` listed in the presentation part.
fn count_slide_ids(xml: &str) -> Result<(usize, usize)> {
    let mut reader = Reader::from_str(xml);
    let (mut slides, mut masters) = (0, 0);
    loop {
        match reader.read_event().context("Malformed presentation XML")? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"sldId" => slides += 1,
                b"sldMasterId" => masters += 1,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok((slides, masters))
}

fn presentation_stats(archive: &mut Archive<'_>) -> Result<Fields<MetaValue>> {
    let xml = read_part(archive, PRESENTATION_PART)?
        .with_context(|| format!("Package has no {PRESENTATION_PART}"))?;
    let (slides, masters) = count_slide_ids(&xml)?;
    let notes = archive
        .file_names()
        .filter(|name| name.starts_with(NOTES_PREFIX) && name.ends_with(".xml"))
        .count();

    let mut stats = Fields::new();
    stats.insert("slide_count", MetaValue::from(slides));
    stats.insert("notes_slide_count", MetaValue::from(notes));
    stats.insert("master_slide_count", MetaValue::from(masters));
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::office::tests::{CONTENT_TYPES, core_xml, package};
    use crate::adapters::office::{CORE_GROUP, CORE_PART};

    const PRESENTATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:presentation xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst>
<p:sldIdLst><p:sldId id="256" r:id="rId2"/><p:sldId id="257" r:id="rId3"/><p:sldId id="258" r:id="rId4"/></p:sldIdLst>
</p:presentation>"#;

    fn sample_pptx() -> Vec<u8> {
        package(&[
            ("[Content_Types].xml", CONTENT_TYPES),
            (PRESENTATION_PART, PRESENTATION),
            ("ppt/notesSlides/notesSlide1.xml", "<p:notes/>"),
            ("ppt/notesSlides/_rels/notesSlide1.xml.rels", "<Relationships/>"),
            (CORE_PART, core_xml("Deck").as_str()),
        ])
    }

    #[test]
    fn presentation_counts() {
        let meta = PptxAdapter.extract(&sample_pptx());
        let stats = meta.group(STATS_GROUP).unwrap();
        assert_eq!(stats.get("slide_count"), Some(&MetaValue::Integer(3)));
        assert_eq!(stats.get("notes_slide_count"), Some(&MetaValue::Integer(1)));
        assert_eq!(stats.get("master_slide_count"), Some(&MetaValue::Integer(1)));
    }

    #[test]
    fn apply_round_trip() {
        let changes = ChangeSet::from_pairs(
            Format::Pptx,
            [("title", "Roadmap"), ("keywords", "q1, plan"), ("language", "en-GB")],
        )
        .unwrap();
        let artifact = PptxAdapter.apply(&sample_pptx(), &changes).unwrap();
        let meta = PptxAdapter.extract(artifact.bytes());
        let core = meta.group(CORE_GROUP).unwrap();
        assert_eq!(core.get("title").unwrap().as_text(), Some("Roadmap"));
        assert_eq!(core.get("keywords").unwrap().as_text(), Some("q1, plan"));
        assert_eq!(core.get("language").unwrap().as_text(), Some("en-GB"));
        assert_eq!(core.get("author").unwrap().as_text(), Some("Ada"));
        assert_eq!(
            meta.group(STATS_GROUP).unwrap().get("slide_count"),
            Some(&MetaValue::Integer(3))
        );
    }

    #[test]
    fn corrupt_package_is_an_error_record() {
        let meta = PptxAdapter.extract(&[0x50, 0x4B, 0x03, 0x04, 0x00]);
        assert!(meta.error_message().unwrap().starts_with("PPTX Metadata Error"));
    }
}
