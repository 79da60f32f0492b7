//! Container track metadata for MP4/MOV, read only.

use anyhow::{Context, Result};
use nom_exif::{EntryValue, MediaParser, MediaSource, TrackInfo, TrackInfoTag};

use super::FormatAdapter;
use super::staging::{StagedFile, suffix_of};
use crate::edit::{ChangeSet, ModifiedArtifact};
use crate::error::ApplyError;
use crate::format::Format;
use crate::metadata::{Fields, MetaValue, NormalizedMetadata};

pub const GENERAL_GROUP: &str = "General";
pub const VIDEO_GROUP: &str = "Video";

const DEFAULT_SUFFIX: &str = ".mp4";

/// Container-level tags and the group each is shown in.
const TRACK_TAGS: &[(TrackInfoTag, &str, &str)] = &[
    (TrackInfoTag::Make, "Make", GENERAL_GROUP),
    (TrackInfoTag::Model, "Model", GENERAL_GROUP),
    (TrackInfoTag::Software, "Software", GENERAL_GROUP),
    (TrackInfoTag::CreateDate, "CreateDate", GENERAL_GROUP),
    (TrackInfoTag::DurationMs, "DurationMs", GENERAL_GROUP),
    (TrackInfoTag::GpsIso6709, "GPS", GENERAL_GROUP),
    (TrackInfoTag::ImageWidth, "Width", VIDEO_GROUP),
    (TrackInfoTag::ImageHeight, "Height", VIDEO_GROUP),
];

/// Reads MP4/MOV container tracks with nom-exif. Editing is not supported.
#[derive(Debug, Clone)]
pub struct VideoAdapter {
    suffix: String,
}

impl Default for VideoAdapter {
    fn default() -> Self {
        Self {
            suffix: DEFAULT_SUFFIX.to_string(),
        }
    }
}

impl VideoAdapter {
    /// Stage inputs with the same extension as `filename`.
    pub fn for_filename(filename: &str) -> Self {
        let suffix = suffix_of(filename);
        if suffix.is_empty() {
            return Self::default();
        }
        Self { suffix }
    }

    fn read_tracks(&self, source: &[u8]) -> Result<NormalizedMetadata> {
        let staged = StagedFile::with_contents(source, &self.suffix)?;
        let ms = MediaSource::file_path(staged.path()).context("Unrecognized container")?;
        if !ms.has_track() {
            anyhow::bail!("No audio/video track container found");
        }

        let mut parser = MediaParser::new();
        let info: TrackInfo = parser.parse(ms).context("Failed to parse tracks")?;

        let mut general = Fields::new();
        let mut video = Fields::new();
        for (tag, name, group) in TRACK_TAGS {
            let Some(value) = info.get(*tag).and_then(entry_to_meta) else {
                continue;
            };
            if *group == VIDEO_GROUP {
                video.insert(*name, value);
            } else {
                general.insert(*name, value);
            }
        }

        let mut meta = NormalizedMetadata::new();
        if !general.is_empty() {
            meta.insert_group(GENERAL_GROUP, general);
        }
        if !video.is_empty() {
            meta.insert_group(VIDEO_GROUP, video);
        }
        Ok(meta)
    }
}

impl FormatAdapter for VideoAdapter {
    fn format(&self) -> Format {
        Format::Video
    }

    fn extract(&self, source: &[u8]) -> NormalizedMetadata {
        self.read_tracks(source).unwrap_or_else(|e| {
            log::warn!("Reading video tracks failed: {e:#}");
            NormalizedMetadata::error(format!("Failed to extract video metadata: {e:#}"))
        })
    }

    fn apply(&self, _source: &[u8], _changes: &ChangeSet) -> Result<ModifiedArtifact, ApplyError> {
        Err(ApplyError::EditNotSupported(Format::Video))
    }
}

/// Numbers stay numeric; empty text is dropped.
fn entry_to_meta(value: &EntryValue) -> Option<MetaValue> {
    match value {
        EntryValue::U32(n) => Some(MetaValue::from(*n)),
        EntryValue::U64(n) => Some(MetaValue::Integer(i64::try_from(*n).unwrap_or(i64::MAX))),
        EntryValue::I64(n) => Some(MetaValue::Integer(*n)),
        other => {
            let text = other.to_string();
            let text = text.trim().trim_matches('"');
            if text.is_empty() {
                None
            } else {
                Some(MetaValue::from(text))
            }
        }
    }
}
