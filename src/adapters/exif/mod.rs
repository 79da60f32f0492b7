//! EXIF metadata for JPEG and PNG images.
//!
//! - [`read_exif`]: tag read with nom-exif, GPS rendered as degrees/minutes/seconds
//! - [`write_tags`]: tag write with little_exif, spliced in with img-parts
//!
//! Camera and software fields live in the primary image IFD (IFD0) while the
//! capture timestamp `DateTimeOriginal` lives in the Exif sub-IFD. The split is
//! kept on both sides: the writer routes each field to its own IFD and the
//! normalized output shows them in separate groups (`Basic Info` and
//! `Capture Info`).

mod reader;
mod writer;

use reader::{ExifData, ImageProps, read_exif, read_image_props};
use writer::write_tags;

use crate::edit::{ChangeSet, ModifiedArtifact};
use crate::error::ApplyError;
use crate::format::Format;
use crate::metadata::{Fields, MetaValue, NormalizedMetadata};

use super::{FormatAdapter, ensure_format};

pub(crate) const TAG_DATE_TIME_ORIGINAL: u16 = 0x9003;
pub(crate) const TAG_GPS_TIMESTAMP: u16 = 0x0007;

pub const BASIC_GROUP: &str = "Basic Info";
pub const CAPTURE_GROUP: &str = "Capture Info";
pub const GPS_GROUP: &str = "GPS Info";

/// Which IFD a field is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagGroup {
    /// IFD0, the primary image directory.
    Primary,
    /// Exif sub-IFD, capture-time data.
    Capture,
}

/// An editable text tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditableTag {
    pub name: &'static str,
    pub code: u16,
    pub group: TagGroup,
}

impl EditableTag {
    fn is_datetime(&self) -> bool {
        self.name.starts_with("DateTime")
    }
}

/// Editable tags, in display order.
pub const EDITABLE_TAGS: &[EditableTag] = &[
    EditableTag { name: "Make", code: 0x010F, group: TagGroup::Primary },
    EditableTag { name: "Model", code: 0x0110, group: TagGroup::Primary },
    EditableTag { name: "Software", code: 0x0131, group: TagGroup::Primary },
    EditableTag { name: "DateTime", code: 0x0132, group: TagGroup::Primary },
    EditableTag { name: "DateTimeOriginal", code: TAG_DATE_TIME_ORIGINAL, group: TagGroup::Capture },
    EditableTag { name: "Artist", code: 0x013B, group: TagGroup::Primary },
    EditableTag { name: "Copyright", code: 0x8298, group: TagGroup::Primary },
    EditableTag { name: "ImageDescription", code: 0x010E, group: TagGroup::Primary },
];

pub(crate) fn tag_for(name: &str) -> Option<&'static EditableTag> {
    EDITABLE_TAGS.iter().find(|t| t.name == name)
}

/// Extract and edit EXIF tags in JPEG/PNG images.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageAdapter;

impl FormatAdapter for ImageAdapter {
    fn format(&self) -> Format {
        Format::Image
    }

    fn extract(&self, source: &[u8]) -> NormalizedMetadata {
        let exif = match read_exif(source) {
            Ok(exif) => exif,
            Err(e) => {
                log::warn!("Failed to read EXIF: {e:#}");
                None
            }
        };

        match exif {
            Some(data) if data.has_descriptive_tags() => normalize_exif(&data),
            _ => match read_image_props(source) {
                Ok(props) => normalize_props(&props),
                Err(e) => NormalizedMetadata::error(format!("Failed to read image metadata: {e:#}")),
            },
        }
    }

    fn apply(&self, source: &[u8], changes: &ChangeSet) -> Result<ModifiedArtifact, ApplyError> {
        ensure_format(Format::Image, changes)?;

        let mut tags = Vec::new();
        for (field, value) in changes.non_blank() {
            // ChangeSet only admits editable names, all of which are in the table.
            let Some(tag) = tag_for(field) else { continue };
            log::debug!("  {field} ({:?} IFD): {value}", tag.group);
            let tag = writer::make_text_tag(tag, value)
                .map_err(|e| ApplyError::write(Format::Image, e))?;
            tags.push(tag);
        }

        if tags.is_empty() {
            log::debug!("No non-blank image fields, returning input unchanged");
            return Ok(ModifiedArtifact::new(source.to_vec()));
        }

        let bytes = write_tags(source, &tags).map_err(|e| ApplyError::write(Format::Image, e))?;
        log::info!("Wrote {} EXIF tag(s)", tags.len());
        Ok(ModifiedArtifact::new(bytes))
    }
}

fn normalize_exif(data: &ExifData) -> NormalizedMetadata {
    let basic: Fields<MetaValue> = data
        .primary
        .iter()
        .map(|(name, value)| (*name, MetaValue::from(value.clone())))
        .collect();

    let mut capture = Fields::new();
    capture.insert("DateTimeOriginal", MetaValue::from(data.date_time_original.clone()));

    let mut meta = NormalizedMetadata::new();
    meta.insert_group(BASIC_GROUP, basic);
    meta.insert_group(CAPTURE_GROUP, capture);
    match &data.gps {
        Some(gps) => {
            let mut group = Fields::new();
            group.insert("GPSLatitude", MetaValue::from(gps.latitude.clone()));
            group.insert("GPSLongitude", MetaValue::from(gps.longitude.clone()));
            group.insert("GPSTimeStamp", MetaValue::from(gps.timestamp.clone()));
            meta.insert_group(GPS_GROUP, group);
        }
        None => meta.insert_value(GPS_GROUP, MetaValue::Null),
    }
    meta
}

fn normalize_props(props: &ImageProps) -> NormalizedMetadata {
    let mut basic = Fields::new();
    basic.insert("Format", MetaValue::from(props.format.clone()));
    basic.insert("Mode", MetaValue::from(props.mode.clone()));
    basic.insert("Size", MetaValue::from(format!("{} x {}", props.width, props.height)));

    let mut meta = NormalizedMetadata::new();
    meta.insert_group(BASIC_GROUP, basic);
    meta.insert_value(GPS_GROUP, MetaValue::Null);
    meta
}
