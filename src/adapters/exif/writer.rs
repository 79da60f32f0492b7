use anyhow::{Context, Result};
use std::path::Path;
use img_parts::jpeg::Jpeg;
use img_parts::{Bytes, DynImage, ImageEXIF};
use little_exif::endian::Endian;
use little_exif::exif_tag::{ExifTag, ExifTagGroup};
use little_exif::exif_tag_format::ExifTagFormat;
use little_exif::filetype::FileExtension;
use little_exif::metadata::Metadata;

use super::reader::exif_jpeg_shell;
use super::{EditableTag, TagGroup};
use crate::adapters::staging::StagedFile;

// little_exif as_u8_vec(JPEG) returns: [APP1 marker 2B][length 2B][Exif\0\0 6B][TIFF data]
// img-parts set_exif() expects just the TIFF data (after Exif\0\0)
const JPEG_EXIF_OVERHEAD: usize = 10; // 2 + 2 + 6

impl TagGroup {
    fn exif_group(self) -> ExifTagGroup {
        match self {
            TagGroup::Primary => ExifTagGroup::IFD0,
            TagGroup::Capture => ExifTagGroup::ExifIFD,
        }
    }
}

/// Encode a text value as a NUL-terminated ASCII field.
fn encode_text(value: &str) -> Vec<u8> {
    let mut bytes = value.as_bytes().to_vec();
    bytes.push(0);
    bytes
}

/// Build a text tag from raw bytes, placed in the group its field belongs to.
pub(crate) fn make_text_tag(tag: &EditableTag, value: &str) -> Result<ExifTag> {
    ExifTag::from_u16_with_data(
        tag.code,
        &ExifTagFormat::STRING,
        &encode_text(value),
        &Endian::Little,
        &tag.group.exif_group(),
    )
    .map_err(|e| anyhow::anyhow!("Failed to encode {}: {e:?}", tag.name))
}

/// Load existing EXIF metadata from a JPEG on disk using little_exif.
/// Returns None if it can't parse (instead of losing data).
fn load_existing_metadata(path: &Path) -> Option<Metadata> {
    let path_owned = path.to_path_buf();
    // Suppress panics from little_exif
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(|_| {}));
    let result = std::panic::catch_unwind(move || Metadata::new_from_path(&path_owned));
    std::panic::set_hook(prev_hook);

    match result {
        Ok(Ok(m)) if m.data().is_empty() => {
            log::warn!("little_exif found no tags in a non-empty EXIF payload");
            None
        }
        Ok(Ok(m)) => {
            log::debug!("little_exif loaded {} existing EXIF tags", m.data().len());
            Some(m)
        }
        Ok(Err(e)) => {
            log::warn!("little_exif could not parse EXIF: {e}");
            None
        }
        Err(_) => {
            log::warn!("little_exif panicked parsing EXIF");
            None
        }
    }
}

/// Stage the current tags as a JPEG little_exif can open by path: the source
/// itself for JPEG, a shell around the `eXIf` payload for PNG.
fn stage_existing(image: &DynImage, source: &[u8], exif: &[u8]) -> Result<StagedFile> {
    match image {
        DynImage::Jpeg(_) => StagedFile::with_contents(source, ".jpg"),
        _ => StagedFile::with_contents(&exif_jpeg_shell(exif)?, ".jpg"),
    }
}

/// Write text tags into a JPEG or PNG, preserving every other segment/chunk.
///
/// Strategy:
/// 1. Parse the container with img-parts
/// 2. Load the existing tag structure with little_exif (fresh one if there is none)
/// 3. Set the new tags, each in its own IFD
/// 4. Splice the rebuilt TIFF payload back with img-parts
pub fn write_tags(source: &[u8], tags: &[ExifTag]) -> Result<Vec<u8>> {
    let mut image = DynImage::from_bytes(Bytes::copy_from_slice(source))
        .context("Failed to parse image container")?
        .context("Unsupported image container (expected JPEG or PNG)")?;

    if !matches!(image, DynImage::Jpeg(_) | DynImage::Png(_)) {
        anyhow::bail!("Unsupported image container (expected JPEG or PNG)");
    }

    let orig_exif_pos = match &image {
        DynImage::Jpeg(jpeg) => find_exif_segment_pos(jpeg),
        _ => None,
    };

    let original_exif = image.exif();
    let mut metadata = if let Some(exif) = &original_exif {
        let staged = stage_existing(&image, source, exif)?;
        load_existing_metadata(staged.path())
            .context("Existing EXIF data could not be loaded for rewriting")?
    } else {
        log::debug!("No existing EXIF, building a fresh structure");
        Metadata::new()
    };

    for tag in tags {
        metadata.set_tag(tag.clone());
    }

    let exif_bytes = metadata.as_u8_vec(FileExtension::JPEG);
    if exif_bytes.len() <= JPEG_EXIF_OVERHEAD {
        anyhow::bail!("little_exif produced an empty EXIF structure");
    }
    let mut tiff_data = exif_bytes[JPEG_EXIF_OVERHEAD..].to_vec();
    if let Some(original) = &original_exif {
        tiff_data = carry_gps_ifd(original, &tiff_data)?;
    }
    image.set_exif(Some(Bytes::from(tiff_data)));

    // set_exif() inserts at position 3, which may be after XMP APP1.
    // Move the EXIF segment back to its original position so EXIF comes
    // before XMP (required for many EXIF parsers).
    if let DynImage::Jpeg(jpeg) = &mut image {
        if let Some(new_pos) = find_exif_segment_pos(jpeg) {
            let target_pos = orig_exif_pos.unwrap_or(1); // default: right after APP0
            if target_pos < new_pos {
                let segments = jpeg.segments_mut();
                let seg = segments.remove(new_pos);
                segments.insert(target_pos, seg);
            }
        }
    }

    Ok(image.encoder().bytes().to_vec())
}

const TAG_EXIF_OFFSET: u16 = 0x8769;
const TAG_GPS_INFO: u16 = 0x8825;
const TIFF_LONG: u16 = 4;
const IFD_ENTRY_LEN: usize = 12;

/// Byte order of a TIFF payload, with bounds-checked readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ByteOrder {
    big_endian: bool,
}

impl ByteOrder {
    fn of(tiff: &[u8]) -> Result<Self> {
        match tiff.get(0..2) {
            Some(b"MM") => Ok(Self { big_endian: true }),
            Some(b"II") => Ok(Self { big_endian: false }),
            _ => anyhow::bail!("Invalid TIFF byte order"),
        }
    }

    fn read_u16(self, data: &[u8], at: usize) -> Result<u16> {
        let b = data.get(at..at + 2).context("TIFF data truncated")?;
        Ok(if self.big_endian {
            u16::from_be_bytes([b[0], b[1]])
        } else {
            u16::from_le_bytes([b[0], b[1]])
        })
    }

    fn read_u32(self, data: &[u8], at: usize) -> Result<u32> {
        let b = data.get(at..at + 4).context("TIFF data truncated")?;
        Ok(if self.big_endian {
            u32::from_be_bytes([b[0], b[1], b[2], b[3]])
        } else {
            u32::from_le_bytes([b[0], b[1], b[2], b[3]])
        })
    }

    fn encode_u16(self, val: u16) -> [u8; 2] {
        if self.big_endian { val.to_be_bytes() } else { val.to_le_bytes() }
    }

    fn encode_u32(self, val: u32) -> [u8; 4] {
        if self.big_endian { val.to_be_bytes() } else { val.to_le_bytes() }
    }

    /// The 12-byte entries of the IFD at `offset`, plus its next-IFD link.
    fn ifd_entries(self, tiff: &[u8], offset: usize) -> Result<(Vec<[u8; 12]>, u32)> {
        let count = usize::from(self.read_u16(tiff, offset)?);
        let start = offset + 2;
        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let at = start + i * IFD_ENTRY_LEN;
            let raw = tiff
                .get(at..at + IFD_ENTRY_LEN)
                .context("IFD entries extend beyond TIFF data")?;
            let mut entry = [0u8; 12];
            entry.copy_from_slice(raw);
            entries.push(entry);
        }
        let next = self.read_u32(tiff, start + count * IFD_ENTRY_LEN)?;
        Ok((entries, next))
    }
}

/// Size in bytes of one component of a TIFF field type.
fn type_size(field_type: u16) -> Option<usize> {
    match field_type {
        1 | 2 | 6 | 7 => Some(1),
        3 | 8 => Some(2),
        4 | 9 | 11 => Some(4),
        5 | 10 | 12 => Some(8),
        _ => None,
    }
}

fn offset_u32(len: usize) -> Result<u32> {
    u32::try_from(len).context("EXIF payload exceeds 4 GiB")
}

/// little_exif only encodes IFD0 and the Exif sub-IFD. Copy the GPS IFD of
/// `original` (and the values it points at) onto the end of `rebuilt`, then
/// append a copy of the rebuilt IFD0 that links to it.
fn carry_gps_ifd(original: &[u8], rebuilt: &[u8]) -> Result<Vec<u8>> {
    let order = ByteOrder::of(original)?;
    if ByteOrder::of(rebuilt)? != order {
        log::warn!("Rebuilt EXIF changed byte order, GPS data not carried over");
        return Ok(rebuilt.to_vec());
    }

    let read_tag = |entry: &[u8; 12]| order.read_u16(entry, 0);

    let (orig_ifd0, _) = order.ifd_entries(original, order.read_u32(original, 4)? as usize)?;
    let mut gps_offset = None;
    for entry in &orig_ifd0 {
        if read_tag(entry)? == TAG_GPS_INFO {
            gps_offset = Some(order.read_u32(entry, 8)? as usize);
        }
    }
    let Some(gps_offset) = gps_offset else {
        return Ok(rebuilt.to_vec());
    };
    let (gps_entries, _) = order.ifd_entries(original, gps_offset)?;

    let mut result = rebuilt.to_vec();
    if result.len() % 2 == 1 {
        result.push(0);
    }

    // Values over four bytes live outside the IFD; move them first.
    let mut relocated = Vec::with_capacity(gps_entries.len());
    for mut entry in gps_entries {
        let field_type = order.read_u16(&entry, 2)?;
        let count = order.read_u32(&entry, 4)? as usize;
        let size = type_size(field_type)
            .context("Unknown TIFF field type in GPS IFD")?
            .saturating_mul(count);
        if size > 4 {
            let src = order.read_u32(&entry, 8)? as usize;
            let value = original
                .get(src..src + size)
                .context("GPS value extends beyond TIFF data")?;
            entry[8..12].copy_from_slice(&order.encode_u32(offset_u32(result.len())?));
            result.extend_from_slice(value);
            if result.len() % 2 == 1 {
                result.push(0);
            }
        }
        relocated.push(entry);
    }

    let new_gps = offset_u32(result.len())?;
    result.extend_from_slice(&order.encode_u16(u16::try_from(relocated.len())?));
    for entry in &relocated {
        result.extend_from_slice(entry);
    }
    result.extend_from_slice(&order.encode_u32(0));

    // Rebuilt IFD0 plus a GPSInfo pointer, kept in tag order. little_exif
    // writes an ExifOffset even without an Exif sub-IFD; that pointer would
    // now land on the GPS data, so it goes.
    let (ifd0, ifd0_next) = order.ifd_entries(rebuilt, order.read_u32(rebuilt, 4)? as usize)?;
    let mut kept = Vec::with_capacity(ifd0.len() + 1);
    for entry in ifd0 {
        let tag = read_tag(&entry)?;
        let dangling = tag == TAG_EXIF_OFFSET && order.read_u32(&entry, 8)? as usize >= rebuilt.len();
        if tag != TAG_GPS_INFO && !dangling {
            kept.push(entry);
        }
    }
    let mut pointer = [0u8; 12];
    pointer[0..2].copy_from_slice(&order.encode_u16(TAG_GPS_INFO));
    pointer[2..4].copy_from_slice(&order.encode_u16(TIFF_LONG));
    pointer[4..8].copy_from_slice(&order.encode_u32(1));
    pointer[8..12].copy_from_slice(&order.encode_u32(new_gps));
    let mut insert_at = kept.len();
    for (i, entry) in kept.iter().enumerate() {
        if read_tag(entry)? > TAG_GPS_INFO {
            insert_at = i;
            break;
        }
    }
    kept.insert(insert_at, pointer);

    let new_ifd0 = offset_u32(result.len())?;
    result.extend_from_slice(&order.encode_u16(u16::try_from(kept.len())?));
    for entry in &kept {
        result.extend_from_slice(entry);
    }
    result.extend_from_slice(&order.encode_u32(ifd0_next));
    result[4..8].copy_from_slice(&order.encode_u32(new_ifd0));

    log::debug!("Carried {} GPS entries into the rebuilt EXIF", relocated.len());
    Ok(result)
}

/// Find the position of the EXIF APP1 segment in a JPEG.
/// EXIF segments have marker 0xE1 (APP1) and contents starting with "Exif\0\0".
fn find_exif_segment_pos(jpeg: &Jpeg) -> Option<usize> {
    const EXIF_PREFIX: &[u8] = b"Exif\0\0";
    jpeg.segments()
        .iter()
        .position(|s| s.marker() == 0xE1 && s.contents().starts_with(EXIF_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::exif::tag_for;
    use crate::adapters::exif::tests::{gps_tiff, ifd, rationals};

    #[test]
    fn text_is_nul_terminated() {
        assert_eq!(encode_text("ab"), b"ab\0");
    }

    #[test]
    fn capture_time_goes_to_exif_sub_ifd() {
        let tag = make_text_tag(tag_for("DateTimeOriginal").unwrap(), "2024:01:01 00:00:00").unwrap();
        assert!(matches!(tag.get_group(), ExifTagGroup::ExifIFD));

        let tag = make_text_tag(tag_for("Make").unwrap(), "Canon").unwrap();
        assert!(matches!(tag.get_group(), ExifTagGroup::IFD0));
    }

    fn tiff_with_ifd0(entries: &[(u16, u16, u32, Vec<u8>)]) -> Vec<u8> {
        let mut tiff = b"II*\0".to_vec();
        tiff.extend_from_slice(&8u32.to_le_bytes());
        tiff.extend(ifd(8, entries));
        tiff
    }

    #[test]
    fn gps_ifd_is_carried_into_rebuilt_payload() {
        let original = gps_tiff();
        // Artist, plus an ExifOffset that points past the end.
        let rebuilt = tiff_with_ifd0(&[
            (0x013B, 2, 4, b"Ada\0".to_vec()),
            (TAG_EXIF_OFFSET, 4, 1, 9999u32.to_le_bytes().to_vec()),
        ]);

        let merged = carry_gps_ifd(&original, &rebuilt).unwrap();
        let order = ByteOrder::of(&merged).unwrap();
        let ifd0_at = order.read_u32(&merged, 4).unwrap() as usize;
        let (ifd0, _) = order.ifd_entries(&merged, ifd0_at).unwrap();
        let tags: Vec<u16> = ifd0.iter().map(|e| order.read_u16(e, 0).unwrap()).collect();
        assert_eq!(tags, vec![0x013B, TAG_GPS_INFO]);

        let gps_at = order.read_u32(&ifd0[1], 8).unwrap() as usize;
        let (gps, _) = order.ifd_entries(&merged, gps_at).unwrap();
        assert_eq!(gps.len(), 5);
        let lat_at = order.read_u32(&gps[1], 8).unwrap() as usize;
        assert_eq!(
            &merged[lat_at..lat_at + 24],
            rationals(&[(48, 1), (51, 1), (24, 1)]).as_slice()
        );
    }

    #[test]
    fn payload_without_gps_is_left_alone() {
        let original = tiff_with_ifd0(&[(0x010F, 2, 4, b"Sony".to_vec())]);
        let rebuilt = tiff_with_ifd0(&[(0x013B, 2, 4, b"Ada\0".to_vec())]);
        assert_eq!(carry_gps_ifd(&original, &rebuilt).unwrap(), rebuilt);
    }

    #[test]
    fn truncated_gps_ifd_is_an_error() {
        let mut original = gps_tiff();
        original.truncate(original.len() - 30);
        let rebuilt = tiff_with_ifd0(&[(0x013B, 2, 4, b"Ada\0".to_vec())]);
        assert!(carry_gps_ifd(&original, &rebuilt).is_err());
    }

    #[test]
    fn rejects_non_image_bytes() {
        let tag = make_text_tag(tag_for("Make").unwrap(), "Canon").unwrap();
        assert!(write_tags(b"not an image", &[tag]).is_err());
    }
}
