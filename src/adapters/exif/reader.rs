use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime};
use image::{ColorType, ImageDecoder, ImageFormat, ImageReader};
use img_parts::{Bytes, DynImage, ImageEXIF};
use nom_exif::*;
use std::io::Cursor;

use super::{TAG_DATE_TIME_ORIGINAL, TAG_GPS_TIMESTAMP, TagGroup, EDITABLE_TAGS};

/// EXIF fields read from an image, as display strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExifData {
    /// Primary image IFD fields in [`EDITABLE_TAGS`] order.
    pub primary: Vec<(&'static str, Option<String>)>,
    /// Exif sub-IFD capture timestamp.
    pub date_time_original: Option<String>,
    pub gps: Option<GpsData>,
}

impl ExifData {
    /// Whether any descriptive tag is present. Files without one get the
    /// synthesized format/mode/size group instead.
    pub fn has_descriptive_tags(&self) -> bool {
        self.date_time_original.is_some() || self.primary.iter().any(|(_, v)| v.is_some())
    }
}

/// GPS sub-IFD, already formatted for display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpsData {
    /// `D° M' S" R`
    pub latitude: String,
    pub longitude: String,
    /// `H:M:S UTC`
    pub timestamp: Option<String>,
}

/// Basic properties for images with no usable tag data.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageProps {
    pub format: String,
    pub mode: String,
    pub width: u32,
    pub height: u32,
}

/// Pull the raw TIFF-structured EXIF payload out of a JPEG APP1 segment or a PNG eXIf chunk.
pub fn embedded_exif(source: &[u8]) -> Option<Bytes> {
    match DynImage::from_bytes(Bytes::copy_from_slice(source)) {
        Ok(Some(image)) => image.exif(),
        Ok(None) => None,
        Err(e) => {
            log::debug!("img-parts could not parse container: {e}");
            None
        }
    }
}

/// Wrap a bare TIFF payload in the smallest JPEG that carries it
/// (`SOI`, one `APP1 Exif` segment, `EOI`). Both EXIF libraries read tags
/// out of a JPEG container but not out of a PNG `eXIf` chunk.
pub(crate) fn exif_jpeg_shell(tiff: &[u8]) -> Result<Vec<u8>> {
    const EXIF_HEADER: &[u8] = b"Exif\0\0";
    let len = u16::try_from(2 + EXIF_HEADER.len() + tiff.len())
        .context("EXIF payload does not fit in a single APP1 segment")?;

    let mut jpeg = Vec::with_capacity(usize::from(len) + 6);
    jpeg.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xE1]);
    jpeg.extend_from_slice(&len.to_be_bytes());
    jpeg.extend_from_slice(EXIF_HEADER);
    jpeg.extend_from_slice(tiff);
    jpeg.extend_from_slice(&[0xFF, 0xD9]);
    Ok(jpeg)
}

fn is_jpeg(source: &[u8]) -> bool {
    source.starts_with(&[0xFF, 0xD8, 0xFF])
}

/// Read the EXIF tags of an in-memory image. `Ok(None)` means the image carries no tag data.
pub fn read_exif(source: &[u8]) -> Result<Option<ExifData>> {
    let Some(tiff) = embedded_exif(source) else {
        log::debug!("No EXIF payload found");
        return Ok(None);
    };

    // JPEGs are parsed whole; anything else goes through a JPEG shell.
    let container = if is_jpeg(source) {
        source.to_vec()
    } else {
        exif_jpeg_shell(&tiff)?
    };

    let mut parser = MediaParser::new();
    let ms = MediaSource::seekable(Cursor::new(container)).context("Failed to open EXIF payload")?;
    let iter: ExifIter = parser
        .parse(ms)
        .context("EXIF payload is present but could not be parsed")?;

    // GPS first: the conversion below consumes the iterator.
    let gps_info = iter.parse_gps_info().ok().flatten();
    let exif: Exif = iter.into();

    let mut data = ExifData::default();
    for tag in EDITABLE_TAGS.iter().filter(|t| t.group == TagGroup::Primary) {
        let value = exif
            .get_by_ifd_tag_code(0, tag.code)
            .and_then(entry_to_string)
            .map(|s| if tag.is_datetime() { exif_datetime(&s) } else { s });
        data.primary.push((tag.name, value));
    }

    data.date_time_original = exif
        .get_by_ifd_tag_code(0, TAG_DATE_TIME_ORIGINAL)
        .and_then(entry_to_string)
        .map(|s| exif_datetime(&s));

    if let Some(gps) = gps_info {
        data.gps = Some(GpsData {
            latitude: latlng_to_dms(&gps.latitude, gps.latitude_ref),
            longitude: latlng_to_dms(&gps.longitude, gps.longitude_ref),
            timestamp: exif.get_by_ifd_tag_code(0, TAG_GPS_TIMESTAMP).map(gps_timestamp),
        });
    }

    Ok(Some(data))
}

/// Decode format, color mode and pixel dimensions with the `image` crate.
pub fn read_image_props(source: &[u8]) -> Result<ImageProps> {
    let reader = ImageReader::new(Cursor::new(source))
        .with_guessed_format()
        .context("Failed to detect image format")?;
    let format = reader
        .format()
        .map(format_name)
        .unwrap_or_else(|| "unknown".to_string());
    let decoder = reader.into_decoder().context("Failed to decode image header")?;
    let (width, height) = decoder.dimensions();
    Ok(ImageProps {
        format,
        mode: color_mode(decoder.color_type()),
        width,
        height,
    })
}

fn format_name(format: ImageFormat) -> String {
    match format {
        ImageFormat::Jpeg => "JPEG".to_string(),
        ImageFormat::Png => "PNG".to_string(),
        other => format!("{other:?}").to_uppercase(),
    }
}

/// Short color mode names (`L`, `RGB`, `RGBA`, ...).
fn color_mode(color: ColorType) -> String {
    match color {
        ColorType::L8 => "L".into(),
        ColorType::La8 => "LA".into(),
        ColorType::Rgb8 => "RGB".into(),
        ColorType::Rgba8 => "RGBA".into(),
        ColorType::L16 => "I;16".into(),
        ColorType::La16 => "LA;16".into(),
        ColorType::Rgb16 => "RGB;16".into(),
        ColorType::Rgba16 => "RGBA;16".into(),
        other => format!("{other:?}"),
    }
}

/// Convert an EntryValue to an Option<String>.
fn entry_to_string(val: &EntryValue) -> Option<String> {
    let s = val.to_string();
    let s = s.trim().trim_matches('"').trim_end_matches('\0').trim().to_string();
    if s.is_empty() { None } else { Some(s) }
}

/// nom-exif turns EXIF timestamps into RFC 3339 or ISO strings; put them back
/// into the `YYYY:MM:DD HH:MM:SS` form they are written in.
pub(crate) fn exif_datetime(s: &str) -> String {
    const EXIF_FMT: &str = "%Y:%m:%d %H:%M:%S";
    if NaiveDateTime::parse_from_str(s, EXIF_FMT).is_ok() {
        return s.to_string();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.naive_local().format(EXIF_FMT).to_string();
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return dt.format(EXIF_FMT).to_string();
        }
    }
    s.to_string()
}

/// Render an unsigned rational without a trailing `.0` when it is whole.
pub(crate) fn fmt_rational(num: u32, den: u32) -> String {
    if den == 0 {
        return "0".to_string();
    }
    if num % den == 0 {
        return (num / den).to_string();
    }
    let s = format!("{:.4}", f64::from(num) / f64::from(den));
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Convert a nom-exif LatLng (3 URationals: deg, min, sec) to `D° M' S" R`.
fn latlng_to_dms(latlng: &LatLng, reference: char) -> String {
    format!(
        "{}° {}' {}\" {}",
        fmt_rational(latlng.0.0, latlng.0.1),
        fmt_rational(latlng.1.0, latlng.1.1),
        fmt_rational(latlng.2.0, latlng.2.1),
        reference
    )
}

/// GPSTimeStamp is three rationals (hour, minute, second) in UTC.
fn gps_timestamp(val: &EntryValue) -> String {
    match val {
        EntryValue::URationalArray(parts) if parts.len() == 3 => format!(
            "{}:{}:{} UTC",
            fmt_rational(parts[0].0, parts[0].1),
            fmt_rational(parts[1].0, parts[1].1),
            fmt_rational(parts[2].0, parts[2].1)
        ),
        other => format!("{} UTC", other.to_string().trim()),
    }
}
