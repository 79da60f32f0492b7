//! Supported formats and extension-based dispatch.
//!
//! The format is chosen from the filename extension only. Upload-time MIME
//! detection is not consulted: it is unreliable for Office packages, which
//! are zip files underneath.
//!
//! ```rust
//! use tagit::format::Format;
//!
//! assert_eq!(Format::from_filename("Report.DOCX"), Ok(Format::Docx));
//! assert!(Format::from_filename("notes.txt").is_err());
//! assert!(!Format::Video.capabilities().editable);
//! ```

use std::fmt;
use std::path::Path;

use crate::adapters::{
    DocxAdapter, FormatAdapter, ImageAdapter, PdfAdapter, PptxAdapter, VideoAdapter,
};
use crate::error::UnsupportedType;

/// Editable EXIF fields (primary IFD, except `DateTimeOriginal`).
pub const IMAGE_FIELDS: &[&str] = &[
    "Make",
    "Model",
    "Software",
    "DateTime",
    "DateTimeOriginal",
    "Artist",
    "Copyright",
    "ImageDescription",
];

/// Editable PDF info dictionary keys.
pub const PDF_FIELDS: &[&str] = &["Title", "Author", "Subject", "Keywords", "Creator", "Producer"];

/// Editable Office core properties.
pub const OFFICE_FIELDS: &[&str] = &[
    "title",
    "author",
    "subject",
    "keywords",
    "comments",
    "last_modified_by",
    "category",
    "content_status",
    "identifier",
    "language",
    "version",
];

/// A file format with its own adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// JPEG / PNG: EXIF tags
    Image,
    /// PDF: document info dictionary
    Pdf,
    /// Word: core properties
    Docx,
    /// PowerPoint: core properties
    Pptx,
    /// MP4 / MOV / AVI: container track metadata, read only
    Video,
}

/// What callers may do with a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Whether `apply` is available at all.
    pub editable: bool,
    /// Field names a change set may carry.
    pub fields: &'static [&'static str],
}

impl Capabilities {
    pub fn is_editable(&self, field: &str) -> bool {
        self.editable && self.fields.contains(&field)
    }
}

impl Format {
    pub const ALL: [Format; 5] = [
        Format::Image,
        Format::Pdf,
        Format::Docx,
        Format::Pptx,
        Format::Video,
    ];

    /// Map a lower-cased extension (without the dot) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "png" => Some(Format::Image),
            "pdf" => Some(Format::Pdf),
            "docx" => Some(Format::Docx),
            "pptx" => Some(Format::Pptx),
            "mp4" | "mov" | "avi" => Some(Format::Video),
            _ => None,
        }
    }

    /// Determine the format from a filename's extension.
    pub fn from_filename(filename: &str) -> Result<Self, UnsupportedType> {
        Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            .ok_or_else(|| UnsupportedType {
                filename: filename.to_string(),
            })
    }

    pub fn capabilities(self) -> Capabilities {
        match self {
            Format::Image => Capabilities {
                editable: true,
                fields: IMAGE_FIELDS,
            },
            Format::Pdf => Capabilities {
                editable: true,
                fields: PDF_FIELDS,
            },
            Format::Docx | Format::Pptx => Capabilities {
                editable: true,
                fields: OFFICE_FIELDS,
            },
            Format::Video => Capabilities {
                editable: false,
                fields: &[],
            },
        }
    }

    /// A content type more specific than `application/octet-stream`.
    pub fn content_type(self, filename: &str) -> &'static str {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match (self, ext.as_str()) {
            (Format::Image, "png") => "image/png",
            (Format::Image, _) => "image/jpeg",
            (Format::Pdf, _) => "application/pdf",
            (Format::Docx, _) => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            (Format::Pptx, _) => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            (Format::Video, "mov") => "video/quicktime",
            (Format::Video, "avi") => "video/x-msvideo",
            (Format::Video, _) => "video/mp4",
        }
    }

    /// The adapter that handles this format.
    pub fn adapter(self) -> Box<dyn FormatAdapter> {
        match self {
            Format::Image => Box::new(ImageAdapter),
            Format::Pdf => Box::new(PdfAdapter),
            Format::Docx => Box::new(DocxAdapter),
            Format::Pptx => Box::new(PptxAdapter),
            Format::Video => Box::new(VideoAdapter::default()),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Image => "Image",
            Format::Pdf => "PDF",
            Format::Docx => "DOCX",
            Format::Pptx => "PPTX",
            Format::Video => "Video",
        };
        f.write_str(name)
    }
}

/// Select the adapter for a filename. No adapter is built for unsupported names.
pub fn select_adapter(filename: &str) -> Result<Box<dyn FormatAdapter>, UnsupportedType> {
    let format = Format::from_filename(filename)?;
    log::debug!("{filename}: dispatching to {format} adapter");
    let adapter: Box<dyn FormatAdapter> = match format {
        Format::Video => Box::new(VideoAdapter::for_filename(filename)),
        other => other.adapter(),
    };
    Ok(adapter)
}

/// Capability query for a filename.
pub fn capabilities_for(filename: &str) -> Result<Capabilities, UnsupportedType> {
    Format::from_filename(filename).map(Format::capabilities)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_table() {
        let cases = [
            ("a.jpg", Format::Image),
            ("a.JPEG", Format::Image),
            ("a.png", Format::Image),
            ("a.pdf", Format::Pdf),
            ("a.docx", Format::Docx),
            ("a.pptx", Format::Pptx),
            ("a.mp4", Format::Video),
            ("a.mov", Format::Video),
            ("clip.AVI", Format::Video),
        ];
        for (name, expected) in cases {
            assert_eq!(Format::from_filename(name), Ok(expected), "{name}");
        }
    }

    #[test]
    fn unsupported_extensions() {
        for name in ["notes.txt", "archive.zip", "noext", "doc.doc", ".pdf.bak"] {
            let err = Format::from_filename(name).unwrap_err();
            assert_eq!(err.filename, name);
        }
    }

    #[test]
    fn select_adapter_unsupported_builds_nothing() {
        assert!(select_adapter("readme.txt").is_err());
    }

    #[test]
    fn select_adapter_matches_format() {
        for format in Format::ALL {
            let name = match format {
                Format::Image => "x.jpg",
                Format::Pdf => "x.pdf",
                Format::Docx => "x.docx",
                Format::Pptx => "x.pptx",
                Format::Video => "x.mp4",
            };
            assert_eq!(select_adapter(name).unwrap().format(), format);
        }
    }

    #[test]
    fn video_is_not_editable() {
        let caps = capabilities_for("clip.mov").unwrap();
        assert!(!caps.editable);
        assert!(caps.fields.is_empty());
        assert!(!caps.is_editable("Title"));
    }

    #[test]
    fn editable_field_sets() {
        let image = Format::Image.capabilities();
        assert!(image.is_editable("DateTimeOriginal"));
        assert!(!image.is_editable("GPSLatitude"));
        assert!(Format::Pdf.capabilities().is_editable("Title"));
        assert!(Format::Pptx.capabilities().is_editable("title"));
        assert!(!Format::Docx.capabilities().is_editable("modified"));
    }

    #[test]
    fn content_types() {
        assert_eq!(Format::Image.content_type("a.png"), "image/png");
        assert_eq!(Format::Image.content_type("a.jpg"), "image/jpeg");
        assert_eq!(Format::Video.content_type("a.mov"), "video/quicktime");
    }
}
