//! Format adapters.
//!
//! Each adapter wraps one external library behind the same two calls:
//!
//! - [`FormatAdapter::extract`]: never fails; a parse error comes back as an
//!   `Error` record (see [`NormalizedMetadata::error`])
//! - [`FormatAdapter::apply`]: writes the non-blank entries of a
//!   [`ChangeSet`] into a copy of the input, verifies them and returns the
//!   copy's bytes, or a typed [`ApplyError`]
//!
//! | Format | Library | Apply |
//! |--------|---------|-------|
//! | Image (`.jpg`, `.jpeg`, `.png`) | nom-exif + image / little_exif + img-parts | EXIF IFD0 + Exif sub-IFD |
//! | PDF | lopdf | info dictionary, re-read to verify |
//! | DOCX / PPTX | zip + quick-xml | `docProps/core.xml`, re-read to verify |
//! | Video (`.mp4`, `.mov`, `.avi`) | nom-exif track parser | not supported |

mod exif;
mod office;
mod pdf;
mod staging;
mod video;

pub use exif::ImageAdapter;
pub use office::{DocxAdapter, PptxAdapter};
pub use pdf::PdfAdapter;
pub use video::VideoAdapter;

#[cfg(test)]
pub(crate) use office::sample_docx as docx_fixture;
#[cfg(test)]
pub(crate) use pdf::tests::sample_pdf as pdf_fixture;

use crate::edit::{ChangeSet, ModifiedArtifact};
use crate::error::ApplyError;
use crate::format::{Capabilities, Format};
use crate::metadata::NormalizedMetadata;

/// Uniform extract/apply contract over one format's library.
pub trait FormatAdapter {
    /// The format this adapter handles.
    fn format(&self) -> Format;

    /// Read metadata from the file's bytes.
    fn extract(&self, source: &[u8]) -> NormalizedMetadata;

    /// Write `changes` into a copy of `source` and return the copy.
    fn apply(&self, source: &[u8], changes: &ChangeSet) -> Result<ModifiedArtifact, ApplyError>;

    fn capabilities(&self) -> Capabilities {
        self.format().capabilities()
    }
}

/// Reject change sets built for a different format.
fn ensure_format(adapter: Format, changes: &ChangeSet) -> Result<(), ApplyError> {
    if changes.format() != adapter {
        return Err(ApplyError::FormatMismatch {
            expected: adapter,
            found: changes.format(),
        });
    }
    Ok(())
}
