use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::edit::ChangeSet;
use crate::format::Format;
use crate::metadata::NormalizedMetadata;
use crate::session::EditSession;

/// The result of processing a single file.
///
/// Per-file failures never abort a batch; they are recorded in `error`.
///
/// # Example
///
/// ```rust,no_run
/// use tagit::config::Config;
/// use tagit::pipeline::process_file;
///
/// let changes = vec![("Title".to_string(), "Annual report".to_string())];
/// let result = process_file("report.pdf".as_ref(), &changes, &Config::default());
///
/// match result.error {
///     Some(err) => eprintln!("{err}"),
///     None => println!("Written: {:?}", result.modified_path),
/// }
/// ```
#[derive(Debug, Default)]
pub struct ProcessResult {
    pub path: PathBuf,
    pub format: Option<Format>,
    /// Metadata after the last successful step (extract, or re-extract after apply).
    pub metadata: Option<NormalizedMetadata>,
    /// Number of non-blank changes applied and verified.
    pub fields_written: usize,
    /// Where the modified copy was written. `None` on dry runs.
    pub modified_path: Option<PathBuf>,
    /// Where the JSON export was written.
    pub export_path: Option<PathBuf>,
    pub error: Option<String>,
}

/// `<name>_metadata.json`, the JSON export filename.
pub fn metadata_filename(name: &str) -> String {
    format!("{name}_metadata.json")
}

/// `modified_<name>`, the download filename of a modified copy.
pub fn modified_filename(name: &str) -> String {
    format!("modified_{name}")
}

/// Collect supported files from the given paths.
///
/// Accepts a mix of file paths and directory paths. Directories are walked
/// recursively (following symlinks). Only files whose extension maps to a
/// [`Format`] are included.
///
/// # Example
///
/// ```rust,no_run
/// use tagit::pipeline::collect_files;
/// use std::path::PathBuf;
///
/// let files = collect_files(&[
///     PathBuf::from("report.pdf"),     // single file
///     PathBuf::from("./documents/"),   // entire directory
/// ]);
/// println!("Found {} files", files.len());
/// ```
pub fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            if is_supported(path) {
                files.push(path.clone());
            } else {
                log::warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let p = entry.path();
                if p.is_file() && is_supported(p) {
                    files.push(p.to_path_buf());
                }
            }
        } else {
            log::warn!("Path does not exist: {}", path.display());
        }
    }

    files
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(Format::from_extension)
        .is_some()
}

/// Write `bytes` to `dir/name`, refusing to replace an existing file unless
/// `overwrite` is set.
fn write_output(dir: &Path, name: &str, bytes: &[u8], overwrite: bool) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    let path = dir.join(name);
    if path.exists() && !overwrite {
        anyhow::bail!(
            "{} already exists (set output.overwrite to replace it)",
            path.display()
        );
    }
    std::fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Extract, optionally apply `changes`, and write the outputs for one file.
///
/// `changes` are `(field, value)` pairs; they are validated against the
/// file's format once it is known. An empty list only extracts.
pub fn process_file(path: &Path, changes: &[(String, String)], config: &Config) -> ProcessResult {
    let mut result = ProcessResult {
        path: path.to_path_buf(),
        ..Default::default()
    };
    if let Err(e) = run(path, changes, config, &mut result) {
        log::warn!("{}: {e:#}", path.display());
        result.error = Some(format!("{e:#}"));
    }
    result
}

fn run(path: &Path, changes: &[(String, String)], config: &Config, result: &mut ProcessResult) -> Result<()> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("Path has no file name")?;
    let bytes = std::fs::read(path).context("Failed to read file")?;

    let mut session = EditSession::open(filename, bytes)?;
    result.format = Some(session.format());
    result.metadata = Some(session.load()?.clone());

    let out_dir = config.output_dir_for(path);
    let modified_name = session.modified_filename();

    if !changes.is_empty() {
        let changeset = ChangeSet::from_pairs(
            session.format(),
            changes.iter().map(|(k, v)| (k, v.as_str())),
        )?;
        let artifact = session.apply(&changeset)?;
        result.fields_written = changeset.non_blank().count();

        if config.output.dry_run {
            log::info!("Dry run: would write {modified_name} ({} bytes)", artifact.len());
        } else {
            let written = write_output(
                &out_dir,
                &modified_name,
                artifact.bytes(),
                config.output.overwrite,
            )?;
            log::info!("Wrote {}", written.display());
            result.modified_path = Some(written);
        }
        result.metadata = session.metadata().cloned();
    }

    if config.export.write_json {
        let json = session
            .export_json()
            .context("No metadata to export")?
            .context("Failed to serialize metadata")?;
        if config.output.dry_run {
            log::info!("Dry run: would write {}", session.metadata_filename());
        } else {
            let written = write_output(
                &out_dir,
                &session.metadata_filename(),
                json.as_bytes(),
                config.output.overwrite,
            )?;
            log::info!("Exported {}", written.display());
            result.export_path = Some(written);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::pdf_fixture;
    use std::fs;
    use tempfile::TempDir;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn write_pdf(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, pdf_fixture(Some("Draft"))).unwrap();
        path
    }

    // ── naming ───────────────────────────────────────────────────────

    #[test]
    fn output_names() {
        assert_eq!(metadata_filename("photo.jpg"), "photo.jpg_metadata.json");
        assert_eq!(modified_filename("photo.jpg"), "modified_photo.jpg");
    }

    // ── collect_files ────────────────────────────────────────────────

    #[test]
    fn collect_files_directory_recursive() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();

        fs::write(dir.path().join("a.jpg"), b"fake").unwrap();
        fs::write(sub.join("b.DOCX"), b"fake").unwrap();
        fs::write(sub.join("c.mov"), b"fake").unwrap();
        fs::write(sub.join("d.txt"), b"fake").unwrap();

        let files = collect_files(&[dir.path().to_path_buf()]);
        assert_eq!(files.len(), 3);
    }

    #[test]
    fn collect_files_skips_unsupported_and_missing() {
        let dir = TempDir::new().unwrap();
        let txt = dir.path().join("readme.txt");
        fs::write(&txt, b"hello").unwrap();

        assert!(collect_files(&[txt, PathBuf::from("/nonexistent/path")]).is_empty());
    }

    // ── process_file ─────────────────────────────────────────────────

    #[test]
    fn extract_only() {
        let dir = TempDir::new().unwrap();
        let pdf = write_pdf(&dir, "doc.pdf");

        let result = process_file(&pdf, &[], &Config::default());
        assert!(result.error.is_none(), "{:?}", result.error);
        assert_eq!(result.format, Some(Format::Pdf));
        assert!(result.modified_path.is_none());
        let meta = result.metadata.unwrap();
        assert_eq!(meta.value("Title").and_then(|v| v.as_text()), Some("Draft"));
    }

    #[test]
    fn apply_writes_modified_copy_and_export() {
        let dir = TempDir::new().unwrap();
        let pdf = write_pdf(&dir, "doc.pdf");
        let mut config = Config::default();
        config.output.directory = Some(dir.path().join("out"));
        config.export.write_json = true;

        let result = process_file(&pdf, &pairs(&[("Title", "Final"), ("Subject", "")]), &config);
        assert!(result.error.is_none(), "{:?}", result.error);
        assert_eq!(result.fields_written, 1);

        let modified = result.modified_path.unwrap();
        assert_eq!(modified, dir.path().join("out").join("modified_doc.pdf"));
        let reread = crate::format::select_adapter("doc.pdf")
            .unwrap()
            .extract(&fs::read(&modified).unwrap());
        assert_eq!(reread.value("Title").and_then(|v| v.as_text()), Some("Final"));

        let export = fs::read_to_string(result.export_path.unwrap()).unwrap();
        assert!(export.contains("\"Title\": \"Final\""));

        // The original is untouched.
        let original = crate::format::select_adapter("doc.pdf")
            .unwrap()
            .extract(&fs::read(&pdf).unwrap());
        assert_eq!(original.value("Title").and_then(|v| v.as_text()), Some("Draft"));
    }

    #[test]
    fn dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let pdf = write_pdf(&dir, "doc.pdf");
        let mut config = Config::default();
        config.output.dry_run = true;
        config.export.write_json = true;

        let result = process_file(&pdf, &pairs(&[("Title", "Final")]), &config);
        assert!(result.error.is_none(), "{:?}", result.error);
        assert!(result.modified_path.is_none());
        assert!(result.export_path.is_none());
        assert!(!dir.path().join("modified_doc.pdf").exists());
    }

    #[test]
    fn existing_output_needs_overwrite() {
        let dir = TempDir::new().unwrap();
        let pdf = write_pdf(&dir, "doc.pdf");
        fs::write(dir.path().join("modified_doc.pdf"), b"old").unwrap();

        let changes = pairs(&[("Title", "Final")]);
        let result = process_file(&pdf, &changes, &Config::default());
        assert!(result.error.unwrap().contains("already exists"));

        let mut config = Config::default();
        config.output.overwrite = true;
        let result = process_file(&pdf, &changes, &config);
        assert!(result.error.is_none(), "{:?}", result.error);
    }

    #[test]
    fn non_editable_field_is_reported() {
        let dir = TempDir::new().unwrap();
        let pdf = write_pdf(&dir, "doc.pdf");

        let result = process_file(&pdf, &pairs(&[("PageCount", "9")]), &Config::default());
        assert!(result.error.unwrap().contains("not an editable PDF field"));
    }

    #[test]
    fn unsupported_and_unreadable_files() {
        let dir = TempDir::new().unwrap();
        let txt = dir.path().join("notes.txt");
        fs::write(&txt, b"hi").unwrap();
        let result = process_file(&txt, &[], &Config::default());
        assert!(result.error.unwrap().contains("Unsupported file type"));

        let broken = dir.path().join("broken.pdf");
        fs::write(&broken, b"garbage").unwrap();
        let result = process_file(&broken, &[], &Config::default());
        assert!(result.error.unwrap().starts_with("Failed to read PDF metadata"));
    }
}
