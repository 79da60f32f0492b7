use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use tagit::metadata::{Entry, MetaValue, NormalizedMetadata};
use tagit::{config, format, pipeline};

#[derive(Parser, Debug)]
#[command(
    name = "tagit",
    version,
    about = "Read and edit metadata in images, PDFs, Word/PowerPoint documents and videos"
)]
struct Cli {
    /// Files or directories to process
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Set a metadata field (repeatable); writes a modified_<name> copy
    #[arg(long = "set", value_name = "FIELD=VALUE", value_parser = parse_assignment)]
    set: Vec<(String, String)>,

    /// Show which fields can be edited for each file and exit
    #[arg(long)]
    fields: bool,

    /// Write <name>_metadata.json next to the outputs
    #[arg(long)]
    export: bool,

    /// Directory for modified copies and exports (default: beside each input)
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Replace existing output files
    #[arg(long)]
    overwrite: bool,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Apply and verify changes without writing any files
    #[arg(long)]
    dry_run: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// `FIELD=VALUE`; the value may be empty or contain further `=`.
fn parse_assignment(s: &str) -> Result<(String, String), String> {
    let (field, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=VALUE, got '{s}'"))?;
    let field = field.trim();
    if field.is_empty() {
        return Err(format!("missing field name in '{s}'"));
    }
    Ok((field.to_string(), value.to_string()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Handle --init
    if cli.init {
        let path = config::Config::default().save(cli.config.as_deref())?;
        println!("Default config written to {}", path.display());
        return Ok(());
    }

    if cli.paths.is_empty() {
        anyhow::bail!("No input files or directories specified. Use --help for usage.");
    }

    let files = pipeline::collect_files(&cli.paths);
    if files.is_empty() {
        anyhow::bail!("No supported files found in the specified paths.");
    }

    // Handle --fields
    if cli.fields {
        for path in &files {
            print_capabilities(path);
        }
        return Ok(());
    }

    // Load config, CLI flags override
    let mut config = config::Config::load(cli.config.as_deref())?;
    if cli.dry_run {
        config.output.dry_run = true;
    }
    if cli.overwrite {
        config.output.overwrite = true;
    }
    if cli.export {
        config.export.write_json = true;
    }
    if let Some(dir) = cli.output_dir {
        config.output.directory = Some(dir);
    }

    log::info!("Found {} file(s) to process", files.len());
    if config.output.dry_run && !cli.set.is_empty() {
        log::info!("DRY RUN: no files will be written");
    }

    let mut results = Vec::new();
    let total = files.len();

    for (i, path) in files.iter().enumerate() {
        log::info!("[{}/{}] Processing: {}", i + 1, total, path.display());

        let result = pipeline::process_file(path, &cli.set, &config);

        if let Some(ref err) = result.error {
            log::error!("  Error: {err}");
        } else {
            if let Some(ref modified) = result.modified_path {
                log::info!("  Wrote {} field(s) to {}", result.fields_written, modified.display());
            }
            if let Some(ref export) = result.export_path {
                log::info!("  Exported: {}", export.display());
            }
            if !cli.json {
                if let Some(ref meta) = result.metadata {
                    let changed: Vec<&str> = cli
                        .set
                        .iter()
                        .filter(|(_, v)| !v.trim().is_empty())
                        .map(|(k, _)| k.as_str())
                        .collect();
                    print_metadata(path, meta, &changed);
                }
            }
        }

        results.push(result);
    }

    // JSON output
    if cli.json {
        let json_results: Vec<serde_json::Value> = results
            .iter()
            .map(|r| {
                serde_json::json!({
                    "path": r.path.display().to_string(),
                    "format": r.format.map(|f| f.to_string()),
                    "metadata": r.metadata,
                    "fields_written": r.fields_written,
                    "modified_path": r.modified_path.as_ref().map(|p| p.display().to_string()),
                    "export_path": r.export_path.as_ref().map(|p| p.display().to_string()),
                    "error": r.error,
                })
            })
            .collect();

        println!("{}", serde_json::to_string_pretty(&json_results)?);
    }

    // Summary
    let success = results.iter().filter(|r| r.error.is_none()).count();
    let failed = total - success;
    log::info!("Done: {success} succeeded, {failed} failed out of {total} files");

    Ok(())
}

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Max width for the value column before wrapping.
const VAL_WIDTH: usize = 46;
/// Indent for continuation lines (tag column width + " : " = 25 chars + 2 leading spaces).
const INDENT: &str = "                           ";

fn print_capabilities(path: &std::path::Path) {
    let name = path.display().to_string();
    println!();
    println!("{BOLD}File:{RESET} {name}");
    match format::capabilities_for(&name) {
        Ok(caps) if caps.editable => {
            println!("  {DIM}{}{RESET}", "─".repeat(70));
            for field in caps.fields {
                println!("  {field}");
            }
        }
        Ok(_) => println!("  {DIM}(editing not supported){RESET}"),
        Err(e) => println!("  {DIM}{e}{RESET}"),
    }
}

/// Print normalized metadata, one section per group. Fields in `changed`
/// are highlighted.
fn print_metadata(path: &std::path::Path, meta: &NormalizedMetadata, changed: &[&str]) {
    println!();
    println!("{BOLD}File:{RESET} {}", path.display());
    println!("{DIM}{}{RESET}", "═".repeat(72));

    // Top-level scalars first, then groups
    let scalars: Vec<(&str, &MetaValue)> = meta
        .iter()
        .filter_map(|(name, entry)| entry.as_value().map(|v| (name, v)))
        .collect();
    if !scalars.is_empty() {
        for (tag, val) in scalars {
            print_value(tag, val, changed);
        }
        println!();
    }

    for (name, entry) in meta.iter() {
        let Entry::Group(fields) = entry else { continue };
        println!("  {BOLD}{name}{RESET}");
        println!("  {DIM}{}{RESET}", "─".repeat(70));
        for (tag, val) in fields.iter() {
            print_value(tag, val, changed);
        }
        println!();
    }

    if meta.is_empty() {
        println!("  {DIM}(no metadata found){RESET}");
        println!();
    }
}

fn print_value(tag: &str, val: &MetaValue, changed: &[&str]) {
    for row in value_rows(tag, val, changed.contains(&tag)) {
        println!("{row}");
    }
}

/// Table lines for one value: the tag column on the first line, wrapped
/// continuation lines under the value column. A changed value is green and
/// ends with `*`; a null value is dimmed.
fn value_rows(tag: &str, val: &MetaValue, changed: bool) -> Vec<String> {
    let tag_col = format!("{tag:<22}");
    if val.is_null() {
        return vec![format!("  {DIM}{tag_col} : (none){RESET}")];
    }

    let lines = wrap_words(&val.to_string(), VAL_WIDTH);
    let last = lines.len() - 1;
    let (open, close) = if changed { (GREEN, RESET) } else { ("", "") };
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let lead = if i == 0 { format!("{tag_col} : ") } else { INDENT.to_string() };
            let mark = if changed && i == last { " *" } else { "" };
            format!("  {open}{lead}{line}{mark}{close}")
        })
        .collect()
}

/// Break `text` at spaces into lines of at most `width` bytes. A word wider
/// than `width` gets a line of its own.
fn wrap_words(text: &str, width: usize) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for word in text.split_whitespace() {
        match lines.last_mut() {
            Some(line) if line.len() + 1 + word.len() <= width => {
                line.push(' ');
                line.push_str(word);
            }
            _ => lines.push(word.to_string()),
        }
    }
    if lines.is_empty() {
        lines.push(text.to_string());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignments() {
        assert_eq!(
            parse_assignment("Title=Q3 report").unwrap(),
            ("Title".to_string(), "Q3 report".to_string())
        );
        assert_eq!(
            parse_assignment("comments=a=b").unwrap(),
            ("comments".to_string(), "a=b".to_string())
        );
        assert_eq!(parse_assignment("Author=").unwrap().1, "");
        assert!(parse_assignment("Title").is_err());
        assert!(parse_assignment("=x").is_err());
    }

    #[test]
    fn wrapping() {
        assert_eq!(wrap_words("short", 10), vec!["short"]);
        assert_eq!(wrap_words("one two three", 7), vec!["one two", "three"]);
        assert_eq!(wrap_words("a overlong b", 4), vec!["a", "overlong", "b"]);
        assert_eq!(wrap_words("", 10), vec![""]);
    }

    #[test]
    fn changed_rows_are_marked_once() {
        let long = MetaValue::from("word ".repeat(20).trim().to_string());
        let rows = value_rows("Title", &long, true);
        assert!(rows.len() > 1);
        assert!(rows.iter().all(|r| r.contains(GREEN)));
        assert!(rows[0].contains("Title"));
        assert_eq!(rows.iter().filter(|r| r.ends_with(&format!(" *{RESET}"))).count(), 1);
        assert!(rows.last().unwrap().ends_with(&format!(" *{RESET}")));

        let plain = value_rows("Title", &MetaValue::from("A"), false);
        assert_eq!(plain, vec![format!("  {:<22} : A", "Title")]);

        let null = value_rows("Title", &MetaValue::Null, false);
        assert_eq!(null, vec![format!("  {DIM}{:<22} : (none){RESET}", "Title")]);
    }

    #[test]
    fn cli_parses_repeated_set() {
        let cli = Cli::try_parse_from([
            "tagit",
            "--set",
            "Title=A",
            "--set",
            "Author=B",
            "--dry-run",
            "doc.pdf",
        ])
        .unwrap();
        assert_eq!(cli.set.len(), 2);
        assert!(cli.dry_run);
        assert_eq!(cli.paths, vec![PathBuf::from("doc.pdf")]);
    }
}
