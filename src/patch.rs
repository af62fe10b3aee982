//! Package patching.
//!
//! Writes a copy of a DOCX archive in which a handful of parts are
//! replaced. Untouched entries are copied as raw compressed bytes, so
//! their data, timestamps and order survive exactly.

use crate::docx::{CONTENT_TYPES, DOCUMENT, DOCUMENT_RELS, FONT_TABLE, NUMBERING, SETTINGS, STYLES, THEME};
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Parts a patch may replace or add.
pub const ALLOWED_TARGETS: [&str; 7] = [
    DOCUMENT,
    STYLES,
    THEME,
    SETTINGS,
    FONT_TABLE,
    CONTENT_TYPES,
    DOCUMENT_RELS,
];

const FORBIDDEN_PREFIXES: [&str; 2] = ["word/header", "word/footer"];
const FORBIDDEN_PARTS: [&str; 1] = [NUMBERING];

/// Summary of a completed patch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatchReport {
    /// Entries copied byte-for-byte
    pub copied: usize,
    /// Existing entries whose content was replaced
    pub replaced: Vec<String>,
    /// Entries appended because the source lacked them
    pub added: Vec<String>,
}

/// Reject any replacement outside the allow-list.
///
/// Forbidden parts (headers, footers, numbering) are reported as such
/// even though they are also absent from the allow-list.
pub fn check_targets<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<()> {
    for name in names {
        if FORBIDDEN_PARTS.contains(&name) || FORBIDDEN_PREFIXES.iter().any(|p| name.starts_with(p)) {
            return Err(Error::ForbiddenPatchTarget(name.to_string()));
        }
        if !ALLOWED_TARGETS.contains(&name) {
            return Err(Error::IllegalPatchTarget {
                path: name.to_string(),
                allowed: ALLOWED_TARGETS.iter().map(|s| s.to_string()).collect(),
            });
        }
    }
    Ok(())
}

/// Copy the archive read from `source` into `writer`, substituting the
/// content of every entry named in `replacements`.
pub fn patch<R: Read + Seek, W: Write + Seek>(
    source: R,
    writer: W,
    replacements: &BTreeMap<String, Vec<u8>>,
) -> Result<PatchReport> {
    check_targets(replacements.keys().map(String::as_str))?;

    let mut archive = ZipArchive::new(source)?;
    let comment = archive.comment().to_vec();
    let mut zip = ZipWriter::new(writer);
    let mut report = PatchReport::default();
    let mut seen = HashSet::new();

    for i in 0..archive.len() {
        let name = archive
            .name_for_index(i)
            .ok_or_else(|| Error::ZipArchive(format!("missing entry name at index {}", i)))?
            .to_string();

        match replacements.get(&name) {
            Some(data) => {
                let options = {
                    let file = archive.by_index(i)?;
                    let method = match file.compression() {
                        CompressionMethod::Stored => CompressionMethod::Stored,
                        _ => CompressionMethod::Deflated,
                    };
                    let mut options = SimpleFileOptions::default().compression_method(method);
                    if let Some(modified) = file.last_modified() {
                        options = options.last_modified_time(modified);
                    }
                    if let Some(mode) = file.unix_mode() {
                        options = options.unix_permissions(mode);
                    }
                    options
                };
                zip.start_file(name.as_str(), options)?;
                zip.write_all(data)?;
                log::debug!("Replaced {} ({} bytes)", name, data.len());
                seen.insert(name.clone());
                report.replaced.push(name);
            }
            None => {
                let file = archive.by_index_raw(i)?;
                zip.raw_copy_file(file)?;
                report.copied += 1;
            }
        }
    }

    for (name, data) in replacements {
        if seen.contains(name) {
            continue;
        }
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file(name.as_str(), options)?;
        zip.write_all(data)?;
        log::debug!("Added {} ({} bytes)", name, data.len());
        report.added.push(name.clone());
    }

    if !comment.is_empty() {
        zip.set_comment(String::from_utf8_lossy(&comment).into_owned());
    }
    let mut inner = zip.finish()?;
    inner.flush()?;

    Ok(report)
}

fn temporary_path(output: &Path) -> PathBuf {
    let mut name = OsString::from(output.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Remove a partially written temporary file; a missing file is fine.
fn discard_temporary(tmp: &Path) {
    match fs::remove_file(tmp) {
        Ok(()) => log::debug!("Removed {}", tmp.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Could not remove temporary file {}: {}", tmp.display(), e),
    }
}

/// Patch `input` into `output` through a temporary sibling file.
///
/// `output` only appears once the whole archive has been written; on any
/// failure the temporary file is removed and `output` is left untouched.
pub fn patch_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    replacements: &BTreeMap<String, Vec<u8>>,
) -> Result<PatchReport> {
    let input = input.as_ref();
    let output = output.as_ref();
    check_targets(replacements.keys().map(String::as_str))?;

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = temporary_path(output);
    let result = (|| -> Result<PatchReport> {
        let source = BufReader::new(File::open(input)?);
        let mut writer = BufWriter::new(File::create(&tmp)?);
        let report = patch(source, &mut writer, replacements)?;
        let file = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
        file.sync_all()?;
        Ok(report)
    })();

    match result {
        Ok(report) => {
            fs::rename(&tmp, output)?;
            log::info!(
                "Wrote {} ({} replaced, {} added, {} copied)",
                output.display(),
                report.replaced.len(),
                report.added.len(),
                report.copied
            );
            Ok(report)
        }
        Err(err) => {
            discard_temporary(&tmp);
            Err(err)
        }
    }
}
