//! Run log archives.
//!
//! GitHub serves the logs of a run as a zip archive with one `N_job.txt` file
//! per job at the top level and the same content split per step under
//! `job/M_step.txt`. The archive is untrusted input, so every entry is checked
//! against size and compression-ratio limits before it is read.

use std::io::{self, Cursor, Read};

use crate::error::MedicError;

/// Maximum size of a downloaded log archive (50 MB).
pub(crate) const MAX_ARCHIVE_SIZE: u64 = 50 * 1024 * 1024;
/// Maximum uncompressed size for any single entry (20 MB).
pub(crate) const MAX_UNCOMPRESSED_SIZE: u64 = 20 * 1024 * 1024;
/// Log text compresses well, but not this well.
pub(crate) const MAX_COMPRESSION_RATIO: f64 = 100.0;
/// Maximum combined text across all entries (64 MB).
pub(crate) const MAX_TOTAL_TEXT: u64 = 64 * 1024 * 1024;

/// Caps the bytes read from an entry whose header lies about its size.
pub(crate) struct LimitedReader<R> {
    inner: R,
    remaining: u64,
}

impl<R> LimitedReader<R> {
    pub(crate) fn new(inner: R, limit: u64) -> Self {
        Self {
            inner,
            remaining: limit,
        }
    }
}

impl<R: Read> Read for LimitedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::other(
                "log entry exceeds maximum allowed size during extraction",
            ));
        }

        let max_read = std::cmp::min(buf.len() as u64, self.remaining) as usize;
        let bytes_read = self.inner.read(&mut buf[..max_read])?;
        self.remaining = self.remaining.saturating_sub(bytes_read as u64);

        Ok(bytes_read)
    }
}

/// Reject entries that are too large or suspiciously compressed.
pub(crate) fn validate_zip_entry<R: Read + ?Sized>(
    file: &zip::read::ZipFile<'_, R>,
) -> Result<(), MedicError> {
    let compressed = file.compressed_size();
    let uncompressed = file.size();

    if uncompressed > MAX_UNCOMPRESSED_SIZE {
        return Err(MedicError::LogArchive(format!(
            "entry '{}' too large: {} bytes (max: {} bytes)",
            file.name(),
            uncompressed,
            MAX_UNCOMPRESSED_SIZE
        )));
    }

    if compressed > 0 {
        let ratio = uncompressed as f64 / compressed as f64;
        if ratio > MAX_COMPRESSION_RATIO {
            return Err(MedicError::LogArchive(format!(
                "suspicious compression ratio in '{}': {:.1}x (max: {:.1}x)",
                file.name(),
                ratio,
                MAX_COMPRESSION_RATIO
            )));
        }
    }

    Ok(())
}

/// Names that are safe to read: relative, no traversal, text files.
fn is_readable_entry(name: &str) -> bool {
    !name.ends_with('/')
        && !name.starts_with('/')
        && !name.starts_with('\\')
        && !name.split(['/', '\\']).any(|part| part == "..")
        && name.ends_with(".txt")
}

/// Concatenate the log archive into one text blob.
///
/// Top-level job files are used when present; per-step files only when the
/// archive has nothing else. Entries are emitted in name order, each preceded
/// by a `=== <name> ===` header. Invalid UTF-8 is replaced, not rejected.
pub fn concatenate_log_archive(bytes: &[u8]) -> Result<String, MedicError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| MedicError::LogArchive(format!("failed to open log archive: {e}")))?;

    let mut names: Vec<(usize, String)> = Vec::new();
    for i in 0..archive.len() {
        let file = archive
            .by_index(i)
            .map_err(|e| MedicError::LogArchive(format!("failed to read entry {i}: {e}")))?;
        let name = file.name().to_string();
        if is_readable_entry(&name) {
            names.push((i, name));
        }
    }

    let has_top_level = names.iter().any(|(_, n)| !n.contains('/'));
    if has_top_level {
        names.retain(|(_, n)| !n.contains('/'));
    }
    names.sort_by(|a, b| a.1.cmp(&b.1));

    let mut output = String::new();
    let mut total: u64 = 0;

    for (index, name) in names {
        let file = archive
            .by_index(index)
            .map_err(|e| MedicError::LogArchive(format!("failed to read '{name}': {e}")))?;
        validate_zip_entry(&file)?;

        let mut buf = Vec::new();
        LimitedReader::new(file, MAX_UNCOMPRESSED_SIZE)
            .read_to_end(&mut buf)
            .map_err(|e| MedicError::LogArchive(format!("failed to extract '{name}': {e}")))?;

        total += buf.len() as u64;
        if total > MAX_TOTAL_TEXT {
            return Err(MedicError::LogArchive(format!(
                "log archive expands beyond {MAX_TOTAL_TEXT} bytes"
            )));
        }

        if !output.is_empty() {
            output.push('\n');
        }
        output.push_str(&format!("=== {name} ===\n"));
        output.push_str(&String::from_utf8_lossy(&buf));
    }

    Ok(output)
}
