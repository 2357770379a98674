use std::io::{Cursor, Read};

use bytes::Bytes;
use globset::{Glob, GlobMatcher};
use log::debug;
use zip::ZipArchive;

use crate::error::{RelayError, Result};

/// A file taken out of an artifacts archive.
#[derive(Debug, Clone)]
pub struct ExtractedFile {
    pub name: String,
    pub contents: Vec<u8>,
}

/// Extracts every file of a zip archive whose path matches `pattern`.
///
/// Runs on the blocking pool since decompression is CPU bound.
pub async fn extract_matching(archive: Bytes, pattern: &str) -> Result<Vec<ExtractedFile>> {
    let matcher = Glob::new(pattern)?.compile_matcher();

    tokio::task::spawn_blocking(move || extract_blocking(&archive, &matcher))
        .await
        .map_err(|e| RelayError::Io(std::io::Error::other(e)))?
}

fn extract_blocking(archive: &[u8], matcher: &GlobMatcher) -> Result<Vec<ExtractedFile>> {
    let mut archive = ZipArchive::new(Cursor::new(archive))?;
    let mut extracted = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() || !matcher.is_match(entry.name()) {
            continue;
        }

        let name = entry.name().to_string();
        let mut contents = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
        entry.read_to_end(&mut contents)?;
        debug!("Extracted {name} ({} bytes)", contents.len());
        extracted.push(ExtractedFile { name, contents });
    }

    Ok(extracted)
}
