//! Zip container access.
//!
//! The central directory is read and checked up front; entry contents are
//! only inflated when a later stage asks for them by name.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::config::ImportConfig;
use crate::error::{ImportError, Result};

/// Entries at or below this size skip the compression ratio check.
const RATIO_CHECK_FLOOR: u64 = 1024 * 1024;

/// Largest buffer reserved before an entry's bytes are actually read.
const INITIAL_CAPACITY: u64 = 64 * 1024;

/// A named byte buffer read from the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub name: String,
    pub data: Vec<u8>,
}

impl RawEntry {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct EntryInfo {
    index: usize,
    size: u64,
}

/// An opened archive with a validated directory.
pub struct Container<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
    entries: HashMap<String, EntryInfo>,
    names: Vec<String>,
    declared_total: u64,
}

impl<'a> Container<'a> {
    /// Open `bytes` as a zip archive and check every directory entry.
    pub fn open(bytes: &'a [u8], config: &ImportConfig) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut entries = HashMap::new();
        let mut names = Vec::new();
        let mut declared_total: u64 = 0;

        for index in 0..archive.len() {
            let file = archive.by_index_raw(index)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let size = file.size();
            let compressed = file.compressed_size();

            if size > RATIO_CHECK_FLOOR {
                let ratio = size / compressed.max(1);
                if ratio > config.max_compression_ratio {
                    return Err(ImportError::MalformedContainer(format!(
                        "entry {} expands {}x (limit {}x)",
                        name, ratio, config.max_compression_ratio
                    )));
                }
            }
            if usize::try_from(size).is_err() {
                return Err(ImportError::MalformedContainer(format!(
                    "entry {} declares {} bytes",
                    name, size
                )));
            }
            declared_total = declared_total.checked_add(size).ok_or_else(|| {
                ImportError::MalformedContainer("declared entry sizes overflow".to_string())
            })?;
            if declared_total > config.max_archive_bytes {
                return Err(ImportError::limit(
                    "max_archive_bytes",
                    config.max_archive_bytes,
                    declared_total,
                ));
            }

            if entries.insert(name.clone(), EntryInfo { index, size }).is_some() {
                return Err(ImportError::MalformedContainer(format!(
                    "duplicate entry {}",
                    name
                )));
            }
            names.push(name);
        }

        tracing::debug!(
            entries = names.len(),
            declared_bytes = declared_total,
            "opened archive"
        );
        Ok(Self {
            archive,
            entries,
            names,
            declared_total,
        })
    }

    /// Entry names in directory order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Sum of the declared uncompressed sizes of all entries.
    pub fn declared_total(&self) -> u64 {
        self.declared_total
    }

    /// Inflate one entry; `Ok(None)` if no entry has that name.
    ///
    /// Reading stops at the declared size, so an entry whose stream holds
    /// more data than its header claims is rejected rather than buffered.
    pub fn read_entry(&mut self, name: &str) -> Result<Option<RawEntry>> {
        let Some(info) = self.entries.get(name).copied() else {
            return Ok(None);
        };
        let file = self.archive.by_index(info.index)?;
        let mut data = Vec::with_capacity(initial_capacity(info.size));
        file.take(info.size.saturating_add(1))
            .read_to_end(&mut data)
            .map_err(|e| ImportError::MalformedContainer(format!("entry {}: {}", name, e)))?;
        if data.len() as u64 != info.size {
            return Err(ImportError::MalformedContainer(format!(
                "entry {} inflated to {} bytes, header declares {}",
                name,
                data.len(),
                info.size
            )));
        }
        Ok(Some(RawEntry {
            name: name.to_string(),
            data,
        }))
    }
}

/// Up-front reservation for an entry that declares `size` bytes.
fn initial_capacity(size: u64) -> usize {
    size.min(INITIAL_CAPACITY) as usize
}
