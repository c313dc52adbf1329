//! Media manifest, media bytes and references from note fields.
//!
//! Media files are stored in the archive under numeric names. The `media`
//! entry maps those names back to the filenames notes refer to.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use rayon::prelude::*;
use regex::Regex;

use crate::collection::{decompress_zstd, ByteBudget, CollectionFormat};
use crate::config::ImportConfig;
use crate::container::{Container, RawEntry};
use crate::error::{ImportError, Result};
use crate::protobuf::{Fields, WireError};
use crate::text::decode_entities;
use crate::types::{
    AnkiNote, ImportWarning, MediaFile, MediaKind, MediaReference, WarningKind,
};

pub const MANIFEST_ENTRY: &str = "media";

static TAG_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)<(img|audio|video|source|object)\b[^>]*?\s(?:src|data)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#,
    )
    .expect("media tag pattern")
});
static SOUND_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[sound:([^\]]+)\]").expect("sound pattern"));

/// One manifest mapping: archive entry name to original filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub archive_name: String,
    pub name: String,
}

/// Read and decode the manifest. A missing `media` entry is an empty manifest.
pub fn read_manifest(
    container: &mut Container<'_>,
    format: CollectionFormat,
    config: &ImportConfig,
    budget: &mut ByteBudget,
) -> Result<Vec<ManifestEntry>> {
    let Some(entry) = container.read_entry(MANIFEST_ENTRY)? else {
        tracing::debug!("archive has no media manifest");
        return Ok(Vec::new());
    };
    let manifest = if format.is_zstd() {
        let bytes = decompress_zstd(
            &entry.data,
            budget,
            MANIFEST_ENTRY,
            ImportError::MalformedContainer,
        )?;
        decode_proto_manifest(&bytes)?
    } else {
        decode_json_manifest(&entry.data)?
    };
    if manifest.len() > config.max_media_count {
        return Err(ImportError::limit(
            "max_media_count",
            config.max_media_count as u64,
            manifest.len() as u64,
        ));
    }
    Ok(manifest)
}

/// `{"0": "cat.jpg", ...}`, ordered by numeric key.
pub fn decode_json_manifest(bytes: &[u8]) -> Result<Vec<ManifestEntry>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ImportError::MalformedContainer(format!("media manifest: {}", e)))?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let map: HashMap<String, String> = serde_json::from_str(text)
        .map_err(|e| ImportError::MalformedContainer(format!("media manifest: {}", e)))?;
    let mut entries: Vec<ManifestEntry> = map
        .into_iter()
        .map(|(archive_name, name)| ManifestEntry { archive_name, name })
        .collect();
    entries.sort_by(|a, b| {
        let key = |e: &ManifestEntry| e.archive_name.parse::<u64>().ok();
        match (key(a), key(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.archive_name.cmp(&b.archive_name),
        }
    });
    Ok(entries)
}

/// `MediaEntries { repeated MediaEntry entries = 1 }`, where each entry has
/// `name = 1`, `size = 2`, `sha1 = 3` and `legacy_zip_filename = 255`.
pub fn decode_proto_manifest(bytes: &[u8]) -> Result<Vec<ManifestEntry>> {
    let malformed = |e: WireError| ImportError::MalformedContainer(format!("media manifest: {}", e));
    let mut entries = Vec::new();
    for field in Fields::new(bytes) {
        let (number, value) = field.map_err(malformed)?;
        if number != 1 {
            continue;
        }
        let Some(body) = value.as_bytes() else {
            return Err(ImportError::MalformedContainer(
                "media manifest: entry is not a message".to_string(),
            ));
        };
        let mut name = None;
        let mut legacy_name = None;
        for inner in Fields::new(body) {
            match inner.map_err(malformed)? {
                (1, v) => name = v.as_bytes().map(|b| String::from_utf8_lossy(b).into_owned()),
                (255, v) => legacy_name = v.as_u64(),
                _ => {}
            }
        }
        let index = entries.len();
        entries.push(ManifestEntry {
            archive_name: legacy_name.unwrap_or(index as u64).to_string(),
            name: name.unwrap_or_default(),
        });
    }
    Ok(entries)
}

/// Read the bytes of every manifest entry present in the archive.
///
/// Entries missing from the archive are reported as `UnresolvedMedia`.
/// Zstd media are decoded in parallel; results keep manifest order and the
/// first failing entry in that order is the one reported.
pub fn load_media(
    container: &mut Container<'_>,
    format: CollectionFormat,
    manifest: &[ManifestEntry],
    budget: &mut ByteBudget,
    warnings: &mut Vec<ImportWarning>,
) -> Result<Vec<MediaFile>> {
    let mut present: Vec<(&ManifestEntry, RawEntry)> = Vec::with_capacity(manifest.len());
    let mut names = HashSet::new();
    for entry in manifest {
        if entry.name.is_empty() || !names.insert(entry.name.as_str()) {
            tracing::debug!(archive_name = %entry.archive_name, "skipping unnamed or repeated media entry");
            continue;
        }
        match container.read_entry(&entry.archive_name)? {
            Some(raw) => present.push((entry, raw)),
            None => ImportWarning::new(
                WarningKind::UnresolvedMedia,
                format!(
                    "manifest entry {} ({}) is missing from the archive",
                    entry.archive_name, entry.name
                ),
            )
            .record(warnings),
        }
    }

    let files = if format.is_zstd() {
        decode_zstd_media(&present, budget)?
    } else {
        present
            .into_iter()
            .map(|(entry, raw)| media_file(entry, raw.data))
            .collect()
    };

    tracing::debug!(manifest = manifest.len(), loaded = files.len(), "loaded media");
    Ok(files)
}

/// Decode zstd media a chunk at a time, one chunk per rayon pass.
///
/// Tasks in a chunk split the remaining budget evenly, so a chunk never holds
/// more than the budget. An entry that outgrew its share is decoded again
/// against the whole remaining budget, which makes the outcome match a
/// sequential pass.
fn decode_zstd_media(
    present: &[(&ManifestEntry, RawEntry)],
    budget: &mut ByteBudget,
) -> Result<Vec<MediaFile>> {
    let width = rayon::current_num_threads().max(1);
    let mut files = Vec::with_capacity(present.len());
    for chunk in present.chunks(width) {
        let share = budget.remaining() / chunk.len() as u64;
        let decoded: Vec<Result<Vec<u8>>> = chunk
            .par_iter()
            .map(|(_, raw)| {
                let mut own = ByteBudget::new(share, 0);
                decompress_zstd(&raw.data, &mut own, &raw.name, ImportError::MalformedContainer)
            })
            .collect();

        for ((entry, raw), result) in chunk.iter().zip(decoded) {
            let data = match result {
                Ok(data) if data.len() as u64 <= budget.remaining() => {
                    budget.charge(data.len() as u64)?;
                    data
                }
                Err(err) if !err.is_resource_limit() => return Err(err),
                over_share => {
                    drop(over_share);
                    decompress_zstd(&raw.data, budget, &raw.name, ImportError::MalformedContainer)?
                }
            };
            files.push(media_file(entry, data));
        }
    }
    Ok(files)
}

fn media_file(entry: &ManifestEntry, data: Vec<u8>) -> MediaFile {
    MediaFile {
        name: entry.name.clone(),
        archive_name: entry.archive_name.clone(),
        data,
    }
}

/// Media filenames referenced from one field, in order of appearance.
///
/// Tag references come before `[sound:]` references. Remote and inline
/// URLs are not media files and are skipped.
pub fn scan_references(html: &str) -> Vec<(MediaKind, String)> {
    let tags = TAG_REFERENCE.captures_iter(html).filter_map(|caps| {
        let kind = match caps[1].to_ascii_lowercase().as_str() {
            "img" => MediaKind::Image,
            "audio" => MediaKind::Sound,
            _ => MediaKind::Other,
        };
        let raw = caps.get(2).or_else(|| caps.get(3)).or_else(|| caps.get(4))?;
        Some((kind, raw.as_str()))
    });
    let sounds = SOUND_REFERENCE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).map(|m| (MediaKind::Sound, m.as_str())));

    tags.chain(sounds)
        .filter_map(|(kind, raw)| {
            let name = decode_entities(raw.trim()).into_owned();
            (!name.is_empty() && is_local(&name)).then_some((kind, name))
        })
        .collect()
}

fn is_local(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    !(lower.contains("://") || lower.starts_with("data:") || lower.starts_with("//"))
}

/// Loaded media keyed by original filename.
#[derive(Debug, Default)]
pub struct MediaIndex<'a> {
    by_name: HashMap<&'a str, &'a str>,
}

impl<'a> MediaIndex<'a> {
    pub fn new(files: &'a [MediaFile]) -> Self {
        Self {
            by_name: files
                .iter()
                .map(|f| (f.name.as_str(), f.archive_name.as_str()))
                .collect(),
        }
    }

    pub fn resolve(&self, name: &str) -> Option<&'a str> {
        self.by_name.get(name).copied()
    }

    /// Resolve every reference in `note`, warning once per unresolved name.
    pub fn note_references(
        &self,
        note: &AnkiNote,
        warnings: &mut Vec<ImportWarning>,
    ) -> Vec<MediaReference> {
        let mut seen = HashSet::new();
        let mut refs = Vec::new();
        for field in &note.fields {
            for (kind, name) in scan_references(field) {
                if !seen.insert((kind, name.clone())) {
                    continue;
                }
                let archive_name = self.resolve(&name).map(str::to_string);
                if archive_name.is_none() {
                    ImportWarning::new(
                        WarningKind::UnresolvedMedia,
                        format!("note {} references missing media {:?}", note.id, name),
                    )
                    .record(warnings);
                }
                refs.push(MediaReference {
                    kind,
                    name,
                    archive_name,
                });
            }
        }
        refs
    }
}
