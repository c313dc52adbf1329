//! The import pipeline.

use std::collections::BTreeMap;

use crate::cards::assemble_decks;
use crate::collection::{open_collection, read_collection_row, ByteBudget};
use crate::config::ImportConfig;
use crate::container::Container;
use crate::error::Result;
use crate::media::{load_media, read_manifest, MediaIndex};
use crate::notes::decode_notes;
use crate::schema::decode_schema;
use crate::types::ApkgParseResult;

/// Import an `.apkg` archive held in memory.
///
/// Warnings are ordered by stage: schema, notes, media, cards. The result
/// depends only on `bytes` and `config`.
pub fn import(bytes: &[u8], config: &ImportConfig) -> Result<ApkgParseResult> {
    let mut container = Container::open(bytes, config)?;
    let mut budget = ByteBudget::new(config.max_archive_bytes, container.declared_total());

    let (format, db) = open_collection(&mut container, config, &mut budget)?;
    let row = read_collection_row(&db)?;

    let mut warnings = Vec::new();
    let schema = decode_schema(&db, &row, &mut warnings)?;
    let notes = decode_notes(&db, &schema.models, config, &mut warnings)?;

    let manifest = read_manifest(&mut container, format, config, &mut budget)?;
    let media = load_media(&mut container, format, &manifest, &mut budget, &mut warnings)?;
    let index = MediaIndex::new(&media);
    let note_media: BTreeMap<_, _> = notes
        .values()
        .map(|note| (note.id, index.note_references(note, &mut warnings)))
        .collect();

    let decks = assemble_decks(&db, &schema, &notes, &note_media, &mut warnings)?;

    tracing::debug!(
        ?format,
        decks = decks.len(),
        notes = notes.len(),
        media = media.len(),
        warnings = warnings.len(),
        "import finished"
    );
    Ok(ApkgParseResult {
        format,
        decks,
        media,
        warnings,
    })
}
