//! Note rows: field splitting, tags and checksums.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};

use crate::config::ImportConfig;
use crate::error::{ImportError, Result};
use crate::sqlite::{Database, Row};
use crate::text::field_checksum;
use crate::types::{AnkiModel, AnkiNote, ImportWarning, WarningKind, FIELD_SEPARATOR};

/// Split a stored tag string into tags, keeping their order.
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Split a packed field string into exactly `expected` values.
///
/// Returns the values and the count actually stored.
pub fn split_fields(packed: &str, expected: usize) -> (Vec<String>, usize) {
    let mut values: Vec<String> = packed.split(FIELD_SEPARATOR).map(str::to_string).collect();
    let found = values.len();
    values.resize(expected, String::new());
    (values, found)
}

/// Decode every note whose model exists, keyed by note id.
pub fn decode_notes(
    db: &Database,
    models: &BTreeMap<i64, AnkiModel>,
    config: &ImportConfig,
    warnings: &mut Vec<ImportWarning>,
) -> Result<BTreeMap<i64, AnkiNote>> {
    let mut notes = BTreeMap::new();
    let mut seen = 0usize;

    db.scan("notes", |row: Row<'_>| -> Result<()> {
        seen += 1;
        if seen > config.max_note_count {
            return Err(ImportError::limit(
                "max_note_count",
                config.max_note_count as u64,
                seen as u64,
            ));
        }

        let id = row.integer("id")?;
        let model_id = row.integer("mid")?;
        let Some(model) = models.get(&model_id) else {
            ImportWarning::new(
                WarningKind::OrphanNote,
                format!("note {} references missing model {}", id, model_id),
            )
            .record(warnings);
            return Ok(());
        };

        let expected = model.field_count();
        let (fields, found) = split_fields(&row.text("flds")?, expected);
        if found != expected {
            if config.strict_field_counts {
                return Err(ImportError::FieldCountMismatch {
                    note_id: id,
                    expected,
                    found,
                });
            }
            let action = if found < expected { "padded" } else { "truncated" };
            ImportWarning::new(
                WarningKind::FieldCountMismatch,
                format!(
                    "note {} has {} fields, model {} declares {}; {}",
                    id, found, model.name, expected, action
                ),
            )
            .record(warnings);
        }

        let raw_tags = row.text("tags")?.into_owned();
        let note = AnkiNote {
            id,
            guid: row.text("guid")?.into_owned(),
            model_id,
            tags: parse_tags(&raw_tags),
            raw_tags,
            checksum: field_checksum(fields.first().map(String::as_str).unwrap_or("")),
            fields,
            modified: modified_at(&row)?,
        };
        if notes.insert(id, note).is_some() {
            return Err(ImportError::CorruptDatabase(format!("duplicate note id {}", id)));
        }
        Ok(())
    })?;

    tracing::debug!(rows = seen, notes = notes.len(), "decoded notes");
    Ok(notes)
}

fn modified_at(row: &Row<'_>) -> Result<Option<DateTime<Utc>>> {
    if !row.has_column("mod") {
        return Ok(None);
    }
    Ok(Utc.timestamp_opt(row.integer("mod")?, 0).single())
}
