//! Card assembly: links card rows to their notes and decks.

use std::collections::BTreeMap;

use crate::error::{ImportError, Result};
use crate::schema::Schema;
use crate::sqlite::{Database, Row};
use crate::types::{
    AnkiCard, AnkiNote, CardSchedule, ImportWarning, MediaReference, NoteField, ParsedCard,
    ParsedDeck, WarningKind,
};

impl AnkiCard {
    fn from_row(row: &Row<'_>) -> Result<Self> {
        let id = row.integer("id")?;
        let ordinal = u32::try_from(row.integer("ord")?).map_err(|_| {
            ImportError::CorruptDatabase(format!("card {} has an invalid template ordinal", id))
        })?;
        let optional = |column: &str| -> Result<i64> {
            if row.has_column(column) {
                Ok(row.integer(column)?)
            } else {
                Ok(0)
            }
        };
        Ok(Self {
            id,
            note_id: row.integer("nid")?,
            deck_id: row.integer("did")?,
            original_deck_id: optional("odid")?,
            ordinal,
            schedule: CardSchedule {
                card_type: optional("type")?,
                queue: optional("queue")?,
                due: optional("due")?,
                interval: optional("ivl")?,
                ease_factor: optional("factor")?,
                reps: optional("reps")?,
                lapses: optional("lapses")?,
            },
        })
    }

    /// Deck the card belongs to: its home deck if it is borrowed by a
    /// filtered deck and that home still exists.
    pub fn home_deck(&self, schema: &Schema) -> i64 {
        if self.original_deck_id != 0 && schema.decks.contains_key(&self.original_deck_id) {
            self.original_deck_id
        } else {
            self.deck_id
        }
    }
}

/// Build the deck list from the card table.
///
/// Decks come out sorted by full name, then id. Only decks with at least one
/// card are returned; each remaining deck produces an `EmptyDeck` warning.
pub fn assemble_decks(
    db: &Database,
    schema: &Schema,
    notes: &BTreeMap<i64, AnkiNote>,
    media: &BTreeMap<i64, Vec<MediaReference>>,
    warnings: &mut Vec<ImportWarning>,
) -> Result<Vec<ParsedDeck>> {
    let mut by_deck: BTreeMap<i64, Vec<ParsedCard>> = BTreeMap::new();
    let mut rows = 0usize;

    db.scan("cards", |row: Row<'_>| -> Result<()> {
        rows += 1;
        let card = AnkiCard::from_row(&row)?;
        let Some(note) = notes.get(&card.note_id) else {
            ImportWarning::new(
                WarningKind::OrphanCard,
                format!("card {} references missing note {}", card.id, card.note_id),
            )
            .record(warnings);
            return Ok(());
        };
        let deck_id = card.home_deck(schema);
        if !schema.decks.contains_key(&deck_id) {
            ImportWarning::new(
                WarningKind::OrphanCard,
                format!("card {} references missing deck {}", card.id, deck_id),
            )
            .record(warnings);
            return Ok(());
        }
        let Some(parsed) = parse_card(&card, note, schema, media) else {
            ImportWarning::new(
                WarningKind::OrphanCard,
                format!("card {} note {} has no model", card.id, note.id),
            )
            .record(warnings);
            return Ok(());
        };
        by_deck.entry(deck_id).or_default().push(parsed);
        Ok(())
    })?;

    let mut ordered: Vec<_> = schema.decks.values().collect();
    ordered.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

    let mut decks = Vec::new();
    for deck in ordered {
        let Some(cards) = by_deck.remove(&deck.id) else {
            ImportWarning::new(
                WarningKind::EmptyDeck,
                format!("deck {} ({}) has no cards", deck.id, deck.name),
            )
            .record(warnings);
            continue;
        };
        decks.push(ParsedDeck {
            id: deck.id,
            name: deck.name.clone(),
            path: deck.path.clone(),
            parent: deck.parent_name(),
            config_name: schema.deck_config_name(deck).map(str::to_string),
            description: deck.description.clone(),
            cards,
        });
    }

    tracing::debug!(rows, decks = decks.len(), "assembled cards");
    Ok(decks)
}

fn parse_card(
    card: &AnkiCard,
    note: &AnkiNote,
    schema: &Schema,
    media: &BTreeMap<i64, Vec<MediaReference>>,
) -> Option<ParsedCard> {
    let model = schema.models.get(&note.model_id)?;
    let fields = model
        .fields
        .iter()
        .zip(&note.fields)
        .map(|(name, value)| NoteField {
            name: name.clone(),
            value: value.clone(),
        })
        .collect();
    Some(ParsedCard {
        id: card.id,
        note_id: note.id,
        guid: note.guid.clone(),
        model_id: model.id,
        model_name: model.name.clone(),
        ordinal: card.ordinal,
        template_name: model.template_for(card.ordinal).map(|t| t.name.clone()),
        fields,
        tags: note.tags.clone(),
        media: media.get(&note.id).cloned().unwrap_or_default(),
        checksum: note.checksum,
        schedule: card.schedule,
    })
}
