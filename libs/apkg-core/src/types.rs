//! Core types produced by the importer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collection::CollectionFormat;

/// Separator between deck path segments in a deck name.
pub const DECK_PATH_SEPARATOR: &str = "::";

/// Separator between packed field values in a note row.
pub const FIELD_SEPARATOR: char = '\x1f';

/// Note type kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Standard,
    Cloze,
}

impl Default for ModelKind {
    fn default() -> Self {
        Self::Standard
    }
}

/// Card template of a note type, identified by ordinal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnkiTemplate {
    pub ordinal: u32,
    pub name: String,
}

/// Note type ("model").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnkiModel {
    pub id: i64,
    pub name: String,
    pub kind: ModelKind,
    /// Field names in the order packed field strings are split.
    pub fields: Vec<String>,
    pub templates: Vec<AnkiTemplate>,
    pub sort_field: usize,
}

impl AnkiModel {
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Template used to render a card with the given ordinal.
    ///
    /// Cloze models generate every card from their single template.
    pub fn template_for(&self, ordinal: u32) -> Option<&AnkiTemplate> {
        match self.kind {
            ModelKind::Cloze => self.templates.first(),
            ModelKind::Standard => self.templates.iter().find(|t| t.ordinal == ordinal),
        }
    }
}

/// Deck option group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckConfig {
    pub id: i64,
    pub name: String,
}

/// Deck as declared in the collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnkiDeck {
    pub id: i64,
    /// Full name, segments joined by `::`.
    pub name: String,
    pub path: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_id: Option<i64>,
    pub dynamic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl AnkiDeck {
    /// Full name of the parent deck, if this deck is nested.
    pub fn parent_name(&self) -> Option<String> {
        if self.path.len() < 2 {
            return None;
        }
        Some(self.path[..self.path.len() - 1].join(DECK_PATH_SEPARATOR))
    }
}

/// Note after field splitting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnkiNote {
    pub id: i64,
    pub guid: String,
    pub model_id: i64,
    /// Tag string exactly as stored.
    pub raw_tags: String,
    pub tags: Vec<String>,
    pub fields: Vec<String>,
    /// Anki duplicate-detection checksum of the first field.
    pub checksum: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

/// Scheduling columns carried through without interpretation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSchedule {
    pub card_type: i64,
    pub queue: i64,
    pub due: i64,
    pub interval: i64,
    pub ease_factor: i64,
    pub reps: i64,
    pub lapses: i64,
}

/// Card row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnkiCard {
    pub id: i64,
    pub note_id: i64,
    pub deck_id: i64,
    /// Home deck when the card currently sits in a filtered deck, else 0.
    pub original_deck_id: i64,
    pub ordinal: u32,
    pub schedule: CardSchedule,
}

/// Named field value inlined on a parsed card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteField {
    pub name: String,
    pub value: String,
}

/// Markup a media reference was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Sound,
    Other,
}

/// Media file referenced from a note field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaReference {
    pub kind: MediaKind,
    /// Original filename as written in the field.
    pub name: String,
    /// Numeric archive entry holding the bytes; `None` when unresolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_name: Option<String>,
}

impl MediaReference {
    pub fn is_resolved(&self) -> bool {
        self.archive_name.is_some()
    }
}

/// Card with its note inlined, as handed to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCard {
    pub id: i64,
    pub note_id: i64,
    pub guid: String,
    pub model_id: i64,
    pub model_name: String,
    pub ordinal: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    pub fields: Vec<NoteField>,
    pub tags: Vec<String>,
    pub media: Vec<MediaReference>,
    pub checksum: u32,
    pub schedule: CardSchedule,
}

impl ParsedCard {
    /// First field value.
    pub fn front(&self) -> &str {
        self.fields.first().map(|f| f.value.as_str()).unwrap_or("")
    }

    /// Second field value.
    pub fn back(&self) -> &str {
        self.fields.get(1).map(|f| f.value.as_str()).unwrap_or("")
    }

    /// Value of the field with the given name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

/// Deck with its surviving cards, in collection order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedDeck {
    pub id: i64,
    pub name: String,
    pub path: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub cards: Vec<ParsedCard>,
}

/// Media bytes keyed by original filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFile {
    pub name: String,
    pub archive_name: String,
    #[serde(skip)]
    pub data: Vec<u8>,
}

/// Non-fatal condition kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarningKind {
    OrphanNote,
    OrphanCard,
    FieldCountMismatch,
    UnresolvedMedia,
    EmptyDeck,
    InvalidDeck,
}

/// Non-fatal condition recorded during an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportWarning {
    pub kind: WarningKind,
    pub context: String,
}

impl ImportWarning {
    pub fn new(kind: WarningKind, context: impl Into<String>) -> Self {
        Self {
            kind,
            context: context.into(),
        }
    }

    /// Log this warning and append it to `warnings`.
    pub(crate) fn record(self, warnings: &mut Vec<ImportWarning>) {
        tracing::warn!(kind = ?self.kind, context = %self.context, "import warning");
        warnings.push(self);
    }
}

/// Root value returned by [`import`](crate::import).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApkgParseResult {
    pub format: CollectionFormat,
    pub decks: Vec<ParsedDeck>,
    pub media: Vec<MediaFile>,
    pub warnings: Vec<ImportWarning>,
}

impl ApkgParseResult {
    pub fn card_count(&self) -> usize {
        self.decks.iter().map(|d| d.cards.len()).sum()
    }

    pub fn warnings_of(&self, kind: WarningKind) -> impl Iterator<Item = &ImportWarning> {
        self.warnings.iter().filter(move |w| w.kind == kind)
    }

    pub fn deck(&self, name: &str) -> Option<&ParsedDeck> {
        self.decks.iter().find(|d| d.name == name)
    }

    pub fn media_file(&self, name: &str) -> Option<&MediaFile> {
        self.media.iter().find(|m| m.name == name)
    }
}
