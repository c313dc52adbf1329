//! Note type, deck and deck option decoding.
//!
//! Schema 11 collections keep these as JSON blobs on the `col` row.
//! Schema 18 collections move them into the `notetypes`, `fields`,
//! `templates`, `decks` and `deck_config` tables, with protobuf blobs for
//! the few settings this importer needs.

use std::collections::{btree_map::Entry, BTreeMap};

use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::collection::CollectionRow;
use crate::error::{ImportError, Result};
use crate::protobuf::Fields;
use crate::sqlite::{Database, Row};
use crate::types::{
    AnkiDeck, AnkiModel, AnkiTemplate, DeckConfig, ImportWarning, ModelKind, WarningKind,
    DECK_PATH_SEPARATOR,
};

/// Separator written between deck name segments in schema 18 tables.
const NATIVE_DECK_SEPARATOR: char = '\x1f';

/// Decoded note types, decks and deck option groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    pub models: BTreeMap<i64, AnkiModel>,
    pub decks: BTreeMap<i64, AnkiDeck>,
    pub deck_configs: BTreeMap<i64, DeckConfig>,
}

impl Schema {
    pub fn deck_config_name(&self, deck: &AnkiDeck) -> Option<&str> {
        deck.config_id
            .and_then(|id| self.deck_configs.get(&id))
            .map(|c| c.name.as_str())
    }
}

/// Decode the schema from whichever representation the collection uses.
///
/// Deck entries with an invalid path are dropped with an `InvalidDeck`
/// warning; every other problem is fatal.
pub fn decode_schema(
    db: &Database,
    row: &CollectionRow,
    warnings: &mut Vec<ImportWarning>,
) -> Result<Schema> {
    let blank = |s: &str| matches!(s.trim(), "" | "{}");
    let schema = if db.has_table("notetypes") && blank(&row.models) {
        tracing::debug!(version = row.schema_version, "decoding schema from tables");
        decode_table_schema(db, warnings)?
    } else {
        tracing::debug!(version = row.schema_version, "decoding schema from JSON");
        decode_json_schema(row, warnings)?
    };
    tracing::debug!(
        models = schema.models.len(),
        decks = schema.decks.len(),
        "decoded schema"
    );
    Ok(schema)
}

/// Split a full deck name into its path, rejecting empty segments.
pub fn parse_deck_path(name: &str) -> Option<Vec<String>> {
    let segments: Vec<String> = name
        .split(DECK_PATH_SEPARATOR)
        .map(str::to_string)
        .collect();
    if segments.iter().any(|s| s.trim().is_empty()) {
        None
    } else {
        Some(segments)
    }
}

// --- JSON (schema 11) ---

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonId {
    Int(i64),
    Float(f64),
    Text(String),
}

impl JsonId {
    fn resolve(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Float(f) => Some(*f as i64),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonFlag {
    Bool(bool),
    Int(i64),
}

impl Default for JsonFlag {
    fn default() -> Self {
        Self::Int(0)
    }
}

impl JsonFlag {
    fn is_set(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonField {
    name: String,
    #[serde(default)]
    ord: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct JsonTemplate {
    #[serde(default)]
    name: String,
    #[serde(default)]
    ord: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct JsonModel {
    #[serde(default)]
    id: Option<JsonId>,
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    kind: i64,
    #[serde(default)]
    flds: Option<Vec<JsonField>>,
    #[serde(default)]
    tmpls: Vec<JsonTemplate>,
    #[serde(default)]
    sortf: i64,
}

#[derive(Debug, Deserialize)]
struct JsonDeck {
    #[serde(default)]
    id: Option<JsonId>,
    name: String,
    #[serde(default)]
    conf: Option<JsonId>,
    #[serde(rename = "dyn", default)]
    dynamic: JsonFlag,
    #[serde(default)]
    desc: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JsonDeckConfig {
    #[serde(default)]
    id: Option<JsonId>,
    #[serde(default)]
    name: String,
}

fn decode_json_schema(row: &CollectionRow, warnings: &mut Vec<ImportWarning>) -> Result<Schema> {
    let mut schema = Schema::default();

    for (key, value) in json_object(&row.models, "models")? {
        let model: JsonModel = serde_json::from_value(value).map_err(|e| {
            ImportError::SchemaParseError(format!("model {}: {}", key, e))
        })?;
        let id = entry_id(model.id.as_ref(), &key)
            .ok_or_else(|| ImportError::SchemaParseError(format!("model {} has no usable id", key)))?;
        let model = build_json_model(id, model)?;
        insert_unique(&mut schema.models, id, model, "model")?;
    }

    for (key, value) in json_object(&row.decks, "decks")? {
        let deck: JsonDeck = serde_json::from_value(value).map_err(|e| {
            ImportError::SchemaParseError(format!("deck {}: {}", key, e))
        })?;
        let id = entry_id(deck.id.as_ref(), &key)
            .ok_or_else(|| ImportError::SchemaParseError(format!("deck {} has no usable id", key)))?;
        let dynamic = deck.dynamic.is_set();
        let config_id = if dynamic {
            None
        } else {
            deck.conf.as_ref().and_then(JsonId::resolve)
        };
        if let Some(deck) = build_deck(id, &deck.name, config_id, dynamic, deck.desc, warnings) {
            insert_unique(&mut schema.decks, id, deck, "deck")?;
        }
    }

    schema.deck_configs = decode_json_deck_configs(&row.deck_configs);
    Ok(schema)
}

fn json_object(text: &str, what: &str) -> Result<Vec<(String, JsonValue)>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let value: JsonValue = serde_json::from_str(text)
        .map_err(|e| ImportError::SchemaParseError(format!("{} JSON: {}", what, e)))?;
    match value {
        JsonValue::Object(map) => Ok(map.into_iter().collect()),
        other => Err(ImportError::SchemaParseError(format!(
            "{} JSON is not an object: {}",
            what,
            json_type(&other)
        ))),
    }
}

fn json_type(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

fn entry_id(id: Option<&JsonId>, key: &str) -> Option<i64> {
    id.and_then(JsonId::resolve).or_else(|| key.trim().parse().ok())
}

fn build_json_model(id: i64, model: JsonModel) -> Result<AnkiModel> {
    let mut fields = model.flds.ok_or_else(|| {
        ImportError::SchemaParseError(format!("model {} ({}) has no field list", id, model.name))
    })?;
    if fields.is_empty() {
        return Err(ImportError::SchemaParseError(format!(
            "model {} ({}) declares no fields",
            id, model.name
        )));
    }
    if fields.iter().all(|f| f.ord.is_some()) {
        fields.sort_by_key(|f| f.ord);
    }

    let templates = model
        .tmpls
        .into_iter()
        .enumerate()
        .map(|(i, t)| AnkiTemplate {
            ordinal: t.ord.and_then(|o| u32::try_from(o).ok()).unwrap_or(i as u32),
            name: t.name,
        })
        .collect();

    let field_count = fields.len();
    Ok(AnkiModel {
        id,
        name: model.name,
        kind: if model.kind == 1 {
            ModelKind::Cloze
        } else {
            ModelKind::Standard
        },
        fields: fields.into_iter().map(|f| f.name).collect(),
        templates,
        sort_field: usize::try_from(model.sortf)
            .ok()
            .filter(|&i| i < field_count)
            .unwrap_or(0),
    })
}

fn decode_json_deck_configs(text: &str) -> BTreeMap<i64, DeckConfig> {
    let mut configs = BTreeMap::new();
    let entries = match json_object(text, "dconf") {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(error = %e, "ignoring unreadable deck options");
            return configs;
        }
    };
    for (key, value) in entries {
        let Ok(config) = serde_json::from_value::<JsonDeckConfig>(value) else {
            continue;
        };
        if let Some(id) = entry_id(config.id.as_ref(), &key) {
            configs.insert(
                id,
                DeckConfig {
                    id,
                    name: config.name,
                },
            );
        }
    }
    configs
}

// --- tables (schema 18) ---

fn decode_table_schema(db: &Database, warnings: &mut Vec<ImportWarning>) -> Result<Schema> {
    let mut schema = Schema::default();

    let mut model_fields: BTreeMap<i64, Vec<(i64, String)>> = BTreeMap::new();
    db.scan("fields", |row: Row<'_>| -> Result<()> {
        model_fields
            .entry(row.integer("ntid")?)
            .or_default()
            .push((row.integer("ord")?, row.text("name")?.into_owned()));
        Ok(())
    })?;

    let mut model_templates: BTreeMap<i64, Vec<AnkiTemplate>> = BTreeMap::new();
    if db.has_table("templates") {
        db.scan("templates", |row: Row<'_>| -> Result<()> {
            let ordinal = u32::try_from(row.integer("ord")?).map_err(|_| {
                ImportError::SchemaParseError("template ordinal out of range".to_string())
            })?;
            model_templates
                .entry(row.integer("ntid")?)
                .or_default()
                .push(AnkiTemplate {
                    ordinal,
                    name: row.text("name")?.into_owned(),
                });
            Ok(())
        })?;
    }

    let mut models = Vec::new();
    db.scan("notetypes", |row: Row<'_>| -> Result<()> {
        let (kind, sort_field) = notetype_config(row.blob("config")?);
        models.push((row.integer("id")?, row.text("name")?.into_owned(), kind, sort_field));
        Ok(())
    })?;
    for (id, name, kind, sort_field) in models {
        let mut fields = model_fields.remove(&id).unwrap_or_default();
        if fields.is_empty() {
            return Err(ImportError::SchemaParseError(format!(
                "model {} ({}) has no field list",
                id, name
            )));
        }
        fields.sort_by_key(|(ord, _)| *ord);
        let mut templates = model_templates.remove(&id).unwrap_or_default();
        templates.sort_by_key(|t| t.ordinal);
        let field_count = fields.len();
        let model = AnkiModel {
            id,
            name,
            kind,
            fields: fields.into_iter().map(|(_, name)| name).collect(),
            templates,
            sort_field: if sort_field < field_count { sort_field } else { 0 },
        };
        insert_unique(&mut schema.models, id, model, "model")?;
    }

    let mut decks = Vec::new();
    db.scan("decks", |row: Row<'_>| -> Result<()> {
        let kind = deck_kind(row.blob("kind")?)
            .map_err(|e| ImportError::SchemaParseError(format!("deck kind: {}", e)))?;
        decks.push((row.integer("id")?, row.text("name")?.into_owned(), kind));
        Ok(())
    })?;
    for (id, native_name, kind) in decks {
        let name = native_name.replace(NATIVE_DECK_SEPARATOR, DECK_PATH_SEPARATOR);
        let (config_id, dynamic, description) = match kind {
            DeckKind::Normal {
                config_id,
                description,
            } => (Some(config_id), false, description),
            DeckKind::Filtered => (None, true, None),
        };
        if let Some(deck) = build_deck(id, &name, config_id, dynamic, description, warnings) {
            insert_unique(&mut schema.decks, id, deck, "deck")?;
        }
    }

    if db.has_table("deck_config") {
        db.scan("deck_config", |row: Row<'_>| -> Result<()> {
            let id = row.integer("id")?;
            schema.deck_configs.insert(
                id,
                DeckConfig {
                    id,
                    name: row.text("name")?.into_owned(),
                },
            );
            Ok(())
        })?;
    }

    Ok(schema)
}

/// `Notetype.Config`: kind = 1, sort_field_idx = 2.
fn notetype_config(blob: &[u8]) -> (ModelKind, usize) {
    let mut kind = ModelKind::Standard;
    let mut sort_field = 0;
    for field in Fields::new(blob) {
        let Ok((number, value)) = field else {
            break;
        };
        match (number, value.as_u64()) {
            (1, Some(1)) => kind = ModelKind::Cloze,
            (2, Some(idx)) => sort_field = idx as usize,
            _ => {}
        }
    }
    (kind, sort_field)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DeckKind {
    Normal {
        config_id: i64,
        description: Option<String>,
    },
    Filtered,
}

/// `Deck.KindContainer`: normal = 1 (config_id = 1, description = 4),
/// filtered = 2.
fn deck_kind(blob: &[u8]) -> std::result::Result<DeckKind, crate::protobuf::WireError> {
    let mut kind = DeckKind::Normal {
        config_id: 1,
        description: None,
    };
    for field in Fields::new(blob) {
        match field? {
            (1, value) => {
                let mut config_id = 1;
                let mut description = None;
                for inner in Fields::new(value.as_bytes().unwrap_or_default()) {
                    match inner? {
                        (1, v) => config_id = v.as_u64().unwrap_or(1) as i64,
                        (4, v) => {
                            description = v
                                .as_bytes()
                                .map(|b| String::from_utf8_lossy(b).into_owned())
                                .filter(|d| !d.is_empty())
                        }
                        _ => {}
                    }
                }
                kind = DeckKind::Normal {
                    config_id,
                    description,
                };
            }
            (2, _) => kind = DeckKind::Filtered,
            _ => {}
        }
    }
    Ok(kind)
}

// --- shared ---

fn build_deck(
    id: i64,
    name: &str,
    config_id: Option<i64>,
    dynamic: bool,
    description: Option<String>,
    warnings: &mut Vec<ImportWarning>,
) -> Option<AnkiDeck> {
    let Some(path) = parse_deck_path(name) else {
        ImportWarning::new(
            WarningKind::InvalidDeck,
            format!("deck {} has an empty path segment in name {:?}", id, name),
        )
        .record(warnings);
        return None;
    };
    Some(AnkiDeck {
        id,
        name: name.to_string(),
        path,
        config_id,
        dynamic,
        description: description.filter(|d| !d.trim().is_empty()),
    })
}

fn insert_unique<T>(map: &mut BTreeMap<i64, T>, id: i64, value: T, what: &str) -> Result<()> {
    match map.entry(id) {
        Entry::Occupied(_) => Err(ImportError::SchemaParseError(format!(
            "duplicate {} id {}",
            what, id
        ))),
        Entry::Vacant(slot) => {
            slot.insert(value);
            Ok(())
        }
    }
}
