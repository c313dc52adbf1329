//! Common test utilities for integration tests.
//!
//! This module provides shared test infrastructure including:
//! - `ApkgBuilder` for assembling real `.apkg` archives in memory
//! - a protobuf encoder for schema 18 blobs
//!
//! Collections are written with rusqlite into a temporary directory, so the
//! page reader is exercised against files produced by SQLite itself.

#![allow(dead_code)]

pub mod fixtures;

use std::io::{Cursor, Write};

use rusqlite::{params, Connection};
use serde_json::{json, Map, Value};
use zip::write::SimpleFileOptions;

use apkg_core::CollectionFormat;

const SCHEMA_11: &str = "
CREATE TABLE col (
    id integer primary key,
    crt integer not null,
    mod integer not null,
    scm integer not null,
    ver integer not null,
    dty integer not null,
    usn integer not null,
    ls integer not null,
    conf text not null,
    models text not null,
    decks text not null,
    dconf text not null,
    tags text not null
);
CREATE TABLE notes (
    id integer primary key,
    guid text not null,
    mid integer not null,
    mod integer not null,
    usn integer not null,
    tags text not null,
    flds text not null,
    sfld integer not null,
    csum integer not null,
    flags integer not null,
    data text not null
);
CREATE TABLE cards (
    id integer primary key,
    nid integer not null,
    did integer not null,
    ord integer not null,
    mod integer not null,
    usn integer not null,
    type integer not null,
    queue integer not null,
    due integer not null,
    ivl integer not null,
    factor integer not null,
    reps integer not null,
    lapses integer not null,
    left integer not null,
    odue integer not null,
    odid integer not null,
    flags integer not null,
    data text not null
);
CREATE INDEX ix_notes_csum on notes (csum);
CREATE INDEX ix_cards_nid on cards (nid);
";

const SCHEMA_18_TABLES: &str = "
CREATE TABLE notetypes (
    id integer not null primary key,
    name text not null,
    mtime_secs integer not null,
    usn integer not null,
    config blob not null
);
CREATE TABLE fields (
    ntid integer not null,
    ord integer not null,
    name text not null,
    config blob not null,
    primary key (ntid, ord)
) without rowid;
CREATE TABLE templates (
    ntid integer not null,
    ord integer not null,
    name text not null,
    mtime_secs integer not null,
    usn integer not null,
    config blob not null,
    primary key (ntid, ord)
) without rowid;
CREATE TABLE decks (
    id integer primary key not null,
    name text not null,
    mtime_secs integer not null,
    usn integer not null,
    common blob not null,
    kind blob not null
);
CREATE TABLE deck_config (
    id integer primary key not null,
    name text not null,
    mtime_secs integer not null,
    usn integer not null,
    config blob not null
);
";

pub const DEFAULT_CONFIG_ID: i64 = 1;

#[derive(Debug, Clone)]
pub struct ModelFixture {
    pub id: i64,
    pub name: String,
    pub fields: Vec<String>,
    pub templates: Vec<String>,
    pub cloze: bool,
}

#[derive(Debug, Clone)]
pub struct DeckFixture {
    pub id: i64,
    pub name: String,
    pub dynamic: bool,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct NoteFixture {
    pub id: i64,
    pub model_id: i64,
    pub guid: String,
    pub tags: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CardFixture {
    pub id: i64,
    pub note_id: i64,
    pub deck_id: i64,
    pub original_deck_id: i64,
    pub ordinal: i64,
}

/// Builds `.apkg` archives for a chosen collection format.
#[derive(Debug, Clone)]
pub struct ApkgBuilder {
    format: CollectionFormat,
    models: Vec<ModelFixture>,
    decks: Vec<DeckFixture>,
    notes: Vec<NoteFixture>,
    cards: Vec<CardFixture>,
    media: Vec<(String, Vec<u8>)>,
    missing_media: Vec<String>,
    manifest_override: Option<Vec<u8>>,
    extra_entries: Vec<(String, Vec<u8>)>,
}

impl ApkgBuilder {
    pub fn new(format: CollectionFormat) -> Self {
        Self {
            format,
            models: Vec::new(),
            decks: Vec::new(),
            notes: Vec::new(),
            cards: Vec::new(),
            media: Vec::new(),
            missing_media: Vec::new(),
            manifest_override: None,
            extra_entries: Vec::new(),
        }
    }

    pub fn model(mut self, id: i64, name: &str, fields: &[&str], templates: &[&str]) -> Self {
        self.models.push(ModelFixture {
            id,
            name: name.to_string(),
            fields: fields.iter().map(|s| s.to_string()).collect(),
            templates: templates.iter().map(|s| s.to_string()).collect(),
            cloze: false,
        });
        self
    }

    pub fn cloze_model(mut self, id: i64, name: &str, fields: &[&str]) -> Self {
        self.models.push(ModelFixture {
            id,
            name: name.to_string(),
            fields: fields.iter().map(|s| s.to_string()).collect(),
            templates: vec!["Cloze".to_string()],
            cloze: true,
        });
        self
    }

    pub fn deck(mut self, id: i64, name: &str) -> Self {
        self.decks.push(DeckFixture {
            id,
            name: name.to_string(),
            dynamic: false,
            description: String::new(),
        });
        self
    }

    pub fn described_deck(mut self, id: i64, name: &str, description: &str) -> Self {
        self.decks.push(DeckFixture {
            id,
            name: name.to_string(),
            dynamic: false,
            description: description.to_string(),
        });
        self
    }

    pub fn filtered_deck(mut self, id: i64, name: &str) -> Self {
        self.decks.push(DeckFixture {
            id,
            name: name.to_string(),
            dynamic: true,
            description: String::new(),
        });
        self
    }

    pub fn note(mut self, id: i64, model_id: i64, fields: &[&str], tags: &str) -> Self {
        self.notes.push(NoteFixture {
            id,
            model_id,
            guid: format!("guid{}", id),
            tags: tags.to_string(),
            fields: fields.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn card(self, id: i64, note_id: i64, deck_id: i64, ordinal: i64) -> Self {
        self.card_in(id, note_id, deck_id, 0, ordinal)
    }

    pub fn card_in(
        mut self,
        id: i64,
        note_id: i64,
        deck_id: i64,
        original_deck_id: i64,
        ordinal: i64,
    ) -> Self {
        self.cards.push(CardFixture {
            id,
            note_id,
            deck_id,
            original_deck_id,
            ordinal,
        });
        self
    }

    pub fn media(mut self, name: &str, data: &[u8]) -> Self {
        self.media.push((name.to_string(), data.to_vec()));
        self
    }

    /// List `name` in the manifest without storing its bytes.
    pub fn missing_media(mut self, name: &str) -> Self {
        self.missing_media.push(name.to_string());
        self
    }

    /// Store `data` as the `media` entry instead of a generated manifest.
    pub fn raw_manifest(mut self, data: &[u8]) -> Self {
        self.manifest_override = Some(data.to_vec());
        self
    }

    pub fn entry(mut self, name: &str, data: &[u8]) -> Self {
        self.extra_entries.push((name.to_string(), data.to_vec()));
        self
    }

    /// The collection database file, before any compression.
    pub fn collection_bytes(&self) -> Vec<u8> {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("collection.db");
        {
            let conn = Connection::open(&path).expect("open collection");
            conn.execute_batch(SCHEMA_11).expect("create schema 11 tables");
            if self.is_schema_18() {
                conn.execute_batch(SCHEMA_18_TABLES).expect("create schema 18 tables");
                self.write_schema_18(&conn);
            } else {
                self.write_schema_11(&conn);
            }
            self.write_notes_and_cards(&conn);
        }
        std::fs::read(&path).expect("read collection")
    }

    /// The complete archive.
    pub fn build(&self) -> Vec<u8> {
        let mut entries: Vec<(String, Vec<u8>)> = Vec::new();

        let collection = self.collection_bytes();
        let collection = if self.is_schema_18() {
            zstd::encode_all(&collection[..], 0).expect("compress collection")
        } else {
            collection
        };
        entries.push((self.format.entry_name().to_string(), collection));

        let names: Vec<&str> = self
            .media
            .iter()
            .map(|(name, _)| name.as_str())
            .chain(self.missing_media.iter().map(String::as_str))
            .collect();
        let manifest = match &self.manifest_override {
            Some(data) => data.clone(),
            None => self.manifest(&names),
        };
        entries.push(("media".to_string(), manifest));
        for (index, (_, data)) in self.media.iter().enumerate() {
            let data = if self.is_schema_18() {
                zstd::encode_all(&data[..], 0).expect("compress media")
            } else {
                data.clone()
            };
            entries.push((index.to_string(), data));
        }
        entries.extend(self.extra_entries.iter().cloned());

        zip_entries(&entries)
    }

    fn is_schema_18(&self) -> bool {
        self.format == CollectionFormat::Latest
    }

    fn manifest(&self, names: &[&str]) -> Vec<u8> {
        if self.is_schema_18() {
            let mut msg = Vec::new();
            for name in names {
                let mut entry = Vec::new();
                proto::bytes(&mut entry, 1, name.as_bytes());
                proto::bytes(&mut msg, 1, &entry);
            }
            zstd::encode_all(&msg[..], 0).expect("compress manifest")
        } else {
            let map: Map<String, Value> = names
                .iter()
                .enumerate()
                .map(|(i, name)| (i.to_string(), json!(name)))
                .collect();
            serde_json::to_vec(&map).expect("manifest json")
        }
    }

    fn write_schema_11(&self, conn: &Connection) {
        let models: Map<String, Value> = self
            .models
            .iter()
            .map(|m| {
                let flds: Vec<Value> = m
                    .fields
                    .iter()
                    .enumerate()
                    .map(|(ord, name)| json!({"name": name, "ord": ord, "sticky": false}))
                    .collect();
                let tmpls: Vec<Value> = m
                    .templates
                    .iter()
                    .enumerate()
                    .map(|(ord, name)| json!({"name": name, "ord": ord, "qfmt": "{{Front}}", "afmt": "{{Back}}"}))
                    .collect();
                let model = json!({
                    "id": m.id,
                    "name": m.name,
                    "type": if m.cloze { 1 } else { 0 },
                    "flds": flds,
                    "tmpls": tmpls,
                    "sortf": 0,
                    "did": 1,
                });
                (m.id.to_string(), model)
            })
            .collect();
        let decks: Map<String, Value> = self
            .decks
            .iter()
            .map(|d| {
                let deck = json!({
                    "id": d.id,
                    "name": d.name,
                    "conf": DEFAULT_CONFIG_ID,
                    "dyn": if d.dynamic { 1 } else { 0 },
                    "desc": d.description,
                });
                (d.id.to_string(), deck)
            })
            .collect();
        let dconf = json!({"1": {"id": DEFAULT_CONFIG_ID, "name": "Default"}});

        conn.execute(
            "INSERT INTO col VALUES (1, 1600000000, 0, 0, 11, 0, 0, 0, '{}', ?1, ?2, ?3, '{}')",
            params![
                Value::Object(models).to_string(),
                Value::Object(decks).to_string(),
                dconf.to_string()
            ],
        )
        .expect("insert col");
    }

    fn write_schema_18(&self, conn: &Connection) {
        conn.execute(
            "INSERT INTO col VALUES (1, 1600000000, 0, 0, 18, 0, 0, 0, '', '', '', '', '')",
            [],
        )
        .expect("insert col");

        for m in &self.models {
            let mut config = Vec::new();
            if m.cloze {
                proto::uint(&mut config, 1, 1);
            }
            conn.execute(
                "INSERT INTO notetypes VALUES (?1, ?2, 0, 0, ?3)",
                params![m.id, m.name, config],
            )
            .expect("insert notetype");
            for (ord, name) in m.fields.iter().enumerate() {
                conn.execute(
                    "INSERT INTO fields VALUES (?1, ?2, ?3, x'')",
                    params![m.id, ord as i64, name],
                )
                .expect("insert field");
            }
            for (ord, name) in m.templates.iter().enumerate() {
                conn.execute(
                    "INSERT INTO templates VALUES (?1, ?2, ?3, 0, 0, x'')",
                    params![m.id, ord as i64, name],
                )
                .expect("insert template");
            }
        }

        for d in &self.decks {
            let mut kind = Vec::new();
            if d.dynamic {
                proto::bytes(&mut kind, 2, &[]);
            } else {
                let mut normal = Vec::new();
                proto::uint(&mut normal, 1, DEFAULT_CONFIG_ID as u64);
                if !d.description.is_empty() {
                    proto::bytes(&mut normal, 4, d.description.as_bytes());
                }
                proto::bytes(&mut kind, 1, &normal);
            }
            conn.execute(
                "INSERT INTO decks VALUES (?1, ?2, 0, 0, x'', ?3)",
                params![d.id, d.name.replace("::", "\x1f"), kind],
            )
            .expect("insert deck");
        }

        conn.execute(
            "INSERT INTO deck_config VALUES (?1, 'Default', 0, 0, x'')",
            params![DEFAULT_CONFIG_ID],
        )
        .expect("insert deck config");
    }

    fn write_notes_and_cards(&self, conn: &Connection) {
        for n in &self.notes {
            conn.execute(
                "INSERT INTO notes VALUES (?1, ?2, ?3, 1600000100, 0, ?4, ?5, '', 0, 0, '')",
                params![n.id, n.guid, n.model_id, n.tags, n.fields.join("\x1f")],
            )
            .expect("insert note");
        }
        for c in &self.cards {
            conn.execute(
                "INSERT INTO cards VALUES (?1, ?2, ?3, ?4, 0, 0, 2, 2, 10, 3, 2500, 4, 1, 0, 0, ?5, 0, '')",
                params![c.id, c.note_id, c.deck_id, c.ordinal, c.original_deck_id],
            )
            .expect("insert card");
        }
    }
}

/// Run `sql` against a copy of the collection file `db`.
pub fn edit_collection(db: &[u8], sql: &str) -> Vec<u8> {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("collection.db");
    std::fs::write(&path, db).expect("write collection");
    {
        let conn = Connection::open(&path).expect("open collection");
        conn.execute_batch(sql).expect("edit collection");
    }
    std::fs::read(&path).expect("read collection")
}

/// Root page number of `table` in the collection file `db`.
pub fn root_page(db: &[u8], table: &str) -> u32 {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("collection.db");
    std::fs::write(&path, db).expect("write collection");
    let conn = Connection::open(&path).expect("open collection");
    conn.query_row(
        "SELECT rootpage FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )
    .expect("table root page")
}

/// Zip `(name, data)` pairs with deflate compression.
pub fn zip_entries(entries: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer
            .start_file(name.as_str(), SimpleFileOptions::default())
            .expect("start entry");
        writer.write_all(data).expect("write entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

/// Protobuf writer for test blobs.
pub mod proto {
    pub fn varint(out: &mut Vec<u8>, mut value: u64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                out.push(byte);
                return;
            }
            out.push(byte | 0x80);
        }
    }

    pub fn uint(out: &mut Vec<u8>, field: u32, value: u64) {
        varint(out, u64::from(field) << 3);
        varint(out, value);
    }

    pub fn bytes(out: &mut Vec<u8>, field: u32, value: &[u8]) {
        varint(out, (u64::from(field) << 3) | 2);
        varint(out, value.len() as u64);
        out.extend_from_slice(value);
    }
}
