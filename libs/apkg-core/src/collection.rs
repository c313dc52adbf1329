//! Collection database selection and the `col` metadata row.

use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::config::ImportConfig;
use crate::container::Container;
use crate::error::{ImportError, Result};
use crate::sqlite::{Database, Row};

/// Export revision of the embedded collection database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionFormat {
    /// `collection.anki21b`: zstd-compressed, schema 18, zstd media.
    Latest,
    /// `collection.anki21`: plain SQLite, schema 11.
    Anki21,
    /// `collection.anki2`: plain SQLite, schema 11.
    Legacy,
}

impl CollectionFormat {
    pub const NEWEST_FIRST: [CollectionFormat; 3] = [Self::Latest, Self::Anki21, Self::Legacy];

    pub fn entry_name(self) -> &'static str {
        match self {
            Self::Latest => "collection.anki21b",
            Self::Anki21 => "collection.anki21",
            Self::Legacy => "collection.anki2",
        }
    }

    /// Whether the collection and media entries are zstd streams.
    pub fn is_zstd(self) -> bool {
        matches!(self, Self::Latest)
    }
}

/// Pick the first collection entry present, in configured priority order.
pub fn select_format(container: &Container<'_>, config: &ImportConfig) -> Result<CollectionFormat> {
    config
        .collection_priority
        .iter()
        .copied()
        .find(|format| container.contains(format.entry_name()))
        .ok_or_else(|| {
            ImportError::UnsupportedFormat(format!(
                "no collection entry among {:?}",
                container.names()
            ))
        })
}

/// Tracks decompressed bytes against `max_archive_bytes`.
#[derive(Debug, Clone, Copy)]
pub struct ByteBudget {
    max: u64,
    used: u64,
}

impl ByteBudget {
    pub fn new(max: u64, used: u64) -> Self {
        Self { max, used }
    }

    pub fn remaining(&self) -> u64 {
        self.max.saturating_sub(self.used)
    }

    pub fn charge(&mut self, bytes: u64) -> Result<()> {
        self.used = self.used.saturating_add(bytes);
        if self.used > self.max {
            return Err(ImportError::limit("max_archive_bytes", self.max, self.used));
        }
        Ok(())
    }
}

/// Decode a zstd stream, failing once it would exceed the budget.
///
/// `invalid` builds the error reported for a stream that fails to decode.
pub fn decompress_zstd(
    data: &[u8],
    budget: &mut ByteBudget,
    what: &str,
    invalid: fn(String) -> ImportError,
) -> Result<Vec<u8>> {
    let decoder = zstd::stream::read::Decoder::new(data)
        .map_err(|e| invalid(format!("{}: {}", what, e)))?;
    let limit = budget.remaining();
    let mut out = Vec::new();
    decoder
        .take(limit.saturating_add(1))
        .read_to_end(&mut out)
        .map_err(|e| invalid(format!("{}: invalid zstd stream: {}", what, e)))?;
    budget.charge(out.len() as u64)?;
    Ok(out)
}

/// Locate, decompress and open the collection database.
pub fn open_collection(
    container: &mut Container<'_>,
    config: &ImportConfig,
    budget: &mut ByteBudget,
) -> Result<(CollectionFormat, Database)> {
    let format = select_format(container, config)?;
    let entry = container
        .read_entry(format.entry_name())?
        .ok_or_else(|| ImportError::UnsupportedFormat(format.entry_name().to_string()))?;

    let bytes = if format.is_zstd() {
        decompress_zstd(
            &entry.data,
            budget,
            entry.name.as_str(),
            ImportError::CorruptDatabase,
        )?
    } else {
        entry.data
    };
    tracing::debug!(?format, bytes = bytes.len(), "selected collection entry");

    let db = Database::open(bytes)?;
    Ok((format, db))
}

/// The single row of the `col` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRow {
    pub schema_version: i64,
    pub created: i64,
    pub models: String,
    pub decks: String,
    pub deck_configs: String,
}

impl CollectionRow {
    fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            schema_version: row.integer("ver")?,
            created: row.integer("crt")?,
            models: row.text("models")?.into_owned(),
            decks: row.text("decks")?.into_owned(),
            deck_configs: row.text("dconf")?.into_owned(),
        })
    }
}

/// Read the `col` table, which must hold exactly one row.
pub fn read_collection_row(db: &Database) -> Result<CollectionRow> {
    let mut found: Option<CollectionRow> = None;
    let mut count = 0usize;
    db.scan("col", |row: Row<'_>| -> Result<()> {
        count += 1;
        if found.is_none() {
            found = Some(CollectionRow::from_row(&row)?);
        }
        Ok(())
    })?;
    match (found, count) {
        (Some(row), 1) => Ok(row),
        (None, _) => Err(ImportError::CorruptDatabase(
            "collection metadata row missing".to_string(),
        )),
        (Some(_), n) => Err(ImportError::CorruptDatabase(format!(
            "expected one collection metadata row, found {}",
            n
        ))),
    }
}
