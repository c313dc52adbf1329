//! Anki deck package (.apkg) importer.
//!
//! Provides:
//! - Zip container access with size and compression-ratio guards
//! - A read-only SQLite page reader for the embedded collection
//! - Note type and deck decoding for schema 11 (JSON) and schema 18 (tables)
//! - Note, card and media resolution into a deck/card graph
//!
//! The entry point is [`import`], a pure function of the archive bytes and
//! an [`ImportConfig`].

pub mod cards;
pub mod collection;
pub mod config;
pub mod container;
pub mod error;
pub mod hierarchy;
pub mod importer;
pub mod media;
pub mod notes;
pub mod protobuf;
pub mod schema;
pub mod sqlite;
pub mod text;
pub mod types;

pub use collection::CollectionFormat;
pub use config::ImportConfig;
pub use error::{ErrorKind, ImportError, Result};
pub use hierarchy::DeckHierarchy;
pub use importer::import;
pub use types::{
    AnkiCard, AnkiDeck, AnkiModel, AnkiNote, AnkiTemplate, ApkgParseResult, CardSchedule,
    DeckConfig, ImportWarning, MediaFile, MediaKind, MediaReference, ModelKind, NoteField,
    ParsedCard, ParsedDeck, WarningKind,
};
