//! Fatal import errors on malformed, oversized or hostile archives.

mod common;

use apkg_core::{import, CollectionFormat, ErrorKind, ImportConfig, ImportError};
use common::fixtures::{self, BASIC_MODEL};
use common::{edit_collection, root_page, zip_entries, ApkgBuilder};

fn single_entry(name: &str, data: Vec<u8>) -> Vec<u8> {
    zip_entries(&[(name.to_string(), data)])
}

fn kind_of(bytes: &[u8], config: &ImportConfig) -> ErrorKind {
    match import(bytes, config) {
        Ok(result) => panic!("import unexpectedly succeeded: {:?}", result.warnings),
        Err(err) => err.kind(),
    }
}

/// Test bytes that are not a zip archive.
#[test]
fn test_not_a_zip() {
    let config = ImportConfig::default();
    assert_eq!(kind_of(b"definitely not a zip", &config), ErrorKind::MalformedContainer);
    assert_eq!(kind_of(&[], &config), ErrorKind::MalformedContainer);
}

/// Test a truncated archive.
#[test]
fn test_truncated_zip() {
    let bytes = fixtures::colors(CollectionFormat::Anki21).build();
    let cut = &bytes[..bytes.len() / 2];
    assert_eq!(kind_of(cut, &ImportConfig::default()), ErrorKind::MalformedContainer);
}

/// Test an archive without any collection entry.
#[test]
fn test_no_collection_entry() {
    let bytes = single_entry("media", b"{}".to_vec());
    assert_eq!(kind_of(&bytes, &ImportConfig::default()), ErrorKind::UnsupportedFormat);
}

/// Test a collection entry probed by nothing in the priority list.
#[test]
fn test_priority_excludes_present_entry() {
    let bytes = fixtures::colors(CollectionFormat::Legacy).build();
    let config = ImportConfig {
        collection_priority: vec![CollectionFormat::Latest],
        ..ImportConfig::default()
    };
    assert_eq!(kind_of(&bytes, &config), ErrorKind::UnsupportedFormat);
}

/// Test damaged SQLite headers.
#[test]
fn test_corrupt_database_header() {
    let db = fixtures::colors(CollectionFormat::Anki21).collection_bytes();
    let config = ImportConfig::default();

    let mut bad_magic = db.clone();
    bad_magic[0] = b'X';
    let bytes = single_entry("collection.anki21", bad_magic);
    assert_eq!(kind_of(&bytes, &config), ErrorKind::CorruptDatabase);

    let mut bad_page_size = db.clone();
    bad_page_size[16] = 0x03;
    bad_page_size[17] = 0x00;
    let bytes = single_entry("collection.anki21", bad_page_size);
    assert_eq!(kind_of(&bytes, &config), ErrorKind::CorruptDatabase);

    let mut bad_fractions = db.clone();
    bad_fractions[21] = 10;
    let bytes = single_entry("collection.anki21", bad_fractions);
    assert_eq!(kind_of(&bytes, &config), ErrorKind::CorruptDatabase);
}

/// Test a database cut short of its declared pages.
#[test]
fn test_truncated_database() {
    let db = fixtures::vocabulary(CollectionFormat::Anki21, 200).collection_bytes();
    let config = ImportConfig::default();

    let bytes = single_entry("collection.anki21", db[..60].to_vec());
    assert_eq!(kind_of(&bytes, &config), ErrorKind::CorruptDatabase);

    let bytes = single_entry("collection.anki21", db[..db.len() - 100].to_vec());
    assert_eq!(kind_of(&bytes, &config), ErrorKind::CorruptDatabase);
}

/// Test a `col` table holding two metadata rows.
#[test]
fn test_duplicate_collection_row() {
    let db = fixtures::colors(CollectionFormat::Anki21).collection_bytes();
    let db = edit_collection(
        &db,
        "INSERT INTO col SELECT 2, crt, mod, scm, ver, dty, usn, ls, conf, models, decks, dconf, tags FROM col;",
    );
    let bytes = single_entry("collection.anki21", db);
    assert_eq!(kind_of(&bytes, &ImportConfig::default()), ErrorKind::CorruptDatabase);
}

/// Test an empty `col` table.
#[test]
fn test_missing_collection_row() {
    let db = fixtures::colors(CollectionFormat::Anki21).collection_bytes();
    let db = edit_collection(&db, "DELETE FROM col;");
    let bytes = single_entry("collection.anki21", db);
    assert_eq!(kind_of(&bytes, &ImportConfig::default()), ErrorKind::CorruptDatabase);
}

/// Test an interior b-tree page whose right child points back at itself.
#[test]
fn test_btree_cycle() {
    let mut db = fixtures::vocabulary(CollectionFormat::Anki21, 200).collection_bytes();
    let root = root_page(&db, "notes");
    let page_size = match u16::from_be_bytes([db[16], db[17]]) {
        1 => 65536,
        size => usize::from(size),
    };
    let start = (root as usize - 1) * page_size;
    assert_eq!(db[start], 0x05, "notes root should be an interior table page");
    db[start + 8..start + 12].copy_from_slice(&root.to_be_bytes());

    let bytes = single_entry("collection.anki21", db);
    match import(&bytes, &ImportConfig::default()) {
        Err(ImportError::CorruptDatabase(message)) => {
            assert!(message.contains("referenced twice"), "{}", message);
        }
        other => panic!("expected corrupt database, got {:?}", other.map(|r| r.warnings)),
    }
}

/// Test a Latest collection entry that is not a zstd stream.
#[test]
fn test_invalid_zstd_collection() {
    let bytes = single_entry("collection.anki21b", b"not zstd at all".to_vec());
    assert_eq!(kind_of(&bytes, &ImportConfig::default()), ErrorKind::CorruptDatabase);
}

/// Test a model without fields.
#[test]
fn test_model_without_fields() {
    let bytes = ApkgBuilder::new(CollectionFormat::Anki21)
        .model(BASIC_MODEL, "Empty", &[], &["Card 1"])
        .deck(1, "Default")
        .build();
    assert_eq!(kind_of(&bytes, &ImportConfig::default()), ErrorKind::SchemaParseError);

    let bytes = ApkgBuilder::new(CollectionFormat::Latest)
        .model(BASIC_MODEL, "Empty", &[], &["Card 1"])
        .deck(1, "Default")
        .build();
    assert_eq!(kind_of(&bytes, &ImportConfig::default()), ErrorKind::SchemaParseError);
}

/// Test an unreadable media manifest.
#[test]
fn test_invalid_manifest() {
    let bytes = fixtures::colors(CollectionFormat::Anki21)
        .raw_manifest(b"not json")
        .build();
    assert_eq!(kind_of(&bytes, &ImportConfig::default()), ErrorKind::MalformedContainer);

    let bytes = fixtures::colors(CollectionFormat::Latest)
        .raw_manifest(b"not zstd")
        .build();
    assert_eq!(kind_of(&bytes, &ImportConfig::default()), ErrorKind::MalformedContainer);
}

/// Test the media cap.
#[test]
fn test_max_media_count() {
    let bytes = fixtures::languages(CollectionFormat::Anki21).build();
    let config = ImportConfig {
        max_media_count: 1,
        ..ImportConfig::default()
    };
    match import(&bytes, &config) {
        Err(ImportError::ResourceLimitExceeded { limit, max, found }) => {
            assert_eq!((limit, max, found), ("max_media_count", 1, 2));
        }
        other => panic!("expected media limit, got {:?}", other),
    }
}

/// Test the archive byte cap on declared and decompressed sizes.
#[test]
fn test_max_archive_bytes() {
    let config = ImportConfig {
        max_archive_bytes: 4096,
        ..ImportConfig::default()
    };
    let bytes = fixtures::languages(CollectionFormat::Anki21).build();
    assert_eq!(kind_of(&bytes, &config), ErrorKind::ResourceLimitExceeded);

    // The zstd entry itself is small; its decompressed size is not.
    let bytes = fixtures::languages(CollectionFormat::Latest).build();
    assert_eq!(kind_of(&bytes, &config), ErrorKind::ResourceLimitExceeded);
}

/// Test several large zstd media against a small decompression budget.
#[test]
fn test_zstd_media_share_one_budget() {
    let blob = vec![0u8; 1024 * 1024];
    let mut builder = fixtures::colors(CollectionFormat::Latest);
    for i in 0..8 {
        builder = builder.media(&format!("clip{}.mp3", i), &blob);
    }
    let bytes = builder.build();

    let config = ImportConfig {
        max_archive_bytes: 3 * 1024 * 1024,
        ..ImportConfig::default()
    };
    match import(&bytes, &config) {
        Err(ImportError::ResourceLimitExceeded { limit, max, found }) => {
            assert_eq!(limit, "max_archive_bytes");
            assert_eq!(found, max + 1);
        }
        other => panic!("expected budget error, got {:?}", other.map(|r| r.warnings)),
    }

    let config = ImportConfig {
        max_archive_bytes: 16 * 1024 * 1024,
        ..ImportConfig::default()
    };
    let result = import(&bytes, &config).unwrap();
    assert_eq!(result.media.len(), 8);
    assert!(result.media.iter().all(|file| file.data.len() == blob.len()));
    assert_eq!(result.media[7].name, "clip7.mp3");
}

/// Test an entry that inflates far beyond its compressed size.
#[test]
fn test_zip_bomb() {
    let bytes = single_entry("collection.anki21", vec![0u8; 4 * 1024 * 1024]);
    assert_eq!(kind_of(&bytes, &ImportConfig::default()), ErrorKind::MalformedContainer);

    let lenient = ImportConfig {
        max_compression_ratio: u64::MAX,
        ..ImportConfig::default()
    };
    // Past the ratio guard the zeros are simply not a database.
    assert_eq!(kind_of(&bytes, &lenient), ErrorKind::CorruptDatabase);
}
