//! Scenario archives shared by the integration tests.

use apkg_core::CollectionFormat;

use super::ApkgBuilder;

pub const BASIC_MODEL: i64 = 1342697561419;
pub const COLORS_DECK: i64 = 1;

/// One deck, one Basic model, one note, one card.
pub fn colors(format: CollectionFormat) -> ApkgBuilder {
    ApkgBuilder::new(format)
        .model(BASIC_MODEL, "Basic", &["Front", "Back"], &["Card 1"])
        .deck(COLORS_DECK, "Colors")
        .note(100, BASIC_MODEL, &["Red", "Rojo"], " color basic ")
        .card(1000, 100, COLORS_DECK, 0)
}

/// Sequential notes and cards in one deck.
pub fn vocabulary(format: CollectionFormat, count: i64) -> ApkgBuilder {
    let mut builder = ApkgBuilder::new(format)
        .model(BASIC_MODEL, "Basic", &["Front", "Back"], &["Card 1"])
        .deck(COLORS_DECK, "Vocabulary");
    for i in 0..count {
        let front = format!("word {}", i);
        let back = format!("palabra {}", i);
        builder = builder
            .note(100 + i, BASIC_MODEL, &[front.as_str(), back.as_str()], "vocab")
            .card(1000 + i, 100 + i, COLORS_DECK, 0);
    }
    builder
}

/// A nested hierarchy with notes carrying media references.
pub fn languages(format: CollectionFormat) -> ApkgBuilder {
    ApkgBuilder::new(format)
        .model(BASIC_MODEL, "Basic", &["Front", "Back"], &["Card 1", "Card 2"])
        .deck(1, "Default")
        .described_deck(10, "Lang::Spanish", "Spanish vocabulary")
        .deck(11, "Lang::Spanish::Verbs")
        .deck(12, "Lang::French")
        .note(
            100,
            BASIC_MODEL,
            &[r#"<img src="gato.jpg">"#, "cat[sound:gato.mp3]"],
            "animal",
        )
        .note(101, BASIC_MODEL, &["hablar", "to speak"], "verb")
        .note(102, BASIC_MODEL, &["chat", r#"<img src="chat.png">"#], "animal")
        .card(1000, 100, 10, 0)
        .card(1001, 100, 10, 1)
        .card(1002, 101, 11, 0)
        .card(1003, 102, 12, 0)
        .media("gato.jpg", b"\xff\xd8\xff jpeg bytes")
        .media("gato.mp3", b"ID3 mp3 bytes")
}
