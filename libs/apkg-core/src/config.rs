//! Import configuration.

use serde::{Deserialize, Serialize};

use crate::collection::CollectionFormat;

/// Caps and switches applied to a single import call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Total decompressed bytes the import may materialize.
    pub max_archive_bytes: u64,
    /// Maximum number of note rows processed.
    pub max_note_count: usize,
    /// Maximum number of media manifest entries resolved.
    pub max_media_count: usize,
    /// Treat a field-count mismatch as fatal instead of padding with a warning.
    pub strict_field_counts: bool,
    /// Largest allowed uncompressed/compressed ratio for one archive entry.
    pub max_compression_ratio: u64,
    /// Collection entries probed in order; the first present one is used.
    pub collection_priority: Vec<CollectionFormat>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_archive_bytes: 512 * 1024 * 1024,
            max_note_count: 200_000,
            max_media_count: 50_000,
            strict_field_counts: false,
            max_compression_ratio: 500,
            collection_priority: CollectionFormat::NEWEST_FIRST.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_probes_newest_format_first() {
        let config = ImportConfig::default();
        assert_eq!(
            config.collection_priority,
            vec![
                CollectionFormat::Latest,
                CollectionFormat::Anki21,
                CollectionFormat::Legacy
            ]
        );
        assert!(!config.strict_field_counts);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: ImportConfig =
            serde_json::from_str(r#"{"max_note_count": 10, "strict_field_counts": true}"#).unwrap();
        assert_eq!(config.max_note_count, 10);
        assert!(config.strict_field_counts);
        assert_eq!(config.max_media_count, ImportConfig::default().max_media_count);
    }

    #[test]
    fn priority_accepts_snake_case_names() {
        let config: ImportConfig =
            serde_json::from_str(r#"{"collection_priority": ["legacy", "anki21"]}"#).unwrap();
        assert_eq!(
            config.collection_priority,
            vec![CollectionFormat::Legacy, CollectionFormat::Anki21]
        );
    }
}
