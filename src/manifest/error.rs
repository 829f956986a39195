//! Manifest store error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from loading or saving a collection manifest.
///
/// Any of these is fatal for the affected collection only.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Reading, writing, or renaming the manifest file failed.
    #[error("manifest IO error at {path}: {source}")]
    Io {
        /// Manifest or temp file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The manifest file exists but cannot be parsed. Not reset automatically.
    #[error(
        "corrupt manifest at {path}: {source}\n  Suggestion: fix or delete the file to force a full re-run of this collection"
    )]
    Corrupt {
        /// Manifest path.
        path: PathBuf,
        /// Parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The manifest was written by a newer schema.
    #[error("manifest at {path} has schema version {found}, newest supported is {supported}")]
    UnsupportedSchema {
        /// Manifest path.
        path: PathBuf,
        /// Version stored in the file.
        found: u32,
        /// Version this build writes.
        supported: u32,
    },

    /// The file at the collection's path belongs to a different collection.
    #[error("manifest at {path} belongs to collection {found:?}, not {expected:?}")]
    CollectionMismatch {
        /// Manifest path.
        path: PathBuf,
        /// Collection that was requested.
        expected: String,
        /// Collection recorded in the file.
        found: String,
    },

    /// Serializing the in-memory manifest failed.
    #[error("failed to serialize manifest for {collection_id}: {source}")]
    Serialize {
        /// Collection being saved.
        collection_id: String,
        /// Serialization error.
        #[source]
        source: serde_json::Error,
    },
}

impl ManifestError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corrupt_error_mentions_path_and_suggestion() {
        let source = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let error = ManifestError::Corrupt {
            path: PathBuf::from("/state/group-1.json"),
            source,
        };
        let msg = error.to_string();
        assert!(msg.contains("/state/group-1.json"), "got: {msg}");
        assert!(msg.contains("Suggestion"), "got: {msg}");
    }
}
