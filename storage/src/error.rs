//! Storage error types.

use std::path::PathBuf;

/// Errors raised while reading or writing landscape inputs and outputs.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to read a file from disk.
    #[error("failed to read `{}`: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a file to disk.
    #[error("failed to write `{}`: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a RON document.
    #[error("failed to parse RON document: {0}")]
    RonParse(#[source] ron::error::SpannedError),

    /// Failed to serialize to RON.
    #[error("failed to serialize RON document: {0}")]
    RonSerialize(#[source] ron::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// The document extension is neither `.ron` nor `.json`.
    #[error("unsupported document format for `{}`", .0.display())]
    UnsupportedFormat(PathBuf),

    /// A stored file does not have the expected shape.
    #[error("malformed file `{}`: {message}", path.display())]
    Malformed { path: PathBuf, message: String },

    /// The engine rejected stored data.
    #[error(transparent)]
    Engine(#[from] landscape_core::Error),
}

pub type Result<T, E = StorageError> = std::result::Result<T, E>;
