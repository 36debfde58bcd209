//! Document results and error types

use thiserror::Error;

/// Document error type encompassing parse and load failures.
///
/// Everything here is a load-time structural error: fatal to the document
/// load and raised to the caller, unlike the per-entry conditions the load
/// pipeline logs and skips.
#[derive(Debug, Error)]
pub enum Error {
    /// Building one class patch entry failed.
    #[error("failed to create class patch for {class}: {msg}")]
    ClassEntry {
        /// The class element's id attribute.
        class: String,
        /// What went wrong.
        msg: String,
    },

    /// A class element has no id attribute.
    #[error("class element <{tag}> has no id attribute")]
    MissingId {
        /// Tag of the offending element.
        tag: String,
    },

    /// The alternate-format payload was not valid JSON.
    #[error("invalid json document: {0}")]
    Json(#[from] serde_json::Error),

    /// The JSON document does not describe a single-rooted element tree.
    #[error("json document shape: {0}")]
    JsonShape(String),

    /// The raw document starts with neither `<` nor `[`/`{{`.
    #[error("unknown patch format starting with {0:?}")]
    UnknownFormat(char),

    /// The raw document was empty.
    #[error("empty patch document")]
    Empty,

    /// The native format failed to parse.
    #[error("document parse error at offset {pos}: {msg}")]
    Parse {
        /// Byte offset of the failure.
        pos: usize,
        /// Description of the failure.
        msg: String,
    },
}

/// Document result type
pub type Result<T> = std::result::Result<T, Error>;
