//! Patch resolution, dispatch and application engine.
//!
//! The engine compiles loaded patch documents into per-class operation
//! lists, dispatches each operation against the members it selects, and
//! serves patched bytecode through a write-once cache. Three operations
//! rewrite instruction streams directly: field-initializer correlation
//! ([`field_init`]), call-site truncation ([`truncate`]) and lock-primitive
//! conversion ([`monitor`]).

pub mod dispatch;
pub mod field_init;
pub mod monitor;
pub mod ops;
pub mod patcher;
pub mod registry;
pub mod truncate;

use thiserror::Error;

/// Engine error type encompassing construction, load and operation errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Error bubbled up from the class model.
    #[error(transparent)]
    Core(#[from] classpatch_core::result::Error),

    /// Error bubbled up from document parsing or loading.
    #[error(transparent)]
    Document(#[from] classpatch_document::result::Error),

    /// The same class id appears twice within one patch group.
    #[error("duplicate class {class} in patch group {group}")]
    DuplicateClass {
        /// Class id claimed twice.
        class: String,
        /// Group that claimed it.
        group: String,
    },

    /// Two operation descriptors registered under one name.
    #[error("duplicate operation registration: {0}")]
    DuplicateOperation(String),

    /// An operation received attributes it cannot work with.
    #[error("{op}: {msg}")]
    InvalidAttribute {
        /// Operation name.
        op: &'static str,
        /// What was wrong.
        msg: String,
    },
}

/// Engine result type
pub type Result<T> = std::result::Result<T, Error>;
