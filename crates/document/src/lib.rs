//! Patch document model: element tree, format readers and the load-time
//! normalization pipeline.
//!
//! A raw document string (native element format or the JSON alternate
//! format) is parsed into an [`element::Element`] tree and compiled by
//! [`model::load_groups`] into ordered [`model::PatchGroup`]s whose
//! identifiers all live in the target namespace.

pub mod element;
pub mod json;
pub mod model;
pub mod result;
pub mod xml;

pub use element::Element;
pub use model::{
    load_groups, parse_document, ClassPatchEntry, OperationInvocation, PatchGroup, SELECT_ALL,
    SELECT_STATIC,
};
pub use result::{Error, Result};
