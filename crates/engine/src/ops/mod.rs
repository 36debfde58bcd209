//! Builtin patch operations.
//!
//! Each submodule contributes descriptors for one family of operations; the
//! engine registers [`builtin_operations`] by default and embedders may
//! extend or replace the list at construction.

mod calls;
mod classes;
mod fields;
mod initializers;
mod locks;
mod methods;
mod modifiers;

use crate::registry::{Attrs, OperationDescriptor};
use crate::{Error, Result};

/// The full builtin operation set.
pub fn builtin_operations() -> Vec<OperationDescriptor> {
    let mut operations = Vec::new();
    operations.extend(calls::descriptors());
    operations.extend(classes::descriptors());
    operations.extend(fields::descriptors());
    operations.extend(initializers::descriptors());
    operations.extend(locks::descriptors());
    operations.extend(methods::descriptors());
    operations.extend(modifiers::descriptors());
    operations
}

/// Attribute lookup that treats required-but-absent as an operation error.
/// The dispatcher already enforces declared requirements; this guards the
/// handful of places where one of several attributes must be present.
pub(crate) fn required<'a>(attrs: &'a Attrs, op: &'static str, name: &str) -> Result<&'a str> {
    attrs
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| Error::InvalidAttribute {
            op,
            msg: format!("missing required attribute `{name}`"),
        })
}

pub(crate) fn attr<'a>(attrs: &'a Attrs, name: &str) -> Option<&'a str> {
    attrs.get(name).map(String::as_str)
}

pub(crate) fn has(attrs: &Attrs, name: &str) -> bool {
    attrs.contains_key(name)
}

/// Substitutes `$field` in a code fragment with the invocation's `field`
/// attribute, when present.
pub(crate) fn substitute_field(code: &str, attrs: &Attrs) -> String {
    match attr(attrs, "field") {
        Some(field) => code.replace("$field", field),
        None => code.to_string(),
    }
}

/// Parses an optional integer attribute, falling back to `default`.
pub(crate) fn int_attr(attrs: &Attrs, name: &str, default: i64) -> i64 {
    attr(attrs, name)
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
