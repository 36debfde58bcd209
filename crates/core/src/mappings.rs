//! Identifier mapping between the canonical and target namespaces.
//!
//! A mapping translates class, method and field identifiers from the
//! canonical ("deobfuscated") namespace to the namespace the patched classes
//! actually use, and can obfuscate arbitrary string payloads embedded in a
//! patch document. Returning `None` from any `map_*` method means "no
//! mapping known": callers fall back to the input identifier unchanged.

use crate::ident::{ClassId, FieldId, MethodId};

/// Pure identifier translation, constructed once per engine and shared by
/// every document load.
pub trait Mappings: Send + Sync {
    /// Canonical class → target class.
    fn map_class(&self, class: &ClassId) -> Option<ClassId>;

    /// Canonical method → target method.
    fn map_method(&self, method: &MethodId) -> Option<MethodId>;

    /// Canonical field → target field.
    fn map_field(&self, field: &FieldId) -> Option<FieldId>;

    /// Target method → canonical method.
    fn unmap_method(&self, method: &MethodId) -> Option<MethodId>;

    /// Obfuscates an arbitrary string payload (code fragments, attribute
    /// values). The default mapping echoes its input.
    fn obfuscate(&self, text: &str) -> String;
}

/// Any identifier kind a mapping can translate.
///
/// Mapping a heterogeneous list dispatches on this enum, so "some other
/// kind" is unrepresentable rather than a runtime error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnyId {
    Class(ClassId),
    Method(MethodId),
    Field(FieldId),
}

/// Maps every identifier in `list`, falling back to the input wherever the
/// mapping has no entry.
pub fn map_all(mappings: &dyn Mappings, list: &[AnyId]) -> Vec<AnyId> {
    list.iter()
        .map(|id| match id {
            AnyId::Class(class) => {
                AnyId::Class(mappings.map_class(class).unwrap_or_else(|| class.clone()))
            }
            AnyId::Method(method) => AnyId::Method(
                mappings
                    .map_method(method)
                    .unwrap_or_else(|| method.clone()),
            ),
            AnyId::Field(field) => {
                AnyId::Field(mappings.map_field(field).unwrap_or_else(|| field.clone()))
            }
        })
        .collect()
}

/// Maps an ordered method list, keeping unmapped entries as-is.
pub fn map_methods(mappings: &dyn Mappings, list: &[MethodId]) -> Vec<MethodId> {
    list.iter()
        .map(|method| {
            mappings
                .map_method(method)
                .unwrap_or_else(|| method.clone())
        })
        .collect()
}

/// Default mapping which translates nothing.
///
/// Every identifier maps to itself and `obfuscate` is the identity. This is
/// the fallback when no real obfuscation mapping is supplied.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultMappings;

impl Mappings for DefaultMappings {
    fn map_class(&self, class: &ClassId) -> Option<ClassId> {
        Some(class.clone())
    }

    fn map_method(&self, method: &MethodId) -> Option<MethodId> {
        Some(method.clone())
    }

    fn map_field(&self, field: &FieldId) -> Option<FieldId> {
        Some(field.clone())
    }

    fn unmap_method(&self, method: &MethodId) -> Option<MethodId> {
        Some(method.clone())
    }

    fn obfuscate(&self, text: &str) -> String {
        text.to_string()
    }
}
