//! Normalized patch document model and its load pipeline.
//!
//! A raw document string becomes ordered [`PatchGroup`]s of
//! [`ClassPatchEntry`]s, each holding the ordered [`OperationInvocation`]s
//! to run against one class. Loading applies the identifier mapping to every
//! attribute value, element text and discovered method or field reference,
//! so downstream dispatch only ever sees target-namespace names.

use crate::element::Element;
use crate::json;
use crate::result::{Error, Result};
use crate::xml;
use classpatch_core::ident::{ClassId, FieldId, MethodId};
use classpatch_core::mappings::{map_methods, Mappings};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error};

/// Separator that lets one class element target several classes.
const ID_SEPARATOR: &str = "  ";

/// Selects every method, constructor and the static initializer.
pub const SELECT_ALL: &str = "^all^";

/// Selects the static initializer.
pub const SELECT_STATIC: &str = "^static^";

/// One named, attributed, optionally-bodied operation to apply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationInvocation {
    /// Operation name (the element's tag).
    pub name: String,
    /// Attribute values by case-sensitive key.
    pub attributes: HashMap<String, String>,
    /// Trimmed text body: a method list, a selection sentinel, or empty.
    pub body: String,
}

impl OperationInvocation {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }
}

/// All operations targeting one class, in document order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassPatchEntry {
    /// Effective (target-namespace) class id, the cache and lookup key.
    pub class: ClassId,
    /// Canonical id as written in the document.
    pub canonical: ClassId,
    /// Ordered operations; later ones see the effects of earlier ones.
    pub operations: Vec<OperationInvocation>,
}

/// A named ordered sequence of class patch entries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchGroup {
    /// Group name (the group element's tag).
    pub name: String,
    /// One-class-at-a-time caching when true (the default); whole-group
    /// computation otherwise.
    pub on_demand: bool,
    pub entries: Vec<ClassPatchEntry>,
}

/// Parses a raw document string into an element tree, detecting the format
/// from its first non-whitespace character.
pub fn parse_document(text: &str) -> Result<Element> {
    match text.trim_start().chars().next() {
        None => Err(Error::Empty),
        Some('<') => xml::parse(text),
        Some('[' | '{') => json::parse(text),
        Some(other) => Err(Error::UnknownFormat(other)),
    }
}

/// Builds the normalized groups from a parsed document.
///
/// `properties` resolves `requireProperty` gates, once per group, at load
/// time. Per-attribute resolution problems are logged and skipped; a class
/// entry that cannot be built at all fails the whole load.
pub fn load_groups(
    mut root: Element,
    mappings: &dyn Mappings,
    properties: &dyn Fn(&str) -> bool,
) -> Result<Vec<PatchGroup>> {
    let mut groups = Vec::new();
    for group_element in &mut root.children {
        if let Some(required) = group_element.attr("requireProperty") {
            if !required.is_empty() && !properties(required) {
                debug!(
                    group = %group_element.tag,
                    property = required,
                    "skipping group, required property not set"
                );
                continue;
            }
        }
        obfuscate_descendants(group_element, mappings);
        expand_multi_ids(group_element);

        let on_demand = group_element.attr("onDemand") != Some("false");
        let mut entries = Vec::new();
        for class_element in &group_element.children {
            entries.push(build_entry(class_element, mappings)?);
        }
        debug!(
            group = %group_element.tag,
            entries = entries.len(),
            on_demand,
            "compiled patch group"
        );
        groups.push(PatchGroup {
            name: group_element.tag.clone(),
            on_demand,
            entries,
        });
    }
    Ok(groups)
}

/// Obfuscation pass: every leaf's text and every element's attribute values,
/// exactly once per element, over the whole subtree.
fn obfuscate_descendants(element: &mut Element, mappings: &dyn Mappings) {
    for child in &mut element.children {
        if child.is_leaf() {
            if !child.text.is_empty() {
                child.text = mappings.obfuscate(&child.text);
            }
        } else {
            obfuscate_descendants(child, mappings);
        }
        for value in child.attributes.values_mut() {
            *value = mappings.obfuscate(value);
        }
    }
}

/// Multi-id expansion: a child whose `id` splits into several double-space
/// separated tokens is replaced by one deep clone per token, in place.
fn expand_multi_ids(group_element: &mut Element) {
    let children = std::mem::take(&mut group_element.children);
    for child in children {
        let ids: Vec<&str> = child
            .attr("id")
            .unwrap_or("")
            .split(ID_SEPARATOR)
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .collect();
        if ids.len() > 1 {
            for id in ids {
                let mut clone = child.clone();
                clone.set_attr("id", id);
                group_element.children.push(clone);
            }
        } else {
            group_element.children.push(child);
        }
    }
}

fn build_entry(class_element: &Element, mappings: &dyn Mappings) -> Result<ClassPatchEntry> {
    let id = class_element.attr("id").ok_or_else(|| Error::MissingId {
        tag: class_element.tag.clone(),
    })?;
    let canonical = ClassId::new(id);
    let class = mappings
        .map_class(&canonical)
        .unwrap_or_else(|| canonical.clone());

    let mut operations = Vec::new();
    for operation_element in &class_element.children {
        let mut invocation = OperationInvocation {
            name: operation_element.tag.clone(),
            attributes: operation_element.attributes.clone(),
            body: operation_element.trimmed_text().to_string(),
        };

        let canonical_methods = if invocation.body.is_empty()
            || invocation.body == SELECT_ALL
            || invocation.body == SELECT_STATIC
        {
            Vec::new()
        } else {
            let list = MethodId::parse_list(&canonical.name, &invocation.body).map_err(|e| {
                Error::ClassEntry {
                    class: canonical.name.clone(),
                    msg: e.to_string(),
                }
            })?;
            if let Some(first) = list.first() {
                // Canonical short name, kept for diagnostics after mapping.
                invocation
                    .attributes
                    .insert("deobf".to_string(), first.short_name().to_string());
            }
            invocation.body = MethodId::unparse_list(&map_methods(mappings, &list));
            list
        };

        resolve_field_attribute(&mut invocation, &canonical_methods, &class.name, mappings);
        operations.push(invocation);
    }

    Ok(ClassPatchEntry {
        class,
        canonical,
        operations,
    })
}

/// Rewrites a `field` attribute into the target namespace.
///
/// Handles the optional `this.` prefix, dotted nested paths, and `$N`
/// positional parameter references resolved against the invocation's method
/// list. Resolution failures abandon this one attribute and log; the rest of
/// the entry continues.
fn resolve_field_attribute(
    invocation: &mut OperationInvocation,
    canonical_methods: &[MethodId],
    class_name: &str,
    mappings: &dyn Mappings,
) {
    let Some(raw) = invocation.attr("field") else {
        return;
    };
    if raw.is_empty() {
        return;
    }
    let raw = raw.to_string();

    let (mut prefix, mut field) = match raw.strip_prefix("this.") {
        Some(rest) => ("this.".to_string(), rest.to_string()),
        None => (String::new(), raw.clone()),
    };
    let mut owner = class_name.to_string();
    let mut after = String::new();

    if let Some(dot) = field.find('.') {
        after = field[dot..].to_string();
        field.truncate(dot);
        if field.starts_with('$') && prefix.is_empty() {
            let Some(position) = field[1..].parse::<usize>().ok().filter(|n| *n > 0) else {
                error!(field = raw, "invalid parameter reference in field attribute");
                return;
            };
            let parameters = shared_parameter_types(canonical_methods, mappings);
            let index = position - 1;
            if index >= parameters.len() {
                if !parameters.is_empty() {
                    error!(
                        field = raw,
                        index,
                        available = parameters.len(),
                        "can not obfuscate parameter field, index out of range"
                    );
                }
                return;
            }
            let Some(parameter_type) = parameters[index].clone() else {
                error!(
                    field = raw,
                    "can not obfuscate parameter field automatically, parameter does not \
                     have a single type across the methods used in this patch"
                );
                return;
            };
            owner = parameter_type;
            prefix = format!("{field}.");
            field = after[1..].to_string();
            after.clear();
        }
    }

    if let Some(mapped) = mappings.map_field(&FieldId::new(owner, field)) {
        invocation
            .attributes
            .insert("field".to_string(), format!("{prefix}{}{after}", mapped.name));
    }
}

/// Per-position parameter types shared by every method in the list; `None`
/// marks a position where the methods disagree.
fn shared_parameter_types(
    canonical_methods: &[MethodId],
    mappings: &dyn Mappings,
) -> Vec<Option<String>> {
    let mut shared: Vec<Option<String>> = Vec::new();
    for method in canonical_methods {
        // Round-trip through the mapping to normalize the canonical form.
        let resolved = mappings
            .map_method(method)
            .and_then(|mapped| mappings.unmap_method(&mapped))
            .unwrap_or_else(|| method.clone());
        let parameters = resolved.parameters.unwrap_or_default();
        for (i, parameter) in parameters.into_iter().enumerate() {
            if shared.len() <= i {
                shared.push(Some(parameter));
            } else if shared[i].as_deref() != Some(parameter.as_str()) {
                shared[i] = None;
            }
        }
    }
    shared
}
