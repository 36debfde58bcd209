//! Class, method and field identifiers.
//!
//! Identifiers are plain value types: a canonical name plus, for methods, an
//! optional signature (ordered parameter type names and a return type). Two
//! identifiers are equal iff name and signature match exactly; no
//! canonicalization of type spellings is performed.

use crate::result::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a class by fully qualified name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassId {
    /// Fully qualified class name, dot separated.
    pub name: String,
}

impl ClassId {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Identifies a method by declaring class, name and optional signature.
///
/// A `None` signature is an erased reference: it matches any overload with
/// the same name. When present, `parameters` is the ordered list of
/// parameter type names and `return_type` the optional return type suffix.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodId {
    /// Declaring class name.
    pub class: String,
    /// Method name without signature.
    pub name: String,
    /// Ordered parameter type names, `None` for an erased reference.
    pub parameters: Option<Vec<String>>,
    /// Return type name when the signature spells one.
    pub return_type: Option<String>,
}

impl MethodId {
    /// An erased reference that matches any overload of `name`.
    pub fn erased(class: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
            parameters: None,
            return_type: None,
        }
    }

    /// Name without signature, for display and diagnostics.
    pub fn short_name(&self) -> &str {
        &self.name
    }

    /// Parses one method-list entry: `name`, `name(a,b)` or `name(a,b)ret`.
    pub fn parse(class: &str, entry: &str) -> Result<MethodId> {
        let invalid = |msg: &str| Error::InvalidIdentifier {
            raw: entry.to_string(),
            msg: msg.to_string(),
        };
        let entry = entry.trim();
        if entry.is_empty() {
            return Err(invalid("empty method entry"));
        }
        let Some(open) = entry.find('(') else {
            if entry.contains(')') {
                return Err(invalid("unmatched `)`"));
            }
            return Ok(MethodId::erased(class, entry));
        };
        let close = entry.rfind(')').ok_or_else(|| invalid("unmatched `(`"))?;
        if close < open {
            return Err(invalid("`)` before `(`"));
        }
        let name = &entry[..open];
        if name.is_empty() {
            return Err(invalid("missing method name"));
        }
        let parameters = entry[open + 1..close]
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        let return_type = match entry[close + 1..].trim() {
            "" => None,
            ret => Some(ret.to_string()),
        };
        Ok(MethodId {
            class: class.to_string(),
            name: name.to_string(),
            parameters: Some(parameters),
            return_type,
        })
    }

    /// Parses a whitespace-separated method list relative to `class`.
    pub fn parse_list(class: &str, text: &str) -> Result<Vec<MethodId>> {
        text.split_whitespace()
            .map(|entry| MethodId::parse(class, entry))
            .collect()
    }

    /// Serializes a method list back to its text form.
    pub fn unparse_list(methods: &[MethodId]) -> String {
        let entries: Vec<String> = methods.iter().map(MethodId::entry_string).collect();
        entries.join(" ")
    }

    /// The single-entry text form, without the declaring class.
    pub fn entry_string(&self) -> String {
        match &self.parameters {
            None => self.name.clone(),
            Some(parameters) => {
                let ret = self.return_type.as_deref().unwrap_or("");
                format!("{}({}){}", self.name, parameters.join(","), ret)
            }
        }
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.class, self.entry_string())
    }
}

/// Identifies a field by owning type and name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldId {
    /// Name of the type that owns (or types) the field.
    pub class: String,
    /// Field name.
    pub name: String,
}

impl FieldId {
    pub fn new(class: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class, self.name)
    }
}
