//! Alternate tree-structured document format.
//!
//! A document starting with `[` or `{` is JSON and is converted losslessly
//! into the native element tree before any further processing: objects
//! become elements, scalar values become attributes (the empty string and
//! `null` promote to `"true"`), arrays repeat the parent tag, and a key
//! literally named `target` becomes raw child text instead of a nested
//! element. Payloads wrapped in `"""` triple quotes are escaped into plain
//! JSON strings first so code fragments can be written verbatim.

use crate::element::Element;
use crate::result::{Error, Result};
use serde_json::Value;

/// Converts a JSON document string into the equivalent element tree.
pub fn parse(input: &str) -> Result<Element> {
    let prepared = escape_triple_quotes(input);
    let value: Value = serde_json::from_str(&prepared)?;
    let object = value
        .as_object()
        .ok_or_else(|| Error::JsonShape("top level must be an object".to_string()))?;

    let mut roots = Vec::new();
    for (key, value) in object {
        append_value(&mut roots, key, value)?;
    }
    match roots.len() {
        1 => Ok(roots.remove(0)),
        n => Err(Error::JsonShape(format!(
            "expected exactly one root element, found {n}"
        ))),
    }
}

/// Replaces every `"""..."""` span with a single escaped JSON string.
fn escape_triple_quotes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(open) = rest.find("\"\"\"") {
        let Some(close) = rest[open + 3..].find("\"\"\"") else {
            break;
        };
        out.push_str(&rest[..open]);
        out.push('"');
        for c in rest[open + 3..open + 3 + close].chars() {
            match c {
                '\\' => out.push_str("\\\\"),
                '"' => out.push_str("\\\""),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if (c as u32) < 0x20 => {
                    out.push_str(&format!("\\u{:04x}", c as u32));
                }
                c => out.push(c),
            }
        }
        out.push('"');
        rest = &rest[open + 3 + close + 3..];
    }
    out.push_str(rest);
    out
}

/// Appends the element(s) `key: value` produces under `siblings`.
fn append_value(siblings: &mut Vec<Element>, key: &str, value: &Value) -> Result<()> {
    match value {
        Value::Object(fields) => {
            let mut element = Element::new(key);
            for (child_key, child_value) in fields {
                match child_value {
                    Value::Object(_) | Value::Array(_) => {
                        append_value(&mut element.children, child_key, child_value)?;
                    }
                    scalar if child_key == "target" => {
                        append_text(&mut element, scalar);
                    }
                    scalar => {
                        element.set_attr(child_key, &scalar_string(scalar));
                    }
                }
            }
            siblings.push(element);
        }
        Value::Array(items) => {
            // Arrays repeat the parent tag once per item; a nested array is
            // wrapped in an element of the same name.
            for item in items {
                match item {
                    Value::Array(_) => {
                        let mut wrapper = Element::new(key);
                        append_value(&mut wrapper.children, key, item)?;
                        siblings.push(wrapper);
                    }
                    _ => append_value(siblings, key, item)?,
                }
            }
        }
        scalar => {
            let mut element = Element::new(key);
            append_text(&mut element, scalar);
            siblings.push(element);
        }
    }
    Ok(())
}

fn append_text(element: &mut Element, value: &Value) {
    match value {
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    element.text.push('\n');
                }
                element.text.push_str(&scalar_string(item));
            }
        }
        scalar => element.text.push_str(&scalar_string(scalar)),
    }
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::Null => "true".to_string(),
        Value::String(s) if s.is_empty() => "true".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
