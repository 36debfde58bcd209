//! Native document format reader and writer.
//!
//! The patch document's native format is a small XML subset: nested
//! elements, quoted attributes, character data, the five standard entities,
//! comments and an optional leading declaration. This reader is deliberately
//! minimal (the document layer is a thin boundary, not a general XML
//! implementation) but round-trips everything the engine emits.

use crate::element::Element;
use crate::result::{Error, Result};

/// Parses a document string into its root element.
pub fn parse(input: &str) -> Result<Element> {
    let mut reader = Reader {
        bytes: input.as_bytes(),
        pos: 0,
    };
    reader.skip_misc();
    let root = reader.element()?;
    reader.skip_misc();
    if reader.pos < reader.bytes.len() {
        return Err(reader.err("trailing content after root element"));
    }
    Ok(root)
}

/// Serializes an element tree back to the native format.
///
/// Attributes are written in sorted order so output is deterministic.
pub fn write(element: &Element) -> String {
    let mut out = String::new();
    write_into(element, &mut out);
    out
}

fn write_into(element: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&element.tag);
    let mut names: Vec<&String> = element.attributes.keys().collect();
    names.sort();
    for name in names {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        escape_into(&element.attributes[name], out);
        out.push('"');
    }
    if element.children.is_empty() && element.text.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    escape_into(&element.text, out);
    for child in &element.children {
        write_into(child, out);
    }
    out.push_str("</");
    out.push_str(&element.tag);
    out.push('>');
}

fn escape_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn err(&self, msg: &str) -> Error {
        Error::Parse {
            pos: self.pos,
            msg: msg.to_string(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.bytes[self.pos..].starts_with(prefix.as_bytes())
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Skips whitespace, comments and processing/declaration tags between
    /// nodes.
    fn skip_misc(&mut self) {
        loop {
            self.skip_whitespace();
            if self.starts_with("<!--") {
                match find(self.bytes, self.pos + 4, "-->") {
                    Some(end) => self.pos = end + 3,
                    None => {
                        self.pos = self.bytes.len();
                        return;
                    }
                }
            } else if self.starts_with("<?") {
                match find(self.bytes, self.pos + 2, "?>") {
                    Some(end) => self.pos = end + 2,
                    None => {
                        self.pos = self.bytes.len();
                        return;
                    }
                }
            } else {
                return;
            }
        }
    }

    fn name(&mut self) -> Result<String> {
        let start = self.pos;
        while matches!(
            self.peek(),
            Some(b) if b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b':')
        ) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.err("expected a name"));
        }
        Ok(String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned())
    }

    fn element(&mut self) -> Result<Element> {
        if self.peek() != Some(b'<') {
            return Err(self.err("expected `<`"));
        }
        self.pos += 1;
        let tag = self.name()?;
        let mut element = Element::new(tag);

        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(b'/') => {
                    self.pos += 1;
                    if self.peek() != Some(b'>') {
                        return Err(self.err("expected `>` after `/`"));
                    }
                    self.pos += 1;
                    return Ok(element);
                }
                Some(_) => {
                    let name = self.name()?;
                    self.skip_whitespace();
                    if self.peek() != Some(b'=') {
                        return Err(self.err("expected `=` in attribute"));
                    }
                    self.pos += 1;
                    self.skip_whitespace();
                    let value = self.quoted_value()?;
                    element.attributes.insert(name, value);
                }
                None => return Err(self.err("unterminated start tag")),
            }
        }

        // Content: text runs, children and comments until the close tag.
        loop {
            if self.starts_with("<!--") {
                match find(self.bytes, self.pos + 4, "-->") {
                    Some(end) => self.pos = end + 3,
                    None => return Err(self.err("unterminated comment")),
                }
            } else if self.starts_with("</") {
                self.pos += 2;
                let close = self.name()?;
                if close != element.tag {
                    return Err(self.err("mismatched close tag"));
                }
                self.skip_whitespace();
                if self.peek() != Some(b'>') {
                    return Err(self.err("expected `>` in close tag"));
                }
                self.pos += 1;
                return Ok(element);
            } else if self.peek() == Some(b'<') {
                element.children.push(self.element()?);
            } else if self.peek().is_some() {
                let start = self.pos;
                while matches!(self.peek(), Some(b) if b != b'<') {
                    self.pos += 1;
                }
                let raw = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
                element.text.push_str(&unescape(&raw));
            } else {
                return Err(self.err("unterminated element"));
            }
        }
    }

    fn quoted_value(&mut self) -> Result<String> {
        let quote = match self.peek() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => return Err(self.err("expected quoted attribute value")),
        };
        self.pos += 1;
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b != quote) {
            self.pos += 1;
        }
        if self.peek() != Some(quote) {
            return Err(self.err("unterminated attribute value"));
        }
        let raw = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
        self.pos += 1;
        Ok(unescape(&raw))
    }
}

fn find(bytes: &[u8], from: usize, needle: &str) -> Option<usize> {
    let needle = needle.as_bytes();
    (from..bytes.len().saturating_sub(needle.len() - 1)).find(|&i| bytes[i..].starts_with(needle))
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let replaced = [
            ("&amp;", "&"),
            ("&lt;", "<"),
            ("&gt;", ">"),
            ("&quot;", "\""),
            ("&apos;", "'"),
        ]
        .iter()
        .find(|(entity, _)| rest.starts_with(entity));
        match replaced {
            Some((entity, ch)) => {
                out.push_str(ch);
                rest = &rest[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
