//! Constant pool for the class model.
//!
//! Indices are 1-based as in the class file format; index 0 is never valid.
//! Adders deduplicate structurally equal entries so repeated references to
//! the same member share one slot.

use crate::result::{Error, Result};
use serde::{Deserialize, Serialize};

/// A symbolic member reference: owning class, member name and descriptor.
///
/// Descriptors are kept in the engine's readable spelling: a plain type
/// name for fields, `(types)ret` for methods.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRefEntry {
    /// Owning class name.
    pub class: String,
    /// Member name.
    pub name: String,
    /// Readable descriptor.
    pub descriptor: String,
}

/// One constant pool entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolEntry {
    Utf8(String),
    Class { name: String },
    FieldRef(MemberRefEntry),
    MethodRef(MemberRefEntry),
    InterfaceMethodRef(MemberRefEntry),
}

/// Growable, deduplicating constant pool.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstPool {
    entries: Vec<PoolEntry>,
}

impl ConstPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries (the highest valid index).
    pub fn len(&self) -> u16 {
        self.entries.len() as u16
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn add(&mut self, entry: PoolEntry) -> u16 {
        if let Some(pos) = self.entries.iter().position(|e| *e == entry) {
            return (pos + 1) as u16;
        }
        self.entries.push(entry);
        self.entries.len() as u16
    }

    pub fn add_utf8(&mut self, text: &str) -> u16 {
        self.add(PoolEntry::Utf8(text.to_string()))
    }

    pub fn add_class(&mut self, name: &str) -> u16 {
        self.add(PoolEntry::Class {
            name: name.to_string(),
        })
    }

    pub fn add_field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.add(PoolEntry::FieldRef(member_ref(class, name, descriptor)))
    }

    pub fn add_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.add(PoolEntry::MethodRef(member_ref(class, name, descriptor)))
    }

    pub fn add_interface_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.add(PoolEntry::InterfaceMethodRef(member_ref(
            class, name, descriptor,
        )))
    }

    /// Checked entry lookup.
    pub fn entry(&self, index: u16) -> Result<&PoolEntry> {
        if index == 0 {
            return Err(Error::PoolIndex(index));
        }
        self.entries
            .get(index as usize - 1)
            .ok_or(Error::PoolIndex(index))
    }

    /// Resolves a `Class` entry's name.
    pub fn class_name(&self, index: u16) -> Result<&str> {
        match self.entry(index)? {
            PoolEntry::Class { name } => Ok(name),
            _ => Err(Error::PoolType {
                index,
                expected: "class",
            }),
        }
    }

    /// Resolves a `FieldRef` entry.
    pub fn field_ref(&self, index: u16) -> Result<&MemberRefEntry> {
        match self.entry(index)? {
            PoolEntry::FieldRef(entry) => Ok(entry),
            _ => Err(Error::PoolType {
                index,
                expected: "field reference",
            }),
        }
    }

    /// Resolves a `MethodRef` entry.
    pub fn method_ref(&self, index: u16) -> Result<&MemberRefEntry> {
        match self.entry(index)? {
            PoolEntry::MethodRef(entry) => Ok(entry),
            _ => Err(Error::PoolType {
                index,
                expected: "method reference",
            }),
        }
    }

    /// Resolves an `InterfaceMethodRef` entry.
    pub fn interface_method_ref(&self, index: u16) -> Result<&MemberRefEntry> {
        match self.entry(index)? {
            PoolEntry::InterfaceMethodRef(entry) => Ok(entry),
            _ => Err(Error::PoolType {
                index,
                expected: "interface method reference",
            }),
        }
    }

    /// Resolves either flavor of method reference, as call-site scans do not
    /// care which invoke opcode produced the index.
    pub fn any_method_ref(&self, index: u16) -> Result<&MemberRefEntry> {
        match self.entry(index)? {
            PoolEntry::MethodRef(entry) | PoolEntry::InterfaceMethodRef(entry) => Ok(entry),
            _ => Err(Error::PoolType {
                index,
                expected: "method reference",
            }),
        }
    }
}

fn member_ref(class: &str, name: &str, descriptor: &str) -> MemberRefEntry {
    MemberRefEntry {
        class: class.to_string(),
        name: name.to_string(),
        descriptor: descriptor.to_string(),
    }
}
