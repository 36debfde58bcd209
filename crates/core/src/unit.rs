//! Editable in-memory representation of one compiled class.
//!
//! A [`ClassUnit`] owns its constant pool, declared fields and members, and
//! tracks whether anything mutated it since it was produced by the class
//! source, since the executor only caches serialized bytes for units that
//! changed. Members carry stable ids so removing one never invalidates
//! references to its siblings.

use crate::code::CodeBody;
use crate::ident::MethodId;
use crate::pool::ConstPool;
use crate::result::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Access and property flags, using the class file bit values.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers(pub u32);

impl Modifiers {
    pub const PUBLIC: u32 = 0x0001;
    pub const PRIVATE: u32 = 0x0002;
    pub const PROTECTED: u32 = 0x0004;
    pub const STATIC: u32 = 0x0008;
    pub const FINAL: u32 = 0x0010;
    pub const SYNCHRONIZED: u32 = 0x0020;
    pub const VOLATILE: u32 = 0x0040;
    pub const ABSTRACT: u32 = 0x0400;

    pub fn contains(self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    #[must_use]
    pub fn with(self, flag: u32) -> Modifiers {
        Modifiers(self.0 | flag)
    }

    #[must_use]
    pub fn without(self, flag: u32) -> Modifiers {
        Modifiers(self.0 & !flag)
    }

    /// Clears the visibility bits and sets PUBLIC.
    #[must_use]
    pub fn as_public(self) -> Modifiers {
        Modifiers(
            (self.0 & !(Self::PRIVATE | Self::PROTECTED)) | Self::PUBLIC,
        )
    }
}

/// A declared field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    /// Declared type name.
    pub type_name: String,
    pub modifiers: Modifiers,
    /// Initializer expression recorded by `addField`/`addInitializer`.
    pub initializer: Option<String>,
}

impl FieldDecl {
    /// Primitive types never need an object header; several modifier
    /// operations only touch these when no field name is given.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self.type_name.as_str(),
            "boolean" | "byte" | "char" | "short" | "int" | "long" | "float" | "double"
        )
    }
}

/// What kind of executable member this is.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberKind {
    Method,
    Constructor,
    StaticInit,
}

/// Stable handle to a member within its class unit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberId(pub u32);

/// A method, constructor or static initializer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    id: MemberId,
    pub kind: MemberKind,
    pub name: String,
    pub parameters: Vec<String>,
    pub return_type: Option<String>,
    modifiers: Modifiers,
    pub code: CodeBody,
    dirty: bool,
}

impl Member {
    pub fn id(&self) -> MemberId {
        self.id
    }

    /// `name(param,param)`, the display form used in logs.
    pub fn signature_string(&self) -> String {
        format!("{}({})", self.name, self.parameters.join(","))
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
        self.dirty = true;
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn set_modifiers(&mut self, modifiers: Modifiers) {
        self.modifiers = modifiers;
        self.dirty = true;
    }

    /// True once the member itself (not only its code) was edited.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// Editable class: pool, fields, members, modifiers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassUnit {
    name: String,
    pub superclass: Option<String>,
    pub modifiers: Modifiers,
    pub pool: ConstPool,
    fields: Vec<FieldDecl>,
    members: Vec<Member>,
    next_member: u32,
    modified: bool,
}

impl ClassUnit {
    pub fn new(name: impl Into<String>, superclass: Option<&str>) -> Self {
        Self {
            name: name.into(),
            superclass: superclass.map(str::to_string),
            modifiers: Modifiers::default(),
            pool: ConstPool::new(),
            fields: Vec::new(),
            members: Vec::new(),
            next_member: 0,
            modified: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renames the class (used when a replacement unit takes over a target's
    /// identity).
    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
        self.modified = true;
    }

    pub fn set_modifiers(&mut self, modifiers: Modifiers) {
        self.modifiers = modifiers;
        self.modified = true;
    }

    // ---- fields ----

    pub fn fields(&self) -> &[FieldDecl] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Result<&FieldDecl> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| Error::FieldNotFound {
                class: self.name.clone(),
                field: name.to_string(),
            })
    }

    /// Mutable field lookup; marks the unit modified on success.
    pub fn field_mut(&mut self, name: &str) -> Result<&mut FieldDecl> {
        let pos = self
            .fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| Error::FieldNotFound {
                class: self.name.clone(),
                field: name.to_string(),
            })?;
        self.modified = true;
        Ok(&mut self.fields[pos])
    }

    /// Applies `f` to every declared field; marks the unit modified.
    pub fn for_each_field_mut(&mut self, mut f: impl FnMut(&mut FieldDecl)) {
        self.modified = true;
        for field in &mut self.fields {
            f(field);
        }
    }

    pub fn add_field(&mut self, field: FieldDecl) {
        self.fields.push(field);
        self.modified = true;
    }

    pub fn remove_field(&mut self, name: &str) -> Result<FieldDecl> {
        let pos = self
            .fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| Error::FieldNotFound {
                class: self.name.clone(),
                field: name.to_string(),
            })?;
        self.modified = true;
        Ok(self.fields.remove(pos))
    }

    // ---- members ----

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn member(&self, id: MemberId) -> Result<&Member> {
        self.members
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| Error::MemberNotFound {
                class: self.name.clone(),
                member: format!("#{}", id.0),
            })
    }

    /// Mutable member lookup. Does not by itself mark the unit modified; the
    /// code buffer and member setters track their own edits.
    pub fn member_mut(&mut self, id: MemberId) -> Result<&mut Member> {
        let class = self.name.clone();
        self.members
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(Error::MemberNotFound {
                class,
                member: format!("#{}", id.0),
            })
    }

    /// Splits the borrow so instruction-stream passes can mutate a member's
    /// code while reading the shared constant pool.
    pub fn member_code_and_pool(&mut self, id: MemberId) -> Result<(&mut CodeBody, &ConstPool)> {
        let class = self.name.clone();
        let pool = &self.pool;
        let member = self
            .members
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(Error::MemberNotFound {
                class,
                member: format!("#{}", id.0),
            })?;
        Ok((&mut member.code, pool))
    }

    pub fn declared_methods(&self) -> Vec<MemberId> {
        self.members_of(MemberKind::Method)
    }

    pub fn declared_constructors(&self) -> Vec<MemberId> {
        self.members_of(MemberKind::Constructor)
    }

    pub fn static_initializer(&self) -> Option<MemberId> {
        self.members
            .iter()
            .find(|m| m.kind == MemberKind::StaticInit)
            .map(|m| m.id)
    }

    fn members_of(&self, kind: MemberKind) -> Vec<MemberId> {
        self.members
            .iter()
            .filter(|m| m.kind == kind)
            .map(|m| m.id)
            .collect()
    }

    /// Adds a member, rejecting exact name + parameter duplicates.
    pub fn add_member(
        &mut self,
        kind: MemberKind,
        name: &str,
        parameters: Vec<String>,
        return_type: Option<String>,
        modifiers: Modifiers,
        code: CodeBody,
    ) -> Result<MemberId> {
        if self
            .members
            .iter()
            .any(|m| m.kind == kind && m.name == name && m.parameters == parameters)
        {
            return Err(Error::DuplicateMember {
                class: self.name.clone(),
                member: format!("{}({})", name, parameters.join(",")),
            });
        }
        let id = MemberId(self.next_member);
        self.next_member += 1;
        self.members.push(Member {
            id,
            kind,
            name: name.to_string(),
            parameters,
            return_type,
            modifiers,
            code,
            dirty: false,
        });
        self.modified = true;
        Ok(id)
    }

    pub fn remove_member(&mut self, id: MemberId) -> Result<Member> {
        let pos = self
            .members
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| Error::MemberNotFound {
                class: self.name.clone(),
                member: format!("#{}", id.0),
            })?;
        self.modified = true;
        Ok(self.members.remove(pos))
    }

    /// Returns the static initializer, creating an empty one when absent.
    pub fn make_static_initializer(&mut self) -> MemberId {
        if let Some(id) = self.static_initializer() {
            return id;
        }
        let id = MemberId(self.next_member);
        self.next_member += 1;
        self.members.push(Member {
            id,
            kind: MemberKind::StaticInit,
            name: "<clinit>".to_string(),
            parameters: Vec::new(),
            return_type: None,
            modifiers: Modifiers::default().with(Modifiers::STATIC),
            code: CodeBody::new(vec![crate::opcode::Opcode::RETURN.as_byte()]),
            dirty: false,
        });
        self.modified = true;
        id
    }

    /// Resolves a method reference: exact name plus, when the reference
    /// carries a signature, an exact parameter-type match.
    pub fn find_method(&self, reference: &MethodId) -> Result<MemberId> {
        self.members
            .iter()
            .filter(|m| m.kind == MemberKind::Method && m.name == reference.name)
            .find(|m| match &reference.parameters {
                None => true,
                Some(parameters) => &m.parameters == parameters,
            })
            .map(|m| m.id)
            .ok_or_else(|| Error::MemberNotFound {
                class: self.name.clone(),
                member: reference.entry_string(),
            })
    }

    /// True once any operation changed the unit: structure, modifiers,
    /// member code or injected fragments.
    pub fn is_modified(&self) -> bool {
        self.modified
            || self
                .members
                .iter()
                .any(|m| m.dirty || m.code.is_mutated())
    }

    /// Resets every mutation flag. Class sources call this when handing out
    /// a freshly built unit so construction edits do not count as patches.
    pub fn mark_clean(&mut self) {
        self.modified = false;
        for member in &mut self.members {
            member.dirty = false;
            member.code.mark_clean();
        }
    }

    /// Deterministic byte form of the whole unit, reflecting every edit.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"CPU\x01");
        push_str(&mut out, &self.name);
        push_opt_str(&mut out, self.superclass.as_deref());
        push_u32(&mut out, self.modifiers.0);
        push_u32(&mut out, self.fields.len() as u32);
        for field in &self.fields {
            push_str(&mut out, &field.name);
            push_str(&mut out, &field.type_name);
            push_u32(&mut out, field.modifiers.0);
            push_opt_str(&mut out, field.initializer.as_deref());
        }
        push_u32(&mut out, self.members.len() as u32);
        for member in &self.members {
            push_u32(&mut out, member.kind as u32);
            push_str(&mut out, &member.name);
            push_u32(&mut out, member.parameters.len() as u32);
            for parameter in &member.parameters {
                push_str(&mut out, parameter);
            }
            push_opt_str(&mut out, member.return_type.as_deref());
            push_u32(&mut out, member.modifiers.0);
            push_u32(&mut out, member.code.len() as u32);
            out.extend_from_slice(member.code.bytes());
            push_u32(&mut out, member.code.handlers().len() as u32);
            for handler in member.code.handlers() {
                push_u32(&mut out, handler.start_pc as u32);
                push_u32(&mut out, handler.end_pc as u32);
                push_u32(&mut out, handler.handler_pc as u32);
                push_opt_str(&mut out, handler.catch_type.as_deref());
            }
            push_u32(&mut out, member.code.fragments().len() as u32);
            for fragment in member.code.fragments() {
                push_str(&mut out, &format!("{:?}", fragment.kind));
                push_str(&mut out, &fragment.source);
            }
            push_u32(&mut out, member.code.stack_map().len() as u32);
            for offset in member.code.stack_map() {
                push_u32(&mut out, *offset as u32);
            }
        }
        out
    }
}

impl fmt::Display for ClassUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} fields, {} members)",
            self.name,
            self.fields.len(),
            self.members.len()
        )
    }
}

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn push_str(out: &mut Vec<u8>, text: &str) {
    push_u32(out, text.len() as u32);
    out.extend_from_slice(text.as_bytes());
}

fn push_opt_str(out: &mut Vec<u8>, text: Option<&str>) {
    match text {
        None => push_u32(out, u32::MAX),
        Some(text) => push_str(out, text),
    }
}
