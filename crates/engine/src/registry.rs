//! Statically built operation registry.
//!
//! Each available operation is described once, at engine construction, by an
//! [`OperationDescriptor`]: its name, required attributes, applicability
//! shape and entry point. The entry point is a tagged closure variant
//! (class-level, member-level, or either), so dispatch is a `match`, not
//! runtime introspection.

use crate::{Error, Result};
use classpatch_core::source::ClassSource;
use classpatch_core::mappings::Mappings;
use classpatch_core::unit::{ClassUnit, MemberId};
use std::collections::HashMap;
use std::sync::Arc;

/// Attribute map of one operation invocation.
pub type Attrs = HashMap<String, String>;

/// Shared collaborators every operation may use.
pub struct OpContext {
    /// The class-model provider.
    pub source: Arc<dyn ClassSource>,
    /// The identifier mapping.
    pub mappings: Arc<dyn Mappings>,
}

/// Target handed to an `Either` operation.
pub enum Target<'a> {
    /// The whole class.
    Class(&'a mut ClassUnit),
    /// One member of the class.
    Member(&'a mut ClassUnit, MemberId),
}

/// Class-level entry point. Returning `Ok(Some(unit))` replaces the class
/// threaded through the remaining invocations of the entry.
pub type ClassOp =
    Box<dyn Fn(&OpContext, &mut ClassUnit, &Attrs) -> Result<Option<ClassUnit>> + Send + Sync>;

/// Member-level entry point.
pub type MemberOp =
    Box<dyn Fn(&OpContext, &mut ClassUnit, MemberId, &Attrs) -> Result<()> + Send + Sync>;

/// Entry point accepting either shape.
pub type EitherOp = Box<dyn Fn(&OpContext, Target<'_>, &Attrs) -> Result<()> + Send + Sync>;

/// The operation's applicability shape and implementation.
pub enum OpApply {
    Class(ClassOp),
    Member(MemberOp),
    Either(EitherOp),
}

/// One registered operation.
pub struct OperationDescriptor {
    /// Operation name, matched against invocation tags.
    pub name: &'static str,
    /// Required attribute keys; `None` means the operation takes no
    /// attribute map at all.
    pub required: Option<Vec<&'static str>>,
    /// With an empty method-list body, target constructors individually
    /// instead of the whole class.
    pub empty_constructor: bool,
    /// Entry point.
    pub apply: OpApply,
}

impl OperationDescriptor {
    /// Builds a class-level descriptor.
    pub fn class(
        name: &'static str,
        required: Option<&[&'static str]>,
        apply: impl Fn(&OpContext, &mut ClassUnit, &Attrs) -> Result<Option<ClassUnit>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            name,
            required: required.map(<[_]>::to_vec),
            empty_constructor: true,
            apply: OpApply::Class(Box::new(apply)),
        }
    }

    /// Builds a member-level descriptor.
    pub fn member(
        name: &'static str,
        required: Option<&[&'static str]>,
        apply: impl Fn(&OpContext, &mut ClassUnit, MemberId, &Attrs) -> Result<()>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            name,
            required: required.map(<[_]>::to_vec),
            empty_constructor: true,
            apply: OpApply::Member(Box::new(apply)),
        }
    }

    /// Builds a descriptor that accepts a class or a member. These never
    /// default to per-constructor selection.
    pub fn either(
        name: &'static str,
        required: Option<&[&'static str]>,
        apply: impl Fn(&OpContext, Target<'_>, &Attrs) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            required: required.map(<[_]>::to_vec),
            empty_constructor: false,
            apply: OpApply::Either(Box::new(apply)),
        }
    }

    /// Whether the operation runs against the whole class rather than a
    /// member.
    pub fn is_class_patch(&self) -> bool {
        matches!(self.apply, OpApply::Class(_))
    }
}

/// Name → descriptor table, built once at engine construction.
pub struct Registry {
    operations: HashMap<&'static str, OperationDescriptor>,
}

impl Registry {
    /// Builds the table; a duplicate name is a fatal construction error.
    pub fn new(descriptors: Vec<OperationDescriptor>) -> Result<Self> {
        let mut operations = HashMap::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let name = descriptor.name;
            if operations.insert(name, descriptor).is_some() {
                return Err(Error::DuplicateOperation(name.to_string()));
            }
        }
        Ok(Self { operations })
    }

    pub fn get(&self, name: &str) -> Option<&OperationDescriptor> {
        self.operations.get(name)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
