//! Whole-class operations: replacement units and static initializers.

use super::required;
use crate::registry::{Attrs, OpContext, OperationDescriptor};
use crate::Result;
use classpatch_core::unit::{ClassUnit, Modifiers};
use tracing::debug;

pub(crate) fn descriptors() -> Vec<OperationDescriptor> {
    vec![
        OperationDescriptor::class("replaceClass", Some(&["class"]), replace_class),
        OperationDescriptor::class(
            "addStaticInitializer",
            Some(&["code"]),
            add_static_initializer,
        ),
    ]
}

/// Replaces the target class with another unit from the provider, renamed to
/// the target's identity. The replacement is threaded through the remaining
/// invocations of the entry.
fn replace_class(
    ctx: &OpContext,
    class: &mut ClassUnit,
    attrs: &Attrs,
) -> Result<Option<ClassUnit>> {
    let from = required(attrs, "replaceClass", "class")?;
    let target_name = class.name().to_string();
    let mut replacement = ctx.source.get(from)?;
    debug!(from, target = %target_name, "replacing class");
    replacement.set_name(&target_name);
    let opened = replacement.modifiers.without(Modifiers::ABSTRACT);
    replacement.set_modifiers(opened);
    Ok(Some(replacement))
}

/// Appends a code block to the static initializer, creating one if needed.
fn add_static_initializer(
    _ctx: &OpContext,
    class: &mut ClassUnit,
    attrs: &Attrs,
) -> Result<Option<ClassUnit>> {
    let code = required(attrs, "addStaticInitializer", "code")?.to_string();
    let initializer = class.make_static_initializer();
    class
        .member_mut(initializer)?
        .code
        .insert_after(&code, false);
    Ok(None)
}
