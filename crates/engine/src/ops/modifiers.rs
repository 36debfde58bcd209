//! Modifier operations: visibility, volatility, finality and
//! synchronization flags.

use super::{attr, has};
use crate::registry::{Attrs, OpContext, OperationDescriptor, Target};
use crate::{Error, Result};
use classpatch_core::code::CodeBody;
use classpatch_core::opcode::Opcode;
use classpatch_core::unit::{ClassUnit, MemberId, MemberKind, Modifiers};
use tracing::{debug, error, warn};

pub(crate) fn descriptors() -> Vec<OperationDescriptor> {
    vec![
        OperationDescriptor::class("setVolatile", Some(&[]), |_, class, attrs| {
            toggle_field_flag(class, attrs, Modifiers::VOLATILE, true)
        }),
        OperationDescriptor::class("unsetVolatile", Some(&[]), |_, class, attrs| {
            toggle_field_flag(class, attrs, Modifiers::VOLATILE, false)
        }),
        OperationDescriptor::class("final", Some(&[]), |_, class, attrs| {
            toggle_field_flag(class, attrs, Modifiers::FINAL, true)
        }),
        OperationDescriptor::either("unsetFinal", Some(&[]), unset_final),
        OperationDescriptor::either("setPublic", Some(&[]), set_public),
        OperationDescriptor::either("setSynchronized", Some(&[]), set_synchronized),
        OperationDescriptor::member("unsetSynchronized", None, unset_synchronized),
    ]
}

/// Sets or clears a flag on the named field, or on every primitive-typed
/// declared field when no field is named.
fn toggle_field_flag(
    class: &mut ClassUnit,
    attrs: &Attrs,
    flag: u32,
    set: bool,
) -> Result<Option<ClassUnit>> {
    match attr(attrs, "field") {
        Some(field) => {
            let decl = class.field_mut(field)?;
            decl.modifiers = apply_flag(decl.modifiers, flag, set);
        }
        None => class.for_each_field_mut(|decl| {
            if decl.is_primitive() {
                decl.modifiers = apply_flag(decl.modifiers, flag, set);
            }
        }),
    }
    Ok(None)
}

fn apply_flag(modifiers: Modifiers, flag: u32, set: bool) -> Modifiers {
    if set {
        modifiers.with(flag)
    } else {
        modifiers.without(flag)
    }
}

fn unset_final(_ctx: &OpContext, target: Target<'_>, attrs: &Attrs) -> Result<()> {
    match (attr(attrs, "field"), target) {
        (Some(field), Target::Class(class)) => {
            let decl = class.field_mut(field)?;
            decl.modifiers = decl.modifiers.without(Modifiers::FINAL);
        }
        (Some(_), Target::Member(..)) => {
            return Err(Error::InvalidAttribute {
                op: "unsetFinal",
                msg: "the field attribute requires a class target".to_string(),
            })
        }
        (None, Target::Class(class)) => {
            let opened = class.modifiers.as_public();
            class.set_modifiers(opened);
            for id in class.declared_constructors() {
                let constructor = class.member_mut(id)?;
                constructor.set_modifiers(constructor.modifiers().as_public());
            }
        }
        (None, Target::Member(class, id)) => {
            let member = class.member_mut(id)?;
            member.set_modifiers(member.modifiers().without(Modifiers::FINAL));
        }
    }
    Ok(())
}

fn set_public(_ctx: &OpContext, target: Target<'_>, attrs: &Attrs) -> Result<()> {
    match (attr(attrs, "field"), target) {
        (Some(field), Target::Class(class)) => {
            let decl = class.field_mut(field)?;
            decl.modifiers = decl.modifiers.as_public();
        }
        (Some(_), Target::Member(..)) => {
            return Err(Error::InvalidAttribute {
                op: "setPublic",
                msg: "the field attribute requires a class target".to_string(),
            })
        }
        (None, Target::Class(class)) => {
            let opened = class.modifiers.as_public();
            class.set_modifiers(opened);
            if has(attrs, "all") {
                class.for_each_field_mut(|decl| decl.modifiers = decl.modifiers.as_public());
                let ids: Vec<MemberId> = class.members().iter().map(|m| m.id()).collect();
                for id in ids {
                    let member = class.member_mut(id)?;
                    member.set_modifiers(member.modifiers().as_public());
                }
            } else {
                for id in class.declared_constructors() {
                    let constructor = class.member_mut(id)?;
                    constructor.set_modifiers(constructor.modifiers().as_public());
                }
            }
        }
        (None, Target::Member(class, id)) => {
            let member = class.member_mut(id)?;
            member.set_modifiers(member.modifiers().as_public());
        }
    }
    Ok(())
}

fn set_synchronized(_ctx: &OpContext, target: Target<'_>, attrs: &Attrs) -> Result<()> {
    let field = attr(attrs, "field").map(str::to_string);
    match target {
        Target::Member(class, id) => {
            // Constructors and static initializers cannot be synchronized.
            if class.member(id)?.kind == MemberKind::Method {
                synchronize(class, id, field.as_deref())?;
            }
        }
        Target::Class(class) => {
            let want_static = has(attrs, "static");
            let mut synchronized = 0;
            for id in class.declared_methods() {
                let is_static = class.member(id)?.modifiers().contains(Modifiers::STATIC);
                if is_static == want_static {
                    synchronize(class, id, field.as_deref())?;
                    synchronized += 1;
                }
            }
            if synchronized == 0 {
                error!(
                    class = class.name(),
                    "nothing synchronized - did you forget the 'static' attribute?"
                );
            } else {
                debug!(class = class.name(), synchronized, "synchronized methods");
            }
        }
    }
    Ok(())
}

/// Without a field, flips the SYNCHRONIZED flag. With one, the method is
/// renamed aside and a wrapper of the original name synchronizes on the
/// field before delegating.
fn synchronize(class: &mut ClassUnit, id: MemberId, field: Option<&str>) -> Result<()> {
    let Some(field) = field else {
        let member = class.member_mut(id)?;
        if member.modifiers().contains(Modifiers::SYNCHRONIZED) {
            warn!(member = %member.signature_string(), "method is already synchronized");
        } else {
            member.set_modifiers(member.modifiers().with(Modifiers::SYNCHRONIZED));
        }
        return Ok(());
    };

    let (name, parameters, return_type, modifiers) = {
        let member = class.member(id)?;
        (
            member.name.clone(),
            member.parameters.clone(),
            member.return_type.clone(),
            member.modifiers(),
        )
    };
    let mut suffix = 0;
    while class
        .members()
        .iter()
        .any(|m| m.name == format!("{name}_sync{suffix}"))
    {
        suffix += 1;
    }
    let inner_name = format!("{name}_sync{suffix}");
    class.member_mut(id)?.set_name(&inner_name);

    let mut code = CodeBody::new(vec![Opcode::RETURN.as_byte()]);
    code.set_body(Some(&format!(
        "synchronized({field}) {{ return {inner_name}($$); }}"
    )));
    class.add_member(
        MemberKind::Method,
        &name,
        parameters,
        return_type,
        modifiers.without(Modifiers::SYNCHRONIZED),
        code,
    )?;
    Ok(())
}

fn unset_synchronized(
    _ctx: &OpContext,
    class: &mut ClassUnit,
    id: MemberId,
    _attrs: &Attrs,
) -> Result<()> {
    let member = class.member_mut(id)?;
    member.set_modifiers(member.modifiers().without(Modifiers::SYNCHRONIZED));
    Ok(())
}
