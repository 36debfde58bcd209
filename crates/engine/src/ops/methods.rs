//! Method-body operations: adding, removing, renaming and rewriting members.

use super::{attr, has, int_attr, required, substitute_field};
use crate::registry::{Attrs, OpContext, OperationDescriptor};
use crate::{Error, Result};
use classpatch_core::code::CodeBody;
use classpatch_core::ident::MethodId;
use classpatch_core::opcode::Opcode;
use classpatch_core::result::Error as CoreError;
use classpatch_core::unit::{ClassUnit, MemberId, MemberKind, Modifiers};
use tracing::{debug, warn};

pub(crate) fn descriptors() -> Vec<OperationDescriptor> {
    vec![
        OperationDescriptor::class("addMethod", Some(&["code", "name"]), add_method),
        OperationDescriptor::member("disableMethod", Some(&[]), disable_method),
        OperationDescriptor::member("removeMethod", None, remove_method),
        OperationDescriptor::member("renameMethod", Some(&["name"]), rename_method),
        OperationDescriptor::member("replaceMethod", Some(&[]), replace_method),
        OperationDescriptor::member("insertCodeBefore", Some(&["code"]), insert_code_before),
        OperationDescriptor::member("insertCodeAfter", Some(&["code"]), insert_code_after),
        OperationDescriptor::member(
            "removeCodeUntilOpcode",
            Some(&["opcode"]),
            remove_code_until_opcode,
        ),
        OperationDescriptor::member(
            "catchAndIgnoreExceptions",
            Some(&[]),
            catch_and_ignore_exceptions,
        ),
    ]
}

/// Adds a method with the given name and body fragment. Unlike the original
/// source-compiling form, the signature is spelled in attributes because
/// fragments are opaque here.
fn add_method(_ctx: &OpContext, class: &mut ClassUnit, attrs: &Attrs) -> Result<Option<ClassUnit>> {
    let name = required(attrs, "addMethod", "name")?;
    let code_text = required(attrs, "addMethod", "code")?.to_string();
    let parameters: Vec<String> = attr(attrs, "parameterTypes")
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    let return_type = attr(attrs, "returnType").map(str::to_string);
    let mut modifiers = Modifiers::default().as_public();
    if has(attrs, "static") {
        modifiers = modifiers.with(Modifiers::STATIC);
    }
    let mut code = CodeBody::new(vec![Opcode::RETURN.as_byte()]);
    code.set_body(Some(&code_text));
    match class.add_member(MemberKind::Method, name, parameters, return_type, modifiers, code) {
        Ok(_) => Ok(None),
        Err(CoreError::DuplicateMember { .. }) if has(attrs, "ignoreDuplicate") => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Empties the body. Only sensible for void methods; use `replaceMethod`
/// otherwise.
fn disable_method(
    _ctx: &OpContext,
    class: &mut ClassUnit,
    id: MemberId,
    _attrs: &Attrs,
) -> Result<()> {
    class.member_mut(id)?.code.set_body(None);
    Ok(())
}

fn remove_method(
    _ctx: &OpContext,
    class: &mut ClassUnit,
    id: MemberId,
    _attrs: &Attrs,
) -> Result<()> {
    let removed = class.remove_member(id)?;
    debug!(class = class.name(), member = %removed.signature_string(), "removed method");
    Ok(())
}

fn rename_method(
    _ctx: &OpContext,
    class: &mut ClassUnit,
    id: MemberId,
    attrs: &Attrs,
) -> Result<()> {
    let name = required(attrs, "renameMethod", "name")?.to_string();
    class.member_mut(id)?.set_name(&name);
    Ok(())
}

/// Replaces the member's body, from a fragment or from another class's
/// method of the same (or named) signature.
fn replace_method(
    ctx: &OpContext,
    class: &mut ClassUnit,
    id: MemberId,
    attrs: &Attrs,
) -> Result<()> {
    if let Some(from_class) = attr(attrs, "fromClass") {
        let donor = ctx.source.get(from_class)?;
        let reference = match attr(attrs, "fromMethod") {
            Some(entry) => MethodId::parse(from_class, entry)?,
            None => {
                let member = class.member(id)?;
                MethodId {
                    class: from_class.to_string(),
                    name: member.name.clone(),
                    parameters: Some(member.parameters.clone()),
                    return_type: member.return_type.clone(),
                }
            }
        };
        let donor_member = donor.member(donor.find_method(&reference)?)?.clone();
        let member = class.member_mut(id)?;
        member.code.copy_from(&donor_member.code);
        member.code.rebuild_stack_map()?;
        return Ok(());
    }
    if let Some(code) = attr(attrs, "code") {
        let code = substitute_field(code, attrs);
        class.member_mut(id)?.code.set_body(Some(&code));
        return Ok(());
    }
    Err(Error::InvalidAttribute {
        op: "replaceMethod",
        msg: "missing required attributes (code or fromClass)".to_string(),
    })
}

fn insert_code_before(
    _ctx: &OpContext,
    class: &mut ClassUnit,
    id: MemberId,
    attrs: &Attrs,
) -> Result<()> {
    let code = substitute_field(required(attrs, "insertCodeBefore", "code")?, attrs);
    class.member_mut(id)?.code.insert_before(&code);
    Ok(())
}

fn insert_code_after(
    _ctx: &OpContext,
    class: &mut ClassUnit,
    id: MemberId,
    attrs: &Attrs,
) -> Result<()> {
    let code = substitute_field(required(attrs, "insertCodeAfter", "code")?, attrs);
    let finally = has(attrs, "finally");
    class.member_mut(id)?.code.insert_after(&code, finally);
    Ok(())
}

/// NOPs all code up to the selected occurrence of an opcode. `index` -1
/// removes up to every occurrence, -2 stops after the first.
fn remove_code_until_opcode(
    _ctx: &OpContext,
    class: &mut ClassUnit,
    id: MemberId,
    attrs: &Attrs,
) -> Result<()> {
    let mnemonic = required(attrs, "removeCodeUntilOpcode", "opcode")?;
    let opcode = Opcode::from_mnemonic(mnemonic).ok_or_else(|| Error::InvalidAttribute {
        op: "removeCodeUntilOpcode",
        msg: format!("unknown opcode `{mnemonic}`"),
    })?;
    let remove_index = int_attr(attrs, "index", -1);
    debug!(
        class = class.name(),
        opcode = %opcode,
        remove_index,
        "removing code until opcode"
    );

    let member = class.member_mut(id)?;
    let instructions = member.code.decode()?;
    let mut current = 0i64;
    let mut removed = 0;
    for instruction in &instructions {
        if instruction.op != opcode {
            continue;
        }
        let selected = if remove_index < 0 {
            true
        } else {
            let position = current;
            current += 1;
            position == remove_index
        };
        if !selected {
            continue;
        }
        // NOP through the end of the matched instruction so its operand
        // bytes do not decode as stray instructions afterwards.
        for pc in 0..instruction.next_pc() {
            member.code.write_byte(pc, Opcode::NOP.as_byte())?;
        }
        removed += 1;
        debug!(until = instruction.pc, "removed code");
        if remove_index == -2 {
            break;
        }
    }
    member.code.rebuild_stack_map()?;
    if removed == 0 {
        warn!(
            member = %member.signature_string(),
            opcode = %opcode,
            remove_index,
            "didn't remove until opcode, no matches"
        );
    }
    Ok(())
}

/// Appends a catch-all handler that swallows the configured exception type.
fn catch_and_ignore_exceptions(
    _ctx: &OpContext,
    class: &mut ClassUnit,
    id: MemberId,
    attrs: &Attrs,
) -> Result<()> {
    let code = attr(attrs, "code").unwrap_or("return;");
    let exception = attr(attrs, "exceptionClass").unwrap_or("java.lang.Throwable");
    debug!(
        class = class.name(),
        exception, "catching and ignoring exceptions"
    );
    class
        .member_mut(id)?
        .code
        .add_handler(Some(exception), code);
    Ok(())
}
