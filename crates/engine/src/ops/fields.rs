//! Field operations: declaration changes and access rewriting.

use super::{attr, has, required};
use crate::registry::{Attrs, OpContext, OperationDescriptor};
use crate::truncate;
use crate::{Error, Result};
use classpatch_core::code::CodeBody;
use classpatch_core::opcode::Opcode;
use classpatch_core::pool::ConstPool;
use classpatch_core::unit::{ClassUnit, FieldDecl, MemberId, MemberKind, Modifiers};
use tracing::{debug, error, warn};

pub(crate) fn descriptors() -> Vec<OperationDescriptor> {
    vec![
        OperationDescriptor::class("addField", Some(&["field", "fieldClass"]), add_field),
        OperationDescriptor::class("removeField", Some(&["field"]), remove_field),
        OperationDescriptor::class(
            "removeFieldAndInitializers",
            Some(&["field"]),
            remove_field_and_initializers,
        ),
        OperationDescriptor::class("addInitializer", Some(&["field"]), add_initializer),
        OperationDescriptor::member("replaceFieldAccess", Some(&["field"]), replace_field_access),
    ]
}

/// One resolved field access in a member's code.
pub(crate) struct FieldSite {
    pub pc: usize,
    pub end: usize,
    pub class: String,
    pub name: String,
    pub write: bool,
}

/// Collects every field access in document order.
pub(crate) fn field_sites(code: &CodeBody, pool: &ConstPool) -> Result<Vec<FieldSite>> {
    let mut sites = Vec::new();
    for instruction in code.decode()? {
        let write = match instruction.op {
            Opcode::PUTFIELD | Opcode::PUTSTATIC => true,
            Opcode::GETFIELD | Opcode::GETSTATIC => false,
            _ => continue,
        };
        let target = pool.field_ref(code.u16_at(instruction.pc + 1)?)?;
        sites.push(FieldSite {
            pc: instruction.pc,
            end: instruction.next_pc(),
            class: target.class.clone(),
            name: target.name.clone(),
            write,
        });
    }
    Ok(sites)
}

fn add_field(_ctx: &OpContext, class: &mut ClassUnit, attrs: &Attrs) -> Result<Option<ClassUnit>> {
    let field = required(attrs, "addField", "field")?;
    let field_class = required(attrs, "addField", "fieldClass")?;
    if let Ok(existing) = class.field(field) {
        warn!(
            class = class.name(),
            field,
            existing_type = %existing.type_name,
            "field already exists"
        );
        return Ok(None);
    }
    let initializer = match attr(attrs, "code") {
        Some(code) if code.eq_ignore_ascii_case("none") => None,
        Some(code) => Some(code.to_string()),
        None => Some(format!("new {field_class}();")),
    };
    let mut modifiers = Modifiers::default().as_public();
    if has(attrs, "static") {
        modifiers = modifiers.with(Modifiers::STATIC);
    }
    class.add_field(FieldDecl {
        name: field.to_string(),
        type_name: field_class.to_string(),
        modifiers,
        initializer,
    });
    Ok(None)
}

fn remove_field(
    _ctx: &OpContext,
    class: &mut ClassUnit,
    attrs: &Attrs,
) -> Result<Option<ClassUnit>> {
    let field = required(attrs, "removeField", "field")?;
    class.remove_field(field)?;
    Ok(None)
}

/// Removes a field along with every correlated initializer and access.
fn remove_field_and_initializers(
    ctx: &OpContext,
    class: &mut ClassUnit,
    attrs: &Attrs,
) -> Result<Option<ClassUnit>> {
    let field = required(attrs, "removeFieldAndInitializers", "field")?.to_string();
    if class.field(&field).is_err() {
        if !has(attrs, "silent") {
            error!(class = class.name(), field = %field, "couldn't find field");
        }
        return Ok(None);
    }
    let mut targets = class.declared_constructors();
    targets.extend(class.static_initializer());
    for id in targets {
        super::initializers::remove_initializers_on(ctx, class, id, &field)?;
    }
    class.remove_field(&field)?;
    Ok(None)
}

/// Adds an initializer for an existing field: static fields extend the
/// static initializer, instance fields run through a once-per-object
/// `runConstructors` hook installed on every constructor.
fn add_initializer(
    _ctx: &OpContext,
    class: &mut ClassUnit,
    attrs: &Attrs,
) -> Result<Option<ClassUnit>> {
    let field = required(attrs, "addInitializer", "field")?.to_string();
    let expression = match (attr(attrs, "code"), attr(attrs, "fieldClass")) {
        (Some(code), _) => code.to_string(),
        (None, Some(field_class)) => match attr(attrs, "arraySize") {
            Some(size) => format!("new {field_class}[{size}]"),
            None => format!("new {field_class}()"),
        },
        (None, None) => {
            return Err(Error::InvalidAttribute {
                op: "addInitializer",
                msg: "must give code or fieldClass".to_string(),
            })
        }
    };
    let initialise = format!("{{ {field} = {expression}; }}");

    if class.field(&field)?.modifiers.contains(Modifiers::STATIC) {
        let initializer = class.make_static_initializer();
        class
            .member_mut(initializer)?
            .code
            .insert_after(&initialise, false);
        return Ok(None);
    }

    let hook = match class.members().iter().find(|m| m.name == "runConstructors") {
        Some(member) => member.id(),
        None => {
            let hook = class.add_member(
                MemberKind::Method,
                "runConstructors",
                Vec::new(),
                Some("void".to_string()),
                Modifiers::default().as_public(),
                CodeBody::new(vec![Opcode::RETURN.as_byte()]),
            )?;
            class.add_field(FieldDecl {
                name: "isConstructed".to_string(),
                type_name: "boolean".to_string(),
                modifiers: Modifiers::default(),
                initializer: None,
            });
            for constructor in class.declared_constructors() {
                class.member_mut(constructor)?.code.insert_after(
                    "{ if(!this.isConstructed) { this.isConstructed = true; this.runConstructors(); } }",
                    false,
                );
            }
            hook
        }
    };
    class.member_mut(hook)?.code.insert_after(&initialise, false);
    Ok(None)
}

/// Rewrites reads and writes of one field inside the target member.
fn replace_field_access(
    _ctx: &OpContext,
    class: &mut ClassUnit,
    id: MemberId,
    attrs: &Attrs,
) -> Result<()> {
    let field = required(attrs, "replaceFieldAccess", "field")?.to_string();
    let read_code = attr(attrs, "readCode").map(str::to_string);
    let write_code = attr(attrs, "writeCode").map(str::to_string);
    if read_code.is_none() && write_code.is_none() {
        return Err(Error::InvalidAttribute {
            op: "replaceFieldAccess",
            msg: "readCode or writeCode must be set".to_string(),
        });
    }
    let class_filter = attr(attrs, "fieldClass").map(str::to_string);
    let remove_after = has(attrs, "removeAfter");
    let declaring = class.name().to_string();

    let (code, pool) = class.member_code_and_pool(id)?;
    let sites = field_sites(code, pool)?;
    let mut replaced = 0;
    let mut spans_changed = false;
    for site in &sites {
        if site.name != field {
            continue;
        }
        if class_filter.as_deref().is_some_and(|c| site.class != c) {
            continue;
        }
        replaced += 1;
        if remove_after {
            truncate::remove_after(code, site.pc)?;
            break;
        }
        match (site.write, &write_code, &read_code) {
            (true, Some(fragment), _) => {
                code.replace_span(site.pc, site.end, fragment)?;
                spans_changed = true;
            }
            (false, _, Some(fragment)) => {
                code.replace_span(site.pc, site.end, fragment)?;
                spans_changed = true;
                debug!(field = %field, pc = site.pc, "replaced field read");
            }
            _ => {}
        }
    }
    if spans_changed {
        code.rebuild_stack_map()?;
    }
    if replaced == 0 && !has(attrs, "silent") {
        error!(
            class = %declaring,
            field = %field,
            "didn't replace any field accesses"
        );
    }
    Ok(())
}
