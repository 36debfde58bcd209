//! New-expression operations: initializer correlation and replacement.

use super::{attr, fields, has, required};
use crate::field_init;
use crate::registry::{Attrs, OpContext, OperationDescriptor, Target};
use crate::{Error, Result};
use classpatch_core::opcode::Opcode;
use classpatch_core::unit::{ClassUnit, MemberId};
use tracing::{debug, error, warn};

pub(crate) fn descriptors() -> Vec<OperationDescriptor> {
    vec![
        OperationDescriptor::either(
            "replaceFieldInitializer",
            Some(&["field"]),
            replace_field_initializer,
        ),
        OperationDescriptor::either("removeInitializers", Some(&["field"]), remove_initializers),
        OperationDescriptor::either(
            "replaceNewExpression",
            Some(&["oldClass"]),
            replace_new_expression,
        ),
    ]
}

/// Replaces the expression initializing `field` wherever construction and
/// assignment correlate (see [`field_init`]).
fn replace_field_initializer(ctx: &OpContext, target: Target<'_>, attrs: &Attrs) -> Result<()> {
    let field = required(attrs, "replaceFieldInitializer", "field")?.to_string();
    let fragment = initializer_fragment(attrs, "replaceFieldInitializer", "fieldClass")?;

    let (replaced, class_name) = match target {
        Target::Class(class) => {
            if has(attrs, "classContainingField") {
                warn!(
                    class = class.name(),
                    "must set methods to run on if using classContainingField"
                );
                return Ok(());
            }
            let field_type = class.field(&field)?.type_name.clone();
            let mut targets = class.declared_constructors();
            targets.extend(class.static_initializer());
            let mut replaced = 0;
            for id in targets {
                let (code, pool) = class.member_code_and_pool(id)?;
                replaced += field_init::replace_initializers(
                    code,
                    pool,
                    &*ctx.source,
                    &field,
                    &field_type,
                    &fragment,
                )?;
            }
            (replaced, class.name().to_string())
        }
        Target::Member(class, id) => {
            let field_type = match attr(attrs, "classContainingField") {
                Some(container) => {
                    let unit = ctx.source.get(container)?;
                    unit.field(&field)?.type_name.clone()
                }
                None => class.field(&field)?.type_name.clone(),
            };
            let (code, pool) = class.member_code_and_pool(id)?;
            let replaced = field_init::replace_initializers(
                code,
                pool,
                &*ctx.source,
                &field,
                &field_type,
                &fragment,
            )?;
            (replaced, class.name().to_string())
        }
    };

    if replaced == 0 && !has(attrs, "silent") {
        error!(
            class = %class_name,
            field = %field,
            "no field initializers found for replacement"
        );
    }
    Ok(())
}

/// Removes initializers of one field: correlated constructions become null
/// assignments and every remaining access is blanked, silently.
fn remove_initializers(ctx: &OpContext, target: Target<'_>, attrs: &Attrs) -> Result<()> {
    let field = required(attrs, "removeInitializers", "field")?.to_string();
    match target {
        Target::Class(class) => {
            let mut targets = class.declared_constructors();
            targets.extend(class.declared_methods());
            targets.extend(class.static_initializer());
            for id in targets {
                remove_initializers_on(ctx, class, id, &field)?;
            }
        }
        Target::Member(class, id) => remove_initializers_on(ctx, class, id, &field)?,
    }
    Ok(())
}

/// The shared body of `removeInitializers` and
/// `removeFieldAndInitializers`.
pub(crate) fn remove_initializers_on(
    ctx: &OpContext,
    class: &mut ClassUnit,
    id: MemberId,
    field: &str,
) -> Result<()> {
    let field_type = class.field(field)?.type_name.clone();
    let (code, pool) = class.member_code_and_pool(id)?;
    field_init::replace_initializers(
        code,
        pool,
        &*ctx.source,
        field,
        &field_type,
        "{ $_ = null; }",
    )?;
    let sites = fields::field_sites(code, pool)?;
    let mut blanked = false;
    for site in sites.iter().filter(|s| s.name == field) {
        let fragment = if site.write { "{ }" } else { "{ $_ = null; }" };
        code.replace_span(site.pc, site.end, fragment)?;
        blanked = true;
    }
    if blanked {
        code.rebuild_stack_map()?;
    }
    Ok(())
}

/// Replaces `new oldClass()` expressions with a fragment, everywhere or in
/// the selected members.
fn replace_new_expression(_ctx: &OpContext, target: Target<'_>, attrs: &Attrs) -> Result<()> {
    let old_class = required(attrs, "replaceNewExpression", "oldClass")?.to_string();
    let fragment = initializer_fragment(attrs, "replaceNewExpression", "newClass")?;

    let (class, targets) = match target {
        Target::Class(class) => {
            let mut targets = class.declared_constructors();
            targets.extend(class.declared_methods());
            (class, targets)
        }
        Target::Member(class, id) => (class, vec![id]),
    };

    let mut done = 0;
    let class_name = class.name().to_string();
    for id in targets {
        let (code, pool) = class.member_code_and_pool(id)?;
        let instructions = code.decode()?;
        let mut spans = Vec::new();
        for instruction in &instructions {
            if instruction.op != Opcode::NEW {
                continue;
            }
            let constructed = pool.class_name(code.u16_at(instruction.pc + 1)?)?;
            if constructed != old_class {
                continue;
            }
            if let Some(end) = field_init::constructor_call_end(
                &instructions,
                code,
                pool,
                instruction.pc,
                constructed,
            )? {
                spans.push((instruction.pc, end));
            }
        }
        for (start, end) in &spans {
            debug!(class = %class_name, start, end, "replacing new expression");
            code.replace_span(*start, *end, &fragment)?;
            done += 1;
        }
        if !spans.is_empty() {
            code.rebuild_stack_map()?;
        }
    }
    if done == 0 {
        error!(
            class = %class_name,
            old_class = %old_class,
            "no new expressions found for replacement"
        );
    }
    Ok(())
}

/// `code` attribute, or the default `$_ = new <class>();` built from the
/// named class attribute. One of the two must be present.
fn initializer_fragment(
    attrs: &Attrs,
    op: &'static str,
    class_attr: &'static str,
) -> Result<String> {
    match (attr(attrs, "code"), attr(attrs, class_attr)) {
        (Some(code), _) => Ok(code.to_string()),
        (None, Some(class)) => Ok(format!("$_ = new {class}();")),
        (None, None) => Err(Error::InvalidAttribute {
            op,
            msg: format!("must give code or {class_attr}"),
        }),
    }
}
