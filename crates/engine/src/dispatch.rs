//! Member selection and per-member application.
//!
//! Given one operation invocation and a resolved class, selection follows a
//! fixed decision order: the `^all^` sentinel, class-level application,
//! per-constructor application for empty bodies, the `^static^` sentinel,
//! and finally an explicit method list. A failure while running one member
//! never stops its siblings, and a class-level operation returning a
//! replacement unit swaps the class threaded through the rest of the entry.

use crate::registry::{Attrs, OpApply, OpContext, OperationDescriptor, Target};
use classpatch_document::model::{OperationInvocation, SELECT_ALL, SELECT_STATIC};
use classpatch_core::ident::MethodId;
use classpatch_core::unit::{ClassUnit, MemberId};
use tracing::{debug, error, warn};

/// Applies one invocation to `class`, returning the (possibly replaced)
/// class unit.
pub fn dispatch(
    ctx: &OpContext,
    descriptor: &OperationDescriptor,
    invocation: &OperationInvocation,
    mut class: ClassUnit,
) -> ClassUnit {
    if let Some(required) = &descriptor.required {
        let missing: Vec<&&str> = required
            .iter()
            .filter(|name| !invocation.has_attr(name))
            .collect();
        if !missing.is_empty() {
            error!(
                class = class.name(),
                operation = descriptor.name,
                ?missing,
                "missing required attributes"
            );
            return class;
        }
    }

    debug!(
        class = class.name(),
        operation = descriptor.name,
        body = %invocation.body,
        "patching"
    );

    let body = invocation.body.as_str();
    if body == SELECT_ALL {
        // Selecting everything must not report per-member misses.
        let mut attributes = invocation.attributes.clone();
        attributes.insert("silent".to_string(), "true".to_string());
        let mut targets = class.declared_methods();
        targets.extend(class.declared_constructors());
        targets.extend(class.static_initializer());
        for id in targets {
            run_member(ctx, descriptor, &mut class, id, &attributes);
        }
    } else if descriptor.is_class_patch() || (!descriptor.empty_constructor && body.is_empty()) {
        if let Some(replacement) = run_class(ctx, descriptor, &mut class, &invocation.attributes) {
            class = replacement;
        }
    } else if body.is_empty() {
        for id in class.declared_constructors() {
            run_member(ctx, descriptor, &mut class, id, &invocation.attributes);
        }
    } else if body == SELECT_STATIC {
        match class.static_initializer() {
            Some(id) => run_member(ctx, descriptor, &mut class, id, &invocation.attributes),
            None => error!(
                class = class.name(),
                operation = descriptor.name,
                "no static initializer found"
            ),
        }
    } else {
        let references = match MethodId::parse_list(class.name(), body) {
            Ok(references) => references,
            Err(e) => {
                error!(
                    class = class.name(),
                    operation = descriptor.name,
                    error = %e,
                    "unparseable method list"
                );
                return class;
            }
        };
        for reference in references {
            match class.find_method(&reference) {
                Ok(id) => run_member(ctx, descriptor, &mut class, id, &invocation.attributes),
                Err(e) => {
                    if !invocation.has_attr("allowMissing") {
                        warn!(
                            class = class.name(),
                            operation = descriptor.name,
                            reference = %reference,
                            error = %e,
                            "method reference did not resolve"
                        );
                    }
                }
            }
        }
    }
    class
}

fn run_member(
    ctx: &OpContext,
    descriptor: &OperationDescriptor,
    class: &mut ClassUnit,
    id: MemberId,
    attributes: &Attrs,
) {
    let display = class
        .member(id)
        .map(|m| m.signature_string())
        .unwrap_or_else(|_| format!("#{}", id.0));
    let outcome = match &descriptor.apply {
        OpApply::Member(apply) => apply(ctx, class, id, attributes),
        OpApply::Either(apply) => apply(ctx, Target::Member(class, id), attributes),
        OpApply::Class(_) => {
            error!(
                class = class.name(),
                operation = descriptor.name,
                "class-level operation selected for a member"
            );
            return;
        }
    };
    if let Err(e) = outcome {
        error!(
            class = class.name(),
            member = %display,
            operation = descriptor.name,
            error = %e,
            "error patching member"
        );
    }
}

fn run_class(
    ctx: &OpContext,
    descriptor: &OperationDescriptor,
    class: &mut ClassUnit,
    attributes: &Attrs,
) -> Option<ClassUnit> {
    let outcome = match &descriptor.apply {
        OpApply::Class(apply) => apply(ctx, class, attributes),
        OpApply::Either(apply) => apply(ctx, Target::Class(class), attributes).map(|()| None),
        OpApply::Member(_) => {
            error!(
                class = class.name(),
                operation = descriptor.name,
                "member-level operation selected for the whole class"
            );
            return None;
        }
    };
    match outcome {
        Ok(replacement) => replacement,
        Err(e) => {
            error!(
                class = class.name(),
                operation = descriptor.name,
                error = %e,
                "error patching class"
            );
            None
        }
    }
}
