//! Call-site operations: replacing, locking and synchronizing method calls.

use super::{attr, has, int_attr, required};
use crate::registry::{Attrs, OpContext, OperationDescriptor};
use crate::truncate;
use crate::{Error, Result};
use classpatch_core::code::CodeBody;
use classpatch_core::ident::MethodId;
use classpatch_core::pool::ConstPool;
use classpatch_core::unit::{ClassUnit, MemberId};
use tracing::{debug, warn};

pub(crate) fn descriptors() -> Vec<OperationDescriptor> {
    vec![
        OperationDescriptor::member("replaceMethodCall", Some(&[]), replace_method_call),
        OperationDescriptor::member("lockMethodCall", Some(&["field"]), lock_method_call),
        OperationDescriptor::member(
            "synchronizeMethodCall",
            Some(&["field"]),
            synchronize_method_call,
        ),
    ]
}

/// One resolved call site in a member's code.
pub(crate) struct CallSite {
    pub pc: usize,
    pub end: usize,
    pub class: String,
    pub method: String,
}

/// Collects every non-constructor invocation in document order.
pub(crate) fn call_sites(code: &CodeBody, pool: &ConstPool) -> Result<Vec<CallSite>> {
    let mut sites = Vec::new();
    for instruction in code.decode()? {
        if !instruction.op.is_invoke() {
            continue;
        }
        let index = code.u16_at(instruction.pc + 1)?;
        let Ok(target) = pool.any_method_ref(index) else {
            continue;
        };
        if target.name == "<init>" {
            continue;
        }
        sites.push(CallSite {
            pc: instruction.pc,
            end: instruction.next_pc(),
            class: target.class.clone(),
            method: target.name.clone(),
        });
    }
    Ok(sites)
}

/// Applies the class/method/ordinal filters the call operations share. The
/// ordinal only counts sites that already matched class and method.
fn select<'a>(
    sites: &'a [CallSite],
    class_filter: Option<&str>,
    method: &str,
    index: i64,
) -> Vec<&'a CallSite> {
    let mut matched = Vec::new();
    let mut ordinal = 0i64;
    for site in sites {
        if class_filter.is_some_and(|class| site.class != class) {
            continue;
        }
        if !method.is_empty() && site.method != method {
            continue;
        }
        let position = ordinal;
        ordinal += 1;
        if index == -1 || position == index {
            matched.push(site);
        }
    }
    matched
}

fn replace_method_call(
    ctx: &OpContext,
    class: &mut ClassUnit,
    id: MemberId,
    attrs: &Attrs,
) -> Result<()> {
    let declaring = class.name().to_string();
    let spec = attr(attrs, "method").unwrap_or("");
    // The class filter is everything before the last dot.
    let (class_filter, method) = match spec.rfind('.') {
        Some(dot) => (Some(&spec[..dot]), &spec[dot + 1..]),
        None => (None, spec),
    };
    let class_filter = class_filter.map(|filter| {
        if filter == "self" {
            declaring.clone()
        } else {
            filter.to_string()
        }
    });
    let index = int_attr(attrs, "index", -1);
    let new_method = attr(attrs, "newMethod").map(str::to_string);
    let remove_after = has(attrs, "removeAfter");
    let code_fragment = match (attr(attrs, "code"), &new_method) {
        (Some(code), _) => Some(code.to_string()),
        (None, Some(new_method)) => Some(format!("$_ = $0.{new_method}($$);")),
        (None, None) => None,
    };
    if code_fragment.is_none() && !remove_after {
        return Err(Error::InvalidAttribute {
            op: "replaceMethodCall",
            msg: "newMethod, code or removeAfter must be set".to_string(),
        });
    }

    let (code, pool) = class.member_code_and_pool(id)?;
    let sites = call_sites(code, pool)?;
    let mut replaced = 0;
    for site in select(&sites, class_filter.as_deref(), method, index) {
        if let Some(new_method) = &new_method {
            // Only replace when the called class really declares the
            // replacement method.
            let declares = ctx
                .source
                .get(&site.class)
                .ok()
                .map(|unit| unit.find_method(&MethodId::erased(&site.class, new_method)).is_ok())
                .unwrap_or(false);
            if !declares {
                continue;
            }
        }
        replaced += 1;
        debug!(
            class = %site.class,
            method = %site.method,
            pc = site.pc,
            "replacing method call"
        );
        if remove_after {
            truncate::remove_after(code, site.pc)?;
            break;
        }
        if let Some(fragment) = &code_fragment {
            code.replace_span(site.pc, site.end, fragment)?;
        }
    }
    if replaced > 0 && !remove_after {
        code.rebuild_stack_map()?;
    }
    if replaced == 0 && !has(attrs, "silent") {
        warn!(
            class = %declaring,
            method,
            ?class_filter,
            index,
            "didn't find any method calls to replace"
        );
    }
    Ok(())
}

fn lock_method_call(
    _ctx: &OpContext,
    class: &mut ClassUnit,
    id: MemberId,
    attrs: &Attrs,
) -> Result<()> {
    let field = required(attrs, "lockMethodCall", "field")?.to_string();
    let fragment = format!(
        "{{ {field}.lock(); try {{ $_ = $proceed($$); }} finally {{ {field}.unlock(); }} }}"
    );
    wrap_calls(class, id, attrs, &fragment, "locking")
}

fn synchronize_method_call(
    _ctx: &OpContext,
    class: &mut ClassUnit,
    id: MemberId,
    attrs: &Attrs,
) -> Result<()> {
    let field = required(attrs, "synchronizeMethodCall", "field")?.to_string();
    let fragment = format!("synchronized({field}) {{ $_ = $0.$proceed($$); }}");
    wrap_calls(class, id, attrs, &fragment, "synchronizing")
}

/// Shared body of the two call-wrapping operations; these split the method
/// specification at the first dot.
fn wrap_calls(
    class: &mut ClassUnit,
    id: MemberId,
    attrs: &Attrs,
    fragment: &str,
    action: &'static str,
) -> Result<()> {
    let declaring = class.name().to_string();
    let spec = attr(attrs, "method").unwrap_or("");
    let (class_filter, method) = match spec.find('.') {
        Some(dot) => (Some(spec[..dot].to_string()), &spec[dot + 1..]),
        None => (None, spec),
    };
    let index = int_attr(attrs, "index", -1);

    let (code, pool) = class.member_code_and_pool(id)?;
    let sites = call_sites(code, pool)?;
    let mut replaced = 0;
    for site in select(&sites, class_filter.as_deref(), method, index) {
        debug!(method = %site.method, pc = site.pc, action, "wrapping method call");
        code.replace_span(site.pc, site.end, fragment)?;
        replaced += 1;
    }
    if replaced > 0 {
        code.rebuild_stack_map()?;
    } else {
        warn!(
            class = %declaring,
            method = spec,
            action,
            "0 replacements made wrapping method call"
        );
    }
    Ok(())
}
