//! Field-initializer correlation.
//!
//! Replacing "the expression that initializes field `f`" needs more than a
//! textual match: the new-object expression and the later field write have
//! to be the same logical initialization, with nothing in between that could
//! have produced a different value. The scan below keeps exactly one piece
//! of state, the most recent new-object expression not yet invalidated,
//! and records a correlated site whenever a matching field write lands while
//! that candidate is still live.

use classpatch_core::code::{CodeBody, Instruction};
use classpatch_core::is_constructor_invoke;
use classpatch_core::opcode::Opcode;
use classpatch_core::pool::ConstPool;
use classpatch_core::result::Result;
use classpatch_core::source::ClassSource;
use tracing::debug;

/// One correlated initializer site: the new-object expression span and the
/// type it constructs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrelatedSite {
    /// Offset of the `new` opcode.
    pub start: usize,
    /// Exclusive end of the span, just past the completing constructor call.
    pub end: usize,
    /// The constructed type name.
    pub constructed_type: String,
}

/// The pending candidate while scanning.
struct Pending {
    start: usize,
    constructed_type: String,
    /// Set once the candidate's own constructor call was seen.
    end: Option<usize>,
}

/// Scans `code` for new-object expressions that initialize `field_name`
/// (declared type `field_type`).
///
/// Invalidators between a candidate and its field write: any other method
/// call, a new-array expression, a cast, an instanceof check, reaching an
/// exception-handler entry, and any unrelated field access. The constructor
/// call that completes the candidate itself extends the span instead.
pub fn correlate(
    code: &CodeBody,
    pool: &ConstPool,
    source: &dyn ClassSource,
    field_name: &str,
    field_type: &str,
) -> Result<Vec<CorrelatedSite>> {
    let instructions = code.decode()?;
    let handler_entries: Vec<usize> = code.handlers().iter().map(|h| h.handler_pc).collect();

    let mut sites = Vec::new();
    let mut pending: Option<Pending> = None;

    for instruction in &instructions {
        if handler_entries.contains(&instruction.pc) {
            pending = None;
        }
        match instruction.op {
            Opcode::NEW => {
                let constructed = pool.class_name(code.u16_at(instruction.pc + 1)?)?;
                pending = source
                    .is_subtype(constructed, field_type)
                    .then(|| Pending {
                        start: instruction.pc,
                        constructed_type: constructed.to_string(),
                        end: None,
                    });
            }
            Opcode::INVOKESPECIAL => {
                let target = pool.any_method_ref(code.u16_at(instruction.pc + 1)?)?;
                pending = match pending {
                    // The candidate's own constructor call completes it.
                    Some(mut p)
                        if p.end.is_none()
                            && is_constructor_invoke(instruction.op, &target.name)
                            && target.class == p.constructed_type =>
                    {
                        p.end = Some(instruction.next_pc());
                        Some(p)
                    }
                    // Anything else that reaches here, a superclass
                    // constructor call included, can intervene, so the
                    // candidate dies.
                    _ => None,
                };
            }
            Opcode::INVOKEVIRTUAL | Opcode::INVOKESTATIC | Opcode::INVOKEINTERFACE => {
                pending = None;
            }
            Opcode::NEWARRAY | Opcode::ANEWARRAY | Opcode::CHECKCAST | Opcode::INSTANCEOF => {
                pending = None;
            }
            Opcode::PUTFIELD | Opcode::PUTSTATIC => {
                let target = pool.field_ref(code.u16_at(instruction.pc + 1)?)?;
                let target_name = target.name.clone();
                if let Some(p) = pending.take() {
                    if let (true, Some(end)) = (target_name == field_name, p.end) {
                        debug!(
                            start = p.start,
                            end,
                            constructed = %p.constructed_type,
                            "correlated field initializer"
                        );
                        sites.push(CorrelatedSite {
                            start: p.start,
                            end,
                            constructed_type: p.constructed_type,
                        });
                    }
                }
            }
            Opcode::GETFIELD | Opcode::GETSTATIC => {
                pending = None;
            }
            _ => {}
        }
    }
    Ok(sites)
}

/// Second pass: replaces every correlated span with `fragment` and rebuilds
/// the member's stack map. Returns the number of sites replaced.
///
/// The replacement subsumes construction and assignment; the field write
/// itself is never the replaced expression.
pub fn replace_initializers(
    code: &mut CodeBody,
    pool: &ConstPool,
    source: &dyn ClassSource,
    field_name: &str,
    field_type: &str,
    fragment: &str,
) -> Result<usize> {
    let sites = correlate(code, pool, source, field_name, field_type)?;
    for site in &sites {
        code.replace_span(site.start, site.end, fragment)?;
    }
    if !sites.is_empty() {
        code.rebuild_stack_map()?;
    }
    Ok(sites.len())
}

/// Convenience for scans that only need the completing call of one `new`.
pub fn constructor_call_end(
    instructions: &[Instruction],
    code: &CodeBody,
    pool: &ConstPool,
    new_pc: usize,
    constructed: &str,
) -> Result<Option<usize>> {
    for instruction in instructions.iter().filter(|i| i.pc > new_pc) {
        if instruction.op == Opcode::INVOKESPECIAL {
            let target = pool.any_method_ref(code.u16_at(instruction.pc + 1)?)?;
            if is_constructor_invoke(instruction.op, &target.name) && target.class == constructed {
                return Ok(Some(instruction.next_pc()));
            }
        }
    }
    Ok(None)
}
