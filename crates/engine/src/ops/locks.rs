//! Lock operations: bracketing members with lock calls and converting lock
//! primitives to monitors.

use super::required;
use crate::monitor;
use crate::registry::{Attrs, OpContext, OperationDescriptor};
use crate::Result;
use classpatch_core::unit::{ClassUnit, MemberId};

pub(crate) fn descriptors() -> Vec<OperationDescriptor> {
    vec![
        OperationDescriptor::member("lock", Some(&["field"]), lock),
        OperationDescriptor::member("lockToSynchronized", Some(&[]), lock_to_synchronized),
    ]
}

/// Locks and unlocks the lock held in `field` at the member's entry and at
/// every exit.
fn lock(_ctx: &OpContext, class: &mut ClassUnit, id: MemberId, attrs: &Attrs) -> Result<()> {
    let field = required(attrs, "lock", "field")?;
    let member = class.member_mut(id)?;
    member.code.insert_before(&format!("this.{field}.lock();"));
    member
        .code
        .insert_after(&format!("this.{field}.unlock();"), true);
    Ok(())
}

/// Converts `lock()`/`unlock()` calls in the member to monitor opcodes.
fn lock_to_synchronized(
    _ctx: &OpContext,
    class: &mut ClassUnit,
    id: MemberId,
    _attrs: &Attrs,
) -> Result<()> {
    let (code, pool) = class.member_code_and_pool(id)?;
    monitor::convert_lock_calls(code, pool)?;
    Ok(())
}
